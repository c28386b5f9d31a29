//! Parallel environment locator.
//!
//! Walks each volume root with a small pool of traversal threads and streams
//! an [`EnvironmentCandidate`] for every path whose suffix matches the
//! configured marker. Unreadable subtrees are reported as
//! [`Discovery::Skipped`] and the walk carries on past them.
//!
//! Safety invariants:
//! - Symlinks are matched against the marker but only descended into when
//!   `follow_symlinks` is set; followed directories are visited once each
//! - Device boundaries are crossed only when `cross_devices` is set
//! - Excluded paths are never read

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use parking_lot::Mutex;
use serde::Serialize;

use crate::scanner::marker::MarkerPattern;

/// Capacity of the discovery channel. Traversal blocks once this many
/// candidates are waiting for an extraction worker.
const DISCOVERY_QUEUE_DEPTH: usize = 256;

/// Locator configuration derived from the `[scan]` config section.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub volume_roots: Vec<PathBuf>,
    pub marker: MarkerPattern,
    /// `None` walks to unlimited depth.
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    pub cross_devices: bool,
    pub parallelism: usize,
    pub excluded_paths: HashSet<PathBuf>,
}

impl LocatorConfig {
    /// Unlimited depth, no symlink following, all devices, default exclusions off.
    pub fn new(volume_roots: Vec<PathBuf>, marker: MarkerPattern) -> Self {
        Self {
            volume_roots,
            marker,
            max_depth: None,
            follow_symlinks: false,
            cross_devices: true,
            parallelism: 2,
            excluded_paths: HashSet::new(),
        }
    }
}

/// A location believed to be an environment because the marker exists under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnvironmentCandidate {
    pub root: PathBuf,
    pub marker_path: PathBuf,
}

/// A subtree that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalError {
    pub path: PathBuf,
    pub details: String,
}

/// One item of the locator's output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Candidate(EnvironmentCandidate),
    Skipped(TraversalError),
}

/// Item in the internal work queue: (directory_path, depth, root_device_id).
/// Volume roots are queued without a device id; it is read when they are.
type WorkItem = (PathBuf, usize, Option<u64>);

struct WalkShared {
    config: LocatorConfig,
    in_flight: AtomicUsize,
    cancel: Arc<AtomicBool>,
    /// (device, inode) of directories reached through symlinks.
    visited: Mutex<HashSet<(u64, u64)>>,
}

/// Single-pass producer of environment candidates.
pub struct EnvironmentLocator {
    config: LocatorConfig,
    cancel: Arc<AtomicBool>,
}

impl EnvironmentLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag. Once set, no further directories are read.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Walk everything and collect the results.
    pub fn locate_all(&self) -> Vec<Discovery> {
        self.stream().into_iter().collect()
    }

    /// Stream discoveries as they are found. Traversal runs on background
    /// threads; the receiver disconnects when the walk is complete.
    pub fn stream(&self) -> channel::Receiver<Discovery> {
        let parallelism = self.config.parallelism.max(1);

        // Directory work is unbounded: every worker is also a producer, so a
        // bounded queue could leave all of them blocked on send.
        let (work_tx, work_rx) = channel::unbounded::<WorkItem>();
        let (result_tx, result_rx) = channel::bounded::<Discovery>(DISCOVERY_QUEUE_DEPTH);

        let shared = Arc::new(WalkShared {
            config: self.config.clone(),
            in_flight: AtomicUsize::new(0),
            cancel: Arc::clone(&self.cancel),
            visited: Mutex::new(HashSet::new()),
        });

        for root in &self.config.volume_roots {
            shared.in_flight.fetch_add(1, Ordering::Release);
            let _ = work_tx.send((root.clone(), 0, None));
        }

        for _ in 0..parallelism {
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let result_tx = result_tx.clone();
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                walker_thread(&work_rx, &work_tx, &result_tx, &shared);
            });
        }

        result_rx
    }
}

/// Convenience wrapper: walk `volume_roots` for `marker` with default knobs.
pub fn locate(volume_roots: &[PathBuf], marker: &MarkerPattern) -> channel::IntoIter<Discovery> {
    EnvironmentLocator::new(LocatorConfig::new(volume_roots.to_vec(), marker.clone()))
        .stream()
        .into_iter()
}

fn walker_thread(
    work_rx: &channel::Receiver<WorkItem>,
    work_tx: &channel::Sender<WorkItem>,
    result_tx: &channel::Sender<Discovery>,
    shared: &WalkShared,
) {
    loop {
        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok((dir_path, depth, root_dev)) => {
                if !shared.cancel.load(Ordering::Relaxed)
                    && !process_directory(&dir_path, depth, root_dev, work_tx, result_tx, shared)
                {
                    // Consumer hung up; nobody wants more results.
                    shared.cancel.store(true, Ordering::Relaxed);
                }
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                if shared.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Read one directory: report marker hits, queue subdirectories. Returns
/// `false` once the result receiver has been dropped.
fn process_directory(
    dir_path: &Path,
    depth: usize,
    root_dev: Option<u64>,
    work_tx: &channel::Sender<WorkItem>,
    result_tx: &channel::Sender<Discovery>,
    shared: &WalkShared,
) -> bool {
    let config = &shared.config;
    if config.excluded_paths.contains(dir_path) {
        return true;
    }

    let meta = match fs::metadata(dir_path) {
        Ok(m) => m,
        Err(err) => return report_skip(result_tx, dir_path, &err),
    };

    if depth == 0 && !meta.is_dir() {
        // A volume root that is a file can still be the marker itself.
        return match config.marker.environment_root(dir_path) {
            Some(root) => result_tx
                .send(Discovery::Candidate(EnvironmentCandidate {
                    root,
                    marker_path: dir_path.to_path_buf(),
                }))
                .is_ok(),
            None => true,
        };
    }

    let dev = device_id(&meta);
    let root_dev = root_dev.unwrap_or(dev);
    // Children are queued without a stat; check the device boundary here.
    if !config.cross_devices && dev != root_dev {
        return true;
    }

    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(err) => return report_skip(result_tx, dir_path, &err),
    };

    let mut pending_children: Vec<PathBuf> = Vec::new();
    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                if !report_skip(result_tx, dir_path, &err) {
                    return false;
                }
                continue;
            }
        };
        let child_path = entry.path();

        if config.marker.may_match_name(&entry.file_name())
            && let Some(root) = config.marker.environment_root(&child_path)
        {
            let candidate = EnvironmentCandidate {
                root,
                marker_path: child_path.clone(),
            };
            if result_tx.send(Discovery::Candidate(candidate)).is_err() {
                return false;
            }
        }

        let Ok(ft) = entry.file_type() else {
            continue;
        };

        let is_dir = if ft.is_symlink() {
            config.follow_symlinks && first_visit_through_symlink(&child_path, shared)
        } else {
            ft.is_dir()
        };

        if is_dir
            && config.max_depth.is_none_or(|max| depth < max)
            && !config.excluded_paths.contains(&child_path)
        {
            pending_children.push(child_path);
        }
    }

    for child_path in pending_children {
        shared.in_flight.fetch_add(1, Ordering::Release);
        if work_tx.send((child_path, depth + 1, Some(root_dev))).is_err() {
            shared.in_flight.fetch_sub(1, Ordering::Release);
        }
    }
    true
}

fn report_skip(result_tx: &channel::Sender<Discovery>, path: &Path, err: &std::io::Error) -> bool {
    result_tx
        .send(Discovery::Skipped(TraversalError {
            path: path.to_path_buf(),
            details: err.to_string(),
        }))
        .is_ok()
}

/// Whether a symlink points at a directory not yet visited through a link.
fn first_visit_through_symlink(path: &Path, shared: &WalkShared) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_dir() {
        return false;
    }
    match inode_key(&meta) {
        Some(key) => shared.visited.lock().insert(key),
        None => true,
    }
}

fn device_id(meta: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.dev()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}

fn inode_key(meta: &fs::Metadata) -> Option<(u64, u64)> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some((meta.dev(), meta.ino()))
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}
