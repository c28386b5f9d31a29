//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// Relative paths are joined onto the current directory. `..`/`.` components
/// are resolved syntactically; symlinks are left alone so that environment
/// roots are reported under the path the walker actually took.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    normalize_syntactic(&absolute)
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// A `..` directly under the root is dropped (`/../foo` becomes `/foo`). An
/// empty result becomes `.`.
pub fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
        }
    }
    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.into_iter().collect()
}

/// Path rendered with forward slashes, for pattern matching.
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Default volume swept when none is configured.
#[must_use]
pub fn default_volume_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\")
    } else {
        PathBuf::from("/")
    }
}
