//! Path resolution helpers for project-relative files and schema lookups.

use std::path::{Path, PathBuf};

/// Absolutize a project file path against the current working directory.
pub fn resolve_project_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Directory containing a project file; files named by the project resolve
/// relative to it.
pub fn project_dir(project_path: &Path) -> PathBuf {
    project_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve a file path named inside a project document.
pub fn resolve_relative(base_dir: &Path, file_path: &str) -> PathBuf {
    let candidate = Path::new(file_path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

/// Schema file location: `<schema_dir>/<version>/<file>`.
pub fn schema_path(schema_dir: &Path, version: &str, file: &str) -> PathBuf {
    schema_dir.join(version).join(file)
}
