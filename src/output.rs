//! CSS output writing

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for output operations
#[derive(Debug, Error)]
pub enum WriteError {
    /// Parent directory could not be created
    #[error("failed to create directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// File could not be written
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Write CSS text to `path`, replacing any existing file.
///
/// Missing parent directories are created first. The write is not atomic:
/// readers may observe a truncated file while it is in progress.
pub fn write_css(path: &Path, css: &str) -> Result<(), WriteError> {
    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|source| WriteError::CreateDir { path: parent.to_path_buf(), source })?;
        }
    }

    let mut data = String::with_capacity(css.len() + 1);
    data.push_str(css);
    if !data.ends_with('\n') {
        data.push('\n');
    }

    fs::write(path, data).map_err(|source| WriteError::Write { path: path.to_path_buf(), source })
}
