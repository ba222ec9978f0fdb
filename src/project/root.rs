use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Ascend from `start` until a directory containing one of `markers` is found.
///
/// Fails with [`Error::RootNotFound`] once the filesystem root has been
/// checked without a match.
pub fn find_project_root(start: &Path, markers: &[&str]) -> Result<PathBuf> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    let mut current = start.as_path();
    loop {
        if let Some(marker) = markers.iter().find(|m| current.join(m).exists()) {
            tracing::debug!("Project root is {} (found {})", current.display(), marker);
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(Error::RootNotFound {
                    start: start.clone(),
                    marker: markers.join(" or "),
                })
            }
        }
    }
}
