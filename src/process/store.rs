use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persists the PID of the supervised process as decimal text in one file.
///
/// An empty or missing file means "no supervised process". The file is never
/// deleted, only overwritten. Writers must hold the restart lock.
#[derive(Debug, Clone)]
pub struct PidStore {
    path: PathBuf,
}

impl PidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the state directory and an empty record if none exists yet.
    pub fn initialize(&self) -> Result<()> {
        self.ensure_parent()?;
        if !self.path.exists() {
            fs::write(&self.path, "").map_err(|e| {
                Error::Filesystem(format!(
                    "Failed to create PID file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            debug!("Created empty PID file at {}", self.path.display());
        }
        Ok(())
    }

    /// Read the stored PID.
    ///
    /// Returns `Ok(None)` for a missing or empty record and
    /// [`Error::CorruptRecord`] when the content is not a positive integer.
    pub fn read(&self) -> Result<Option<u32>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(Error::CorruptRecord {
                path: self.path.clone(),
                content: trimmed.to_string(),
            }),
        }
    }

    /// Like [`read`](Self::read), but a corrupt record is logged and treated
    /// as absent so that it never blocks a restart.
    pub fn load(&self) -> Result<Option<u32>> {
        match self.read() {
            Err(e @ Error::CorruptRecord { .. }) => {
                warn!("{}; treating as no supervised process", e);
                Ok(None)
            }
            other => other,
        }
    }

    /// Overwrite the record with `pid`.
    pub fn write(&self, pid: u32) -> Result<()> {
        self.ensure_parent()?;
        fs::write(&self.path, pid.to_string()).map_err(|e| {
            Error::Filesystem(format!(
                "Failed to write PID file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Overwrite the record with nothing.
    pub fn clear(&self) -> Result<()> {
        self.ensure_parent()?;
        fs::write(&self.path, "").map_err(|e| {
            Error::Filesystem(format!(
                "Failed to clear PID file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Filesystem(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> PidStore {
        PidStore::new(dir.path().join("node_modules").join(".pid"))
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&temp).read().unwrap(), None);
    }

    #[test]
    fn test_initialize_creates_empty_record() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.initialize().unwrap();
        assert!(store.path().exists());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "");
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_initialize_keeps_existing_record() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.write(31337).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.read().unwrap(), Some(31337));
    }

    #[test]
    fn test_write_then_read() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.write(4242).unwrap();
        assert_eq!(store.read().unwrap(), Some(4242));
        store.write(4343).unwrap();
        assert_eq!(store.read().unwrap(), Some(4343));
    }

    #[test]
    fn test_clear_keeps_file() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.write(4242).unwrap();
        store.clear().unwrap();
        assert!(store.path().exists());
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.initialize().unwrap();
        fs::write(store.path(), "1234\n").unwrap();
        assert_eq!(store.read().unwrap(), Some(1234));
    }

    #[test]
    fn test_corrupt_record_is_error_but_load_recovers() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        store.initialize().unwrap();

        for garbage in ["not-a-pid", "-5", "0", "12.5", "99999999999"] {
            fs::write(store.path(), garbage).unwrap();
            assert!(
                matches!(store.read(), Err(Error::CorruptRecord { .. })),
                "'{}' should be corrupt",
                garbage
            );
            assert_eq!(store.load().unwrap(), None);
        }
    }
}
