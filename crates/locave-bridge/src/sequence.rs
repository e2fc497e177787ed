//! Persisted sequence counter
//!
//! Bridge-originated frames carry an 8-bit sequence number that must keep
//! increasing (mod 256) across restarts. The counter lives in a plain-text
//! file holding the decimal value and is rewritten on every increment.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Wrapping 8-bit counter backed by a file
#[derive(Debug)]
pub struct SequenceStore {
    /// Backing file, `None` for a memory-only counter
    path: Option<PathBuf>,
    /// Last value handed out
    value: Mutex<u8>,
}

impl SequenceStore {
    /// Load the counter from `path`
    ///
    /// A missing or unparsable file starts the counter at 0.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let value = match fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse::<u8>() {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt sequence file, starting at 0"
                    );
                    0
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No sequence file, starting at 0");
                0
            }
        };

        Self {
            path: Some(path),
            value: Mutex::new(value),
        }
    }

    /// Counter that is never written to disk
    pub fn in_memory(start: u8) -> Self {
        Self {
            path: None,
            value: Mutex::new(start),
        }
    }

    /// Last value handed out (or loaded)
    pub fn current(&self) -> u8 {
        *self.value.lock()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Advance the counter, persist it and return the new value
    ///
    /// A failed write is logged; the new value is still returned so the
    /// transmit path keeps working.
    pub fn next(&self) -> u8 {
        let mut value = self.value.lock();
        *value = value.wrapping_add(1);
        if let Err(e) = self.persist(*value) {
            warn!(error = %e, "Sequence number not persisted");
        }
        *value
    }

    fn persist(&self, value: u8) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::write(path, value.to_string()).map_err(|e| BridgeError::SequencePersist {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = SequenceStore::load(dir.path().join(".sequence"));
        assert_eq!(store.current(), 0);
        assert_eq!(store.next(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sequence");
        fs::write(&path, "not a number").unwrap();
        assert_eq!(SequenceStore::load(&path).current(), 0);

        fs::write(&path, "300").unwrap();
        assert_eq!(SequenceStore::load(&path).current(), 0);
    }

    #[test]
    fn test_wraps_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sequence");
        fs::write(&path, "254\n").unwrap();

        let store = SequenceStore::load(&path);
        assert_eq!(store.current(), 254);

        assert_eq!(store.next(), 255);
        assert_eq!(fs::read_to_string(&path).unwrap(), "255");

        assert_eq!(store.next(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sequence");

        let store = SequenceStore::load(&path);
        store.next();
        store.next();
        store.next();
        drop(store);

        let reloaded = SequenceStore::load(&path);
        assert_eq!(reloaded.current(), 3);
        assert_eq!(reloaded.next(), 4);
    }

    #[test]
    fn test_unwritable_path_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join(".sequence");
        let store = SequenceStore::load(&path);
        assert_eq!(store.next(), 1);
        assert_eq!(store.next(), 2);
    }

    #[test]
    fn test_in_memory() {
        let store = SequenceStore::in_memory(10);
        assert!(store.path().is_none());
        assert_eq!(store.next(), 11);
    }
}
