//! Rule file reader.
//!
//! On the device the data partition (LittleFS) is mounted under `root`
//! by the VFS layer; on the host `root` is any directory.  Either way
//! `std::fs` does the work.

use std::io::ErrorKind;
use std::path::PathBuf;

use log::debug;

use crate::app::ports::{RuleSource, StorageError};

/// Largest rule file accepted.
pub const MAX_RULES_BYTES: u64 = 64 * 1024;

pub struct FsRuleSource {
    root: PathBuf,
}

impl FsRuleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl RuleSource for FsRuleSource {
    fn read_rules(&self, path: &str) -> Result<String, StorageError> {
        let full = self.resolve(path);
        let meta = std::fs::metadata(&full).map_err(map_io)?;
        if meta.len() > MAX_RULES_BYTES {
            return Err(StorageError::Full);
        }
        let bytes = std::fs::read(&full).map_err(map_io)?;
        debug!("FsRuleSource: read {} bytes from {}", bytes.len(), full.display());
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidText)
    }
}

fn map_io(e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::IoError,
    }
}
