//! Atomic JSON file replacement.
//!
//! A crash mid-write must never leave a truncated file behind: the value
//! is serialized to a sibling temp file, fsynced, and renamed over the
//! target. The temp file is a scoped resource, removed on every failure
//! path.

use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Removes the temp file on drop unless the rename succeeded.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;

    let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
    let mut guard = TempGuard::new(temp_path.clone());

    let mut file = File::create(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;
    guard.disarm();
    Ok(())
}
