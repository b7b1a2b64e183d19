//! Atomic file write using the write-rename pattern.
//!
//! Data goes to `{path}.tmp` first, is flushed with `sync_all()`, then the
//! temp file is renamed over the final path. A crash mid-write leaves the
//! previous slot file intact; the stray `.tmp` is picked up by crash recovery.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling path with `suffix` appended to the full file name.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Atomically writes `data` to `path`, creating parent directories as needed.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = with_suffix(path, ".tmp");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&tmp_path, path)?;
    Ok(())
}
