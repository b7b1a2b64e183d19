//! Crash recovery detection for file-backed save directories.
//!
//! On startup, leftover `.tmp` files from interrupted atomic writes are
//! removed and every `.sav` slot is validated through its file header
//! checksum. The newest valid slot (by header timestamp) is reported so the
//! game can offer to continue from it.
//!
//! The `CrashRecoveryState` resource indicates whether recovery is needed
//! and, if so, which slot to recover from.

use std::path::{Path, PathBuf};

use bevy::prelude::*;

use crate::file_header::{unwrap_header, FileHeader};
use crate::persist_error::PersistError;
use crate::save_storage::SAVE_EXTENSION;

// =============================================================================
// Resources
// =============================================================================

#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct CrashRecoveryState {
    /// Whether crash artifacts (`.tmp` files) were found on startup.
    pub detected: bool,
    /// Newest slot whose header and checksum validate.
    pub recovery_slot: Option<String>,
    pub recovery_path: Option<PathBuf>,
    /// Number of `.tmp` files that were cleaned up.
    pub tmp_files_cleaned: usize,
    /// Slots that failed validation.
    pub corrupted_slots: Vec<String>,
}

// =============================================================================
// Core Logic
// =============================================================================

/// Leftover `*.tmp` files directly inside `dir`.
pub(crate) fn find_tmp_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut tmp_files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tmp"))
        .collect();
    tmp_files.sort();
    tmp_files
}

/// Removes all `.tmp` files from the list, logging each removal.
///
/// Returns the number of files successfully removed.
pub(crate) fn clean_tmp_files(tmp_files: &[PathBuf]) -> usize {
    let mut cleaned = 0;
    for path in tmp_files {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Crash recovery: cleaned up tmp file: {}", path.display());
                cleaned += 1;
            }
            Err(e) => {
                warn!(
                    "Crash recovery: failed to remove tmp file {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
    cleaned
}

/// Read a save file and verify its header and checksum.
pub(crate) fn validate_save_file(path: &Path) -> Result<FileHeader, PersistError> {
    let bytes = std::fs::read(path)?;
    Ok(unwrap_header(&bytes)?.header)
}

/// Validates every slot in `dir`. Returns the newest valid slot and the
/// names of the corrupted ones.
pub(crate) fn find_valid_slot(dir: &Path) -> (Option<(String, PathBuf)>, Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (None, Vec::new());
    };
    let mut newest: Option<(u64, String, PathBuf)> = None;
    let mut corrupted = Vec::new();

    for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
        if path.extension().and_then(|e| e.to_str()) != Some(SAVE_EXTENSION) {
            continue;
        }
        let Some(slot) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        match validate_save_file(&path) {
            Ok(header) => {
                let is_newer = newest
                    .as_ref()
                    .map_or(true, |(ts, name, _)| (header.timestamp, &slot) > (*ts, name));
                if is_newer {
                    newest = Some((header.timestamp, slot, path));
                }
            }
            Err(e) => {
                warn!("Crash recovery: slot {slot} is corrupted: {e}");
                corrupted.push(slot);
            }
        }
    }

    corrupted.sort();
    (newest.map(|(_, slot, path)| (slot, path)), corrupted)
}

/// Full scan: clean `.tmp` files, then validate every slot.
pub fn perform_crash_recovery_scan(dir: &Path) -> CrashRecoveryState {
    let tmp_files = find_tmp_files(dir);
    let detected = !tmp_files.is_empty();
    let tmp_files_cleaned = clean_tmp_files(&tmp_files);
    if detected {
        info!(
            "Crash recovery: detected {} tmp file(s), scanning saves...",
            tmp_files.len()
        );
    }

    let (recovery, corrupted_slots) = find_valid_slot(dir);
    if detected {
        match &recovery {
            Some((slot, _)) => info!("Crash recovery: recovery available from {slot}"),
            None => warn!("Crash recovery: no valid save found for recovery"),
        }
    }

    let (recovery_slot, recovery_path) = recovery.unzip();
    CrashRecoveryState {
        detected,
        recovery_slot,
        recovery_path,
        tmp_files_cleaned,
        corrupted_slots,
    }
}

// =============================================================================
// Bevy Systems
// =============================================================================

/// Startup system: scans the configured save directory and replaces the
/// default `CrashRecoveryState`.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn crash_recovery_startup(
    mut commands: Commands,
    coordinator: Res<crate::PersistCoordinator>,
) {
    let state = perform_crash_recovery_scan(&coordinator.config().save_directory);
    commands.insert_resource(state);
}

// =============================================================================
// Tests
// =============================================================================
