// ---------------------------------------------------------------------------
// PersistError: error types for save/load orchestration
// ---------------------------------------------------------------------------

use std::fmt;

use crate::system_mode::SystemMode;

/// Errors reported by the persistence coordinator and its collaborators.
///
/// None of these are fatal: every save/load entry point converts them into a
/// completion notification (`success = false`) and returns the system to
/// `RunningIdle`. The `Result` just tells the caller why.
#[derive(Debug)]
pub enum PersistError {
    /// A save or load is already running; overlapping calls are rejected.
    OperationAlreadyInProgress { mode: SystemMode },
    /// The slot name was empty.
    InvalidSlotName,
    /// No save storage backend is configured.
    StorageUnavailable,
    /// Persistence is switched off in `PersistConfig`.
    Disabled,
    /// I/O error from the storage backend.
    Io(std::io::Error),
    /// Encoding or decoding of save data failed (corrupt file, bad checksum).
    Serialization(String),
    /// Save data was written by a newer build.
    VersionMismatch { expected_max: u32, found: u32 },
    /// The requested slot does not exist.
    SlotNotFound(String),
    /// Restore requested for a level with no saved data. A skip, not a failure.
    NoSavedDataForLevel(String),
}

impl PersistError {
    /// True for the "nothing to restore" signal, which callers treat as a no-op.
    pub fn is_skip(&self) -> bool {
        matches!(self, PersistError::NoSavedDataForLevel(_))
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::OperationAlreadyInProgress { mode } => {
                write!(f, "Save/load already in progress (mode: {mode:?})")
            }
            PersistError::InvalidSlotName => write!(f, "Slot name must not be empty"),
            PersistError::StorageUnavailable => write!(f, "No save storage backend available"),
            PersistError::Disabled => write!(f, "Persistence is disabled"),
            PersistError::Io(e) => write!(f, "I/O error: {e}"),
            PersistError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            PersistError::VersionMismatch {
                expected_max,
                found,
            } => write!(
                f,
                "Version mismatch: save is v{found}, but this build only supports up to v{expected_max}"
            ),
            PersistError::SlotNotFound(slot) => write!(f, "Save slot not found: {slot}"),
            PersistError::NoSavedDataForLevel(level) => {
                write!(f, "No saved data for level {level}")
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}

impl From<bitcode::Error> for PersistError {
    fn from(e: bitcode::Error) -> Self {
        PersistError::Serialization(e.to_string())
    }
}

impl From<lz4_flex::block::DecompressError> for PersistError {
    fn from(e: lz4_flex::block::DecompressError) -> Self {
        PersistError::Serialization(format!("level data decompression failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_in_progress_mentions_mode() {
        let err = PersistError::OperationAlreadyInProgress {
            mode: SystemMode::SavingGame,
        };
        let msg = format!("{err}");
        assert!(msg.contains("already in progress"), "got: {msg}");
        assert!(msg.contains("SavingGame"), "got: {msg}");
    }

    #[test]
    fn test_display_version_mismatch() {
        let err = PersistError::VersionMismatch {
            expected_max: 2,
            found: 7,
        };
        let msg = format!("{err}");
        assert!(msg.contains("v7"), "got: {msg}");
        assert!(msg.contains("v2"), "got: {msg}");
    }

    #[test]
    fn test_from_io_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PersistError = io_err.into();
        assert!(matches!(err, PersistError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_no_saved_data_is_skip() {
        assert!(PersistError::NoSavedDataForLevel("Cave".into()).is_skip());
        assert!(!PersistError::SlotNotFound("slot1".into()).is_skip());
    }
}
