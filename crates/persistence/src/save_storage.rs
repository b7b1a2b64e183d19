// ---------------------------------------------------------------------------
// save_storage – Slot-addressed blob storage backends
// ---------------------------------------------------------------------------
//
// The coordinator, slot manager and upgrade job only ever see slots by name.
// `FileSaveStorage` maps a slot to `<dir>/<slot>.sav`; `MemorySaveStorage`
// is shaped like a platform save API (opaque slot-keyed blobs).

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::atomic_write::{atomic_write, with_suffix};
use crate::persist_error::PersistError;

/// File extension for slot files.
pub const SAVE_EXTENSION: &str = "sav";

/// Suffix appended to a slot file for its upgrade backup.
pub const BACKUP_SUFFIX: &str = ".bak";

pub trait SaveStorage: Send + Sync {
    /// Names of every stored slot, in no particular order.
    fn list_slots(&self) -> Result<Vec<String>, PersistError>;

    /// Streaming reader over a slot, for header-only reads.
    fn open_slot(&self, slot: &str) -> Result<Box<dyn Read + Send>, PersistError>;

    fn read_slot(&self, slot: &str) -> Result<Vec<u8>, PersistError> {
        let mut reader = self.open_slot(slot)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn write_slot(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistError>;

    fn delete_slot(&self, slot: &str) -> Result<(), PersistError>;

    /// Move the slot's current contents to its backup, replacing any older
    /// backup. The slot itself no longer exists afterwards.
    fn backup_slot(&self, slot: &str) -> Result<(), PersistError>;

    /// File-system path of a slot, for backends that have one.
    fn slot_path(&self, _slot: &str) -> Option<PathBuf> {
        None
    }
}

fn not_found(slot: &str, e: std::io::Error) -> PersistError {
    if e.kind() == ErrorKind::NotFound {
        PersistError::SlotNotFound(slot.to_string())
    } else {
        PersistError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// File system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSaveStorage {
    dir: PathBuf,
}

impl FileSaveStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<slot>.sav`
    pub fn path_for(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.{SAVE_EXTENSION}"))
    }
}

impl SaveStorage for FileSaveStorage {
    fn list_slots(&self) -> Result<Vec<String>, PersistError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut slots = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SAVE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slots.push(stem.to_string());
            }
        }
        Ok(slots)
    }

    fn open_slot(&self, slot: &str) -> Result<Box<dyn Read + Send>, PersistError> {
        let file = fs::File::open(self.path_for(slot)).map_err(|e| not_found(slot, e))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }

    fn read_slot(&self, slot: &str) -> Result<Vec<u8>, PersistError> {
        fs::read(self.path_for(slot)).map_err(|e| not_found(slot, e))
    }

    fn write_slot(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistError> {
        atomic_write(&self.path_for(slot), bytes)?;
        Ok(())
    }

    fn delete_slot(&self, slot: &str) -> Result<(), PersistError> {
        fs::remove_file(self.path_for(slot)).map_err(|e| not_found(slot, e))
    }

    fn backup_slot(&self, slot: &str) -> Result<(), PersistError> {
        let path = self.path_for(slot);
        let backup = with_suffix(&path, BACKUP_SUFFIX);
        match fs::remove_file(&backup) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&path, &backup).map_err(|e| not_found(slot, e))
    }

    fn slot_path(&self, slot: &str) -> Option<PathBuf> {
        Some(self.path_for(slot))
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySaveStorage {
    slots: Mutex<BTreeMap<String, Vec<u8>>>,
    backups: Mutex<BTreeMap<String, Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemorySaveStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backup(&self, slot: &str) -> Option<Vec<u8>> {
        lock(&self.backups).get(slot).cloned()
    }
}

impl SaveStorage for MemorySaveStorage {
    fn list_slots(&self) -> Result<Vec<String>, PersistError> {
        Ok(lock(&self.slots).keys().cloned().collect())
    }

    fn open_slot(&self, slot: &str) -> Result<Box<dyn Read + Send>, PersistError> {
        Ok(Box::new(Cursor::new(self.read_slot(slot)?)))
    }

    fn read_slot(&self, slot: &str) -> Result<Vec<u8>, PersistError> {
        lock(&self.slots)
            .get(slot)
            .cloned()
            .ok_or_else(|| PersistError::SlotNotFound(slot.to_string()))
    }

    fn write_slot(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistError> {
        lock(&self.slots).insert(slot.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete_slot(&self, slot: &str) -> Result<(), PersistError> {
        lock(&self.slots)
            .remove(slot)
            .map(|_| ())
            .ok_or_else(|| PersistError::SlotNotFound(slot.to_string()))
    }

    fn backup_slot(&self, slot: &str) -> Result<(), PersistError> {
        let bytes = lock(&self.slots)
            .remove(slot)
            .ok_or_else(|| PersistError::SlotNotFound(slot.to_string()))?;
        lock(&self.backups).insert(slot.to_string(), bytes);
        Ok(())
    }
}
