// ---------------------------------------------------------------------------
// slot_manager – Save slot listing, header reads, deletion
// ---------------------------------------------------------------------------

use std::path::PathBuf;
use std::sync::Arc;

use bevy::log::warn;

use crate::file_header::read_header_and_info;
use crate::persist_error::PersistError;
use crate::save_info::{sort_save_list, SaveGameInfo, SaveInfo, SaveSorting};
use crate::save_storage::SaveStorage;

/// Reserved slot used by quick save / quick load.
pub const QUICK_SAVE_SLOT: &str = "QuickSave";
/// Reserved slot used by auto save.
pub const AUTO_SAVE_SLOT: &str = "AutoSave";

pub fn is_quick_save(slot: &str) -> bool {
    slot == QUICK_SAVE_SLOT
}

pub fn is_auto_save(slot: &str) -> bool {
    slot == AUTO_SAVE_SLOT
}

/// Read-only view over the configured storage backend.
#[derive(Clone, Default)]
pub struct SaveSlotManager {
    storage: Option<Arc<dyn SaveStorage>>,
}

impl SaveSlotManager {
    pub fn new(storage: Option<Arc<dyn SaveStorage>>) -> Self {
        Self { storage }
    }

    fn storage(&self) -> Result<&Arc<dyn SaveStorage>, PersistError> {
        self.storage.as_ref().ok_or(PersistError::StorageUnavailable)
    }

    /// Header-only read of one slot.
    pub fn save_game_info(&self, slot: &str) -> Result<SaveGameInfo, PersistError> {
        if slot.is_empty() {
            return Err(PersistError::InvalidSlotName);
        }
        let mut reader = self.storage()?.open_slot(slot)?;
        let (_, info) = read_header_and_info(&mut *reader)?;
        let info = SaveInfo::decode(&info)?;
        Ok(SaveGameInfo::from_info(slot, info))
    }

    /// Every readable slot, optionally without the reserved ones. Slots whose
    /// header cannot be read are logged and left out.
    pub fn save_game_list(
        &self,
        include_quick_save: bool,
        include_auto_save: bool,
        sorting: SaveSorting,
    ) -> Result<Vec<SaveGameInfo>, PersistError> {
        let slots = self.storage()?.list_slots()?;
        let mut list = Vec::with_capacity(slots.len());
        for slot in slots {
            if (!include_quick_save && is_quick_save(&slot))
                || (!include_auto_save && is_auto_save(&slot))
            {
                continue;
            }
            match self.save_game_info(&slot) {
                Ok(info) => list.push(info),
                Err(e) => warn!("Skipping unreadable save slot {slot}: {e}"),
            }
        }
        sort_save_list(&mut list, sorting);
        Ok(list)
    }

    /// Most recent slot, reserved slots included.
    pub fn latest_save_game(&self) -> Result<Option<SaveGameInfo>, PersistError> {
        Ok(self
            .save_game_list(true, true, SaveSorting::MostRecent)?
            .into_iter()
            .next())
    }

    pub fn delete_save(&self, slot: &str) -> Result<(), PersistError> {
        if slot.is_empty() {
            return Err(PersistError::InvalidSlotName);
        }
        self.storage()?.delete_slot(slot)
    }

    pub fn slot_path(&self, slot: &str) -> Option<PathBuf> {
        self.storage.as_ref()?.slot_path(slot)
    }
}
