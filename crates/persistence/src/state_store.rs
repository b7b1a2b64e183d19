//! The state store contract: the in-memory save state the coordinator drives.
//!
//! The coordinator decides *when* to store or restore; a `StateStore` decides
//! *how* objects become bytes. [`crate::SaveState`] is the default
//! implementation, hosts may plug in their own through a [`StateFactory`].

use std::sync::Arc;

use bevy::ecs::entity::Entity;

use crate::host::Host;
use crate::persist_error::PersistError;
use crate::save_info::CustomSaveInfo;

pub trait StateStore: Send + Sync {
    /// Record world-level globals (the persistent level name).
    fn store_world_globals(&mut self, host: &dyn Host);

    /// Serialize one registered global object. `name` selects the named slot,
    /// `None` stores it among the anonymous globals.
    fn store_global_object(&mut self, host: &dyn Host, object: Entity, name: Option<&str>);

    /// Apply a stored global record to `object`. Returns false when nothing
    /// was stored for it.
    fn restore_global_object(&mut self, host: &mut dyn Host, object: Entity, name: Option<&str>)
        -> bool;

    /// Serialize every persistent object of `level`. With `release` the
    /// decoded section is paged out afterwards (now when `blocking`, else on
    /// the next [`StateStore::flush_pending_releases`]).
    fn store_level(
        &mut self,
        host: &dyn Host,
        level: &str,
        release: bool,
        blocking: bool,
    ) -> Result<(), PersistError>;

    /// Apply stored data to the objects of a loaded level. Fails with
    /// `NoSavedDataForLevel` when nothing was stored for it.
    fn restore_level(&mut self, host: &mut dyn Host, level: &str) -> Result<(), PersistError>;

    /// Restore every loaded level that has stored data. Returns the number of
    /// levels restored.
    fn restore_loaded_world(&mut self, host: &mut dyn Host) -> Result<usize, PersistError>;

    /// Restore a single object from its level's section. False if no record.
    fn restore_object(&mut self, host: &mut dyn Host, object: Entity) -> bool;

    /// Add `object_name` to the destroyed ledger of `level`.
    fn store_level_object_destroyed(&mut self, level: &str, object_name: &str);

    /// Page out the decoded section of `level`, keeping its stored data.
    fn release_level_data(&mut self, level: &str, blocking: bool);

    /// Complete non-blocking releases queued by `store_level`/`release_level_data`.
    fn flush_pending_releases(&mut self);

    /// Forget all stored data for `level`.
    fn clear_level(&mut self, level: &str);

    fn can_restore_level(&self, level: &str) -> bool;

    /// True when saved data exists for the map the host currently has loaded.
    fn can_restore_world(&self, host: &dyn Host) -> bool;

    /// Persistent level recorded by the last `store_world_globals` or load.
    fn persistent_level(&self) -> Option<&str>;

    /// Drop everything: globals, levels, header info.
    fn reset_state(&mut self);

    fn set_title(&mut self, title: &str);
    fn set_timestamp(&mut self, timestamp: u64);
    fn set_custom_save_info(&mut self, custom: Option<CustomSaveInfo>);
    fn set_screenshot(&mut self, png: Option<Vec<u8>>);

    /// Write the complete save file (header, info, payload).
    fn save_to_bytes(&mut self) -> Result<Vec<u8>, PersistError>;

    /// Replace the current state with a save file. Levels stay compressed
    /// until first use unless `load_all_levels` is set.
    fn load_from_bytes(&mut self, bytes: &[u8], load_all_levels: bool) -> Result<(), PersistError>;

    /// True when the global section or any level section carries a user
    /// data-model version older than `current`.
    fn is_user_data_model_outdated(&self, current: u32) -> bool;

    /// Version stamped into sections written from now on.
    fn set_user_data_model_version(&mut self, version: u32);

    /// Stamp every section already held with `version`.
    fn mark_user_data_model_current(&mut self, version: u32);
}

/// Builds a fresh, empty state store. Called on new game, on load and by the
/// upgrade job (once per file).
pub type StateFactory = Arc<dyn Fn() -> Box<dyn StateStore> + Send + Sync>;
