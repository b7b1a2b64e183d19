//! Save/load persistence for level-based games.
//!
//! A [`PersistCoordinator`] tracks the state of every level the player has
//! visited, records destruction of placed objects, writes save slots with a
//! header-only info section for load screens, and restores levels as they
//! stream back in. The game supplies a [`Host`] adapter and drives the
//! coordinator either directly or through [`PersistPlugin`].

mod atomic_write;
pub mod coordinator;
pub mod crash_recovery;
mod destroyed_ledger;
pub mod file_header;
pub mod global_registry;
pub mod host;
mod level_events;
mod load_game;
pub mod notifications;
pub mod persist_config;
pub mod persist_error;
pub mod persist_plugin;
mod save_game;
pub mod save_info;
pub mod save_state;
pub mod save_storage;
pub mod screenshot;
pub mod slot_manager;
pub mod state_store;
pub mod streaming_restore;
pub mod system_mode;
pub mod upgrade;

#[cfg(test)]
mod test_host;

pub use atomic_write::atomic_write;
pub use coordinator::{PersistCoordinator, StreamingDispatcher};
pub use crash_recovery::{perform_crash_recovery_scan, CrashRecoveryState};
pub use host::{CaptureHandle, CapturedFrame, Host, ObjectClassifier, ObjectSnapshot};
pub use level_events::StreamingVisibility;
pub use notifications::PersistEvent;
pub use persist_config::PersistConfig;
pub use persist_error::PersistError;
pub use persist_plugin::{
    persistence_idle, HostNotification, PersistHost, PersistPlugin, PersistRequest,
    StorageBackend, UpgradeFinished, UpgradeJobs,
};
pub use save_info::{CustomSaveInfo, CustomValue, SaveGameInfo, SaveInfo, SaveSorting};
pub use save_state::SaveState;
pub use save_storage::{FileSaveStorage, MemorySaveStorage, SaveStorage};
pub use slot_manager::{SaveSlotManager, AUTO_SAVE_SLOT, QUICK_SAVE_SLOT};
pub use state_store::{StateFactory, StateStore};
pub use system_mode::SystemMode;
pub use upgrade::{UpgradeCallback, UpgradeHandle, UpgradeJob, UpgradeReport};
