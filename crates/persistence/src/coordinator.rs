//! The persistence coordinator.
//!
//! One `PersistCoordinator` owns the mode, the active state store and all
//! bookkeeping. Every host notification and every public operation runs on
//! the main context with `&mut self`; the only things that cross contexts are
//! the deferred-work sender (see [`StreamingDispatcher`]) and upgrade jobs.
//!
//! Entry points are split by concern:
//! - `save_game.rs`: save, screenshot completion, quick/auto save
//! - `load_game.rs`: load, quick/latest load, post-load restore
//! - `level_events.rs`: map travel, streaming visibility, destruction, `pump`

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bevy::ecs::entity::Entity;
use bevy::log::{info, warn};
use bevy::prelude::Resource;

use crate::destroyed_ledger::DestructionHooks;
use crate::global_registry::GlobalObjectRegistry;
use crate::host::Host;
use crate::notifications::PersistEvent;
use crate::persist_config::PersistConfig;
use crate::persist_error::PersistError;
use crate::save_info::{CustomSaveInfo, SaveGameInfo, SaveSorting};
use crate::save_state::SaveState;
use crate::save_storage::{FileSaveStorage, SaveStorage};
use crate::screenshot::SaveOperationContext;
use crate::slot_manager::{SaveSlotManager, AUTO_SAVE_SLOT, QUICK_SAVE_SLOT};
use crate::state_store::{StateFactory, StateStore};
use crate::streaming_restore::StreamingRestoreState;
use crate::system_mode::{ModeContext, SystemMode};
use crate::upgrade::{UpgradeCallback, UpgradeHandle, UpgradeJob};

/// Work that must run on the main context, queued from anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeferredWork {
    /// A streamed level with saved data became visible; restore it.
    RestoreStreamingLevel(String),
    /// The host loaded a level outside of the streaming notifications.
    LevelLoadedExternally(String),
}

/// Cloneable, thread-safe handle for queueing streaming work onto the
/// coordinator. Work is executed by the next [`PersistCoordinator::pump`].
#[derive(Debug, Clone)]
pub struct StreamingDispatcher {
    tx: flume::Sender<DeferredWork>,
}

impl StreamingDispatcher {
    pub fn notify_level_loaded(&self, level: &str) {
        if self
            .tx
            .send(DeferredWork::LevelLoadedExternally(level.to_string()))
            .is_err()
        {
            warn!("Persistence coordinator is gone, dropping load notification for {level}");
        }
    }
}

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Save timestamp in Unix epoch milliseconds. Strictly increasing within the
/// process, so back-to-back saves still order by recency.
pub(crate) fn now_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

fn fresh_state(factory: &StateFactory, version: u32) -> Box<dyn StateStore> {
    let mut state = factory();
    state.set_user_data_model_version(version);
    state
}

#[derive(Resource)]
pub struct PersistCoordinator {
    pub(crate) config: PersistConfig,
    pub(crate) mode: ModeContext,
    pub(crate) state: Option<Box<dyn StateStore>>,
    pub(crate) factory: StateFactory,
    pub(crate) slots: SaveSlotManager,
    pub(crate) storage: Option<Arc<dyn SaveStorage>>,
    pub(crate) globals: GlobalObjectRegistry,
    pub(crate) hooks: DestructionHooks,
    pub(crate) streaming: StreamingRestoreState,
    pub(crate) pending_save: Option<SaveOperationContext>,
    pub(crate) slot_in_progress: Option<String>,
    pub(crate) deferred_tx: flume::Sender<DeferredWork>,
    pub(crate) deferred_rx: flume::Receiver<DeferredWork>,
    pub(crate) events: Vec<PersistEvent>,
}

impl PersistCoordinator {
    pub fn new(
        config: PersistConfig,
        storage: Option<Arc<dyn SaveStorage>>,
        factory: StateFactory,
    ) -> Self {
        let (deferred_tx, deferred_rx) = flume::unbounded();
        Self {
            config,
            mode: ModeContext::default(),
            state: None,
            factory,
            slots: SaveSlotManager::new(storage.clone()),
            storage,
            globals: GlobalObjectRegistry::default(),
            hooks: DestructionHooks::default(),
            streaming: StreamingRestoreState::default(),
            pending_save: None,
            slot_in_progress: None,
            deferred_tx,
            deferred_rx,
            events: Vec::new(),
        }
    }

    /// File-backed coordinator using `config.save_directory` and [`SaveState`].
    pub fn with_file_storage(config: PersistConfig) -> Self {
        let storage: Arc<dyn SaveStorage> =
            Arc::new(FileSaveStorage::new(config.save_directory.clone()));
        let factory = SaveState::factory(config.user_data_model_version);
        Self::new(config, Some(storage), factory)
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn mode(&self) -> SystemMode {
        self.mode.mode()
    }

    /// True while saved data is being applied to the world.
    pub fn is_restoring(&self) -> bool {
        self.mode.is_restoring()
    }

    pub fn is_idle(&self) -> bool {
        self.mode.mode() == SystemMode::RunningIdle
    }

    pub fn active_state(&self) -> Option<&dyn StateStore> {
        self.state.as_deref()
    }

    /// The active state, created on first use.
    pub(crate) fn state_mut(&mut self) -> &mut dyn StateStore {
        let version = self.config.user_data_model_version;
        let factory = &self.factory;
        self.state
            .get_or_insert_with(|| fresh_state(factory, version))
            .as_mut()
    }

    /// A new, empty state stamped with the configured data-model version.
    pub(crate) fn new_state(&self) -> Box<dyn StateStore> {
        fresh_state(&self.factory, self.config.user_data_model_version)
    }

    pub(crate) fn emit(&mut self, event: PersistEvent) {
        self.events.push(event);
    }

    /// Take every notification emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<PersistEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn streaming_dispatcher(&self) -> StreamingDispatcher {
        StreamingDispatcher {
            tx: self.deferred_tx.clone(),
        }
    }

    pub(crate) fn ensure_enabled(&self) -> Result<(), PersistError> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(PersistError::Disabled)
        }
    }

    pub(crate) fn require_storage(&self) -> Result<Arc<dyn SaveStorage>, PersistError> {
        self.storage.clone().ok_or(PersistError::StorageUnavailable)
    }

    // -----------------------------------------------------------------------
    // Game lifecycle
    // -----------------------------------------------------------------------

    /// Start tracking a new game. With `defer_to_next_level`, hooks are only
    /// installed once the next map finishes loading, so levels about to be
    /// discarded never record destructions.
    pub fn new_game(&mut self, host: &dyn Host, defer_to_next_level: bool) -> Result<(), PersistError> {
        self.ensure_enabled()?;
        self.end_game();
        self.mode.start_new_game(defer_to_next_level);
        if !defer_to_next_level {
            self.hooks.subscribe_loaded(host);
        }
        info!(
            "New game started (mode {:?})",
            self.mode.mode()
        );
        Ok(())
    }

    /// Drop the active state and all hooks, back to `Disabled`.
    pub fn end_game(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.reset_state();
        }
        self.state = None;
        self.hooks.unsubscribe_all();
        self.streaming.clear();
        self.pending_save = None;
        self.slot_in_progress = None;
        self.deferred_rx.drain().for_each(drop);
        self.mode.end_game();
    }

    /// Escape hatch: back to `RunningIdle` with no restore in progress.
    pub fn force_reset(&mut self) {
        if self.mode.mode() != SystemMode::RunningIdle {
            warn!("Forcing persistence reset from {:?}", self.mode.mode());
        }
        self.mode.force_reset();
    }

    /// Shutdown: level unloads from here on are not stored.
    pub fn teardown(&mut self) {
        self.mode.begin_teardown();
    }

    // -----------------------------------------------------------------------
    // Global objects
    // -----------------------------------------------------------------------

    pub fn add_global(&mut self, object: Entity) {
        self.globals.add(object);
    }

    pub fn add_global_named(&mut self, object: Entity, name: &str) {
        self.globals.add_named(name, object);
    }

    pub fn remove_global(&mut self, object: Entity) {
        self.globals.remove(object);
    }

    pub fn globals(&self) -> &GlobalObjectRegistry {
        &self.globals
    }

    pub(crate) fn store_globals(&mut self, host: &dyn Host) {
        let anonymous = self.globals.live_anonymous(host);
        let named = self.globals.live_named(host);
        let state = self.state_mut();
        state.store_world_globals(host);
        for object in anonymous {
            state.store_global_object(host, object, None);
        }
        for (name, object) in named {
            state.store_global_object(host, object, Some(&name));
        }
    }

    pub(crate) fn restore_globals(&mut self, host: &mut dyn Host) {
        let anonymous = self.globals.live_anonymous(host);
        let named = self.globals.live_named(host);
        let state = self.state_mut();
        for object in anonymous {
            state.restore_global_object(host, object, None);
        }
        for (name, object) in named {
            state.restore_global_object(host, object, Some(&name));
        }
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    pub fn save_game_list(
        &self,
        include_quick_save: bool,
        include_auto_save: bool,
        sorting: SaveSorting,
    ) -> Result<Vec<SaveGameInfo>, PersistError> {
        self.ensure_enabled()?;
        self.slots
            .save_game_list(include_quick_save, include_auto_save, sorting)
    }

    pub fn save_game_info(&self, slot: &str) -> Result<SaveGameInfo, PersistError> {
        self.ensure_enabled()?;
        self.slots.save_game_info(slot)
    }

    pub fn latest_save_game(&self) -> Result<Option<SaveGameInfo>, PersistError> {
        self.ensure_enabled()?;
        self.slots.latest_save_game()
    }

    pub fn quick_save_game_info(&self) -> Result<SaveGameInfo, PersistError> {
        self.save_game_info(QUICK_SAVE_SLOT)
    }

    pub fn auto_save_game_info(&self) -> Result<SaveGameInfo, PersistError> {
        self.save_game_info(AUTO_SAVE_SLOT)
    }

    pub fn delete_save(&self, slot: &str) -> Result<(), PersistError> {
        self.ensure_enabled()?;
        self.slots.delete_save(slot)
    }

    pub fn slot_path(&self, slot: &str) -> Option<PathBuf> {
        self.slots.slot_path(slot)
    }

    pub fn create_custom_save_info(&self) -> CustomSaveInfo {
        CustomSaveInfo::new()
    }

    // -----------------------------------------------------------------------
    // State queries
    // -----------------------------------------------------------------------

    pub fn can_restore_level(&self, level: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.can_restore_level(level))
    }

    pub fn can_restore_world(&self, host: &dyn Host) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.can_restore_world(host))
    }

    pub fn is_streamed_level_restoring(&self, level: &str) -> bool {
        self.streaming.is_restoring(level)
    }

    pub fn streaming_restore_state(&self) -> &StreamingRestoreState {
        &self.streaming
    }

    pub fn clear_level_state(&mut self, level: &str) {
        if let Some(state) = self.state.as_mut() {
            state.clear_level(level);
        }
    }

    pub fn user_data_model_version(&self) -> u32 {
        self.config.user_data_model_version
    }

    pub fn set_user_data_model_version(&mut self, version: u32) {
        self.config.user_data_model_version = version;
        if let Some(state) = self.state.as_mut() {
            state.set_user_data_model_version(version);
        }
    }

    // -----------------------------------------------------------------------
    // Upgrades
    // -----------------------------------------------------------------------

    /// Rewrite every slot whose data model is older than the current version
    /// (or every slot, with `upgrade_always`) on the async compute pool.
    pub fn upgrade_all_save_games(
        &self,
        upgrade_always: bool,
        callback: UpgradeCallback,
    ) -> Result<UpgradeHandle, PersistError> {
        self.ensure_enabled()?;
        let job = UpgradeJob::new(
            upgrade_always,
            self.config.user_data_model_version,
            callback,
            self.require_storage()?,
            Arc::clone(&self.factory),
        );
        info!("Starting save game upgrade");
        Ok(job.spawn())
    }
}
