use bevy::prelude::*;

use crate::coordinator::PersistCoordinator;
use crate::host::{CaptureHandle, CapturedFrame, Host};
use crate::notifications::PersistEvent;
use crate::persist_config::PersistConfig;
use crate::persist_error::PersistError;
use crate::save_info::CustomSaveInfo;
use crate::save_state::SaveState;
use crate::save_storage::MemorySaveStorage;
use crate::upgrade::{UpgradeCallback, UpgradeHandle, UpgradeReport};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The host adapter the coordinator drives. Inserted by the game; requests
/// and notifications sent while it is missing are dropped.
#[derive(Resource)]
pub struct PersistHost(pub Box<dyn Host + Send + Sync>);

/// Upgrade jobs in flight, polled once per frame.
#[derive(Resource, Default)]
pub struct UpgradeJobs {
    handles: Vec<UpgradeHandle>,
}

impl UpgradeJobs {
    /// Start `upgrade_all_save_games` and track the job.
    pub fn start(
        &mut self,
        coordinator: &PersistCoordinator,
        upgrade_always: bool,
        callback: UpgradeCallback,
    ) -> Result<(), PersistError> {
        let handle = coordinator.upgrade_all_save_games(upgrade_always, callback)?;
        self.handles.push(handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle notifications from the host, forwarded to the coordinator's
/// `on_*` methods.
#[derive(Event, Debug, Clone)]
pub enum HostNotification {
    PreLoadMap { map: String },
    SeamlessTravelStart { map: String },
    PostLoadMap,
    LevelBecomingVisible { level: String },
    LevelBecomingInvisible { level: String },
    LevelLoadedExternally { level: String },
    LevelUnloadedExternally { level: String },
    ObjectDestroyed { object: Entity },
    ScreenshotCaptured {
        capture: CaptureHandle,
        frame: CapturedFrame,
    },
}

/// Operations requested by game code. Outcomes arrive as `PersistEvent`s.
#[derive(Event, Debug, Clone)]
pub enum PersistRequest {
    NewGame {
        defer_to_next_level: bool,
    },
    EndGame,
    Save {
        slot: String,
        title: String,
        take_screenshot: bool,
        custom: Option<CustomSaveInfo>,
    },
    QuickSave {
        take_screenshot: bool,
    },
    AutoSave {
        take_screenshot: bool,
    },
    Load {
        slot: String,
        auto_travel: bool,
        travel_options: String,
    },
    QuickLoad,
    LoadLatest,
    DeleteSave {
        slot: String,
    },
    MarkObjectDestroyed {
        object: Entity,
    },
    ClearLevelState {
        level: String,
    },
    ForceReset,
    Teardown,
}

#[derive(Event, Debug, Clone)]
pub struct UpgradeFinished {
    pub report: UpgradeReport,
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// `<save_directory>/<slot>.sav`, scanned for crash artifacts on startup.
    File,
    Memory,
}

pub struct PersistPlugin {
    pub config: PersistConfig,
    pub backend: StorageBackend,
}

impl PersistPlugin {
    pub fn new(config: PersistConfig) -> Self {
        Self {
            config,
            backend: StorageBackend::File,
        }
    }

    pub fn in_memory(config: PersistConfig) -> Self {
        Self {
            config,
            backend: StorageBackend::Memory,
        }
    }

    fn coordinator(&self) -> PersistCoordinator {
        match self.backend {
            StorageBackend::File => PersistCoordinator::with_file_storage(self.config.clone()),
            StorageBackend::Memory => PersistCoordinator::new(
                self.config.clone(),
                Some(std::sync::Arc::new(MemorySaveStorage::new())),
                SaveState::factory(self.config.user_data_model_version),
            ),
        }
    }
}

impl Plugin for PersistPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<HostNotification>()
            .add_event::<PersistRequest>()
            .add_event::<PersistEvent>()
            .add_event::<UpgradeFinished>()
            .insert_resource(self.coordinator())
            .init_resource::<UpgradeJobs>()
            .init_resource::<crate::crash_recovery::CrashRecoveryState>();

        app.add_systems(Update, (run_persistence, poll_upgrade_jobs));

        #[cfg(not(target_arch = "wasm32"))]
        {
            if self.backend == StorageBackend::File {
                app.add_systems(Startup, crate::crash_recovery::crash_recovery_startup);
            }
        }
    }
}

/// Run condition: a game is running and no save or load is in flight.
pub fn persistence_idle(coordinator: Option<Res<PersistCoordinator>>) -> bool {
    coordinator.is_some_and(|c| c.is_idle())
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Applies host notifications, then requests, then pumps deferred work and
/// forwards everything the coordinator emitted.
fn run_persistence(
    mut coordinator: ResMut<PersistCoordinator>,
    host: Option<ResMut<PersistHost>>,
    mut notifications: EventReader<HostNotification>,
    mut requests: EventReader<PersistRequest>,
    mut emitted: EventWriter<PersistEvent>,
) {
    let Some(mut host) = host else {
        if !notifications.is_empty() || !requests.is_empty() {
            warn!("Persistence: no PersistHost resource, dropping requests");
        }
        notifications.clear();
        requests.clear();
        return;
    };
    let host: &mut dyn Host = host.0.as_mut();

    for notification in notifications.read() {
        apply_notification(&mut coordinator, host, notification);
    }
    for request in requests.read() {
        if let Err(e) = apply_request(&mut coordinator, host, request) {
            debug!("Persistence request {request:?} failed: {e}");
        }
    }

    coordinator.pump(host);
    emitted.send_batch(coordinator.drain_events());
}

fn apply_notification(
    coordinator: &mut PersistCoordinator,
    host: &mut dyn Host,
    notification: &HostNotification,
) {
    match notification {
        HostNotification::PreLoadMap { map } => coordinator.on_pre_load_map(host, map),
        HostNotification::SeamlessTravelStart { map } => {
            coordinator.on_seamless_travel_start(host, map)
        }
        HostNotification::PostLoadMap => coordinator.on_post_load_map(host),
        HostNotification::LevelBecomingVisible { level } => {
            coordinator.on_level_becoming_visible(level);
        }
        HostNotification::LevelBecomingInvisible { level } => {
            coordinator.on_level_becoming_invisible(host, level)
        }
        HostNotification::LevelLoadedExternally { level } => {
            coordinator.notify_level_loaded_externally(level)
        }
        HostNotification::LevelUnloadedExternally { level } => {
            coordinator.notify_level_unloaded_externally(host, level)
        }
        HostNotification::ObjectDestroyed { object } => {
            coordinator.on_object_destroyed(host, *object)
        }
        HostNotification::ScreenshotCaptured { capture, frame } => {
            // Failures are reported through PostSaveGame.
            let _ = coordinator.on_screenshot_captured(host, *capture, frame);
        }
    }
}

fn apply_request(
    coordinator: &mut PersistCoordinator,
    host: &mut dyn Host,
    request: &PersistRequest,
) -> Result<(), PersistError> {
    match request {
        PersistRequest::NewGame {
            defer_to_next_level,
        } => coordinator.new_game(host, *defer_to_next_level),
        PersistRequest::EndGame => {
            coordinator.end_game();
            Ok(())
        }
        PersistRequest::Save {
            slot,
            title,
            take_screenshot,
            custom,
        } => coordinator.save_game(host, slot, title, *take_screenshot, custom.clone()),
        PersistRequest::QuickSave { take_screenshot } => {
            coordinator.quick_save_game(host, "", *take_screenshot, None)
        }
        PersistRequest::AutoSave { take_screenshot } => {
            coordinator.auto_save_game(host, "", *take_screenshot, None)
        }
        PersistRequest::Load {
            slot,
            auto_travel,
            travel_options,
        } => coordinator.load_game(host, slot, *auto_travel, travel_options),
        PersistRequest::QuickLoad => coordinator.quick_load_game(host, true, ""),
        PersistRequest::LoadLatest => coordinator.load_latest_save_game(host, true, ""),
        PersistRequest::DeleteSave { slot } => coordinator.delete_save(slot),
        PersistRequest::MarkObjectDestroyed { object } => {
            coordinator.mark_object_destroyed(host, *object);
            Ok(())
        }
        PersistRequest::ClearLevelState { level } => {
            coordinator.clear_level_state(level);
            Ok(())
        }
        PersistRequest::ForceReset => {
            coordinator.force_reset();
            Ok(())
        }
        PersistRequest::Teardown => {
            coordinator.teardown();
            Ok(())
        }
    }
}

fn poll_upgrade_jobs(mut jobs: ResMut<UpgradeJobs>, mut finished: EventWriter<UpgradeFinished>) {
    jobs.handles.retain_mut(|handle| match handle.poll() {
        Some(report) => {
            info!(
                "Save upgrade finished: {} examined, {} upgraded, {} failed",
                report.examined,
                report.upgraded.len(),
                report.failed.len()
            );
            finished.send(UpgradeFinished {
                report: report.clone(),
            });
            false
        }
        None => true,
    });
}
