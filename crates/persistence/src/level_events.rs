// ---------------------------------------------------------------------------
// level_events – Host lifecycle notifications
// ---------------------------------------------------------------------------
//
// Map travel, streaming level visibility and object destruction. Visibility
// may be reported off the main context, so the restore it triggers is queued
// and executed by `pump`.

use bevy::ecs::entity::Entity;
use bevy::log::{debug, error, info, warn};

use crate::coordinator::{DeferredWork, PersistCoordinator};
use crate::host::Host;
use crate::notifications::PersistEvent;
use crate::system_mode::{PostLoadAction, SystemMode};

/// What `on_level_becoming_visible` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingVisibility {
    /// No saved data (or nothing to do); the level is left alone.
    Skipped,
    /// A restore was queued for the next `pump`.
    Scheduled,
}

impl PersistCoordinator {
    /// The host is about to discard the current map. Blocks until every
    /// loaded level is stored (or released, per configuration).
    pub fn on_pre_load_map(&mut self, host: &dyn Host, map: &str) {
        if !self.config.enabled {
            return;
        }
        self.emit(PersistEvent::PreTravelToNewMap {
            map: map.to_string(),
        });
        self.hooks.unsubscribe_all();

        if self.mode.mode() != SystemMode::RunningIdle {
            return;
        }
        let current = host.current_map_name().unwrap_or_default();
        if self.config.save_level_state_while_traveling {
            debug!("Pre-load-map: storing {current}");
            if let Err(e) = self.store_world(host, true, true) {
                error!("Storing levels before travel failed: {e}");
            }
        } else {
            debug!("Pre-load-map: releasing data for {current}");
            let state = self.state_mut();
            for level in host.loaded_levels() {
                state.release_level_data(&level, true);
            }
        }
    }

    /// Seamless travel start is handled exactly like a map load.
    pub fn on_seamless_travel_start(&mut self, host: &dyn Host, map: &str) {
        debug!("Seamless travel to {map}");
        self.on_pre_load_map(host, map);
    }

    pub fn on_post_load_map(&mut self, host: &mut dyn Host) {
        if !self.config.enabled {
            return;
        }
        let map = host.current_map_name().unwrap_or_default();

        match self.mode.on_map_loaded() {
            PostLoadAction::StartDeferredGame => {
                debug!("Post-load-map: new game starting in {map}");
                self.hooks.subscribe_loaded(host);
            }
            PostLoadAction::Resubscribe => self.hooks.subscribe_loaded(host),
            PostLoadAction::RestoreLoadedGame => self.restore_loaded_game(host, &map),
            PostLoadAction::Ignore => {}
        }
        debug!("Post-load-map {map}: {} object(s) hooked", self.hooks.hooked_count());

        self.emit(PersistEvent::PostTravelToNewMap { map });
    }

    /// A streamed level is about to be hidden and unloaded.
    pub fn on_level_becoming_invisible(&mut self, host: &dyn Host, level: &str) {
        if !self.config.enabled {
            return;
        }
        debug!("Level hidden: {level}");
        self.emit(PersistEvent::PreUnloadStreamingLevel {
            level: level.to_string(),
        });
        self.handle_level_unloaded(host, level);
        self.emit(PersistEvent::PostUnloadStreamingLevel {
            level: level.to_string(),
        });
    }

    /// For hosts that unload levels without streaming notifications.
    pub fn notify_level_unloaded_externally(&mut self, host: &dyn Host, level: &str) {
        if self.config.enabled {
            self.handle_level_unloaded(host, level);
        }
    }

    fn handle_level_unloaded(&mut self, host: &dyn Host, level: &str) {
        self.hooks.unsubscribe_level(level);
        if self.streaming.is_restoring(level) {
            // Still holds designer defaults; storing them would overwrite the
            // saved data. The queued restore goes stale with it.
            debug!("Level {level} hidden before its restore ran, keeping saved data");
            self.streaming.forget(level);
            return;
        }
        if self.mode.mode().stores_on_unload() && !self.mode.is_tearing_down() {
            // Stored data stays; the decoded copy is paged out on the next pump.
            let _ = self.store_level(host, level, true, false);
        }
    }

    /// A streamed level is about to become visible. Does not touch the level
    /// itself: with saved data the restore is queued, otherwise nothing
    /// changes.
    pub fn on_level_becoming_visible(&mut self, level: &str) -> StreamingVisibility {
        if !self.config.enabled || !self.mode.mode().restores_streaming_levels() {
            return StreamingVisibility::Skipped;
        }
        debug!("Level shown: {level}");

        if !self.can_restore_level(level) {
            info!("Skipping restore of streaming level {level}, no saved data.");
            self.emit(PersistEvent::LevelRestoreSkipped {
                level: level.to_string(),
            });
            return StreamingVisibility::Skipped;
        }

        self.streaming.mark_pending(level);
        self.emit(PersistEvent::PreLoadStreamingLevel {
            level: level.to_string(),
        });
        // The receiver lives in `self`, so this cannot fail.
        let _ = self
            .deferred_tx
            .send(DeferredWork::RestoreStreamingLevel(level.to_string()));
        StreamingVisibility::Scheduled
    }

    /// Thread-safe form of [`PersistCoordinator::on_level_becoming_visible`]
    /// for levels loaded outside the streaming notifications.
    pub fn notify_level_loaded_externally(&self, level: &str) {
        self.streaming_dispatcher().notify_level_loaded(level);
    }

    /// Run queued main-context work: deferred level restores and pending
    /// level-data releases. Call once per frame.
    pub fn pump(&mut self, host: &mut dyn Host) {
        // Restores queued by an external load land on the same channel and
        // run within this call.
        while let Ok(item) = self.deferred_rx.try_recv() {
            match item {
                DeferredWork::RestoreStreamingLevel(level) => {
                    self.restore_streaming_level(host, &level)
                }
                DeferredWork::LevelLoadedExternally(level) => {
                    debug!("External load of {level}");
                    self.on_level_becoming_visible(&level);
                }
            }
        }
        if let Some(state) = self.state.as_mut() {
            state.flush_pending_releases();
        }
    }

    fn restore_streaming_level(&mut self, host: &mut dyn Host, level: &str) {
        if !host.is_level_loaded(level) {
            info!("Restore for {level} dropped; level was unloaded again");
            self.streaming.forget(level);
            return;
        }
        if !self.streaming.is_restoring(level) {
            debug!("Stale restore for {level} skipped");
            return;
        }

        let was_restoring = self.mode.is_restoring();
        self.mode.set_restoring(true);
        self.emit(PersistEvent::PreLevelRestore {
            level: level.to_string(),
        });

        let result = self.state_mut().restore_level(host, level);
        let success = match result {
            Ok(()) => true,
            Err(e) if e.is_skip() => {
                self.emit(PersistEvent::LevelRestoreSkipped {
                    level: level.to_string(),
                });
                true
            }
            Err(e) => {
                error!("Restoring streaming level {level} failed: {e}");
                false
            }
        };

        host.set_level_visible(level);
        self.hooks.subscribe_level(host, level);
        self.emit(PersistEvent::PostLevelRestore {
            level: level.to_string(),
            success,
        });
        self.mode.set_restoring(was_restoring);
        self.streaming.mark_restored(level);
        self.emit(PersistEvent::PostLoadStreamingLevel {
            level: level.to_string(),
        });
    }

    /// Destruction report from the host. Only hooked objects count; the hook
    /// is consumed either way.
    pub fn on_object_destroyed(&mut self, host: &dyn Host, object: Entity) {
        let Some(hooked) = self.hooks.take(object) else {
            return;
        };
        self.record_destroyed(host, &hooked.level, &hooked.name);
    }

    /// Record an object's destruction explicitly, hooked or not. Runtime
    /// spawned and non-persistent objects are ignored.
    pub fn mark_object_destroyed(&mut self, host: &dyn Host, object: Entity) {
        if !self.config.enabled {
            return;
        }
        if self.hooks.is_hooked(object) {
            self.on_object_destroyed(host, object);
            return;
        }
        if !host.is_persistent(object) || host.is_runtime_spawned(object) {
            return;
        }
        match (host.object_level(object), host.object_name(object)) {
            (Some(level), Some(name)) => self.record_destroyed(host, &level, &name),
            _ => warn!("Cannot mark {object:?} destroyed, it is no longer known to the host"),
        }
    }

    fn record_destroyed(&mut self, host: &dyn Host, level: &str, name: &str) {
        if self.mode.mode() != SystemMode::RunningIdle || self.mode.is_restoring() {
            return;
        }
        // Objects disappearing with their level are not destructions.
        if host.is_level_being_removed(level) {
            return;
        }
        debug!("Recording destruction of {name} in {level}");
        self.state_mut().store_level_object_destroyed(level, name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::coordinator::tests::running;
    use crate::persist_config::PersistConfig;
    use crate::save_state::SaveState;
    use crate::save_storage::{MemorySaveStorage, SaveStorage};
    use crate::state_store::StateStore;
    use crate::test_host::TestHost;

    fn saved_ledger(storage: &MemorySaveStorage, slot: &str, level: &str) -> Vec<String> {
        let mut state = SaveState::new(0);
        state
            .load_from_bytes(&storage.read_slot(slot).unwrap(), true)
            .unwrap();
        state.destroyed_objects(level).unwrap()
    }

    /// `running()` plus a streamed "Cave" holding a placed "Rock".
    fn with_cave() -> (PersistCoordinator, Arc<MemorySaveStorage>, TestHost, Entity) {
        let (mut coordinator, storage, mut host) = running();
        host.load_level("Cave");
        let rock = host.spawn_placed("Cave", "Rock", b"mossy");
        coordinator.on_post_load_map(&mut host);
        coordinator.drain_events();
        (coordinator, storage, host, rock)
    }

    /// Hide, store and unload "Cave", then bring it back with a fresh Rock.
    fn cycle_cave(coordinator: &mut PersistCoordinator, host: &mut TestHost) -> Entity {
        coordinator.on_level_becoming_invisible(&*host, "Cave");
        host.unload_level("Cave");
        coordinator.pump(host);
        host.load_level("Cave");
        let rock = host.spawn_placed("Cave", "Rock", b"clean");
        coordinator.drain_events();
        rock
    }

    #[test]
    fn test_destroyed_placed_object_recorded_once() {
        let (mut coordinator, storage, mut host) = running();
        let crate_a = host.find_object("Harbor", "CrateA").unwrap();
        host.kill(crate_a);
        coordinator.on_object_destroyed(&host, crate_a);
        coordinator.on_object_destroyed(&host, crate_a);
        assert!(!coordinator.hooks.is_hooked(crate_a));

        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();
        assert_eq!(saved_ledger(&storage, "slot1", "Harbor"), ["CrateA"]);
    }

    #[test]
    fn test_runtime_and_transient_objects_are_not_recorded() {
        let (mut coordinator, storage, mut host) = running();
        let arrow = host.spawn_runtime("Harbor", "Arrow_1", "Arrow", b"");
        let spark = host.spawn_transient("Harbor", "Spark");
        coordinator.mark_object_destroyed(&host, arrow);
        coordinator.mark_object_destroyed(&host, spark);
        host.kill(arrow);
        host.kill(spark);

        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();
        assert!(saved_ledger(&storage, "slot1", "Harbor").is_empty());
    }

    #[test]
    fn test_mark_object_destroyed_hooked_and_unhooked() {
        let (mut coordinator, storage, mut host) = running();
        let barrel = host.spawn_placed("Harbor", "Barrel", b"");
        assert!(!coordinator.hooks.is_hooked(barrel));
        let crate_a = host.find_object("Harbor", "CrateA").unwrap();

        coordinator.mark_object_destroyed(&host, barrel);
        coordinator.mark_object_destroyed(&host, crate_a);
        assert!(!coordinator.hooks.is_hooked(crate_a));
        host.kill(barrel);
        host.kill(crate_a);

        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();
        assert_eq!(
            saved_ledger(&storage, "slot1", "Harbor"),
            ["Barrel", "CrateA"]
        );
    }

    #[test]
    fn test_destruction_during_level_removal_is_ignored() {
        let (mut coordinator, storage, mut host) = running();
        let crate_a = host.find_object("Harbor", "CrateA").unwrap();
        host.removing.insert("Harbor".to_string());
        host.kill(crate_a);
        coordinator.on_object_destroyed(&host, crate_a);
        host.removing.clear();

        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();
        assert!(saved_ledger(&storage, "slot1", "Harbor").is_empty());
    }

    #[test]
    fn test_destruction_while_saving_is_ignored() {
        let (mut coordinator, storage, mut host) = running();
        host.screenshots_enabled = true;
        coordinator
            .save_game(&mut host, "slot1", "t", true, None)
            .unwrap();

        let crate_a = host.find_object("Harbor", "CrateA").unwrap();
        host.kill(crate_a);
        coordinator.on_object_destroyed(&host, crate_a);

        let frame = crate::host::CapturedFrame {
            width: 16,
            height: 9,
            pixels: vec![0; 16 * 9 * 4],
        };
        coordinator
            .on_screenshot_captured(&mut host, crate::host::CaptureHandle(1), &frame)
            .unwrap();
        assert!(saved_ledger(&storage, "slot1", "Harbor").is_empty());
    }

    #[test]
    fn test_visible_level_without_data_is_left_alone() {
        let (mut coordinator, _, mut host) = running();
        host.load_level("Cave");
        let rock = host.spawn_placed("Cave", "Rock", b"mossy");

        assert_eq!(
            coordinator.on_level_becoming_visible("Cave"),
            StreamingVisibility::Skipped
        );
        coordinator.pump(&mut host);

        assert_eq!(
            coordinator.drain_events(),
            vec![PersistEvent::LevelRestoreSkipped {
                level: "Cave".into()
            }]
        );
        assert_eq!(host.properties(rock), Some(&b"mossy"[..]));
        assert!(host.visible.is_empty());
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), None);
    }

    #[test]
    fn test_visible_level_restored_on_pump() {
        let (mut coordinator, _, mut host, _) = with_cave();
        let rock = cycle_cave(&mut coordinator, &mut host);

        assert_eq!(
            coordinator.on_level_becoming_visible("Cave"),
            StreamingVisibility::Scheduled
        );
        assert!(coordinator.is_streamed_level_restoring("Cave"));
        assert_eq!(host.properties(rock), Some(&b"clean"[..]));

        coordinator.pump(&mut host);
        assert_eq!(host.properties(rock), Some(&b"mossy"[..]));
        assert_eq!(host.object_count("Cave"), 1);
        assert_eq!(host.visible, vec!["Cave".to_string()]);
        assert!(coordinator.hooks.is_hooked(rock));
        assert!(!coordinator.is_streamed_level_restoring("Cave"));
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), Some(true));
        assert!(!coordinator.is_restoring());
        assert_eq!(
            coordinator.drain_events(),
            vec![
                PersistEvent::PreLoadStreamingLevel {
                    level: "Cave".into()
                },
                PersistEvent::PreLevelRestore {
                    level: "Cave".into()
                },
                PersistEvent::PostLevelRestore {
                    level: "Cave".into(),
                    success: true
                },
                PersistEvent::PostLoadStreamingLevel {
                    level: "Cave".into()
                },
            ]
        );
    }

    #[test]
    fn test_restore_dropped_when_level_unloads_before_pump() {
        let (mut coordinator, _, mut host, _) = with_cave();
        cycle_cave(&mut coordinator, &mut host);
        coordinator.on_level_becoming_visible("Cave");
        coordinator.drain_events();

        host.unload_level("Cave");
        coordinator.pump(&mut host);
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), None);
        assert!(coordinator.drain_events().is_empty());
        assert!(host.visible.is_empty());
    }

    #[test]
    fn test_hidden_before_restore_keeps_saved_data() {
        let (mut coordinator, _, mut host, _) = with_cave();
        cycle_cave(&mut coordinator, &mut host);
        coordinator.on_level_becoming_visible("Cave");

        coordinator.on_level_becoming_invisible(&host, "Cave");
        host.unload_level("Cave");
        coordinator.pump(&mut host);
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), None);
        assert!(coordinator.can_restore_level("Cave"));

        host.load_level("Cave");
        let rock = host.spawn_placed("Cave", "Rock", b"clean");
        coordinator.on_level_becoming_visible("Cave");
        coordinator.pump(&mut host);

        assert_eq!(host.properties(rock), Some(&b"mossy"[..]));
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), Some(true));
    }

    #[test]
    fn test_restore_runs_once_when_shown_twice_before_pump() {
        let (mut coordinator, _, mut host, _) = with_cave();
        let rock = cycle_cave(&mut coordinator, &mut host);
        coordinator.on_level_becoming_visible("Cave");
        coordinator.on_level_becoming_invisible(&host, "Cave");
        coordinator.on_level_becoming_visible("Cave");
        coordinator.drain_events();

        coordinator.pump(&mut host);
        assert_eq!(host.properties(rock), Some(&b"mossy"[..]));
        let restores = coordinator
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PersistEvent::PreLevelRestore { .. }))
            .count();
        assert_eq!(restores, 1);
    }

    #[test]
    fn test_external_load_from_another_thread() {
        let (mut coordinator, _, mut host, _) = with_cave();
        let rock = cycle_cave(&mut coordinator, &mut host);

        let dispatcher = coordinator.streaming_dispatcher();
        std::thread::spawn(move || dispatcher.notify_level_loaded("Cave"))
            .join()
            .unwrap();
        coordinator.pump(&mut host);

        assert_eq!(host.properties(rock), Some(&b"mossy"[..]));
        assert_eq!(coordinator.streaming_restore_state().get("Cave"), Some(true));
    }

    #[test]
    fn test_travel_stores_loaded_levels() {
        let (mut coordinator, _, host) = running();
        coordinator.on_pre_load_map(&host, "Town");

        assert!(coordinator.can_restore_level("Harbor"));
        assert_eq!(coordinator.hooks.hooked_count(), 0);
        assert_eq!(
            coordinator.drain_events(),
            vec![
                PersistEvent::PreTravelToNewMap {
                    map: "Town".into()
                },
                PersistEvent::PreLevelStore {
                    level: "Harbor".into()
                },
                PersistEvent::PostLevelStore {
                    level: "Harbor".into(),
                    success: true
                },
            ]
        );
    }

    #[test]
    fn test_travel_without_store_only_releases() {
        let storage: Arc<dyn SaveStorage> = Arc::new(MemorySaveStorage::new());
        let config = PersistConfig {
            save_level_state_while_traveling: false,
            ..Default::default()
        };
        let mut coordinator = PersistCoordinator::new(config, Some(storage), SaveState::factory(0));
        let mut host = TestHost::new();
        host.load_map("Harbor");
        host.spawn_placed("Harbor", "CrateA", b"");
        coordinator.new_game(&host, false).unwrap();

        coordinator.on_seamless_travel_start(&host, "Town");
        assert!(!coordinator.can_restore_level("Harbor"));
        assert_eq!(
            coordinator.drain_events(),
            vec![PersistEvent::PreTravelToNewMap {
                map: "Town".into()
            }]
        );
    }

    #[test]
    fn test_teardown_skips_store_on_unload() {
        let (mut coordinator, _, host, rock) = with_cave();
        coordinator.teardown();
        coordinator.on_level_becoming_invisible(&host, "Cave");

        assert!(!coordinator.can_restore_level("Cave"));
        assert!(!coordinator.hooks.is_hooked(rock));
        assert_eq!(
            coordinator.drain_events(),
            vec![
                PersistEvent::PreUnloadStreamingLevel {
                    level: "Cave".into()
                },
                PersistEvent::PostUnloadStreamingLevel {
                    level: "Cave".into()
                },
            ]
        );
    }

    #[test]
    fn test_streaming_ignored_without_a_game() {
        let (mut coordinator, _) = crate::coordinator::tests::coordinator();
        assert_eq!(
            coordinator.on_level_becoming_visible("Cave"),
            StreamingVisibility::Skipped
        );
        assert!(coordinator.drain_events().is_empty());
    }
}
