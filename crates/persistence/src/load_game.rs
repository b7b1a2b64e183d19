// ---------------------------------------------------------------------------
// load_game – Load entry points and the post-map-load restore
// ---------------------------------------------------------------------------
//
// A load runs in two halves. `load_game` reads the slot, restores global
// objects and asks the host to open the saved map. The second half runs from
// `on_post_load_map` once that map is in: restore the world, re-hook levels,
// report completion.

use bevy::log::{debug, error, info, warn};

use crate::coordinator::PersistCoordinator;
use crate::host::Host;
use crate::notifications::PersistEvent;
use crate::persist_error::PersistError;
use crate::slot_manager::QUICK_SAVE_SLOT;
use crate::system_mode::SystemMode;

impl PersistCoordinator {
    /// Load `slot`. With `auto_travel` the host is asked to open the saved
    /// persistent level; otherwise the caller travels and the restore happens
    /// on the next `on_post_load_map`. `PostLoadGame` is always emitted, on
    /// success only after the map has loaded.
    pub fn load_game(
        &mut self,
        host: &mut dyn Host,
        slot: &str,
        auto_travel: bool,
        travel_options: &str,
    ) -> Result<(), PersistError> {
        if let Err(e) = self.check_can_load(slot) {
            error!("Cannot load slot '{slot}': {e}");
            self.emit(PersistEvent::PostLoadGame {
                slot: slot.to_string(),
                success: false,
            });
            return Err(e);
        }

        self.emit(PersistEvent::PreLoadGame {
            slot: slot.to_string(),
        });
        debug!("Loading game from slot {slot}");

        if let Err(e) = self.read_slot_into_state(slot) {
            error!("Error while loading game from {slot}: {e}");
            self.load_complete(slot, false);
            return Err(e);
        }

        // Globals before the map: they survive travel and level restore may
        // depend on them.
        self.restore_globals(host);
        self.slot_in_progress = Some(slot.to_string());

        if auto_travel {
            match self.state_mut().persistent_level().map(str::to_string) {
                Some(map) => {
                    debug!("(Re)loading map: {map}");
                    host.open_map(&map, travel_options);
                }
                None => warn!("Save {slot} has no persistent level, not travelling"),
            }
        }
        Ok(())
    }

    fn check_can_load(&mut self, slot: &str) -> Result<(), PersistError> {
        self.ensure_enabled()?;
        if slot.is_empty() {
            return Err(PersistError::InvalidSlotName);
        }
        self.require_storage()?;
        self.mode.try_begin(SystemMode::LoadingGame)
    }

    fn read_slot_into_state(&mut self, slot: &str) -> Result<(), PersistError> {
        let storage = self.require_storage()?;
        let bytes = storage.read_slot(slot)?;
        // The running game's state is only replaced once the slot decodes.
        let mut state = self.new_state();
        state.load_from_bytes(&bytes, false)?;
        self.state = Some(state);
        Ok(())
    }

    pub fn quick_load_game(
        &mut self,
        host: &mut dyn Host,
        auto_travel: bool,
        travel_options: &str,
    ) -> Result<(), PersistError> {
        self.load_game(host, QUICK_SAVE_SLOT, auto_travel, travel_options)
    }

    /// Load the most recent slot. `SlotNotFound` when there is none; the
    /// failed `PostLoadGame` then carries an empty slot name.
    pub fn load_latest_save_game(
        &mut self,
        host: &mut dyn Host,
        auto_travel: bool,
        travel_options: &str,
    ) -> Result<(), PersistError> {
        let latest = self
            .latest_save_game()
            .and_then(|latest| latest.ok_or_else(|| PersistError::SlotNotFound(String::new())));
        match latest {
            Ok(latest) => self.load_game(host, &latest.slot_name, auto_travel, travel_options),
            Err(e) => {
                error!("Cannot load latest save: {e}");
                self.emit(PersistEvent::PostLoadGame {
                    slot: String::new(),
                    success: false,
                });
                Err(e)
            }
        }
    }

    /// Second half of a load, called from `on_post_load_map`.
    pub(crate) fn restore_loaded_game(&mut self, host: &mut dyn Host, map: &str) {
        let slot = self.slot_in_progress.take().unwrap_or_default();

        if !self.can_restore_world(host) {
            info!("Skipping restore of world {map}, no saved data.");
            self.emit(PersistEvent::LevelRestoreSkipped {
                level: map.to_string(),
            });
            self.hooks.subscribe_loaded(host);
            self.load_complete(&slot, false);
            return;
        }

        debug!("Restoring world {map}");
        self.mode.set_restoring(true);
        self.emit(PersistEvent::PreLevelRestore {
            level: map.to_string(),
        });
        let result = self.state_mut().restore_loaded_world(host);
        self.emit(PersistEvent::PostLevelRestore {
            level: map.to_string(),
            success: result.is_ok(),
        });
        self.mode.set_restoring(false);

        self.hooks.subscribe_loaded(host);
        match result {
            Ok(levels) => {
                info!("Load of {slot}: success ({levels} level(s) restored)");
                self.load_complete(&slot, true);
            }
            Err(e) => {
                error!("Load of {slot} failed while restoring {map}: {e}");
                self.load_complete(&slot, false);
            }
        }
    }

    fn load_complete(&mut self, slot: &str, success: bool) {
        self.mode.finish_operation();
        self.slot_in_progress = None;
        self.emit(PersistEvent::PostLoadGame {
            slot: slot.to_string(),
            success,
        });
    }

    /// Restore one object on demand. With `as_game_load` the restore runs
    /// as if a game load were in progress.
    pub fn load_object_data(
        &mut self,
        host: &mut dyn Host,
        object: bevy::ecs::entity::Entity,
        as_game_load: bool,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        let previous_mode = as_game_load.then(|| self.mode.swap_mode(SystemMode::LoadingGame));
        let was_restoring = self.mode.is_restoring();

        self.mode.set_restoring(true);
        let restored = self.state_mut().restore_object(host, object);
        self.mode.set_restoring(was_restoring);

        if let Some(mode) = previous_mode {
            self.mode.swap_mode(mode);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::tests::running;
    use crate::host::Host;
    use crate::notifications::PersistEvent;
    use crate::persist_error::PersistError;
    use crate::save_storage::SaveStorage;
    use crate::system_mode::SystemMode;
    use crate::test_host::TestHost;

    #[test]
    fn test_load_restores_globals_travels_then_restores_level() {
        let (mut coordinator, _, mut host) = running();
        let progress = host.spawn_transient("Harbor", "Progress");
        host.set_properties(progress, b"level 7");
        coordinator.add_global(progress);
        let crate_a = host.find_object("Harbor", "CrateA").unwrap();
        host.set_properties(crate_a, b"empty");
        coordinator
            .save_game(&mut host, "slot1", "Title", false, None)
            .unwrap();
        coordinator.drain_events();

        host.set_properties(progress, b"level 1");
        coordinator.load_game(&mut host, "slot1", true, "?fast").unwrap();
        assert_eq!(coordinator.mode(), SystemMode::LoadingGame);
        assert!(coordinator.is_restoring());
        assert_eq!(host.properties(progress), Some(&b"level 7"[..]));
        assert_eq!(
            host.opened_maps,
            vec![("Harbor".to_string(), "?fast".to_string())]
        );

        // Host performs the travel.
        coordinator.on_pre_load_map(&host, "Harbor");
        host.load_map("Harbor");
        let crate_a = host.spawn_placed("Harbor", "CrateA", b"full");
        coordinator.on_post_load_map(&mut host);

        assert_eq!(host.properties(crate_a), Some(&b"empty"[..]));
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
        assert!(!coordinator.is_restoring());
        assert!(coordinator.hooks.is_hooked(crate_a));
        assert_eq!(
            coordinator.drain_events(),
            vec![
                PersistEvent::PreLoadGame {
                    slot: "slot1".into()
                },
                PersistEvent::PreTravelToNewMap {
                    map: "Harbor".into()
                },
                PersistEvent::PreLevelRestore {
                    level: "Harbor".into()
                },
                PersistEvent::PostLevelRestore {
                    level: "Harbor".into(),
                    success: true
                },
                PersistEvent::PostLoadGame {
                    slot: "slot1".into(),
                    success: true
                },
                PersistEvent::PostTravelToNewMap {
                    map: "Harbor".into()
                },
            ]
        );
    }

    #[test]
    fn test_load_missing_slot_fails_and_returns_idle() {
        let (mut coordinator, _, mut host) = running();
        let err = coordinator
            .load_game(&mut host, "nope", true, "")
            .unwrap_err();
        assert!(matches!(err, PersistError::SlotNotFound(_)));
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
        assert!(!coordinator.is_restoring());
        assert_eq!(
            coordinator.drain_events().last(),
            Some(&PersistEvent::PostLoadGame {
                slot: "nope".into(),
                success: false
            })
        );
        assert!(host.opened_maps.is_empty());
    }

    #[test]
    fn test_load_into_map_without_data_is_skipped() {
        let (mut coordinator, _, mut host) = running();
        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();
        coordinator.load_game(&mut host, "slot1", false, "").unwrap();
        coordinator.drain_events();

        host.load_map("SomewhereElse");
        coordinator.on_post_load_map(&mut host);

        let events = coordinator.drain_events();
        assert!(events.contains(&PersistEvent::LevelRestoreSkipped {
            level: "SomewhereElse".into()
        }));
        assert!(events.contains(&PersistEvent::PostLoadGame {
            slot: "slot1".into(),
            success: false
        }));
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
    }

    #[test]
    fn test_corrupt_slot_load_fails_cleanly() {
        let (mut coordinator, storage, mut host) = running();
        storage.write_slot("bad", b"definitely not a save").unwrap();
        assert!(coordinator.load_game(&mut host, "bad", true, "").is_err());
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
    }

    #[test]
    fn test_quick_load_and_latest() {
        let (mut coordinator, _, mut host) = running();
        coordinator
            .quick_save_game(&mut host, "", false, None)
            .unwrap();
        coordinator.quick_load_game(&mut host, false, "").unwrap();
        assert_eq!(coordinator.mode(), SystemMode::LoadingGame);
        coordinator.on_post_load_map(&mut host);
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);

        coordinator
            .load_latest_save_game(&mut host, true, "")
            .unwrap();
        assert_eq!(host.opened_maps.len(), 1);
    }

    #[test]
    fn test_load_latest_without_saves() {
        let (mut coordinator, _, mut host) = running();
        assert!(matches!(
            coordinator.load_latest_save_game(&mut host, true, ""),
            Err(PersistError::SlotNotFound(_))
        ));
        assert_eq!(
            coordinator.drain_events(),
            vec![PersistEvent::PostLoadGame {
                slot: String::new(),
                success: false
            }]
        );
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
    }

    #[test]
    fn test_failed_load_keeps_running_game_state() {
        let (mut coordinator, storage, mut host) = running();
        host.load_level("Cave");
        host.spawn_placed("Cave", "Rock", b"mossy");
        coordinator.on_level_becoming_invisible(&host, "Cave");
        host.unload_level("Cave");
        assert!(coordinator.can_restore_level("Cave"));

        assert!(coordinator
            .load_game(&mut host, "no_such_slot", false, "")
            .is_err());
        storage.write_slot("bad", b"definitely not a save").unwrap();
        assert!(coordinator.load_game(&mut host, "bad", false, "").is_err());

        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
        assert!(coordinator.can_restore_level("Cave"));
    }

    #[test]
    fn test_load_object_data_restores_and_keeps_mode() {
        let (mut coordinator, _, mut host) = running();
        let crate_a = host.find_object("Harbor", "CrateA").unwrap();
        host.set_properties(crate_a, b"looted");
        coordinator
            .save_game(&mut host, "slot1", "t", false, None)
            .unwrap();

        host.set_properties(crate_a, b"full");
        assert!(coordinator.load_object_data(&mut host, crate_a, true));
        assert_eq!(host.properties(crate_a), Some(&b"looted"[..]));
        assert_eq!(coordinator.mode(), SystemMode::RunningIdle);
        assert!(!coordinator.is_restoring());

        let mut other = TestHost::new();
        other.load_map("Nowhere");
        let stray = other.spawn_placed("Nowhere", "Stray", b"");
        assert!(!coordinator.load_object_data(&mut other, stray, false));
        assert!(other.is_alive(stray));
    }
}
