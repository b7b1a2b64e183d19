// ---------------------------------------------------------------------------
// save_game – Save entry points and the screenshot continuation
// ---------------------------------------------------------------------------

use bevy::log::{debug, error, info, warn};

use crate::coordinator::{now_timestamp, PersistCoordinator};
use crate::host::{CaptureHandle, CapturedFrame, Host};
use crate::notifications::PersistEvent;
use crate::persist_error::PersistError;
use crate::save_info::CustomSaveInfo;
use crate::screenshot::{make_thumbnail, SaveOperationContext};
use crate::slot_manager::{AUTO_SAVE_SLOT, QUICK_SAVE_SLOT};
use crate::system_mode::SystemMode;

impl PersistCoordinator {
    /// Save the running game to `slot`.
    ///
    /// Only accepted while `RunningIdle`. With `take_screenshot` the write is
    /// deferred until [`PersistCoordinator::on_screenshot_captured`]; `Ok` then
    /// only means the save was accepted. `PostSaveGame` is always emitted.
    pub fn save_game(
        &mut self,
        host: &mut dyn Host,
        slot: &str,
        title: &str,
        take_screenshot: bool,
        custom: Option<CustomSaveInfo>,
    ) -> Result<(), PersistError> {
        if let Err(e) = self.check_can_save(slot) {
            error!("Cannot save to slot '{slot}': {e}");
            self.emit(PersistEvent::PostSaveGame {
                slot: slot.to_string(),
                success: false,
            });
            return Err(e);
        }

        self.emit(PersistEvent::PreSaveGame {
            slot: slot.to_string(),
        });

        if take_screenshot {
            match host.request_screenshot() {
                Some(capture) => {
                    debug!("Queueing screenshot for save {slot}");
                    self.pending_save = Some(SaveOperationContext {
                        slot: slot.to_string(),
                        title: title.to_string(),
                        custom,
                        capture,
                    });
                    return Ok(());
                }
                None => warn!("Screenshot unavailable, saving {slot} without one"),
            }
        }

        self.finish_save(host, slot, title, custom, None)
    }

    fn check_can_save(&mut self, slot: &str) -> Result<(), PersistError> {
        self.ensure_enabled()?;
        if slot.is_empty() {
            return Err(PersistError::InvalidSlotName);
        }
        self.require_storage()?;
        self.mode.try_begin(SystemMode::SavingGame)
    }

    /// Save with the quick-save slot; an empty title uses the configured one.
    pub fn quick_save_game(
        &mut self,
        host: &mut dyn Host,
        title: &str,
        take_screenshot: bool,
        custom: Option<CustomSaveInfo>,
    ) -> Result<(), PersistError> {
        let title = if title.is_empty() {
            self.config.quick_save_title.clone()
        } else {
            title.to_string()
        };
        self.save_game(host, QUICK_SAVE_SLOT, &title, take_screenshot, custom)
    }

    pub fn auto_save_game(
        &mut self,
        host: &mut dyn Host,
        title: &str,
        take_screenshot: bool,
        custom: Option<CustomSaveInfo>,
    ) -> Result<(), PersistError> {
        let title = if title.is_empty() {
            self.config.auto_save_title.clone()
        } else {
            title.to_string()
        };
        self.save_game(host, AUTO_SAVE_SLOT, &title, take_screenshot, custom)
    }

    /// Continuation of a save that asked for a screenshot.
    ///
    /// Captures that do not match the pending request are ignored. The
    /// capture is always released; a frame that cannot be turned into a
    /// thumbnail saves without one.
    pub fn on_screenshot_captured(
        &mut self,
        host: &mut dyn Host,
        capture: CaptureHandle,
        frame: &CapturedFrame,
    ) -> Result<(), PersistError> {
        let Some(pending) = self.pending_save.take_if(|p| p.capture == capture) else {
            debug!("Ignoring capture {capture:?}, no save is waiting for it");
            return Ok(());
        };
        host.release_screenshot(capture);

        if self.mode.mode() != SystemMode::SavingGame {
            warn!(
                "Save to {} abandoned before its screenshot arrived",
                pending.slot
            );
            self.emit(PersistEvent::PostSaveGame {
                slot: pending.slot,
                success: false,
            });
            return Err(PersistError::OperationAlreadyInProgress {
                mode: self.mode.mode(),
            });
        }

        let png = match make_thumbnail(
            frame,
            self.config.screenshot_width,
            self.config.screenshot_height,
        ) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Discarding screenshot for {}: {e}", pending.slot);
                None
            }
        };
        self.finish_save(host, &pending.slot, &pending.title, pending.custom, png)
    }

    /// Slot of the save currently waiting for its screenshot.
    pub fn pending_screenshot_slot(&self) -> Option<&str> {
        self.pending_save.as_ref().map(|p| p.slot.as_str())
    }

    fn finish_save(
        &mut self,
        host: &dyn Host,
        slot: &str,
        title: &str,
        custom: Option<CustomSaveInfo>,
        screenshot: Option<Vec<u8>>,
    ) -> Result<(), PersistError> {
        let result = self.write_save(host, slot, title, custom, screenshot);
        match &result {
            Ok(()) => info!("Save to slot {slot}: success"),
            Err(e) => error!("Error while saving game to {slot}: {e}"),
        }
        self.mode.finish_operation();
        self.pending_save = None;
        self.emit(PersistEvent::PostSaveGame {
            slot: slot.to_string(),
            success: result.is_ok(),
        });
        result
    }

    fn write_save(
        &mut self,
        host: &dyn Host,
        slot: &str,
        title: &str,
        custom: Option<CustomSaveInfo>,
        screenshot: Option<Vec<u8>>,
    ) -> Result<(), PersistError> {
        let storage = self.require_storage()?;

        // Globals go first; the state is never reset here, destroyed-object
        // ledgers and unloaded levels must carry over.
        self.store_globals(host);
        self.store_world(host, false, true)?;

        let state = self.state_mut();
        state.set_title(title);
        state.set_timestamp(now_timestamp());
        state.set_custom_save_info(custom);
        state.set_screenshot(screenshot);
        let bytes = state.save_to_bytes()?;
        storage.write_slot(slot, &bytes)
    }

    /// Store every loaded level. Stops at nothing; returns the first error.
    pub(crate) fn store_world(
        &mut self,
        host: &dyn Host,
        release: bool,
        blocking: bool,
    ) -> Result<(), PersistError> {
        let mut first_error = None;
        for level in host.loaded_levels() {
            if let Err(e) = self.store_level(host, &level, release, blocking) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn store_level(
        &mut self,
        host: &dyn Host,
        level: &str,
        release: bool,
        blocking: bool,
    ) -> Result<(), PersistError> {
        self.emit(PersistEvent::PreLevelStore {
            level: level.to_string(),
        });
        let result = self.state_mut().store_level(host, level, release, blocking);
        if let Err(e) = &result {
            error!("Storing level {level} failed: {e}");
        }
        self.emit(PersistEvent::PostLevelStore {
            level: level.to_string(),
            success: result.is_ok(),
        });
        result
    }
}
