//! Lifecycle state machine for the persistence coordinator.
//!
//! [`SystemMode`] is the single authoritative mode value. [`ModeContext`]
//! bundles it with the two flags that used to live next to it (restoring,
//! tearing down) so the coordinator owns all of them in one place.

use crate::persist_error::PersistError;

/// Overall mode of the persistence system.
///
/// Store/restore of level data only happens when the mode allows it; nothing
/// is stored or restored while `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SystemMode {
    /// No game running. Initial mode until a game is started.
    #[default]
    Disabled,
    /// Game running, no save/load in flight.
    RunningIdle,
    /// A new game was requested; level hooks are set up once the next map loads.
    NewGameOnNextLevel,
    /// A save is in flight (possibly waiting on a screenshot).
    SavingGame,
    /// A load is in flight (waiting for the target map to finish loading).
    LoadingGame,
}

impl SystemMode {
    /// Modes in which a level leaving the world should be written back.
    pub fn stores_on_unload(self) -> bool {
        matches!(self, SystemMode::RunningIdle | SystemMode::SavingGame)
    }

    /// Modes in which saved level data may be applied to a streamed level.
    pub fn restores_streaming_levels(self) -> bool {
        matches!(
            self,
            SystemMode::RunningIdle | SystemMode::SavingGame | SystemMode::LoadingGame
        )
    }
}

/// What the coordinator should do when a map finishes loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PostLoadAction {
    /// Deferred new game: hook the freshly loaded levels and go idle.
    StartDeferredGame,
    /// Already running: re-hook, picks up always-loaded sublevels.
    Resubscribe,
    /// A game load is waiting for this map.
    RestoreLoadedGame,
    Ignore,
}

/// Mode plus the transient flags that accompany it.
#[derive(Debug, Default)]
pub(crate) struct ModeContext {
    mode: SystemMode,
    restoring: bool,
    tearing_down: bool,
}

impl ModeContext {
    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
    }

    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down
    }

    pub fn begin_teardown(&mut self) {
        self.tearing_down = true;
    }

    /// `EndGame`: back to `Disabled` with no restore in progress.
    pub fn end_game(&mut self) {
        self.mode = SystemMode::Disabled;
        self.restoring = false;
    }

    /// `StartNewGame`: callers must have run `end_game` first.
    pub fn start_new_game(&mut self, defer_to_next_level: bool) {
        self.mode = if defer_to_next_level {
            SystemMode::NewGameOnNextLevel
        } else {
            SystemMode::RunningIdle
        };
    }

    /// Single-flight gate for save and load. Only `RunningIdle` may start one;
    /// a rejected call leaves the mode untouched.
    pub fn try_begin(&mut self, next: SystemMode) -> Result<(), PersistError> {
        debug_assert!(matches!(
            next,
            SystemMode::SavingGame | SystemMode::LoadingGame
        ));
        if self.mode != SystemMode::RunningIdle {
            return Err(PersistError::OperationAlreadyInProgress { mode: self.mode });
        }
        self.mode = next;
        if next == SystemMode::LoadingGame {
            self.restoring = true;
        }
        Ok(())
    }

    /// Save/load finished (either way): back to idle.
    pub fn finish_operation(&mut self) {
        self.mode = SystemMode::RunningIdle;
        self.restoring = false;
    }

    /// Decide the post-map-load branch from the mode active before the event,
    /// applying the transition for the deferred new game.
    pub fn on_map_loaded(&mut self) -> PostLoadAction {
        match self.mode {
            SystemMode::NewGameOnNextLevel => {
                self.mode = SystemMode::RunningIdle;
                PostLoadAction::StartDeferredGame
            }
            SystemMode::RunningIdle => PostLoadAction::Resubscribe,
            SystemMode::LoadingGame => PostLoadAction::RestoreLoadedGame,
            SystemMode::Disabled | SystemMode::SavingGame => PostLoadAction::Ignore,
        }
    }

    /// Temporarily switch mode, returning the previous one.
    pub fn swap_mode(&mut self, mode: SystemMode) -> SystemMode {
        std::mem::replace(&mut self.mode, mode)
    }

    /// Escape hatch: unconditionally idle, no restore in progress.
    pub fn force_reset(&mut self) {
        self.mode = SystemMode::RunningIdle;
        self.restoring = false;
    }
}
