use bevy::prelude::Event;

/// Observable notifications emitted by the coordinator.
///
/// Outside of bevy, collect them with `PersistCoordinator::drain_events`;
/// inside an app `PersistPlugin` forwards them as bevy events every frame.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub enum PersistEvent {
    PreSaveGame { slot: String },
    PostSaveGame { slot: String, success: bool },
    PreLoadGame { slot: String },
    PostLoadGame { slot: String, success: bool },
    PreLevelStore { level: String },
    PostLevelStore { level: String, success: bool },
    PreLevelRestore { level: String },
    PostLevelRestore { level: String, success: bool },
    /// Restore was requested but nothing was saved for the level.
    LevelRestoreSkipped { level: String },
    PreLoadStreamingLevel { level: String },
    PostLoadStreamingLevel { level: String },
    PreUnloadStreamingLevel { level: String },
    PostUnloadStreamingLevel { level: String },
    PreTravelToNewMap { map: String },
    PostTravelToNewMap { map: String },
}
