// ---------------------------------------------------------------------------
// persist_config – Runtime configuration for the persistence coordinator
// ---------------------------------------------------------------------------

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default thumbnail size for save screenshots.
pub const DEFAULT_SCREENSHOT_WIDTH: u32 = 240;
pub const DEFAULT_SCREENSHOT_HEIGHT: u32 = 135;

/// Settings consumed by [`crate::PersistCoordinator`].
///
/// Derives serde so hosts can keep it inside their own settings files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Master switch. When false every entry point fails with
    /// `PersistError::Disabled` and host notifications are ignored.
    pub enabled: bool,
    /// On map travel, store every loaded level before it is discarded.
    /// When false the levels' in-memory data is only released.
    pub save_level_state_while_traveling: bool,
    pub screenshot_width: u32,
    pub screenshot_height: u32,
    /// Version of the host's own data model, stamped into every section on
    /// store and compared by the upgrade job.
    pub user_data_model_version: u32,
    /// Root directory for the file-system backend.
    pub save_directory: PathBuf,
    pub quick_save_title: String,
    pub auto_save_title: String,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_level_state_while_traveling: true,
            screenshot_width: DEFAULT_SCREENSHOT_WIDTH,
            screenshot_height: DEFAULT_SCREENSHOT_HEIGHT,
            user_data_model_version: 0,
            save_directory: PathBuf::from("Saved/SaveGames"),
            quick_save_title: "Quick Save".to_string(),
            auto_save_title: "Autosave".to_string(),
        }
    }
}
