use std::collections::HashMap;

/// Per-level "saved data has been applied" flags for streamed levels.
///
/// `false` means a restore is queued or running, `true` that it finished
/// since the level last became visible. Levels without saved data never get
/// an entry.
#[derive(Debug, Default)]
pub struct StreamingRestoreState {
    levels: HashMap<String, bool>,
}

impl StreamingRestoreState {
    pub fn mark_pending(&mut self, level: &str) {
        self.levels.insert(level.to_string(), false);
    }

    pub fn mark_restored(&mut self, level: &str) {
        self.levels.insert(level.to_string(), true);
    }

    pub fn forget(&mut self, level: &str) {
        self.levels.remove(level);
    }

    /// True while the level's restore is still outstanding.
    pub fn is_restoring(&self, level: &str) -> bool {
        self.levels.get(level) == Some(&false)
    }

    pub fn get(&self, level: &str) -> Option<bool> {
        self.levels.get(level).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_restored() {
        let mut state = StreamingRestoreState::default();
        assert!(!state.is_restoring("Cave"));
        assert_eq!(state.get("Cave"), None);

        state.mark_pending("Cave");
        assert!(state.is_restoring("Cave"));

        state.mark_restored("Cave");
        assert!(!state.is_restoring("Cave"));
        assert_eq!(state.get("Cave"), Some(true));

        state.forget("Cave");
        assert!(state.is_empty());
    }
}
