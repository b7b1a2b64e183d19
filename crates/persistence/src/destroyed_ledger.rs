//! Destruction hooks on placed persistent objects.
//!
//! When a level is subscribed, every persistent, non-runtime object in it is
//! remembered together with its name. A later destruction report for a hooked
//! object is turned into a ledger entry by the coordinator; the hook is
//! consumed, so an object can be recorded at most once.

use std::collections::{HashMap, HashSet};

use bevy::ecs::entity::Entity;

use crate::host::Host;

/// Where a hooked object lived. The name is captured at subscribe time since
/// it can no longer be queried once the object is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HookedObject {
    pub level: String,
    pub name: String,
}

#[derive(Debug, Default)]
pub(crate) struct DestructionHooks {
    by_object: HashMap<Entity, HookedObject>,
    by_level: HashMap<String, HashSet<Entity>>,
}

impl DestructionHooks {
    /// Hook every placed persistent object of `level`. Re-subscribing picks
    /// up objects that appeared since the last call.
    pub fn subscribe_level(&mut self, host: &dyn Host, level: &str) {
        let hooked = self.by_level.entry(level.to_string()).or_default();
        for object in host.level_objects(level) {
            if !host.is_persistent(object) || host.is_runtime_spawned(object) {
                continue;
            }
            let Some(name) = host.object_name(object) else {
                continue;
            };
            hooked.insert(object);
            self.by_object.insert(
                object,
                HookedObject {
                    level: level.to_string(),
                    name,
                },
            );
        }
    }

    pub fn subscribe_loaded(&mut self, host: &dyn Host) {
        for level in host.loaded_levels() {
            self.subscribe_level(host, &level);
        }
    }

    pub fn unsubscribe_level(&mut self, level: &str) {
        if let Some(objects) = self.by_level.remove(level) {
            for object in objects {
                self.by_object.remove(&object);
            }
        }
    }

    pub fn unsubscribe_all(&mut self) {
        self.by_object.clear();
        self.by_level.clear();
    }

    /// Consume the hook for a destroyed object.
    pub fn take(&mut self, object: Entity) -> Option<HookedObject> {
        let hooked = self.by_object.remove(&object)?;
        if let Some(objects) = self.by_level.get_mut(&hooked.level) {
            objects.remove(&object);
        }
        Some(hooked)
    }

    pub fn is_hooked(&self, object: Entity) -> bool {
        self.by_object.contains_key(&object)
    }

    pub fn hooked_count(&self) -> usize {
        self.by_object.len()
    }
}
