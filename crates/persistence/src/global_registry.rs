//! Objects saved and restored independently of any level.
//!
//! Entries are non-owning `Entity` handles. Destroyed objects are skipped
//! when iterating, never removed eagerly.

use std::collections::BTreeMap;

use bevy::ecs::entity::Entity;

use crate::host::Host;

#[derive(Debug, Default)]
pub struct GlobalObjectRegistry {
    anonymous: Vec<Entity>,
    named: BTreeMap<String, Entity>,
}

impl GlobalObjectRegistry {
    /// Register an anonymous global. Adding the same object twice is a no-op.
    pub fn add(&mut self, object: Entity) {
        if !self.anonymous.contains(&object) {
            self.anonymous.push(object);
        }
    }

    /// Register `object` under `name`, replacing whatever held that name.
    pub fn add_named(&mut self, name: &str, object: Entity) {
        self.named.insert(name.to_string(), object);
    }

    /// Remove `object` from the anonymous set and from every name bound to it.
    pub fn remove(&mut self, object: Entity) {
        self.anonymous.retain(|o| *o != object);
        self.named.retain(|_, o| *o != object);
    }

    pub fn contains(&self, object: Entity) -> bool {
        self.anonymous.contains(&object) || self.named.values().any(|o| *o == object)
    }

    pub fn live_anonymous(&self, host: &dyn Host) -> Vec<Entity> {
        self.anonymous
            .iter()
            .copied()
            .filter(|o| host.is_alive(*o))
            .collect()
    }

    pub fn live_named(&self, host: &dyn Host) -> Vec<(String, Entity)> {
        self.named
            .iter()
            .filter(|(_, o)| host.is_alive(**o))
            .map(|(name, o)| (name.clone(), *o))
            .collect()
    }

    pub fn clear(&mut self) {
        self.anonymous.clear();
        self.named.clear();
    }
}
