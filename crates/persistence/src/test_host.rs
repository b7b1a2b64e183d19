//! In-memory host used by the crate's unit tests.
//!
//! Objects are plain records keyed by `Entity`; indices are never reused, so a
//! handle to a destroyed object stays stale forever.

use std::collections::{HashMap, HashSet};

use bevy::ecs::entity::Entity;

use crate::host::{CaptureHandle, Host, ObjectClassifier, ObjectSnapshot};

#[derive(Debug, Clone)]
struct TestObject {
    level: String,
    name: String,
    class_name: String,
    persistent: bool,
    runtime: bool,
    properties: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct TestHost {
    objects: HashMap<Entity, TestObject>,
    next_index: u32,
    map: Option<String>,
    levels: Vec<String>,
    pub removing: HashSet<String>,
    pub visible: Vec<String>,
    pub opened_maps: Vec<(String, String)>,
    pub destroyed: Vec<Entity>,
    pub screenshots_enabled: bool,
    next_capture: u64,
    pub released_captures: Vec<CaptureHandle>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the world with a single persistent level.
    pub fn load_map(&mut self, map: &str) {
        self.objects.clear();
        self.levels = vec![map.to_string()];
        self.map = Some(map.to_string());
    }

    pub fn load_level(&mut self, level: &str) {
        if !self.levels.iter().any(|l| l == level) {
            self.levels.push(level.to_string());
        }
    }

    /// Unload a level and drop its objects without reporting them destroyed.
    pub fn unload_level(&mut self, level: &str) {
        self.levels.retain(|l| l != level);
        self.objects.retain(|_, o| o.level != level);
    }

    fn insert(&mut self, object: TestObject) -> Entity {
        self.next_index += 1;
        let entity = Entity::from_raw(self.next_index);
        self.objects.insert(entity, object);
        entity
    }

    pub fn spawn_placed(&mut self, level: &str, name: &str, properties: &[u8]) -> Entity {
        self.insert(TestObject {
            level: level.to_string(),
            name: name.to_string(),
            class_name: "Placed".to_string(),
            persistent: true,
            runtime: false,
            properties: properties.to_vec(),
        })
    }

    pub fn spawn_runtime(&mut self, level: &str, name: &str, class: &str, properties: &[u8]) -> Entity {
        self.insert(TestObject {
            level: level.to_string(),
            name: name.to_string(),
            class_name: class.to_string(),
            persistent: true,
            runtime: true,
            properties: properties.to_vec(),
        })
    }

    pub fn spawn_transient(&mut self, level: &str, name: &str) -> Entity {
        self.insert(TestObject {
            level: level.to_string(),
            name: name.to_string(),
            class_name: "Transient".to_string(),
            persistent: false,
            runtime: false,
            properties: Vec::new(),
        })
    }

    pub fn properties(&self, object: Entity) -> Option<&[u8]> {
        self.objects.get(&object).map(|o| o.properties.as_slice())
    }

    pub fn set_properties(&mut self, object: Entity, properties: &[u8]) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.properties = properties.to_vec();
        }
    }

    /// Gameplay destruction: the object just disappears.
    pub fn kill(&mut self, object: Entity) {
        self.objects.remove(&object);
    }

    pub fn object_count(&self, level: &str) -> usize {
        self.objects.values().filter(|o| o.level == level).count()
    }
}

impl ObjectClassifier for TestHost {
    fn is_persistent(&self, object: Entity) -> bool {
        self.objects.get(&object).is_some_and(|o| o.persistent)
    }

    fn is_runtime_spawned(&self, object: Entity) -> bool {
        self.objects.get(&object).is_some_and(|o| o.runtime)
    }
}

impl Host for TestHost {
    fn current_map_name(&self) -> Option<String> {
        self.map.clone()
    }

    fn loaded_levels(&self) -> Vec<String> {
        self.levels.clone()
    }

    fn is_level_loaded(&self, level: &str) -> bool {
        self.levels.iter().any(|l| l == level)
    }

    fn is_level_being_removed(&self, level: &str) -> bool {
        self.removing.contains(level)
    }

    fn level_objects(&self, level: &str) -> Vec<Entity> {
        let mut objects: Vec<Entity> = self
            .objects
            .iter()
            .filter(|(_, o)| o.level == level)
            .map(|(e, _)| *e)
            .collect();
        objects.sort();
        objects
    }

    fn is_alive(&self, object: Entity) -> bool {
        self.objects.contains_key(&object)
    }

    fn object_name(&self, object: Entity) -> Option<String> {
        self.objects.get(&object).map(|o| o.name.clone())
    }

    fn object_level(&self, object: Entity) -> Option<String> {
        self.objects.get(&object).map(|o| o.level.clone())
    }

    fn find_object(&self, level: &str, name: &str) -> Option<Entity> {
        self.objects
            .iter()
            .find(|(_, o)| o.level == level && o.name == name)
            .map(|(e, _)| *e)
    }

    fn capture_object(&self, object: Entity) -> Option<ObjectSnapshot> {
        self.objects.get(&object).map(|o| ObjectSnapshot {
            class_name: o.class_name.clone(),
            properties: o.properties.clone(),
        })
    }

    fn apply_object(&mut self, object: Entity, snapshot: &ObjectSnapshot) {
        self.set_properties(object, &snapshot.properties);
    }

    fn spawn_object(&mut self, level: &str, name: &str, class_name: &str) -> Option<Entity> {
        if class_name.is_empty() {
            return None;
        }
        Some(self.spawn_runtime(level, name, class_name, &[]))
    }

    fn destroy_object(&mut self, object: Entity) {
        if self.objects.remove(&object).is_some() {
            self.destroyed.push(object);
        }
    }

    fn set_level_visible(&mut self, level: &str) {
        self.visible.push(level.to_string());
    }

    fn open_map(&mut self, map: &str, options: &str) {
        self.opened_maps.push((map.to_string(), options.to_string()));
    }

    fn request_screenshot(&mut self) -> Option<CaptureHandle> {
        if !self.screenshots_enabled {
            return None;
        }
        self.next_capture += 1;
        Some(CaptureHandle(self.next_capture))
    }

    fn release_screenshot(&mut self, handle: CaptureHandle) {
        self.released_captures.push(handle);
    }
}
