//! Contracts the host application provides to the persistence coordinator.
//!
//! The coordinator never owns world objects. It refers to them through
//! [`Entity`] handles, which carry a generation, so a handle to a destroyed
//! object is detected through [`Host::is_alive`] instead of faulting.
//!
//! Hosts call back into the coordinator for lifecycle notifications
//! (`on_pre_load_map`, `on_level_becoming_visible`, ...). The coordinator
//! holds `&mut dyn Host` only for the duration of a call, so a host must not
//! re-enter the coordinator from inside these methods; destruction caused by
//! `destroy_object` is reported later, like any other destruction.

use bevy::ecs::entity::Entity;

/// Serialized properties of one object, produced by the host's property
/// serializer. The coordinator treats `properties` as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    pub class_name: String,
    pub properties: Vec<u8>,
}

/// Identifies one outstanding frame-capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub u64);

/// A captured frame, tightly packed RGBA8 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decides which objects take part in persistence.
pub trait ObjectClassifier {
    /// Object is eligible for save/restore at all.
    fn is_persistent(&self, object: Entity) -> bool;
    /// Object was created during play rather than placed in level data.
    fn is_runtime_spawned(&self, object: Entity) -> bool;
}

/// The world, level and presentation services the coordinator drives.
pub trait Host: ObjectClassifier {
    /// Name of the top-level map, if one is loaded.
    fn current_map_name(&self) -> Option<String>;

    /// Names of all loaded levels, the persistent level included.
    fn loaded_levels(&self) -> Vec<String>;

    fn is_level_loaded(&self, level: &str) -> bool;

    /// True while the level itself is being torn down, so destruction of its
    /// objects is a side effect of the unload.
    fn is_level_being_removed(&self, level: &str) -> bool;

    /// Live objects currently in `level`.
    fn level_objects(&self, level: &str) -> Vec<Entity>;

    fn is_alive(&self, object: Entity) -> bool;

    /// Stable name of the object inside its level; `None` once destroyed.
    fn object_name(&self, object: Entity) -> Option<String>;

    fn object_level(&self, object: Entity) -> Option<String>;

    fn find_object(&self, level: &str, name: &str) -> Option<Entity>;

    /// Run the property serializer over one object.
    fn capture_object(&self, object: Entity) -> Option<ObjectSnapshot>;

    /// Apply previously captured properties to an object.
    fn apply_object(&mut self, object: Entity, snapshot: &ObjectSnapshot);

    /// Recreate a runtime-spawned object. `None` if the class is unknown.
    fn spawn_object(&mut self, level: &str, name: &str, class_name: &str) -> Option<Entity>;

    fn destroy_object(&mut self, object: Entity);

    /// Let the rest of the application see a streamed level.
    fn set_level_visible(&mut self, level: &str);

    /// Travel to a map. Completion arrives as pre/post map load notifications.
    fn open_map(&mut self, map: &str, options: &str);

    /// Ask the presentation layer for a one-shot frame capture.
    /// `None` when capturing is not possible (headless, no viewport).
    fn request_screenshot(&mut self) -> Option<CaptureHandle>;

    /// Deregister the capture callback for `handle`.
    fn release_screenshot(&mut self, handle: CaptureHandle);
}
