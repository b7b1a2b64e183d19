// ---------------------------------------------------------------------------
// save_state – Default in-memory state store
// ---------------------------------------------------------------------------
//
// Holds one global section plus one section per level. Level sections are
// kept either decoded (in use) or paged out as LZ4-compressed bitcode; paging
// out never discards data. A save file's levels start paged out and are
// decoded on first use unless the load asks for all of them up front.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use bevy::ecs::entity::Entity;
use bevy::log::{debug, warn};
use bitcode::{Decode, Encode};

use crate::file_header::{unwrap_header, wrap_with_header, FLAG_COMPRESSED_LEVELS};
use crate::host::{Host, ObjectSnapshot};
use crate::persist_error::PersistError;
use crate::save_info::{CustomSaveInfo, SaveInfo};
use crate::state_store::{StateFactory, StateStore};

/// Version of the payload layout. Bump when `StatePayload` changes shape.
pub const STATE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Encoded sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
struct ObjectRecord {
    class_name: String,
    properties: Vec<u8>,
}

impl ObjectRecord {
    fn from_snapshot(snapshot: ObjectSnapshot) -> Self {
        Self {
            class_name: snapshot.class_name,
            properties: snapshot.properties,
        }
    }

    fn to_snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            class_name: self.class_name.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
struct GlobalSection {
    user_data_version: u32,
    persistent_level: String,
    /// Anonymous globals, keyed by object name.
    objects: BTreeMap<String, ObjectRecord>,
    named_objects: BTreeMap<String, ObjectRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
struct LevelSection {
    placed: BTreeMap<String, ObjectRecord>,
    runtime: BTreeMap<String, ObjectRecord>,
    /// Placed objects destroyed during play.
    destroyed: BTreeSet<String>,
}

#[derive(Encode, Decode)]
struct LevelBlob {
    name: String,
    user_data_version: u32,
    data: Vec<u8>,
}

#[derive(Encode, Decode)]
struct StatePayload {
    state_version: u32,
    global: GlobalSection,
    levels: Vec<LevelBlob>,
}

fn compress_section(section: &LevelSection) -> Vec<u8> {
    lz4_flex::compress_prepend_size(&bitcode::encode(section))
}

fn decompress_section(data: &[u8]) -> Result<LevelSection, PersistError> {
    let raw = lz4_flex::decompress_size_prepended(data)?;
    Ok(bitcode::decode(&raw)?)
}

// ---------------------------------------------------------------------------
// In-memory level entries
// ---------------------------------------------------------------------------

enum LevelData {
    Decoded(LevelSection),
    Paged(Vec<u8>),
}

struct LevelEntry {
    user_data_version: u32,
    data: LevelData,
}

impl LevelEntry {
    fn page_out(&mut self) {
        if let LevelData::Decoded(section) = &self.data {
            self.data = LevelData::Paged(compress_section(section));
        }
    }

    fn section_mut(&mut self) -> Result<&mut LevelSection, PersistError> {
        if let LevelData::Paged(compressed) = &self.data {
            self.data = LevelData::Decoded(decompress_section(compressed)?);
        }
        match &mut self.data {
            LevelData::Decoded(section) => Ok(section),
            LevelData::Paged(_) => Err(PersistError::Serialization(
                "level section could not be decoded".to_string(),
            )),
        }
    }

    fn to_blob(&self, name: &str) -> LevelBlob {
        let data = match &self.data {
            LevelData::Decoded(section) => compress_section(section),
            LevelData::Paged(compressed) => compressed.clone(),
        };
        LevelBlob {
            name: name.to_string(),
            user_data_version: self.user_data_version,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// SaveState
// ---------------------------------------------------------------------------

/// The default [`StateStore`].
pub struct SaveState {
    info: SaveInfo,
    global: GlobalSection,
    levels: BTreeMap<String, LevelEntry>,
    pending_release: HashSet<String>,
    user_data_version: u32,
}

impl SaveState {
    pub fn new(user_data_version: u32) -> Self {
        Self {
            info: SaveInfo::default(),
            global: GlobalSection {
                user_data_version,
                ..Default::default()
            },
            levels: BTreeMap::new(),
            pending_release: HashSet::new(),
            user_data_version,
        }
    }

    /// Factory producing empty `SaveState`s stamped with `user_data_version`.
    pub fn factory(user_data_version: u32) -> StateFactory {
        Arc::new(move || Box::new(SaveState::new(user_data_version)) as Box<dyn StateStore>)
    }

    pub fn info(&self) -> &SaveInfo {
        &self.info
    }

    pub fn level_names(&self) -> Vec<String> {
        self.levels.keys().cloned().collect()
    }

    /// Whether the level's section is currently held decoded.
    pub fn is_level_decoded(&self, level: &str) -> bool {
        matches!(
            self.levels.get(level).map(|e| &e.data),
            Some(LevelData::Decoded(_))
        )
    }

    /// Names recorded in the destroyed ledger of `level`.
    pub fn destroyed_objects(&mut self, level: &str) -> Result<Vec<String>, PersistError> {
        match self.levels.get_mut(level) {
            Some(entry) => Ok(entry.section_mut()?.destroyed.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn global_object_names(&self) -> Vec<String> {
        self.global.objects.keys().cloned().collect()
    }

    fn entry_or_default(&mut self, level: &str) -> &mut LevelEntry {
        let version = self.user_data_version;
        self.levels
            .entry(level.to_string())
            .or_insert_with(|| LevelEntry {
                user_data_version: version,
                data: LevelData::Decoded(LevelSection::default()),
            })
    }

    fn page_out(&mut self, level: &str) {
        self.pending_release.remove(level);
        if let Some(entry) = self.levels.get_mut(level) {
            entry.page_out();
        }
    }
}

impl Default for SaveState {
    fn default() -> Self {
        Self::new(0)
    }
}

fn apply_section(host: &mut dyn Host, level: &str, section: &LevelSection) {
    for name in &section.destroyed {
        if let Some(object) = host.find_object(level, name) {
            host.destroy_object(object);
        }
    }

    for (name, record) in &section.placed {
        if section.destroyed.contains(name) {
            continue;
        }
        match host.find_object(level, name) {
            Some(object) => host.apply_object(object, &record.to_snapshot()),
            None => debug!("Restore {level}: placed object {name} no longer exists"),
        }
    }

    for (name, record) in &section.runtime {
        let object = host
            .find_object(level, name)
            .or_else(|| host.spawn_object(level, name, &record.class_name));
        match object {
            Some(object) => host.apply_object(object, &record.to_snapshot()),
            None => warn!(
                "Restore {level}: could not respawn {name} (class {})",
                record.class_name
            ),
        }
    }
}

impl StateStore for SaveState {
    fn store_world_globals(&mut self, host: &dyn Host) {
        self.global.persistent_level = host.current_map_name().unwrap_or_default();
        self.global.user_data_version = self.user_data_version;
    }

    fn store_global_object(&mut self, host: &dyn Host, object: Entity, name: Option<&str>) {
        let Some(snapshot) = host.capture_object(object) else {
            return;
        };
        let record = ObjectRecord::from_snapshot(snapshot);
        match name {
            Some(name) => {
                self.global.named_objects.insert(name.to_string(), record);
            }
            None => match host.object_name(object) {
                Some(key) => {
                    self.global.objects.insert(key, record);
                }
                None => warn!("Global object {object:?} has no name, not stored"),
            },
        }
        self.global.user_data_version = self.user_data_version;
    }

    fn restore_global_object(
        &mut self,
        host: &mut dyn Host,
        object: Entity,
        name: Option<&str>,
    ) -> bool {
        let record = match name {
            Some(name) => self.global.named_objects.get(name),
            None => host
                .object_name(object)
                .and_then(|key| self.global.objects.get(&key)),
        };
        match record {
            Some(record) => {
                host.apply_object(object, &record.to_snapshot());
                true
            }
            None => false,
        }
    }

    fn store_level(
        &mut self,
        host: &dyn Host,
        level: &str,
        release: bool,
        blocking: bool,
    ) -> Result<(), PersistError> {
        if !host.is_level_loaded(level) {
            debug!("Store {level}: level is not loaded, keeping previous data");
            return Ok(());
        }

        let version = self.user_data_version;
        let entry = self.entry_or_default(level);
        let section = entry.section_mut()?;
        section.placed.clear();
        section.runtime.clear();

        for object in host.level_objects(level) {
            if !host.is_persistent(object) {
                continue;
            }
            let (Some(name), Some(snapshot)) = (host.object_name(object), host.capture_object(object))
            else {
                continue;
            };
            let record = ObjectRecord::from_snapshot(snapshot);
            if host.is_runtime_spawned(object) {
                section.runtime.insert(name, record);
            } else {
                section.placed.insert(name, record);
            }
        }
        entry.user_data_version = version;

        if release {
            self.release_level_data(level, blocking);
        }
        Ok(())
    }

    fn restore_level(&mut self, host: &mut dyn Host, level: &str) -> Result<(), PersistError> {
        let Some(entry) = self.levels.get_mut(level) else {
            return Err(PersistError::NoSavedDataForLevel(level.to_string()));
        };
        let section = entry.section_mut()?;
        apply_section(host, level, section);
        self.pending_release.remove(level);
        Ok(())
    }

    fn restore_loaded_world(&mut self, host: &mut dyn Host) -> Result<usize, PersistError> {
        let mut restored = 0;
        for level in host.loaded_levels() {
            if !self.can_restore_level(&level) {
                continue;
            }
            self.restore_level(host, &level)?;
            restored += 1;
        }
        Ok(restored)
    }

    fn restore_object(&mut self, host: &mut dyn Host, object: Entity) -> bool {
        let (Some(level), Some(name)) = (host.object_level(object), host.object_name(object)) else {
            return false;
        };
        let Some(entry) = self.levels.get_mut(&level) else {
            return false;
        };
        let section = match entry.section_mut() {
            Ok(section) => section,
            Err(e) => {
                warn!("Restore object {name}: {e}");
                return false;
            }
        };
        match section.placed.get(&name).or_else(|| section.runtime.get(&name)) {
            Some(record) => {
                host.apply_object(object, &record.to_snapshot());
                true
            }
            None => false,
        }
    }

    fn store_level_object_destroyed(&mut self, level: &str, object_name: &str) {
        match self.entry_or_default(level).section_mut() {
            Ok(section) => {
                section.placed.remove(object_name);
                section.destroyed.insert(object_name.to_string());
            }
            Err(e) => warn!("Could not record destruction of {object_name} in {level}: {e}"),
        }
    }

    fn release_level_data(&mut self, level: &str, blocking: bool) {
        if blocking {
            self.page_out(level);
        } else if self.levels.contains_key(level) {
            self.pending_release.insert(level.to_string());
        }
    }

    fn flush_pending_releases(&mut self) {
        let pending: Vec<String> = self.pending_release.drain().collect();
        for level in pending {
            self.page_out(&level);
        }
    }

    fn clear_level(&mut self, level: &str) {
        self.levels.remove(level);
        self.pending_release.remove(level);
    }

    fn can_restore_level(&self, level: &str) -> bool {
        self.levels.contains_key(level)
    }

    fn can_restore_world(&self, host: &dyn Host) -> bool {
        match host.current_map_name() {
            Some(map) => self.levels.contains_key(&map) || self.global.persistent_level == map,
            None => false,
        }
    }

    fn persistent_level(&self) -> Option<&str> {
        if self.global.persistent_level.is_empty() {
            None
        } else {
            Some(&self.global.persistent_level)
        }
    }

    fn reset_state(&mut self) {
        *self = SaveState::new(self.user_data_version);
    }

    fn set_title(&mut self, title: &str) {
        self.info.title = title.to_string();
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.info.timestamp = timestamp;
    }

    fn set_custom_save_info(&mut self, custom: Option<CustomSaveInfo>) {
        self.info.custom = custom.unwrap_or_default();
    }

    fn set_screenshot(&mut self, png: Option<Vec<u8>>) {
        self.info.screenshot = png;
    }

    fn save_to_bytes(&mut self) -> Result<Vec<u8>, PersistError> {
        self.flush_pending_releases();
        self.info.persistent_level = self.global.persistent_level.clone();

        let payload = StatePayload {
            state_version: STATE_FORMAT_VERSION,
            global: self.global.clone(),
            levels: self
                .levels
                .iter()
                .map(|(name, entry)| entry.to_blob(name))
                .collect(),
        };
        let payload = bitcode::encode(&payload);
        Ok(wrap_with_header(
            &self.info.encode(),
            &payload,
            FLAG_COMPRESSED_LEVELS,
            self.info.timestamp,
        ))
    }

    fn load_from_bytes(&mut self, bytes: &[u8], load_all_levels: bool) -> Result<(), PersistError> {
        let save = unwrap_header(bytes)?;
        if !save.header.has_compressed_levels() {
            return Err(PersistError::Serialization(
                "uncompressed level sections are not supported".to_string(),
            ));
        }
        let info = SaveInfo::decode(save.info)?;
        let payload: StatePayload = bitcode::decode(save.payload)?;
        if payload.state_version > STATE_FORMAT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected_max: STATE_FORMAT_VERSION,
                found: payload.state_version,
            });
        }

        let mut levels = BTreeMap::new();
        for blob in payload.levels {
            let data = if load_all_levels {
                LevelData::Decoded(decompress_section(&blob.data)?)
            } else {
                LevelData::Paged(blob.data)
            };
            levels.insert(
                blob.name,
                LevelEntry {
                    user_data_version: blob.user_data_version,
                    data,
                },
            );
        }

        self.info = info;
        self.global = payload.global;
        self.levels = levels;
        self.pending_release.clear();
        Ok(())
    }

    fn is_user_data_model_outdated(&self, current: u32) -> bool {
        self.global.user_data_version < current
            || self.levels.values().any(|e| e.user_data_version < current)
    }

    fn set_user_data_model_version(&mut self, version: u32) {
        self.user_data_version = version;
    }

    fn mark_user_data_model_current(&mut self, version: u32) {
        self.user_data_version = version;
        self.global.user_data_version = version;
        for entry in self.levels.values_mut() {
            entry.user_data_version = version;
        }
    }
}
