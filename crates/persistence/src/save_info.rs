// ---------------------------------------------------------------------------
// save_info – Quick-access header section for save slot listings
// ---------------------------------------------------------------------------
//
// SaveInfo is encoded between the file header and the state payload, so a
// load screen can show title, timestamp, screenshot and custom fields without
// decoding any level data.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A single custom metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum CustomValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Game-defined key/value metadata stored with a save (chapter, play time, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CustomSaveInfo {
    values: BTreeMap<String, CustomValue>,
}

impl CustomSaveInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), CustomValue::Int(value));
    }

    pub fn set_float(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), CustomValue::Float(value));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), CustomValue::Bool(value));
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), CustomValue::Text(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&CustomValue> {
        self.values.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(CustomValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(CustomValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(CustomValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(CustomValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Header information written with every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SaveInfo {
    pub title: String,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    /// Map that was loaded when the save was made.
    pub persistent_level: String,
    /// PNG thumbnail, when the save captured one.
    pub screenshot: Option<Vec<u8>>,
    pub custom: CustomSaveInfo,
}

impl SaveInfo {
    pub fn encode(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bitcode::Error> {
        bitcode::decode(bytes)
    }
}

/// Read-only projection of a save slot's header, for load menus.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveGameInfo {
    pub slot_name: String,
    pub title: String,
    pub timestamp: u64,
    pub persistent_level: String,
    pub screenshot: Option<Vec<u8>>,
    pub custom: CustomSaveInfo,
}

impl SaveGameInfo {
    pub fn from_info(slot_name: &str, info: SaveInfo) -> Self {
        Self {
            slot_name: slot_name.to_string(),
            title: info.title,
            timestamp: info.timestamp,
            persistent_level: info.persistent_level,
            screenshot: info.screenshot,
            custom: info.custom,
        }
    }
}

/// Sort key for save slot listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveSorting {
    #[default]
    None,
    /// Newest first.
    MostRecent,
    /// Slot name ascending, case-insensitive.
    SlotName,
    /// Title ascending, case-insensitive.
    Title,
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Stable sort of a slot listing by the requested key.
pub fn sort_save_list(list: &mut [SaveGameInfo], sorting: SaveSorting) {
    match sorting {
        SaveSorting::None => {}
        SaveSorting::MostRecent => list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SaveSorting::SlotName => {
            list.sort_by(|a, b| compare_ignore_case(&a.slot_name, &b.slot_name))
        }
        SaveSorting::Title => list.sort_by(|a, b| compare_ignore_case(&a.title, &b.title)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(slot: &str, title: &str, timestamp: u64) -> SaveGameInfo {
        SaveGameInfo {
            slot_name: slot.to_string(),
            title: title.to_string(),
            timestamp,
            persistent_level: String::new(),
            screenshot: None,
            custom: CustomSaveInfo::default(),
        }
    }

    fn slots(list: &[SaveGameInfo]) -> Vec<&str> {
        list.iter().map(|i| i.slot_name.as_str()).collect()
    }

    #[test]
    fn test_save_info_encode_decode() {
        let mut custom = CustomSaveInfo::new();
        custom.set_int("chapter", 3);
        custom.set_text("area", "Docks");
        let info = SaveInfo {
            title: "Before the boss".to_string(),
            timestamp: 1_700_000_000,
            persistent_level: "Harbor".to_string(),
            screenshot: Some(vec![1, 2, 3]),
            custom,
        };
        let decoded = SaveInfo::decode(&info.encode()).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.custom.get_int("chapter"), Some(3));
        assert_eq!(decoded.custom.get_text("area"), Some("Docks"));
    }

    #[test]
    fn test_custom_info_typed_getters_reject_other_types() {
        let mut custom = CustomSaveInfo::new();
        custom.set_float("hours", 12.5);
        custom.set_bool("hardcore", true);
        assert_eq!(custom.get_float("hours"), Some(12.5));
        assert_eq!(custom.get_int("hours"), None);
        assert_eq!(custom.get_bool("hardcore"), Some(true));
        assert!(custom.get("missing").is_none());
    }

    #[test]
    fn test_sort_most_recent_first() {
        let mut list = vec![info("a", "A", 10), info("b", "B", 30), info("c", "C", 20)];
        sort_save_list(&mut list, SaveSorting::MostRecent);
        assert_eq!(slots(&list), ["b", "c", "a"]);
    }

    #[test]
    fn test_sort_slot_name_case_insensitive() {
        let mut list = vec![info("beta", "", 0), info("Alpha", "", 0), info("gamma", "", 0)];
        sort_save_list(&mut list, SaveSorting::SlotName);
        assert_eq!(slots(&list), ["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_sort_title_case_insensitive() {
        let mut list = vec![
            info("1", "zebra", 0),
            info("2", "Apple", 0),
            info("3", "mango", 0),
        ];
        sort_save_list(&mut list, SaveSorting::Title);
        assert_eq!(slots(&list), ["2", "3", "1"]);
    }

    #[test]
    fn test_sort_none_keeps_order() {
        let mut list = vec![info("z", "", 1), info("a", "", 2)];
        sort_save_list(&mut list, SaveSorting::None);
        assert_eq!(slots(&list), ["z", "a"]);
    }
}
