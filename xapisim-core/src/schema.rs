//! Declarative per-class field tables.
//!
//! A [`FieldTable`] maps every field of a class to a default value whose
//! kind is the field's declared type, and carries the read-write, list and
//! map subsets that drive accessor synthesis.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{new_uuid, Record, Value, ValueKind};

/// Field table of one entity class.
///
/// ```
/// use xapisim_core::schema::FieldTable;
///
/// let fields = FieldTable::new()
///     .field("name_label", "")
///     .int64("virtual_size", 0)
///     .field("tags", xapisim_core::Value::empty_list())
///     .read_write(&["name_label", "tags"])
///     .lists(&["tags"]);
///
/// assert!(fields.is_read_write("name_label"));
/// assert!(fields.is_list("tags"));
/// assert!(fields.is_map("other_config"));
/// ```
#[derive(Debug, Clone)]
pub struct FieldTable {
    defaults: BTreeMap<String, Value>,
    int64: BTreeSet<String>,
    read_write: BTreeSet<String>,
    lists: BTreeSet<String>,
    maps: BTreeSet<String>,
}

impl FieldTable {
    /// A table holding the fields common to every class: `uuid` and the
    /// read-write `other_config` map.
    pub fn new() -> Self {
        let mut table = Self {
            defaults: BTreeMap::new(),
            int64: BTreeSet::new(),
            read_write: BTreeSet::new(),
            lists: BTreeSet::new(),
            maps: BTreeSet::new(),
        };
        table.defaults.insert("uuid".to_string(), Value::empty());
        table
            .defaults
            .insert("other_config".to_string(), Value::empty_map());
        table.read_write.insert("other_config".to_string());
        table.maps.insert("other_config".to_string());
        table
    }

    /// Declare a field; the default's kind becomes the field's type.
    pub fn field(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.defaults.insert(name.to_string(), default.into());
        self
    }

    /// Declare an int64 field, stored as a decimal string.
    pub fn int64(mut self, name: &str, default: i64) -> Self {
        self.defaults
            .insert(name.to_string(), Value::String(default.to_string()));
        self.int64.insert(name.to_string());
        self
    }

    /// Declare an object reference field, defaulting to the null reference.
    pub fn reference(self, name: &str) -> Self {
        self.field(name, crate::value::NULL_REF)
    }

    pub fn read_write(mut self, names: &[&str]) -> Self {
        for name in names {
            debug_assert!(self.defaults.contains_key(*name), "undeclared field {}", name);
            self.read_write.insert(name.to_string());
        }
        self
    }

    pub fn lists(mut self, names: &[&str]) -> Self {
        for name in names {
            debug_assert!(self.defaults.contains_key(*name), "undeclared field {}", name);
            self.lists.insert(name.to_string());
        }
        self
    }

    pub fn maps(mut self, names: &[&str]) -> Self {
        for name in names {
            debug_assert!(self.defaults.contains_key(*name), "undeclared field {}", name);
            self.maps.insert(name.to_string());
        }
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    /// Declared type of a field.
    pub fn declared_kind(&self, name: &str) -> Option<ValueKind> {
        self.defaults.get(name).map(Value::kind)
    }

    pub fn is_int64(&self, name: &str) -> bool {
        self.int64.contains(name)
    }

    pub fn is_read_write(&self, name: &str) -> bool {
        self.read_write.contains(name)
    }

    pub fn is_list(&self, name: &str) -> bool {
        self.lists.contains(name)
    }

    pub fn is_map(&self, name: &str) -> bool {
        self.maps.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// A record holding every field at its default, with a fresh uuid.
    pub fn default_record(&self) -> Record {
        let mut record = self.defaults.clone();
        record.insert("uuid".to_string(), Value::String(new_uuid()));
        record
    }
}

impl Default for FieldTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_fields() {
        let table = FieldTable::new();
        assert_eq!(table.declared_kind("uuid"), Some(ValueKind::String));
        assert_eq!(table.declared_kind("other_config"), Some(ValueKind::Struct));
        assert!(table.is_read_write("other_config"));
        assert!(table.is_map("other_config"));
        assert!(!table.is_read_write("uuid"));
        assert_eq!(table.declared_kind("name_label"), None);
    }

    #[test]
    fn test_int64_fields_are_strings() {
        let table = FieldTable::new().int64("MTU", 1500);
        assert!(table.is_int64("MTU"));
        assert_eq!(table.declared_kind("MTU"), Some(ValueKind::String));
        assert_eq!(table.default_record()["MTU"], Value::from("1500"));
    }

    #[test]
    fn test_default_record_gets_fresh_uuid() {
        let table = FieldTable::new().reference("VM");
        let a = table.default_record();
        let b = table.default_record();
        assert_ne!(a["uuid"], b["uuid"]);
        assert_eq!(a["VM"], Value::from("OpaqueRef:NULL"));
        assert_eq!(a.len(), 3);
    }
}
