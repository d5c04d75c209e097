//! Per-class record storage.

use std::collections::BTreeMap;

use crate::error::{ApiError, ErrorKind, Result};
use crate::value::{new_ref, Record, Value};

/// All records of one class, keyed by opaque reference.
#[derive(Debug)]
pub struct ObjectStore {
    class: &'static str,
    objects: BTreeMap<String, Record>,
}

impl ObjectStore {
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            objects: BTreeMap::new(),
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn get(&self, obj_ref: &str) -> Result<&Record> {
        self.objects
            .get(obj_ref)
            .ok_or_else(|| ApiError::handle_invalid(self.class, obj_ref))
    }

    pub fn get_mut(&mut self, obj_ref: &str) -> Result<&mut Record> {
        let class = self.class;
        self.objects
            .get_mut(obj_ref)
            .ok_or_else(|| ApiError::handle_invalid(class, obj_ref))
    }

    /// Insert or replace the record under `obj_ref`. Fails if another
    /// reference already holds a record with the same uuid.
    pub fn put(&mut self, obj_ref: String, record: Record) -> Result<()> {
        if let Some(uuid) = record.get("uuid").and_then(Value::as_str) {
            let clash = self
                .objects
                .iter()
                .any(|(r, existing)| *r != obj_ref && existing.get("uuid").and_then(Value::as_str) == Some(uuid));
            if clash {
                return Err(ApiError::new(
                    ErrorKind::DbUniquenessConstraintViolation,
                    [self.class, "uuid", uuid],
                ));
            }
        }
        self.objects.insert(obj_ref, record);
        Ok(())
    }

    /// Store a new record under a freshly allocated reference.
    pub fn insert(&mut self, record: Record) -> Result<String> {
        let obj_ref = new_ref();
        self.put(obj_ref.clone(), record)?;
        Ok(obj_ref)
    }

    pub fn delete(&mut self, obj_ref: &str) -> Result<Record> {
        self.objects
            .remove(obj_ref)
            .ok_or_else(|| ApiError::handle_invalid(self.class, obj_ref))
    }

    pub fn contains(&self, obj_ref: &str) -> bool {
        self.objects.contains_key(obj_ref)
    }

    pub fn find_by_uuid(&self, uuid: &str) -> Result<String> {
        self.objects
            .iter()
            .find(|(_, record)| record.get("uuid").and_then(Value::as_str) == Some(uuid))
            .map(|(obj_ref, _)| obj_ref.clone())
            .ok_or_else(|| ApiError::uuid_invalid(self.class, uuid))
    }

    /// Every reference whose `name_label` equals `label`.
    pub fn find_by_label(&self, label: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, record)| record.get("name_label").and_then(Value::as_str) == Some(label))
            .map(|(obj_ref, _)| obj_ref.clone())
            .collect()
    }

    pub fn refs(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.objects.iter()
    }

    /// Keep only records matching `keep`; returns the removed references.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str, &Record) -> bool,
    {
        let removed: Vec<String> = self
            .objects
            .iter()
            .filter(|(obj_ref, record)| !keep(obj_ref, record))
            .map(|(obj_ref, _)| obj_ref.clone())
            .collect();
        for obj_ref in &removed {
            self.objects.remove(obj_ref);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uuid: &str, label: &str) -> Record {
        let mut r = Record::new();
        r.insert("uuid".into(), Value::from(uuid));
        r.insert("name_label".into(), Value::from(label));
        r
    }

    #[test]
    fn test_get_and_delete_unknown_ref() {
        let mut store = ObjectStore::new("VM");
        let err = store.get("OpaqueRef:missing").unwrap_err();
        assert_eq!(err.error_description(), vec!["HANDLE_INVALID", "VM", "OpaqueRef:missing"]);
        assert!(store.delete("OpaqueRef:missing").is_err());
    }

    #[test]
    fn test_delete_twice_is_handle_invalid() {
        let mut store = ObjectStore::new("VDI");
        let r = store.insert(record("u1", "disk")).unwrap();
        assert!(store.delete(&r).is_ok());
        assert_eq!(store.delete(&r).unwrap_err().kind, ErrorKind::HandleInvalid);
    }

    #[test]
    fn test_uuid_uniqueness() {
        let mut store = ObjectStore::new("SR");
        let r = store.insert(record("same", "a")).unwrap();
        let err = store.insert(record("same", "b")).unwrap_err();
        assert_eq!(
            err.error_description(),
            vec!["DB_UNIQUENESS_CONSTRAINT_VIOLATION", "SR", "uuid", "same"]
        );
        // Replacing a record under its own reference is fine.
        assert!(store.put(r, record("same", "c")).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lookups() {
        let mut store = ObjectStore::new("network");
        let a = store.insert(record("ua", "lan")).unwrap();
        let b = store.insert(record("ub", "lan")).unwrap();
        store.insert(record("uc", "wan")).unwrap();

        assert_eq!(store.find_by_uuid("ub").unwrap(), b);
        assert_eq!(store.find_by_uuid("nope").unwrap_err().kind, ErrorKind::UuidInvalid);

        let mut lan = store.find_by_label("lan");
        lan.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(lan, expected);
        assert!(store.find_by_label("dmz").is_empty());
    }

    #[test]
    fn test_retain_reports_removed() {
        let mut store = ObjectStore::new("session");
        let keep = store.insert(record("k", "keep")).unwrap();
        let gone = store.insert(record("d", "drop")).unwrap();

        let removed = store.retain(|_, r| r["name_label"] == Value::from("keep"));
        assert_eq!(removed, vec![gone]);
        assert_eq!(store.refs(), vec![keep]);
    }
}
