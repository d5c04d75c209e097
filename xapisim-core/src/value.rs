//! Untyped values crossing the call boundary.
//!
//! These mirror the XML-RPC value kinds. Entity records are plain
//! string-keyed maps of values; int64 record fields hold decimal strings,
//! the same way XenAPI puts them on the wire.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use uuid::Uuid;

/// The null object reference.
pub const NULL_REF: &str = "OpaqueRef:NULL";

/// Wire format of `dateTime.iso8601` values.
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%SZ";

/// A single entity record: field name to value.
pub type Record = BTreeMap<String, Value>;

/// An untyped call parameter, return value or record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Struct(Record),
}

/// Runtime kind of a [`Value`], used for type validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    String,
    Int,
    Bool,
    Double,
    DateTime,
    Array,
    Struct,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Nil => "nil",
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Bool => "boolean",
            ValueKind::Double => "double",
            ValueKind::DateTime => "datetime",
            ValueKind::Array => "array",
            ValueKind::Struct => "struct",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::String(_) => ValueKind::String,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Double(_) => ValueKind::Double,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Array(_) => ValueKind::Array,
            Value::Struct(_) => ValueKind::Struct,
        }
    }

    /// The empty string, returned by operations that produce no value.
    pub fn empty() -> Self {
        Value::String(String::new())
    }

    /// An empty struct, the default of map fields.
    pub fn empty_map() -> Self {
        Value::Struct(Record::new())
    }

    /// An empty array, the default of list fields.
    pub fn empty_list() -> Self {
        Value::Array(Vec::new())
    }

    /// The Unix epoch, the default of timestamp fields.
    pub fn epoch() -> Self {
        Value::DateTime(DateTime::<Utc>::default())
    }

    /// Array of strings.
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Array(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Struct of string values.
    pub fn string_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Value::Struct(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Record> {
        match self {
            Value::Struct(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Struct(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Struct(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Render a timestamp in XML-RPC `dateTime.iso8601` form.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse an XML-RPC timestamp. Accepts the compact XenAPI form with or
/// without the trailing `Z`, and the dashed ISO 8601 form.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim().trim_end_matches('Z');
    ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Allocate a fresh opaque reference.
pub fn new_ref() -> String {
    format!("OpaqueRef:{}", Uuid::new_v4())
}

/// Allocate a fresh record uuid.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ref_shape() {
        let r = new_ref();
        assert!(r.starts_with("OpaqueRef:"));
        assert!(Uuid::parse_str(&r["OpaqueRef:".len()..]).is_ok());
        assert_ne!(r, new_ref());
    }

    #[test]
    fn test_datetime_wire_format() {
        let dt = Utc.with_ymd_and_hms(2018, 6, 1, 12, 30, 5).unwrap();
        assert_eq!(format_datetime(&dt), "20180601T12:30:05Z");
        assert_eq!(parse_datetime("20180601T12:30:05Z"), Some(dt));
        assert_eq!(parse_datetime("20180601T12:30:05"), Some(dt));
        assert_eq!(parse_datetime("2018-06-01T12:30:05"), Some(dt));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_serialize_matches_xmlrpc_shape() {
        let mut record = Record::new();
        record.insert("name_label".into(), Value::from("vm-1"));
        record.insert("tags".into(), Value::string_list(["a", "b"]));
        record.insert("snapshot_time".into(), Value::epoch());
        record.insert("is_a_template".into(), Value::from(false));

        let json = serde_json::to_value(Value::Struct(record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "is_a_template": false,
                "name_label": "vm-1",
                "snapshot_time": "19700101T00:00:00Z",
                "tags": ["a", "b"],
            })
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Value::empty().kind(), ValueKind::String);
        assert_eq!(Value::empty_map().kind(), ValueKind::Struct);
        assert_eq!(Value::empty_list().kind(), ValueKind::Array);
        assert_eq!(Value::from(1.5).kind(), ValueKind::Double);
        assert_eq!(Value::string_map([("k", "v")]).as_struct().unwrap()["k"], Value::from("v"));
    }
}
