//! Synthesized field accessors.
//!
//! Operation names such as `get_name_label` or `add_to_other_config` are
//! resolved against a class's [`FieldTable`] through a fixed, ordered
//! prefix table. No per-field code exists anywhere.

use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::params::{arg, expect_str};
use crate::schema::FieldTable;
use crate::value::Value;

/// A generic operation on one field of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// `get_<field>(ref)`
    Get(String),
    /// `set_<field>(ref, value)`
    Set(String),
    /// `add_to_<field>(ref, key, value)`
    AddToMap(String),
    /// `remove_from_<field>(ref, key)`
    RemoveFromMap(String),
    /// `add_<field>(ref, value)`
    AddToList(String),
    /// `remove_<field>(ref, value)`
    RemoveFromList(String),
}

struct Rule {
    prefix: &'static str,
    applies: fn(&FieldTable, &str) -> bool,
    build: fn(String) -> Accessor,
}

// Order matters: `add_to_`/`remove_from_` must win over `add_`/`remove_`.
const RULES: [Rule; 6] = [
    Rule {
        prefix: "get_",
        applies: FieldTable::has_field,
        build: Accessor::Get,
    },
    Rule {
        prefix: "set_",
        applies: FieldTable::is_read_write,
        build: Accessor::Set,
    },
    Rule {
        prefix: "add_to_",
        applies: FieldTable::is_map,
        build: Accessor::AddToMap,
    },
    Rule {
        prefix: "remove_from_",
        applies: FieldTable::is_map,
        build: Accessor::RemoveFromMap,
    },
    Rule {
        prefix: "add_",
        applies: FieldTable::is_list,
        build: Accessor::AddToList,
    },
    Rule {
        prefix: "remove_",
        applies: FieldTable::is_list,
        build: Accessor::RemoveFromList,
    },
];

impl Accessor {
    /// Resolve an operation name against a field table.
    pub fn resolve(fields: &FieldTable, op: &str) -> Option<Accessor> {
        RULES.iter().find_map(|rule| {
            let field = op.strip_prefix(rule.prefix)?;
            (rule.applies)(fields, field).then(|| (rule.build)(field.to_string()))
        })
    }

    /// Declared parameter count, session token excluded.
    pub fn arity(&self) -> usize {
        match self {
            Accessor::Get(_) => 1,
            Accessor::Set(_) => 2,
            Accessor::AddToMap(_) => 3,
            Accessor::RemoveFromMap(_) => 2,
            Accessor::AddToList(_) => 2,
            Accessor::RemoveFromList(_) => 2,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Accessor::Get(f)
            | Accessor::Set(f)
            | Accessor::AddToMap(f)
            | Accessor::RemoveFromMap(f)
            | Accessor::AddToList(f)
            | Accessor::RemoveFromList(f) => f,
        }
    }

    /// Run the accessor. Checks run in a fixed order: reference type,
    /// then value types, then reference existence.
    pub fn apply(&self, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
        let obj_ref = class.check_ref(arg(args, 0)?)?;
        let field = self.field();

        match self {
            Accessor::Get(_) => {
                let store = class.read()?;
                let record = store.get(obj_ref)?;
                let value = match record.get(field) {
                    Some(value) => value.clone(),
                    None => class.fields().default_record().remove(field).unwrap_or(Value::Nil),
                };
                Ok(Some(value))
            }
            Accessor::Set(_) => {
                let value = arg(args, 1)?;
                let non_finite = matches!(value, Value::Double(d) if !d.is_finite());
                if non_finite || class.fields().declared_kind(field) != Some(value.kind()) {
                    return Err(ApiError::field_type("value"));
                }
                let mut store = class.write()?;
                let record = store.get_mut(obj_ref)?;
                record.insert(field.to_string(), value.clone());
                Ok(None)
            }
            Accessor::AddToMap(_) => {
                let key = expect_str(arg(args, 1)?, "key")?;
                let value = expect_str(arg(args, 2)?, "value")?;
                let mut store = class.write()?;
                let record = store.get_mut(obj_ref)?;
                let map = record
                    .entry(field.to_string())
                    .or_insert_with(Value::empty_map)
                    .as_struct_mut()
                    .ok_or_else(|| ApiError::internal(format!("{} is not a map", field)))?;
                if map.contains_key(key) {
                    return Err(ApiError::map_duplicate_key(class.name(), field, obj_ref, key));
                }
                map.insert(key.to_string(), Value::from(value));
                Ok(None)
            }
            Accessor::RemoveFromMap(_) => {
                let key = expect_str(arg(args, 1)?, "key")?;
                let mut store = class.write()?;
                let record = store.get_mut(obj_ref)?;
                if let Some(map) = record.get_mut(field).and_then(Value::as_struct_mut) {
                    map.remove(key);
                }
                Ok(None)
            }
            Accessor::AddToList(_) => {
                let value = Value::from(expect_str(arg(args, 1)?, "value")?);
                let mut store = class.write()?;
                let record = store.get_mut(obj_ref)?;
                let list = record
                    .entry(field.to_string())
                    .or_insert_with(Value::empty_list)
                    .as_array_mut()
                    .ok_or_else(|| ApiError::internal(format!("{} is not a list", field)))?;
                if !list.contains(&value) {
                    list.push(value);
                }
                Ok(None)
            }
            Accessor::RemoveFromList(_) => {
                let value = Value::from(expect_str(arg(args, 1)?, "value")?);
                let mut store = class.write()?;
                let record = store.get_mut(obj_ref)?;
                if let Some(list) = record.get_mut(field).and_then(Value::as_array_mut) {
                    list.retain(|item| *item != value);
                }
                Ok(None)
            }
        }
    }
}
