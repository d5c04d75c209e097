//! Entity classes of the simulated service.
//!
//! Each submodule declares one class: its field table, seed records,
//! unimplemented operations and hand-written methods. Everything else a
//! client can call on a class is synthesized from the field table.

use tracing::info;

use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::params::{arg, expect_int64};
use crate::schema::FieldTable;
use crate::value::{new_ref, Record, Value, NULL_REF};

mod bond;
mod host;
mod inventory;
mod network;
mod pbd;
mod pif;
mod pool;
mod session;
mod sr;
mod task;
mod vbd;
mod vdi;
mod vif;
mod vlan;
mod vm;
mod vm_appliance;

/// References the seed records of several classes point at.
#[derive(Debug, Clone)]
pub(crate) struct Seed {
    /// The simulated host
    pub this_host: String,
    /// Its control domain VM
    pub dom0: String,
    pub dom0_metrics: String,
    pub host_cpu: String,
    pub host_metrics: String,
    /// Local storage SR and the PBD plugging it into this host
    pub local_sr: String,
    pub local_pbd: String,
    /// Management interface of this host and its NIC
    pub management_pif: String,
    pub pif_metrics: String,
    pub nic: String,
}

impl Seed {
    /// Fresh references for every seed record.
    pub fn new() -> Self {
        Self {
            this_host: new_ref(),
            dom0: new_ref(),
            dom0_metrics: new_ref(),
            host_cpu: new_ref(),
            host_metrics: new_ref(),
            local_sr: new_ref(),
            local_pbd: new_ref(),
            management_pif: new_ref(),
            pif_metrics: new_ref(),
            nic: new_ref(),
        }
    }
}

/// Build every class with its seed records.
pub(crate) fn all(seed: &Seed) -> Result<Vec<ApiClass>> {
    Ok(vec![
        session::class(),
        host::class(seed)?,
        inventory::host_cpu(seed)?,
        inventory::host_metrics(seed)?,
        pool::class(seed)?,
        network::class()?,
        pbd::class(seed)?,
        pif::class(seed)?,
        inventory::pif_metrics(seed)?,
        bond::class(),
        inventory::pci(seed)?,
        sr::class(seed)?,
        task::class(),
        vbd::class(),
        inventory::vbd_metrics()?,
        vdi::class()?,
        vif::class(),
        inventory::vif_metrics()?,
        vlan::class(),
        vm::class(seed)?,
        vm_appliance::class()?,
        inventory::vm_guest_metrics()?,
        inventory::vm_metrics(seed)?,
    ])
}

/// Build a record for `create` from a client-supplied argument struct.
///
/// Only `allowed` fields are taken from `args`; each must match its declared
/// kind (int64 fields accept ints or decimal strings). Every type check runs
/// before the `required` presence check, and nothing is stored here.
pub(crate) fn record_from_args(
    fields: &FieldTable,
    args: &Record,
    allowed: &[&str],
    required: &[&str],
) -> Result<Record> {
    let mut record = fields.default_record();

    for name in allowed {
        if let Some(value) = args.get(*name) {
            let value = if fields.is_int64(name) {
                Value::String(expect_int64(value, name)?)
            } else if fields.declared_kind(name) == Some(value.kind()) {
                value.clone()
            } else {
                return Err(ApiError::field_type(*name));
            };
            record.insert(name.to_string(), value);
        }
    }

    if let Some(missing) = required.iter().find(|name| !args.contains_key(**name)) {
        return Err(ApiError::field_missing(*missing));
    }

    Ok(record)
}

/// Reference checks only, for operations with no simulated effect.
pub(crate) fn acknowledge(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    Ok(None)
}

pub(crate) fn destroy(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let obj_ref = class.check_ref(arg(args, 0)?)?;
    class.destroy(obj_ref)?;
    info!(class = class.name(), obj_ref = %obj_ref, "Record destroyed");
    Ok(None)
}

/// Append `value` to a list field of another record, if that record still
/// exists. Cross-class back-references are best effort.
pub(crate) fn link(class: &ApiClass, obj_ref: &str, field: &str, value: &str) -> Result<()> {
    let mut store = class.write()?;
    if let Ok(record) = store.get_mut(obj_ref) {
        if let Some(list) = record.get_mut(field).and_then(Value::as_array_mut) {
            let value = Value::from(value);
            if !list.contains(&value) {
                list.push(value);
            }
        }
    }
    Ok(())
}

/// Remove `value` from a list field of another record, if it still exists.
pub(crate) fn unlink(class: &ApiClass, obj_ref: &str, field: &str, value: &str) -> Result<()> {
    let mut store = class.write()?;
    if let Ok(record) = store.get_mut(obj_ref) {
        if let Some(list) = record.get_mut(field).and_then(Value::as_array_mut) {
            list.retain(|item| item.as_str() != Some(value));
        }
    }
    Ok(())
}

/// Reference held in a record field, if it is set and not null.
pub(crate) fn ref_field(record: &Record, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty() && *r != NULL_REF)
        .map(str::to_string)
}

/// References held in a list field, skipping null entries.
pub(crate) fn ref_list(record: &Record, field: &str) -> Vec<String> {
    record
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|r| !r.is_empty() && *r != NULL_REF)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Set a single-valued field of another record, if that record still exists.
pub(crate) fn set_field(class: &ApiClass, obj_ref: &str, field: &str, value: Value) -> Result<()> {
    let mut store = class.write()?;
    if let Ok(record) = store.get_mut(obj_ref) {
        record.insert(field.to_string(), value);
    }
    Ok(())
}

/// An int64 record field as a number; malformed or missing reads as zero.
pub(crate) fn int_field(record: &Record, field: &str) -> i64 {
    record
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fields() -> FieldTable {
        FieldTable::new()
            .field("name_label", "")
            .int64("virtual_size", 0)
            .field("sharable", false)
    }

    fn args(entries: Vec<(&str, Value)>) -> Record {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_record_from_args() {
        let record = record_from_args(
            &fields(),
            &args(vec![
                ("name_label", Value::from("disk")),
                ("virtual_size", Value::Int(1024)),
                ("uuid", Value::from("client-chosen")),
            ]),
            &["name_label", "virtual_size", "sharable"],
            &["virtual_size"],
        )
        .unwrap();

        assert_eq!(record["name_label"], Value::from("disk"));
        assert_eq!(record["virtual_size"], Value::from("1024"));
        assert_eq!(record["sharable"], Value::Bool(false));
        // Fields outside the allowed list are ignored.
        assert_ne!(record["uuid"], Value::from("client-chosen"));
    }

    #[test]
    fn test_type_errors_win_over_missing_fields() {
        let err = record_from_args(
            &fields(),
            &args(vec![("sharable", Value::from("yes"))]),
            &["name_label", "virtual_size", "sharable"],
            &["virtual_size"],
        )
        .unwrap_err();
        assert_eq!(err.error_description(), vec!["FIELD_TYPE_ERROR", "sharable"]);

        let err = record_from_args(
            &fields(),
            &args(vec![("sharable", Value::Bool(true))]),
            &["name_label", "virtual_size", "sharable"],
            &["virtual_size"],
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldMissing);
        assert_eq!(err.details, vec!["virtual_size"]);
    }

    #[test]
    fn test_field_helpers() {
        let record = args(vec![
            ("VM", Value::from("OpaqueRef:NULL")),
            ("VDI", Value::from("OpaqueRef:abc")),
            ("size", Value::from("12")),
        ]);
        assert_eq!(ref_field(&record, "VM"), None);
        assert_eq!(ref_field(&record, "VDI").as_deref(), Some("OpaqueRef:abc"));
        assert_eq!(int_field(&record, "size"), 12);
        assert_eq!(int_field(&record, "missing"), 0);

        let mut record = record;
        record.insert(
            "PIFs".into(),
            Value::string_list(["OpaqueRef:a", "OpaqueRef:NULL", "OpaqueRef:b"]),
        );
        assert_eq!(ref_list(&record, "PIFs"), vec!["OpaqueRef:a", "OpaqueRef:b"]);
        assert!(ref_list(&record, "VM").is_empty());
    }

    #[test]
    fn test_seed_refs_are_distinct() {
        let seed = Seed::new();
        let refs = [
            &seed.this_host,
            &seed.dom0,
            &seed.local_sr,
            &seed.local_pbd,
            &seed.management_pif,
        ];
        for (i, a) in refs.iter().enumerate() {
            for b in &refs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
