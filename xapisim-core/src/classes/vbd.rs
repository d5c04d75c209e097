//! `VBD` class (virtual block devices joining a VM to a VDI).

use tracing::info;

use super::{acknowledge, link, record_from_args, ref_field, unlink};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, ErrorKind, Result};
use crate::method::Method;
use crate::params::{arg, expect_struct};
use crate::schema::FieldTable;
use crate::value::{Record, Value, NULL_REF};

fn fields() -> FieldTable {
    FieldTable::new()
        .reference("VDI")
        .reference("VM")
        .field("allowed_operations", Value::empty_list())
        .field("bootable", true)
        .field("current_operations", Value::empty_map())
        .field("currently_attached", false)
        .field("device", "")
        .field("empty", false)
        .reference("metrics")
        .field("mode", "RW")
        .field("qos_algorithm_params", Value::empty_map())
        .field("qos_algorithm_type", "")
        .field("qos_supported_algorithms", Value::empty_list())
        .field("runtime_properties", Value::empty_map())
        .int64("status_code", 0)
        .field("status_detail", "")
        .field("storage_lock", false)
        .field("type", "Disk")
        .field("unpluggable", true)
        .field("userdevice", "0")
        .read_write(&[
            "bootable",
            "mode",
            "qos_algorithm_params",
            "qos_algorithm_type",
            "type",
            "unpluggable",
            "userdevice",
        ])
        .maps(&["qos_algorithm_params"])
}

pub(crate) fn class() -> ApiClass {
    ApiClass::new("VBD", fields())
        .with_unimplemented(&["pause", "unpause"])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("eject", 1, eject))
        .with_method(Method::new("insert", 2, insert))
        .with_method(Method::new("plug", 1, plug))
        .with_method(Method::new("unplug", 1, unplug))
        .with_method(Method::new("unplug_force", 1, unplug))
        .with_method(Method::new("assert_attachable", 1, acknowledge))
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &[
            "VM",
            "VDI",
            "bootable",
            "empty",
            "mode",
            "other_config",
            "qos_algorithm_params",
            "qos_algorithm_type",
            "type",
            "unpluggable",
            "userdevice",
        ],
        &[
            "VM",
            "VDI",
            "userdevice",
            "bootable",
            "mode",
            "type",
            "empty",
            "other_config",
            "qos_algorithm_type",
            "qos_algorithm_params",
        ],
    )?;

    let vms = api.require_class("VM")?;
    let vdis = api.require_class("VDI")?;
    let vm_ref = ref_field(&record, "VM")
        .ok_or_else(|| ApiError::handle_invalid("VM", NULL_REF))?;
    vms.ensure_exists(&vm_ref)?;
    // Empty CD drives carry a null VDI.
    let vdi_ref = ref_field(&record, "VDI");
    if let Some(vdi_ref) = &vdi_ref {
        vdis.ensure_exists(vdi_ref)?;
    }

    record.insert(
        "allowed_operations".into(),
        Value::string_list(["attach", "eject", "insert", "plug", "unplug", "unplug_force"]),
    );
    record.insert("currently_attached".into(), Value::Bool(false));
    let device = record.get("userdevice").cloned().unwrap_or_else(Value::empty);
    record.insert("device".into(), device);

    let vbd_ref = class.insert(record)?;
    link(vms, &vm_ref, "VBDs", &vbd_ref)?;
    if let Some(vdi_ref) = vdi_ref {
        link(vdis, &vdi_ref, "VBDs", &vbd_ref)?;
    }
    info!(vbd = %vbd_ref, vm = %vm_ref, "VBD created");
    Ok(Some(Value::String(vbd_ref)))
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vbd_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(vbd_ref)?;
    if let Some(vm_ref) = ref_field(&record, "VM") {
        unlink(api.require_class("VM")?, &vm_ref, "VBDs", vbd_ref)?;
    }
    if let Some(vdi_ref) = ref_field(&record, "VDI") {
        unlink(api.require_class("VDI")?, &vdi_ref, "VBDs", vbd_ref)?;
    }
    info!(vbd = %vbd_ref, "VBD destroyed");
    Ok(None)
}

fn is_removable(record: &Record) -> bool {
    record.get("type").and_then(Value::as_str) != Some("Disk")
}

fn is_empty(record: &Record) -> bool {
    record.get("empty") == Some(&Value::Bool(true))
}

fn eject(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vbd_ref = class.check_ref(arg(args, 0)?)?;
    let ejected = class.update(vbd_ref, |record| {
        if !is_removable(record) {
            return Err(ApiError::new(ErrorKind::VbdNotRemovableMedia, [vbd_ref]));
        }
        if is_empty(record) {
            return Err(ApiError::new(ErrorKind::VbdIsEmpty, [vbd_ref]));
        }
        let ejected = ref_field(record, "VDI");
        record.insert("VDI".into(), Value::from(NULL_REF));
        record.insert("empty".into(), Value::Bool(true));
        Ok(ejected)
    })?;

    if let Some(vdi_ref) = ejected {
        unlink(api.require_class("VDI")?, &vdi_ref, "VBDs", vbd_ref)?;
    }
    Ok(None)
}

fn insert(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vdis = api.require_class("VDI")?;
    let vbd_ref = class.check_ref(arg(args, 0)?)?;
    let vdi_ref = vdis.check_ref(arg(args, 1)?)?;
    class.ensure_exists(vbd_ref)?;
    vdis.ensure_exists(vdi_ref)?;

    class.update(vbd_ref, |record| {
        if !is_removable(record) {
            return Err(ApiError::new(ErrorKind::VbdNotRemovableMedia, [vbd_ref]));
        }
        if !is_empty(record) {
            return Err(ApiError::new(ErrorKind::VbdNotEmpty, [vbd_ref]));
        }
        record.insert("VDI".into(), Value::from(vdi_ref));
        record.insert("empty".into(), Value::Bool(false));
        Ok(())
    })?;

    link(vdis, vdi_ref, "VBDs", vbd_ref)?;
    Ok(None)
}

fn set_attached(class: &ApiClass, args: &[Value], attached: bool) -> Result<Option<Value>> {
    let vbd_ref = class.check_ref(arg(args, 0)?)?;
    class.update(vbd_ref, |record| {
        record.insert("currently_attached".into(), Value::Bool(attached));
        Ok(())
    })?;
    Ok(None)
}

fn plug(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    set_attached(class, args, true)
}

fn unplug(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    set_attached(class, args, false)
}
