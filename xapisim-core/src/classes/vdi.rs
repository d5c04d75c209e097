//! `VDI` class (virtual disk images).

use chrono::Utc;
use tracing::info;

use super::{acknowledge, link, record_from_args, ref_field, unlink};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_int64, expect_struct, opt_arg};
use crate::schema::FieldTable;
use crate::value::{new_ref, new_uuid, Value, NULL_REF};

const ALLOWED_OPERATIONS: [&str; 17] = [
    "clone",
    "copy",
    "resize",
    "resize_online",
    "snapshot",
    "mirror",
    "destroy",
    "forget",
    "update",
    "force_unlock",
    "generate_config",
    "enable_cbt",
    "disable_cbt",
    "data_destroy",
    "list_changed_blocks",
    "set_on_boot",
    "blocked",
];

fn fields() -> FieldTable {
    FieldTable::new()
        .reference("SR")
        .field("VBDs", Value::empty_list())
        .field("allow_caching", false)
        .field("allowed_operations", Value::empty_list())
        .field("cbt_enabled", false)
        .field("crash_dumps", Value::empty_list())
        .field("current_operations", Value::empty_map())
        .field("is_a_snapshot", false)
        .field("is_tools_iso", false)
        .field("location", "")
        .field("managed", true)
        .field("metadata_latest", false)
        .reference("metadata_of_pool")
        .field("missing", false)
        .field("name_description", "")
        .field("name_label", "")
        .field("on_boot", "persist")
        .reference("parent")
        .int64("physical_utilisation", 0)
        .field("read_only", false)
        .field("sharable", false)
        .field("sm_config", Value::empty_map())
        .reference("snapshot_of")
        .field("snapshot_time", Value::epoch())
        .field("snapshots", Value::empty_list())
        .field("storage_lock", false)
        .field("tags", Value::empty_list())
        .field("type", "user")
        .int64("virtual_size", 0)
        .field("xenstore_data", Value::empty_map())
        .read_write(&[
            "allow_caching",
            "name_description",
            "name_label",
            "on_boot",
            "read_only",
            "sharable",
            "sm_config",
            "tags",
            "xenstore_data",
        ])
        .lists(&["tags"])
        .maps(&["sm_config", "xenstore_data"])
}

pub(crate) fn class() -> Result<ApiClass> {
    let class = ApiClass::new("VDI", fields())
        .with_unimplemented(&[
            "data_destroy",
            "disable_cbt",
            "enable_cbt",
            "get_nbd_info",
            "introduce",
            "list_changed_blocks",
            "open_database",
            "read_database_pool_uuid",
            "resize_online",
        ])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("forget", 1, destroy))
        .with_method(Method::new("resize", 2, resize))
        .with_method(Method::new("snapshot", 2, snapshot))
        .with_method(Method::new("clone", 2, clone))
        // vdi, sr, [base_vdi, into_vdi]
        .with_method(Method::new("copy", 4, copy).with_optional(2))
        .with_method(Method::new("pool_migrate", 3, pool_migrate))
        .with_method(Method::new("update", 1, acknowledge));

    // A disk not yet attached to any SR.
    let mut record = class.fields().default_record();
    let uuid = record.get("uuid").cloned().unwrap_or_else(Value::empty);
    record.insert("location".into(), uuid);
    record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));
    record.insert("name_label".into(), Value::from("disk-1"));
    record.insert("physical_utilisation".into(), Value::from("8615100416"));
    record.insert("virtual_size".into(), Value::from("8615100416"));
    class.seed(&new_ref(), record)?;

    Ok(class)
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &[
            "SR",
            "name_description",
            "name_label",
            "other_config",
            "read_only",
            "sharable",
            "sm_config",
            "tags",
            "type",
            "virtual_size",
            "xenstore_data",
        ],
        &["SR", "virtual_size", "type", "sharable", "read_only", "other_config"],
    )?;

    let srs = api.require_class("SR")?;
    let sr_ref = ref_field(&record, "SR");
    if let Some(sr_ref) = &sr_ref {
        srs.ensure_exists(sr_ref)?;
    }

    let uuid = record.get("uuid").cloned().unwrap_or_else(Value::empty);
    record.insert("location".into(), uuid);
    record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));

    let vdi_ref = class.insert(record)?;
    if let Some(sr_ref) = sr_ref {
        link(srs, &sr_ref, "VDIs", &vdi_ref)?;
    }
    info!(vdi = %vdi_ref, "VDI created");
    Ok(Some(Value::String(vdi_ref)))
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(vdi_ref)?;
    if let Some(sr_ref) = ref_field(&record, "SR") {
        unlink(api.require_class("SR")?, &sr_ref, "VDIs", vdi_ref)?;
    }
    info!(vdi = %vdi_ref, "VDI destroyed");
    Ok(None)
}

fn resize(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    let size = expect_int64(arg(args, 1)?, "size")?;
    class.update(vdi_ref, |record| {
        record.insert("virtual_size".into(), Value::String(size));
        Ok(())
    })?;
    Ok(None)
}

/// Copy a VDI record under a new reference. Snapshots are linked back to
/// their source; every copy lands on `sr` when given, else on the source's SR.
fn duplicate(api: &XenApi, class: &ApiClass, vdi_ref: &str, sr: Option<&str>, as_snapshot: bool) -> Result<String> {
    let (copy_ref, sr_ref) = {
        let mut store = class.write()?;
        let mut copy = store.get(vdi_ref)?.clone();

        let uuid = new_uuid();
        copy.insert("uuid".into(), Value::from(uuid.as_str()));
        copy.insert("location".into(), Value::String(uuid));
        copy.insert("VBDs".into(), Value::empty_list());
        copy.insert("snapshots".into(), Value::empty_list());
        copy.insert("current_operations".into(), Value::empty_map());
        if let Some(sr) = sr {
            copy.insert("SR".into(), Value::from(sr));
        }
        if as_snapshot {
            copy.insert("is_a_snapshot".into(), Value::Bool(true));
            copy.insert("snapshot_of".into(), Value::from(vdi_ref));
            copy.insert("snapshot_time".into(), Value::DateTime(Utc::now()));
        } else {
            copy.insert("is_a_snapshot".into(), Value::Bool(false));
            copy.insert("snapshot_of".into(), Value::from(NULL_REF));
        }
        let sr_ref = ref_field(&copy, "SR");

        let copy_ref = store.insert(copy)?;
        if as_snapshot {
            if let Some(list) = store
                .get_mut(vdi_ref)?
                .get_mut("snapshots")
                .and_then(Value::as_array_mut)
            {
                list.push(Value::from(copy_ref.as_str()));
            }
        }
        (copy_ref, sr_ref)
    };

    if let Some(sr_ref) = sr_ref {
        link(api.require_class("SR")?, &sr_ref, "VDIs", &copy_ref)?;
    }
    Ok(copy_ref)
}

fn snapshot(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    expect_struct(arg(args, 1)?, "driver_params")?;
    let snapshot_ref = duplicate(api, class, vdi_ref, None, true)?;
    Ok(Some(Value::String(snapshot_ref)))
}

fn clone(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    expect_struct(arg(args, 1)?, "driver_params")?;
    let clone_ref = duplicate(api, class, vdi_ref, None, false)?;
    Ok(Some(Value::String(clone_ref)))
}

fn copy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let srs = api.require_class("SR")?;
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    let sr_ref = srs.check_ref(arg(args, 1)?)?;
    let base_vdi = opt_arg(args, 2).map(|v| class.check_ref(v)).transpose()?;
    let into_vdi = opt_arg(args, 3).map(|v| class.check_ref(v)).transpose()?;

    class.ensure_exists(vdi_ref)?;
    srs.ensure_exists(sr_ref)?;
    for other in base_vdi.into_iter().chain(into_vdi).filter(|r| *r != NULL_REF) {
        class.ensure_exists(other)?;
    }

    let copy_ref = duplicate(api, class, vdi_ref, Some(sr_ref), false)?;
    Ok(Some(Value::String(copy_ref)))
}

fn pool_migrate(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let srs = api.require_class("SR")?;
    let vdi_ref = class.check_ref(arg(args, 0)?)?;
    let sr_ref = srs.check_ref(arg(args, 1)?)?;
    expect_struct(arg(args, 2)?, "options")?;

    class.ensure_exists(vdi_ref)?;
    srs.ensure_exists(sr_ref)?;

    let previous = class.update(vdi_ref, |record| {
        let previous = ref_field(record, "SR");
        record.insert("SR".into(), Value::from(sr_ref));
        Ok(previous)
    })?;
    if let Some(previous) = previous {
        unlink(srs, &previous, "VDIs", vdi_ref)?;
    }
    link(srs, sr_ref, "VDIs", vdi_ref)?;

    Ok(Some(Value::from(vdi_ref)))
}
