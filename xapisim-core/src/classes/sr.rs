//! `SR` class (storage repositories).

use tracing::info;

use super::{acknowledge, pbd, ref_list, Seed};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, ErrorKind, Result};
use crate::method::Method;
use crate::params::{arg, expect_bool, expect_int64, expect_str, expect_struct};
use crate::schema::FieldTable;
use crate::value::{Record, Value};

const ALLOWED_OPERATIONS: [&str; 20] = [
    "scan",
    "destroy",
    "forget",
    "plug",
    "unplug",
    "update",
    "vdi_create",
    "vdi_introduce",
    "vdi_destroy",
    "vdi_resize",
    "vdi_clone",
    "vdi_snapshot",
    "vdi_mirror",
    "vdi_enable_cbt",
    "vdi_disable_cbt",
    "vdi_data_destroy",
    "vdi_list_changed_blocks",
    "vdi_set_on_boot",
    "pbd_create",
    "pbd_destroy",
];

const SUPPORTED_TYPES: [&str; 13] = [
    "smb", "iso", "lvm", "nfs", "hba", "lvmofcoe", "udev", "dummy", "ext", "lvmohba", "lvmoiscsi",
    "file", "iscsi",
];

fn fields() -> FieldTable {
    FieldTable::new()
        .field("PBDs", Value::empty_list())
        .field("VDIs", Value::empty_list())
        .field("allowed_operations", Value::empty_list())
        .field("blobs", Value::empty_map())
        .field("clustered", false)
        .field("content_type", "")
        .field("current_operations", Value::empty_map())
        .reference("introduced_by")
        .field("is_tools_sr", false)
        .field("local_cache_enabled", false)
        .field("name_description", "")
        .field("name_label", "")
        .int64("physical_size", 0)
        .int64("physical_utilisation", 0)
        .field("shared", false)
        .field("sm_config", Value::empty_map())
        .field("tags", Value::empty_list())
        .field("type", "")
        .int64("virtual_allocation", 0)
        .read_write(&[
            "name_description",
            "name_label",
            "physical_size",
            "shared",
            "sm_config",
            "tags",
        ])
        .lists(&["tags"])
        .maps(&["sm_config"])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("SR", fields())
        .with_unimplemented(&[
            "create_new_blob",
            "disable_database_replication",
            "enable_database_replication",
            "forget_data_source_archives",
            "get_data_sources",
            "make",
            "probe_ext",
            "query_data_source",
            "record_data_source",
        ])
        .with_method(Method::new("create", 9, create))
        .with_method(Method::new("introduce", 7, introduce))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("forget", 1, forget))
        .with_method(Method::new("get_supported_types", 0, get_supported_types))
        .with_method(Method::new("probe", 4, probe))
        .with_method(Method::new("scan", 1, acknowledge))
        .with_method(Method::new("update", 1, acknowledge))
        .with_method(Method::new("assert_can_host_ha_statefile", 1, assert_shared_capable))
        .with_method(Method::new(
            "assert_supports_database_replication",
            1,
            assert_shared_capable,
        ));

    let mut record = class.fields().default_record();
    record.insert("PBDs".into(), Value::string_list([seed.local_pbd.as_str()]));
    record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));
    record.insert("content_type".into(), Value::from("user"));
    record.insert("local_cache_enabled".into(), Value::Bool(true));
    record.insert("name_label".into(), Value::from("Local storage"));
    record.insert(
        "other_config".into(),
        Value::string_map([
            ("i18n-key", "local-storage"),
            ("i18n-original-value-name_label", "Local storage"),
        ]),
    );
    record.insert("physical_size".into(), Value::from("2199006478336"));
    record.insert(
        "sm_config".into(),
        Value::string_map([("devserial", "scsi-355cd2e404b5f035e")]),
    );
    record.insert("type".into(), Value::from("ext"));
    class.seed(&seed.local_sr, record)?;

    Ok(class)
}

/// Arguments shared by `create` and `introduce`, validated in call order.
struct SrDescription {
    name_label: String,
    name_description: String,
    sr_type: String,
    content_type: String,
    shared: bool,
    sm_config: Record,
}

impl SrDescription {
    fn from_args(args: &[Value], first: usize) -> Result<Self> {
        Ok(Self {
            name_label: expect_str(arg(args, first)?, "name_label")?.to_string(),
            name_description: expect_str(arg(args, first + 1)?, "name_description")?.to_string(),
            sr_type: expect_str(arg(args, first + 2)?, "type")?.to_string(),
            content_type: expect_str(arg(args, first + 3)?, "content_type")?.to_string(),
            shared: expect_bool(arg(args, first + 4)?, "shared")?,
            sm_config: expect_struct(arg(args, first + 5)?, "sm_config")?.clone(),
        })
    }

    fn apply(self, record: &mut Record) {
        record.insert("name_label".into(), Value::String(self.name_label));
        record.insert("name_description".into(), Value::String(self.name_description));
        record.insert("type".into(), Value::String(self.sr_type));
        record.insert("content_type".into(), Value::String(self.content_type));
        record.insert("shared".into(), Value::Bool(self.shared));
        record.insert("sm_config".into(), Value::Struct(self.sm_config));
        record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));
    }
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let host_ref = hosts.check_ref(arg(args, 0)?)?;
    let device_config = expect_struct(arg(args, 1)?, "device_config")?.clone();
    let physical_size = expect_int64(arg(args, 2)?, "physical_size")?;
    let description = SrDescription::from_args(args, 3)?;
    hosts.ensure_exists(host_ref)?;

    let mut record = class.fields().default_record();
    description.apply(&mut record);
    record.insert("physical_size".into(), Value::String(physical_size));

    let sr_ref = class.insert(record)?;
    // Plugged into the host on creation.
    let pbd_ref = pbd::attach(api, &sr_ref, host_ref, device_config)?;
    info!(sr = %sr_ref, host = %host_ref, pbd = %pbd_ref, "SR created");
    Ok(Some(Value::String(sr_ref)))
}

/// Introduce an existing SR under a client-supplied uuid. No PBDs.
fn introduce(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let uuid = expect_str(arg(args, 0)?, "uuid")?;
    let description = SrDescription::from_args(args, 1)?;

    let mut record = class.fields().default_record();
    description.apply(&mut record);
    record.insert("uuid".into(), Value::from(uuid));

    let sr_ref = class.insert(record)?;
    info!(sr = %sr_ref, uuid = %uuid, "SR introduced");
    Ok(Some(Value::String(sr_ref)))
}

/// Drop the SR record together with the PBDs plugging it in.
fn remove(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<String> {
    let sr_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(sr_ref)?;

    let pbds = api.require_class("PBD")?;
    for pbd_ref in ref_list(&record, "PBDs") {
        if pbds.ensure_exists(&pbd_ref).is_ok() {
            pbd::remove(api, &pbd_ref)?;
        }
    }
    Ok(sr_ref.to_string())
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let sr_ref = remove(api, class, args)?;
    info!(sr = %sr_ref, "SR destroyed");
    Ok(None)
}

fn forget(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let sr_ref = remove(api, class, args)?;
    info!(sr = %sr_ref, "SR forgotten");
    Ok(None)
}

fn get_supported_types(_api: &XenApi, _class: &ApiClass, _args: &[Value]) -> Result<Option<Value>> {
    Ok(Some(Value::string_list(SUPPORTED_TYPES)))
}

fn probe(api: &XenApi, _class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let host_ref = hosts.check_ref(arg(args, 0)?)?;
    expect_struct(arg(args, 1)?, "device_config")?;
    expect_str(arg(args, 2)?, "type")?;
    expect_struct(arg(args, 3)?, "sm_config")?;
    hosts.ensure_exists(host_ref)?;
    Ok(Some(Value::empty()))
}

/// The SR must be plugged somewhere and must not be the tools SR.
fn assert_shared_capable(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let sr_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.get_record(sr_ref)?;

    let plugged = record
        .get("PBDs")
        .and_then(Value::as_array)
        .map(|pbds| !pbds.is_empty())
        .unwrap_or(false);
    if !plugged {
        return Err(ApiError::new(ErrorKind::SrHasNoPbds, [sr_ref]));
    }
    if record.get("is_tools_sr") == Some(&Value::Bool(true)) {
        return Err(ApiError::new(ErrorKind::SrOperationNotSupported, [sr_ref]));
    }
    Ok(None)
}
