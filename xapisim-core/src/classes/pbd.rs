//! `PBD` class: the plug between an SR and a host.

use tracing::info;

use super::{link, record_from_args, ref_field, unlink, Seed};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_struct};
use crate::schema::FieldTable;
use crate::value::{Record, Value};

fn fields() -> FieldTable {
    FieldTable::new()
        .reference("SR")
        .field("currently_attached", true)
        .field("device_config", Value::empty_map())
        .reference("host")
        .read_write(&["device_config"])
        .maps(&["device_config"])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("PBD", fields())
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("plug", 1, plug))
        .with_method(Method::new("unplug", 1, unplug));

    let mut record = class.fields().default_record();
    record.insert("SR".into(), Value::from(seed.local_sr.as_str()));
    record.insert("host".into(), Value::from(seed.this_host.as_str()));
    record.insert(
        "device_config".into(),
        Value::string_map([("location", "/dev/xapi/block")]),
    );
    class.seed(&seed.local_pbd, record)?;

    Ok(class)
}

/// Store a PBD and link it into `SR.PBDs` and `host.PBDs`.
fn plug_in(api: &XenApi, class: &ApiClass, record: Record) -> Result<String> {
    let sr_ref = ref_field(&record, "SR");
    let host_ref = ref_field(&record, "host");

    let pbd_ref = class.insert(record)?;
    if let Some(sr_ref) = sr_ref {
        link(api.require_class("SR")?, &sr_ref, "PBDs", &pbd_ref)?;
    }
    if let Some(host_ref) = host_ref {
        link(api.require_class("host")?, &host_ref, "PBDs", &pbd_ref)?;
    }
    Ok(pbd_ref)
}

/// Plug a freshly created SR into `host_ref`.
pub(super) fn attach(api: &XenApi, sr_ref: &str, host_ref: &str, device_config: Record) -> Result<String> {
    let class = api.require_class("PBD")?;
    let mut record = class.fields().default_record();
    record.insert("SR".into(), Value::from(sr_ref));
    record.insert("host".into(), Value::from(host_ref));
    record.insert("device_config".into(), Value::Struct(device_config));
    plug_in(api, class, record)
}

/// Remove a PBD and its back-references from the SR and host.
pub(super) fn remove(api: &XenApi, pbd_ref: &str) -> Result<()> {
    let class = api.require_class("PBD")?;
    let record = class.destroy(pbd_ref)?;
    if let Some(sr_ref) = ref_field(&record, "SR") {
        unlink(api.require_class("SR")?, &sr_ref, "PBDs", pbd_ref)?;
    }
    if let Some(host_ref) = ref_field(&record, "host") {
        unlink(api.require_class("host")?, &host_ref, "PBDs", pbd_ref)?;
    }
    Ok(())
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let record = record_from_args(
        class.fields(),
        requested,
        &["SR", "device_config", "host", "other_config"],
        &["host", "SR", "device_config"],
    )?;

    if let Some(host_ref) = ref_field(&record, "host") {
        api.require_class("host")?.ensure_exists(&host_ref)?;
    }
    if let Some(sr_ref) = ref_field(&record, "SR") {
        api.require_class("SR")?.ensure_exists(&sr_ref)?;
    }

    let pbd_ref = plug_in(api, class, record)?;
    info!(pbd = %pbd_ref, "PBD created");
    Ok(Some(Value::String(pbd_ref)))
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let pbd_ref = class.check_ref(arg(args, 0)?)?;
    remove(api, pbd_ref)?;
    info!(pbd = %pbd_ref, "PBD destroyed");
    Ok(None)
}

fn set_attached(class: &ApiClass, args: &[Value], attached: bool) -> Result<Option<Value>> {
    let pbd_ref = class.check_ref(arg(args, 0)?)?;
    class.update(pbd_ref, |record| {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_local_pbd() {
        let seed = Seed::new();
        let class = class(&seed).unwrap();
        let record = class.get_record(&seed.local_pbd).unwrap();
        assert_eq!(record["SR"], Value::from(seed.local_sr.as_str()));
        assert_eq!(record["host"], Value::from(seed.this_host.as_str()));
        assert_eq!(record["currently_attached"], Value::Bool(true));
        assert!(class.fields().is_map("device_config"));
    }
}
