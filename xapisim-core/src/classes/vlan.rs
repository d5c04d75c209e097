//! `VLAN` class: a tagged PIF and the untagged PIF derived from it.

use tracing::info;

use super::{link, pif, ref_field, unlink};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_int64};
use crate::schema::FieldTable;
use crate::value::Value;

fn fields() -> FieldTable {
    FieldTable::new()
        .int64("tag", -1)
        .reference("tagged_PIF")
        .reference("untagged_PIF")
}

pub(crate) fn class() -> ApiClass {
    ApiClass::new("VLAN", fields())
        .with_method(Method::new("create", 3, create))
        .with_method(Method::new("destroy", 1, destroy))
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let pifs = api.require_class("PIF")?;
    let networks = api.require_class("network")?;

    let tagged = pifs.check_ref(arg(args, 0)?)?;
    let tag = expect_int64(arg(args, 1)?, "tag")?;
    let network_ref = networks.check_ref(arg(args, 2)?)?;
    pifs.ensure_exists(tagged)?;
    networks.ensure_exists(network_ref)?;

    let untagged = pif::derive(api, tagged, network_ref, None, &tag)?;

    let mut record = class.fields().default_record();
    record.insert("tag".into(), Value::String(tag.clone()));
    record.insert("tagged_PIF".into(), Value::from(tagged));
    record.insert("untagged_PIF".into(), Value::from(untagged.as_str()));
    let vlan_ref = class.insert(record)?;

    pifs.update(&untagged, |record| {
        record.insert("VLAN_master_of".into(), Value::from(vlan_ref.as_str()));
        Ok(())
    })?;
    link(pifs, tagged, "VLAN_slave_of", &vlan_ref)?;

    info!(vlan = %vlan_ref, tag = %tag, pif = %untagged, "VLAN created");
    Ok(Some(Value::String(vlan_ref)))
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vlan_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(vlan_ref)?;

    let pifs = api.require_class("PIF")?;
    if let Some(untagged) = ref_field(&record, "untagged_PIF") {
        if pifs.ensure_exists(&untagged).is_ok() {
            pif::remove(api, &untagged)?;
        }
    }
    if let Some(tagged) = ref_field(&record, "tagged_PIF") {
        unlink(pifs, &tagged, "VLAN_slave_of", vlan_ref)?;
    }

    info!(vlan = %vlan_ref, "VLAN destroyed");
    Ok(None)
}
