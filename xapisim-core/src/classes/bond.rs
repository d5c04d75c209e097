//! `Bond` class: PIFs aggregated behind a derived master PIF.

use tracing::info;

use super::{pif, ref_field, ref_list, set_field};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::method::Method;
use crate::params::{arg, expect_array, expect_str, expect_struct};
use crate::schema::FieldTable;
use crate::value::{Value, NULL_REF};

fn fields() -> FieldTable {
    FieldTable::new()
        .int64("links_up", 0)
        .reference("master")
        .field("mode", "balance-slb")
        .reference("primary_slave")
        .field("properties", Value::empty_map())
        .field("slaves", Value::empty_list())
        .read_write(&["mode"])
}

pub(crate) fn class() -> ApiClass {
    ApiClass::new("Bond", fields())
        .with_method(Method::new("create", 5, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("set_property", 3, pif::set_property))
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let networks = api.require_class("network")?;
    let pifs = api.require_class("PIF")?;

    let network_ref = networks.check_ref(arg(args, 0)?)?;
    let members = expect_array(arg(args, 1)?, "members")?
        .iter()
        .map(|member| pifs.check_ref(member).map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    let mac = expect_str(arg(args, 2)?, "MAC")?;
    let mode = expect_str(arg(args, 3)?, "mode")?;
    let properties = expect_struct(arg(args, 4)?, "properties")?.clone();

    networks.ensure_exists(network_ref)?;
    for member in &members {
        pifs.ensure_exists(member)?;
    }
    let primary = members
        .first()
        .cloned()
        .ok_or_else(|| ApiError::operation_not_allowed("A bond needs at least one member PIF"))?;

    let master = pif::derive(api, &primary, network_ref, Some(mac), "-1")?;

    let mut record = class.fields().default_record();
    record.insert("links_up".into(), Value::String(members.len().to_string()));
    record.insert("master".into(), Value::from(master.as_str()));
    record.insert("mode".into(), Value::from(mode));
    record.insert("primary_slave".into(), Value::from(primary.as_str()));
    record.insert("properties".into(), Value::Struct(properties));
    record.insert("slaves".into(), Value::string_list(members.iter().map(String::as_str)));
    let bond_ref = class.insert(record)?;

    set_field(pifs, &master, "bond_master_of", Value::string_list([bond_ref.as_str()]))?;
    for member in &members {
        set_field(pifs, member, "bond_slave_of", Value::from(bond_ref.as_str()))?;
    }

    info!(bond = %bond_ref, master = %master, slaves = members.len(), "Bond created");
    Ok(Some(Value::String(bond_ref)))
}

/// Remove the bond and its master PIF; the members are released.
fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let bond_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(bond_ref)?;

    let pifs = api.require_class("PIF")?;
    if let Some(master) = ref_field(&record, "master") {
        if pifs.ensure_exists(&master).is_ok() {
            pif::remove(api, &master)?;
        }
    }
    for member in ref_list(&record, "slaves") {
        set_field(pifs, &member, "bond_slave_of", Value::from(NULL_REF))?;
    }

    info!(bond = %bond_ref, "Bond destroyed");
    Ok(None)
}
