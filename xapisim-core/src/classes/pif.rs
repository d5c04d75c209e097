//! `PIF` class: physical and derived (bond master, VLAN) host interfaces.

use tracing::info;

use super::{link, ref_field, unlink, Seed};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::method::Method;
use crate::params::{arg, expect_array, expect_bool, expect_int64, expect_str, expect_struct};
use crate::schema::FieldTable;
use crate::value::{Record, Value, NULL_REF};

fn fields() -> FieldTable {
    FieldTable::new()
        .field("DNS", "")
        .field("IP", "")
        .field("IPv6", Value::empty_list())
        .field("MAC", "")
        .int64("MTU", 0)
        .reference("PCI")
        .int64("VLAN", 0)
        .reference("VLAN_master_of")
        .field("VLAN_slave_of", Value::empty_list())
        .field("bond_master_of", Value::empty_list())
        .reference("bond_slave_of")
        .field("capabilities", Value::empty_list())
        .field("currently_attached", true)
        .field("device", "")
        .field("disallow_unplug", false)
        .field("gateway", "")
        .reference("host")
        .field("igmp_snooping_status", "unknown")
        .field("ip_configuration_mode", "None")
        .field("ipv6_configuration_mode", "None")
        .field("ipv6_gateway", "")
        .field("managed", true)
        .field("management", false)
        .reference("metrics")
        .field("netmask", "")
        .reference("network")
        .field("physical", false)
        .field("primary_address_type", "IPv4")
        .field("properties", Value::empty_map())
        .field("sriov_logical_PIF_of", Value::empty_list())
        .field("sriov_physical_PIF_of", Value::empty_list())
        .field("tunnel_access_PIF_of", Value::empty_list())
        .field("tunnel_transport_PIF_of", Value::empty_list())
        .read_write(&["disallow_unplug", "primary_address_type"])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("PIF", fields())
        .with_unimplemented(&["create_VLAN", "destroy", "scan"])
        .with_method(Method::new("introduce", 4, introduce))
        .with_method(Method::new("db_introduce", 23, db_introduce))
        .with_method(Method::new("forget", 1, forget))
        .with_method(Method::new("db_forget", 1, forget))
        .with_method(Method::new("plug", 1, plug))
        .with_method(Method::new("unplug", 1, unplug))
        .with_method(Method::new("reconfigure_ip", 6, reconfigure_ip))
        .with_method(Method::new("reconfigure_ipv6", 5, reconfigure_ipv6))
        .with_method(Method::new("set_property", 3, set_property));

    // Management interface of the simulated host.
    let mut record = class.fields().default_record();
    record.insert("DNS".into(), Value::from("127.0.0.254"));
    record.insert("IP".into(), Value::from("127.0.0.1"));
    record.insert("MAC".into(), Value::from("aa:bb:cc:dd:ee:ff"));
    record.insert("MTU".into(), Value::from("1500"));
    record.insert("PCI".into(), Value::from(seed.nic.as_str()));
    record.insert("VLAN".into(), Value::from("-1"));
    record.insert("device".into(), Value::from("eth0"));
    record.insert("gateway".into(), Value::from("127.0.0.254"));
    record.insert("host".into(), Value::from(seed.this_host.as_str()));
    record.insert("ip_configuration_mode".into(), Value::from("Static"));
    record.insert("management".into(), Value::Bool(true));
    record.insert("metrics".into(), Value::from(seed.pif_metrics.as_str()));
    record.insert("netmask".into(), Value::from("255.255.255.0"));
    record.insert("physical".into(), Value::Bool(true));
    record.insert("properties".into(), Value::string_map([("gro", "on")]));
    class.seed(&seed.management_pif, record)?;

    Ok(class)
}

/// Store a PIF and link it into `host.PIFs` and `network.PIFs`.
fn store(api: &XenApi, class: &ApiClass, record: Record) -> Result<String> {
    let host_ref = ref_field(&record, "host");
    let network_ref = ref_field(&record, "network");

    let pif_ref = class.insert(record)?;
    if let Some(host_ref) = host_ref {
        link(api.require_class("host")?, &host_ref, "PIFs", &pif_ref)?;
    }
    if let Some(network_ref) = network_ref {
        link(api.require_class("network")?, &network_ref, "PIFs", &pif_ref)?;
    }
    Ok(pif_ref)
}

/// A non-physical PIF on `network`, modelled on `base` (a bond member or
/// the tagged PIF of a VLAN): same host, device and MTU.
pub(super) fn derive(api: &XenApi, base: &str, network: &str, mac: Option<&str>, vlan: &str) -> Result<String> {
    let class = api.require_class("PIF")?;
    let source = class.get_record(base)?;

    let mut record = class.fields().default_record();
    for name in ["host", "device", "MTU", "MAC"] {
        if let Some(value) = source.get(name) {
            record.insert(name.into(), value.clone());
        }
    }
    if let Some(mac) = mac.filter(|mac| !mac.is_empty()) {
        record.insert("MAC".into(), Value::from(mac));
    }
    record.insert("network".into(), Value::from(network));
    record.insert("VLAN".into(), Value::from(vlan));
    store(api, class, record)
}

/// Remove a PIF and its back-references from the host and network.
pub(super) fn remove(api: &XenApi, pif_ref: &str) -> Result<Record> {
    let class = api.require_class("PIF")?;
    let record = class.destroy(pif_ref)?;
    if let Some(host_ref) = ref_field(&record, "host") {
        unlink(api.require_class("host")?, &host_ref, "PIFs", pif_ref)?;
    }
    if let Some(network_ref) = ref_field(&record, "network") {
        unlink(api.require_class("network")?, &network_ref, "PIFs", pif_ref)?;
    }
    Ok(record)
}

fn introduce(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let host_ref = hosts.check_ref(arg(args, 0)?)?;
    let mac = expect_str(arg(args, 1)?, "MAC")?;
    let device = expect_str(arg(args, 2)?, "device")?;
    let managed = expect_bool(arg(args, 3)?, "managed")?;
    hosts.ensure_exists(host_ref)?;

    let mut record = class.fields().default_record();
    record.insert("MAC".into(), Value::from(mac));
    record.insert("MTU".into(), Value::from("1500"));
    record.insert("VLAN".into(), Value::from("-1"));
    record.insert("device".into(), Value::from(device));
    record.insert("host".into(), Value::from(host_ref));
    record.insert("managed".into(), Value::Bool(managed));
    record.insert("physical".into(), Value::Bool(true));

    let pif_ref = store(api, class, record)?;
    info!(pif = %pif_ref, device = %device, "PIF introduced");
    Ok(Some(Value::String(pif_ref)))
}

/// Optional reference argument: type-checked, and must exist unless null.
fn optional_ref<'a>(class: &ApiClass, value: &'a Value) -> Result<&'a str> {
    let obj_ref = class.check_ref(value)?;
    if obj_ref != NULL_REF {
        class.ensure_exists(obj_ref)?;
    }
    Ok(obj_ref)
}

fn db_introduce(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let networks = api.require_class("network")?;
    let hosts = api.require_class("host")?;

    let device = expect_str(arg(args, 0)?, "device")?;
    let network_ref = networks.check_ref(arg(args, 1)?)?;
    let host_ref = hosts.check_ref(arg(args, 2)?)?;
    let mut record = class.fields().default_record();
    record.insert("device".into(), Value::from(device));
    record.insert("network".into(), Value::from(network_ref));
    record.insert("host".into(), Value::from(host_ref));
    record.insert("MAC".into(), Value::from(expect_str(arg(args, 3)?, "MAC")?));
    record.insert("MTU".into(), Value::String(expect_int64(arg(args, 4)?, "MTU")?));
    record.insert("VLAN".into(), Value::String(expect_int64(arg(args, 5)?, "VLAN")?));
    record.insert("physical".into(), Value::Bool(expect_bool(arg(args, 6)?, "physical")?));

    for (idx, name) in [
        (7, "ip_configuration_mode"),
        (8, "IP"),
        (9, "netmask"),
        (10, "gateway"),
        (11, "DNS"),
    ] {
        record.insert(name.into(), Value::from(expect_str(arg(args, idx)?, name)?));
    }

    let bond_slave_of = optional_ref(api.require_class("Bond")?, arg(args, 12)?)?;
    let vlan_master_of = optional_ref(api.require_class("VLAN")?, arg(args, 13)?)?;
    record.insert("bond_slave_of".into(), Value::from(bond_slave_of));
    record.insert("VLAN_master_of".into(), Value::from(vlan_master_of));

    record.insert("management".into(), Value::Bool(expect_bool(arg(args, 14)?, "management")?));
    record.insert(
        "other_config".into(),
        Value::Struct(expect_struct(arg(args, 15)?, "other_config")?.clone()),
    );
    record.insert(
        "disallow_unplug".into(),
        Value::Bool(expect_bool(arg(args, 16)?, "disallow_unplug")?),
    );
    record.insert(
        "ipv6_configuration_mode".into(),
        Value::from(expect_str(arg(args, 17)?, "ipv6_configuration_mode")?),
    );
    let ipv6 = expect_array(arg(args, 18)?, "IPv6")?;
    if ipv6.iter().any(|address| address.as_str().is_none()) {
        return Err(ApiError::field_type("IPv6"));
    }
    record.insert("IPv6".into(), Value::Array(ipv6.clone()));
    record.insert("ipv6_gateway".into(), Value::from(expect_str(arg(args, 19)?, "ipv6_gateway")?));
    record.insert(
        "primary_address_type".into(),
        Value::from(expect_str(arg(args, 20)?, "primary_address_type")?),
    );
    record.insert("managed".into(), Value::Bool(expect_bool(arg(args, 21)?, "managed")?));
    record.insert(
        "properties".into(),
        Value::Struct(expect_struct(arg(args, 22)?, "properties")?.clone()),
    );

    networks.ensure_exists(network_ref)?;
    hosts.ensure_exists(host_ref)?;

    let pif_ref = store(api, class, record)?;
    info!(pif = %pif_ref, device = %device, "PIF introduced into database");
    Ok(Some(Value::String(pif_ref)))
}

fn forget(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let pif_ref = class.check_ref(arg(args, 0)?)?;
    remove(api, pif_ref)?;
    info!(pif = %pif_ref, "PIF forgotten");
    Ok(None)
}

fn set_attached(class: &ApiClass, args: &[Value], attached: bool) -> Result<Option<Value>> {
    let pif_ref = class.check_ref(arg(args, 0)?)?;
    class.update(pif_ref, |record| {
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

fn reconfigure_ip(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let pif_ref = class.check_ref(arg(args, 0)?)?;
    let mode = expect_str(arg(args, 1)?, "mode")?;
    let ip = expect_str(arg(args, 2)?, "IP")?;
    let netmask = expect_str(arg(args, 3)?, "netmask")?;
    let gateway = expect_str(arg(args, 4)?, "gateway")?;
    let dns = expect_str(arg(args, 5)?, "DNS")?;

    class.update(pif_ref, |record| {
        record.insert("ip_configuration_mode".into(), Value::from(mode));
        record.insert("IP".into(), Value::from(ip));
        record.insert("netmask".into(), Value::from(netmask));
        record.insert("gateway".into(), Value::from(gateway));
        record.insert("DNS".into(), Value::from(dns));
        Ok(())
    })?;
    Ok(None)
}

fn reconfigure_ipv6(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let pif_ref = class.check_ref(arg(args, 0)?)?;
    let mode = expect_str(arg(args, 1)?, "mode")?;
    let ipv6 = expect_str(arg(args, 2)?, "IPv6")?;
    let gateway = expect_str(arg(args, 3)?, "gateway")?;
    let dns = expect_str(arg(args, 4)?, "DNS")?;

    // One address per call; an empty string clears the list.
    let addresses = if ipv6.is_empty() {
        Value::empty_list()
    } else {
        Value::string_list([ipv6])
    };

    class.update(pif_ref, |record| {
        record.insert("ipv6_configuration_mode".into(), Value::from(mode));
        record.insert("IPv6".into(), addresses);
        record.insert("ipv6_gateway".into(), Value::from(gateway));
        record.insert("DNS".into(), Value::from(dns));
        Ok(())
    })?;
    Ok(None)
}

/// Set one entry of a `properties` map. Shared with `Bond.set_property`.
pub(super) fn set_property(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let obj_ref = class.check_ref(arg(args, 0)?)?;
    let name = expect_str(arg(args, 1)?, "name")?;
    let value = expect_str(arg(args, 2)?, "value")?;

    class.update(obj_ref, |record| {
        if let Some(properties) = record.get_mut("properties").and_then(Value::as_struct_mut) {
            properties.insert(name.to_string(), Value::from(value));
        }
        Ok(())
    })?;
    Ok(None)
}
