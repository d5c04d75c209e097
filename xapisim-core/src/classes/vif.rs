//! `VIF` class (virtual network interfaces joining a VM to a network).

use tracing::info;

use super::{link, record_from_args, ref_field, unlink};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::method::Method;
use crate::params::{arg, expect_struct};
use crate::schema::FieldTable;
use crate::value::{new_uuid, Value, NULL_REF};

fn fields() -> FieldTable {
    FieldTable::new()
        .field("MAC", "")
        .field("MAC_autogenerated", false)
        .int64("MTU", 0)
        .reference("VM")
        .field("allowed_operations", Value::empty_list())
        .field("current_operations", Value::empty_map())
        .field("currently_attached", false)
        .field("device", "")
        .field("ipv4_addresses", Value::empty_list())
        .field("ipv4_allowed", Value::empty_list())
        .field("ipv4_configuration_mode", "None")
        .field("ipv4_gateway", "")
        .field("ipv6_addresses", Value::empty_list())
        .field("ipv6_allowed", Value::empty_list())
        .field("ipv6_configuration_mode", "None")
        .field("ipv6_gateway", "")
        .field("locking_mode", "network_default")
        .reference("metrics")
        .reference("network")
        .field("qos_algorithm_params", Value::empty_map())
        .field("qos_algorithm_type", "")
        .field("qos_supported_algorithms", Value::empty_list())
        .field("runtime_properties", Value::empty_map())
        .int64("status_code", 0)
        .field("status_detail", "")
        .read_write(&[
            "ipv4_allowed",
            "ipv6_allowed",
            "locking_mode",
            "qos_algorithm_params",
            "qos_algorithm_type",
        ])
        .lists(&["ipv4_allowed", "ipv6_allowed"])
        .maps(&["qos_algorithm_params"])
}

pub(crate) fn class() -> ApiClass {
    ApiClass::new("VIF", fields())
        .with_unimplemented(&["configure_ipv4", "configure_ipv6", "move"])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("plug", 1, plug))
        .with_method(Method::new("unplug", 1, unplug))
        .with_method(Method::new("unplug_force", 1, unplug))
}

/// Locally administered unicast MAC drawn from a fresh uuid.
fn generate_mac() -> String {
    let hex: String = new_uuid().chars().filter(char::is_ascii_hexdigit).take(10).collect();
    let octets: Vec<&str> = (0..hex.len())
        .step_by(2)
        .filter_map(|i| hex.get(i..i + 2))
        .collect();
    format!("02:{}", octets.join(":"))
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &[
            "MAC",
            "MTU",
            "VM",
            "device",
            "ipv4_allowed",
            "ipv6_allowed",
            "locking_mode",
            "network",
            "other_config",
            "qos_algorithm_params",
            "qos_algorithm_type",
        ],
        &[
            "device",
            "network",
            "VM",
            "MAC",
            "MTU",
            "other_config",
            "qos_algorithm_type",
            "qos_algorithm_params",
        ],
    )?;

    let vms = api.require_class("VM")?;
    let networks = api.require_class("network")?;
    let vm_ref = ref_field(&record, "VM")
        .ok_or_else(|| ApiError::handle_invalid("VM", NULL_REF))?;
    let network_ref = ref_field(&record, "network")
        .ok_or_else(|| ApiError::handle_invalid("network", NULL_REF))?;
    vms.ensure_exists(&vm_ref)?;
    networks.ensure_exists(&network_ref)?;

    if record.get("MAC").and_then(Value::as_str) == Some("") {
        record.insert("MAC".into(), Value::String(generate_mac()));
        record.insert("MAC_autogenerated".into(), Value::Bool(true));
    }
    record.insert(
        "allowed_operations".into(),
        Value::string_list(["attach", "plug", "unplug", "unplug_force"]),
    );

    let vif_ref = class.insert(record)?;
    link(vms, &vm_ref, "VIFs", &vif_ref)?;
    link(networks, &network_ref, "VIFs", &vif_ref)?;
    info!(vif = %vif_ref, vm = %vm_ref, network = %network_ref, "VIF created");
    Ok(Some(Value::String(vif_ref)))
}

fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vif_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(vif_ref)?;
    if let Some(vm_ref) = ref_field(&record, "VM") {
        unlink(api.require_class("VM")?, &vm_ref, "VIFs", vif_ref)?;
    }
    if let Some(network_ref) = ref_field(&record, "network") {
        unlink(api.require_class("network")?, &network_ref, "VIFs", vif_ref)?;
    }
    info!(vif = %vif_ref, "VIF destroyed");
    Ok(None)
}

fn set_attached(class: &ApiClass, args: &[Value], attached: bool) -> Result<Option<Value>> {
    let vif_ref = class.check_ref(arg(args, 0)?)?;
    class.update(vif_ref, |record| {
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
