//! `host` class.

use chrono::{Local, TimeZone, Utc};

use super::{destroy, int_field, ref_list, Seed};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_str};
use crate::schema::FieldTable;
use crate::value::{Value, NULL_REF};

/// Physical memory the simulated host reports.
pub(super) const HOST_MEMORY_BYTES: i64 = 32 * 1024 * 1024 * 1024;

fn fields() -> FieldTable {
    FieldTable::new()
        .int64("API_version_major", 0)
        .int64("API_version_minor", 0)
        .field("API_version_vendor", "")
        .field("API_version_vendor_implementation", Value::empty_map())
        .field("PBDs", Value::empty_list())
        .field("PCIs", Value::empty_list())
        .field("PGPUs", Value::empty_list())
        .field("PIFs", Value::empty_list())
        .field("PUSBs", Value::empty_list())
        .field("address", "")
        .field("allowed_operations", Value::empty_list())
        .field("bios_strings", Value::empty_map())
        .field("blobs", Value::empty_map())
        .field("capabilities", Value::empty_list())
        .field("chipset_info", Value::empty_map())
        .reference("control_domain")
        .field("cpu_configuration", Value::empty_map())
        .field("cpu_info", Value::empty_map())
        .reference("crash_dump_sr")
        .field("crashdumps", Value::empty_list())
        .field("current_operations", Value::empty_map())
        .field("display", "")
        .field("edition", "")
        .field("enabled", true)
        .field("external_auth_configuration", Value::empty_map())
        .field("external_auth_service_name", "")
        .field("external_auth_type", "")
        .field("features", Value::empty_list())
        .field("guest_VCPUs_params", Value::empty_map())
        .field("ha_network_peers", Value::empty_list())
        .field("ha_statefiles", Value::empty_list())
        .field("host_CPUs", Value::empty_list())
        .field("hostname", "")
        .field("iscsi_iqn", "")
        .field("license_params", Value::empty_map())
        .field("license_server", Value::empty_map())
        .reference("local_cache_sr")
        .field("logging", Value::empty_map())
        .int64("memory_overhead", 0)
        .reference("metrics")
        .field("multipathing", false)
        .field("name_description", "")
        .field("name_label", "")
        .field("patches", Value::empty_list())
        .field("power_on_config", Value::empty_map())
        .field("power_on_mode", "")
        .field("resident_VMs", Value::empty_list())
        .field("sched_policy", "")
        .field("software_version", Value::empty_map())
        .field("ssl_legacy", true)
        .field("supported_bootloaders", Value::empty_list())
        .reference("suspend_image_sr")
        .field("tags", Value::empty_list())
        .field("updates", Value::empty_list())
        .field("updates_requiring_reboot", Value::empty_list())
        .field("virtual_hardware_platform_versions", Value::empty_list())
        .read_write(&[
            "address",
            "crash_dump_sr",
            "display",
            "guest_VCPUs_params",
            "hostname",
            "license_server",
            "logging",
            "name_description",
            "name_label",
            "suspend_image_sr",
            "tags",
        ])
        .lists(&["tags"])
        .maps(&["guest_VCPUs_params", "license_server", "logging"])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("host", fields())
        .with_unimplemented(&[
            "apply_edition",
            "assert_can_evacuate",
            "backup_rrds",
            "bugreport_upload",
            "call_extension",
            "call_plugin",
            "create_new_blob",
            "declare_dead",
            "disable_display",
            "disable_external_auth",
            "disable_local_storage_caching",
            "dmesg",
            "dmesg_clear",
            "emergency_ha_disable",
            "enable_display",
            "enable_external_auth",
            "enable_local_storage_caching",
            "evacuate",
            "forget_data_source_archives",
            "get_data_sources",
            "get_log",
            "get_server_certificate",
            "get_uncooperative_resident_VMs",
            "get_vms_which_prevent_evacuation",
            "has_extension",
            "license_add",
            "license_remove",
            "list_methods",
            "local_management_reconfigure",
            "management_disable",
            "management_reconfigure",
            "migrate_receive",
            "power_on",
            "query_data_source",
            "reboot",
            "record_data_source",
            "refresh_pack_info",
            "reset_cpu_features",
            "restart_agent",
            "retrieve_wlb_evacuate_recommendations",
            "send_debug_keys",
            "set_cpu_features",
            "set_power_on_mode",
            "shutdown",
            "shutdown_agent",
            "sync_data",
            "syslog_reconfigure",
        ])
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("enable", 1, enable))
        .with_method(Method::new("disable", 1, disable))
        .with_method(Method::new("get_management_interface", 1, get_management_interface))
        .with_method(Method::new("get_servertime", 1, get_servertime))
        .with_method(Method::new("get_server_localtime", 1, get_server_localtime))
        .with_method(Method::new("compute_free_memory", 1, compute_free_memory))
        .with_method(Method::new("compute_memory_overhead", 1, compute_memory_overhead))
        .with_method(Method::new(
            "get_system_status_capabilities",
            1,
            get_system_status_capabilities,
        ))
        .with_method(Method::new("set_hostname_live", 2, set_hostname_live));

    let mut record = class.fields().default_record();
    record.insert("API_version_major".into(), Value::from("2"));
    record.insert("API_version_minor".into(), Value::from("10"));
    record.insert("API_version_vendor".into(), Value::from("XenAPISim"));
    record.insert("address".into(), Value::from("127.0.0.1"));
    record.insert(
        "allowed_operations".into(),
        Value::string_list(["provision", "vm_start", "vm_resume", "vm_migrate", "evacuate"]),
    );
    record.insert(
        "capabilities".into(),
        Value::string_list([
            "xen-3.0-x86_64",
            "xen-3.0-x86_32p",
            "hvm-3.0-x86_32",
            "hvm-3.0-x86_32p",
            "hvm-3.0-x86_64",
        ]),
    );
    record.insert("chipset_info".into(), Value::string_map([("iommu", "true")]));
    record.insert("control_domain".into(), Value::from(seed.dom0.as_str()));
    record.insert("display".into(), Value::from("enabled"));
    record.insert("edition".into(), Value::from("enterprise-per-socket"));
    record.insert("hostname".into(), Value::from("xenserver-hv-1"));
    record.insert(
        "license_server".into(),
        Value::string_map([("address", "localhost"), ("port", "27000")]),
    );
    record.insert("memory_overhead".into(), Value::from("5249974272"));
    record.insert("metrics".into(), Value::from(seed.host_metrics.as_str()));
    record.insert("PBDs".into(), Value::string_list([seed.local_pbd.as_str()]));
    record.insert("PCIs".into(), Value::string_list([seed.nic.as_str()]));
    record.insert("PIFs".into(), Value::string_list([seed.management_pif.as_str()]));
    record.insert("host_CPUs".into(), Value::string_list([seed.host_cpu.as_str()]));
    record.insert("name_label".into(), Value::from("xenserver-hv-1"));
    record.insert("resident_VMs".into(), Value::string_list([seed.dom0.as_str()]));
    record.insert("sched_policy".into(), Value::from("credit"));
    record.insert(
        "software_version".into(),
        Value::string_map([
            ("product_version", "7.5.0"),
            ("product_version_text", "7.5"),
            ("product_version_text_short", "7.5"),
        ]),
    );
    record.insert(
        "supported_bootloaders".into(),
        Value::string_list(["pygrub", "eliloader"]),
    );
    record.insert(
        "virtual_hardware_platform_versions".into(),
        Value::string_list(["0", "1", "2"]),
    );
    class.seed(&seed.this_host, record)?;

    Ok(class)
}

fn set_enabled(class: &ApiClass, args: &[Value], enabled: bool) -> Result<Option<Value>> {
    let host_ref = class.check_ref(arg(args, 0)?)?;
    class.update(host_ref, |record| {
        record.insert("enabled".into(), Value::Bool(enabled));
        Ok(())
    })?;
    Ok(None)
}

fn enable(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    set_enabled(class, args, true)
}

fn disable(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    set_enabled(class, args, false)
}

/// The host PIF flagged as management, or the null reference.
fn get_management_interface(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let host_ref = class.check_ref(arg(args, 0)?)?;
    let pif_refs = ref_list(&class.get_record(host_ref)?, "PIFs");

    let pifs = api.require_class("PIF")?.read()?;
    let management = pif_refs
        .into_iter()
        .find(|pif_ref| {
            pifs.get(pif_ref)
                .map(|pif| pif.get("management") == Some(&Value::Bool(true)))
                .unwrap_or(false)
        })
        .unwrap_or_else(|| NULL_REF.to_string());
    Ok(Some(Value::String(management)))
}

fn get_servertime(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    Ok(Some(Value::DateTime(Utc::now())))
}

fn get_server_localtime(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    // Local wall-clock time, carried without an offset like XenAPI does.
    let local = Utc.from_utc_datetime(&Local::now().naive_local());
    Ok(Some(Value::DateTime(local)))
}

/// Host memory minus its own overhead minus every running guest resident on it.
fn compute_free_memory(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let host_ref = class.check_ref(arg(args, 0)?)?;
    let overhead = {
        let store = class.read()?;
        int_field(store.get(host_ref)?, "memory_overhead")
    };

    let used: i64 = {
        let vms = api.require_class("VM")?.read()?;
        vms.records()
            .filter(|(_, vm)| vm.get("resident_on").and_then(Value::as_str) == Some(host_ref))
            .filter(|(_, vm)| {
                matches!(
                    vm.get("power_state").and_then(Value::as_str),
                    Some("Running") | Some("Paused")
                )
            })
            .map(|(_, vm)| int_field(vm, "memory_dynamic_max"))
            .sum()
    };

    let free = (HOST_MEMORY_BYTES - overhead - used).max(0);
    Ok(Some(Value::String(free.to_string())))
}

fn compute_memory_overhead(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let host_ref = class.check_ref(arg(args, 0)?)?;
    Ok(Some(class.field_value(host_ref, "memory_overhead")?))
}

fn get_system_status_capabilities(
    _api: &XenApi,
    class: &ApiClass,
    args: &[Value],
) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    Ok(None)
}

fn set_hostname_live(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let host_ref = class.check_ref(arg(args, 0)?)?;
    let hostname = expect_str(arg(args, 1)?, "hostname")?;
    class.update(host_ref, |record| {
        record.insert("hostname".into(), Value::from(hostname));
        Ok(())
    })?;
    Ok(None)
}
