//! `VM` class: guest records, the control domain and the power state
//! machine.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::info;

use super::{acknowledge, link, record_from_args, ref_field, ref_list, unlink, Seed};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, ErrorKind, Result};
use crate::method::Method;
use crate::params::{arg, expect_bool, expect_int64, expect_str, expect_struct};
use crate::schema::FieldTable;
use crate::value::{new_uuid, Record, Value, NULL_REF};

const ALL_STATES: &[&str] = &["Halted", "Paused", "Running", "Suspended"];

/// Userdevice slots a VM exposes for block devices.
const VBD_DEVICE_SLOTS: u32 = 16;
const VIF_DEVICE_SLOTS: u32 = 7;

fn fields() -> FieldTable {
    FieldTable::new()
        .field("HVM_boot_params", Value::empty_map())
        .field("HVM_boot_policy", "")
        .field("HVM_shadow_multiplier", 0.0)
        .field("PCI_bus", "")
        .field("PV_args", "")
        .field("PV_bootloader", "")
        .field("PV_bootloader_args", "")
        .field("PV_kernel", "")
        .field("PV_legacy_args", "")
        .field("PV_ramdisk", "")
        .field("VBDs", Value::empty_list())
        .int64("VCPUs_at_startup", 0)
        .int64("VCPUs_max", 0)
        .field("VCPUs_params", Value::empty_map())
        .field("VGPUs", Value::empty_list())
        .field("VIFs", Value::empty_list())
        .field("VTPMs", Value::empty_list())
        .field("VUSBs", Value::empty_list())
        .field("actions_after_crash", "restart")
        .field("actions_after_reboot", "restart")
        .field("actions_after_shutdown", "destroy")
        .reference("affinity")
        .field("allowed_operations", Value::empty_list())
        .reference("appliance")
        .field("attached_PCIs", Value::empty_list())
        .field("bios_strings", Value::empty_map())
        .field("blobs", Value::empty_map())
        .field("blocked_operations", Value::empty_map())
        .field("children", Value::empty_list())
        .field("consoles", Value::empty_list())
        .field("crash_dumps", Value::empty_list())
        .field("current_operations", Value::empty_map())
        .field("domain_type", "unspecified")
        .field("domarch", "")
        .int64("domid", 0)
        .field("generation_id", "")
        .reference("guest_metrics")
        .field("ha_always_run", false)
        .field("ha_restart_priority", "")
        .int64("hardware_platform_version", 0)
        .field("has_vendor_device", false)
        .field("is_a_snapshot", false)
        .field("is_a_template", false)
        .field("is_control_domain", false)
        .field("is_default_template", false)
        .field("is_snapshot_from_vmpp", false)
        .field("is_vmss_snapshot", false)
        .field("last_boot_CPU_flags", Value::empty_map())
        .field("last_booted_record", "")
        .int64("memory_dynamic_max", 0)
        .int64("memory_dynamic_min", 0)
        .int64("memory_overhead", 0)
        .int64("memory_static_max", 0)
        .int64("memory_static_min", 0)
        .int64("memory_target", 0)
        .reference("metrics")
        .field("name_description", "")
        .field("name_label", "")
        .int64("order", 0)
        .reference("parent")
        .field("platform", Value::empty_map())
        .field("power_state", "Halted")
        .reference("protection_policy")
        .field("recommendations", "")
        .field("reference_label", "")
        .field("requires_reboot", false)
        .reference("resident_on")
        .int64("shutdown_delay", 0)
        .field("snapshot_info", Value::empty_map())
        .field("snapshot_metadata", "")
        .reference("snapshot_of")
        .reference("snapshot_schedule")
        .field("snapshot_time", Value::epoch())
        .field("snapshots", Value::empty_list())
        .int64("start_delay", 0)
        .reference("suspend_SR")
        .reference("suspend_VDI")
        .field("tags", Value::empty_list())
        .field("transportable_snapshot_id", "")
        .int64("user_version", 0)
        .int64("version", 0)
        .field("xenstore_data", Value::empty_map())
        .read_write(&[
            "HVM_boot_params",
            "HVM_boot_policy",
            "HVM_shadow_multiplier",
            "PCI_bus",
            "PV_args",
            "PV_bootloader",
            "PV_bootloader_args",
            "PV_kernel",
            "PV_legacy_args",
            "PV_ramdisk",
            "VCPUs_at_startup",
            "VCPUs_max",
            "VCPUs_params",
            "actions_after_crash",
            "actions_after_reboot",
            "actions_after_shutdown",
            "affinity",
            "bios_strings",
            "blocked_operations",
            "domain_type",
            "ha_always_run",
            "ha_restart_priority",
            "hardware_platform_version",
            "has_vendor_device",
            "is_a_template",
            "memory_dynamic_max",
            "memory_dynamic_min",
            "memory_static_max",
            "memory_static_min",
            "name_description",
            "name_label",
            "order",
            "platform",
            "protection_policy",
            "recommendations",
            "shutdown_delay",
            "snapshot_schedule",
            "start_delay",
            "suspend_SR",
            "suspend_VDI",
            "tags",
            "user_version",
            "xenstore_data",
        ])
        .lists(&["tags"])
        .maps(&[
            "HVM_boot_params",
            "VCPUs_params",
            "blocked_operations",
            "platform",
            "xenstore_data",
        ])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("VM", fields())
        .with_unimplemented(&[
            "assert_can_be_recovered",
            "call_plugin",
            "create_new_blob",
            "forget_data_source_archives",
            "get_SRs_required_for_recovery",
            "get_boot_record",
            "get_cooperative",
            "get_data_sources",
            "import",
            "import_convert",
            "maximise_memory",
            "query_data_source",
            "query_services",
            "record_data_source",
            "recover",
            "retrieve_wlb_recommendations",
            "send_sysrq",
            "send_trigger",
            "set_memory_target_live",
            "snapshot_with_quiesce",
            "wait_memory_target_live",
        ])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        // Power state machine
        .with_method(Method::new("start", 3, start))
        .with_method(Method::new("start_on", 4, start_on))
        .with_method(Method::new("resume", 3, resume))
        .with_method(Method::new("resume_on", 4, resume_on))
        .with_method(Method::new("clean_shutdown", 1, shutdown))
        .with_method(Method::new("shutdown", 1, shutdown))
        .with_method(Method::new("hard_shutdown", 1, hard_shutdown))
        .with_method(Method::new("clean_reboot", 1, clean_reboot))
        .with_method(Method::new("hard_reboot", 1, hard_reboot))
        .with_method(Method::new("pause", 1, pause))
        .with_method(Method::new("unpause", 1, unpause))
        .with_method(Method::new("suspend", 1, suspend))
        .with_method(Method::new("power_state_reset", 1, power_state_reset))
        .with_method(Method::new("pool_migrate", 3, pool_migrate))
        // Copies
        .with_method(Method::new("clone", 2, clone))
        .with_method(Method::new("snapshot", 2, snapshot))
        .with_method(Method::new("checkpoint", 2, snapshot))
        .with_method(Method::new("copy", 3, copy))
        // Resources
        .with_method(Method::new("set_memory", 2, set_memory))
        .with_method(Method::new("set_memory_limits", 5, set_memory_limits))
        .with_method(Method::new("set_memory_dynamic_range", 3, set_memory_dynamic_range))
        .with_method(Method::new("set_memory_static_range", 3, set_memory_static_range))
        .with_method(Method::new("set_VCPUs_number_live", 2, set_vcpus_number_live))
        .with_method(Method::new("compute_memory_overhead", 1, compute_memory_overhead))
        .with_method(Method::new("get_allowed_VBD_devices", 1, get_allowed_vbd_devices))
        .with_method(Method::new("get_allowed_VIF_devices", 1, get_allowed_vif_devices))
        .with_method(Method::new("set_appliance", 2, set_appliance))
        .with_method(Method::new("get_possible_hosts", 1, get_possible_hosts))
        .with_method(Method::new("copy_bios_strings", 2, copy_bios_strings))
        // Checks with no simulated effect
        .with_method(Method::new("assert_can_boot_here", 2, assert_can_boot_here))
        .with_method(Method::new("assert_operation_valid", 2, assert_operation_valid))
        .with_method(Method::new("assert_can_migrate", 7, migrate_send))
        .with_method(Method::new("migrate_send", 7, migrate_send))
        .with_method(Method::new("assert_agile", 1, acknowledge))
        .with_method(Method::new("provision", 1, acknowledge))
        .with_method(Method::new("revert", 1, acknowledge))
        .with_method(Method::new("update_allowed_operations", 1, acknowledge));

    let mut dom0 = class.fields().default_record();
    dom0.insert("VCPUs_at_startup".into(), Value::from("4"));
    dom0.insert("VCPUs_max".into(), Value::from("4"));
    dom0.insert("domain_type".into(), Value::from("pv"));
    dom0.insert("is_control_domain".into(), Value::Bool(true));
    dom0.insert("memory_dynamic_max".into(), Value::from("4294967296"));
    dom0.insert("memory_dynamic_min".into(), Value::from("4294967296"));
    dom0.insert("memory_static_max".into(), Value::from("4294967296"));
    dom0.insert("memory_static_min".into(), Value::from("4294967296"));
    dom0.insert("memory_target".into(), Value::from("4294967296"));
    dom0.insert("metrics".into(), Value::from(seed.dom0_metrics.as_str()));
    dom0.insert(
        "name_label".into(),
        Value::from("Control domain on host: xenserver-hv-1"),
    );
    dom0.insert("power_state".into(), Value::from("Running"));
    dom0.insert("resident_on".into(), Value::from(seed.this_host.as_str()));
    class.seed(&seed.dom0, dom0)?;

    Ok(class)
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &[
            "HVM_boot_params",
            "HVM_boot_policy",
            "HVM_shadow_multiplier",
            "PCI_bus",
            "PV_args",
            "PV_bootloader",
            "PV_bootloader_args",
            "PV_kernel",
            "PV_legacy_args",
            "PV_ramdisk",
            "VCPUs_at_startup",
            "VCPUs_max",
            "VCPUs_params",
            "actions_after_crash",
            "actions_after_reboot",
            "actions_after_shutdown",
            "affinity",
            "appliance",
            "blocked_operations",
            "domain_type",
            "generation_id",
            "ha_always_run",
            "ha_restart_priority",
            "hardware_platform_version",
            "has_vendor_device",
            "is_a_template",
            "is_snapshot_from_vmpp",
            "is_vmss_snapshot",
            "memory_dynamic_max",
            "memory_dynamic_min",
            "memory_static_max",
            "memory_static_min",
            "memory_target",
            "name_description",
            "name_label",
            "order",
            "other_config",
            "platform",
            "protection_policy",
            "recommendations",
            "reference_label",
            "shutdown_delay",
            "snapshot_schedule",
            "start_delay",
            "suspend_SR",
            "tags",
            "user_version",
            "version",
            "xenstore_data",
        ],
        &[
            "user_version",
            "is_a_template",
            "affinity",
            "memory_static_max",
            "memory_dynamic_max",
            "memory_dynamic_min",
            "memory_static_min",
            "VCPUs_params",
            "VCPUs_max",
            "VCPUs_at_startup",
            "actions_after_shutdown",
            "actions_after_reboot",
            "actions_after_crash",
            "PV_bootloader",
            "PV_kernel",
            "PV_ramdisk",
            "PV_args",
            "PV_bootloader_args",
            "PV_legacy_args",
            "HVM_boot_policy",
            "HVM_boot_params",
            "platform",
            "PCI_bus",
            "other_config",
            "recommendations",
        ],
    )?;

    let appliance = ref_field(&record, "appliance");
    if let Some(appliance) = &appliance {
        api.require_class("VM_appliance")?.ensure_exists(appliance)?;
    }

    record.insert("domid".into(), Value::from("-1"));
    record.insert("snapshot_time".into(), Value::DateTime(Utc::now()));
    record.insert(
        "allowed_operations".into(),
        Value::string_list(["start", "start_on", "clone", "copy", "snapshot", "destroy"]),
    );

    let vm_ref = class.insert(record)?;
    if let Some(appliance) = appliance {
        link(api.require_class("VM_appliance")?, &appliance, "VMs", &vm_ref)?;
    }
    info!(vm = %vm_ref, "VM created");
    Ok(Some(Value::String(vm_ref)))
}

fn is_control_domain(record: &Record) -> bool {
    record.get("is_control_domain") == Some(&Value::Bool(true))
}

fn control_domain_refused(vm_ref: &str) -> ApiError {
    ApiError::operation_not_allowed(format!("{} is a control domain", vm_ref))
}

/// Destroy a halted VM together with its block and network devices.
fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let record = {
        let mut store = class.write()?;
        let record = store.get(vm_ref)?;
        if is_control_domain(record) {
            return Err(control_domain_refused(vm_ref));
        }
        let state = record.get("power_state").and_then(Value::as_str).unwrap_or("Halted");
        if !matches!(state, "Halted" | "Suspended") {
            return Err(ApiError::new(
                ErrorKind::VmBadPowerState,
                [vm_ref.to_string(), "halted".to_string(), state.to_lowercase()],
            ));
        }
        store.delete(vm_ref)?
    };

    let vbd_refs = ref_list(&record, "VBDs");
    if !vbd_refs.is_empty() {
        let vbds = api.require_class("VBD")?;
        let vdis = api.require_class("VDI")?;
        for vbd_ref in &vbd_refs {
            if let Ok(vbd) = vbds.destroy(vbd_ref) {
                if let Some(vdi_ref) = ref_field(&vbd, "VDI") {
                    unlink(vdis, &vdi_ref, "VBDs", vbd_ref)?;
                }
            }
        }
    }

    let vif_refs = ref_list(&record, "VIFs");
    if !vif_refs.is_empty() {
        let vifs = api.require_class("VIF")?;
        let networks = api.require_class("network")?;
        for vif_ref in &vif_refs {
            if let Ok(vif) = vifs.destroy(vif_ref) {
                if let Some(network_ref) = ref_field(&vif, "network") {
                    unlink(networks, &network_ref, "VIFs", vif_ref)?;
                }
            }
        }
    }

    if let Some(appliance) = ref_field(&record, "appliance") {
        unlink(api.require_class("VM_appliance")?, &appliance, "VMs", vm_ref)?;
    }

    info!(vm = %vm_ref, vbds = vbd_refs.len(), vifs = vif_refs.len(), "VM destroyed");
    Ok(None)
}

/// Move a VM between power states.
///
/// `from` lists the states the transition may start in; the first entry is
/// the one reported as expected when the VM is elsewhere. Landing in
/// `Running` or `Paused` makes the VM resident on `host` (or where it already
/// runs, or this host); landing anywhere else clears residency. The host's
/// `resident_VMs` list follows.
fn change_power_state(
    api: &XenApi,
    class: &ApiClass,
    vm_ref: &str,
    from: &[&str],
    to: &str,
    host: Option<&str>,
) -> Result<()> {
    let this_host = api.this_host();
    let (left, joined) = class.update(vm_ref, |record| {
        if is_control_domain(record) {
            return Err(control_domain_refused(vm_ref));
        }
        let current = record
            .get("power_state")
            .and_then(Value::as_str)
            .unwrap_or("Halted")
            .to_string();
        if !from.contains(&current.as_str()) {
            let expected = from.first().copied().unwrap_or(to);
            return Err(ApiError::new(
                ErrorKind::VmBadPowerState,
                [vm_ref.to_string(), expected.to_lowercase(), current.to_lowercase()],
            ));
        }

        let resident = ref_field(record, "resident_on");
        let target = match to {
            "Running" | "Paused" => host
                .map(str::to_string)
                .or_else(|| resident.clone())
                .or_else(|| Some(this_host.to_string())),
            _ => None,
        };

        record.insert("power_state".into(), Value::from(to));
        record.insert(
            "resident_on".into(),
            Value::from(target.as_deref().unwrap_or(NULL_REF)),
        );
        Ok((resident, target))
    })?;

    if left != joined {
        let hosts = api.require_class("host")?;
        if let Some(left) = left {
            unlink(hosts, &left, "resident_VMs", vm_ref)?;
        }
        if let Some(joined) = joined {
            link(hosts, &joined, "resident_VMs", vm_ref)?;
        }
    }

    info!(vm = %vm_ref, power_state = to, "VM power state changed");
    Ok(())
}

fn transition(
    api: &XenApi,
    class: &ApiClass,
    args: &[Value],
    from: &[&str],
    to: &str,
) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    change_power_state(api, class, vm_ref, from, to, None)?;
    Ok(None)
}

fn running_or_paused(start_paused: bool) -> &'static str {
    if start_paused {
        "Paused"
    } else {
        "Running"
    }
}

fn start(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let start_paused = expect_bool(arg(args, 1)?, "start_paused")?;
    expect_bool(arg(args, 2)?, "force")?;
    change_power_state(api, class, vm_ref, &["Halted"], running_or_paused(start_paused), None)?;
    Ok(None)
}

fn start_on(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let host_ref = hosts.check_ref(arg(args, 1)?)?;
    let start_paused = expect_bool(arg(args, 2)?, "start_paused")?;
    expect_bool(arg(args, 3)?, "force")?;
    class.ensure_exists(vm_ref)?;
    hosts.ensure_exists(host_ref)?;
    change_power_state(
        api,
        class,
        vm_ref,
        &["Halted"],
        running_or_paused(start_paused),
        Some(host_ref),
    )?;
    Ok(None)
}

fn resume(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let start_paused = expect_bool(arg(args, 1)?, "start_paused")?;
    expect_bool(arg(args, 2)?, "force")?;
    change_power_state(api, class, vm_ref, &["Suspended"], running_or_paused(start_paused), None)?;
    Ok(None)
}

fn resume_on(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let host_ref = hosts.check_ref(arg(args, 1)?)?;
    let start_paused = expect_bool(arg(args, 2)?, "start_paused")?;
    expect_bool(arg(args, 3)?, "force")?;
    class.ensure_exists(vm_ref)?;
    hosts.ensure_exists(host_ref)?;
    change_power_state(
        api,
        class,
        vm_ref,
        &["Suspended"],
        running_or_paused(start_paused),
        Some(host_ref),
    )?;
    Ok(None)
}

fn shutdown(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running"], "Halted")
}

fn hard_shutdown(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running", "Paused", "Suspended"], "Halted")
}

fn clean_reboot(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running"], "Running")
}

fn hard_reboot(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running", "Paused"], "Running")
}

fn pause(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running"], "Paused")
}

fn unpause(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Paused"], "Running")
}

fn suspend(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, &["Running"], "Suspended")
}

fn power_state_reset(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    transition(api, class, args, ALL_STATES, "Halted")
}

fn pool_migrate(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let host_ref = hosts.check_ref(arg(args, 1)?)?;
    expect_struct(arg(args, 2)?, "options")?;
    class.ensure_exists(vm_ref)?;
    hosts.ensure_exists(host_ref)?;
    change_power_state(api, class, vm_ref, &["Running"], "Running", Some(host_ref))?;
    Ok(None)
}

/// Copy a VM record under a new reference. The copy starts halted with
/// no devices; snapshots are linked back to their source.
fn duplicate(class: &ApiClass, vm_ref: &str, new_name: &str, as_snapshot: bool) -> Result<String> {
    let mut store = class.write()?;
    let source = store.get(vm_ref)?;
    if is_control_domain(source) {
        return Err(control_domain_refused(vm_ref));
    }

    let mut copy = source.clone();
    copy.insert("uuid".into(), Value::String(new_uuid()));
    copy.insert("name_label".into(), Value::from(new_name));
    copy.insert("power_state".into(), Value::from("Halted"));
    copy.insert("resident_on".into(), Value::from(NULL_REF));
    copy.insert("domid".into(), Value::from("-1"));
    for list in ["VBDs", "VIFs", "VGPUs", "VUSBs", "consoles", "crash_dumps", "snapshots"] {
        copy.insert(list.into(), Value::empty_list());
    }
    copy.insert("current_operations".into(), Value::empty_map());
    if as_snapshot {
        copy.insert("is_a_snapshot".into(), Value::Bool(true));
        copy.insert("is_a_template".into(), Value::Bool(true));
        copy.insert("snapshot_of".into(), Value::from(vm_ref));
        copy.insert("snapshot_time".into(), Value::DateTime(Utc::now()));
    } else {
        copy.insert("is_a_snapshot".into(), Value::Bool(false));
        copy.insert("snapshot_of".into(), Value::from(NULL_REF));
    }

    let copy_ref = store.insert(copy)?;
    if as_snapshot {
        if let Some(list) = store
            .get_mut(vm_ref)?
            .get_mut("snapshots")
            .and_then(Value::as_array_mut)
        {
            list.push(Value::from(copy_ref.as_str()));
        }
    }
    Ok(copy_ref)
}

fn clone(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let new_name = expect_str(arg(args, 1)?, "new_name")?;
    let clone_ref = duplicate(class, vm_ref, new_name, false)?;
    info!(vm = %vm_ref, clone = %clone_ref, "VM cloned");
    Ok(Some(Value::String(clone_ref)))
}

fn snapshot(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let new_name = expect_str(arg(args, 1)?, "new_name")?;
    let snapshot_ref = duplicate(class, vm_ref, new_name, true)?;
    info!(vm = %vm_ref, snapshot = %snapshot_ref, "VM snapshot taken");
    Ok(Some(Value::String(snapshot_ref)))
}

fn copy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let srs = api.require_class("SR")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let new_name = expect_str(arg(args, 1)?, "new_name")?;
    let sr_ref = srs.check_ref(arg(args, 2)?)?;
    class.ensure_exists(vm_ref)?;
    // A null SR keeps disks where they are.
    if sr_ref != NULL_REF {
        srs.ensure_exists(sr_ref)?;
    }
    let copy_ref = duplicate(class, vm_ref, new_name, false)?;
    Ok(Some(Value::String(copy_ref)))
}

fn set_int64_fields(class: &ApiClass, vm_ref: &str, values: Vec<(&str, String)>) -> Result<Option<Value>> {
    class.update(vm_ref, |record| {
        for (field, value) in values {
            record.insert(field.to_string(), Value::String(value));
        }
        Ok(())
    })?;
    Ok(None)
}

fn set_memory(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let value = expect_int64(arg(args, 1)?, "value")?;
    set_int64_fields(
        class,
        vm_ref,
        vec![
            ("memory_static_max", value.clone()),
            ("memory_dynamic_max", value.clone()),
            ("memory_dynamic_min", value),
        ],
    )
}

fn set_memory_limits(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let static_min = expect_int64(arg(args, 1)?, "static_min")?;
    let static_max = expect_int64(arg(args, 2)?, "static_max")?;
    let dynamic_min = expect_int64(arg(args, 3)?, "dynamic_min")?;
    let dynamic_max = expect_int64(arg(args, 4)?, "dynamic_max")?;
    set_int64_fields(
        class,
        vm_ref,
        vec![
            ("memory_static_min", static_min),
            ("memory_static_max", static_max),
            ("memory_dynamic_min", dynamic_min),
            ("memory_dynamic_max", dynamic_max),
        ],
    )
}

fn set_memory_dynamic_range(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let min = expect_int64(arg(args, 1)?, "min")?;
    let max = expect_int64(arg(args, 2)?, "max")?;
    set_int64_fields(
        class,
        vm_ref,
        vec![("memory_dynamic_min", min), ("memory_dynamic_max", max)],
    )
}

fn set_memory_static_range(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let min = expect_int64(arg(args, 1)?, "min")?;
    let max = expect_int64(arg(args, 2)?, "max")?;
    set_int64_fields(
        class,
        vm_ref,
        vec![("memory_static_min", min), ("memory_static_max", max)],
    )
}

fn set_vcpus_number_live(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let count = expect_int64(arg(args, 1)?, "nvcpu")?;
    set_int64_fields(
        class,
        vm_ref,
        vec![("VCPUs_at_startup", count.clone()), ("VCPUs_max", count)],
    )
}

fn compute_memory_overhead(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    Ok(Some(class.field_value(vm_ref, "memory_overhead")?))
}

/// Free userdevice slots, skipping those this VM's block devices occupy.
fn get_allowed_vbd_devices(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let vbd_refs: Vec<String> = class
        .field_value(vm_ref, "VBDs")?
        .as_array()
        .map(|vbds| vbds.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let used: BTreeSet<String> = {
        let vbds = api.require_class("VBD")?.read()?;
        vbd_refs
            .iter()
            .filter_map(|vbd_ref| vbds.get(vbd_ref).ok())
            .filter_map(|vbd| vbd.get("userdevice").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    };

    let free = (0..VBD_DEVICE_SLOTS)
        .map(|slot| slot.to_string())
        .filter(|slot| !used.contains(slot));
    Ok(Some(Value::string_list(free)))
}

/// Free network device slots, skipping those this VM's VIFs occupy.
fn get_allowed_vif_devices(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let vif_refs = ref_list(&class.get_record(vm_ref)?, "VIFs");

    let used: BTreeSet<String> = {
        let vifs = api.require_class("VIF")?.read()?;
        vif_refs
            .iter()
            .filter_map(|vif_ref| vifs.get(vif_ref).ok())
            .filter_map(|vif| vif.get("device").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    };

    let free = (0..VIF_DEVICE_SLOTS)
        .map(|slot| slot.to_string())
        .filter(|slot| !used.contains(slot));
    Ok(Some(Value::string_list(free)))
}

/// Move a VM into an appliance, or out of any with the null reference.
fn set_appliance(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let appliances = api.require_class("VM_appliance")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let appliance = appliances.check_ref(arg(args, 1)?)?;
    class.ensure_exists(vm_ref)?;
    let joined = (appliance != NULL_REF).then_some(appliance);
    if let Some(joined) = joined {
        appliances.ensure_exists(joined)?;
    }

    let left = class.update(vm_ref, |record| {
        let left = ref_field(record, "appliance");
        record.insert("appliance".into(), Value::from(appliance));
        Ok(left)
    })?;

    if let Some(left) = left {
        unlink(appliances, &left, "VMs", vm_ref)?;
    }
    if let Some(joined) = joined {
        link(appliances, joined, "VMs", vm_ref)?;
    }
    Ok(None)
}

/// Start a halted member of an appliance.
pub(super) fn start_member(api: &XenApi, vm_ref: &str, paused: bool) -> Result<()> {
    let class = api.require_class("VM")?;
    change_power_state(api, class, vm_ref, &["Halted"], running_or_paused(paused), None)
}

/// Halt a member of an appliance; a clean stop needs it running.
pub(super) fn stop_member(api: &XenApi, vm_ref: &str, hard: bool) -> Result<()> {
    let class = api.require_class("VM")?;
    let from: &[&str] = if hard {
        &["Running", "Paused", "Suspended"]
    } else {
        &["Running"]
    };
    change_power_state(api, class, vm_ref, from, "Halted", None)
}

fn get_possible_hosts(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    let hosts = api.require_class("host")?.refs()?;
    Ok(Some(Value::string_list(hosts)))
}

fn copy_bios_strings(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let host_ref = hosts.check_ref(arg(args, 1)?)?;
    class.ensure_exists(vm_ref)?;
    let bios_strings = hosts.field_value(host_ref, "bios_strings")?;

    class.update(vm_ref, |record| {
        record.insert("bios_strings".into(), bios_strings);
        Ok(())
    })?;
    Ok(None)
}

fn assert_can_boot_here(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    let host_ref = hosts.check_ref(arg(args, 1)?)?;
    class.ensure_exists(vm_ref)?;
    hosts.ensure_exists(host_ref)?;
    Ok(None)
}

fn assert_operation_valid(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    expect_str(arg(args, 1)?, "op")?;
    class.ensure_exists(vm_ref)?;
    Ok(None)
}

/// Cross-pool migration and its pre-check: validated, never performed.
fn migrate_send(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let vm_ref = class.check_ref(arg(args, 0)?)?;
    expect_struct(arg(args, 1)?, "dest")?;
    expect_bool(arg(args, 2)?, "live")?;
    expect_struct(arg(args, 3)?, "vdi_map")?;
    expect_struct(arg(args, 4)?, "vif_map")?;
    expect_struct(arg(args, 5)?, "options")?;
    expect_struct(arg(args, 6)?, "vgpu_map")?;
    class.ensure_exists(vm_ref)?;
    Ok(None)
}
