//! Read-only inventory classes: host hardware and the `*_metrics` records.
//!
//! None of these have hand-written methods; clients only read them through
//! the synthesized getters. Seed records that belong to this host, its
//! management interface or dom0 are linked from those records.

use chrono::Utc;

use super::host::HOST_MEMORY_BYTES;
use super::Seed;
use crate::class::ApiClass;
use crate::error::Result;
use crate::schema::FieldTable;
use crate::value::{new_ref, Value};

/// Memory dom0 is seeded with.
const DOM0_MEMORY_BYTES: i64 = 4 * 1024 * 1024 * 1024;

/// Every metrics class carries its sampling time.
fn metrics_fields() -> FieldTable {
    FieldTable::new().field("last_updated", Value::epoch())
}

fn io_metrics_fields() -> FieldTable {
    metrics_fields()
        .field("io_read_kbs", 0.0)
        .field("io_write_kbs", 0.0)
}

/// Seed one record: defaults, then `overrides`, sampled now.
fn seed_one(class: &ApiClass, obj_ref: &str, overrides: Vec<(&str, Value)>) -> Result<()> {
    let mut record = class.fields().default_record();
    if record.contains_key("last_updated") {
        record.insert("last_updated".into(), Value::DateTime(Utc::now()));
    }
    for (name, value) in overrides {
        record.insert(name.to_string(), value);
    }
    class.seed(obj_ref, record)
}

pub(crate) fn host_cpu(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new(
        "host_cpu",
        FieldTable::new()
            .int64("family", 0)
            .field("features", "")
            .field("flags", "")
            .reference("host")
            .int64("model", 0)
            .field("modelname", "")
            .int64("number", 0)
            .int64("speed", 0)
            .field("stepping", "")
            .field("utilisation", 0.0)
            .field("vendor", ""),
    );

    seed_one(
        &class,
        &seed.host_cpu,
        vec![("host", Value::from(seed.this_host.as_str()))],
    )?;
    Ok(class)
}

pub(crate) fn host_metrics(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new(
        "host_metrics",
        metrics_fields()
            .field("live", true)
            .int64("memory_free", 0)
            .int64("memory_total", 0),
    );

    seed_one(
        &class,
        &seed.host_metrics,
        vec![
            ("memory_total", Value::String(HOST_MEMORY_BYTES.to_string())),
            (
                "memory_free",
                Value::String((HOST_MEMORY_BYTES - DOM0_MEMORY_BYTES).to_string()),
            ),
        ],
    )?;
    Ok(class)
}

pub(crate) fn pci(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new(
        "PCI",
        FieldTable::new()
            .field("class_name", "")
            .field("dependencies", Value::empty_list())
            .field("device_name", "")
            .field("driver_name", "")
            .reference("host")
            .field("pci_id", "")
            .field("subsystem_device_name", "")
            .field("subsystem_vendor_name", "")
            .field("vendor_name", ""),
    );

    seed_one(
        &class,
        &seed.nic,
        vec![
            ("class_name", Value::from("Ethernet controller")),
            ("device_name", Value::from("XenAPISim NIC")),
            ("host", Value::from(seed.this_host.as_str())),
            ("pci_id", Value::from("0000:00:00.0")),
            ("subsystem_device_name", Value::from("XenAPISim 10Gb Adapter")),
            ("subsystem_vendor_name", Value::from("XenAPISim")),
            ("vendor_name", Value::from("XenAPISim")),
        ],
    )?;
    Ok(class)
}

pub(crate) fn pif_metrics(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new(
        "PIF_metrics",
        io_metrics_fields()
            .field("carrier", true)
            .field("device_id", "")
            .field("device_name", "")
            .field("duplex", true)
            .field("pci_bus_path", "")
            .int64("speed", 0)
            .field("vendor_id", "")
            .field("vendor_name", ""),
    );

    seed_one(
        &class,
        &seed.pif_metrics,
        vec![
            ("device_name", Value::from("XenAPISim NIC")),
            ("pci_bus_path", Value::from("0000:00:00.0")),
            ("speed", Value::from("10000")),
            ("vendor_name", Value::from("XenAPISim")),
        ],
    )?;
    Ok(class)
}

pub(crate) fn vbd_metrics() -> Result<ApiClass> {
    let class = ApiClass::new("VBD_metrics", io_metrics_fields());
    seed_one(&class, &new_ref(), Vec::new())?;
    Ok(class)
}

pub(crate) fn vif_metrics() -> Result<ApiClass> {
    let class = ApiClass::new("VIF_metrics", io_metrics_fields());
    seed_one(&class, &new_ref(), Vec::new())?;
    Ok(class)
}

pub(crate) fn vm_metrics(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new(
        "VM_metrics",
        metrics_fields()
            .field("VCPUs_CPU", Value::empty_map())
            .field("VCPUs_flags", Value::empty_map())
            .int64("VCPUs_number", 0)
            .field("VCPUs_params", Value::empty_map())
            .field("VCPUs_utilisation", Value::empty_map())
            .field("current_domain_type", "unspecified")
            .field("hvm", false)
            .field("install_time", Value::epoch())
            .int64("memory_actual", 0)
            .field("nested_virt", false)
            .field("nomigrate", false)
            .field("start_time", Value::epoch())
            .field("state", Value::empty_list()),
    );

    let now = Utc::now();
    seed_one(
        &class,
        &seed.dom0_metrics,
        vec![
            ("VCPUs_number", Value::from("4")),
            ("current_domain_type", Value::from("pv")),
            ("install_time", Value::DateTime(now)),
            ("memory_actual", Value::String(DOM0_MEMORY_BYTES.to_string())),
            ("start_time", Value::DateTime(now)),
        ],
    )?;
    Ok(class)
}

pub(crate) fn vm_guest_metrics() -> Result<ApiClass> {
    let class = ApiClass::new(
        "VM_guest_metrics",
        metrics_fields()
            .field("PV_drivers_detected", false)
            .field("PV_drivers_up_to_date", false)
            .field("PV_drivers_version", Value::empty_map())
            .field("can_use_hotplug_vbd", "unspecified")
            .field("can_use_hotplug_vif", "unspecified")
            .field("disks", Value::empty_map())
            .field("live", false)
            .field("memory", Value::empty_map())
            .field("networks", Value::empty_map())
            .field("os_version", Value::empty_map())
            .field("other", Value::empty_map()),
    );

    seed_one(
        &class,
        &new_ref(),
        vec![
            ("PV_drivers_detected", Value::Bool(true)),
            ("PV_drivers_up_to_date", Value::Bool(true)),
            (
                "PV_drivers_version",
                Value::string_map([("major", "6"), ("minor", "1"), ("micro", "0"), ("build", "59235")]),
            ),
            ("live", Value::Bool(true)),
        ],
    )?;
    Ok(class)
}
