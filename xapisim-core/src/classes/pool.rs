//! `pool` class. The simulator always has exactly one pool, mastered by
//! the simulated host.

use tracing::info;

use super::Seed;
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::method::Method;
use crate::params::arg;
use crate::schema::FieldTable;
use crate::value::{new_ref, Value};

fn fields() -> FieldTable {
    FieldTable::new()
        .field("allowed_operations", Value::empty_list())
        .field("blobs", Value::empty_map())
        .field("cpu_info", Value::empty_map())
        .reference("crash_dump_SR")
        .field("current_operations", Value::empty_map())
        .reference("default_SR")
        .field("guest_agent_config", Value::empty_map())
        .field("gui_config", Value::empty_map())
        .field("ha_allow_overcommit", false)
        .field("ha_cluster_stack", "")
        .field("ha_configuration", Value::empty_map())
        .field("ha_enabled", false)
        .int64("ha_host_failures_to_tolerate", 0)
        .field("ha_overcommitted", false)
        .int64("ha_plan_exists_for", 0)
        .field("ha_statefiles", Value::empty_list())
        .field("health_check_config", Value::empty_map())
        .field("igmp_snooping_enabled", false)
        .field("live_patching_disabled", false)
        .reference("master")
        .field("metadata_VDIs", Value::empty_list())
        .field("name_description", "")
        .field("name_label", "")
        .field("policy_no_vendor_device", false)
        .field("redo_log_enabled", false)
        .reference("redo_log_vdi")
        .field("restrictions", Value::empty_map())
        .reference("suspend_image_SR")
        .field("tags", Value::empty_list())
        .field("vswitch_controller", "")
        .field("wlb_enabled", false)
        .field("wlb_url", "")
        .field("wlb_username", "")
        .field("wlb_verify_cert", false)
        .read_write(&[
            "crash_dump_SR",
            "default_SR",
            "gui_config",
            "ha_allow_overcommit",
            "health_check_config",
            "live_patching_disabled",
            "name_description",
            "name_label",
            "policy_no_vendor_device",
            "suspend_image_SR",
            "tags",
            "wlb_enabled",
            "wlb_verify_cert",
        ])
        .lists(&["tags"])
        .maps(&["guest_agent_config", "gui_config", "health_check_config"])
}

pub(crate) fn class(seed: &Seed) -> Result<ApiClass> {
    let class = ApiClass::new("pool", fields())
        .with_unimplemented(&[
            "apply_edition",
            "certificate_install",
            "certificate_list",
            "certificate_sync",
            "certificate_uninstall",
            "create_VLAN",
            "create_VLAN_from_PIF",
            "create_new_blob",
            "crl_install",
            "crl_list",
            "crl_uninstall",
            "deconfigure_wlb",
            "detect_nonhomogeneous_external_auth",
            "disable_external_auth",
            "disable_ha",
            "disable_local_storage_caching",
            "disable_redo_log",
            "disable_ssl_legacy",
            "emergency_reset_master",
            "emergency_transition_to_master",
            "enable_external_auth",
            "enable_ha",
            "enable_local_storage_caching",
            "enable_redo_log",
            "enable_ssl_legacy",
            "ha_compute_hypothetical_max_host_failures_to_tolerate",
            "ha_compute_max_host_failures_to_tolerate",
            "ha_compute_vm_failover_plan",
            "ha_failover_plan_exists",
            "ha_prevent_restarts_for",
            "has_extension",
            "initialize_wlb",
            "join",
            "join_force",
            "management_reconfigure",
            "recover_slaves",
            "retrieve_wlb_configuration",
            "retrieve_wlb_recommendations",
            "send_test_post",
            "send_wlb_configuration",
            "sync_database",
            "test_archive_target",
        ])
        .with_method(Method::new("get_license_state", 1, get_license_state))
        .with_method(Method::new("designate_new_master", 1, designate_new_master))
        .with_method(Method::new("eject", 1, eject));

    let mut record = class.fields().default_record();
    record.insert("allowed_operations".into(), Value::string_list(["ha_enable"]));
    record.insert("ha_cluster_stack".into(), Value::from("xhad"));
    record.insert("master".into(), Value::from(seed.this_host.as_str()));
    record.insert("name_label".into(), Value::from("xenserver-pool"));
    class.seed(&new_ref(), record)?;

    Ok(class)
}

fn get_license_state(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    class.require_ref(arg(args, 0)?)?;
    Ok(Some(Value::string_map([
        ("edition", "enterprise-per-socket"),
        ("expiry", "never"),
    ])))
}

fn designate_new_master(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let host_ref = hosts.require_ref(arg(args, 0)?)?;

    let pool_ref = class
        .refs()?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal("no pool record"))?;
    class.update(&pool_ref, |record| {
        record.insert("master".into(), Value::from(host_ref));
        Ok(())
    })?;

    info!(host = %host_ref, "Designated new pool master");
    Ok(None)
}

/// Remove a member host. The master and the simulated host itself stay.
fn eject(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let hosts = api.require_class("host")?;
    let host_ref = hosts.check_ref(arg(args, 0)?)?;
    hosts.ensure_exists(host_ref)?;

    let is_master = class
        .read()?
        .records()
        .any(|(_, pool)| pool.get("master").and_then(Value::as_str) == Some(host_ref));
    if is_master {
        return Err(ApiError::operation_not_allowed(format!(
            "{} is the pool master",
            host_ref
        )));
    }
    if host_ref == api.this_host() {
        return Err(ApiError::operation_not_allowed(format!(
            "{} is the host serving this API",
            host_ref
        )));
    }

    hosts.destroy(host_ref)?;
    info!(host = %host_ref, "Host ejected from pool");
    Ok(None)
}
