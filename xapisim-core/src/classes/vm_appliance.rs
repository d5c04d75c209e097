//! `VM_appliance` class: VMs started and stopped as one unit.

use tracing::info;

use super::{record_from_args, ref_list, set_field, vm};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_bool, expect_struct};
use crate::schema::FieldTable;
use crate::value::{new_ref, Value, NULL_REF};

const ALLOWED_OPERATIONS: [&str; 4] = ["start", "clean_shutdown", "hard_shutdown", "shutdown"];

fn fields() -> FieldTable {
    FieldTable::new()
        .field("VMs", Value::empty_list())
        .field("allowed_operations", Value::empty_list())
        .field("current_operations", Value::empty_map())
        .field("name_description", "")
        .field("name_label", "")
        .read_write(&["name_description", "name_label"])
}

pub(crate) fn class() -> Result<ApiClass> {
    let class = ApiClass::new("VM_appliance", fields())
        .with_unimplemented(&[
            "assert_can_be_recovered",
            "get_SRs_required_for_recovery",
            "recover",
        ])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("start", 2, start))
        .with_method(Method::new("clean_shutdown", 1, clean_shutdown))
        .with_method(Method::new("shutdown", 1, clean_shutdown))
        .with_method(Method::new("hard_shutdown", 1, hard_shutdown));

    let mut record = class.fields().default_record();
    record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));
    record.insert("name_label".into(), Value::from("VM-App-1"));
    class.seed(&new_ref(), record)?;

    Ok(class)
}

fn create(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &["name_description", "name_label", "other_config"],
        &[],
    )?;
    record.insert("allowed_operations".into(), Value::string_list(ALLOWED_OPERATIONS));

    let appliance_ref = class.insert(record)?;
    info!(appliance = %appliance_ref, "VM appliance created");
    Ok(Some(Value::String(appliance_ref)))
}

/// Remove the appliance; its VMs stay and lose their membership.
fn destroy(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let appliance_ref = class.check_ref(arg(args, 0)?)?;
    let record = class.destroy(appliance_ref)?;

    let vms = api.require_class("VM")?;
    for vm_ref in ref_list(&record, "VMs") {
        set_field(vms, &vm_ref, "appliance", Value::from(NULL_REF))?;
    }
    info!(appliance = %appliance_ref, "VM appliance destroyed");
    Ok(None)
}

/// Members in their power state, in membership order.
fn members_in(api: &XenApi, class: &ApiClass, appliance_ref: &str, states: &[&str]) -> Result<Vec<String>> {
    let members = ref_list(&class.get_record(appliance_ref)?, "VMs");
    let vms = api.require_class("VM")?;
    let store = vms.read()?;
    Ok(members
        .into_iter()
        .filter(|vm_ref| {
            store
                .get(vm_ref)
                .ok()
                .and_then(|vm| vm.get("power_state").and_then(Value::as_str))
                .map(|state| states.contains(&state))
                .unwrap_or(false)
        })
        .collect())
}

/// Start every halted member; members already up are left alone.
fn start(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let appliance_ref = class.check_ref(arg(args, 0)?)?;
    let paused = expect_bool(arg(args, 1)?, "paused")?;

    let members = members_in(api, class, appliance_ref, &["Halted"])?;
    for vm_ref in &members {
        vm::start_member(api, vm_ref, paused)?;
    }
    info!(appliance = %appliance_ref, started = members.len(), "VM appliance started");
    Ok(None)
}

fn stop(api: &XenApi, class: &ApiClass, args: &[Value], hard: bool) -> Result<Option<Value>> {
    let appliance_ref = class.check_ref(arg(args, 0)?)?;
    let states: &[&str] = if hard {
        &["Running", "Paused", "Suspended"]
    } else {
        &["Running"]
    };

    let members = members_in(api, class, appliance_ref, states)?;
    for vm_ref in &members {
        vm::stop_member(api, vm_ref, hard)?;
    }
    info!(appliance = %appliance_ref, stopped = members.len(), hard, "VM appliance shut down");
    Ok(None)
}

fn clean_shutdown(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    stop(api, class, args, false)
}

fn hard_shutdown(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    stop(api, class, args, true)
}
