//! End-to-end behaviour of the dispatcher across classes.

use chrono::{Duration, Utc};
use serde_json::json;
use xapisim_core::{Envelope, Record, SimulatorSettings, Value, XenApi, NULL_REF};

fn api() -> XenApi {
    XenApi::new(&SimulatorSettings::default()).unwrap()
}

fn login(api: &XenApi) -> Value {
    let envelope = api.dispatch(
        "session.login_with_password",
        &[Value::from("root"), Value::from("xenserver")],
    );
    envelope.into_value().expect("login should succeed")
}

/// Call an authenticated operation.
fn call(api: &XenApi, session: &Value, method: &str, args: Vec<Value>) -> Envelope {
    let mut params = vec![session.clone()];
    params.extend(args);
    api.dispatch(method, &params)
}

fn ok(envelope: Envelope) -> Value {
    match envelope {
        Envelope::Success { value } => value,
        Envelope::Failure { error_description } => panic!("call failed: {:?}", error_description),
    }
}

fn failure(envelope: Envelope) -> Vec<String> {
    match envelope {
        Envelope::Failure { error_description } => error_description,
        Envelope::Success { value } => panic!("call succeeded with {:?}", value),
    }
}

fn first_ref(api: &XenApi, session: &Value, class: &str) -> Value {
    let all = ok(call(api, session, &format!("{}.get_all", class), vec![]));
    all.as_array().unwrap()[0].clone()
}

fn record(entries: Vec<(&str, Value)>) -> Value {
    Value::Struct(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<Record>())
}

fn vm_args(name: &str) -> Value {
    record(vec![
        ("name_label", Value::from(name)),
        ("user_version", Value::from("1")),
        ("is_a_template", Value::Bool(false)),
        ("affinity", Value::from(NULL_REF)),
        ("memory_static_max", Value::from("1073741824")),
        ("memory_dynamic_max", Value::from("1073741824")),
        ("memory_dynamic_min", Value::from("536870912")),
        ("memory_static_min", Value::from("536870912")),
        ("VCPUs_params", Value::empty_map()),
        ("VCPUs_max", Value::from("2")),
        ("VCPUs_at_startup", Value::Int(2)),
        ("actions_after_shutdown", Value::from("destroy")),
        ("actions_after_reboot", Value::from("restart")),
        ("actions_after_crash", Value::from("restart")),
        ("PV_bootloader", Value::from("pygrub")),
        ("PV_kernel", Value::from("")),
        ("PV_ramdisk", Value::from("")),
        ("PV_args", Value::from("")),
        ("PV_bootloader_args", Value::from("")),
        ("PV_legacy_args", Value::from("")),
        ("HVM_boot_policy", Value::from("")),
        ("HVM_boot_params", Value::empty_map()),
        ("platform", Value::empty_map()),
        ("PCI_bus", Value::from("")),
        ("other_config", Value::empty_map()),
        ("recommendations", Value::from("")),
    ])
}

#[test]
fn unknown_methods_fail_on_every_class() {
    let api = api();
    let session = login(&api);
    for class in api.class_names().collect::<Vec<_>>() {
        let method = format!("{}.frobnicate", class);
        let description = failure(call(&api, &session, &method, vec![]));
        assert_eq!(description, vec!["MESSAGE_METHOD_UNKNOWN".to_string(), method]);
    }
    assert_eq!(
        failure(api.dispatch("nonexistent.get_all", &[session])),
        vec!["MESSAGE_METHOD_UNKNOWN", "nonexistent.get_all"]
    );
}

#[test]
fn known_but_unimplemented_methods() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");
    assert_eq!(
        failure(call(&api, &session, "host.evacuate", vec![host])),
        vec!["NOT_IMPLEMENTED", "evacuate"]
    );
}

#[test]
fn getter_with_unknown_reference() {
    let api = api();
    let session = login(&api);
    for class in ["host", "VM", "SR", "VDI", "network", "pool"] {
        let description = failure(call(
            &api,
            &session,
            &format!("{}.get_uuid", class),
            vec![Value::from("OpaqueRef:missing")],
        ));
        assert_eq!(description, vec!["HANDLE_INVALID", class, "OpaqueRef:missing"]);
    }
}

#[test]
fn setter_rejects_wrong_type_and_keeps_value() {
    let api = api();
    let session = login(&api);
    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("web-1")]));

    let description = failure(call(
        &api,
        &session,
        "VM.set_name_label",
        vec![vm.clone(), Value::Int(7)],
    ));
    assert_eq!(description, vec!["FIELD_TYPE_ERROR", "value"]);

    let name = ok(call(&api, &session, "VM.get_name_label", vec![vm]));
    assert_eq!(name, Value::from("web-1"));
}

#[test]
fn map_keys_are_unique() {
    let api = api();
    let session = login(&api);
    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("db-1")]));

    let add = |value: &str| {
        call(
            &api,
            &session,
            "VM.add_to_other_config",
            vec![vm.clone(), Value::from("owner"), Value::from(value)],
        )
    };
    assert!(add("alice").is_success());
    let description = failure(add("bob"));
    assert_eq!(description[0], "MAP_DUPLICATE_KEY");
    assert_eq!(description[1..], ["VM", "other_config", vm.as_str().unwrap(), "owner"]);

    let config = ok(call(&api, &session, "VM.get_other_config", vec![vm.clone()]));
    assert_eq!(config.as_struct().unwrap()["owner"], Value::from("alice"));

    ok(call(
        &api,
        &session,
        "VM.remove_from_other_config",
        vec![vm.clone(), Value::from("owner")],
    ));
    // Removing an absent key is not an error.
    ok(call(
        &api,
        &session,
        "VM.remove_from_other_config",
        vec![vm, Value::from("owner")],
    ));
}

#[test]
fn list_values_appear_once() {
    let api = api();
    let session = login(&api);
    let sr = first_ref(&api, &session, "SR");

    for _ in 0..2 {
        ok(call(&api, &session, "SR.add_tags", vec![sr.clone(), Value::from("fast")]));
    }
    let tags = ok(call(&api, &session, "SR.get_tags", vec![sr.clone()]));
    assert_eq!(tags, Value::string_list(["fast"]));

    ok(call(&api, &session, "SR.remove_tags", vec![sr.clone(), Value::from("fast")]));
    let tags = ok(call(&api, &session, "SR.get_tags", vec![sr]));
    assert_eq!(tags, Value::empty_list());
}

#[test]
fn session_lifecycle() {
    let api = api();
    let session = login(&api);
    let session_ref = session.as_str().unwrap().to_string();
    let sessions = api.class("session").unwrap();

    // Any authenticated call refreshes last_active.
    sessions
        .update(&session_ref, |record| {
            record.insert("last_active".into(), Value::epoch());
            Ok(())
        })
        .unwrap();
    ok(call(&api, &session, "pool.get_all", vec![]));
    let last_active = sessions.field_value(&session_ref, "last_active").unwrap();
    assert_ne!(last_active, Value::epoch());

    // Not yet idle long enough.
    assert!(api.expire_sessions(Utc::now() + Duration::hours(23)).unwrap().is_empty());

    let expired = api.expire_sessions(Utc::now() + Duration::hours(25)).unwrap();
    assert_eq!(expired, vec![session_ref.clone()]);
    assert_eq!(
        failure(call(&api, &session, "pool.get_all", vec![])),
        vec!["SESSION_INVALID", session_ref.as_str()]
    );
}

#[test]
fn wrong_password_creates_no_session() {
    let api = api();
    let envelope = api.dispatch(
        "session.login_with_password",
        &[Value::from("root"), Value::from("hunter2")],
    );
    assert_eq!(failure(envelope), vec!["SESSION_AUTHENTICATION_FAILED"]);
    assert_eq!(api.class("session").unwrap().len().unwrap(), 0);
}

#[test]
fn login_accepts_optional_version_and_originator() {
    let api = api();
    let envelope = api.dispatch(
        "session.login_with_password",
        &[
            Value::from("root"),
            Value::from("xenserver"),
            Value::from("1.0"),
            Value::from("integration-tests"),
        ],
    );
    let session = ok(envelope);
    let originator = ok(call(&api, &session, "session.get_originator", vec![session.clone()]));
    assert_eq!(originator, Value::from("integration-tests"));

    let envelope = api.dispatch("session.login_with_password", &[Value::from("root")]);
    assert_eq!(
        failure(envelope),
        vec!["MESSAGE_PARAMETER_COUNT_MISMATCH", "session.login_with_password", "4", "1"]
    );
}

#[test]
fn change_password_and_logout() {
    let api = api();
    let session = login(&api);

    assert_eq!(
        failure(call(
            &api,
            &session,
            "session.change_password",
            vec![Value::from("xenserver"), Value::from("")],
        )),
        vec!["CHANGE_PASSWORD_REJECTED", "Authentication information cannot be recovered"]
    );
    ok(call(
        &api,
        &session,
        "session.change_password",
        vec![Value::from("xenserver"), Value::from("n3w")],
    ));

    let session_ref = session.as_str().unwrap().to_string();
    ok(api.dispatch("session.logout", &[session.clone()]));
    assert_eq!(
        failure(api.dispatch("session.logout", &[session])),
        vec!["SESSION_INVALID", session_ref.as_str()]
    );

    let envelope = api.dispatch(
        "session.login_with_password",
        &[Value::from("root"), Value::from("n3w")],
    );
    assert!(envelope.is_success());
}

#[test]
fn parameter_count_mismatch_excludes_session() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");

    assert_eq!(
        failure(call(&api, &session, "host.get_name_label", vec![host.clone(), host])),
        vec!["MESSAGE_PARAMETER_COUNT_MISMATCH", "host.get_name_label", "1", "2"]
    );
    assert_eq!(
        failure(call(&api, &session, "VM.start", vec![])),
        vec!["MESSAGE_PARAMETER_COUNT_MISMATCH", "VM.start", "3", "0"]
    );
}

#[test]
fn destroy_twice_is_handle_invalid() {
    let api = api();
    let session = login(&api);
    let task = ok(call(
        &api,
        &session,
        "task.create",
        vec![Value::from("import"), Value::from("importing a disk")],
    ));

    ok(call(&api, &session, "task.destroy", vec![task.clone()]));
    let description = failure(call(&api, &session, "task.destroy", vec![task.clone()]));
    assert_eq!(description, vec!["HANDLE_INVALID", "task", task.as_str().unwrap()]);
}

#[test]
fn storage_and_guest_flow() {
    let api = api();
    let session = login(&api);
    let sr = first_ref(&api, &session, "SR");

    let vdi = ok(call(
        &api,
        &session,
        "VDI.create",
        vec![record(vec![
            ("SR", sr.clone()),
            ("name_label", Value::from("root disk")),
            ("virtual_size", Value::Int(10 * 1024 * 1024 * 1024)),
            ("type", Value::from("user")),
            ("sharable", Value::Bool(false)),
            ("read_only", Value::Bool(false)),
            ("other_config", Value::empty_map()),
        ])],
    ));
    let sr_vdis = ok(call(&api, &session, "SR.get_VDIs", vec![sr.clone()]));
    assert!(sr_vdis.as_array().unwrap().contains(&vdi));
    assert_eq!(
        ok(call(&api, &session, "VDI.get_virtual_size", vec![vdi.clone()])),
        Value::from("10737418240")
    );

    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("app-1")]));
    let vbd = ok(call(
        &api,
        &session,
        "VBD.create",
        vec![record(vec![
            ("VM", vm.clone()),
            ("VDI", vdi.clone()),
            ("userdevice", Value::from("0")),
            ("bootable", Value::Bool(true)),
            ("mode", Value::from("RW")),
            ("type", Value::from("Disk")),
            ("empty", Value::Bool(false)),
            ("other_config", Value::empty_map()),
            ("qos_algorithm_type", Value::from("")),
            ("qos_algorithm_params", Value::empty_map()),
        ])],
    ));
    assert_eq!(
        ok(call(&api, &session, "VM.get_VBDs", vec![vm.clone()])),
        Value::Array(vec![vbd.clone()])
    );
    assert_eq!(
        failure(call(&api, &session, "VBD.eject", vec![vbd.clone()])),
        vec!["VBD_NOT_REMOVABLE_MEDIA", vbd.as_str().unwrap()]
    );

    ok(call(
        &api,
        &session,
        "VM.start",
        vec![vm.clone(), Value::Bool(false), Value::Bool(false)],
    ));
    assert_eq!(
        ok(call(&api, &session, "VM.get_power_state", vec![vm.clone()])),
        Value::from("Running")
    );
    assert_eq!(
        failure(call(&api, &session, "VM.destroy", vec![vm.clone()]))[0],
        "VM_BAD_POWER_STATE"
    );

    ok(call(&api, &session, "VM.hard_shutdown", vec![vm.clone()]));
    ok(call(&api, &session, "VM.destroy", vec![vm]));
    // The VM's block devices go with it.
    assert_eq!(
        failure(call(&api, &session, "VBD.get_VM", vec![vbd]))[0],
        "HANDLE_INVALID"
    );
    assert_eq!(
        ok(call(&api, &session, "VDI.get_VBDs", vec![vdi])),
        Value::empty_list()
    );
}

#[test]
fn cd_drive_media() {
    let api = api();
    let session = login(&api);
    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("installer")]));
    let iso = first_ref(&api, &session, "VDI");

    let cd = ok(call(
        &api,
        &session,
        "VBD.create",
        vec![record(vec![
            ("VM", vm),
            ("VDI", Value::from(NULL_REF)),
            ("userdevice", Value::from("3")),
            ("bootable", Value::Bool(false)),
            ("mode", Value::from("RO")),
            ("type", Value::from("CD")),
            ("empty", Value::Bool(true)),
            ("other_config", Value::empty_map()),
            ("qos_algorithm_type", Value::from("")),
            ("qos_algorithm_params", Value::empty_map()),
        ])],
    ));

    assert_eq!(failure(call(&api, &session, "VBD.eject", vec![cd.clone()]))[0], "VBD_IS_EMPTY");
    ok(call(&api, &session, "VBD.insert", vec![cd.clone(), iso.clone()]));
    assert_eq!(
        failure(call(&api, &session, "VBD.insert", vec![cd.clone(), iso.clone()]))[0],
        "VBD_NOT_EMPTY"
    );
    ok(call(&api, &session, "VBD.eject", vec![cd.clone()]));
    assert_eq!(
        ok(call(&api, &session, "VBD.get_VDI", vec![cd])),
        Value::from(NULL_REF)
    );
}

#[test]
fn create_reports_missing_fields() {
    let api = api();
    let session = login(&api);
    let description = failure(call(
        &api,
        &session,
        "network.create",
        vec![record(vec![("name_label", Value::from("storage"))])],
    ));
    assert_eq!(description, vec!["FIELD_MISSING", "other_config"]);

    let network = ok(call(
        &api,
        &session,
        "network.create",
        vec![record(vec![
            ("name_label", Value::from("storage")),
            ("other_config", Value::empty_map()),
        ])],
    ));
    assert_eq!(
        ok(call(&api, &session, "network.get_bridge", vec![network.clone()])),
        Value::from("xapi1")
    );
    assert_eq!(
        ok(call(&api, &session, "network.get_MTU", vec![network])),
        Value::from("1500")
    );
}

#[test]
fn envelope_json_shape() {
    let api = api();
    let session = login(&api);

    let envelope = call(&api, &session, "VM.echo", vec![Value::from("ping")]);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"Status": "Success", "Value": "ping"})
    );

    let envelope = call(&api, &session, "VM.get_uuid", vec![Value::from("OpaqueRef:gone")]);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "Status": "Failure",
            "ErrorDescription": ["HANDLE_INVALID", "VM", "OpaqueRef:gone"]
        })
    );

    // Operations without a result report an empty string.
    let host = first_ref(&api, &session, "host");
    let envelope = call(&api, &session, "host.disable", vec![host]);
    assert_eq!(envelope, Envelope::success(None));
    assert_eq!(envelope.value(), Some(&Value::from("")));
}

fn contains(list: &Value, item: &Value) -> bool {
    list.as_array().unwrap().contains(item)
}

#[test]
fn seeded_inventory_is_linked() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");
    let sr = first_ref(&api, &session, "SR");

    let pif = ok(call(&api, &session, "host.get_management_interface", vec![host.clone()]));
    assert_ne!(pif, Value::from(NULL_REF));
    assert_eq!(
        ok(call(&api, &session, "host.get_PIFs", vec![host.clone()])),
        Value::Array(vec![pif.clone()])
    );
    assert_eq!(ok(call(&api, &session, "PIF.get_host", vec![pif.clone()])), host);
    assert_eq!(
        ok(call(&api, &session, "PIF.get_device", vec![pif.clone()])),
        Value::from("eth0")
    );
    let nic = ok(call(&api, &session, "PIF.get_PCI", vec![pif.clone()]));
    assert_eq!(ok(call(&api, &session, "PCI.get_host", vec![nic.clone()])), host);
    assert!(contains(&ok(call(&api, &session, "host.get_PCIs", vec![host.clone()])), &nic));
    let pif_metrics = ok(call(&api, &session, "PIF.get_metrics", vec![pif]));
    assert_eq!(
        ok(call(&api, &session, "PIF_metrics.get_speed", vec![pif_metrics])),
        Value::from("10000")
    );

    let pbds = ok(call(&api, &session, "SR.get_PBDs", vec![sr.clone()]));
    let pbd = pbds.as_array().unwrap()[0].clone();
    let pbd_record = ok(call(&api, &session, "PBD.get_record", vec![pbd.clone()]));
    assert_eq!(pbd_record.as_struct().unwrap()["SR"], sr);
    assert_eq!(pbd_record.as_struct().unwrap()["host"], host);
    assert_eq!(
        ok(call(&api, &session, "host.get_PBDs", vec![host.clone()])),
        Value::Array(vec![pbd])
    );

    let cpus = ok(call(&api, &session, "host.get_host_CPUs", vec![host.clone()]));
    let cpu = cpus.as_array().unwrap()[0].clone();
    assert_eq!(ok(call(&api, &session, "host_cpu.get_host", vec![cpu])), host);
    let host_metrics = ok(call(&api, &session, "host.get_metrics", vec![host]));
    assert_eq!(
        ok(call(&api, &session, "host_metrics.get_memory_total", vec![host_metrics])),
        Value::from("34359738368")
    );

    let dom0 = first_ref(&api, &session, "VM");
    let vm_metrics = ok(call(&api, &session, "VM.get_metrics", vec![dom0]));
    assert_eq!(
        ok(call(&api, &session, "VM_metrics.get_VCPUs_number", vec![vm_metrics])),
        Value::from("4")
    );

    for class in ["VBD_metrics", "VIF_metrics", "VM_guest_metrics", "VM_appliance"] {
        let all = ok(call(&api, &session, &format!("{}.get_all", class), vec![]));
        assert_eq!(all.as_array().unwrap().len(), 1, "{} seed", class);
    }
    for class in ["Bond", "VLAN", "VIF"] {
        let all = ok(call(&api, &session, &format!("{}.get_all", class), vec![]));
        assert_eq!(all, Value::empty_list(), "{} starts empty", class);
    }
}

#[test]
fn sr_create_plugs_into_host() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");

    let sr = ok(call(
        &api,
        &session,
        "SR.create",
        vec![
            host.clone(),
            Value::string_map([("server", "nfs.example"), ("serverpath", "/export")]),
            Value::from("107374182400"),
            Value::from("shared storage"),
            Value::from(""),
            Value::from("nfs"),
            Value::from("user"),
            Value::Bool(true),
            Value::empty_map(),
        ],
    ));

    let pbds = ok(call(&api, &session, "SR.get_PBDs", vec![sr.clone()]));
    assert_eq!(pbds.as_array().unwrap().len(), 1);
    let pbd = pbds.as_array().unwrap()[0].clone();
    assert_eq!(ok(call(&api, &session, "PBD.get_SR", vec![pbd.clone()])), sr);
    assert_eq!(
        ok(call(&api, &session, "PBD.get_device_config", vec![pbd.clone()])),
        Value::string_map([("server", "nfs.example"), ("serverpath", "/export")])
    );
    assert!(contains(&ok(call(&api, &session, "host.get_PBDs", vec![host.clone()])), &pbd));

    ok(call(&api, &session, "PBD.unplug", vec![pbd.clone()]));
    assert_eq!(
        ok(call(&api, &session, "PBD.get_currently_attached", vec![pbd.clone()])),
        Value::Bool(false)
    );

    ok(call(&api, &session, "SR.destroy", vec![sr]));
    assert_eq!(failure(call(&api, &session, "PBD.get_SR", vec![pbd.clone()]))[0], "HANDLE_INVALID");
    assert!(!contains(&ok(call(&api, &session, "host.get_PBDs", vec![host])), &pbd));
}

#[test]
fn pbd_create_checks_fields_and_references() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");
    let sr = first_ref(&api, &session, "SR");

    assert_eq!(
        failure(call(
            &api,
            &session,
            "PBD.create",
            vec![record(vec![("host", host.clone()), ("SR", sr.clone())])],
        )),
        vec!["FIELD_MISSING", "device_config"]
    );
    assert_eq!(
        failure(call(
            &api,
            &session,
            "PBD.create",
            vec![record(vec![
                ("host", Value::from("OpaqueRef:nowhere")),
                ("SR", sr.clone()),
                ("device_config", Value::empty_map()),
            ])],
        )),
        vec!["HANDLE_INVALID", "host", "OpaqueRef:nowhere"]
    );

    let pbd = ok(call(
        &api,
        &session,
        "PBD.create",
        vec![record(vec![
            ("host", host.clone()),
            ("SR", sr.clone()),
            ("device_config", Value::string_map([("device", "/dev/sdb")])),
        ])],
    ));
    assert!(contains(&ok(call(&api, &session, "SR.get_PBDs", vec![sr.clone()])), &pbd));
    ok(call(&api, &session, "PBD.destroy", vec![pbd.clone()]));
    assert!(!contains(&ok(call(&api, &session, "SR.get_PBDs", vec![sr])), &pbd));
    assert!(!contains(&ok(call(&api, &session, "host.get_PBDs", vec![host])), &pbd));
}

#[test]
fn pif_configuration_vlans_and_bonds() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");
    let network = first_ref(&api, &session, "network");
    let pif = ok(call(&api, &session, "host.get_management_interface", vec![host.clone()]));

    ok(call(
        &api,
        &session,
        "PIF.reconfigure_ip",
        vec![
            pif.clone(),
            Value::from("DHCP"),
            Value::from("10.0.0.5"),
            Value::from("255.0.0.0"),
            Value::from("10.0.0.1"),
            Value::from("10.0.0.2"),
        ],
    ));
    let pif_record = ok(call(&api, &session, "PIF.get_record", vec![pif.clone()]));
    let fields = pif_record.as_struct().unwrap();
    assert_eq!(fields["ip_configuration_mode"], Value::from("DHCP"));
    assert_eq!(fields["IP"], Value::from("10.0.0.5"));
    assert_eq!(fields["DNS"], Value::from("10.0.0.2"));

    ok(call(
        &api,
        &session,
        "PIF.reconfigure_ipv6",
        vec![
            pif.clone(),
            Value::from("Static"),
            Value::from("fd00::5/64"),
            Value::from("fd00::1"),
            Value::from(""),
        ],
    ));
    assert_eq!(
        ok(call(&api, &session, "PIF.get_IPv6", vec![pif.clone()])),
        Value::string_list(["fd00::5/64"])
    );
    assert_eq!(
        failure(call(&api, &session, "PIF.set_IP", vec![pif.clone(), Value::from("1.2.3.4")]))[0],
        "MESSAGE_METHOD_UNKNOWN"
    );

    let vlan = ok(call(
        &api,
        &session,
        "VLAN.create",
        vec![pif.clone(), Value::from("42"), network.clone()],
    ));
    let untagged = ok(call(&api, &session, "VLAN.get_untagged_PIF", vec![vlan.clone()]));
    assert_eq!(ok(call(&api, &session, "PIF.get_VLAN", vec![untagged.clone()])), Value::from("42"));
    assert_eq!(
        ok(call(&api, &session, "PIF.get_VLAN_master_of", vec![untagged.clone()])),
        vlan
    );
    assert!(contains(&ok(call(&api, &session, "PIF.get_VLAN_slave_of", vec![pif.clone()])), &vlan));
    assert!(contains(&ok(call(&api, &session, "host.get_PIFs", vec![host.clone()])), &untagged));
    assert!(contains(&ok(call(&api, &session, "network.get_PIFs", vec![network.clone()])), &untagged));

    ok(call(&api, &session, "VLAN.destroy", vec![vlan]));
    assert_eq!(failure(call(&api, &session, "PIF.get_VLAN", vec![untagged.clone()]))[0], "HANDLE_INVALID");
    assert!(!contains(&ok(call(&api, &session, "host.get_PIFs", vec![host.clone()])), &untagged));
    assert_eq!(
        ok(call(&api, &session, "PIF.get_VLAN_slave_of", vec![pif.clone()])),
        Value::empty_list()
    );

    let bond = ok(call(
        &api,
        &session,
        "Bond.create",
        vec![
            network.clone(),
            Value::Array(vec![pif.clone()]),
            Value::from(""),
            Value::from("active-backup"),
            Value::empty_map(),
        ],
    ));
    assert_eq!(ok(call(&api, &session, "PIF.get_bond_slave_of", vec![pif.clone()])), bond);
    assert_eq!(ok(call(&api, &session, "Bond.get_primary_slave", vec![bond.clone()])), pif);
    assert_eq!(ok(call(&api, &session, "Bond.get_links_up", vec![bond.clone()])), Value::from("1"));
    let master = ok(call(&api, &session, "Bond.get_master", vec![bond.clone()]));
    assert_eq!(
        ok(call(&api, &session, "PIF.get_bond_master_of", vec![master.clone()])),
        Value::Array(vec![bond.clone()])
    );
    ok(call(
        &api,
        &session,
        "Bond.set_property",
        vec![bond.clone(), Value::from("hashing_algorithm"), Value::from("tcpudp_ports")],
    ));
    assert_eq!(
        ok(call(&api, &session, "Bond.get_properties", vec![bond.clone()])),
        Value::string_map([("hashing_algorithm", "tcpudp_ports")])
    );

    ok(call(&api, &session, "Bond.destroy", vec![bond]));
    assert_eq!(
        ok(call(&api, &session, "PIF.get_bond_slave_of", vec![pif])),
        Value::from(NULL_REF)
    );
    assert_eq!(failure(call(&api, &session, "PIF.get_host", vec![master]))[0], "HANDLE_INVALID");

    assert_eq!(
        failure(call(
            &api,
            &session,
            "Bond.create",
            vec![network, Value::empty_list(), Value::from(""), Value::from("lacp"), Value::empty_map()],
        ))[0],
        "OPERATION_NOT_ALLOWED"
    );
}

#[test]
fn pif_introduce_and_forget() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");

    let pif = ok(call(
        &api,
        &session,
        "PIF.introduce",
        vec![host.clone(), Value::from("aa:bb:cc:00:00:01"), Value::from("eth1"), Value::Bool(true)],
    ));
    assert!(contains(&ok(call(&api, &session, "host.get_PIFs", vec![host.clone()])), &pif));
    assert_eq!(ok(call(&api, &session, "PIF.get_physical", vec![pif.clone()])), Value::Bool(true));

    ok(call(&api, &session, "PIF.forget", vec![pif.clone()]));
    assert!(!contains(&ok(call(&api, &session, "host.get_PIFs", vec![host])), &pif));
    assert_eq!(
        failure(call(&api, &session, "PIF.destroy", vec![pif])),
        vec!["NOT_IMPLEMENTED", "destroy"]
    );
}

#[test]
fn vif_lifecycle_follows_vm() {
    let api = api();
    let session = login(&api);
    let network = first_ref(&api, &session, "network");
    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("web-1")]));

    let vif = ok(call(
        &api,
        &session,
        "VIF.create",
        vec![record(vec![
            ("device", Value::from("0")),
            ("network", network.clone()),
            ("VM", vm.clone()),
            ("MAC", Value::from("")),
            ("MTU", Value::from("1500")),
            ("other_config", Value::empty_map()),
            ("qos_algorithm_type", Value::from("")),
            ("qos_algorithm_params", Value::empty_map()),
        ])],
    ));
    assert_eq!(
        ok(call(&api, &session, "VM.get_VIFs", vec![vm.clone()])),
        Value::Array(vec![vif.clone()])
    );
    assert!(contains(&ok(call(&api, &session, "network.get_VIFs", vec![network.clone()])), &vif));
    assert_eq!(
        ok(call(&api, &session, "VIF.get_MAC_autogenerated", vec![vif.clone()])),
        Value::Bool(true)
    );
    let free = ok(call(&api, &session, "VM.get_allowed_VIF_devices", vec![vm.clone()]));
    assert!(!contains(&free, &Value::from("0")));
    assert!(contains(&free, &Value::from("1")));

    ok(call(&api, &session, "VIF.plug", vec![vif.clone()]));
    assert_eq!(
        ok(call(&api, &session, "VIF.get_currently_attached", vec![vif.clone()])),
        Value::Bool(true)
    );

    ok(call(&api, &session, "VM.destroy", vec![vm]));
    assert_eq!(failure(call(&api, &session, "VIF.get_VM", vec![vif.clone()]))[0], "HANDLE_INVALID");
    assert!(!contains(&ok(call(&api, &session, "network.get_VIFs", vec![network])), &vif));
}

#[test]
fn appliance_starts_and_stops_members() {
    let api = api();
    let session = login(&api);

    let appliance = ok(call(
        &api,
        &session,
        "VM_appliance.create",
        vec![record(vec![("name_label", Value::from("web tier"))])],
    ));
    let web = ok(call(&api, &session, "VM.create", vec![vm_args("web")]));
    let db = ok(call(&api, &session, "VM.create", vec![vm_args("db")]));
    for vm in [&web, &db] {
        ok(call(&api, &session, "VM.set_appliance", vec![vm.clone(), appliance.clone()]));
    }
    assert_eq!(
        ok(call(&api, &session, "VM_appliance.get_VMs", vec![appliance.clone()])).as_array().unwrap().len(),
        2
    );

    ok(call(&api, &session, "VM_appliance.start", vec![appliance.clone(), Value::Bool(false)]));
    for vm in [&web, &db] {
        assert_eq!(
            ok(call(&api, &session, "VM.get_power_state", vec![vm.clone()])),
            Value::from("Running")
        );
    }

    ok(call(&api, &session, "VM.pause", vec![db.clone()]));
    ok(call(&api, &session, "VM_appliance.clean_shutdown", vec![appliance.clone()]));
    assert_eq!(ok(call(&api, &session, "VM.get_power_state", vec![web.clone()])), Value::from("Halted"));
    assert_eq!(ok(call(&api, &session, "VM.get_power_state", vec![db.clone()])), Value::from("Paused"));

    ok(call(&api, &session, "VM_appliance.hard_shutdown", vec![appliance.clone()]));
    assert_eq!(ok(call(&api, &session, "VM.get_power_state", vec![db.clone()])), Value::from("Halted"));

    ok(call(&api, &session, "VM.set_appliance", vec![web.clone(), Value::from(NULL_REF)]));
    assert_eq!(
        ok(call(&api, &session, "VM_appliance.get_VMs", vec![appliance.clone()])),
        Value::Array(vec![db.clone()])
    );

    ok(call(&api, &session, "VM_appliance.destroy", vec![appliance]));
    assert_eq!(ok(call(&api, &session, "VM.get_appliance", vec![db])), Value::from(NULL_REF));
    assert_eq!(
        failure(call(&api, &session, "VM_appliance.recover", vec![])),
        vec!["NOT_IMPLEMENTED", "recover"]
    );
}

#[test]
fn pool_eject_keeps_the_serving_host() {
    let api = api();
    let session = login(&api);
    let host = first_ref(&api, &session, "host");

    let description = failure(call(&api, &session, "pool.eject", vec![host.clone()]));
    assert_eq!(description[0], "OPERATION_NOT_ALLOWED");
    assert!(contains(&ok(call(&api, &session, "host.get_all", vec![])), &host));
}

#[test]
fn non_finite_double_setter_is_refused() {
    let api = api();
    let session = login(&api);
    let vm = ok(call(&api, &session, "VM.create", vec![vm_args("float")]));

    for d in [f64::NAN, f64::INFINITY] {
        assert_eq!(
            failure(call(&api, &session, "VM.set_HVM_shadow_multiplier", vec![vm.clone(), Value::Double(d)])),
            vec!["FIELD_TYPE_ERROR", "value"]
        );
    }
    ok(call(&api, &session, "VM.set_HVM_shadow_multiplier", vec![vm.clone(), Value::Double(2.0)]));
    assert_eq!(
        ok(call(&api, &session, "VM.get_HVM_shadow_multiplier", vec![vm])),
        Value::Double(2.0)
    );
}
