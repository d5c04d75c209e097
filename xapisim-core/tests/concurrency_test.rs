//! Sessions and records under concurrent callers and the expiry sweep.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use xapisim_core::{spawn_expiry_sweep, Envelope, Record, SimulatorSettings, Value, XenApi, NULL_REF};

fn api() -> XenApi {
    XenApi::new(&SimulatorSettings::default()).unwrap()
}

fn login(api: &XenApi) -> Value {
    api.dispatch(
        "session.login_with_password",
        &[Value::from("root"), Value::from("xenserver")],
    )
    .into_value()
    .expect("login should succeed")
}

fn call(api: &XenApi, session: &Value, method: &str, args: Vec<Value>) -> Envelope {
    let mut params = vec![session.clone()];
    params.extend(args);
    api.dispatch(method, &params)
}

/// `Some(true)` on success, `Some(false)` on `SESSION_INVALID`.
fn session_alive(envelope: Envelope) -> Option<bool> {
    match envelope {
        Envelope::Success { .. } => Some(true),
        Envelope::Failure { error_description } if error_description[0] == "SESSION_INVALID" => {
            Some(false)
        }
        Envelope::Failure { .. } => None,
    }
}

fn backdate(api: &XenApi, session: &Value) {
    api.require_class("session")
        .unwrap()
        .update(session.as_str().unwrap(), |record| {
            record.insert("last_active".into(), Value::epoch());
            Ok(())
        })
        .unwrap();
}

fn vm_args(name: &str) -> Value {
    let entries: Vec<(&str, Value)> = vec![
        ("name_label", Value::from(name)),
        ("user_version", Value::from("1")),
        ("is_a_template", Value::Bool(false)),
        ("affinity", Value::from(NULL_REF)),
        ("memory_static_max", Value::from("1073741824")),
        ("memory_dynamic_max", Value::from("1073741824")),
        ("memory_dynamic_min", Value::from("536870912")),
        ("memory_static_min", Value::from("536870912")),
        ("VCPUs_params", Value::empty_map()),
        ("VCPUs_max", Value::from("1")),
        ("VCPUs_at_startup", Value::from("1")),
        ("actions_after_shutdown", Value::from("destroy")),
        ("actions_after_reboot", Value::from("restart")),
        ("actions_after_crash", Value::from("restart")),
        ("PV_bootloader", Value::from("")),
        ("PV_kernel", Value::from("")),
        ("PV_ramdisk", Value::from("")),
        ("PV_args", Value::from("")),
        ("PV_bootloader_args", Value::from("")),
        ("PV_legacy_args", Value::from("")),
        ("HVM_boot_policy", Value::from("BIOS order")),
        ("HVM_boot_params", Value::empty_map()),
        ("platform", Value::empty_map()),
        ("PCI_bus", Value::from("")),
        ("other_config", Value::empty_map()),
        ("recommendations", Value::from("")),
    ];
    Value::Struct(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<Record>())
}

#[tokio::test]
async fn spawned_sweep_expires_idle_sessions() {
    let api = api();
    let idle = login(&api);
    let busy = login(&api);
    backdate(&api, &idle);

    let api = Arc::new(api);
    let sweep = spawn_expiry_sweep(api.clone(), Duration::from_millis(10));

    let mut expired = false;
    for _ in 0..100 {
        let reply = call(&api, &idle, "host.get_all", vec![]);
        match session_alive(reply) {
            Some(true) => tokio::time::sleep(Duration::from_millis(10)).await,
            Some(false) => {
                expired = true;
                break;
            }
            None => panic!("unexpected failure while waiting for the sweep"),
        }
    }
    sweep.abort();

    assert!(expired, "idle session outlived the sweep");
    assert_eq!(
        call(&api, &idle, "host.get_all", vec![]),
        Envelope::Failure {
            error_description: vec!["SESSION_INVALID".to_string(), idle.as_str().unwrap().to_string()],
        }
    );
    assert!(call(&api, &busy, "host.get_all", vec![]).is_success());
}

#[test]
fn concurrent_create_and_destroy_with_sweeps() {
    const WORKERS: usize = 8;
    const ROUNDS: usize = 25;

    let api = api();
    let done = AtomicBool::new(false);

    let created: Vec<String> = thread::scope(|scope| {
        let sweeper = scope.spawn(|| {
            let mut passes = 0;
            while !done.load(Ordering::Acquire) {
                let expired = api.expire_sessions(Utc::now()).unwrap();
                assert!(expired.is_empty(), "active session expired: {:?}", expired);
                passes += 1;
            }
            passes
        });

        let workers: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let api = &api;
                scope.spawn(move || {
                    let session = login(api);
                    let mut refs = Vec::with_capacity(ROUNDS);
                    for round in 0..ROUNDS {
                        let name = format!("vm-{}-{}", worker, round);
                        let vm = call(api, &session, "VM.create", vec![vm_args(&name)])
                            .into_value()
                            .expect("VM.create should succeed");
                        assert!(call(api, &session, "VM.destroy", vec![vm.clone()]).is_success());
                        refs.push(vm.as_str().unwrap().to_string());
                    }
                    refs
                })
            })
            .collect();

        let created: Vec<String> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        done.store(true, Ordering::Release);
        assert!(sweeper.join().unwrap() > 0);
        created
    });

    let distinct: BTreeSet<&String> = created.iter().collect();
    assert_eq!(created.len(), WORKERS * ROUNDS);
    assert_eq!(distinct.len(), created.len());

    // Only dom0 is left, and every worker session survived the sweeps.
    let session = login(&api);
    let vms = call(&api, &session, "VM.get_all", vec![]).into_value().unwrap();
    assert_eq!(vms.as_array().unwrap().len(), 1);
    let sessions = call(&api, &session, "session.get_all", vec![]).into_value().unwrap();
    assert_eq!(sessions.as_array().unwrap().len(), WORKERS + 1);
}

#[test]
fn refresh_racing_the_sweep() {
    let api = api();
    let session = login(&api);
    let calls = AtomicUsize::new(0);

    let (seen, expired) = thread::scope(|scope| {
        let refresher = scope.spawn(|| {
            let mut seen = Vec::new();
            for _ in 0..500 {
                let alive = session_alive(call(&api, &session, "host.get_all", vec![]))
                    .expect("only success or SESSION_INVALID while racing the sweep");
                seen.push(alive);
                calls.fetch_add(1, Ordering::Release);
            }
            seen
        });

        let sweeper = scope.spawn(|| {
            while calls.load(Ordering::Acquire) < 50 {
                thread::yield_now();
            }
            // Far enough ahead that any refresh is already stale.
            api.expire_sessions(Utc::now() + chrono::Duration::hours(25)).unwrap()
        });

        (refresher.join().unwrap(), sweeper.join().unwrap())
    });

    assert_eq!(expired, vec![session.as_str().unwrap().to_string()]);
    assert!(seen.iter().take(50).all(|alive| *alive));
    // Once expired, a session never comes back.
    let first_invalid = seen.iter().position(|alive| !alive).unwrap_or(seen.len());
    assert!(seen[first_invalid..].iter().all(|alive| !alive));
    assert_eq!(
        session_alive(call(&api, &session, "host.get_all", vec![])),
        Some(false)
    );
    assert!(call(&api, &login(&api), "host.get_all", vec![]).is_success());
}
