use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

use super::*;
use crate::test_utils::register_int_config;
use crate::test_utils::register_int_stat;
use crate::test_utils::standalone;

fn counting_callback(
    registry: &Registry,
    name: &str,
) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    registry
        .register_update_callback(name, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    calls
}

#[test]
fn callbacks_fire_once_per_scope() {
    let registry = standalone();
    register_int_config(&registry, "proxy.config.a", 1);
    let calls = counting_callback(&registry, "proxy.config.a");

    // nothing pending after registration
    assert_eq!(registry.exec_config_update_callbacks(UpdateScope::PROCESS), UpdateType::None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    registry.set_int("proxy.config.a", 2).unwrap();
    registry.exec_config_update_callbacks(UpdateScope::PROCESS);
    registry.exec_config_update_callbacks(UpdateScope::PROCESS);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    registry.exec_config_update_callbacks(UpdateScope::MANAGER);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    registry.exec_config_update_callbacks(UpdateScope::all());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn callbacks_see_name_and_new_value() {
    let registry = standalone();
    register_int_config(&registry, "proxy.config.a", 1);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry
        .register_update_callback("proxy.config.a", move |name, value| {
            sink.lock().push((name.to_string(), value.clone()));
        })
        .unwrap();

    registry.set_int("proxy.config.a", 5).unwrap();
    registry.exec_config_update_callbacks(UpdateScope::PROCESS);

    assert_eq!(
        *seen.lock(),
        vec![("proxy.config.a".to_string(), RecordValue::Int(5))]
    );
}

#[test]
fn sweep_reports_most_severe_update_type() {
    let registry = standalone();
    for (name, update_type) in [
        ("proxy.config.dynamic", UpdateType::Dynamic),
        ("proxy.config.restart", UpdateType::RestartComponent),
        ("proxy.config.quiet", UpdateType::RestartAll),
    ] {
        registry
            .register_config(
                RecordCategory::Config,
                name,
                RecordValue::Int(0),
                ConfigSpec {
                    update_type,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    registry.set_int("proxy.config.dynamic", 1).unwrap();
    registry.set_int("proxy.config.restart", 1).unwrap();

    assert_eq!(
        registry.exec_config_update_callbacks(UpdateScope::PROCESS),
        UpdateType::RestartComponent
    );
    assert_eq!(registry.exec_config_update_callbacks(UpdateScope::PROCESS), UpdateType::None);
}

#[test]
fn callbacks_survive_reregistration() {
    let registry = standalone();
    register_int_config(&registry, "proxy.config.a", 1);
    let calls = counting_callback(&registry, "proxy.config.a");

    register_int_config(&registry, "proxy.config.a", 3);
    registry.set_int("proxy.config.a", 4).unwrap();
    registry.exec_config_update_callbacks(UpdateScope::PROCESS);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn callbacks_only_attach_to_config_records() {
    let registry = standalone();
    register_int_stat(&registry, RecordCategory::ProcessStat, "s", PersistType::Persistent);

    assert!(matches!(
        registry.register_update_callback("s", |_, _| {}),
        Err(Error::Registry(RegistryError::NotConfigRecord(_)))
    ));
    assert!(matches!(
        registry.register_update_callback("missing", |_, _| {}),
        Err(Error::Registry(RegistryError::NotFound(_)))
    ));
}

#[test]
fn linked_integer_tracks_record() {
    let registry = standalone();
    register_int_config(&registry, "proxy.config.net.connections", 1024);

    let cell = Arc::new(AtomicI64::new(0));
    registry
        .link_int("proxy.config.net.connections", cell.clone())
        .unwrap();
    assert_eq!(cell.load(Ordering::Acquire), 1024);

    registry.set_int("proxy.config.net.connections", 2048).unwrap();
    // applied by the sweep, not by the set
    assert_eq!(cell.load(Ordering::Acquire), 1024);
    registry.exec_config_update_callbacks(UpdateScope::PROCESS);
    assert_eq!(cell.load(Ordering::Acquire), 2048);
}

#[test]
fn linked_counter_float_and_string() {
    let registry = standalone();
    registry
        .register_config(
            RecordCategory::Config,
            "c.counter",
            RecordValue::Counter(1),
            ConfigSpec::default(),
        )
        .unwrap();
    registry
        .register_config(RecordCategory::Config, "c.float", RecordValue::Float(0.5), ConfigSpec::default())
        .unwrap();
    registry
        .register_config(
            RecordCategory::Config,
            "c.string",
            RecordValue::string("a"),
            ConfigSpec::default(),
        )
        .unwrap();

    let counter = Arc::new(AtomicI64::new(0));
    let float = Arc::new(RwLock::new(0.0));
    let string = Arc::new(RwLock::new(None));
    registry.link_counter("c.counter", counter.clone()).unwrap();
    registry.link_float("c.float", float.clone()).unwrap();
    registry.link_string("c.string", string.clone()).unwrap();
    assert_eq!(*float.read(), 0.5);
    assert_eq!(string.read().as_deref(), Some("a"));

    registry.set_counter("c.counter", 9).unwrap();
    registry.set_float("c.float", 2.25).unwrap();
    registry.set_string("c.string", None).unwrap();
    registry.exec_config_update_callbacks(UpdateScope::all());

    assert_eq!(counter.load(Ordering::Acquire), 9);
    assert_eq!(*float.read(), 2.25);
    assert_eq!(*string.read(), None);
}

#[test]
fn link_rejects_mismatched_type() {
    let registry = standalone();
    register_int_config(&registry, "proxy.config.a", 1);

    let err = registry
        .link_float("proxy.config.a", Arc::new(RwLock::new(0.0)))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::TypeMismatch {
            expected: DataType::Float,
            actual: DataType::Int,
            ..
        })
    ));
}
