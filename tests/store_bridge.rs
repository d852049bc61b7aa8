//! Settings persistence and the connection/store round trip.

mod common;

use common::Harness;
use pretty_assertions::assert_eq;
use serial_test::serial;
use serialbowl::config::ConfigLoader;
use serialbowl::{
    ConfigBridge, ConfigStore, ConfigValue, FileStore, LinkState, MemoryStore, Parameter, Parity,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn test_connection_changes_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("serialbowl.toml");
    let store = Arc::new(FileStore::open(&path).unwrap());

    let mut h = Harness::new(&["devA"], "devA");
    ConfigBridge::attach(&mut h.conn, store.clone());

    h.conn.set_baud_rate(115200).unwrap();
    h.conn.set_parity(Parity::Even);
    h.conn.set_reconnect_automatically(false);

    assert_eq!(store.get("baud-rate"), Some(ConfigValue::Int(115200)));
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("baud_rate = 115200"));
    assert!(content.contains("parity = \"even\""));
    assert!(content.contains("reconnect_automatically = false"));
}

#[test]
fn test_store_changes_reach_connection() {
    let store = Arc::new(MemoryStore::new());
    let mut h = Harness::new(&["devA", "devB"], "devA");
    ConfigBridge::attach(&mut h.conn, store.clone());
    h.conn.open().unwrap();

    store.set("port", "devB".into()).unwrap();
    h.drive_until("port switch", |h| h.conn.parameters().port == "devB");

    assert_eq!(h.conn.state(), LinkState::Open);
    assert_eq!(h.transport.open_calls().last().unwrap().port, "devB");
}

#[test]
fn test_echo_settles_after_one_hop() {
    let store = Arc::new(MemoryStore::new());
    let mut h = Harness::new(&["devA"], "devA");
    ConfigBridge::attach(&mut h.conn, store.clone());
    h.clear();

    h.conn.set_data_bits(7).unwrap();
    h.drive_for(Duration::from_millis(100));

    let changes: Vec<_> = h
        .notifications()
        .into_iter()
        .filter(|n| matches!(n, serialbowl::Notification::ParameterChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![serialbowl::Notification::ParameterChanged {
            field: Parameter::DataBits,
            value: ConfigValue::Int(7),
        }]
    );
}

#[test]
fn test_repeated_change_while_open_settles() {
    let store = Arc::new(MemoryStore::new());
    let mut h = Harness::new(&["devA"], "devA");
    ConfigBridge::attach(&mut h.conn, store.clone());
    h.conn.open().unwrap();
    h.clear();

    h.conn.set_baud_rate(19200).unwrap();
    h.conn.set_baud_rate(38400).unwrap();
    h.drive_for(Duration::from_millis(300));

    let baud_changes = h
        .notifications()
        .into_iter()
        .filter(|n| {
            matches!(
                n,
                serialbowl::Notification::ParameterChanged {
                    field: Parameter::BaudRate,
                    ..
                }
            )
        })
        .count();
    assert_eq!(baud_changes, 2);
    assert_eq!(h.transport.open_count(), 3);
    assert_eq!(h.conn.parameters().baud_rate, 38400);
    assert_eq!(store.get("baud-rate"), Some(ConfigValue::Int(38400)));
    assert_eq!(h.conn.state(), LinkState::Open);
}

#[test]
#[serial]
fn test_reload_applies_external_edit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("serialbowl.toml");
    let store = Arc::new(FileStore::open(&path).unwrap());
    store.set("baud-rate", ConfigValue::Int(19200)).unwrap();

    let mut h = Harness::new(&["devA"], "devA");
    ConfigBridge::attach(&mut h.conn, store.clone());

    let edited = std::fs::read_to_string(&path)
        .unwrap()
        .replace("stop_bits = 1", "stop_bits = 2");
    std::fs::write(&path, edited).unwrap();
    store.reload().unwrap();

    h.drive_until("stop bits applied", |h| h.conn.parameters().stop_bits.bits() == 2);
}

#[test]
#[serial]
fn test_env_override_seeds_connection() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("SERIALBOWL_PORT", "devB");
    let loader = ConfigLoader::load_from(dir.path().join("serialbowl.toml"));
    std::env::remove_var("SERIALBOWL_PORT");

    let store = Arc::new(FileStore::from_loader(loader.unwrap()).unwrap());
    let mut h = Harness::new(&["devA", "devB"], "");
    ConfigBridge::attach(&mut h.conn, store);

    assert_eq!(h.conn.parameters().port, "devB");
}
