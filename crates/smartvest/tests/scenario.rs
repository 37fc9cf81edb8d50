//! End-to-end tests for the registration, link and backup workflows.
//!
//! These tests drive the public API against a real SQLite file.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;

use smartvest::config::RegistrationConfig;
use smartvest::link;
use smartvest::{
    render_csv, resolve_profile, BloodType, ExportOutcome, ProfileLookup, QrMode, RecordStore,
    RegistrationForm, SaveOutcome, TelemetryChannel, TelemetryUpdate, UserRecord,
};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("smartvest_it_{name}_{}", std::process::id()))
}

fn user(id: &str, full_name: &str) -> UserRecord {
    serde_json::from_value(json!({
        "id": id,
        "fullName": full_name,
        "nationalId": "1712345678",
        "age": 34,
        "bloodType": "O-",
        "address": "Av. Amazonas N34-120, Quito",
        "emergencyPhone": "0991234567",
        "emergencyContact": {
            "name": "María Pérez",
            "relationship": "Sister",
            "phone": "0991234567"
        },
        "medicalObservations": "None",
        "createdAt": "2026-03-01T10:15:00Z"
    }))
    .unwrap()
}

#[test]
fn test_register_then_find_by_id() {
    let path = temp_path("register.db");
    let _ = std::fs::remove_file(&path);
    let store = RecordStore::open(&path, "smartvest_users").unwrap();

    let record = RegistrationForm {
        full_name: "Ana Ruiz".to_string(),
        national_id: "1712345678".to_string(),
        age: "34".to_string(),
        blood_type: BloodType::ONegative,
        address: "Av. Amazonas N34-120, Quito".to_string(),
        emergency_phone: "0991234567".to_string(),
        contact_name: "María Pérez".to_string(),
        contact_relationship: "Sister".to_string(),
        username: "ana".to_string(),
        password: "s3cret".to_string(),
        ..RegistrationForm::default()
    }
    .into_record(&RegistrationConfig {
        password_cost: 4,
        ..RegistrationConfig::default()
    })
    .unwrap();

    assert_eq!(store.save_user(&record).unwrap(), SaveOutcome::Inserted);
    drop(store);

    let reopened = RecordStore::open(&path, "smartvest_users").unwrap();
    assert_eq!(reopened.get_user_by_id(&record.id).unwrap(), Some(record.clone()));
    assert!(reopened.authenticate("ana", "s3cret").unwrap().is_some());
    assert!(reopened.authenticate("ana", "wrong").unwrap().is_none());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_save_replaces_in_place() {
    let store = RecordStore::open_in_memory().unwrap();
    store.save_user(&user("u1", "Ana Ruiz")).unwrap();
    store.save_user(&user("u2", "José Núñez")).unwrap();

    let mut changed = user("u1", "Ana María Ruiz");
    changed.age = 35;
    assert_eq!(store.save_user(&changed).unwrap(), SaveOutcome::Replaced);

    let users = store.get_users().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0], changed);
    assert_eq!(users[1].id, "u2");
}

#[test]
fn test_portable_link_opens_on_another_device() {
    let record = user("u1", "Ana Ruiz");
    let url = link::portable_url("https://smartvest.app/profile", &record).unwrap();

    let other_device = RecordStore::open_in_memory().unwrap();
    let lookup = resolve_profile(&url, &other_device).unwrap();

    assert!(matches!(lookup, ProfileLookup::Portable(ref r) if *r == record));
    assert_eq!(other_device.get_user_by_id("u1").unwrap(), Some(record));

    let local = resolve_profile(&link::local_url("https://smartvest.app/profile", "u1"), &other_device)
        .unwrap();
    assert!(matches!(local, ProfileLookup::Local(_)));
}

#[test]
fn test_unknown_and_damaged_links() {
    let store = RecordStore::open_in_memory().unwrap();

    let missing = resolve_profile("https://smartvest.app/profile?uid=nope", &store).unwrap();
    assert!(matches!(missing, ProfileLookup::NotOnDevice(ref id) if id == "nope"));
    assert!(missing.message().is_some());

    let damaged = resolve_profile("https://smartvest.app/profile?data=%%%%", &store).unwrap();
    assert!(matches!(damaged, ProfileLookup::Corrupted(_)));

    let empty = resolve_profile("https://smartvest.app/profile", &store).unwrap();
    assert!(matches!(empty, ProfileLookup::NoData));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_qr_payloads() {
    let record = user("u1", "Ana Ruiz");

    let card = smartvest::qr_payload(&record, QrMode::Text, "https://smartvest.app/profile").unwrap();
    assert!(card.contains("PATIENT: Ana Ruiz"));
    assert!(card.contains("BLOOD: O-"));

    let url = smartvest::qr_payload(&record, QrMode::Link, "https://smartvest.app/profile").unwrap();
    assert!(url.starts_with("https://smartvest.app/profile?data="));
}

#[test]
fn test_csv_row_shape() {
    let csv = render_csv(&[user("u1", "Ana Ruiz")]);
    let row = csv.lines().nth(1).unwrap();
    assert!(row.starts_with("u1,\"Ana Ruiz\","));
}

#[test]
fn test_import_merges_with_local_records() {
    let store = RecordStore::open_in_memory().unwrap();
    store.save_user(&user("A", "Alice")).unwrap();
    store.save_user(&user("B", "Bruno")).unwrap();

    let backup = serde_json::to_string(&vec![user("A", "Alice Modified"), user("C", "Carla")]).unwrap();
    let report = store.import_json(&backup).unwrap();

    assert!(report.success);
    assert_eq!(report.count, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.message, "Import successful. 1 new users added.");

    let users = store.get_users().unwrap();
    let names: Vec<(&str, &str)> = users
        .iter()
        .map(|u| (u.id.as_str(), u.full_name.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![("A", "Alice Modified"), ("B", "Bruno"), ("C", "Carla")]
    );
}

#[test]
fn test_import_rejects_non_list() {
    let store = RecordStore::open_in_memory().unwrap();
    store.save_user(&user("A", "Alice")).unwrap();

    let report = store.import_json(r#"{"id": "X"}"#).unwrap();
    assert!(!report.success);
    assert_eq!(store.get_users().unwrap().len(), 1);
}

#[test]
fn test_backup_round_trip_through_files() {
    let store = RecordStore::open_in_memory().unwrap();
    let dir = temp_path("backup");

    assert!(matches!(store.export_csv(&dir).unwrap(), ExportOutcome::Empty(_)));

    store.save_user(&user("u1", "Ana Ruiz")).unwrap();
    let ExportOutcome::Written(file) = store.export_json(&dir).unwrap() else {
        panic!("expected a backup file");
    };

    let restored = RecordStore::open_in_memory().unwrap();
    let report = restored
        .import_json(&std::fs::read_to_string(&file).unwrap())
        .unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(restored.get_users().unwrap(), store.get_users().unwrap());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_telemetry_subscribers_follow_updates() {
    let channel = TelemetryChannel::from_config(&smartvest::config::TelemetryConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let subscription = channel.subscribe("VEST-DEMO", move |state| {
        sink.lock().unwrap().push(state.sos_active);
    });
    channel.publish_update(TelemetryUpdate {
        sos_active: Some(true),
        ..TelemetryUpdate::default()
    });
    assert!(subscription.unsubscribe());
    channel.simulate_sos(false);

    assert_eq!(*seen.lock().unwrap(), vec![false, true]);
}
