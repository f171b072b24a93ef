//! Settings Persistence Tests
//!
//! Exercises the redb-backed settings across reopen:
//! - Registration survives a restart
//! - Reset clears identity fields
//! - Supported-printer catalog storage

use mmflink_core::catalog::{manufacturers, SupportedPrinter};
use mmflink_storage::{RedbBackend, RedbBackendConfig, Registration, Settings, StorageBackend};
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Settings {
    Settings::open(dir.path().join("data").join("settings.redb")).unwrap()
}

#[test]
fn test_registration_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let settings = open(&dir);
        assert!(settings.is_persistent());
        settings.ensure_serial(|| "SERIAL-1".into()).unwrap();
        settings
            .set_registration(&Registration {
                token: "tok-1".into(),
                manufacturer: "Anet".into(),
                model: "anet-a8".into(),
            })
            .unwrap();
        settings.migrate().unwrap();
    }

    let settings = open(&dir);
    let identity = settings.identity().unwrap();
    assert!(identity.is_registered());
    assert_eq!(identity.token, "tok-1");
    assert_eq!(identity.serial_number, "SERIAL-1");
    assert_eq!(identity.command_topic().as_deref(), Some("/printers/tok-1"));
    assert!(!settings.migrate().unwrap());
}

#[test]
fn test_clear_registration_twice() {
    let dir = TempDir::new().unwrap();
    let settings = open(&dir);
    settings
        .set_registration(&Registration {
            token: "tok".into(),
            manufacturer: "Prusa".into(),
            model: "mini".into(),
        })
        .unwrap();

    settings.clear_registration().unwrap();
    settings.clear_registration().unwrap();

    let identity = settings.identity().unwrap();
    assert!(!identity.registered);
    assert!(identity.token.is_empty());
    assert!(identity.serial_number.is_empty());
}

#[test]
fn test_supported_printers_stored() {
    let dir = TempDir::new().unwrap();
    let settings = open(&dir);
    let printers = vec![
        SupportedPrinter::new("Prusa", "mk3"),
        SupportedPrinter::new("Anet", "anet-a8"),
    ];
    settings.set_supported_printers(&printers).unwrap();

    let stored = open(&dir).supported_printers().unwrap();
    assert_eq!(stored, printers);
    assert_eq!(manufacturers(&stored), vec!["Anet", "Prusa"]);
}

#[test]
fn test_settings_over_in_memory_redb() {
    let backend = RedbBackend::new(RedbBackendConfig::memory()).unwrap();
    assert!(!backend.is_persistent());

    let settings = Settings::new(Arc::new(backend));
    assert!(!settings.is_persistent());
    assert!(!settings.is_registered().unwrap());

    settings.set_auto_start_print(false).unwrap();
    assert!(!settings.auto_start_print().unwrap());
}
