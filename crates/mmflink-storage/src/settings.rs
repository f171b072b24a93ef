//! Persisted bridge settings.
//!
//! A typed facade over a [`StorageBackend`]. Every value is stored as JSON
//! under the `settings` table, so the store stays readable with any backend.

use mmflink_core::catalog::SupportedPrinter;
use mmflink_core::config::{self, defaults};
use mmflink_core::identity::{ClientCredentials, DeviceIdentity};
use mmflink_core::storage::{Result, StorageBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

#[cfg(feature = "memory")]
use crate::backends::MemoryBackend;
#[cfg(feature = "redb")]
use crate::backends::RedbBackend;

/// Table holding all settings.
pub const SETTINGS_TABLE: &str = "settings";

/// Setting keys.
pub mod keys {
    pub const SUPPORTED_PRINTERS: &str = "supported_printers";
    pub const MANUFACTURER: &str = "printer_manufacturer";
    pub const MODEL: &str = "printer_model";
    pub const SERIAL_NUMBER: &str = "printer_serial_number";
    pub const FIRMWARE_VERSION: &str = "printer_firmware_version";
    pub const REGISTERED: &str = "registration_complete";
    pub const TOKEN: &str = "printer_token";
    pub const CLIENT_NAME: &str = "client_name";
    pub const CLIENT_KEY: &str = "client_key";
    pub const AUTO_START_PRINT: &str = "auto_start_print";
    pub const VERSION: &str = "settings_version";
}

/// Values returned for keys that were never written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDefaults {
    pub manufacturer: String,
    pub model: String,
    pub client_name: String,
    pub client_key: String,
    pub auto_start_print: bool,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            manufacturer: defaults::MANUFACTURER.to_string(),
            model: defaults::MODEL.to_string(),
            client_name: defaults::CLIENT_NAME.to_string(),
            client_key: String::new(),
            auto_start_print: defaults::AUTO_START_PRINT,
        }
    }
}

impl SettingsDefaults {
    /// Defaults with the client key taken from `MMFLINK_CLIENT_KEY`.
    pub fn from_env() -> Self {
        let mut defaults = Self::default();
        if let Some(key) = config::client_key_from_env() {
            defaults.client_key = key;
        }
        defaults
    }
}

/// What a successful registration writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub token: String,
    pub manufacturer: String,
    pub model: String,
}

/// Typed access to persisted settings.
#[derive(Clone)]
pub struct Settings {
    backend: Arc<dyn StorageBackend>,
    defaults: SettingsDefaults,
}

impl Settings {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_defaults(backend, SettingsDefaults::default())
    }

    pub fn with_defaults(backend: Arc<dyn StorageBackend>, defaults: SettingsDefaults) -> Self {
        Self { backend, defaults }
    }

    /// Settings in a redb file at `path`.
    #[cfg(feature = "redb")]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let backend = RedbBackend::open(path)?;
        Ok(Self::with_defaults(Arc::new(backend), SettingsDefaults::from_env()))
    }

    /// Settings that live only as long as this value.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    pub fn defaults(&self) -> &SettingsDefaults {
        &self.defaults
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    /// Read and decode a raw value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.read(SETTINGS_TABLE, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a raw value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.write(SETTINGS_TABLE, key, &bytes)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.backend.delete(SETTINGS_TABLE, key)
    }

    fn string_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get::<String>(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn manufacturer(&self) -> Result<String> {
        self.string_or(keys::MANUFACTURER, &self.defaults.manufacturer)
    }

    pub fn model(&self) -> Result<String> {
        self.string_or(keys::MODEL, &self.defaults.model)
    }

    pub fn serial_number(&self) -> Result<String> {
        self.string_or(keys::SERIAL_NUMBER, "")
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.string_or(keys::FIRMWARE_VERSION, "")
    }

    pub fn set_firmware_version(&self, version: &str) -> Result<()> {
        self.set(keys::FIRMWARE_VERSION, version)
    }

    pub fn token(&self) -> Result<String> {
        self.string_or(keys::TOKEN, "")
    }

    pub fn is_registered(&self) -> Result<bool> {
        Ok(self.get::<bool>(keys::REGISTERED)?.unwrap_or(false))
    }

    pub fn auto_start_print(&self) -> Result<bool> {
        Ok(self
            .get::<bool>(keys::AUTO_START_PRINT)?
            .unwrap_or(self.defaults.auto_start_print))
    }

    pub fn set_auto_start_print(&self, enabled: bool) -> Result<()> {
        self.set(keys::AUTO_START_PRINT, &enabled)
    }

    pub fn credentials(&self) -> Result<ClientCredentials> {
        Ok(ClientCredentials {
            client_name: self.string_or(keys::CLIENT_NAME, &self.defaults.client_name)?,
            client_key: self.string_or(keys::CLIENT_KEY, &self.defaults.client_key)?,
        })
    }

    pub fn set_credentials(&self, credentials: &ClientCredentials) -> Result<()> {
        self.backend.write_batch(
            SETTINGS_TABLE,
            vec![
                (
                    keys::CLIENT_NAME.to_string(),
                    serde_json::to_vec(&credentials.client_name)?,
                ),
                (
                    keys::CLIENT_KEY.to_string(),
                    serde_json::to_vec(&credentials.client_key)?,
                ),
            ],
        )
    }

    pub fn supported_printers(&self) -> Result<Vec<SupportedPrinter>> {
        Ok(self.get(keys::SUPPORTED_PRINTERS)?.unwrap_or_default())
    }

    pub fn set_supported_printers(&self, printers: &[SupportedPrinter]) -> Result<()> {
        self.set(keys::SUPPORTED_PRINTERS, printers)
    }

    /// Snapshot of everything that identifies this device.
    pub fn identity(&self) -> Result<DeviceIdentity> {
        Ok(DeviceIdentity {
            manufacturer: self.manufacturer()?,
            model: self.model()?,
            firmware_version: self.firmware_version()?,
            serial_number: self.serial_number()?,
            token: self.token()?,
            registered: self.is_registered()?,
            credentials: self.credentials()?,
        })
    }

    /// Return the serial number, creating and storing one on first use.
    pub fn ensure_serial(&self, generate: impl FnOnce() -> String) -> Result<String> {
        let current = self.serial_number()?;
        if !current.is_empty() {
            return Ok(current);
        }
        let serial = generate();
        self.set(keys::SERIAL_NUMBER, &serial)?;
        tracing::debug!(serial = %serial, "created serial number");
        Ok(serial)
    }

    /// Persist a completed registration in one batch.
    pub fn set_registration(&self, registration: &Registration) -> Result<()> {
        self.backend.write_batch(
            SETTINGS_TABLE,
            vec![
                (keys::TOKEN.to_string(), serde_json::to_vec(&registration.token)?),
                (
                    keys::MANUFACTURER.to_string(),
                    serde_json::to_vec(&registration.manufacturer)?,
                ),
                (keys::MODEL.to_string(), serde_json::to_vec(&registration.model)?),
                (keys::REGISTERED.to_string(), serde_json::to_vec(&true)?),
            ],
        )
    }

    /// Clear serial number, token and the registration flag.
    pub fn clear_registration(&self) -> Result<()> {
        self.backend.write_batch(
            SETTINGS_TABLE,
            vec![
                (keys::SERIAL_NUMBER.to_string(), serde_json::to_vec("")?),
                (keys::TOKEN.to_string(), serde_json::to_vec("")?),
                (keys::REGISTERED.to_string(), serde_json::to_vec(&false)?),
            ],
        )
    }

    /// Stored layout version, `0` for a store that predates versioning.
    pub fn version(&self) -> Result<u32> {
        Ok(self.get(keys::VERSION)?.unwrap_or(0))
    }

    /// Bring the store up to the current layout version.
    ///
    /// Returns whether anything was written. Running it again is a no-op.
    pub fn migrate(&self) -> Result<bool> {
        let current = self.version()?;
        if current >= defaults::SETTINGS_VERSION {
            return Ok(false);
        }
        // Version 1 introduced the version key itself; values are unchanged.
        self.set(keys::VERSION, &defaults::SETTINGS_VERSION)?;
        tracing::info!(
            from = current,
            to = defaults::SETTINGS_VERSION,
            "settings migrated"
        );
        Ok(true)
    }
}
