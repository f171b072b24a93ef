//! Storage for mmflink.
//!
//! Key-value backends (redb, in-memory) and the typed [`Settings`] facade
//! holding device identity, credentials and preferences.

pub mod backends;
pub mod settings;

#[cfg(feature = "memory")]
pub use backends::MemoryBackend;
#[cfg(feature = "redb")]
pub use backends::{RedbBackend, RedbBackendConfig};
pub use settings::{keys, Registration, Settings, SettingsDefaults, SETTINGS_TABLE};

pub use mmflink_core::storage::{Result, StorageBackend, StorageError};
