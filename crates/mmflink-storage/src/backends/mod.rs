//! Storage backend implementations, feature-gated.

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redb")]
pub use redb::{RedbBackend, RedbBackendConfig};

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;
