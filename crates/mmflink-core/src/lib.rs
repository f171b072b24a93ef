//! Core types for mmflink.
//!
//! Action codes and the device state machine, device identity, telemetry,
//! broker wire messages, host events, and the traits the bridge uses to talk
//! to storage and to the local printer.

pub mod action;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod identity;
pub mod logging;
pub mod message;
pub mod printer;
pub mod storage;
pub mod telemetry;

pub use action::{ActionState, InboundAction, PrintEvent, TaskUpdate, Transition};
pub use catalog::SupportedPrinter;
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use event::{EventMetadata, HostEvent};
pub use eventbus::{EventBus, EventBusReceiver, FilteredReceiver, DEFAULT_CHANNEL_CAPACITY};
pub use identity::{ClientCredentials, DeviceIdentity};
pub use message::{DecodeError, InboundCommand, PrintJob, StatusMessage, STATUS_REPORT_CODE};
pub use printer::{AnalysisQueue, LocalPrinter, PrinterError, QueueEntry};
pub use storage::{StorageBackend, StorageError};
pub use telemetry::{JobProgress, TemperatureSample, Temperatures};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::action::{ActionState, InboundAction, PrintEvent, Transition};
    pub use crate::config::{endpoints, env_vars, topics, BridgeConfig};
    pub use crate::error::{Error, Result};
    pub use crate::event::HostEvent;
    pub use crate::eventbus::EventBus;
    pub use crate::identity::DeviceIdentity;
    pub use crate::printer::{AnalysisQueue, LocalPrinter};
    pub use crate::storage::{StorageBackend, StorageError};
}
