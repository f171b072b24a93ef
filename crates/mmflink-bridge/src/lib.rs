//! Bridge between a local 3D printer and the MyMiniFactory print service.
//!
//! A [`BridgeSession`] keeps one MQTT session with the service broker. It
//! subscribes to the device's command topic, applies inbound commands to the
//! device state and the local printer, downloads print artifacts, and
//! publishes periodic status reports.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mmflink_bridge::BridgeSession;
//! use mmflink_core::{AnalysisQueue, BridgeConfig, LocalPrinter};
//! use mmflink_storage::Settings;
//!
//! # async fn run(printer: Arc<dyn LocalPrinter>, queue: Arc<dyn AnalysisQueue>) -> anyhow::Result<()> {
//! mmflink_core::logging::init();
//! let settings = Settings::open("./data/mmflink.redb")?;
//! let session = BridgeSession::builder(settings, printer, queue)
//!     .config(BridgeConfig::from_env())
//!     .build()?;
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod artifact;
pub mod error;
pub mod registration;
pub mod reporter;
pub mod router;
pub mod session;
pub mod state;
pub mod transport;

pub use api::{CloudApi, HttpCloudApi, RegistrationRequest, RegistrationResponse};
pub use artifact::{ArtifactFetcher, FetchOutcome, UploadsFolder};
pub use error::{ApiError, ArtifactError, BridgeError, Result, TransportError};
pub use registration::{hardware_id, RegistrationOutcome};
pub use reporter::{build_status, StatusReporter};
pub use router::{CommandRouter, PendingPrint};
pub use session::{BridgeSession, BridgeSessionBuilder};
pub use state::{DeviceSnapshot, DeviceState, SharedIdentity};
pub use transport::{
    topic_matches, InboundSink, LinkEvent, MqttTransport, Payload, Qos, RefusalReason, Transport,
};
