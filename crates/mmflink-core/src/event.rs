//! Events surfaced to the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outbound notification for the surrounding host or UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Registration succeeded, the reference image is available.
    QrImageUrl { url: String },
    /// A REST call came back with a non-success HTTP status.
    Error { status: u16 },
    /// The registration was cleared.
    PrinterRemoved,
    /// A REST call failed before any status was received.
    RequestFailed { reason: String },
    /// The broker refused the connection.
    ConnectionRefused { reason: String },
}

impl HostEvent {
    /// Short name, useful for filtering and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::QrImageUrl { .. } => "QrImageUrl",
            Self::Error { .. } => "Error",
            Self::PrinterRemoved => "PrinterRemoved",
            Self::RequestFailed { .. } => "RequestFailed",
            Self::ConnectionRefused { .. } => "ConnectionRefused",
        }
    }

    /// The payload shape the host UI expects, e.g. `{"error": 404}`.
    pub fn to_payload(&self) -> Value {
        match self {
            Self::QrImageUrl { url } => json!({ "qr_image_url": url }),
            Self::Error { status } => json!({ "error": status }),
            Self::PrinterRemoved => json!({ "printer_removed": true }),
            Self::RequestFailed { reason } => json!({ "request_failed": reason }),
            Self::ConnectionRefused { reason } => json!({ "connection_refused": reason }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::RequestFailed { .. } | Self::ConnectionRefused { .. }
        )
    }
}

/// Where and when an event was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_payloads() {
        assert_eq!(
            HostEvent::QrImageUrl { url: "https://x/qr.png".into() }.to_payload(),
            json!({"qr_image_url": "https://x/qr.png"})
        );
        assert_eq!(HostEvent::Error { status: 404 }.to_payload(), json!({"error": 404}));
        assert_eq!(
            HostEvent::PrinterRemoved.to_payload(),
            json!({"printer_removed": true})
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(HostEvent::Error { status: 500 }.is_error());
        assert!(!HostEvent::PrinterRemoved.is_error());
    }
}
