//! Wire formats exchanged with the broker.
//!
//! Inbound: commands on `/printers/{token}`.
//! Outbound: status reports on `/printers`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::InboundAction;

/// Message-type marker carried by every status report.
pub const STATUS_REPORT_CODE: u16 = 300;

/// Timestamp layout used in status reports (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Errors decoding an inbound payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not a JSON object of the expected shape.
    #[error("Invalid command payload: {0}")]
    Json(#[from] serde_json::Error),

    /// `action_code` missing or not a string/number.
    #[error("Missing or invalid action_code")]
    MissingActionCode,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(default)]
    action_code: Value,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// A decoded command from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub action: InboundAction,
    pub task_id: Option<String>,
    pub filename: Option<String>,
    /// Any other fields the service sent along (source references and the like).
    pub extra: Map<String, Value>,
}

/// The parts of a print command the artifact fetch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub task_id: String,
    pub filename: String,
}

impl InboundCommand {
    /// Build a command with no payload fields.
    pub fn new(action: InboundAction) -> Self {
        Self {
            action,
            task_id: None,
            filename: None,
            extra: Map::new(),
        }
    }

    /// Build a print command.
    pub fn print(task_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            action: InboundAction::Print,
            task_id: Some(task_id.into()),
            filename: Some(filename.into()),
            extra: Map::new(),
        }
    }

    /// Decode a raw broker payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawCommand = serde_json::from_slice(payload)?;
        let code = match raw.action_code {
            Value::String(code) => code,
            // Some senders drop the quotes; "000" then arrives as 0.
            Value::Number(n) => match n.as_u64() {
                Some(n) => format!("{:03}", n),
                None => return Err(DecodeError::MissingActionCode),
            },
            _ => return Err(DecodeError::MissingActionCode),
        };

        Ok(Self {
            action: InboundAction::from_code(code.trim()),
            task_id: raw.task_id,
            filename: raw.filename,
            extra: raw.extra,
        })
    }

    /// Task id and file name, when both are present and non-empty.
    pub fn print_job(&self) -> Option<PrintJob> {
        let task_id = self.task_id.as_deref().filter(|s| !s.is_empty())?;
        let filename = self.filename.as_deref().filter(|s| !s.is_empty())?;
        Some(PrintJob {
            task_id: task_id.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// Status report published on `/printers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "actionCode")]
    pub action_code: u16,
    pub status: String,
    pub printer_token: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub current_task_id: String,
    pub temperature: String,
    pub bed_temperature: String,
    pub print_progress: i64,
    pub remaining_time: i64,
    pub total_time: i64,
    pub date: String,
}

impl StatusMessage {
    /// Parse the `date` field.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }
}

/// Format a timestamp for a status report.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a status-report timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
