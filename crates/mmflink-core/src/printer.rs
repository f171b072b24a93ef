//! Host-provided collaborators: the local printer and the analysis queue.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::telemetry::JobProgress;

/// Result type for printer operations.
pub type Result<T> = std::result::Result<T, PrinterError>;

/// Failures reported by the local printer.
#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    /// Printer is closed, in error, or otherwise cannot take the request.
    #[error("Printer not operational: {0}")]
    NotOperational(String),

    /// The file could not be selected.
    #[error("Cannot select {path}: {reason}")]
    Select { path: PathBuf, reason: String },

    /// Anything else the host reports.
    #[error("Printer error: {0}")]
    Other(String),
}

/// Local printer control.
///
/// Implemented by the host. Calls are expected to return quickly; they only
/// issue commands and read cached state.
pub trait LocalPrinter: Send + Sync {
    /// Printer is disconnected or in an error state.
    fn is_closed_or_error(&self) -> bool;

    /// Printer is connected and idle, able to start a job.
    fn is_ready(&self) -> bool;

    /// Live job progress.
    fn current_job(&self) -> JobProgress;

    /// Select a file, optionally starting the print right away.
    fn select_file(&self, path: &Path, print_after_select: bool) -> Result<()>;

    fn pause_print(&self) -> Result<()>;

    fn resume_print(&self) -> Result<()>;

    fn cancel_print(&self) -> Result<()>;
}

/// A file submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub name: String,
    pub path: PathBuf,
    pub file_type: String,
    pub location: String,
    pub printer_profile: String,
}

impl QueueEntry {
    /// A local G-code entry analysed against the default profile.
    pub fn gcode(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            file_type: "gcode".to_string(),
            location: "local".to_string(),
            printer_profile: "_default".to_string(),
        }
    }
}

/// Host analysis/indexing pipeline for downloaded files.
pub trait AnalysisQueue: Send + Sync {
    /// Submit an entry. High-priority entries jump the queue.
    fn enqueue(&self, entry: QueueEntry, high_priority: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcode_entry() {
        let entry = QueueEntry::gcode("f.gcode", "/tmp/uploads/f.gcode");
        assert_eq!(entry.file_type, "gcode");
        assert_eq!(entry.location, "local");
        assert_eq!(entry.printer_profile, "_default");
        assert_eq!(entry.path, PathBuf::from("/tmp/uploads/f.gcode"));
    }

    #[test]
    fn test_select_error_mentions_path() {
        let err = PrinterError::Select {
            path: PathBuf::from("a.gcode"),
            reason: "busy".into(),
        };
        assert_eq!(err.to_string(), "Cannot select a.gcode: busy");
    }
}
