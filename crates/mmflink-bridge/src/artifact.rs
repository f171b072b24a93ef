//! Print artifact download, placement and hand-off to the printer.

use mmflink_core::eventbus::EventBus;
use mmflink_core::message::PrintJob;
use mmflink_core::printer::{AnalysisQueue, LocalPrinter, QueueEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::CloudApi;
use crate::error::ArtifactError;

/// The folder downloaded artifacts are written to.
#[derive(Debug, Clone)]
pub struct UploadsFolder {
    root: PathBuf,
}

impl UploadsFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject names that are empty or could leave the folder.
    pub fn validate_name(name: &str) -> Result<&str, ArtifactError> {
        let invalid = name.trim().is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.contains('\0');
        if invalid {
            Err(ArtifactError::InvalidName(name.to_string()))
        } else {
            Ok(name)
        }
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        Ok(self.root.join(Self::validate_name(name)?))
    }

    /// Write `bytes` verbatim under `name`, replacing any existing file.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// What happened to a fetched artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Selected and printing.
    Started(PathBuf),
    /// Selected, waiting for a manual start.
    Selected(PathBuf),
    /// Stored and queued; the printer was not ready to take it.
    Deferred(PathBuf),
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Started(path)
            | FetchOutcome::Selected(path)
            | FetchOutcome::Deferred(path) => path,
        }
    }
}

/// Downloads print artifacts and hands them to the local printer.
pub struct ArtifactFetcher {
    api: Arc<dyn CloudApi>,
    uploads: UploadsFolder,
    queue: Arc<dyn AnalysisQueue>,
    printer: Arc<dyn LocalPrinter>,
    events: EventBus,
}

impl ArtifactFetcher {
    pub fn new(
        api: Arc<dyn CloudApi>,
        uploads: UploadsFolder,
        queue: Arc<dyn AnalysisQueue>,
        printer: Arc<dyn LocalPrinter>,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            uploads,
            queue,
            printer,
            events,
        }
    }

    pub fn uploads(&self) -> &UploadsFolder {
        &self.uploads
    }

    /// Download the artifact of `job`, store it and queue it for analysis.
    ///
    /// A failed request publishes a host event and leaves no file behind.
    pub async fn fetch(&self, job: &PrintJob, printer_token: &str) -> Result<PathBuf, ArtifactError> {
        if let Err(e) = UploadsFolder::validate_name(&job.filename) {
            warn!(task_id = %job.task_id, "Rejecting print artifact: {}", e);
            return Err(e);
        }

        let bytes = match self
            .api
            .download_print_file(&job.task_id, printer_token)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(task_id = %job.task_id, "Print file download failed: {}", e);
                self.events.publish(e.host_event());
                return Err(e.into());
            }
        };

        let path = self.uploads.write(&job.filename, &bytes).await?;
        debug!(
            task_id = %job.task_id,
            path = %path.display(),
            size = bytes.len(),
            "print artifact stored"
        );

        self.queue
            .enqueue(QueueEntry::gcode(job.filename.clone(), path.clone()), true);
        Ok(path)
    }

    /// Select a stored artifact on the printer, starting it when
    /// `auto_start` is set. A busy printer leaves it in the uploads folder.
    pub fn hand_off(&self, job: &PrintJob, path: PathBuf, auto_start: bool) -> FetchOutcome {
        if !self.printer.is_ready() {
            info!(task_id = %job.task_id, "printer not ready, artifact left in uploads");
            return FetchOutcome::Deferred(path);
        }

        if let Err(e) = self.printer.select_file(&path, auto_start) {
            warn!(task_id = %job.task_id, "Failed to select print artifact: {}", e);
            return FetchOutcome::Deferred(path);
        }

        if auto_start {
            info!(task_id = %job.task_id, file = %job.filename, "print started");
            FetchOutcome::Started(path)
        } else {
            info!(task_id = %job.task_id, file = %job.filename, "print file selected");
            FetchOutcome::Selected(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(UploadsFolder::validate_name("part.gcode").is_ok());
        for bad in ["", "  ", "../x.gcode", "a/b.gcode", "a\\b.gcode", "..", "x\0"] {
            assert!(UploadsFolder::validate_name(bad).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_write_creates_folder() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadsFolder::new(dir.path().join("uploads"));
        let path = uploads.write("f.gcode", b"G28\n").await.unwrap();
        assert_eq!(path, dir.path().join("uploads").join("f.gcode"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"G28\n");

        // Overwrites in place.
        uploads.write("f.gcode", b"G1\n").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"G1\n");
    }

    #[test]
    fn test_outcome_path() {
        let outcome = FetchOutcome::Deferred(PathBuf::from("u/f.gcode"));
        assert_eq!(outcome.path(), Path::new("u/f.gcode"));
    }
}
