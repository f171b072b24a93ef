//! Inbound command handling.

use mmflink_core::action::{ActionState, InboundAction, PrintEvent, Transition};
use mmflink_core::message::{InboundCommand, PrintJob};
use mmflink_core::printer::LocalPrinter;
use mmflink_storage::Settings;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactFetcher, FetchOutcome};
use crate::reporter::StatusReporter;
use crate::state::{DeviceState, SharedIdentity};

/// A print command accepted but not yet fetched.
#[derive(Debug, Clone)]
pub struct PendingPrint {
    ticket: u64,
    job: PrintJob,
}

impl PendingPrint {
    pub fn job(&self) -> &PrintJob {
        &self.job
    }
}

/// Applies inbound commands and local print events to the device state and
/// drives the matching printer operations.
pub struct CommandRouter {
    state: Arc<DeviceState>,
    identity: SharedIdentity,
    settings: Settings,
    printer: Arc<dyn LocalPrinter>,
    fetcher: Arc<ArtifactFetcher>,
    reporter: Arc<StatusReporter>,
    /// Held across a state change and the printer call it implies, so the
    /// printer sees commands in the order the state took them.
    order: Mutex<()>,
}

impl CommandRouter {
    pub fn new(
        state: Arc<DeviceState>,
        identity: SharedIdentity,
        settings: Settings,
        printer: Arc<dyn LocalPrinter>,
        fetcher: Arc<ArtifactFetcher>,
        reporter: Arc<StatusReporter>,
    ) -> Self {
        Self {
            state,
            identity,
            settings,
            printer,
            fetcher,
            reporter,
            order: Mutex::new(()),
        }
    }

    /// Handle one command. Failures are logged; none is returned.
    pub async fn dispatch(&self, command: InboundCommand) {
        debug!(action_code = command.action.code(), "inbound command");

        match &command.action {
            InboundAction::Idle => {
                debug!("idle command, nothing to do");
            }
            InboundAction::Prepare => {
                info!("prepare command received");
                self.apply(&command);
            }
            InboundAction::Print => {
                if let Some(pending) = self.begin_print(&command) {
                    self.complete_print(pending).await;
                }
            }
            InboundAction::Pause => {
                let _order = self.order.lock();
                self.apply(&command);
                if let Err(e) = self.printer.pause_print() {
                    warn!("Pause failed: {}", e);
                }
            }
            InboundAction::Cancel => {
                let _order = self.order.lock();
                self.apply(&command);
                if let Err(e) = self.printer.cancel_print() {
                    warn!("Cancel failed: {}", e);
                }
            }
            InboundAction::Resume => {
                let _order = self.order.lock();
                self.apply(&command);
                if let Err(e) = self.printer.resume_print() {
                    warn!("Resume failed: {}", e);
                }
            }
            InboundAction::StatusRequest => {
                if !self.reporter.publish_status() {
                    debug!("status requested but nothing was published");
                }
            }
            InboundAction::Unknown(code) => {
                warn!(action_code = %code, "ignoring unknown action code");
            }
        }
    }

    /// Accept a print command and claim its place in the command order.
    ///
    /// Must run in arrival order with the other commands; the returned
    /// [`PendingPrint`] may then complete on any task.
    pub fn begin_print(&self, command: &InboundCommand) -> Option<PendingPrint> {
        let Some(job) = command.print_job() else {
            warn!("print command without task_id or filename");
            return None;
        };
        Some(PendingPrint {
            ticket: self.state.reserve(),
            job,
        })
    }

    /// Fetch the artifact of an accepted print command and start it.
    ///
    /// If another command was applied while the download ran, the artifact
    /// stays stored and queued but is neither selected nor reflected in the
    /// device state.
    pub async fn complete_print(&self, pending: PendingPrint) {
        let PendingPrint { ticket, job } = pending;

        let token = self.identity.read().token.clone();
        let auto_start = self.settings.auto_start_print().unwrap_or_else(|e| {
            warn!("Cannot read auto_start_print, assuming enabled: {}", e);
            true
        });

        let path = match self.fetcher.fetch(&job, &token).await {
            Ok(path) => path,
            Err(e) => {
                warn!(task_id = %job.task_id, "Print command not applied: {}", e);
                return;
            }
        };

        let transition = Transition::for_command(&InboundAction::Print, Some(&job.task_id));
        let outcome = {
            let _order = self.order.lock();
            self.state
                .apply_if_current(ticket, transition)
                .map(|_| self.fetcher.hand_off(&job, path.clone(), auto_start))
        };
        match outcome {
            Some(FetchOutcome::Deferred(path)) => {
                debug!(task_id = %job.task_id, path = %path.display(), "print deferred");
            }
            Some(_) => {}
            None => {
                info!(
                    task_id = %job.task_id,
                    path = %path.display(),
                    "print superseded by a later command, artifact left queued"
                );
            }
        }
    }

    fn apply(&self, command: &InboundCommand) -> ActionState {
        let transition = Transition::for_command(&command.action, command.task_id.as_deref());
        self.state.apply(transition).action
    }

    /// Local print-lifecycle notification.
    pub fn apply_print_event(&self, event: PrintEvent) -> ActionState {
        let after = self.state.observe(Transition::for_print_event(event));
        debug!(?event, action = %after.action, "print event");
        after.action
    }
}
