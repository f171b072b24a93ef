//! Periodic status reports on `/printers`.

use chrono::{DateTime, Utc};
use mmflink_core::config::topics;
use mmflink_core::identity::DeviceIdentity;
use mmflink_core::message::{format_timestamp, StatusMessage, STATUS_REPORT_CODE};
use mmflink_core::printer::LocalPrinter;
use mmflink_core::telemetry::{format_temperature, JobProgress};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::state::{DeviceSnapshot, DeviceState, SharedIdentity};
use crate::transport::{Payload, Qos, Transport};

/// Build a status report from one state snapshot.
pub fn build_status(
    identity: &DeviceIdentity,
    snapshot: &DeviceSnapshot,
    progress: &JobProgress,
    now: DateTime<Utc>,
) -> StatusMessage {
    StatusMessage {
        action_code: STATUS_REPORT_CODE,
        status: snapshot.action.status_label().to_string(),
        printer_token: identity.token.clone(),
        manufacturer: identity.manufacturer.clone(),
        model: identity.model.clone(),
        firmware_version: identity.firmware_version.clone(),
        serial_number: identity.serial_number.clone(),
        current_task_id: snapshot.task_id.clone(),
        temperature: format_temperature(snapshot.temperatures.hotend),
        bed_temperature: format_temperature(snapshot.temperatures.bed),
        print_progress: progress.progress_percent(),
        remaining_time: progress.remaining_secs(),
        total_time: progress.total_secs(),
        date: format_timestamp(now),
    }
}

struct ReporterContext {
    transport: Arc<dyn Transport>,
    printer: Arc<dyn LocalPrinter>,
    state: Arc<DeviceState>,
    identity: SharedIdentity,
}

impl ReporterContext {
    fn publish_status(&self) -> bool {
        if !self.transport.is_connected() {
            return false;
        }
        if self.printer.is_closed_or_error() {
            tracing::trace!("printer unavailable, skipping status report");
            return false;
        }

        let identity = self.identity.read().clone();
        let snapshot = self.state.snapshot();
        let progress = self.printer.current_job();
        let status = build_status(&identity, &snapshot, &progress, Utc::now());

        match Payload::json(&status) {
            Ok(payload) => {
                self.transport
                    .publish(topics::STATUS_TOPIC, payload, false, Qos::AtMostOnce)
            }
            Err(e) => {
                tracing::warn!("Failed to encode status report: {}", e);
                false
            }
        }
    }
}

/// Publishes a status report on a fixed period.
pub struct StatusReporter {
    ctx: Arc<ReporterContext>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusReporter {
    pub fn new(
        transport: Arc<dyn Transport>,
        printer: Arc<dyn LocalPrinter>,
        state: Arc<DeviceState>,
        identity: SharedIdentity,
        period: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(ReporterContext {
                transport,
                printer,
                state,
                identity,
            }),
            period,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the timer, replacing a running one. The first report goes out
    /// one period from now.
    pub fn start(&self) {
        let ctx = self.ctx.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                ctx.publish_status();
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(period_ms = period.as_millis() as u64, "status reporter started");
    }

    /// Stop the timer. Returns whether it was running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("status reporter stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Publish one report now. Returns whether a send was attempted.
    pub fn publish_status(&self) -> bool {
        self.ctx.publish_status()
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
