//! Test doubles for the bridge collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use mmflink_bridge::api::{CloudApi, RegistrationRequest, RegistrationResponse};
use mmflink_bridge::transport::{InboundSink, LinkEvent, Payload, Qos, Transport};
use mmflink_bridge::{ApiError, BridgeSession, TransportError};
use mmflink_core::catalog::SupportedPrinter;
use mmflink_core::config::BridgeConfig;
use mmflink_core::identity::DeviceIdentity;
use mmflink_core::printer::{AnalysisQueue, LocalPrinter, PrinterError, QueueEntry};
use mmflink_core::telemetry::JobProgress;
use mmflink_core::storage::{StorageBackend, StorageError};
use mmflink_storage::{MemoryBackend, Registration, Settings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Printer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PrinterCall {
    Select { path: PathBuf, print: bool },
    Pause,
    Resume,
    Cancel,
}

pub struct FakePrinter {
    pub closed_or_error: AtomicBool,
    pub ready: AtomicBool,
    pub job: Mutex<JobProgress>,
    pub calls: Mutex<Vec<PrinterCall>>,
    /// Runs inside `select_file`, the way a host reports a job start.
    pub on_select: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakePrinter {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            closed_or_error: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            job: Mutex::new(JobProgress::default()),
            calls: Mutex::new(Vec::new()),
            on_select: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<PrinterCall> {
        self.calls.lock().clone()
    }
}

impl LocalPrinter for FakePrinter {
    fn is_closed_or_error(&self) -> bool {
        self.closed_or_error.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn current_job(&self) -> JobProgress {
        *self.job.lock()
    }

    fn select_file(&self, path: &Path, print_after_select: bool) -> Result<(), PrinterError> {
        self.calls.lock().push(PrinterCall::Select {
            path: path.to_path_buf(),
            print: print_after_select,
        });
        if let Some(hook) = self.on_select.lock().as_ref() {
            hook();
        }
        Ok(())
    }

    fn pause_print(&self) -> Result<(), PrinterError> {
        self.calls.lock().push(PrinterCall::Pause);
        Ok(())
    }

    fn resume_print(&self) -> Result<(), PrinterError> {
        self.calls.lock().push(PrinterCall::Resume);
        Ok(())
    }

    fn cancel_print(&self) -> Result<(), PrinterError> {
        self.calls.lock().push(PrinterCall::Cancel);
        Err(PrinterError::NotOperational("no job".into()))
    }
}

// ============================================================================
// Analysis queue
// ============================================================================

#[derive(Default)]
pub struct RecordingQueue {
    pub entries: Mutex<Vec<(QueueEntry, bool)>>,
}

impl AnalysisQueue for RecordingQueue {
    fn enqueue(&self, entry: QueueEntry, high_priority: bool) {
        self.entries.lock().push((entry, high_priority));
    }
}

// ============================================================================
// Storage
// ============================================================================

/// In-memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    pub fail_writes: AtomicBool,
}

impl FlakyBackend {
    fn check(&self) -> mmflink_core::storage::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::Backend("disk full".into()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for FlakyBackend {
    fn write(&self, table: &str, key: &str, value: &[u8]) -> mmflink_core::storage::Result<()> {
        self.check()?;
        self.inner.write(table, key, value)
    }

    fn read(&self, table: &str, key: &str) -> mmflink_core::storage::Result<Option<Vec<u8>>> {
        self.inner.read(table, key)
    }

    fn delete(&self, table: &str, key: &str) -> mmflink_core::storage::Result<bool> {
        self.check()?;
        self.inner.delete(table, key)
    }

    fn scan(&self, table: &str, prefix: &str) -> mmflink_core::storage::Result<Vec<(String, Vec<u8>)>> {
        self.inner.scan(table, prefix)
    }

    fn write_batch(&self, table: &str, items: Vec<(String, Vec<u8>)>) -> mmflink_core::storage::Result<()> {
        self.check()?;
        self.inner.write_batch(table, items)
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct RecordingTransport {
    pub connected: AtomicBool,
    pub generation: AtomicU64,
    pub connects: Mutex<Vec<DeviceIdentity>>,
    pub disconnects: Mutex<Vec<bool>>,
    pub published: Mutex<Vec<(String, String)>>,
    sink: Mutex<Option<InboundSink>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver an event tagged with the current generation.
    pub fn deliver(&self, event: LinkEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.send(event).unwrap();
        }
    }

    pub fn deliver_message(&self, topic: &str, payload: &str) {
        self.deliver(LinkEvent::Message {
            generation: self.generation(),
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn disconnect_calls(&self) -> Vec<bool> {
        self.disconnects.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self, identity: &DeviceIdentity, sink: InboundSink) -> Result<u64, TransportError> {
        self.connects.lock().push(identity.clone());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.connected.store(true, Ordering::SeqCst);
        let _ = sink.send(LinkEvent::Connected { generation });
        *self.sink.lock() = Some(sink);
        Ok(generation)
    }

    async fn disconnect(&self, force: bool) {
        self.disconnects.lock().push(force);
        self.connected.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn publish(&self, topic: &str, payload: Payload, _retain: bool, _qos: Qos) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.published
            .lock()
            .push((topic.to_string(), payload.into_text()));
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Cloud API
// ============================================================================

#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Status(u16),
    Timeout,
}

impl<T: Clone> Reply<T> {
    fn result(&self) -> Result<T, ApiError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Status(status) => Err(ApiError::Status(*status)),
            Reply::Timeout => Err(ApiError::Timeout),
        }
    }
}

pub struct MockApi {
    pub register_reply: Mutex<Reply<RegistrationResponse>>,
    pub download_reply: Mutex<Reply<Vec<u8>>>,
    pub catalog_reply: Mutex<Reply<Vec<SupportedPrinter>>>,
    pub registrations: Mutex<Vec<RegistrationRequest>>,
    pub downloads: Mutex<Vec<(String, String)>>,
    download_delays: Mutex<HashMap<String, Duration>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            register_reply: Mutex::new(Reply::Status(500)),
            download_reply: Mutex::new(Reply::Status(404)),
            catalog_reply: Mutex::new(Reply::Ok(Vec::new())),
            registrations: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
            download_delays: Mutex::new(HashMap::new()),
        })
    }

    pub fn register_returns(&self, token: &str) {
        *self.register_reply.lock() = Reply::Ok(RegistrationResponse {
            printer_token: token.to_string(),
            qr_image_url: format!("https://qr.example/{}.png", token),
            extra: Default::default(),
        });
    }

    pub fn download_returns(&self, reply: Reply<Vec<u8>>) {
        *self.download_reply.lock() = reply;
    }

    /// Hold the download of `task_id` for `delay` before answering.
    pub fn delay_download(&self, task_id: &str, delay: Duration) {
        self.download_delays.lock().insert(task_id.to_string(), delay);
    }
}

#[async_trait]
impl CloudApi for MockApi {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse, ApiError> {
        self.registrations.lock().push(request.clone());
        self.register_reply.lock().result()
    }

    async fn download_print_file(&self, task_id: &str, printer_token: &str) -> Result<Vec<u8>, ApiError> {
        self.downloads
            .lock()
            .push((task_id.to_string(), printer_token.to_string()));
        let delay = self.download_delays.lock().get(task_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.download_reply.lock().result()
    }

    async fn supported_printers(&self) -> Result<Vec<SupportedPrinter>, ApiError> {
        self.catalog_reply.lock().result()
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: BridgeSession,
    pub settings: Settings,
    pub printer: Arc<FakePrinter>,
    pub queue: Arc<RecordingQueue>,
    pub transport: Arc<RecordingTransport>,
    pub api: Arc<MockApi>,
    pub uploads: tempfile::TempDir,
}

impl Harness {
    /// A session with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_settings(Settings::in_memory())
    }

    /// A session whose store already holds a registration for `token`.
    pub fn registered(token: &str) -> Self {
        let settings = Settings::in_memory();
        seed_registration(&settings, token);
        Self::with_settings(settings)
    }

    /// A registered session over a store whose writes can be failed.
    pub fn registered_flaky(token: &str) -> (Self, Arc<FlakyBackend>) {
        let backend = Arc::new(FlakyBackend::default());
        let settings = Settings::new(backend.clone());
        seed_registration(&settings, token);
        (Self::with_settings(settings), backend)
    }

    pub fn with_settings(settings: Settings) -> Self {
        let printer = FakePrinter::ready();
        let queue = Arc::new(RecordingQueue::default());
        let transport = RecordingTransport::new();
        let api = MockApi::new();
        let uploads = tempfile::tempdir().unwrap();

        let config = BridgeConfig::default()
            .with_status_interval(Duration::from_millis(20))
            .with_disconnect_grace(Duration::ZERO)
            .with_uploads_dir(uploads.path().join("uploads"));

        let session = BridgeSession::builder(settings.clone(), printer.clone(), queue.clone())
            .config(config)
            .transport(transport.clone())
            .api(api.clone())
            .build()
            .unwrap();

        Self {
            session,
            settings,
            printer,
            queue,
            transport,
            api,
            uploads,
        }
    }

    pub fn uploads_path(&self, name: &str) -> PathBuf {
        self.uploads.path().join("uploads").join(name)
    }
}

pub fn seed_registration(settings: &Settings, token: &str) {
    settings.ensure_serial(|| "SERIAL-1".to_string()).unwrap();
    settings
        .set_registration(&Registration {
            token: token.to_string(),
            manufacturer: "Anet".into(),
            model: "anet-a8".into(),
        })
        .unwrap();
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

