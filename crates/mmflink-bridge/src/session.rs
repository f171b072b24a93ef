//! The bridge session: owns identity, state and the broker connection, and
//! wires the router, reporter and fetcher together.

use mmflink_core::action::{ActionState, PrintEvent};
use mmflink_core::catalog::SupportedPrinter;
use mmflink_core::config::BridgeConfig;
use mmflink_core::eventbus::{EventBus, EventBusReceiver};
use mmflink_core::event::HostEvent;
use mmflink_core::identity::DeviceIdentity;
use mmflink_core::message::InboundCommand;
use mmflink_core::printer::{AnalysisQueue, LocalPrinter};
use mmflink_core::telemetry::TemperatureSample;
use mmflink_core::InboundAction;
use mmflink_storage::Settings;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{CloudApi, HttpCloudApi};
use crate::artifact::{ArtifactFetcher, UploadsFolder};
use crate::error::Result;
use crate::reporter::StatusReporter;
use crate::router::CommandRouter;
use crate::state::{DeviceSnapshot, DeviceState, SharedIdentity};
use crate::transport::{topic_matches, InboundSink, LinkEvent, MqttTransport, Transport};

/// Builder for [`BridgeSession`].
pub struct BridgeSessionBuilder {
    settings: Settings,
    printer: Arc<dyn LocalPrinter>,
    queue: Arc<dyn AnalysisQueue>,
    config: BridgeConfig,
    transport: Option<Arc<dyn Transport>>,
    api: Option<Arc<dyn CloudApi>>,
    events: Option<EventBus>,
}

impl BridgeSessionBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom broker session instead of MQTT.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom REST client.
    pub fn api(mut self, api: Arc<dyn CloudApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<BridgeSession> {
        let identity = self.settings.identity()?;
        let config = self.config;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(MqttTransport::new(
                config.broker.clone(),
                config.disconnect_grace(),
            )),
        };
        let api: Arc<dyn CloudApi> = match self.api {
            Some(api) => api,
            None => Arc::new(HttpCloudApi::new(
                config.api.clone(),
                identity.credentials.client_key.clone(),
            )?),
        };
        let events = self.events.unwrap_or_else(|| EventBus::with_name("mmflink"));

        let identity: SharedIdentity = Arc::new(RwLock::new(identity));
        let state = Arc::new(DeviceState::new());

        let reporter = Arc::new(StatusReporter::new(
            transport.clone(),
            self.printer.clone(),
            state.clone(),
            identity.clone(),
            config.status_interval(),
        ));
        let fetcher = Arc::new(ArtifactFetcher::new(
            api.clone(),
            UploadsFolder::new(config.uploads_dir.clone()),
            self.queue,
            self.printer.clone(),
            events.clone(),
        ));
        let router = Arc::new(CommandRouter::new(
            state.clone(),
            identity.clone(),
            self.settings.clone(),
            self.printer,
            fetcher,
            reporter.clone(),
        ));

        let (link_tx, link_rx) = mpsc::unbounded_channel();

        Ok(BridgeSession {
            config,
            settings: self.settings,
            identity,
            state,
            transport,
            api,
            reporter,
            router,
            events,
            link_tx,
            link_rx: Mutex::new(Some(link_rx)),
            dispatcher: Mutex::new(None),
        })
    }
}

/// A device's session with the management service.
pub struct BridgeSession {
    pub(crate) config: BridgeConfig,
    pub(crate) settings: Settings,
    pub(crate) identity: SharedIdentity,
    pub(crate) state: Arc<DeviceState>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) api: Arc<dyn CloudApi>,
    pub(crate) reporter: Arc<StatusReporter>,
    pub(crate) router: Arc<CommandRouter>,
    pub(crate) events: EventBus,
    link_tx: InboundSink,
    link_rx: Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeSession {
    pub fn builder(
        settings: Settings,
        printer: Arc<dyn LocalPrinter>,
        queue: Arc<dyn AnalysisQueue>,
    ) -> BridgeSessionBuilder {
        BridgeSessionBuilder {
            settings,
            printer,
            queue,
            config: BridgeConfig::default(),
            transport: None,
            api: None,
            events: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventBusReceiver {
        self.events.subscribe()
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity.read().clone()
    }

    pub fn action_state(&self) -> ActionState {
        self.state.action()
    }

    pub fn current_task_id(&self) -> String {
        self.state.task_id()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.snapshot()
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Re-read identity from settings into the shared cell.
    pub(crate) fn reload_identity(&self) -> Result<DeviceIdentity> {
        let identity = self.settings.identity()?;
        *self.identity.write() = identity.clone();
        Ok(identity)
    }

    /// Bring the session up: migrate settings, connect, then either start
    /// status reports (registered) or refresh the printer catalog.
    pub async fn start(&self) -> Result<()> {
        self.settings.migrate()?;
        self.spawn_dispatcher();
        let identity = self.reload_identity()?;

        self.connect().await?;

        if identity.is_registered() {
            self.reporter.start();
        } else if let Err(e) = self.refresh_catalog().await {
            warn!("Failed to fetch supported printers: {}", e);
        }
        info!(registered = identity.is_registered(), "bridge session started");
        Ok(())
    }

    /// Force-disconnect and stop background work.
    pub async fn shutdown(&self) {
        self.disconnect(true).await;
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        info!("bridge session stopped");
    }

    fn spawn_dispatcher(&self) {
        let Some(mut rx) = self.link_rx.lock().take() else {
            return;
        };
        let handler = LinkHandler {
            router: self.router.clone(),
            transport: self.transport.clone(),
            identity: self.identity.clone(),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.handle(event).await;
            }
        });
        *self.dispatcher.lock() = Some(handle);
    }

    /// (Re)connect with the current identity.
    pub async fn connect(&self) -> Result<()> {
        let identity = self.identity();
        self.transport.connect(&identity, self.link_tx.clone()).await?;
        Ok(())
    }

    /// Disconnect. A forced disconnect also stops status reports.
    pub async fn disconnect(&self, force: bool) {
        self.transport.disconnect(force).await;
        if force {
            self.reporter.stop();
        }
    }

    /// Temperature callback from the local printer. Ignored until registered.
    pub fn on_temperature_sample(&self, sample: TemperatureSample) {
        if self.identity.read().registered {
            self.state.record_temperature(sample);
        }
    }

    /// Print-lifecycle callback from the local printer.
    pub fn on_print_event(&self, event: PrintEvent) -> ActionState {
        self.router.apply_print_event(event)
    }

    /// Handle a command directly, bypassing the broker.
    pub async fn handle_command(&self, command: InboundCommand) {
        self.router.dispatch(command).await;
    }

    /// Fetch the supported-printer catalog and store it.
    pub async fn refresh_catalog(&self) -> Result<Vec<SupportedPrinter>> {
        let printers = self.api.supported_printers().await?;
        self.settings.set_supported_printers(&printers)?;
        info!(count = printers.len(), "supported printers updated");
        Ok(printers)
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}

struct LinkHandler {
    router: Arc<CommandRouter>,
    transport: Arc<dyn Transport>,
    identity: SharedIdentity,
    events: EventBus,
}

impl LinkHandler {
    async fn handle(&self, event: LinkEvent) {
        let current = self.transport.generation();
        if event.generation() != current {
            debug!(
                generation = event.generation(),
                current, "dropping event from superseded connection"
            );
            return;
        }

        match event {
            LinkEvent::Connected { generation } => {
                debug!(generation, "broker session up");
            }
            LinkEvent::Disconnected { generation } => {
                info!(generation, "broker session down");
            }
            LinkEvent::Refused { reason, .. } => {
                error!("{}", reason);
                self.events.publish(HostEvent::ConnectionRefused {
                    reason: reason.to_string(),
                });
            }
            LinkEvent::Message { topic, payload, .. } => self.on_message(&topic, &payload).await,
        }
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let filter = self.identity.read().command_topic();
        let Some(filter) = filter else {
            debug!(topic, "message while unregistered, ignored");
            return;
        };
        if !topic_matches(&filter, topic) {
            debug!(topic, "message on foreign topic, ignored");
            return;
        }

        let command = match InboundCommand::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic, "Dropping undecodable command: {}", e);
                return;
            }
        };

        if command.action == InboundAction::Print {
            // Accepted in arrival order; the download must not hold up
            // later commands.
            if let Some(pending) = self.router.begin_print(&command) {
                let router = self.router.clone();
                tokio::spawn(async move { router.complete_print(pending).await });
            }
        } else {
            self.router.dispatch(command).await;
        }
    }
}
