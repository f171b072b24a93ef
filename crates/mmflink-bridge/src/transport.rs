//! Broker session over MQTT.
//!
//! One logical connection at a time. Every `connect` creates a fresh client
//! and network loop tagged with a new generation; events carry that
//! generation so the session can drop anything a superseded loop still
//! delivers.
//!
//! Publishing is at-most-once: nothing is buffered while disconnected.

use async_trait::async_trait;
use mmflink_core::config::BrokerConfig;
use mmflink_core::identity::DeviceIdentity;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;

/// Consecutive network-loop errors tolerated before the loop gives up.
pub const MAX_LOOP_ERRORS: u32 = 5;

/// Pause between failed polls; the client reconnects on the next poll.
const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// MQTT QoS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Qos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Outbound payload. Structured values are sent as JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    /// Serialize a value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Canonical text form.
    pub fn into_text(self) -> String {
        match self {
            Payload::Text(text) => text,
            Payload::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// Why the broker refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    ProtocolVersion,
    ClientIdentifier,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Unknown(u8),
}

impl RefusalReason {
    /// Map an MQTT 3.1 CONNACK return code.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::ProtocolVersion,
            2 => Self::ClientIdentifier,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::NotAuthorized,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConnectReturnCode> for RefusalReason {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::RefusedProtocolVersion => Self::ProtocolVersion,
            ConnectReturnCode::BadClientId => Self::ClientIdentifier,
            ConnectReturnCode::ServiceUnavailable => Self::ServerUnavailable,
            ConnectReturnCode::BadUserNamePassword => Self::BadCredentials,
            ConnectReturnCode::NotAuthorized => Self::NotAuthorized,
            ConnectReturnCode::Success => Self::Unknown(0),
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolVersion => f.write_str("Connection refused, wrong protocol version"),
            Self::ClientIdentifier => f.write_str("Connection refused, incorrect client identifier"),
            Self::ServerUnavailable => f.write_str("Connection refused, server unavailable"),
            Self::BadCredentials => f.write_str("Connection refused, bad username or password"),
            Self::NotAuthorized => f.write_str("Connection refused, not authorised"),
            Self::Unknown(code) => write!(f, "Connection refused, unknown error (code {})", code),
        }
    }
}

/// Lifecycle and message events from a network loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected { generation: u64 },
    Refused { generation: u64, reason: RefusalReason },
    Disconnected { generation: u64 },
    Message {
        generation: u64,
        topic: String,
        payload: Vec<u8>,
    },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LinkEvent::Connected { generation }
            | LinkEvent::Refused { generation, .. }
            | LinkEvent::Disconnected { generation }
            | LinkEvent::Message { generation, .. } => *generation,
        }
    }
}

/// Where a network loop delivers its events.
pub type InboundSink = mpsc::UnboundedSender<LinkEvent>;

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// A broker session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection for `identity`, replacing any existing one.
    ///
    /// Returns the generation tagging events from the new connection. When
    /// the identity is registered, its command topic is subscribed on every
    /// acknowledged connect.
    async fn connect(&self, identity: &DeviceIdentity, sink: InboundSink) -> Result<u64, TransportError>;

    /// Stop the network loop. A forced disconnect waits a short grace
    /// period and then terminates the loop outright.
    async fn disconnect(&self, force: bool);

    /// Send if connected. Returns whether a send was attempted.
    fn publish(&self, topic: &str, payload: Payload, retain: bool, qos: Qos) -> bool;

    fn is_connected(&self) -> bool;

    /// Generation of the current connection.
    fn generation(&self) -> u64;
}

struct ActiveLink {
    client: AsyncClient,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// [`Transport`] backed by rumqttc.
pub struct MqttTransport {
    config: BrokerConfig,
    grace: Duration,
    link: Mutex<Option<ActiveLink>>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    tls_configured: AtomicBool,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig, grace: Duration) -> Self {
        Self {
            config,
            grace,
            link: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            tls_configured: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether TLS was set up at least once. Never reset.
    pub fn tls_configured(&self) -> bool {
        self.tls_configured.load(Ordering::SeqCst)
    }

    fn options(&self, identity: &DeviceIdentity) -> MqttOptions {
        let client_id = format!("mmflink_{}", uuid::Uuid::new_v4().simple());
        let mut opts = MqttOptions::new(client_id, &self.config.host, self.config.port());
        opts.set_keep_alive(self.config.keep_alive());
        opts.set_clean_session(true);
        let credentials = &identity.credentials;
        if !credentials.client_name.is_empty() {
            opts.set_credentials(&credentials.client_name, &credentials.client_key);
        }
        if self.config.use_tls {
            opts.set_transport(rumqttc::Transport::tls_with_default_config());
            if !self.tls_configured.swap(true, Ordering::SeqCst) {
                debug!("TLS configured for broker connection");
            }
        }
        opts
    }

    fn take_link(&self) -> Option<ActiveLink> {
        self.connected.store(false, Ordering::SeqCst);
        // Anything the old loop still emits is stale from here on.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.link.lock().take()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self, identity: &DeviceIdentity, sink: InboundSink) -> Result<u64, TransportError> {
        if let Some(old) = self.take_link() {
            let _ = old.client.try_disconnect();
            let _ = old.shutdown.send(true);
            old.task.abort();
        }

        let opts = self.options(identity);
        let (client, event_loop) = AsyncClient::new(opts, 16);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = LoopContext {
            generation,
            current: self.generation.clone(),
            connected: self.connected.clone(),
            client: client.clone(),
            command_topic: identity.command_topic(),
            sink,
        };
        let task = tokio::spawn(run_event_loop(event_loop, ctx, shutdown_rx));

        *self.link.lock() = Some(ActiveLink {
            client,
            task,
            shutdown: shutdown_tx,
        });
        info!(
            host = %self.config.host,
            port = self.config.port(),
            generation,
            "connecting to broker"
        );
        Ok(generation)
    }

    async fn disconnect(&self, force: bool) {
        let Some(link) = self.take_link() else {
            return;
        };
        if let Err(e) = link.client.try_disconnect() {
            debug!("Disconnect request not queued: {}", e);
        }
        if force {
            tokio::time::sleep(self.grace).await;
            let _ = link.shutdown.send(true);
            link.task.abort();
        }
        info!(force, "disconnected from broker");
    }

    fn publish(&self, topic: &str, payload: Payload, retain: bool, qos: Qos) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let link = self.link.lock();
        let Some(link) = link.as_ref() else {
            return false;
        };
        if let Err(e) = link
            .client
            .try_publish(topic, qos.into(), retain, payload.into_text().into_bytes())
        {
            warn!(topic, "Publish failed: {}", e);
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

struct LoopContext {
    generation: u64,
    current: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    client: AsyncClient,
    command_topic: Option<String>,
    sink: InboundSink,
}

impl LoopContext {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn emit(&self, event: LinkEvent) {
        if self.is_current() {
            let _ = self.sink.send(event);
        }
    }

    fn set_connected(&self, connected: bool) -> bool {
        if self.is_current() {
            self.connected.swap(connected, Ordering::SeqCst)
        } else {
            false
        }
    }
}

async fn run_event_loop(mut event_loop: EventLoop, ctx: LoopContext, mut shutdown: watch::Receiver<bool>) {
    let generation = ctx.generation;
    let mut error_count = 0;

    loop {
        let polled = tokio::select! {
            // A dropped sender disables this arm; the loop then ends on the
            // outgoing disconnect.
            Ok(()) = shutdown.changed() => break,
            polled = event_loop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                error_count = 0;
                if !ctx.is_current() {
                    break;
                }
                ctx.set_connected(true);
                info!(generation, "connected to broker");
                if let Some(topic) = &ctx.command_topic {
                    match ctx.client.try_subscribe(topic.as_str(), rumqttc::QoS::AtMostOnce) {
                        Ok(()) => debug!(topic = %topic, "subscribed to command topic"),
                        Err(e) => warn!(topic = %topic, "Subscribe failed: {}", e),
                    }
                }
                ctx.emit(LinkEvent::Connected { generation });
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                error_count = 0;
                let subscribed = ctx
                    .command_topic
                    .as_deref()
                    .is_some_and(|filter| topic_matches(filter, &publish.topic));
                if !subscribed {
                    debug!(topic = %publish.topic, "ignoring message on foreign topic");
                    continue;
                }
                ctx.emit(LinkEvent::Message {
                    generation,
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                });
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                if ctx.set_connected(false) {
                    ctx.emit(LinkEvent::Disconnected { generation });
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                ctx.set_connected(false);
                ctx.emit(LinkEvent::Disconnected { generation });
                break;
            }
            Ok(_) => {
                error_count = 0;
            }
            Err(ConnectionError::ConnectionRefused(code)) => {
                ctx.set_connected(false);
                let reason = RefusalReason::from(code);
                error!(generation, "{}", reason);
                ctx.emit(LinkEvent::Refused { generation, reason });
                break;
            }
            Err(e) => {
                if ctx.set_connected(false) {
                    ctx.emit(LinkEvent::Disconnected { generation });
                }
                if !ctx.is_current() {
                    break;
                }
                error_count += 1;
                if error_count >= MAX_LOOP_ERRORS {
                    error!(
                        generation,
                        "Broker error count reached {}, stopping: {}", MAX_LOOP_ERRORS, e
                    );
                    break;
                }
                warn!(generation, "Broker error ({}/{}): {}", error_count, MAX_LOOP_ERRORS, e);
                tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
            }
        }
    }

    ctx.set_connected(false);
    debug!(generation, "network loop stopped");
}
