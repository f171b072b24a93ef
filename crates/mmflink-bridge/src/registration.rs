//! Device registration and reset.

use mmflink_core::config::FIRMWARE_VERSION;
use mmflink_core::event::HostEvent;
use mmflink_storage::Registration;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::api::RegistrationRequest;
use crate::error::Result;
use crate::session::BridgeSession;

const SYS_NET: &str = "/sys/class/net";

/// What a successful registration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// The service issued a different token; the session was rebuilt.
    pub token_changed: bool,
    pub qr_image_url: String,
}

impl BridgeSession {
    /// Register this device under `manufacturer`/`model`.
    ///
    /// A token different from the stored one persists the new registration,
    /// tears the broker session down, reconnects and restarts status
    /// reports. The QR image URL is published either way. A failed call
    /// publishes the error and changes nothing.
    pub async fn register(&self, manufacturer: &str, model: &str) -> Result<RegistrationOutcome> {
        let serial_number = self
            .settings
            .ensure_serial(|| uuid::Uuid::new_v4().to_string())?;

        let request = RegistrationRequest {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            firmware_version: FIRMWARE_VERSION.to_string(),
            serial_number,
            mac_address: hardware_id(),
        };

        let response = match self.api.register(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(manufacturer, model, "Registration failed: {}", e);
                self.events.publish(e.host_event());
                return Err(e.into());
            }
        };

        let token_changed = response.printer_token != self.identity.read().token;
        if token_changed {
            // Persist before teardown; on failure the live session stays up.
            self.settings.set_registration(&Registration {
                token: response.printer_token.clone(),
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
            })?;
            self.disconnect(true).await;
            self.reload_identity()?;
            self.connect().await?;
            self.reporter.start();
            info!(manufacturer, model, "printer registered");
        }

        self.events.publish(HostEvent::QrImageUrl {
            url: response.qr_image_url.clone(),
        });

        Ok(RegistrationOutcome {
            token_changed,
            qr_image_url: response.qr_image_url,
        })
    }

    /// Clear the registration and drop the broker session.
    ///
    /// Always drops the in-memory registration and publishes
    /// `printer_removed`, even when clearing the stored settings fails.
    pub async fn forget(&self) -> Result<()> {
        let cleared = self.settings.clear_registration();
        if let Err(e) = &cleared {
            warn!("Failed to clear stored registration: {}", e);
        }
        self.identity.write().clear_registration();
        self.disconnect(true).await;
        self.events.publish(HostEvent::PrinterRemoved);
        info!("printer registration removed");
        cleared.map_err(Into::into)
    }
}

/// This host's hardware address as `XX:XX:XX:XX:XX:XX`, upper-case.
///
/// Taken from the first non-loopback interface. Hosts without one get a
/// random address with the multicast bit set, stable for the process.
pub fn hardware_id() -> String {
    static NODE: OnceLock<[u8; 6]> = OnceLock::new();
    let node = NODE.get_or_init(|| system_mac(Path::new(SYS_NET)).unwrap_or_else(random_node));
    format_mac(node)
}

pub fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut bytes = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in bytes.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(bytes)
}

fn system_mac(root: &Path) -> Option<[u8; 6]> {
    let mut entries: Vec<_> = std::fs::read_dir(root).ok()?.flatten().collect();
    entries.sort_by_key(|entry| entry.file_name());

    entries
        .iter()
        .filter(|entry| entry.file_name() != "lo")
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("address")).ok())
        .filter_map(|text| parse_mac(&text))
        .find(|mac| mac.iter().any(|b| *b != 0))
}

fn random_node() -> [u8; 6] {
    let mut node: [u8; 6] = rand::random();
    node[0] |= 0x01;
    node
}
