//! Device identity as seen by the management service.

use serde::{Deserialize, Serialize};

/// Credentials the bridge presents to the broker and the REST API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    /// Broker username.
    pub client_name: String,
    /// Broker password and REST API key.
    pub client_key: String,
}

/// Who this device is.
///
/// Loaded from persisted settings. Only the registration flow writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    /// Token issued by the service on registration. Empty when unregistered.
    pub token: String,
    /// Whether a registration round-trip has completed.
    pub registered: bool,
    pub credentials: ClientCredentials,
}

impl DeviceIdentity {
    /// A device with a token and a completed registration.
    pub fn is_registered(&self) -> bool {
        self.registered && self.has_token()
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// The per-device command topic, `None` while unregistered.
    pub fn command_topic(&self) -> Option<String> {
        if self.is_registered() {
            Some(crate::config::topics::command_topic(&self.token))
        } else {
            None
        }
    }

    /// Drop serial number, token and the registration flag.
    pub fn clear_registration(&mut self) {
        self.serial_number.clear();
        self.token.clear();
        self.registered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_has_no_topic() {
        let identity = DeviceIdentity::default();
        assert!(!identity.is_registered());
        assert_eq!(identity.command_topic(), None);

        // A token without the registration flag is not enough.
        let identity = DeviceIdentity {
            token: "abc".into(),
            ..Default::default()
        };
        assert_eq!(identity.command_topic(), None);
    }

    #[test]
    fn test_registered_topic() {
        let identity = DeviceIdentity {
            token: "abc".into(),
            registered: true,
            ..Default::default()
        };
        assert_eq!(identity.command_topic().as_deref(), Some("/printers/abc"));
    }

    #[test]
    fn test_blank_token_is_unregistered() {
        let identity = DeviceIdentity {
            token: "   ".into(),
            registered: true,
            ..Default::default()
        };
        assert!(!identity.is_registered());
    }

    #[test]
    fn test_clear_registration_keeps_model() {
        let mut identity = DeviceIdentity {
            manufacturer: "Anet".into(),
            model: "anet-a8".into(),
            serial_number: "S-1".into(),
            token: "abc".into(),
            registered: true,
            ..Default::default()
        };
        identity.clear_registration();
        assert!(!identity.is_registered());
        assert!(identity.serial_number.is_empty());
        assert_eq!(identity.model, "anet-a8");
        assert_eq!(identity.command_topic(), None);
    }
}
