//! Connection string parsing
//!
//! An IoT Hub device connection string is a property bag carrying
//! `HostName`, `DeviceId` and `SharedAccessKey`.

use super::properties::extract_property;
use crate::error::{AdapterError, AdapterResult};
use std::fmt;

pub const HOST_NAME_KEY: &str = "HostName";
pub const DEVICE_ID_KEY: &str = "DeviceId";
pub const SHARED_ACCESS_KEY: &str = "SharedAccessKey";

/// Hub name, device id and shared key, always present together
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionCredentials {
    hub_name: String,
    device_id: String,
    shared_key: String,
}

impl ConnectionCredentials {
    /// Parse a raw connection string
    ///
    /// Fails with `InvalidCredentials` when any of the three fields is missing
    /// or empty. Nothing extracted before the failure survives the call.
    pub fn parse(raw: &[u8]) -> AdapterResult<Self> {
        let field = |key: &str| extract_property(raw, key).filter(|value| !value.is_empty());

        match (
            field(HOST_NAME_KEY),
            field(DEVICE_ID_KEY),
            field(SHARED_ACCESS_KEY),
        ) {
            (Some(hub_name), Some(device_id), Some(shared_key)) => Ok(Self {
                hub_name,
                device_id,
                shared_key,
            }),
            (hub_name, device_id, shared_key) => {
                let missing: Vec<&str> = [
                    (HOST_NAME_KEY, hub_name.is_none()),
                    (DEVICE_ID_KEY, device_id.is_none()),
                    (SHARED_ACCESS_KEY, shared_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
                Err(AdapterError::invalid_credentials(format!(
                    "missing {}",
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn shared_key(&self) -> &str {
        &self.shared_key
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("hub_name", &self.hub_name)
            .field("device_id", &self.device_id)
            .field("shared_key", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_string() {
        let creds =
            ConnectionCredentials::parse(b"HostName=h.example;DeviceId=dev1;SharedAccessKey=abc")
                .unwrap();

        assert_eq!(creds.hub_name(), "h.example");
        assert_eq!(creds.device_id(), "dev1");
        assert_eq!(creds.shared_key(), "abc");
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let creds =
            ConnectionCredentials::parse(b"SharedAccessKey=k;DeviceId=d;HostName=h").unwrap();
        assert_eq!(creds.hub_name(), "h");
        assert_eq!(creds.device_id(), "d");
    }

    #[test]
    fn test_missing_field_names_it() {
        let err = ConnectionCredentials::parse(b"HostName=h.example;DeviceId=dev1").unwrap_err();

        assert!(matches!(err, AdapterError::InvalidCredentials { .. }));
        assert!(err.to_string().contains("SharedAccessKey"));
        assert!(!err.to_string().contains("HostName"));
    }

    #[test]
    fn test_empty_field_is_missing() {
        let err =
            ConnectionCredentials::parse(b"HostName=;DeviceId=dev1;SharedAccessKey=abc").unwrap_err();
        assert!(err.to_string().contains("HostName"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ConnectionCredentials::parse(b"not a connection string").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let creds =
            ConnectionCredentials::parse(b"HostName=h;DeviceId=d;SharedAccessKey=topsecret")
                .unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("\"h\""));
    }
}
