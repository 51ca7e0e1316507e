//! Transport layer for the hub session
//!
//! This module provides the transport abstraction the adapter drives and the
//! MQTT implementation used in production. Calls on a [`Session`] never block:
//! results come back later as [`TransportEvent`]s on a channel that feeds the
//! adapter's single consumer loop.

use crate::protocol::ConnectionCredentials;
use std::fmt;
use thiserror::Error;

pub mod mqtt;

/// Default `api-version` appended to the MQTT username
pub const DEFAULT_API_VERSION: &str = "2018-06-30";

/// Parameters for one broker session, derived from connection credentials
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub uri: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
}

impl SessionConfig {
    /// Derive endpoint URI and username from credentials
    ///
    /// `uri = mqtts://{hub}`, `username = {hub}/{urlencoded device}/?api-version={v}`
    pub fn from_credentials(
        credentials: &ConnectionCredentials,
        api_version: &str,
        keep_alive_secs: u64,
    ) -> Self {
        let encoded_device: String =
            url::form_urlencoded::byte_serialize(credentials.device_id().as_bytes()).collect();

        Self {
            uri: format!("mqtts://{}", credentials.hub_name()),
            client_id: credentials.device_id().to_string(),
            username: format!(
                "{}/{}/?api-version={}",
                credentials.hub_name(),
                encoded_device,
                api_version
            ),
            password: credentials.shared_key().to_string(),
            keep_alive_secs,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("uri", &self.uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

/// Events reported asynchronously by a transport session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Connection lost, refused, or closed on request
    Disconnected,
    /// Inbound publish on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker URI: {0}")]
    InvalidUri(String),
    #[error("Outbound queue is full")]
    QueueFull,
    #[error("Session is closed")]
    SessionClosed,
    #[error("No async runtime available to drive the session")]
    NoRuntime,
    #[error("Client error: {0}")]
    Client(String),
}

/// A live broker session
pub trait Session: Send {
    /// Apply new parameters to this session in place
    ///
    /// Takes effect on the next [`Session::reconnect`].
    fn reconfigure(&mut self, config: SessionConfig) -> Result<(), TransportError>;

    /// Drop the current connection, if any, and start a fresh handshake
    fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Enqueue a publish; `Ok` means accepted, not delivered
    fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Request the session to close; completion is reported as `Disconnected`
    fn close(&mut self);
}

/// Factory for broker sessions
pub trait Transport: Send {
    type Session: Session;

    /// Open a session and start connecting; `Connected` arrives later
    fn open(&mut self, config: SessionConfig) -> Result<Self::Session, TransportError>;
}

/// Type alias for the production transport
pub type MqttTransport = mqtt::MqttTransport;
