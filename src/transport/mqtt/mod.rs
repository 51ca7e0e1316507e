//! MQTT 3.1.1 transport for the hub session
//!
//! - [`options`] - session configuration to `rumqttc` options
//! - [`session`] - the session handle and its event-loop worker
//!
//! Publishes use QoS 0 without retain. On every CONNACK the worker subscribes
//! to the direct-method filter so inbound invocations survive reconnects.

pub mod options;
pub mod session;

pub use options::{configure_mqtt_options, MAX_PACKET_SIZE};
pub use session::{MqttSession, MqttTransport};
