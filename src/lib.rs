//! IoT Hub connectivity adapter
//!
//! Keeps a single outbound MQTT session from a device to an IoT Hub and turns
//! local telemetry and remote method calls into topic/payload exchanges.
//!
//! # Overview
//!
//! - [`protocol`] - connection-string parsing, the numeric-array codec and topics
//! - [`adapter`] - the connection state machine, publish gateway and watchdog
//! - [`transport`] - the session abstraction and its `rumqttc` implementation
//! - [`device`] - link probing, credential storage, indicator and restart hooks
//! - [`runtime`] - the single-consumer loop driving the adapter
//!
//! # Quick Start
//!
//! ```rust
//! use iothub_adapter::protocol::{encode_telemetry, ConnectionCredentials};
//!
//! let credentials = ConnectionCredentials::parse(
//!     b"HostName=myhub.azure-devices.net;DeviceId=sensor-1;SharedAccessKey=c2VjcmV0",
//! )
//! .unwrap();
//! assert_eq!(credentials.hub_name(), "myhub.azure-devices.net");
//! assert_eq!(credentials.device_id(), "sensor-1");
//!
//! let message = encode_telemetry(1, "temp", &[21.5]);
//! assert_eq!(
//!     message,
//!     r#"{"device":"0100000000000000","label":"temp","values":[21.500000]}"#
//! );
//! ```

pub mod adapter;
pub mod config;
pub mod device;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod runtime;
pub mod testing;
pub mod transport;

pub use adapter::{
    AdapterOptions, CloudAdapter, CloudApi, Command, CommandResponse, ConnectionStatus,
    PendingMethodCall, Timing,
};
pub use config::{AdapterConfig, ConfigError};
pub use error::{AdapterError, AdapterResult};
pub use runtime::{AdapterHandle, AdapterRuntime, AggregationBuffer, MethodTable};
pub use transport::{MqttTransport, TransportEvent};
