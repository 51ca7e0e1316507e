//! Commands serviced for the device bus

use super::status::ConnectionStatus;

/// Request from the device-bus layer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Raw connection string; empty clears stored credentials
    SetCredentials(Vec<u8>),
    Connect,
    Disconnect,
    GetHubName,
    GetDeviceId,
    GetStatus,
    GetPushPeriod,
    GetWatchdogPeriod,
    SetPushPeriod(u32),
    SetWatchdogPeriod(u32),
    /// Push a labelled value set as telemetry
    Upload { label: String, values: Vec<f64> },
}

/// Synchronous acknowledgment of a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Ack,
    /// Register string; empty when unset
    Text(String),
    Status(ConnectionStatus),
    /// Register value in milliseconds after clamping
    Period(u32),
}
