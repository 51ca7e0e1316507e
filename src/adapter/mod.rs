//! Connection state machine for the hub session
//!
//! [`CloudAdapter`] is the single owned context object behind every handler:
//! device-bus commands, periodic ticks and transport events all mutate it
//! through `&mut self`, so it never needs internal locking. The runtime loop in
//! [`crate::runtime`] is what serializes those calls.
//!
//! # Transitions
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | Disconnected | tick or connect, with credentials and link | Connecting |
//! | any | credentials cleared | Disconnected |
//! | Connecting | transport connected | Connected |
//! | Connected | transport disconnected | Disconnected |
//! | Connected/Connecting | disconnect command | Disconnecting |
//! | Disconnecting | transport confirms close | Disconnected |

pub mod command;
pub mod gateway;
pub mod status;
pub mod watchdog;

pub use command::{Command, CommandResponse};
pub use gateway::{CloudApi, MAX_BIN_UPLOAD_SIZE};
pub use status::ConnectionStatus;
pub use watchdog::{Timing, Watchdog};

use crate::device::{
    CredentialStore, Glow, Indicator, LinkLayer, LogIndicator, NullCredentialStore,
    ProcessRestart, Restart,
};
use crate::error::{sanitize_secrets, AdapterError, AdapterResult};
use crate::observability::metrics;
use crate::protocol::{decode_numeric_vec, parse_method_topic, ConnectionCredentials};
use crate::transport::{Session, SessionConfig, Transport, TransportEvent, DEFAULT_API_VERSION};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Inbound method invocation decoded from a broker message
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMethodCall {
    pub label: String,
    pub correlation_id: String,
    pub args: Vec<f64>,
}

/// Static settings of an adapter instance
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// 64-bit hardware id reported in telemetry envelopes
    pub device_id: u64,
    pub api_version: String,
    pub keep_alive_secs: u64,
    pub timing: Timing,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            api_version: DEFAULT_API_VERSION.to_string(),
            keep_alive_secs: 60,
            timing: Timing::default(),
        }
    }
}

/// What the runtime should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// The push period elapsed: aggregated telemetry should be flushed
    pub flush_due: bool,
}

/// Single-connection IoT Hub adapter
pub struct CloudAdapter<T: Transport> {
    options: AdapterOptions,
    transport: T,
    session: Option<T::Session>,
    credentials: Option<ConnectionCredentials>,
    status: ConnectionStatus,
    waiting_for_net: bool,
    /// The session was closed on request; late acknowledgments are stale
    closed_by_request: bool,
    timing: Timing,
    watchdog: Watchdog,
    last_flush: Option<Instant>,
    link: Box<dyn LinkLayer>,
    store: Box<dyn CredentialStore>,
    indicator: Box<dyn Indicator>,
    restart: Box<dyn Restart>,
    status_tx: Option<mpsc::UnboundedSender<ConnectionStatus>>,
}

impl<T: Transport> CloudAdapter<T> {
    pub fn new(transport: T, link: Box<dyn LinkLayer>, options: AdapterOptions) -> Self {
        let timing = options.timing;
        Self {
            options,
            transport,
            session: None,
            credentials: None,
            status: ConnectionStatus::Disconnected,
            waiting_for_net: true,
            closed_by_request: false,
            timing,
            watchdog: Watchdog::new(timing.watchdog_period_ms()),
            last_flush: None,
            link,
            store: Box::new(NullCredentialStore),
            indicator: Box::new(LogIndicator::default()),
            restart: Box::new(ProcessRestart),
            status_tx: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_indicator(mut self, indicator: Box<dyn Indicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn with_restart(mut self, restart: Box<dyn Restart>) -> Self {
        self.restart = restart;
        self
    }

    /// Subscribe the device bus to status-change events
    pub fn with_status_sender(mut self, tx: mpsc::UnboundedSender<ConnectionStatus>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn hub_name(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.hub_name())
    }

    pub fn device_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.device_id())
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    pub(crate) fn credentials(&self) -> Option<&ConnectionCredentials> {
        self.credentials.as_ref()
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        info!("status {} ({})", status.code(), status.name());
        metrics().status_transition(self.status, status);
        self.status = status;
        if let Some(tx) = &self.status_tx {
            if tx.send(status).is_err() {
                debug!("Status listener dropped, event not delivered");
            }
        }
    }

    /// Restore credentials persisted by an earlier `set-credentials`
    ///
    /// Returns whether anything was restored.
    pub fn restore_credentials(&mut self) -> AdapterResult<bool> {
        match self.store.load()? {
            Some(blob) if !blob.is_empty() => {
                self.apply_credentials(&blob, false)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Handle `set-credentials`: parse, persist, and reconnect
    ///
    /// An empty payload clears credentials and erases the stored copy.
    pub fn set_credentials(&mut self, raw: &[u8]) -> AdapterResult<()> {
        self.apply_credentials(raw, true)
    }

    fn apply_credentials(&mut self, raw: &[u8], persist: bool) -> AdapterResult<()> {
        if raw.is_empty() {
            info!("clear connection string");
            self.clear_credentials();
            if persist {
                self.store.erase()?;
            }
            return Ok(());
        }

        let credentials = ConnectionCredentials::parse(raw).map_err(|e| {
            warn!(
                "failed parsing conn string: {}",
                sanitize_secrets(&String::from_utf8_lossy(raw))
            );
            e
        })?;

        if persist {
            self.store.save(raw)?;
        }
        self.credentials = Some(credentials);
        self.reconnect()
    }

    fn clear_credentials(&mut self) {
        self.credentials = None;
        if let Some(session) = self.session.as_mut() {
            session.close();
            self.closed_by_request = true;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Handle `connect`: open or reconfigure the session from current credentials
    ///
    /// Without credentials or link this degrades to a disconnect request.
    pub fn reconnect(&mut self) -> AdapterResult<()> {
        let Some(credentials) = self.credentials.as_ref() else {
            self.disconnect();
            return Ok(());
        };
        if !self.link.is_connected() {
            self.disconnect();
            return Ok(());
        }

        let config = SessionConfig::from_credentials(
            credentials,
            &self.options.api_version,
            self.options.keep_alive_secs,
        );
        info!("connecting to {}/{}", config.uri, config.client_id);
        metrics().connection_attempt();

        match self.session.as_mut() {
            Some(session) => {
                session
                    .reconfigure(config)
                    .and_then(|()| session.reconnect())
                    .map_err(AdapterError::SessionOpen)?;
            }
            None => {
                let session = self.transport.open(config).map_err(|e| {
                    error!("Failed to open hub session: {}", e);
                    AdapterError::SessionOpen(e)
                })?;
                self.session = Some(session);
            }
        }

        self.closed_by_request = false;
        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// Handle `disconnect`: request the session to close
    pub fn disconnect(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match self.status {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                session.close();
                self.closed_by_request = true;
                self.set_status(ConnectionStatus::Disconnecting);
            }
            // Stop transport-level retries without touching the register
            ConnectionStatus::Disconnected => {
                session.close();
                self.closed_by_request = true;
            }
            ConnectionStatus::Disconnecting => {}
        }
    }

    /// Apply a new push period (clamped)
    pub fn set_push_period(&mut self, push_period_ms: u32) -> u32 {
        self.apply_timing(self.timing.with_push_period(push_period_ms));
        self.timing.push_period_ms()
    }

    /// Apply a new watchdog period (clamped, zero disables)
    pub fn set_watchdog_period(&mut self, watchdog_period_ms: u32) -> u32 {
        self.apply_timing(self.timing.with_watchdog_period(watchdog_period_ms));
        self.timing.watchdog_period_ms()
    }

    fn apply_timing(&mut self, timing: Timing) {
        self.timing = timing;
        self.watchdog.set_period(timing.watchdog_period_ms());
        self.watchdog.feed(Instant::now());
        debug!(
            push_period_ms = timing.push_period_ms(),
            watchdog_period_ms = timing.watchdog_period_ms(),
            "timing updated"
        );
    }

    /// Periodic tick at a fixed cadence
    ///
    /// Checks the watchdog, shows the status indicator, retries the connection
    /// once per network-availability edge, and reports whether telemetry is due.
    pub fn tick(&mut self, now: Instant) -> AdapterResult<TickOutcome> {
        if self.watchdog.is_expired(now) {
            let period_ms = self.timing.watchdog_period_ms();
            error!("cloud watchdog expired after {}ms, resetting", period_ms);
            metrics().watchdog_reset();
            self.watchdog.disarm();
            self.restart.hard_reset();
            return Err(AdapterError::WatchdogExpired { period_ms });
        }

        if !self.link.is_connected() {
            self.indicator.glow(Glow::ConnectingToNetwork);
            self.waiting_for_net = true;
        } else {
            self.indicator.glow(Glow::for_status(self.status));
            if self.status == ConnectionStatus::Disconnected
                && self.credentials.is_some()
                && self.waiting_for_net
            {
                self.waiting_for_net = false;
                if let Err(e) = self.reconnect() {
                    warn!("Reconnect attempt failed: {}", e);
                }
            }
        }

        let flush_due = match self.last_flush {
            Some(last) => now.saturating_duration_since(last) >= self.timing.push_period(),
            None => true,
        };
        if flush_due {
            self.last_flush = Some(now);
        }

        Ok(TickOutcome { flush_due })
    }

    /// Handle an event reported by the transport session
    ///
    /// Returns a decoded method call when the event is a method invocation.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Option<PendingMethodCall> {
        match event {
            TransportEvent::Connected => {
                let live = self.credentials.is_some() && !self.closed_by_request;
                match self.status {
                    ConnectionStatus::Connecting | ConnectionStatus::Disconnected if live => {
                        metrics().connection_established();
                        self.watchdog.feed(Instant::now());
                        self.set_status(ConnectionStatus::Connected);
                    }
                    ConnectionStatus::Connected => {}
                    _ => {
                        debug!("Ignoring stale connect acknowledgment while {}", self.status);
                    }
                }
                None
            }
            TransportEvent::Disconnected => {
                if self.status == ConnectionStatus::Connected {
                    metrics().connection_lost();
                }
                self.set_status(ConnectionStatus::Disconnected);
                None
            }
            TransportEvent::Message { topic, payload } => self.decode_method_call(&topic, &payload),
        }
    }

    fn decode_method_call(&self, topic: &str, payload: &[u8]) -> Option<PendingMethodCall> {
        let Some(method) = parse_method_topic(topic) else {
            debug!("Ignoring message on topic: {}", topic);
            return None;
        };

        let args = match decode_numeric_vec(payload) {
            Ok(values) => values,
            Err(partial) => {
                warn!(
                    method = %method.label,
                    "invalid num array: {}",
                    partial.error
                );
                partial.values
            }
        };

        info!(
            "method: '{}' rid={} args={}",
            method.label,
            method.correlation_id,
            args.len()
        );
        metrics().method_received();

        Some(PendingMethodCall {
            label: method.label,
            correlation_id: method.correlation_id,
            args,
        })
    }

    /// Service one device-bus command
    pub fn handle_command(&mut self, command: Command) -> AdapterResult<CommandResponse> {
        match command {
            Command::SetCredentials(raw) => {
                self.set_credentials(&raw)?;
                Ok(CommandResponse::Ack)
            }
            Command::Connect => {
                self.reconnect()?;
                Ok(CommandResponse::Ack)
            }
            Command::Disconnect => {
                self.disconnect();
                Ok(CommandResponse::Ack)
            }
            Command::GetHubName => Ok(CommandResponse::Text(
                self.hub_name().unwrap_or_default().to_string(),
            )),
            Command::GetDeviceId => Ok(CommandResponse::Text(
                self.device_id().unwrap_or_default().to_string(),
            )),
            Command::GetStatus => Ok(CommandResponse::Status(self.status)),
            Command::GetPushPeriod => Ok(CommandResponse::Period(self.timing.push_period_ms())),
            Command::GetWatchdogPeriod => {
                Ok(CommandResponse::Period(self.timing.watchdog_period_ms()))
            }
            Command::SetPushPeriod(ms) => Ok(CommandResponse::Period(self.set_push_period(ms))),
            Command::SetWatchdogPeriod(ms) => {
                Ok(CommandResponse::Period(self.set_watchdog_period(ms)))
            }
            Command::Upload { label, values } => {
                self.upload(&label, &values)?;
                Ok(CommandResponse::Ack)
            }
        }
    }
}
