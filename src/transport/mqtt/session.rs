//! MQTT session backed by `rumqttc`
//!
//! Each [`MqttSession`] owns the `AsyncClient` used for non-blocking publishes
//! and a spawned worker that polls the `EventLoop`. The worker turns broker
//! traffic into [`TransportEvent`]s on the channel handed out by
//! [`MqttTransport::new`]; it never touches adapter state.

use super::options::configure_mqtt_options;
use crate::protocol::TopicBuilder;
use crate::transport::{Session, SessionConfig, Transport, TransportError, TransportEvent};
use rumqttc::{AsyncClient, ClientError, ConnectionError, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, trace, warn, Instrument};

/// Time allowed for a replaced or closed connection to flush its DISCONNECT
const RETIRE_TIMEOUT: Duration = Duration::from_secs(1);

/// Factory for MQTT sessions sharing one event channel
pub struct MqttTransport {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    reconnect_delay: Duration,
    queue_capacity: usize,
}

impl MqttTransport {
    /// Create the transport and the receiver its sessions report to
    pub fn new(
        reconnect_delay: Duration,
        queue_capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                events_tx,
                reconnect_delay,
                queue_capacity: queue_capacity.max(1),
            },
            events_rx,
        )
    }
}

impl Transport for MqttTransport {
    type Session = MqttSession;

    fn open(&mut self, config: SessionConfig) -> Result<Self::Session, TransportError> {
        configure_mqtt_options(&config)?;
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            events_tx: self.events_tx.clone(),
            commands_rx,
            active: None,
            resume_at: None,
            reconnect_delay: self.reconnect_delay,
        };
        let span = crate::mqtt_span!(client_id = %config.client_id);
        handle.spawn(worker.run().instrument(span));

        let mut session = MqttSession {
            config,
            client: None,
            commands_tx,
            queue_capacity: self.queue_capacity,
        };
        session.reconnect()?;
        Ok(session)
    }
}

enum WorkerCommand {
    /// Replace the current connection with a fresh one
    Attach {
        client: AsyncClient,
        eventloop: EventLoop,
    },
    /// Disconnect and stay idle
    Detach,
}

/// Handle to a running MQTT session
pub struct MqttSession {
    config: SessionConfig,
    client: Option<AsyncClient>,
    commands_tx: mpsc::UnboundedSender<WorkerCommand>,
    queue_capacity: usize,
}

impl MqttSession {
    fn command(&self, command: WorkerCommand) -> Result<(), TransportError> {
        self.commands_tx
            .send(command)
            .map_err(|_| TransportError::SessionClosed)
    }
}

impl Session for MqttSession {
    fn reconfigure(&mut self, config: SessionConfig) -> Result<(), TransportError> {
        configure_mqtt_options(&config)?;
        self.config = config;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let options = configure_mqtt_options(&self.config)?;
        let (client, eventloop) = AsyncClient::new(options, self.queue_capacity);
        self.command(WorkerCommand::Attach {
            client: client.clone(),
            eventloop,
        })?;
        self.client = Some(client);
        debug!("Requested handshake with {}", self.config.uri);
        Ok(())
    }

    fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::SessionClosed)?;
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| match e {
                ClientError::TryRequest(_) => TransportError::QueueFull,
                other => TransportError::Client(other.to_string()),
            })
    }

    fn close(&mut self) {
        self.client = None;
        if self.command(WorkerCommand::Detach).is_err() {
            debug!("Session worker already stopped");
        }
    }
}

struct ActiveConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    acknowledged: bool,
}

impl ActiveConnection {
    /// Let the broker see a clean DISCONNECT before the socket goes away
    fn retire(self) {
        let ActiveConnection {
            client,
            mut eventloop,
            acknowledged,
        } = self;
        if !acknowledged {
            return;
        }
        if client.try_disconnect().is_err() {
            return;
        }
        tokio::spawn(async move {
            let drained = timeout(RETIRE_TIMEOUT, async {
                while eventloop.poll().await.is_ok() {}
            })
            .await;
            if drained.is_err() {
                debug!("Retired connection did not close within {:?}", RETIRE_TIMEOUT);
            }
        });
    }
}

struct SessionWorker {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    commands_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    active: Option<ActiveConnection>,
    /// Set after a connection error; polling pauses until then
    resume_at: Option<Instant>,
    reconnect_delay: Duration,
}

async fn poll_active(active: &mut Option<ActiveConnection>) -> Result<Event, ConnectionError> {
    match active {
        Some(connection) => connection.eventloop.poll().await,
        None => std::future::pending().await,
    }
}

impl SessionWorker {
    async fn run(mut self) {
        loop {
            let polling = self.active.is_some() && self.resume_at.is_none();
            let resume_at = self.resume_at;

            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = poll_active(&mut self.active), if polling => self.handle_poll(event),
                _ = sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() => {
                    self.resume_at = None;
                }
            }
        }

        if let Some(connection) = self.active.take() {
            connection.retire();
        }
        debug!("MQTT session worker stopped");
    }

    fn emit(&self, event: TransportEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Attach { client, eventloop } => {
                if let Some(previous) = self.active.take() {
                    previous.retire();
                }
                self.active = Some(ActiveConnection {
                    client,
                    eventloop,
                    acknowledged: false,
                });
                self.resume_at = None;
            }
            WorkerCommand::Detach => {
                if let Some(previous) = self.active.take() {
                    previous.retire();
                }
                self.resume_at = None;
                info!("MQTT session closed");
                self.emit(TransportEvent::Disconnected);
            }
        }
    }

    fn handle_poll(&mut self, event: Result<Event, ConnectionError>) {
        match event {
            Ok(Event::Incoming(packet)) => self.handle_incoming(packet),
            Ok(Event::Outgoing(outgoing)) => trace!("MQTT outgoing: {:?}", outgoing),
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                if let Some(connection) = self.active.as_mut() {
                    connection.acknowledged = false;
                }
                self.resume_at = Some(Instant::now() + self.reconnect_delay);
                self.emit(TransportEvent::Disconnected);
            }
        }
    }

    fn handle_incoming(&mut self, packet: Packet) {
        match packet {
            Packet::ConnAck(_) => {
                info!("MQTT connection acknowledged");
                if let Some(connection) = self.active.as_mut() {
                    connection.acknowledged = true;
                    let filter = TopicBuilder::method_subscription();
                    if let Err(e) = connection.client.try_subscribe(filter.clone(), QoS::AtMostOnce)
                    {
                        warn!("Failed to subscribe to {}: {}", filter, e);
                    }
                }
                self.emit(TransportEvent::Connected);
            }
            Packet::Publish(publish) => {
                trace!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT publish received"
                );
                self.emit(TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                });
            }
            Packet::Disconnect => {
                info!("Broker sent DISCONNECT");
                if let Some(connection) = self.active.as_mut() {
                    connection.acknowledged = false;
                }
                self.emit(TransportEvent::Disconnected);
            }
            other => trace!("MQTT incoming: {:?}", other),
        }
    }
}
