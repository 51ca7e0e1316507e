//! Single-consumer event loop around the adapter
//!
//! [`AdapterRuntime`] owns the [`CloudAdapter`] and serializes everything that
//! touches it: periodic ticks, transport events, device-bus requests and
//! shutdown. Other tasks talk to it through a cloneable [`AdapterHandle`].

use crate::adapter::{CloudAdapter, CloudApi, Command, CommandResponse, PendingMethodCall};
use crate::error::{AdapterError, AdapterResult};
use crate::transport::{Transport, TransportEvent};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

/// Capacity of the request channel between handles and the runtime
const REQUEST_QUEUE: usize = 32;

/// Buffers telemetry between push periods
pub trait TelemetryAggregator: Send {
    fn record(&mut self, label: &str, values: &[f64]);

    /// Called once per push period
    fn flush(&mut self, api: &mut dyn CloudApi);
}

/// Handles inbound method invocations
pub trait MethodDispatcher: Send {
    fn on_method(&mut self, call: PendingMethodCall, api: &mut dyn CloudApi);
}

#[derive(Debug, Default)]
struct Series {
    sums: Vec<f64>,
    samples: u32,
}

/// Aggregator that uploads the element-wise mean of each label's samples
///
/// Samples recorded while offline are kept until a flush succeeds. A sample
/// whose width differs from the buffered ones restarts that label's series.
#[derive(Debug, Default)]
pub struct AggregationBuffer {
    series: BTreeMap<String, Series>,
}

impl AggregationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn pending_labels(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }
}

impl TelemetryAggregator for AggregationBuffer {
    fn record(&mut self, label: &str, values: &[f64]) {
        let series = self.series.entry(label.to_string()).or_default();
        if series.sums.len() != values.len() {
            if series.samples > 0 {
                debug!(label, "sample width changed, restarting series");
            }
            series.sums = vec![0.0; values.len()];
            series.samples = 0;
        }
        for (sum, value) in series.sums.iter_mut().zip(values) {
            *sum += value;
        }
        series.samples += 1;
    }

    fn flush(&mut self, api: &mut dyn CloudApi) {
        if self.series.is_empty() || !api.is_connected() {
            return;
        }

        let labels: Vec<String> = self.series.keys().cloned().collect();
        for label in labels {
            let Some(series) = self.series.get(&label) else {
                continue;
            };
            let count = f64::from(series.samples.max(1));
            let means: Vec<f64> = series.sums.iter().map(|sum| sum / count).collect();

            match api.upload(&label, &means) {
                Ok(()) => {
                    self.series.remove(&label);
                }
                Err(e) => {
                    warn!("Aggregated upload of '{}' failed: {}", label, e);
                    break;
                }
            }
        }
    }
}

/// Result of a method handler: values on success, a status code on failure
pub type MethodResult = Result<Vec<f64>, u32>;

type MethodHandler = Box<dyn FnMut(&[f64]) -> MethodResult + Send>;

/// Dispatcher routing methods by label to registered handlers
///
/// Successful handlers answer with status 200; unknown labels get 404.
#[derive(Default)]
pub struct MethodTable {
    handlers: BTreeMap<String, MethodHandler>,
}

pub const METHOD_OK: u32 = 200;
pub const METHOD_NOT_FOUND: u32 = 404;

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, label: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&[f64]) -> MethodResult + Send + 'static,
    {
        self.handlers.insert(label.into(), Box::new(handler));
        self
    }

    pub fn labels(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl MethodDispatcher for MethodTable {
    fn on_method(&mut self, call: PendingMethodCall, api: &mut dyn CloudApi) {
        let (status, values) = match self.handlers.get_mut(&call.label) {
            Some(handler) => match handler(&call.args) {
                Ok(values) => (METHOD_OK, values),
                Err(status) => (status, Vec::new()),
            },
            None => {
                debug!("No handler for method '{}'", call.label);
                (METHOD_NOT_FOUND, Vec::new())
            }
        };

        if let Err(e) = api.respond_method(&call.correlation_id, status, &values) {
            warn!(
                "Failed to answer method '{}' rid={}: {}",
                call.label, call.correlation_id, e
            );
        }
    }
}

enum Request {
    Command {
        command: Command,
        reply: oneshot::Sender<AdapterResult<CommandResponse>>,
    },
    Record {
        label: String,
        values: Vec<f64>,
    },
}

/// Cloneable handle for talking to a running [`AdapterRuntime`]
#[derive(Clone)]
pub struct AdapterHandle {
    requests_tx: mpsc::Sender<Request>,
}

impl AdapterHandle {
    /// Run a device-bus command and wait for its acknowledgment
    pub async fn execute(&self, command: Command) -> AdapterResult<CommandResponse> {
        let (reply, response) = oneshot::channel();
        self.requests_tx
            .send(Request::Command { command, reply })
            .await
            .map_err(|_| AdapterError::RuntimeStopped)?;
        response.await.map_err(|_| AdapterError::RuntimeStopped)?
    }

    /// Queue a telemetry sample for the next push period
    pub async fn record(&self, label: impl Into<String>, values: Vec<f64>) -> AdapterResult<()> {
        self.requests_tx
            .send(Request::Record {
                label: label.into(),
                values,
            })
            .await
            .map_err(|_| AdapterError::RuntimeStopped)
    }
}

pub struct AdapterRuntime<T: Transport> {
    adapter: CloudAdapter<T>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    requests_rx: mpsc::Receiver<Request>,
    aggregator: Box<dyn TelemetryAggregator>,
    dispatcher: Box<dyn MethodDispatcher>,
    tick_interval: Duration,
}

impl<T: Transport> AdapterRuntime<T> {
    pub fn new(
        adapter: CloudAdapter<T>,
        events_rx: mpsc::UnboundedReceiver<TransportEvent>,
        tick_interval: Duration,
    ) -> (Self, AdapterHandle) {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let runtime = Self {
            adapter,
            events_rx,
            requests_rx,
            aggregator: Box::new(AggregationBuffer::new()),
            dispatcher: Box::new(MethodTable::new()),
            tick_interval,
        };
        (runtime, AdapterHandle { requests_tx })
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn TelemetryAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Box<dyn MethodDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn adapter(&self) -> &CloudAdapter<T> {
        &self.adapter
    }

    /// Drive the adapter until shutdown is signalled
    ///
    /// Returns `WatchdogExpired` if the watchdog fires; the restart capability
    /// has already been invoked by then.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> AdapterResult<()> {
        let span = crate::adapter_span!(tick_ms = self.tick_interval.as_millis() as u64);
        let result = self.run_loop(&mut shutdown).instrument(span).await;
        self.adapter.disconnect();
        info!("Adapter runtime stopped");
        result
    }

    async fn run_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> AdapterResult<()> {
        info!("Adapter runtime started");
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;
        let mut requests_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick() {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!("Tick failed: {}", e);
                    }
                }
                event = self.events_rx.recv(), if events_open => match event {
                    Some(event) => self.on_transport_event(event),
                    None => {
                        warn!("Transport event channel closed");
                        events_open = false;
                    }
                },
                request = self.requests_rx.recv(), if requests_open => match request {
                    Some(request) => self.on_request(request),
                    None => {
                        debug!("All adapter handles dropped");
                        requests_open = false;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn on_tick(&mut self) -> AdapterResult<()> {
        let outcome = self.adapter.tick(Instant::now())?;
        if outcome.flush_due {
            self.aggregator.flush(&mut self.adapter);
        }
        Ok(())
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        if let Some(call) = self.adapter.handle_transport_event(event) {
            self.dispatcher.on_method(call, &mut self.adapter);
        }
    }

    fn on_request(&mut self, request: Request) {
        match request {
            Request::Command { command, reply } => {
                let result = self.adapter.handle_command(command);
                if let Err(e) = &result {
                    debug!("Command failed with code {}: {}", e.code(), e);
                }
                if reply.send(result).is_err() {
                    debug!("Command caller went away before the reply");
                }
            }
            Request::Record { label, values } => self.aggregator.record(&label, &values),
        }
    }
}
