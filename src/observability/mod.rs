//! Observability for the adapter
//!
//! Structured logging through `tracing` and process-wide counters for the
//! connection, publish gateway and watchdog.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{adapter_span, mqtt_span};
