//! Thread-safe metrics collection
//!
//! Atomic counters for the hub connection, the publish gateway, inbound
//! methods and the watchdog. The adapter bumps them from its single context;
//! the CLI reads a [`MetricsSnapshot`] on demand.

use crate::adapter::ConnectionStatus;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    // Connection
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connections_lost: AtomicU64,
    connection_start_time: AtomicU64,
    status_transitions: AtomicU64,

    // Gateway
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    last_publish: AtomicU64,

    methods_received: AtomicU64,
    watchdog_resets: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            status_transitions: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            last_publish: AtomicU64::new(0),
            methods_received: AtomicU64::new(0),
            watchdog_resets: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a connection dropped by the broker or the network
    pub fn connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Track the status register; `connected` follows it on every exit path
    pub fn status_transition(&self, from: ConnectionStatus, to: ConnectionStatus) {
        self.status_transitions.fetch_add(1, Ordering::Relaxed);
        if to == ConnectionStatus::Connected {
            self.connected.store(true, Ordering::Relaxed);
            self.connection_start_time
                .store(current_timestamp(), Ordering::Relaxed);
        } else if from == ConnectionStatus::Connected {
            self.connected.store(false, Ordering::Relaxed);
            self.connection_start_time.store(0, Ordering::Relaxed);
        }
    }

    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.last_publish
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn method_received(&self) {
        self.methods_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn watchdog_reset(&self) {
        self.watchdog_resets.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_duration(&self, now: u64) -> u64 {
        if !self.connected.load(Ordering::Relaxed) {
            return 0;
        }
        match self.connection_start_time.load(Ordering::Relaxed) {
            0 => 0,
            start => now.saturating_sub(start),
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
                status_transitions: self.status_transitions.load(Ordering::Relaxed),
            },
            gateway: GatewayMetrics {
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                last_publish: self.last_publish.load(Ordering::Relaxed),
            },
            methods_received: self.methods_received.load(Ordering::Relaxed),
            watchdog_resets: self.watchdog_resets.load(Ordering::Relaxed),
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub gateway: GatewayMetrics,
    pub methods_received: u64,
    pub watchdog_resets: u64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connections_lost: u64,
    pub connection_duration_seconds: u64,
    pub status_transitions: u64,
}

#[derive(Debug, Serialize)]
pub struct GatewayMetrics {
    pub messages_published: u64,
    pub publish_failures: u64,
    pub last_publish: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
