//! Mock implementations for testing
//!
//! Provides mock Transport, LinkLayer, CredentialStore, Indicator and Restart
//! implementations so the adapter can be driven without a broker or hardware.
//! Every mock is `Clone` and shares its recorded state, so a test keeps one
//! handle while the adapter owns the other.

use crate::device::{Blink, CredentialStore, Glow, Indicator, LinkLayer, Restart, StorageError};
use crate::transport::{Session, SessionConfig, Transport, TransportError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type SentMessage = (String, Vec<u8>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct TransportLog {
    opened: Vec<SessionConfig>,
    reconfigured: Vec<SessionConfig>,
    reconnects: usize,
    sent: Vec<SentMessage>,
    closes: usize,
}

/// Mock transport recording every session call
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
    pub should_fail_open: Arc<AtomicBool>,
    pub should_reject_sends: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_failure() -> Self {
        let transport = Self::default();
        transport.should_fail_open.store(true, Ordering::SeqCst);
        transport
    }

    pub fn reject_sends(&self, reject: bool) {
        self.should_reject_sends.store(reject, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<SessionConfig> {
        lock(&self.log).opened.clone()
    }

    pub fn reconfigured(&self) -> Vec<SessionConfig> {
        lock(&self.log).reconfigured.clone()
    }

    pub fn reconnect_count(&self) -> usize {
        lock(&self.log).reconnects
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.log).sent.clone()
    }

    pub fn close_count(&self) -> usize {
        lock(&self.log).closes
    }

    pub fn clear_history(&self) {
        *lock(&self.log) = TransportLog::default();
    }
}

impl Transport for MockTransport {
    type Session = MockSession;

    fn open(&mut self, config: SessionConfig) -> Result<Self::Session, TransportError> {
        if self.should_fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Client("Mock open failure".to_string()));
        }
        lock(&self.log).opened.push(config);
        Ok(MockSession {
            log: Arc::clone(&self.log),
            should_reject_sends: Arc::clone(&self.should_reject_sends),
        })
    }
}

/// Session handed out by [`MockTransport`]
#[derive(Debug)]
pub struct MockSession {
    log: Arc<Mutex<TransportLog>>,
    should_reject_sends: Arc<AtomicBool>,
}

impl Session for MockSession {
    fn reconfigure(&mut self, config: SessionConfig) -> Result<(), TransportError> {
        lock(&self.log).reconfigured.push(config);
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        lock(&self.log).reconnects += 1;
        Ok(())
    }

    fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.should_reject_sends.load(Ordering::SeqCst) {
            return Err(TransportError::QueueFull);
        }
        lock(&self.log).sent.push((topic.to_string(), payload));
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.log).closes += 1;
    }
}

/// Link layer whose state is flipped by the test
#[derive(Debug, Clone)]
pub struct MockLink {
    connected: Arc<AtomicBool>,
}

impl MockLink {
    pub fn up() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn down() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl LinkLayer for MockLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// In-memory credential store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: &[u8]) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.to_vec()))),
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        lock(&self.blob).clone()
    }
}

impl CredentialStore for MemoryStore {
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError> {
        *lock(&self.blob) = Some(blob.to_vec());
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        *lock(&self.blob) = None;
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(lock(&self.blob).clone())
    }
}

/// Indicator recording every pattern shown
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    glows: Arc<Mutex<Vec<Glow>>>,
    blinks: Arc<Mutex<Vec<Blink>>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_glow(&self) -> Option<Glow> {
        lock(&self.glows).last().copied()
    }

    pub fn blinks(&self) -> Vec<Blink> {
        lock(&self.blinks).clone()
    }
}

impl Indicator for RecordingIndicator {
    fn glow(&mut self, glow: Glow) {
        lock(&self.glows).push(glow);
    }

    fn blink(&mut self, blink: Blink) {
        lock(&self.blinks).push(blink);
    }
}

/// Restart that only counts invocations
#[derive(Debug, Clone, Default)]
pub struct MockRestart {
    count: Arc<AtomicUsize>,
}

impl MockRestart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Restart for MockRestart {
    fn hard_reset(&mut self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
