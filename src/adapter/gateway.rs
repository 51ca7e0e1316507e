//! Publish gateway
//!
//! Everything that leaves the device goes through [`CloudAdapter::publish_to`]:
//! it refuses to enqueue unless the session is connected, and every accepted
//! publish feeds the watchdog.

use super::{CloudAdapter, ConnectionStatus};
use crate::device::Blink;
use crate::error::{AdapterError, AdapterResult};
use crate::observability::metrics;
use crate::protocol::{encode_binary, encode_numeric_array, encode_telemetry, TopicBuilder};
use crate::transport::{Session, Transport};
use std::time::Instant;
use tracing::{debug, warn};

/// Largest binary payload callers should hand to [`CloudApi::bin_upload`]
pub const MAX_BIN_UPLOAD_SIZE: usize = 1024;

/// Cloud capabilities offered to telemetry and method producers
pub trait CloudApi {
    /// Publish a labelled value set as a telemetry envelope
    fn upload(&mut self, label: &str, values: &[f64]) -> AdapterResult<()>;

    /// Publish raw bytes as a hex string
    fn bin_upload(&mut self, data: &[u8]) -> AdapterResult<()>;

    fn is_connected(&self) -> bool;

    fn max_bin_upload_size(&self) -> usize {
        MAX_BIN_UPLOAD_SIZE
    }

    /// Answer a method invocation with a status code and result values
    fn respond_method(
        &mut self,
        correlation_id: &str,
        status: u32,
        values: &[f64],
    ) -> AdapterResult<()>;
}

impl<T: Transport> CloudAdapter<T> {
    /// Publish a payload on the telemetry topic
    pub fn publish(&mut self, payload: &[u8]) -> AdapterResult<()> {
        self.publish_owned(payload.to_vec())
    }

    /// Publish a buffer the caller gives up; it is released after the attempt
    pub fn publish_owned(&mut self, payload: Vec<u8>) -> AdapterResult<()> {
        let topic = match self.credentials() {
            Some(credentials) if self.status() == ConnectionStatus::Connected => {
                TopicBuilder::telemetry_topic(credentials.device_id())
            }
            _ => return Err(self.refuse_publish()),
        };
        self.publish_to(&topic, payload)
    }

    /// Publish a payload on an explicit topic
    pub fn publish_to(&mut self, topic: &str, payload: Vec<u8>) -> AdapterResult<()> {
        if self.status() != ConnectionStatus::Connected {
            return Err(self.refuse_publish());
        }
        let Some(session) = self.session.as_mut() else {
            return Err(self.refuse_publish());
        };

        let len = payload.len();
        if let Err(e) = session.send(topic, payload) {
            warn!("Publish to {} rejected: {}", topic, e);
            metrics().publish_failed();
            return Err(AdapterError::TransportRejected(e));
        }

        self.watchdog.feed(Instant::now());
        self.indicator.blink(Blink::Uploaded);
        metrics().message_published();
        debug!(topic = %topic, bytes = len, "publish accepted");
        Ok(())
    }

    fn refuse_publish(&self) -> AdapterError {
        debug!("Publish refused while {}", self.status());
        AdapterError::NotConnected {
            status: self.status(),
        }
    }
}

impl<T: Transport> CloudApi for CloudAdapter<T> {
    fn upload(&mut self, label: &str, values: &[f64]) -> AdapterResult<()> {
        let message = encode_telemetry(self.options().device_id, label, values);
        self.publish_owned(message.into_bytes())
    }

    fn bin_upload(&mut self, data: &[u8]) -> AdapterResult<()> {
        if data.len() > MAX_BIN_UPLOAD_SIZE {
            warn!(
                "Binary upload of {} bytes exceeds advertised limit {}",
                data.len(),
                MAX_BIN_UPLOAD_SIZE
            );
        }
        self.publish_owned(encode_binary(data).into_bytes())
    }

    fn is_connected(&self) -> bool {
        CloudAdapter::is_connected(self)
    }

    fn respond_method(
        &mut self,
        correlation_id: &str,
        status: u32,
        values: &[f64],
    ) -> AdapterResult<()> {
        let topic = TopicBuilder::method_response_topic(status, correlation_id);
        self.publish_to(&topic, encode_numeric_array(values).into_bytes())
    }
}
