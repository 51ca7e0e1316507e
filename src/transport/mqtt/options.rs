//! Session configuration to `rumqttc` options

use crate::transport::{SessionConfig, TransportError};
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use url::Url;

pub const MQTT_PORT: u16 = 1883;
pub const MQTTS_PORT: u16 = 8883;

/// Largest packet accepted from or sent to the hub
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Build MQTT 3.1.1 `rumqttc` options for a session
///
/// `mqtts://` selects TLS with the platform roots and port 8883 unless the
/// URI names a port.
pub fn configure_mqtt_options(config: &SessionConfig) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&config.uri).map_err(|_| TransportError::InvalidUri(config.uri.clone()))?;

    let tls = match url.scheme() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        _ => return Err(TransportError::InvalidUri(config.uri.clone())),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::InvalidUri(config.uri.clone()))?;
    let port = url.port().unwrap_or(if tls { MQTTS_PORT } else { MQTT_PORT });

    let mut mqtt_options = MqttOptions::new(config.client_id.clone(), host, port);
    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }
    mqtt_options.set_credentials(config.username.clone(), config.password.clone());
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    Ok(mqtt_options)
}
