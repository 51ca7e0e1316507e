//! IoT Hub topic construction and parsing
//!
//! Topic layouts are fixed by the hub and must be preserved bit-exact.

use super::properties::extract_property;

pub const METHODS_PREFIX: &str = "$iothub/methods";
pub const CORRELATION_KEY: &str = "$rid";

/// Topic construction functions
pub struct TopicBuilder;

impl TopicBuilder {
    /// Device-to-cloud telemetry: `devices/{device_id}/messages/events/`
    pub fn telemetry_topic(device_id: &str) -> String {
        format!("devices/{device_id}/messages/events/")
    }

    /// Method response: `$iothub/methods/res/{status}/?$rid={correlation_id}`
    pub fn method_response_topic(status: u32, correlation_id: &str) -> String {
        format!("{METHODS_PREFIX}/res/{status}/?{CORRELATION_KEY}={correlation_id}")
    }

    /// Subscription filter for inbound method invocations
    pub fn method_subscription() -> String {
        format!("{METHODS_PREFIX}/POST/#")
    }
}

/// Method label and correlation id carried by an inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTopic {
    pub label: String,
    pub correlation_id: String,
}

/// Parse `$iothub/methods/POST/{label}/?$rid={id}`
///
/// The label is the path segment after `POST/`; the correlation id is read
/// from the query string with the property-bag scanner. Returns `None` for
/// any other topic or when either part is missing.
pub fn parse_method_topic(topic: &str) -> Option<MethodTopic> {
    let rest = topic.strip_prefix(METHODS_PREFIX)?.strip_prefix("/POST/")?;
    let (path, query) = rest.split_once('?')?;
    let label = path.split('/').next().filter(|label| !label.is_empty())?;
    let correlation_id =
        extract_property(query.as_bytes(), CORRELATION_KEY).filter(|rid| !rid.is_empty())?;

    Some(MethodTopic {
        label: label.to_string(),
        correlation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_topic() {
        assert_eq!(
            TopicBuilder::telemetry_topic("dev1"),
            "devices/dev1/messages/events/"
        );
    }

    #[test]
    fn test_method_response_topic_is_bit_exact() {
        assert_eq!(
            TopicBuilder::method_response_topic(200, "42"),
            "$iothub/methods/res/200/?$rid=42"
        );
        assert_eq!(
            TopicBuilder::method_response_topic(404, "abc"),
            "$iothub/methods/res/404/?$rid=abc"
        );
    }

    #[test]
    fn test_method_subscription() {
        assert_eq!(TopicBuilder::method_subscription(), "$iothub/methods/POST/#");
    }

    #[test]
    fn test_parse_method_topic() {
        let parsed = parse_method_topic("$iothub/methods/POST/reboot/?$rid=7").unwrap();
        assert_eq!(parsed.label, "reboot");
        assert_eq!(parsed.correlation_id, "7");
    }

    #[test]
    fn test_parse_method_topic_without_trailing_slash() {
        let parsed = parse_method_topic("$iothub/methods/POST/blink?$rid=1").unwrap();
        assert_eq!(parsed.label, "blink");
        assert_eq!(parsed.correlation_id, "1");
    }

    #[test]
    fn test_parse_rejects_other_topics() {
        assert_eq!(parse_method_topic("devices/dev1/messages/devicebound/x"), None);
        assert_eq!(parse_method_topic("$iothub/twin/res/200/?$rid=1"), None);
        assert_eq!(parse_method_topic("$iothub/methods/POST/reboot/"), None);
        assert_eq!(parse_method_topic("$iothub/methods/POST//?$rid=1"), None);
        assert_eq!(parse_method_topic("$iothub/methods/POST/x/?other=1"), None);
    }

    #[test]
    fn test_response_topic_parses_with_same_scanner() {
        let topic = TopicBuilder::method_response_topic(200, "99");
        let (_, query) = topic.split_once('?').unwrap();
        assert_eq!(
            extract_property(query.as_bytes(), CORRELATION_KEY).as_deref(),
            Some("99")
        );
    }
}
