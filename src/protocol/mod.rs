//! Wire formats spoken with the IoT Hub
//!
//! Everything here is pure: credential and property-bag scanning, the narrow
//! JSON encoder/decoder for numeric arrays, and topic construction.

pub mod codec;
pub mod credentials;
pub mod properties;
pub mod topics;

pub use codec::{
    decode_numeric_array, decode_numeric_vec, encode_binary, encode_numeric_array,
    encode_telemetry, escape_json_string, NumericDecodeError, PartialDecode,
};
pub use credentials::ConnectionCredentials;
pub use properties::extract_property;
pub use topics::{parse_method_topic, MethodTopic, TopicBuilder};
