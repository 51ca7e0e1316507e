//! Telemetry and method payload codec
//!
//! The hub contract only ever carries arrays of numbers plus a small telemetry
//! envelope, so this is purpose-built text assembly rather than a general JSON
//! serializer. The decoder is a permissive byte scanner.

use std::fmt::Write as _;
use thiserror::Error;

/// Longest numeric token the decoder will consume
const MAX_TOKEN_LEN: usize = 30;

/// The decoder hit a byte that cannot appear in a numeric array
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unexpected byte {byte:#04x} after {decoded} values")]
pub struct NumericDecodeError {
    /// Values successfully decoded before the offending byte
    pub decoded: usize,
    pub byte: u8,
}

/// Values decoded before a fatal scanner error
#[derive(Debug, Clone, PartialEq)]
pub struct PartialDecode {
    pub values: Vec<f64>,
    pub error: NumericDecodeError,
}

/// Encode values as a JSON array in fixed-point notation
///
/// Non-finite values are written as `0.000000` so the output stays valid JSON.
pub fn encode_numeric_array(values: &[f64]) -> String {
    if values.is_empty() {
        return "[]".to_string();
    }

    let mut out = String::with_capacity(values.len() * 12 + 2);
    out.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let value = if value.is_finite() { *value } else { 0.0 };
        let _ = write!(out, "{value:.6}");
    }
    out.push(']');
    out
}

/// Quote and escape a string as a JSON string literal
pub fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Lower-case hex dump of a byte slice
pub fn encode_binary(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Build the telemetry envelope
///
/// The device id is rendered as the hex dump of its little-endian bytes.
pub fn encode_telemetry(device_id: u64, label: &str, values: &[f64]) -> String {
    format!(
        "{{\"device\":\"{}\",\"label\":{},\"values\":{}}}",
        encode_binary(&device_id.to_le_bytes()),
        escape_json_string(label),
        encode_numeric_array(values)
    )
}

fn is_structural(byte: u8) -> bool {
    matches!(byte, b'[' | b']' | b',' | b'\t' | b'\n' | b'\r' | b' ')
}

fn starts_number(byte: u8) -> bool {
    byte.is_ascii_digit() || matches!(byte, b'.' | b'+' | b'-')
}

fn continues_number(byte: u8) -> bool {
    byte.is_ascii_digit() || matches!(byte, b'.' | b'e' | b'E' | b'+' | b'-')
}

/// Parse the longest valid float prefix of a token, `0.0` when there is none
fn parse_token(token: &[u8]) -> f64 {
    let Ok(text) = std::str::from_utf8(token) else {
        return 0.0;
    };
    (1..=text.len())
        .rev()
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Scan a numeric JSON array
///
/// With `dst == None` this only counts elements; with a buffer it also stores
/// them, silently skipping values that do not fit. Both passes return the same
/// count for the same input. A NUL byte ends the input early.
pub fn decode_numeric_array(
    data: &[u8],
    mut dst: Option<&mut [f64]>,
) -> Result<usize, NumericDecodeError> {
    let mut count = 0;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte == 0 {
            break;
        }
        if is_structural(byte) {
            i += 1;
            continue;
        }
        if !starts_number(byte) {
            return Err(NumericDecodeError {
                decoded: count,
                byte,
            });
        }

        let start = i;
        let mut end = i + 1;
        while end - start < MAX_TOKEN_LEN && end < data.len() && continues_number(data[end]) {
            end += 1;
        }

        if let Some(slot) = dst.as_deref_mut().and_then(|buf| buf.get_mut(count)) {
            *slot = parse_token(&data[start..end]);
        }
        count += 1;
        i = end;
    }

    Ok(count)
}

/// Count-then-extract convenience over [`decode_numeric_array`]
pub fn decode_numeric_vec(data: &[u8]) -> Result<Vec<f64>, PartialDecode> {
    let (count, error) = match decode_numeric_array(data, None) {
        Ok(count) => (count, None),
        Err(error) => (error.decoded, Some(error)),
    };

    let mut values = vec![0.0; count];
    // The second pass stops at the same byte, so its result carries no news
    let _ = decode_numeric_array(data, Some(&mut values));

    match error {
        None => Ok(values),
        Some(error) => Err(PartialDecode { values, error }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_numeric_array(&[]), "[]");
    }

    #[test]
    fn test_encode_fixed_point() {
        assert_eq!(encode_numeric_array(&[1.0, 2.5]), "[1.000000,2.500000]");
        assert_eq!(encode_numeric_array(&[-0.125]), "[-0.125000]");
    }

    #[test]
    fn test_encode_non_finite_stays_valid_json() {
        let encoded = encode_numeric_array(&[f64::NAN, f64::INFINITY, 3.0]);
        assert_eq!(encoded, "[0.000000,0.000000,3.000000]");
        assert!(serde_json::from_str::<Vec<f64>>(&encoded).is_ok());
    }

    #[test]
    fn test_escape_json_string() {
        assert_eq!(escape_json_string("temp"), "\"temp\"");
        assert_eq!(escape_json_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(escape_json_string("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(escape_json_string("\u{1}"), "\"\\u0001\"");
    }

    #[test]
    fn test_escaped_strings_parse_back() {
        for s in ["plain", "quo\"te", "back\\slash", "tab\there", "ünïcødé", "\u{7}"] {
            let parsed: String = serde_json::from_str(&escape_json_string(s)).unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(&[]), "");
        assert_eq!(encode_binary(&[0x00, 0xab, 0x10]), "00ab10");
    }

    #[test]
    fn test_telemetry_envelope() {
        let msg = encode_telemetry(0x0102030405060708, "temp", &[21.5]);
        assert_eq!(
            msg,
            "{\"device\":\"0807060504030201\",\"label\":\"temp\",\"values\":[21.500000]}"
        );

        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["label"], "temp");
        assert_eq!(parsed["values"][0], 21.5);
    }

    #[test]
    fn test_decode_simple() {
        assert_eq!(decode_numeric_vec(b"[1.0, 2.5]").unwrap(), vec![1.0, 2.5]);
        assert_eq!(decode_numeric_vec(b"[]").unwrap(), Vec::<f64>::new());
        assert_eq!(decode_numeric_vec(b"").unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_decode_exponents_and_signs() {
        assert_eq!(
            decode_numeric_vec(b"[-1e3,+2.5E-1,\n\t7]").unwrap(),
            vec![-1000.0, 0.25, 7.0]
        );
    }

    #[test]
    fn test_decode_bare_numbers_without_brackets() {
        assert_eq!(decode_numeric_vec(b"1 2 3").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_decode_stops_at_nul() {
        assert_eq!(decode_numeric_vec(b"[1,2]\0garbage").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_decode_reports_partial_result() {
        let partial = decode_numeric_vec(b"[1,2,\"x\",3]").unwrap_err();
        assert_eq!(partial.values, vec![1.0, 2.0]);
        assert_eq!(partial.error.decoded, 2);
        assert_eq!(partial.error.byte, b'"');
    }

    #[test]
    fn test_decode_count_only_matches_extract() {
        let input = b"[0.5, -3, 4e2, 7]";
        let count = decode_numeric_array(input, None).unwrap();
        let mut buf = vec![0.0; count];
        let extracted = decode_numeric_array(input, Some(&mut buf)).unwrap();

        assert_eq!(count, 4);
        assert_eq!(count, extracted);
        assert_eq!(buf, vec![0.5, -3.0, 400.0, 7.0]);
    }

    #[test]
    fn test_decode_small_buffer_counts_everything() {
        let mut buf = [0.0; 1];
        let count = decode_numeric_array(b"[9,8,7]", Some(&mut buf)).unwrap();
        assert_eq!(count, 3);
        assert_eq!(buf, [9.0]);
    }

    #[test]
    fn test_decode_malformed_tokens_read_like_atof() {
        // "1e" keeps its valid prefix, a lone "-" reads as zero
        assert_eq!(decode_numeric_vec(b"[1e,-]").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_decode_splits_overlong_tokens() {
        let long = "1".repeat(35);
        let values = decode_numeric_vec(long.as_bytes()).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_roundtrip_is_idempotent() {
        let values = vec![1.0, 2.5, -17.25, 0.0];
        let encoded = encode_numeric_array(&values);
        let decoded = decode_numeric_vec(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(encode_numeric_array(&decoded), encoded);
    }
}
