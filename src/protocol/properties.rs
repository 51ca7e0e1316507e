//! Property-bag scanning
//!
//! A property bag is a list of `key=value` segments separated by `;`. There is
//! no escaping and no nesting. The same rule parses connection strings and the
//! query segment of inbound method topics.

/// Extract the value stored under `key` from a property bag
///
/// The slice length is authoritative: the buffer need not be NUL-terminated and
/// nothing past its end is read. The first matching segment wins. Keys that are
/// empty or contain `=` or `;` can never match and yield `None`.
pub fn extract_property(bag: &[u8], key: &str) -> Option<String> {
    if key.is_empty() || key.contains(['=', ';']) {
        return None;
    }

    bag.split(|&b| b == b';').find_map(|segment| {
        segment
            .strip_prefix(key.as_bytes())?
            .strip_prefix(b"=")
            .map(|value| String::from_utf8_lossy(value).into_owned())
    })
}
