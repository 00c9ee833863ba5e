/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }
    bytes
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders a wire frame for logs: ASCII frames as text with control bytes
/// escaped, anything else as hex pairs.
pub(crate) fn format_frame(frame: &[u8]) -> String {
    if !frame.is_ascii() {
        return format_hex(frame);
    }
    frame.escape_ascii().to_string()
}

/// Formats an optional value for table cells.
pub(crate) fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}
