//! Raw header access for fields `mail-parser` does not model (Gmail labels).

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Everything before the first blank line.
pub fn header_block(message: &[u8]) -> &[u8] {
    let lf = message.windows(2).position(|w| w == b"\n\n");
    let crlf = message.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => &message[..a.min(b)],
        (Some(a), None) | (None, Some(a)) => &message[..a],
        (None, None) => message,
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            result.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

/// First value for a header name. `name` must be lowercase.
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Unfolded `(lowercase_name, value)` pairs of a raw message's header block.
pub fn raw_headers(message: &[u8]) -> Vec<(String, String)> {
    unfold_headers(&decode_header_bytes(header_block(message)))
}

/// Comma-separated `X-Gmail-Labels` values.
pub fn gmail_labels(headers: &[(String, String)]) -> Vec<String> {
    get_header(headers, "x-gmail-labels")
        .map(|value| {
            value
                .split(',')
                .map(|l| l.trim().trim_matches('"').to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
