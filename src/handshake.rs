use std::collections::HashMap;
use std::time::SystemTime;

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::errors::WsError;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header mapping parsed from a raw request head.
///
/// Names are kept in the mixed case they arrived in and looked up by
/// exact name; a duplicated name collapses to the last value seen.
#[derive(Debug, Clone, Default)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    /// parse a `\r\n` separated header block
    ///
    /// Each line is split on its first `:` with both sides trimmed;
    /// lines without a colon are skipped.
    pub fn parse(head: &str) -> Self {
        let mut map = HashMap::new();
        for line in head.split("\r\n") {
            if let Some((name, value)) = line.split_once(':') {
                map.insert(name.trim().to_owned(), value.trim().to_owned());
            }
        }
        Self(map)
    }

    /// look up a header by exact name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// whether a header with this exact name is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// insert a header, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

/// split a request line into `(verb, location, version)`
///
/// Anything other than exactly three space-separated tokens is malformed.
pub(crate) fn parse_request_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(verb), Some(location), Some(version), None) => Some((verb, location, version)),
        _ => None,
    }
}

/// whether a set of headers is asking for WebSockets
pub fn is_websocket(headers: &Headers) -> bool {
    let connection = headers.get("Connection").unwrap_or_default().to_lowercase();
    let upgrade = headers.get("Upgrade").unwrap_or_default();
    connection.contains("upgrade") && upgrade.eq_ignore_ascii_case("websocket")
}

/// whether a set of headers is HyBi-00 compliant
///
/// Hixie-76 and HyBi-00 hand the server a pair of keys instead of
/// `Sec-WebSocket-Version`.
pub fn is_hybi00(headers: &Headers) -> bool {
    headers.contains("Sec-WebSocket-Key1") && headers.contains("Sec-WebSocket-Key2")
}

/// compute the `Sec-WebSocket-Accept` value for a client key
pub fn make_accept(key: &str) -> String {
    let mut sha1 = Sha1::default();
    sha1.update(key.as_bytes());
    sha1.update(GUID);
    base64::encode(sha1.finalize())
}

/// extract the number hidden in a HyBi-00 key
///
/// The concatenated ASCII digits form a decimal integer which is floor
/// divided by the number of space characters. A key without spaces or
/// digits, or one whose quotient does not fit an u32, is a handshake
/// failure.
fn key_number(key: &str) -> Result<u32, WsError> {
    let mut digits: u64 = 0;
    let mut any = false;
    for c in key.chars() {
        if let Some(d) = c.to_digit(10) {
            any = true;
            digits = digits
                .checked_mul(10)
                .and_then(|n| n.checked_add(u64::from(d)))
                .ok_or_else(|| WsError::HandshakeFailed(format!("oversized key {key:?}")))?;
        }
    }
    if !any {
        return Err(WsError::HandshakeFailed(format!("no digits in key {key:?}")));
    }
    let spaces = key.bytes().filter(|&b| b == b' ').count() as u64;
    if spaces == 0 {
        return Err(WsError::HandshakeFailed(format!("no spaces in key {key:?}")));
    }
    u32::try_from(digits / spaces)
        .map_err(|_| WsError::HandshakeFailed(format!("oversized key {key:?}")))
}

/// generate the response digest for a HyBi-00 challenge
pub fn complete_hybi00(key1: &str, key2: &str, challenge: [u8; 8]) -> Result<[u8; 16], WsError> {
    let first = key_number(key1)?;
    let second = key_number(key2)?;
    let mut nonce = [0u8; 16];
    nonce[..4].copy_from_slice(&first.to_be_bytes());
    nonce[4..8].copy_from_slice(&second.to_be_bytes());
    nonce[8..].copy_from_slice(&challenge);
    let mut md5 = Md5::default();
    md5.update(nonce);
    Ok(md5.finalize().into())
}

/// restore the mixed-case spelling of a lowercased header name
///
/// `http` header names arrive lowercased; the engine's lookups use the
/// wire spellings (`Sec-WebSocket-Key1` etc), so the upgrade entry point
/// re-titles each segment and fixes the `Websocket` capitalisation.
pub(crate) fn canonical_header_name(name: &str) -> String {
    let titled = name
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-");
    titled.replace("Websocket", "WebSocket")
}

/// response lines common to every dialect
fn common_preamble() -> Vec<String> {
    vec![
        "HTTP/1.1 101 Switching Protocols\r\n".to_owned(),
        concat!(
            "Server: ",
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
            "\r\n"
        )
        .to_owned(),
        format!("Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now())),
        "Upgrade: WebSocket\r\n".to_owned(),
        "Connection: Upgrade\r\n".to_owned(),
    ]
}

/// build the HyBi-07+ response preamble
pub(crate) fn hybi07_preamble(key: &str, codec: Option<&str>) -> Vec<String> {
    let mut lines = common_preamble();
    if let Some(codec) = codec {
        lines.push(format!("Sec-WebSocket-Protocol: {codec}\r\n"));
    }
    lines.push(format!("Sec-WebSocket-Accept: {}\r\n\r\n", make_accept(key)));
    lines
}

/// build the HyBi-00 response preamble
///
/// The 16 byte challenge digest follows the blank line; older clients
/// expect the codec echoed under both protocol header spellings.
pub(crate) fn hybi00_preamble(
    origin: &str,
    host: &str,
    location: &str,
    secure: bool,
    codec: Option<&str>,
) -> Vec<String> {
    let scheme = if secure { "wss" } else { "ws" };
    let mut lines = common_preamble();
    lines.push(format!("Sec-WebSocket-Origin: {origin}\r\n"));
    lines.push(format!("Sec-WebSocket-Location: {scheme}://{host}{location}\r\n"));
    if let Some(codec) = codec {
        lines.push(format!("WebSocket-Protocol: {codec}\r\n"));
        lines.push(format!("Sec-WebSocket-Protocol: {codec}\r\n"));
    }
    lines.push("\r\n".to_owned());
    lines
}
