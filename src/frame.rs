use bytes::{Bytes, BytesMut};

/// Defines the interpretation of the "Payload data". If an unknown
/// opcode is received, the receiving endpoint MUST _Fail the
/// WebSocket Connection_.
/// - x0 denotes a continuation frame
/// - x1 denotes a text frame
/// - x2 denotes a binary frame
/// - x8 denotes a connection close
/// - x9 denotes a ping
/// - xA denotes a pong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// - x0 denotes a continuation frame
    Continue,
    /// - x1 denotes a text frame
    Text,
    /// - x2 denotes a binary frame
    Binary,
    /// - x8 denotes a connection close
    Close,
    /// - x9 denotes a ping
    Ping,
    /// - xA denotes a pong
    Pong,
}

impl OpCode {
    /// get corresponding u8 value
    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xa,
        }
    }
}

/// map the low nibble of a frame header to an opcode
///
/// x3-7 and xB-F are reserved and rejected outright, the way a server
/// without extension support must treat them
#[inline]
pub(crate) fn parse_opcode(val: u8) -> Result<OpCode, u8> {
    match val & 0x0f {
        0x0 => Ok(OpCode::Continue),
        0x1 => Ok(OpCode::Text),
        0x2 => Ok(OpCode::Binary),
        0x8 => Ok(OpCode::Close),
        0x9 => Ok(OpCode::Ping),
        0xa => Ok(OpCode::Pong),
        other => Err(other),
    }
}

/// Wire dialects negotiable from the same initial byte stream.
///
/// - HYBI00  - Hixie-76, HyBi-00. Challenge/response after headers, very
///   minimal framing.
/// - HYBI07  - HyBi-07. Modern "standard" handshake, masked frames.
/// - HYBI10  - HyBi-10. Exactly HyBi-07 except for the version number.
/// - RFC6455 - the standardised protocol, version number 13, otherwise
///   identical to HyBi-07.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Hixie-76 / HyBi-00, sentinel framing
    Hybi00,
    /// HyBi-07, `Sec-WebSocket-Version: 7`
    Hybi07,
    /// HyBi-10, `Sec-WebSocket-Version: 8`
    Hybi10,
    /// RFC 6455, `Sec-WebSocket-Version: 13`
    Rfc6455,
}

impl Dialect {
    /// resolve a `Sec-WebSocket-Version` value
    pub fn from_version(version: &str) -> Option<Self> {
        match version {
            "7" => Some(Dialect::Hybi07),
            "8" => Some(Dialect::Hybi10),
            "13" => Some(Dialect::Rfc6455),
            _ => None,
        }
    }

    /// whether this dialect uses the RFC 6455 binary frame header
    pub fn binary_framing(&self) -> bool {
        !matches!(self, Dialect::Hybi00)
    }
}

/// one complete unit of wire syntax, as surfaced by the decoders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// application data; continuation frames surface here too, uncoalesced
    Data(BytesMut),
    /// connection close; defaults filled in when the payload is short
    Close {
        /// status code, 1000 when the peer sent none
        code: u16,
        /// close reason, possibly empty
        reason: BytesMut,
    },
    /// ping, to be answered with a pong
    Ping(BytesMut),
    /// pong, unsolicited ones are dropped
    Pong(BytesMut),
}

/// an outbound application message waiting to be framed
///
/// The text/binary distinction only matters to the HyBi-07+ encoder in
/// binary mode; HyBi-00 and the default mode frame both the same way.
#[derive(Debug, Clone)]
pub enum Message {
    /// message to be framed as text (opcode x1)
    Text(Bytes),
    /// message to be framed as binary when binary mode is on
    Binary(Bytes),
}

impl Message {
    /// payload bytes regardless of kind
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }

    /// consume the message, returning its payload
    pub fn into_payload(self) -> Bytes {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }

    /// opcode this message gets framed with
    ///
    /// Without binary mode everything goes out as text, matching the
    /// wrapper's historical behavior for byte-oriented protocols.
    pub(crate) fn opcode(&self, binary_mode: bool) -> OpCode {
        match self {
            Message::Binary(_) if binary_mode => OpCode::Binary,
            _ => OpCode::Text,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for code in [
            OpCode::Continue,
            OpCode::Text,
            OpCode::Binary,
            OpCode::Close,
            OpCode::Ping,
            OpCode::Pong,
        ] {
            assert_eq!(parse_opcode(code.as_u8()), Ok(code));
        }
    }

    #[test]
    fn reserved_opcodes_rejected() {
        for val in [0x3, 0x4, 0x5, 0x6, 0x7, 0xb, 0xc, 0xd, 0xe, 0xf] {
            assert_eq!(parse_opcode(val), Err(val));
        }
    }

    #[test]
    fn opcode_ignores_high_nibble() {
        assert_eq!(parse_opcode(0x81), Ok(OpCode::Text));
        assert_eq!(parse_opcode(0x88), Ok(OpCode::Close));
    }

    #[test]
    fn version_mapping() {
        assert_eq!(Dialect::from_version("7"), Some(Dialect::Hybi07));
        assert_eq!(Dialect::from_version("8"), Some(Dialect::Hybi10));
        assert_eq!(Dialect::from_version("13"), Some(Dialect::Rfc6455));
        assert_eq!(Dialect::from_version("9"), None);
        assert_eq!(Dialect::from_version(""), None);
    }

    #[test]
    fn message_opcode_selection() {
        let text = Message::Text(Bytes::from_static(b"hi"));
        let binary = Message::Binary(Bytes::from_static(b"hi"));
        assert_eq!(text.opcode(false), OpCode::Text);
        assert_eq!(binary.opcode(false), OpCode::Text);
        assert_eq!(text.opcode(true), OpCode::Text);
        assert_eq!(binary.opcode(true), OpCode::Binary);
    }
}
