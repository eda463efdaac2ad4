mod hybi00;
mod hybi07;

pub use hybi00::{make_hybi00_frame, parse_hybi00_frames};
pub use hybi07::{apply_mask, make_hybi07_frame, parse_hybi07_frames};

use bytes::Bytes;

use crate::errors::ProtocolError;

/// Payload transformation negotiated via `Sec-WebSocket-Protocol`.
///
/// WebSockets call this a "protocol"; it only reshapes payload bytes and
/// never touches frame headers, lengths or masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    /// payloads are base64 on the wire
    Base64,
}

impl PayloadCodec {
    /// resolve a subprotocol token to a recognized codec
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "base64" => Some(PayloadCodec::Base64),
            _ => None,
        }
    }

    /// the token this codec is negotiated and echoed as
    pub fn name(&self) -> &'static str {
        match self {
            PayloadCodec::Base64 => "base64",
        }
    }

    /// transform an outbound payload before framing
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        match self {
            PayloadCodec::Base64 => base64::encode(payload).into_bytes().into(),
        }
    }

    /// transform an inbound payload after unframing
    pub fn decode(&self, payload: &[u8]) -> Result<Bytes, ProtocolError> {
        match self {
            PayloadCodec::Base64 => base64::decode(payload)
                .map(Bytes::from)
                .map_err(|_| ProtocolError::InvalidCodecPayload(self.name())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base64_is_the_only_recognized_codec() {
        assert_eq!(PayloadCodec::from_name("base64"), Some(PayloadCodec::Base64));
        assert_eq!(PayloadCodec::from_name("chat"), None);
        assert_eq!(PayloadCodec::from_name("BASE64"), None);
    }

    #[test]
    fn base64_round_trip() {
        let codec = PayloadCodec::Base64;
        let encoded = codec.encode(b"wrapped bytes");
        assert_eq!(&encoded[..], b"d3JhcHBlZCBieXRlcw==");
        assert_eq!(&codec.decode(&encoded).unwrap()[..], b"wrapped bytes");
    }

    #[test]
    fn base64_garbage_is_a_protocol_error() {
        assert!(PayloadCodec::Base64.decode(b"!!! not base64 !!!").is_err());
    }
}
