use thiserror::Error;

/// errors raised while negotiating or driving a wrapped connection
#[derive(Debug, Error)]
pub enum WsError {
    #[error("io error {0:?}")]
    IOError(Box<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    HandshakeFailed(String),
    #[error("{error}")]
    ProtocolError {
        close_code: u16,
        error: ProtocolError,
    },
}

impl From<std::io::Error> for WsError {
    fn from(e: std::io::Error) -> Self {
        WsError::IOError(Box::new(e))
    }
}

/// errors raised while decoding frames from wire bytes
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("reserved flag in frame header ({0})")]
    ReservedBitSet(u8),
    #[error("unknown opcode {0} in frame")]
    UnknownOpcode(u8),
    #[error("undecodable {0} payload")]
    InvalidCodecPayload(&'static str),
}
