use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::connection::{Transport, WebSocketConnection, WrappedProtocol};
use crate::errors::WsError;
use crate::WsConfig;

/// Transport that stages outbound bytes for an async writer.
///
/// The engine writes into it synchronously; the driver drains the
/// staging buffer to the socket between reads.
#[derive(Debug, Default)]
pub struct BufferedTransport {
    out: BytesMut,
    closing: bool,
    secure: bool,
}

impl BufferedTransport {
    /// new staging transport; `secure` reflects the underlying socket
    pub fn new(secure: bool) -> Self {
        Self {
            out: BytesMut::new(),
            closing: false,
            secure,
        }
    }

    /// take everything staged so far
    pub fn take_outbound(&mut self) -> Bytes {
        self.out.split().freeze()
    }

    /// whether the engine asked for teardown
    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

impl Transport for BufferedTransport {
    fn write(&mut self, data: &[u8]) {
        if !self.closing {
            self.out.extend_from_slice(data);
        }
    }

    fn lose_connection(&mut self) {
        self.closing = true;
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Wrap an accepted async byte stream and drive the protocol over it
/// until either side closes.
///
/// The handshake is read off the stream by the engine itself; pass
/// `secure` according to how the stream was accepted.
pub async fn serve<S, P>(
    stream: S,
    secure: bool,
    config: WsConfig,
    protocol: P,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: WrappedProtocol,
{
    let conn = WebSocketConnection::new(BufferedTransport::new(secure), protocol, config);
    drive(stream, conn).await
}

/// Drive a connection upgraded out of a host HTTP server.
///
/// The request was parsed upstream; the stream must be positioned right
/// after the header block (for HyBi-00 the challenge bytes are still on
/// the wire and are read here).
pub async fn serve_upgraded<S, P, B>(
    request: &http::Request<B>,
    stream: S,
    secure: bool,
    config: WsConfig,
    protocol: P,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: WrappedProtocol,
{
    let conn = WebSocketConnection::from_upgrade(
        request,
        BufferedTransport::new(secure),
        protocol,
        config,
    )?;
    drive(stream, conn).await
}

async fn drive<S, P>(
    mut stream: S,
    mut conn: WebSocketConnection<BufferedTransport, P>,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: WrappedProtocol,
{
    let mut chunk = [0u8; 4096];
    loop {
        let staged = conn.transport_mut().take_outbound();
        if !staged.is_empty() {
            stream.write_all(&staged).await?;
        }
        if conn.transport().is_closing() {
            stream.shutdown().await.ok();
            conn.connection_lost("connection closed locally");
            return Ok(());
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            conn.connection_lost("connection closed by peer");
            return Ok(());
        }
        conn.data_received(&chunk[..n]);
    }
}
