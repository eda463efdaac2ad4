use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::codec::{
    make_hybi00_frame, make_hybi07_frame, parse_hybi00_frames, parse_hybi07_frames, PayloadCodec,
};
use crate::errors::{ProtocolError, WsError};
use crate::frame::{Dialect, Frame, Message, OpCode};
use crate::handshake::{self, Headers};
use crate::WsConfig;

/// Connection lifecycle. Transitions only run forward; CLOSED is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// waiting for the request line
    Request,
    /// waiting for the header block terminator
    Negotiating,
    /// HyBi-00 only, waiting for the 8 challenge bytes
    Challenge,
    /// handshake done, the wire carries frames
    Frames,
    /// torn down
    Closed,
}

/// Byte transport capability consumed by the wrapper.
///
/// The host network layer supplies one per accepted socket; after the
/// upgrade the connection owns it exclusively.
pub trait Transport {
    /// queue bytes towards the peer
    fn write(&mut self, data: &[u8]);

    /// queue several chunks in order
    fn write_sequence(&mut self, parts: &[&[u8]]) {
        for part in parts {
            self.write(part);
        }
    }

    /// tear the transport down
    fn lose_connection(&mut self);

    /// whether the transport is TLS backed; selects `ws` vs `wss` in the
    /// HyBi-00 location echo
    fn is_secure(&self) -> bool;
}

/// The wrapped byte oriented protocol.
///
/// Callbacks run synchronously on the connection's task and may write
/// back through the handle; such writes land in the pending queue and
/// are flushed at the tail of the current call chain.
pub trait WrappedProtocol {
    /// the connection reached FRAMES; writes issued here reach the peer
    /// strictly after the handshake completion bytes
    fn connection_made(&mut self, handle: &mut Handle<'_>);

    /// one decoded application message, in wire order
    fn data_received(&mut self, handle: &mut Handle<'_>, data: Bytes);

    /// the transport is gone; delivered at most once, and only after
    /// `connection_made` was
    fn connection_lost(&mut self, reason: &str);
}

/// Write capabilities handed to the wrapped protocol during callbacks.
pub struct Handle<'a> {
    pending: &'a mut VecDeque<Message>,
    close_requested: &'a mut bool,
}

impl Handle<'_> {
    /// queue one message of raw bytes
    pub fn write(&mut self, data: &[u8]) {
        self.pending
            .push_back(Message::Binary(Bytes::copy_from_slice(data)));
    }

    /// queue one text message
    pub fn write_text(&mut self, data: &str) {
        self.pending
            .push_back(Message::Text(Bytes::copy_from_slice(data.as_bytes())));
    }

    /// queue several messages, one frame each
    pub fn write_sequence(&mut self, parts: &[&[u8]]) {
        for part in parts {
            self.write(part);
        }
    }

    /// request connection teardown
    pub fn lose_connection(&mut self) {
        *self.close_requested = true;
    }
}

/// Wraps a byte transport and a byte oriented protocol with a WebSocket
/// framing layer.
///
/// The engine is sans-IO: the host feeds inbound bytes through
/// [`data_received`](Self::data_received) and everything outbound goes
/// through the [`Transport`]. All operations are `&mut self`, so the
/// host's event loop serialises them by construction.
pub struct WebSocketConnection<T: Transport, P: WrappedProtocol> {
    transport: T,
    protocol: P,
    config: WsConfig,
    buf: BytesMut,
    pending: VecDeque<Message>,
    close_requested: bool,
    state: State,
    dialect: Option<Dialect>,
    codec: Option<PayloadCodec>,
    headers: Headers,
    location: String,
    host: String,
    origin: String,
    connected: bool,
    lost_notified: bool,
}

impl<T: Transport, P: WrappedProtocol> WebSocketConnection<T, P> {
    /// wrap a freshly accepted transport; the request line is read off
    /// the wire by the connection itself
    pub fn new(transport: T, protocol: P, config: WsConfig) -> Self {
        Self {
            transport,
            protocol,
            config,
            buf: BytesMut::new(),
            pending: VecDeque::new(),
            close_requested: false,
            state: State::Request,
            dialect: None,
            codec: None,
            headers: Headers::default(),
            location: "/".to_owned(),
            host: "example.com".to_owned(),
            origin: "http://example.com".to_owned(),
            connected: false,
            lost_notified: false,
        }
    }

    /// Take over a connection upgraded out of a host HTTP server.
    ///
    /// The request was already parsed upstream, so the engine starts in
    /// NEGOTIATING with the location pre-captured. Requests missing an
    /// `Origin` or `Host` header, or duplicating `Origin`, `Host` or a
    /// protocol header, are dropped without writing anything. The host
    /// channel must route every subsequent raw byte into
    /// [`data_received`](Self::data_received) and stop parsing on its
    /// own.
    pub fn from_upgrade<B>(
        request: &http::Request<B>,
        transport: T,
        protocol: P,
        config: WsConfig,
    ) -> Result<Self, WsError> {
        let raw = request.headers();
        for name in ["origin", "host"] {
            match raw.get_all(name).iter().count() {
                0 => return Err(WsError::HandshakeFailed(format!("no {name} header"))),
                1 => {}
                _ => {
                    return Err(WsError::HandshakeFailed(format!("multiple {name} headers")))
                }
            }
        }
        for name in ["sec-websocket-protocol", "websocket-protocol"] {
            if raw.get_all(name).iter().count() > 1 {
                return Err(WsError::HandshakeFailed(format!("multiple {name} headers")));
            }
        }

        let mut conn = Self::new(transport, protocol, config);
        conn.state = State::Negotiating;
        conn.location = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());
        for (name, value) in raw {
            if let Ok(value) = value.to_str() {
                conn.headers
                    .insert(handshake::canonical_header_name(name.as_str()), value);
            }
        }

        if !conn.validate_headers() {
            conn.lose_connection();
        }
        // tick the machine once so anything the wrapped protocol wrote
        // on connect goes out behind the preamble
        conn.data_received(b"");
        Ok(conn)
    }

    /// feed raw bytes off the wire
    pub fn data_received(&mut self, data: &[u8]) {
        if self.state == State::Closed {
            return;
        }
        self.buf.extend_from_slice(data);

        if self.state != State::Frames {
            self.advance_handshake();
        }
        if self.state == State::Frames {
            self.parse_frames();
        }
        self.flush();
    }

    /// queue one message of raw bytes; sent once the handshake is done
    pub fn write(&mut self, data: &[u8]) {
        self.pending
            .push_back(Message::Binary(Bytes::copy_from_slice(data)));
        self.flush();
    }

    /// queue one text message
    pub fn write_text(&mut self, data: &str) {
        self.pending
            .push_back(Message::Text(Bytes::copy_from_slice(data.as_bytes())));
        self.flush();
    }

    /// queue several messages; each becomes exactly one frame
    pub fn write_sequence(&mut self, parts: &[&[u8]]) {
        for part in parts {
            self.pending
                .push_back(Message::Binary(Bytes::copy_from_slice(part)));
        }
        self.flush();
    }

    /// Close the connection, telling the other side when the dialect has
    /// a frame for it. Idempotent.
    pub fn close(&mut self, reason: &str) {
        if self.state == State::Closed {
            return;
        }
        if self.dialect.map_or(false, |d| d.binary_framing()) {
            let frame = make_hybi07_frame(OpCode::Close, reason.as_bytes());
            self.transport.write(&frame);
        }
        self.lose_connection();
    }

    /// tear the transport down without a close frame
    pub fn lose_connection(&mut self) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        self.transport.lose_connection();
    }

    /// The host observed the transport go away; surfaces the reason to
    /// the wrapped protocol once.
    pub fn connection_lost(&mut self, reason: &str) {
        self.state = State::Closed;
        if self.connected && !self.lost_notified {
            self.lost_notified = true;
            self.protocol.connection_lost(reason);
        }
    }

    /// current lifecycle state
    pub fn state(&self) -> State {
        self.state
    }

    /// negotiated dialect, if the handshake got that far
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// negotiated payload codec
    pub fn codec(&self) -> Option<PayloadCodec> {
        self.codec
    }

    /// request path as received, query string included
    pub fn location(&self) -> &str {
        &self.location
    }

    /// the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// mutable access to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// the wrapped protocol
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// run the pre-FRAMES state machine until it stops moving
    fn advance_handshake(&mut self) {
        loop {
            let before = self.state;
            match self.state {
                State::Request => self.read_request_line(),
                State::Negotiating => self.read_headers(),
                State::Challenge => self.read_challenge(),
                State::Frames | State::Closed => {}
            }
            if self.state == before {
                break;
            }
        }
    }

    // Initial requests look very much like HTTP requests, but aren't.
    // The request path is captured for the browsers which want it
    // echoed back at them.
    fn read_request_line(&mut self) {
        let Some(pos) = find_subsequence(&self.buf, b"\r\n") else {
            return;
        };
        let line = self.buf.split_to(pos + 2);
        match std::str::from_utf8(&line[..pos])
            .ok()
            .and_then(handshake::parse_request_line)
        {
            Some((_verb, location, _version)) => {
                self.location = location.to_owned();
                self.state = State::Negotiating;
            }
            None => {
                tracing::debug!("malformed request line");
                self.lose_connection();
            }
        }
    }

    fn read_headers(&mut self) {
        let Some(pos) = find_subsequence(&self.buf, b"\r\n\r\n") else {
            return;
        };
        let head = self.buf.split_to(pos + 4);
        let head = String::from_utf8_lossy(&head[..pos]).into_owned();
        self.headers = Headers::parse(&head);
        if !self.validate_headers() {
            self.lose_connection();
        }
    }

    /// Check received headers for sanity and correctness, stash what the
    /// response needs, and advance the state machine. Returns false when
    /// the request cannot be served.
    fn validate_headers(&mut self) -> bool {
        if !handshake::is_websocket(&self.headers) {
            tracing::debug!("not handling non-websocket request");
            return false;
        }

        if let Some(host) = self.headers.get("Host") {
            self.host = host.to_owned();
        }
        if let Some(origin) = self.headers.get("Origin") {
            self.origin = origin.to_owned();
        }

        // Newer noVNC sends multiple comma separated codecs; the first
        // one we can encode and decode wins.
        let protocols = self
            .headers
            .get("Sec-WebSocket-Protocol")
            .or_else(|| self.headers.get("WebSocket-Protocol"));
        if let Some(protocols) = protocols {
            for name in protocols.split(',').map(str::trim) {
                if let Some(codec) = PayloadCodec::from_name(name) {
                    tracing::debug!("using websocket codec {name}");
                    self.codec = Some(codec);
                    break;
                }
                tracing::debug!("cannot handle websocket codec {name}");
            }
            if self.codec.is_none() {
                return false;
            }
        }

        if handshake::is_hybi00(&self.headers) {
            tracing::debug!("starting hybi-00/hixie-76 handshake");
            self.dialect = Some(Dialect::Hybi00);
            self.state = State::Challenge;
        } else if let Some(version) = self.headers.get("Sec-WebSocket-Version") {
            let Some(dialect) = Dialect::from_version(version) else {
                tracing::debug!("cannot support protocol version {version}");
                return false;
            };
            tracing::debug!("starting {dialect:?} conversation");
            if !self.send_hybi07_preamble() {
                return false;
            }
            self.dialect = Some(dialect);
            self.enter_frames();
        } else {
            tracing::debug!("neither hybi-00 keys nor a supported version offered");
            return false;
        }

        true
    }

    fn send_hybi07_preamble(&mut self) -> bool {
        let Some(key) = self.headers.get("Sec-WebSocket-Key") else {
            tracing::debug!("missing Sec-WebSocket-Key header");
            return false;
        };
        let lines = handshake::hybi07_preamble(key, self.codec.map(|c| c.name()));
        let parts: Vec<&[u8]> = lines.iter().map(|l| l.as_bytes()).collect();
        self.transport.write_sequence(&parts);
        true
    }

    // The challenge tail is exclusive to HyBi-00/Hixie-76: the response
    // preamble is held back until its 8 bytes arrive.
    fn read_challenge(&mut self) {
        if self.buf.len() < 8 {
            return;
        }
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&self.buf.split_to(8));

        let (Some(key1), Some(key2)) = (
            self.headers.get("Sec-WebSocket-Key1"),
            self.headers.get("Sec-WebSocket-Key2"),
        ) else {
            self.lose_connection();
            return;
        };
        let digest = match handshake::complete_hybi00(key1, key2, challenge) {
            Ok(digest) => digest,
            Err(e) => {
                tracing::debug!("hybi-00 challenge failed: {e}");
                self.lose_connection();
                return;
            }
        };

        let lines = handshake::hybi00_preamble(
            &self.origin,
            &self.host,
            &self.location,
            self.transport.is_secure(),
            self.codec.map(|c| c.name()),
        );
        let parts: Vec<&[u8]> = lines.iter().map(|l| l.as_bytes()).collect();
        self.transport.write_sequence(&parts);
        self.transport.write(&digest);
        tracing::debug!("completed hybi-00/hixie-76 handshake");
        self.enter_frames();
    }

    fn enter_frames(&mut self) {
        self.state = State::Frames;
        self.connected = true;
        let mut handle = Handle {
            pending: &mut self.pending,
            close_requested: &mut self.close_requested,
        };
        self.protocol.connection_made(&mut handle);
    }

    /// find frames in incoming data and pass them to the wrapped
    /// protocol
    fn parse_frames(&mut self) {
        let Some(dialect) = self.dialect else {
            return;
        };
        let frames = if dialect.binary_framing() {
            match parse_hybi07_frames(&mut self.buf) {
                Ok(frames) => frames,
                Err(e) => {
                    self.fail_connection(1002, e);
                    return;
                }
            }
        } else {
            parse_hybi00_frames(&mut self.buf)
        };

        for frame in frames {
            if self.state != State::Frames {
                break;
            }
            match frame {
                Frame::Data(payload) => {
                    let payload = match self.codec {
                        Some(codec) => match codec.decode(&payload) {
                            Ok(decoded) => decoded,
                            Err(e) => {
                                self.fail_connection(1007, e);
                                return;
                            }
                        },
                        None => payload.freeze(),
                    };
                    let mut handle = Handle {
                        pending: &mut self.pending,
                        close_requested: &mut self.close_requested,
                    };
                    self.protocol.data_received(&mut handle, payload);
                    // flush at the tail of each frame so synchronous
                    // writes from the protocol go out in arrival order
                    self.flush();
                }
                Frame::Close { code, reason } => {
                    tracing::debug!(
                        "closing connection: {:?} ({code})",
                        String::from_utf8_lossy(&reason)
                    );
                    self.close("");
                }
                Frame::Ping(payload) => {
                    tracing::trace!("answering ping of {} bytes", payload.len());
                    let pong = make_hybi07_frame(OpCode::Pong, &payload);
                    self.transport.write(&pong);
                }
                Frame::Pong(_) => {
                    tracing::trace!("dropping unsolicited pong");
                }
            }
        }
    }

    /// A decode failure is terminal for the connection: tell the peer
    /// why and tear down.
    fn fail_connection(&mut self, close_code: u16, error: ProtocolError) {
        let err = WsError::ProtocolError { close_code, error };
        tracing::debug!("dropping connection ({close_code}): {err}");
        self.close(&err.to_string());
    }

    /// Send all pending messages. Messages can pile up before the
    /// handshake completes; the queue drains only in FRAMES, so the
    /// peer sees them strictly after the handshake bytes.
    fn flush(&mut self) {
        if self.state == State::Frames {
            if let Some(dialect) = self.dialect {
                let binary_mode = self.config.binary_mode;
                while let Some(msg) = self.pending.pop_front() {
                    let opcode = msg.opcode(binary_mode);
                    let payload = match self.codec {
                        Some(codec) => codec.encode(msg.payload()),
                        None => msg.into_payload(),
                    };
                    let frame = if dialect.binary_framing() {
                        make_hybi07_frame(opcode, &payload)
                    } else {
                        make_hybi00_frame(&payload)
                    };
                    self.transport.write(&frame);
                }
            }
        }
        if self.close_requested {
            self.close_requested = false;
            self.lose_connection();
        }
    }
}

fn find_subsequence(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|window| window == needle)
}
