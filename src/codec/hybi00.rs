use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::frame::Frame;

#[inline]
fn find_byte(buf: &[u8], byte: u8, from: usize) -> Option<usize> {
    buf.get(from..)
        .and_then(|rest| rest.iter().position(|&b| b == byte))
        .map(|i| i + from)
}

/// Parse HyBi-00 sentinel frames, consuming completed frames from `buf`.
///
/// Garbage on the wire between frames is actively ignored. An `0x00`
/// without a matching `0xFF` is an incomplete frame; it stays in the
/// buffer (garbage before it included) until more bytes arrive.
pub fn parse_hybi00_frames(buf: &mut BytesMut) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut tail = 0;
    let mut start = find_byte(buf, 0x00, 0);

    while let Some(open) = start {
        match find_byte(buf, 0xff, open + 1) {
            None => break,
            Some(end) => {
                frames.push(Frame::Data(BytesMut::from(&buf[open + 1..end])));
                tail = end + 1;
                start = find_byte(buf, 0x00, end + 1);
            }
        }
    }

    buf.advance(tail);
    frames
}

/// wrap a payload in HyBi-00 sentinels
///
/// No length prefix, no control frames; the payload must not itself
/// contain `0xFF`, which nothing here verifies.
pub fn make_hybi00_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + 2);
    frame.put_u8(0x00);
    frame.extend_from_slice(payload);
    frame.put_u8(0xff);
    frame.freeze()
}
