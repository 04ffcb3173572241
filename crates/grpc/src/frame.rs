//! gRPC-over-HTTP/2 message framing: a 1-byte compressed flag, a 4-byte
//! big-endian length, then the message bytes. Used by the minimal gRPC
//! listener that speaks this wire format directly instead of going through
//! `tonic`'s generated-service router (see the proxy crate's dispatcher).

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encode one message as a single gRPC frame (uncompressed).
pub fn encode_frame(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + data.len());
    buf.put_u8(0);
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
    buf.freeze()
}

/// Decode the first complete frame from `buf`, returning the message bytes
/// and the remaining unconsumed bytes. `None` if `buf` doesn't yet contain a
/// full frame.
pub fn decode_frame(buf: &[u8]) -> Option<(Bytes, &[u8])> {
    if buf.len() < 5 {
        return None;
    }
    let mut header = &buf[..5];
    let _compressed = header.get_u8();
    let len = header.get_u32() as usize;
    if buf.len() < 5 + len {
        return None;
    }
    let message = Bytes::copy_from_slice(&buf[5..5 + len]);
    Some((message, &buf[5 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_frame() {
        let encoded = encode_frame(b"hello");
        let (message, rest) = decode_frame(&encoded).unwrap();
        assert_eq!(message.as_ref(), b"hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_returns_none_on_incomplete_frame() {
        let encoded = encode_frame(b"hello world");
        assert!(decode_frame(&encoded[..4]).is_none());
    }

    #[test]
    fn decode_leaves_trailing_bytes_for_the_next_frame() {
        let mut buf = encode_frame(b"a").to_vec();
        buf.extend_from_slice(&encode_frame(b"b"));
        let (first, rest) = decode_frame(&buf).unwrap();
        assert_eq!(first.as_ref(), b"a");
        let (second, rest) = decode_frame(rest).unwrap();
        assert_eq!(second.as_ref(), b"b");
        assert!(rest.is_empty());
    }
}
