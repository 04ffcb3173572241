//! A `tonic` codec that treats gRPC messages as opaque byte payloads.
//!
//! Registered under the name `raw`: encoding copies the input bytes out
//! verbatim, decoding copies the input bytes into a [`RawMessage`]. This
//! lets the proxy forward frames between client and upstream without
//! knowing or parsing the protobuf schema either side speaks.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// An opaque gRPC message: the raw bytes of one frame, schema-less.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub data: Bytes,
}

impl RawMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawCodec;

#[derive(Debug, Clone, Default)]
pub struct RawEncoder;

#[derive(Debug, Clone, Default)]
pub struct RawDecoder;

impl Codec for RawCodec {
    type Encode = RawMessage;
    type Decode = RawMessage;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

impl Encoder for RawEncoder {
    type Item = RawMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item.data);
        Ok(())
    }
}

impl Decoder for RawDecoder {
    type Item = RawMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let mut buf = BytesMut::with_capacity(src.remaining());
        buf.put(src.copy_to_bytes(src.remaining()));
        Ok(Some(RawMessage::new(buf.freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_wraps_bytes_verbatim() {
        let msg = RawMessage::new(Bytes::from_static(b"\x01\x02\x03"));
        assert_eq!(msg.data.as_ref(), &[1, 2, 3]);
    }
}
