//! gRPC message framing: `compressed:1 | length:4 BE | payload:length`
//! (spec section 4.10).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Payloads larger than this are rejected while decoding a frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub fn encode(payload: &[u8], compressed: bool) -> Bytes {
    let mut out = BytesMut::with_capacity(5 + payload.len());
    out.put_u8(compressed as u8);
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}

/// Decode exactly one length-prefixed message from the front of `buf`,
/// leaving any trailing bytes (the start of the next message) untouched.
/// Returns `Ok(None)` if `buf` does not yet hold a complete frame.
pub fn decode(buf: &mut BytesMut, max_message_size: usize) -> Result<Option<(bool, Bytes)>> {
    if buf.len() < 5 {
        return Ok(None);
    }
    let compressed = buf[0] != 0;
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if len > max_message_size {
        return Err(Error::invalid_frame().with_where("grpc::codec::decode: message exceeds max_message_size"));
    }
    if buf.len() < 5 + len {
        return Ok(None);
    }
    buf.advance(5);
    let payload = buf.split_to(len).freeze();
    Ok(Some((compressed, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(b"hello", false));
        let (compressed, payload) = decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap().unwrap();
        assert!(!compressed);
        assert_eq!(&payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_message() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u32(DEFAULT_MAX_MESSAGE_SIZE as u32 + 1);
        assert!(decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).is_err());
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(b"partial", false)[..4]);
        assert!(decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap().is_none());
    }
}
