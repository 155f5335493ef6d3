//! RFC 7541 §5: the variable-length integer and string primitives that
//! every HPACK representation is built from.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::huffman;

/// Encode `value` as an N-bit prefix integer, OR-ing `prefix_bits` (the
/// representation's type flags) into the leftover high bits of the first byte.
pub fn encode_integer(out: &mut BytesMut, prefix_bits: u8, prefix_len: u8, value: u64) {
    let max_prefix = (1u64 << prefix_len) - 1;
    if value < max_prefix {
        out.put_u8(prefix_bits | value as u8);
        return;
    }
    out.put_u8(prefix_bits | max_prefix as u8);
    let mut remainder = value - max_prefix;
    while remainder >= 128 {
        out.put_u8(((remainder % 128) as u8) | 0x80);
        remainder /= 128;
    }
    out.put_u8(remainder as u8);
}

/// Decode an N-bit prefix integer starting at the current position of
/// `buf`'s first byte (already read by the caller), returning the value.
pub fn decode_integer(buf: &mut Bytes, first_byte: u8, prefix_len: u8) -> Result<u64> {
    let mask = (1u8 << prefix_len) - 1;
    let prefix = (first_byte & mask) as u64;
    let max_prefix = mask as u64;
    if prefix < max_prefix {
        return Ok(prefix);
    }

    let mut value = max_prefix;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(Error::hpack_decode().with_where("http2::hpack::primitive: truncated integer"));
        }
        let byte = buf.get_u8();
        value += ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(Error::hpack_decode().with_where("http2::hpack::primitive: integer overflow"));
        }
    }
    Ok(value)
}

/// Encode a string literal (RFC 7541 §5.2), preferring the Huffman
/// encoding when it is not larger than the literal bytes.
pub fn encode_string(out: &mut BytesMut, value: &str) {
    let huffman_bytes = huffman::encode(value.as_bytes());
    if huffman_bytes.len() < value.len() {
        encode_integer(out, 0x80, 7, huffman_bytes.len() as u64);
        out.extend_from_slice(&huffman_bytes);
    } else {
        encode_integer(out, 0x00, 7, value.len() as u64);
        out.extend_from_slice(value.as_bytes());
    }
}

/// Decode a string literal, consuming its length prefix and body from `buf`.
pub fn decode_string(buf: &mut Bytes) -> Result<String> {
    if !buf.has_remaining() {
        return Err(Error::hpack_decode().with_where("http2::hpack::primitive: empty string header"));
    }
    let first = buf.get_u8();
    let huffman_coded = first & 0x80 != 0;
    let len = decode_integer(buf, first, 7)? as usize;
    if buf.remaining() < len {
        return Err(Error::hpack_decode().with_where("http2::hpack::primitive: truncated string"));
    }
    let raw = buf.copy_to_bytes(len);

    let bytes = if huffman_coded {
        huffman::decode(&raw)?
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| Error::hpack_decode().with_where("http2::hpack::primitive: non-utf8 string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integer_fits_in_prefix() {
        let mut buf = BytesMut::new();
        encode_integer(&mut buf, 0, 5, 10);
        assert_eq!(&buf[..], &[10]);
        let mut bytes = buf.freeze();
        let first = bytes.get_u8();
        assert_eq!(decode_integer(&mut bytes, first, 5).unwrap(), 10);
    }

    #[test]
    fn large_integer_uses_continuation_bytes() {
        let mut buf = BytesMut::new();
        encode_integer(&mut buf, 0, 5, 1337);
        let mut bytes = buf.freeze();
        let first = bytes.get_u8();
        assert_eq!(decode_integer(&mut bytes, first, 5).unwrap(), 1337);
    }

    #[test]
    fn round_trips_a_string() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "www.example.com");
        let mut bytes = buf.freeze();
        assert_eq!(decode_string(&mut bytes).unwrap(), "www.example.com");
    }
}
