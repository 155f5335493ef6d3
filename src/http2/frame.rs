//! The HTTP/2 frame codec (RFC 7540 §4, C6): the 9-byte frame header plus
//! the typed frame payloads the connection engine and stream state machine
//! exchange.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const FRAME_HEADER_LEN: usize = 9;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    /// A frame type this engine doesn't recognize. RFC 7540 §4.1 requires
    /// these to be ignored, not treated as a connection error.
    Unknown(u8),
}

impl FrameType {
    fn from_raw(raw: u8) -> FrameType {
        match raw {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }

    fn raw(self) -> u8 {
        match self {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(raw) => raw,
        }
    }
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// A decoded frame header plus its raw payload. Higher layers (settings,
/// HPACK, the stream state machine) interpret the payload per `frame_type`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Read one frame from `buf`, consuming it on success. Returns `Ok(None)`
/// when `buf` does not yet hold a complete frame.
pub fn decode(buf: &mut BytesMut, max_frame_size: u32) -> Result<Option<Frame>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]) as usize;
    if len as u32 > max_frame_size {
        return Err(Error::frame_size().with_where("http2::frame::decode"));
    }
    if buf.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }

    let type_raw = buf[3];
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7FFF_FFFF;
    let frame_type = FrameType::from_raw(type_raw);

    buf.advance(FRAME_HEADER_LEN);
    let payload = buf.split_to(len).freeze();

    Ok(Some(Frame {
        frame_type,
        flags,
        stream_id,
        payload,
    }))
}

/// Encode a frame header + payload onto `out`.
pub fn encode(out: &mut BytesMut, frame_type: FrameType, flags: u8, stream_id: u32, payload: &[u8]) {
    out.reserve(FRAME_HEADER_LEN + payload.len());
    out.put_u8(((payload.len() >> 16) & 0xFF) as u8);
    out.put_u8(((payload.len() >> 8) & 0xFF) as u8);
    out.put_u8((payload.len() & 0xFF) as u8);
    out.put_u8(frame_type.raw());
    out.put_u8(flags);
    out.put_u32(stream_id & 0x7FFF_FFFF);
    out.put_slice(payload);
}

pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_settings_frame() {
        let mut buf = BytesMut::new();
        encode(&mut buf, FrameType::Settings, 0, 0, &[0, 3, 0, 0, 0, 10]);
        let frame = decode(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(frame.frame_type, FrameType::Settings);
        assert_eq!(frame.stream_id, 0);
        assert_eq!(&frame.payload[..], &[0, 3, 0, 0, 0, 10]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let mut buf = BytesMut::from(&b"\x00\x00\x05\x00\x00\x00\x00\x00\x00ab"[..]);
        assert!(decode(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = BytesMut::new();
        encode(&mut buf, FrameType::Data, 0, 1, &vec![0u8; 100]);
        assert!(decode(&mut buf, 10).is_err());
    }

    #[test]
    fn unknown_frame_type_decodes_instead_of_erroring() {
        let mut buf = BytesMut::new();
        encode(&mut buf, FrameType::Unknown(0xFF), 0, 1, &[1, 2, 3]);
        let frame = decode(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(frame.frame_type, FrameType::Unknown(0xFF));
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
    }
}
