//! SETTINGS frame semantics (RFC 7540 §6.5): the negotiated parameter set
//! each connection endpoint advertises and acknowledges.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::frame::{self, flags, FrameType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            header_table_size: crate::http2::hpack::DEFAULT_DYNAMIC_TABLE_SIZE as u32,
            enable_push: false,
            max_concurrent_streams: Some(100),
            initial_window_size: 65_535,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
        }
    }
}

const HEADER_TABLE_SIZE: u16 = 0x1;
const ENABLE_PUSH: u16 = 0x2;
const MAX_CONCURRENT_STREAMS: u16 = 0x3;
const INITIAL_WINDOW_SIZE: u16 = 0x4;
const MAX_FRAME_SIZE: u16 = 0x5;
const MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// One changed parameter, as carried on the wire. [`Settings::apply`] folds
/// a batch of these into a base value; callers needing per-field change
/// notification (e.g. to resize a dynamic table) inspect the list directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    HeaderTableSize(u32),
    EnablePush(bool),
    MaxConcurrentStreams(u32),
    InitialWindowSize(u32),
    MaxFrameSize(u32),
    MaxHeaderListSize(u32),
}

impl Settings {
    pub fn encode_frame(&self, stream_id: u32) -> (FrameType, u8, u32, Vec<u8>) {
        let mut payload = BytesMut::new();
        write_param(&mut payload, HEADER_TABLE_SIZE, self.header_table_size);
        write_param(&mut payload, ENABLE_PUSH, self.enable_push as u32);
        if let Some(v) = self.max_concurrent_streams {
            write_param(&mut payload, MAX_CONCURRENT_STREAMS, v);
        }
        write_param(&mut payload, INITIAL_WINDOW_SIZE, self.initial_window_size);
        write_param(&mut payload, MAX_FRAME_SIZE, self.max_frame_size);
        if let Some(v) = self.max_header_list_size {
            write_param(&mut payload, MAX_HEADER_LIST_SIZE, v);
        }
        (FrameType::Settings, 0, stream_id, payload.to_vec())
    }

    pub fn ack_frame() -> (FrameType, u8, u32, Vec<u8>) {
        (FrameType::Settings, flags::ACK, 0, Vec::new())
    }

    /// Apply a decoded list of parameter changes, returning the list for
    /// callers that need to react to individual fields.
    pub fn apply(&mut self, params: &[Param]) {
        for param in params {
            match *param {
                Param::HeaderTableSize(v) => self.header_table_size = v,
                Param::EnablePush(v) => self.enable_push = v,
                Param::MaxConcurrentStreams(v) => self.max_concurrent_streams = Some(v),
                Param::InitialWindowSize(v) => self.initial_window_size = v,
                Param::MaxFrameSize(v) => self.max_frame_size = v,
                Param::MaxHeaderListSize(v) => self.max_header_list_size = Some(v),
            }
        }
    }
}

fn write_param(out: &mut BytesMut, id: u16, value: u32) {
    out.put_u16(id);
    out.put_u32(value);
}

/// Decode a SETTINGS frame payload into its parameter list (RFC 7540 §6.5:
/// unrecognized ids are ignored, each entry is a fixed 6 bytes).
pub fn decode_params(mut payload: Bytes) -> Result<Vec<Param>> {
    if payload.remaining() % 6 != 0 {
        return Err(Error::invalid_frame().with_where("http2::settings::decode_params: misaligned payload"));
    }
    let mut params = Vec::new();
    while payload.has_remaining() {
        let id = payload.get_u16();
        let value = payload.get_u32();
        let param = match id {
            HEADER_TABLE_SIZE => Param::HeaderTableSize(value),
            ENABLE_PUSH => {
                if value > 1 {
                    return Err(Error::invalid_frame().with_where("http2::settings: bad ENABLE_PUSH"));
                }
                Param::EnablePush(value == 1)
            }
            MAX_CONCURRENT_STREAMS => Param::MaxConcurrentStreams(value),
            INITIAL_WINDOW_SIZE => {
                if value > 0x7FFF_FFFF {
                    return Err(Error::flow_control().with_where("http2::settings: window size too large"));
                }
                Param::InitialWindowSize(value)
            }
            MAX_FRAME_SIZE => {
                if !(16_384..=16_777_215).contains(&value) {
                    return Err(Error::invalid_frame().with_where("http2::settings: bad MAX_FRAME_SIZE"));
                }
                Param::MaxFrameSize(value)
            }
            MAX_HEADER_LIST_SIZE => Param::MaxHeaderListSize(value),
            _ => continue,
        };
        params.push(param);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_settings_through_decode() {
        let settings = Settings::default();
        let (ty, fl, sid, payload) = settings.encode_frame(0);
        assert_eq!(ty, FrameType::Settings);
        assert_eq!(fl, 0);
        assert_eq!(sid, 0);
        let params = decode_params(Bytes::from(payload)).unwrap();
        let mut applied = Settings {
            header_table_size: 0,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: 0,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
        };
        applied.apply(&params);
        assert_eq!(applied.header_table_size, settings.header_table_size);
        assert_eq!(applied.initial_window_size, settings.initial_window_size);
    }

    #[test]
    fn rejects_oversized_window() {
        let mut payload = BytesMut::new();
        write_param(&mut payload, INITIAL_WINDOW_SIZE, 0xFFFF_FFFF);
        assert!(decode_params(payload.freeze()).is_err());
    }
}
