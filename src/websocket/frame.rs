//! RFC 6455 frame encoding/decoding: header parsing, payload masking, and
//! fragment reassembly into whole messages.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_raw(raw: u8) -> Option<Opcode> {
        Some(match raw {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            _ => return None,
        })
    }

    fn raw(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A single wire frame. Fragmented messages are split across multiple
/// frames sharing one logical opcode via `Continuation`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn binary(payload: Vec<u8>) -> Frame {
        Frame {
            fin: true,
            opcode: Opcode::Binary,
            payload,
        }
    }

    pub fn control(opcode: Opcode, payload: Vec<u8>) -> Frame {
        Frame {
            fin: true,
            opcode,
            payload,
        }
    }
}

/// Read one frame. Returns `Ok(None)` on clean EOF before any header byte.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Frame>> {
    let mut header = [0u8; 2];
    match r.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::new_io(e, "websocket::read_frame")),
    }

    let fin = header[0] & 0x80 != 0;
    let opcode_raw = header[0] & 0x0F;
    let opcode = Opcode::from_raw(opcode_raw)
        .ok_or_else(|| Error::invalid_frame().with_where("websocket::read_frame: bad opcode"))?;
    let masked = header[1] & 0x80 != 0;
    let len_field = header[1] & 0x7F;

    let payload_len: u64 = match len_field {
        126 => {
            let mut ext = [0u8; 2];
            r.read_exact(&mut ext)
                .await
                .map_err(|e| Error::new_io(e, "websocket::read_frame"))?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            r.read_exact(&mut ext)
                .await
                .map_err(|e| Error::new_io(e, "websocket::read_frame"))?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    if opcode.is_control() && (payload_len > 125 || !fin) {
        return Err(Error::invalid_frame().with_where("websocket::read_frame: bad control frame"));
    }

    let mask_key = if masked {
        let mut key = [0u8; 4];
        r.read_exact(&mut key)
            .await
            .map_err(|e| Error::new_io(e, "websocket::read_frame"))?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len as usize];
    r.read_exact(&mut payload)
        .await
        .map_err(|e| Error::new_io(e, "websocket::read_frame"))?;
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload,
    }))
}

/// Write one frame. `mask` must be `true` for client-originated frames and
/// `false` for server-originated frames per RFC 6455 §5.1.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame, mask: bool) -> std::io::Result<()> {
    let mut header = Vec::with_capacity(14);
    let first = (frame.fin as u8) << 7 | frame.opcode.raw();
    header.push(first);

    let len = frame.payload.len();
    let mask_bit = if mask { 0x80 } else { 0x00 };
    if len < 126 {
        header.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        header.push(mask_bit | 126);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(mask_bit | 127);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    w.write_all(&header).await?;
    if mask {
        let mut key = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut key);
        w.write_all(&key).await?;
        let mut masked = frame.payload.clone();
        for (i, byte) in masked.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
        w.write_all(&masked).await?;
    } else {
        w.write_all(&frame.payload).await?;
    }
    w.flush().await
}

pub enum Message {
    Data(Vec<u8>),
    Close,
    Ping(Vec<u8>),
    Pong,
}

/// Reassembles a sequence of `Continuation`-linked frames into one message,
/// passing control frames through immediately regardless of any fragment
/// in progress (RFC 6455 §5.4 permits control frames interleaved mid-message).
pub struct Reassembler {
    opcode: Option<Opcode>,
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Reassembler {
        Reassembler {
            opcode: None,
            buffer: Vec::new(),
        }
    }

    pub fn feed(&mut self, frame: Frame) -> Option<Message> {
        match frame.opcode {
            Opcode::Close => return Some(Message::Close),
            Opcode::Ping => return Some(Message::Ping(frame.payload)),
            Opcode::Pong => return Some(Message::Pong),
            Opcode::Text | Opcode::Binary => {
                self.opcode = Some(frame.opcode);
                self.buffer.clear();
                self.buffer.extend_from_slice(&frame.payload);
            }
            Opcode::Continuation => {
                self.buffer.extend_from_slice(&frame.payload);
            }
        }

        if frame.fin {
            self.opcode = None;
            Some(Message::Data(std::mem::take(&mut self.buffer)))
        } else {
            None
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
