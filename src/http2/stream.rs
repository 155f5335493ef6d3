//! Per-stream state (RFC 7540 §5.1): the idle → open → half-closed →
//! closed lifecycle and the stream's flow-control window.

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// An inbound chunk delivered to whoever is reading a stream: either body
/// bytes or the end-of-stream marker carried by a HEADERS/DATA frame's
/// `END_STREAM` flag.
pub enum StreamEvent {
    Data(Bytes),
    Headers(Vec<(String, String)>),
    Eof,
    Reset(u32),
}

/// One HTTP/2 stream's state, flow-control window, and inbound event queue.
pub struct Stream {
    pub id: u32,
    state: StreamState,
    pub send_window: i64,
    pub recv_window: i64,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    closed: Notify,
}

impl Stream {
    pub fn new(id: u32, initial_send_window: u32, initial_recv_window: u32) -> Stream {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Stream {
            id,
            state: StreamState::Idle,
            send_window: initial_send_window as i64,
            recv_window: initial_recv_window as i64,
            events_tx,
            events_rx: Some(events_rx),
            closed: Notify::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events_rx.take()
    }

    pub fn deliver(&self, event: StreamEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Transition on sending a HEADERS/DATA frame. `end_stream` is the
    /// frame's `END_STREAM` flag.
    pub fn on_send(&mut self, end_stream: bool) -> Result<()> {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (StreamState::Open, false) => StreamState::Open,
            (StreamState::Open, true) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedRemote, false) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedRemote, true) => {
                self.closed.notify_waiters();
                StreamState::Closed
            }
            (other, _) => {
                return Err(Error::invalid_frame().with_where("http2::stream: send in invalid state")
                    .with_cause(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("{other:?}"),
                    )))
            }
        };
        Ok(())
    }

    /// Transition on receiving a HEADERS/DATA frame.
    pub fn on_receive(&mut self, end_stream: bool) -> Result<()> {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedRemote,
            (StreamState::Open, false) => StreamState::Open,
            (StreamState::Open, true) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedLocal, false) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedLocal, true) => {
                self.closed.notify_waiters();
                StreamState::Closed
            }
            (other, _) => {
                return Err(Error::invalid_frame().with_where("http2::stream: receive in invalid state")
                    .with_cause(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("{other:?}"),
                    )))
            }
        };
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = StreamState::Closed;
        self.closed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    pub async fn wait_closed(&self) {
        if self.is_closed() {
            return;
        }
        self.closed.notified().await;
    }

    /// Apply a WINDOW_UPDATE increment to the send-side window, rejecting
    /// increments that would overflow past the RFC 7540 §6.9.1 limit.
    pub fn apply_send_increment(&mut self, increment: u32) -> Result<()> {
        let updated = self.send_window + increment as i64;
        if updated > 0x7FFF_FFFF {
            return Err(Error::flow_control().with_where("http2::stream: send window overflow"));
        }
        self.send_window = updated;
        Ok(())
    }

    pub fn debit_send(&mut self, n: u32) -> Result<()> {
        if (n as i64) > self.send_window {
            return Err(Error::flow_control().with_where("http2::stream: send window exhausted"));
        }
        self.send_window -= n as i64;
        Ok(())
    }

    pub fn debit_recv(&mut self, n: u32) -> Result<()> {
        if (n as i64) > self.recv_window {
            return Err(Error::flow_control().with_where("http2::stream: recv window exceeded"));
        }
        self.recv_window -= n as i64;
        Ok(())
    }

    pub fn credit_recv(&mut self, n: u32) {
        self.recv_window += n as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_request_response_cycle_closes_the_stream() {
        let mut s = Stream::new(1, 65_535, 65_535);
        s.on_send(false).unwrap(); // client HEADERS
        s.on_send(true).unwrap(); // client DATA end_stream
        assert_eq!(s.state(), StreamState::HalfClosedLocal);
        s.on_receive(false).unwrap(); // server HEADERS
        s.on_receive(true).unwrap(); // server DATA end_stream
        assert_eq!(s.state(), StreamState::Closed);
        assert!(s.is_closed());
    }

    #[test]
    fn flow_control_window_tracks_debits_and_credits() {
        let mut s = Stream::new(1, 100, 100);
        s.debit_send(60).unwrap();
        assert_eq!(s.send_window, 40);
        assert!(s.debit_send(50).is_err());
        s.apply_send_increment(50).unwrap();
        assert_eq!(s.send_window, 90);
    }
}
