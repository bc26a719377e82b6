//! In-process channel over crossbeam queues

use super::{Channel, Connector};
use crate::protocol::FrameCodec;
use crate::{BridgeError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// One end of an in-process channel.
///
/// Payloads travel as frames, so a peer writing raw bytes with
/// [`MemoryChannel::send_raw`] exercises the same framing checks as a socket.
pub struct MemoryChannel {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    peeked: Option<Vec<u8>>,
    codec: FrameCodec,
}

impl MemoryChannel {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        Self::pair_with_codec(FrameCodec::default())
    }

    /// Create two connected ends with a custom frame limit
    pub fn pair_with_codec(codec: FrameCodec) -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let a = Self {
            tx: Some(a_tx),
            rx: a_rx,
            peeked: None,
            codec,
        };
        let b = Self {
            tx: Some(b_tx),
            rx: b_rx,
            peeked: None,
            codec,
        };
        (a, b)
    }

    /// Send bytes to the peer without framing them
    pub fn send_raw(&mut self, bytes: Vec<u8>) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(BridgeError::ChannelClosed)?;
        tx.send(bytes).map_err(|_| BridgeError::ChannelClosed)
    }

    fn unframe(&self, frame: Vec<u8>) -> Result<Vec<u8>> {
        self.codec.decode_frame(&frame).map(<[u8]>::to_vec)
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let frame = self.codec.encode_frame(payload)?;
        self.send_raw(frame)
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if self.tx.is_none() {
            return Err(BridgeError::ChannelClosed);
        }
        if let Some(frame) = self.peeked.take() {
            return self.unframe(frame);
        }
        let frame = match timeout {
            Some(t) => self.rx.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => BridgeError::Timeout(t),
                RecvTimeoutError::Disconnected => BridgeError::ChannelClosed,
            })?,
            None => self.rx.recv().map_err(|_| BridgeError::ChannelClosed)?,
        };
        self.unframe(frame)
    }

    fn has_pending(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.rx.try_recv() {
            Ok(frame) => {
                self.peeked = Some(frame);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => Err(BridgeError::ChannelClosed),
        }
    }

    fn close(&mut self) {
        self.tx = None;
        self.peeked = None;
    }
}

/// Accepting side of an in-process connection
pub struct MemoryConnector {
    incoming: Receiver<MemoryChannel>,
}

/// Dialing side paired with a [`MemoryConnector`]
#[derive(Clone)]
pub struct MemoryDialer {
    outgoing: Sender<MemoryChannel>,
    codec: FrameCodec,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryDialer) {
        Self::with_codec(FrameCodec::default())
    }

    pub fn with_codec(codec: FrameCodec) -> (Self, MemoryDialer) {
        let (outgoing, incoming) = unbounded();
        (Self { incoming }, MemoryDialer { outgoing, codec })
    }
}

impl MemoryDialer {
    /// Open a channel to the connector and return the dialing end
    pub fn dial(&self) -> Result<MemoryChannel> {
        let (local, remote) = MemoryChannel::pair_with_codec(self.codec);
        self.outgoing
            .send(remote)
            .map_err(|_| BridgeError::ChannelClosed)?;
        Ok(local)
    }
}

impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    fn connect(&mut self, timeout: Option<Duration>) -> Result<MemoryChannel> {
        match timeout {
            Some(t) => self.incoming.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => BridgeError::Timeout(t),
                RecvTimeoutError::Disconnected => BridgeError::ChannelClosed,
            }),
            None => self.incoming.recv().map_err(|_| BridgeError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (mut a, mut b) = MemoryChannel::pair();
        a.send(b"one").unwrap();
        a.send(b"two").unwrap();
        assert_eq!(b.recv(None).unwrap(), b"one");
        assert_eq!(b.recv(None).unwrap(), b"two");
    }

    #[test]
    fn test_has_pending_keeps_payload() {
        let (mut a, mut b) = MemoryChannel::pair();
        assert!(!b.has_pending().unwrap());
        a.send(b"hello").unwrap();
        assert!(b.has_pending().unwrap());
        assert!(b.has_pending().unwrap());
        assert_eq!(b.recv(None).unwrap(), b"hello");
    }

    #[test]
    fn test_timeout_and_close() {
        let (mut a, mut b) = MemoryChannel::pair();
        let t = Duration::from_millis(10);
        assert!(matches!(b.recv(Some(t)), Err(BridgeError::Timeout(_))));

        a.close();
        assert!(matches!(b.recv(Some(t)), Err(BridgeError::ChannelClosed)));
        assert!(matches!(b.has_pending(), Err(BridgeError::ChannelClosed)));
        assert!(matches!(a.send(b"late"), Err(BridgeError::ChannelClosed)));
    }

    #[test]
    fn test_raw_bytes_are_checked_as_frames() {
        let (mut a, mut b) = MemoryChannel::pair();
        a.send_raw(vec![0, 0, 0, 9, 1]).unwrap();
        assert!(matches!(b.recv(None), Err(BridgeError::Framing(_))));
    }

    #[test]
    fn test_connector() {
        let (mut connector, dialer) = MemoryConnector::pair();
        let t = Duration::from_millis(10);
        assert!(matches!(connector.connect(Some(t)), Err(BridgeError::Timeout(_))));

        let mut sim = dialer.dial().unwrap();
        let mut agent = connector.connect(Some(t)).unwrap();
        sim.send(b"ping").unwrap();
        assert_eq!(agent.recv(Some(t)).unwrap(), b"ping");
    }
}
