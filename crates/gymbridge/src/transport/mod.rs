//! Message channels between a simulation and an agent.
//!
//! A [`Channel`] moves whole payloads in both directions, one at a time. A
//! [`Connector`] waits for the other side and produces a channel.

mod memory;
mod tcp;

pub use memory::{MemoryChannel, MemoryConnector, MemoryDialer};
pub use tcp::{TcpAcceptor, TcpChannel};

use crate::Result;
use std::time::Duration;

/// Bidirectional payload channel
pub trait Channel: Send {
    /// Send one payload
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Receive one payload, waiting at most `timeout` (`None` waits forever)
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>>;

    /// Whether a payload (or the end of the stream) is already waiting.
    ///
    /// Never blocks. A closed peer with nothing left to read is `ChannelClosed`.
    fn has_pending(&mut self) -> Result<bool>;

    /// Close the channel; the peer observes `ChannelClosed`
    fn close(&mut self);
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        (**self).send(payload)
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        (**self).recv(timeout)
    }

    fn has_pending(&mut self) -> Result<bool> {
        (**self).has_pending()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Establishes a channel to the other side
pub trait Connector: Send {
    type Channel: Channel;

    /// Wait at most `timeout` for the other side to connect
    fn connect(&mut self, timeout: Option<Duration>) -> Result<Self::Channel>;
}
