//! TCP channel with length-prefixed frames

use super::{Channel, Connector};
use crate::config::BridgeConfig;
use crate::protocol::FrameCodec;
use crate::{BridgeError, Result};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const ACCEPT_POLL: Duration = Duration::from_millis(5);

/// Channel over a connected TCP stream
pub struct TcpChannel {
    stream: TcpStream,
    codec: FrameCodec,
    closed: bool,
}

impl TcpChannel {
    /// Connect to a listening agent
    pub fn connect<A: ToSocketAddrs>(addr: A, codec: FrameCodec) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, codec)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, codec: FrameCodec) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            codec,
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    fn peek_pending(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        match self.stream.peek(&mut byte) {
            Ok(0) => Err(BridgeError::ChannelClosed),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(map_io(e.into(), None)),
        }
    }
}

/// Translate socket failures into channel-level errors
fn map_io(err: BridgeError, timeout: Option<Duration>) -> BridgeError {
    match err {
        BridgeError::IoError(e) => match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                BridgeError::Timeout(timeout.unwrap_or_default())
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => BridgeError::ChannelClosed,
            _ => BridgeError::IoError(e),
        },
        other => other,
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }
        self.codec
            .write_frame(&mut self.stream, payload)
            .map_err(|e| map_io(e, None))
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }
        self.stream.set_read_timeout(timeout)?;
        self.codec
            .read_frame(&mut self.stream)
            .map_err(|e| map_io(e, timeout))
    }

    fn has_pending(&mut self) -> Result<bool> {
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }
        self.stream.set_nonblocking(true)?;
        let pending = self.peek_pending();
        self.stream.set_nonblocking(false)?;
        pending
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Listens for exactly one simulation connection
pub struct TcpAcceptor {
    listener: TcpListener,
    codec: FrameCodec,
}

impl TcpAcceptor {
    /// Bind to `config.bind_addr:config.port` (a random port when unset)
    pub fn bind(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr())?;
        let addr = listener.local_addr()?;
        info!(%addr, port = addr.port(), "Listening for a simulation");
        Ok(Self {
            listener,
            codec: FrameCodec::new(config.max_frame_len),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn accept_blocking(&self) -> Result<TcpStream> {
        self.listener.set_nonblocking(false)?;
        let (stream, _) = self.listener.accept()?;
        Ok(stream)
    }

    fn accept_within(&self, timeout: Duration) -> Result<TcpStream> {
        self.listener.set_nonblocking(true)?;
        let start = Instant::now();
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(BridgeError::Timeout(timeout));
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Connector for TcpAcceptor {
    type Channel = TcpChannel;

    fn connect(&mut self, timeout: Option<Duration>) -> Result<TcpChannel> {
        let stream = match timeout {
            Some(t) => self.accept_within(t)?,
            None => self.accept_blocking()?,
        };
        debug!(peer = ?stream.peer_addr().ok(), "Simulation connected");
        TcpChannel::from_stream(stream, self.codec)
    }
}
