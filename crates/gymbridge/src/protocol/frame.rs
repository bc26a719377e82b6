//! Length-prefixed framing for stream transports.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload.

use crate::{BridgeError, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 4;

/// Default upper bound on a single payload (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frame reader/writer with a payload size limit
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Prefix `payload` with its length
    pub fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let len = self.check_len(payload.len())?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Split a complete frame held in memory; the declared length must match
    /// the bytes that follow the header exactly.
    pub fn decode_frame<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8]> {
        if frame.len() < HEADER_LEN {
            return Err(BridgeError::Framing(format!(
                "truncated header: {} of {} bytes",
                frame.len(),
                HEADER_LEN
            )));
        }
        let (header, payload) = frame.split_at(HEADER_LEN);
        let declared = self.declared_len(header)?;
        if payload.len() != declared {
            return Err(BridgeError::Framing(format!(
                "frame declares {} bytes but carries {}",
                declared,
                payload.len()
            )));
        }
        Ok(payload)
    }

    /// Write one frame and flush
    pub fn write_frame<W: Write>(&self, writer: &mut W, payload: &[u8]) -> Result<()> {
        let frame = self.encode_frame(payload)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one frame.
    ///
    /// A clean end of stream before any header byte is `ChannelClosed`; an end
    /// of stream inside a frame is a `Framing` error.
    pub fn read_frame<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        let got = read_full(reader, &mut header)?;
        if got == 0 {
            return Err(BridgeError::ChannelClosed);
        }
        if got < HEADER_LEN {
            return Err(BridgeError::Framing(format!(
                "truncated header: {} of {} bytes",
                got, HEADER_LEN
            )));
        }
        let declared = self.declared_len(&header)?;
        let mut payload = vec![0u8; declared];
        let got = read_full(reader, &mut payload)?;
        if got < declared {
            return Err(BridgeError::Framing(format!(
                "truncated payload: {} of {} bytes",
                got, declared
            )));
        }
        Ok(payload)
    }

    fn declared_len(&self, header: &[u8]) -> Result<usize> {
        let mut bytes = [0u8; HEADER_LEN];
        bytes.copy_from_slice(&header[..HEADER_LEN]);
        let declared = u32::from_be_bytes(bytes) as usize;
        if declared > self.max_frame_len {
            return Err(BridgeError::Framing(format!(
                "frame of {} bytes exceeds limit of {}",
                declared, self.max_frame_len
            )));
        }
        Ok(declared)
    }

    fn check_len(&self, len: usize) -> Result<u32> {
        if len > self.max_frame_len {
            return Err(BridgeError::Framing(format!(
                "payload of {} bytes exceeds limit of {}",
                len, self.max_frame_len
            )));
        }
        u32::try_from(len)
            .map_err(|_| BridgeError::Framing(format!("payload of {} bytes too large", len)))
    }
}

/// Fill `buf` as far as the stream allows, returning the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
