//! Record-separator framing for the agent socket.
//!
//! Every message on the wire is terminated by a single [`RECORD_SEPARATOR`]
//! byte (ASCII RS, `0x1E`). There is no length prefix.
//!
//! - [`SendBuffer`] is the fixed-capacity buffer outbound notifications are
//!   formatted into before being written.
//! - [`FrameDecoder`] is the fixed-capacity receive buffer that accumulates
//!   partial reads until a read ends with the separator.

use std::fmt::{self, Write as _};

use crate::error::ChannelError;

/// End-of-message marker.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Default send buffer capacity (100 KiB).
pub const SEND_BUF_SIZE: usize = 100 * 1024;

/// Default receive buffer capacity (1 MiB).
pub const RECV_BUF_SIZE: usize = 1024 * 1024;

/// Frame an arbitrary message: the message bytes followed by the separator.
pub fn encode_frame(message: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + 1);
    frame.extend_from_slice(message);
    frame.push(RECORD_SEPARATOR);
    frame
}

fn allocate(size: usize) -> Result<Vec<u8>, ChannelError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| ChannelError::OutOfMemory { size })?;
    Ok(buf)
}

/// Outbound buffer with a hard capacity.
///
/// Formatted text longer than `capacity - 1` bytes is truncated so that the
/// message plus its separator always fit without reallocating.
#[derive(Debug)]
pub struct SendBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl SendBuffer {
    /// Allocate the buffer up front.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfMemory`] if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Result<Self, ChannelError> {
        Ok(Self {
            buf: allocate(capacity)?,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the buffer contents with `message`, truncating if needed.
    ///
    /// Returns `true` if the text was truncated.
    pub fn format(&mut self, message: impl fmt::Display) -> bool {
        self.buf.clear();
        let mut writer = Truncating {
            buf: &mut self.buf,
            limit: self.capacity.saturating_sub(1),
            truncated: false,
        };
        // Truncating never reports an error
        let _ = write!(writer, "{message}");
        writer.truncated
    }

    /// The formatted message, without separator.
    pub fn message(&self) -> &[u8] {
        match self.buf.last() {
            Some(&RECORD_SEPARATOR) => &self.buf[..self.buf.len() - 1],
            _ => &self.buf,
        }
    }

    /// Append the separator (once) and return the complete frame.
    pub fn frame(&mut self) -> &[u8] {
        if self.buf.last() != Some(&RECORD_SEPARATOR) {
            self.buf.push(RECORD_SEPARATOR);
        }
        &self.buf
    }
}

struct Truncating<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.buf.len();
        if s.len() > room {
            self.buf.extend_from_slice(&s.as_bytes()[..room]);
            self.truncated = true;
        } else {
            self.buf.extend_from_slice(s.as_bytes());
        }
        Ok(())
    }
}

/// Result of feeding freshly read bytes into a [`FrameDecoder`].
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// The read ended with a separator; the accumulated bytes without it.
    Frame(&'a [u8]),
    /// More bytes are needed.
    Pending,
    /// The buffer filled up without a separator and was discarded.
    Overflow,
}

/// Receive buffer accumulating partial reads.
///
/// A frame is complete when the last byte received is the separator. Only the
/// tail is inspected, so two frames arriving in one read are delivered as a
/// single message containing an embedded separator.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    count: usize,
}

impl FrameDecoder {
    /// Allocate a zeroed receive buffer of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::OutOfMemory`] if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Result<Self, ChannelError> {
        let mut buf = allocate(capacity)?;
        buf.resize(capacity, 0);
        Ok(Self { buf, count: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Writable tail of the buffer for the next read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.count..]
    }

    /// Record `n` bytes written into [`spare_mut`](Self::spare_mut).
    pub fn advance(&mut self, n: usize) -> Decoded<'_> {
        self.count = (self.count + n).min(self.buf.len());

        if self.count > 0 && self.buf[self.count - 1] == RECORD_SEPARATOR {
            let end = self.count - 1;
            self.count = 0;
            return Decoded::Frame(&self.buf[..end]);
        }

        if self.count == self.buf.len() {
            self.count = 0;
            return Decoded::Overflow;
        }

        Decoded::Pending
    }

    /// Convenience for tests and in-memory sources: copy `bytes` in and advance.
    ///
    /// Bytes beyond the remaining capacity are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Decoded<'_> {
        let spare = self.spare_mut();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.advance(n)
    }
}
