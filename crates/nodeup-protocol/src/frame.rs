//! Frame encoding/decoding utilities.
//!
//! Chunked transfers use fixed-size frames so that the device-side routine can
//! ask the UART driver for exactly one frame at a time:
//!
//! ```text
//! +-------+-----+-------------------+----------------------+
//! | 0x01  | len | data[0..len]      | 0x00 * (128 - len)   |
//! +-------+-----+-------------------+----------------------+
//! ```
//!
//! The length prefix rather than a sentinel value marks the end of the file:
//! a frame with `len == 0` is the terminal frame, even when the file size is
//! a multiple of [`CHUNK_SIZE`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{BLOCK_START, CHUNK_SIZE, FRAME_SIZE, MAX_BUFFERED_FRAMES};
use crate::error::{ProtocolError, ProtocolResult};

/// A single transfer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame carrying `payload`.
    ///
    /// Fails if the payload is longer than [`CHUNK_SIZE`].
    pub fn new(payload: impl Into<Bytes>) -> ProtocolResult<Self> {
        let payload = payload.into();
        if payload.len() > CHUNK_SIZE {
            return Err(ProtocolError::PayloadTooLong {
                max: CHUNK_SIZE,
                actual: payload.len(),
            });
        }
        Ok(Frame { payload })
    }

    /// The zero-length frame that ends a transfer.
    pub fn terminal() -> Self {
        Frame {
            payload: Bytes::new(),
        }
    }

    /// Split `content` into frames of at most [`CHUNK_SIZE`] bytes.
    ///
    /// The terminal frame is not included.
    pub fn chunks(content: &[u8]) -> impl Iterator<Item = Frame> + '_ {
        content.chunks(CHUNK_SIZE).map(|chunk| Frame {
            payload: Bytes::copy_from_slice(chunk),
        })
    }

    /// Payload carried by this frame.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether this is the terminal frame.
    pub fn is_terminal(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode the frame for transmission. The result is always
    /// [`FRAME_SIZE`] bytes long.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_SIZE);
        buf.put_u8(BLOCK_START);
        buf.put_u8(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        buf.resize(FRAME_SIZE, 0);
        buf
    }
}

/// Accumulates received bytes and slices them into frames.
///
/// Bytes past the end of a decoded frame stay buffered for the next call, so
/// frames arriving back-to-back are not lost. The buffer is bounded at
/// [`MAX_BUFFERED_FRAMES`] frames.
#[derive(Debug)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Maximum number of buffered bytes.
    capacity: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(FRAME_SIZE),
            capacity: FRAME_SIZE * MAX_BUFFERED_FRAMES,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let wanted = self.buffer.len() + data.len();
        if wanted > self.capacity {
            return Err(ProtocolError::BufferOverflow {
                max: self.capacity,
                actual: wanted,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Number of bytes still missing before a full frame is buffered.
    pub fn missing(&self) -> usize {
        FRAME_SIZE.saturating_sub(self.buffer.len())
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. The start byte is checked
    /// only once a whole frame is buffered.
    pub fn decode(&mut self) -> ProtocolResult<Option<Frame>> {
        if self.buffer.len() < FRAME_SIZE {
            return Ok(None);
        }
        if self.buffer[0] != BLOCK_START {
            return Err(ProtocolError::BadStartByte(self.buffer[0]));
        }

        let len = self.buffer[1] as usize;
        if len > CHUNK_SIZE {
            return Err(ProtocolError::PayloadTooLong {
                max: CHUNK_SIZE,
                actual: len,
            });
        }

        let mut frame = self.buffer.split_to(FRAME_SIZE);
        frame.advance(2);
        frame.truncate(len);
        log::trace!("decoded frame with {} bytes, {} carried over", len, self.buffer.len());
        Ok(Some(Frame {
            payload: frame.freeze(),
        }))
    }

    /// Decode a frame, treating a short buffer as an error.
    ///
    /// Used once the read deadline has passed.
    pub fn finish(&mut self) -> ProtocolResult<Frame> {
        match self.decode()? {
            Some(frame) => Ok(frame),
            None => Err(ProtocolError::FrameTooShort {
                expected: FRAME_SIZE,
                actual: self.buffer.len(),
            }),
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Buffered bytes, for diagnostics.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}
