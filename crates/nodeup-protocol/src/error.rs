//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes arrived to make up a full frame.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected frame length.
        expected: usize,
        /// Bytes actually buffered.
        actual: usize,
    },

    /// The first byte of a frame was not the block start marker.
    #[error("bad block size or start byte: 0x{0:02X}")]
    BadStartByte(u8),

    /// A payload does not fit into a single frame.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum payload length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// The receive buffer would grow past its bound.
    #[error("receive buffer overflow: maximum {max} bytes, got {actual}")]
    BufferOverflow {
        /// Maximum number of buffered bytes.
        max: usize,
        /// Number of bytes that would have been buffered.
        actual: usize,
    },

    /// A remote path is empty or longer than the device allows.
    #[error("remote path must be 1-{max} bytes, got {len}: {path:?}", max = crate::MAX_FS_NAME_LEN)]
    PathLength {
        /// Offending path.
        path: String,
        /// Its length in bytes.
        len: usize,
    },

    /// A device reply could not be parsed.
    #[error("failed to parse response: {0}")]
    ParseError(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
