//! Error types for the transfer engine.

use bytes::Bytes;
use nodeup_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while talking to a device.
///
/// None of these are retried internally; the caller decides whether to repeat
/// a whole operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The expected terminator did not arrive before the deadline.
    #[error("timeout waiting for data, got {} bytes: `{}`", .buffer.len(), .buffer.escape_ascii())]
    Timeout {
        /// Everything received before the deadline.
        buffer: Bytes,
    },

    /// The device replied, but not with what was expected.
    #[error("bad response: expected `{}` != actual `{}`", .expected.escape_ascii(), .actual.escape_ascii())]
    BadResponse {
        /// Expected terminator or byte.
        expected: Bytes,
        /// What was actually received.
        actual: Bytes,
    },

    /// Synchronization timed out: the device is absent or on another port.
    #[error("device not found or wrong port ({port})")]
    DeviceNotFound {
        /// Port that was being synchronized.
        port: String,
    },

    /// A single-byte acknowledgment was expected but something else arrived.
    #[error("device did not ACK {context}: got {}", describe_byte(.received))]
    NoAck {
        /// What was being acknowledged.
        context: String,
        /// The byte that arrived instead, if any.
        received: Option<u8>,
    },

    /// The transferred content does not match the local content.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// A remote path was rejected before anything was sent.
    #[error("validation failed: {0}")]
    Validation(#[source] ProtocolError),

    /// A companion program line was not accepted by the interpreter.
    #[error("error when preparing device, line `{line}` got `{response}`")]
    Bootstrap {
        /// The line that was sent.
        line: String,
        /// The interpreter's reply.
        response: String,
    },

    /// The interpreter reported an error for a statement.
    #[error("device reported an error for `{command}`: `{response}`")]
    RemoteError {
        /// The statement that was sent.
        command: String,
        /// The interpreter's reply.
        response: String,
    },

    /// Framing error during a binary transfer.
    #[error("transfer protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was already closed.
    #[error("session is closed")]
    Closed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

/// Post-transfer verification failures.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Downloaded bytes differ from the uploaded bytes.
    #[error("raw verification of {path} failed: sent {local_len} bytes, read back {remote_len} bytes that differ")]
    ContentMismatch {
        /// Remote path.
        path: String,
        /// Length of the local content.
        local_len: usize,
        /// Length of the downloaded content.
        remote_len: usize,
    },

    /// Remote digest differs from the local digest.
    #[error("SHA1 verification of {path} failed: local {local} != remote {remote}")]
    DigestMismatch {
        /// Remote path.
        path: String,
        /// Digest of the local content.
        local: String,
        /// Digest reported by the device.
        remote: String,
    },

    /// The device reply contained no digest.
    #[error("SHA1 verification of {path} failed: no digest in `{response}`")]
    DigestMissing {
        /// Remote path.
        path: String,
        /// The device reply.
        response: String,
    },
}

impl Error {
    /// Whether the device stayed silent (as opposed to replying unexpectedly).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::DeviceNotFound { .. })
    }

    pub(crate) fn bad_response(expected: &[u8], actual: &[u8]) -> Self {
        Error::BadResponse {
            expected: Bytes::copy_from_slice(expected),
            actual: Bytes::copy_from_slice(actual),
        }
    }
}

fn describe_byte(byte: &Option<u8>) -> String {
    match byte {
        Some(b) => format!("0x{:02X}", b),
        None => "nothing".to_string(),
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
