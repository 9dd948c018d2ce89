//! Protocol constants
//!
//! Byte values, terminators and limits shared by the host engine and the
//! device-side companion routines.

// ============================================================================
// Control Bytes
// ============================================================================

/// First byte of every transfer frame.
pub const BLOCK_START: u8 = 0x01;
/// Terminates the file name sent ahead of a transfer.
pub const NUL: u8 = 0x00;
/// Positive acknowledgment of a name or frame.
pub const ACK: u8 = 0x06;
/// Negative acknowledgment sent by the `recv` routine on a malformed frame.
pub const NAK: u8 = 0x15;
/// Sent by the host to tell the `send` routine to start streaming.
pub const TRANSFER_START: u8 = b'C';

// ============================================================================
// Framing
// ============================================================================

/// Maximum payload bytes carried by one frame.
pub const CHUNK_SIZE: usize = 128;
/// Size of the frame header (start byte + length byte).
pub const FRAME_HEADER_SIZE: usize = 2;
/// Total size of every frame on the wire, including padding.
pub const FRAME_SIZE: usize = FRAME_HEADER_SIZE + CHUNK_SIZE;
/// Upper bound of bytes the receive side keeps buffered ahead of decoding.
pub const MAX_BUFFERED_FRAMES: usize = 4;

// ============================================================================
// Text Layer
// ============================================================================

/// Line terminator appended to every statement sent to the interpreter.
pub const LINE_TERMINATOR: &str = "\n";
/// The interactive prompt printed after every executed line.
pub const PROMPT: &[u8] = b"> ";
/// Prompt printed once the `recv` routine is waiting for a file name.
pub const RECV_PROMPT: &[u8] = b"C> ";
/// Marker printed during synchronization.
pub const SYNC_MARKER: &str = "%sync%";
/// Full terminator expected after the sync statement.
pub const SYNC_TERMINATOR: &[u8] = b"%sync%\r\n> ";
/// Characters sent to give the device's autobaud detector enough edges.
pub const AUTOBAUD_PREAMBLE: &str = "UUUUUUUUUUUU";

/// Substrings in an interpreter reply that indicate the line was rejected.
pub const ERROR_MARKERS: &[&str] = &["unexpected", "stdin"];
/// Substring printed by `print(name)` when `name` is a callable routine.
pub const FUNCTION_MARKER: &str = "function:";
/// Substring printed by `file.format()` on success.
pub const FORMAT_DONE_MARKER: &str = "format done";

// ============================================================================
// Device Limits
// ============================================================================

/// Longest file name the device filesystem accepts.
pub const MAX_FS_NAME_LEN: usize = 31;
/// Slack allowed on top of the companion source length when judging whether
/// a bootstrap reply is implausibly long.
pub const BOOTSTRAP_RESPONSE_SLACK: usize = 10;

/// Baud rate used by the device's firmware after a reset.
pub const DEFAULT_BAUD: u32 = 115_200;
