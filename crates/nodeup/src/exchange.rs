//! Deadline exchange: the write-then-wait primitive under every interaction.
//!
//! [`Link`] wraps a [`Transport`] and accumulates incoming bytes until a
//! terminator shows up at the tail of the buffer or a deadline passes. The
//! two failure kinds are kept apart so callers can tell a silent device
//! ([`Error::Timeout`]) from one that replied with something else
//! ([`Error::BadResponse`]).

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use nodeup_protocol::{encode_line, PROMPT};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Transport read timeout used while polling in [`PollingMode::Fine`].
pub const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Replies longer than this without a terminator are treated as garbage.
pub const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// How [`Link::read_until`] waits for bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingMode {
    /// Poll with a sub-millisecond read timeout.
    Fine,
    /// Block for the whole remaining time on each read. For platforms whose
    /// drivers do not honor sub-millisecond timeouts.
    Coarse,
}

impl Default for PollingMode {
    fn default() -> Self {
        if cfg!(windows) {
            PollingMode::Coarse
        } else {
            PollingMode::Fine
        }
    }
}

/// Request/response channel to the device.
#[derive(Debug)]
pub struct Link<T> {
    transport: T,
    polling: PollingMode,
}

impl<T: Transport> Link<T> {
    /// Wrap a transport.
    pub fn new(transport: T, polling: PollingMode) -> Self {
        Link { transport, polling }
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The wrapped transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Write raw bytes and flush. `binary` only changes how the bytes are
    /// logged.
    pub fn write(&mut self, data: &[u8], binary: bool) -> Result<()> {
        if binary {
            debug!("write binary: {}", hex::encode(data));
        } else {
            debug!("write: {:?}", String::from_utf8_lossy(data));
        }
        self.transport.write_all(data)?;
        self.transport.flush()
    }

    /// Write a statement followed by the line terminator.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write(&encode_line(line), false)
    }

    /// Read until the buffer ends with `terminator` or `timeout` elapses.
    ///
    /// Bytes are read one at a time so nothing past the terminator is
    /// consumed. Returns the whole buffer, terminator included.
    pub fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut buffer = BytesMut::new();
        let mut byte = [0u8; 1];

        loop {
            if buffer.ends_with(terminator) {
                debug!("read: {:?}", String::from_utf8_lossy(&buffer));
                return Ok(buffer.freeze());
            }
            if buffer.len() >= MAX_RESPONSE_LEN {
                return Err(Error::bad_response(terminator, &buffer));
            }
            match self.read_before(&mut byte, deadline) {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        debug!("timeout after {:?}, read: {:?}", timeout, String::from_utf8_lossy(&buffer));
                        return Err(Error::Timeout {
                            buffer: buffer.freeze(),
                        });
                    }
                }
                Ok(_) => buffer.put_u8(byte[0]),
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("end of stream, read: {:?}", String::from_utf8_lossy(&buffer));
                    return Err(Error::bad_response(terminator, &buffer));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a statement and read its reply up to the prompt.
    pub fn exchange(&mut self, command: &str, timeout: Duration) -> Result<Bytes> {
        self.write_line(command)?;
        self.read_until(PROMPT, timeout)
    }

    /// Read a single byte, or `None` if nothing arrived within `timeout`.
    pub fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            if self.read_before(&mut byte, deadline)? == 1 {
                trace!("read byte 0x{:02X}", byte[0]);
                return Ok(Some(byte[0]));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Read up to `buf.len()` bytes, giving up at `deadline`.
    ///
    /// Returns `Ok(0)` once the deadline has passed with nothing read.
    pub fn read_available(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize> {
        loop {
            let n = self.read_before(buf, deadline)?;
            if n > 0 || Instant::now() >= deadline {
                return Ok(n);
            }
        }
    }

    /// Collect whatever arrives within `window`. Used to capture diagnostics
    /// after a failed handshake; errors are folded into an empty result.
    pub fn drain(&mut self, window: Duration) -> Bytes {
        let deadline = Instant::now() + window;
        let mut collected = BytesMut::new();
        let mut buf = [0u8; 256];
        while collected.len() < MAX_RESPONSE_LEN {
            match self.read_available(&mut buf, deadline) {
                Ok(0) | Err(_) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
            }
        }
        collected.freeze()
    }

    /// Discard pending input and output.
    pub fn clear_buffers(&mut self) -> Result<()> {
        trace!("clearing buffers");
        self.transport.clear_buffers()
    }

    /// One transport read with a timeout that does not overshoot `deadline`.
    fn read_before(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = match self.polling {
            PollingMode::Fine => remaining.min(POLL_INTERVAL),
            PollingMode::Coarse => remaining,
        };
        if self.transport.timeout() != wait {
            self.transport.set_timeout(wait)?;
        }
        self.transport.read(buf)
    }
}
