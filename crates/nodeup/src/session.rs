//! Session lifecycle: synchronization, baud negotiation and close.

use std::thread;
use std::time::Duration;

use nodeup_protocol::{Command, Reply, SYNC_TERMINATOR};
use tracing::{debug, info, warn};

use crate::config::{timeout_from_secs, SessionConfig};
use crate::error::{Error, Result};
use crate::exchange::Link;
use crate::transport::{SerialTransport, Transport};

/// Time for the baud-change statement to leave the UART before the local
/// side switches.
pub const BAUD_SWITCH_DELAY: Duration = Duration::from_millis(100);

/// Timeout for `file.format()`, which takes far longer than other statements.
pub const FORMAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Where the handshake with the interpreter currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing is known about the interpreter.
    Unsynced,
    /// Pending input and output were discarded.
    BufferCleared,
    /// The neutral statement left the prompt in a clean state.
    DefinedState,
    /// The sync marker statement was sent.
    SyncMarkerSent,
    /// The marker came back followed by the prompt.
    Synced,
    /// The device was told to change its baud rate.
    BaudCommandSent,
    /// The local side switched to the new baud rate.
    LocalBaudSwitched,
}

/// An exclusive connection to one device.
///
/// Construction synchronizes with the interpreter and switches to the
/// configured baud rate. [`Session::close`] switches back to the start baud.
#[derive(Debug)]
pub struct Session<T: Transport> {
    pub(crate) link: Link<T>,
    port: String,
    baud: u32,
    start_baud: u32,
    timeout: Duration,
    autobaud_time: Duration,
    state: SyncState,
    closed: bool,
}

impl Session<SerialTransport> {
    /// Open the configured serial port and synchronize with the device.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::open(&config.port, config.start_baud, config.timeout())?;
        Session::new(transport, config)
    }
}

impl<T: Transport> Session<T> {
    /// Take ownership of an open transport and synchronize with the device.
    pub fn new(mut transport: T, config: &SessionConfig) -> Result<Self> {
        if transport.baud_rate()? != config.start_baud {
            transport.set_baud_rate(config.start_baud)?;
        }
        let mut session = Session {
            port: transport.name(),
            link: Link::new(transport, config.polling),
            baud: config.start_baud,
            start_baud: config.start_baud,
            timeout: config.timeout(),
            autobaud_time: config.autobaud_time(),
            state: SyncState::Unsynced,
            closed: false,
        };

        session.sync()?;
        if config.baud != config.start_baud {
            session.set_baudrate(config.baud)?;
        }
        Ok(session)
    }

    /// Force the interpreter into a known, idle prompt state.
    ///
    /// A timeout here means nothing is listening, so it is reported as
    /// [`Error::DeviceNotFound`].
    pub fn sync(&mut self) -> Result<()> {
        debug!("synchronizing with {} at {} baud", self.port, self.baud);
        self.state = SyncState::Unsynced;
        self.link.clear_buffers()?;

        if !self.autobaud_time.is_zero() {
            self.link.write(&Command::Autobaud.encode(), false)?;
            self.link.clear_buffers()?;
            thread::sleep(self.autobaud_time);
        }
        self.state = SyncState::BufferCleared;

        match self.link.exchange(&Command::Empty.to_command_string(), self.timeout) {
            Ok(_) => {}
            Err(Error::BadResponse { actual, .. }) => {
                debug!("discarding {} bytes of leftover output", actual.len());
            }
            Err(Error::Timeout { .. }) => return Err(self.device_not_found()),
            Err(e) => return Err(e),
        }
        self.state = SyncState::DefinedState;

        self.link.write_line(&Command::Sync.to_command_string())?;
        self.state = SyncState::SyncMarkerSent;
        match self.link.read_until(SYNC_TERMINATOR, self.timeout) {
            Ok(_) => {}
            Err(Error::Timeout { .. }) => return Err(self.device_not_found()),
            Err(e) => return Err(e),
        }

        self.state = SyncState::Synced;
        debug!("synchronized");
        Ok(())
    }

    /// Switch both ends to `baud` and synchronize again.
    pub fn set_baudrate(&mut self, baud: u32) -> Result<()> {
        if baud == self.baud {
            return Ok(());
        }
        self.switch_baud(baud)?;
        self.sync()
    }

    fn switch_baud(&mut self, baud: u32) -> Result<()> {
        info!("changing communication to {} baud", baud);
        self.link
            .write_line(&Command::UartSetup { baud, echo: true }.to_command_string())?;
        self.state = SyncState::BaudCommandSent;

        thread::sleep(BAUD_SWITCH_DELAY);
        self.link.transport_mut().set_baud_rate(baud)?;
        self.baud = baud;
        self.state = SyncState::LocalBaudSwitched;
        Ok(())
    }

    /// Change the response timeout. Zero means practically unbounded.
    pub fn set_timeout(&mut self, secs: u64) {
        self.timeout = timeout_from_secs(secs);
        debug!("timeout set to {:?}", self.timeout);
    }

    /// Send a statement and return the reply, prompt included.
    pub fn exchange(&mut self, command: &str) -> Result<Reply> {
        let timeout = self.timeout;
        self.exchange_with_timeout(command, timeout)
    }

    /// Like [`Session::exchange`] with an explicit timeout.
    pub fn exchange_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<Reply> {
        let raw = self.link()?.exchange(command, timeout)?;
        Ok(Reply::new(&raw))
    }

    /// Restore the start baud rate and flush the transport.
    ///
    /// Errors are logged and otherwise ignored. Calling this twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.baud != self.start_baud {
            if let Err(e) = self.switch_baud(self.start_baud) {
                warn!("failed to restore {} baud: {}", self.start_baud, e);
            }
        }
        if let Err(e) = self.link.transport_mut().flush() {
            warn!("flush on close failed: {}", e);
        }
        if let Err(e) = self.link.clear_buffers() {
            warn!("clearing buffers on close failed: {}", e);
        }
        debug!("closed {}", self.port);
        self.closed = true;
    }

    /// Name of the port this session talks to.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Current baud rate.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Baud rate the session started at and returns to on close.
    pub fn start_baud(&self) -> u32 {
        self.start_baud
    }

    /// Current response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handshake state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Whether [`Session::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub(crate) fn link(&mut self) -> Result<&mut Link<T>> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(&mut self.link)
    }

    fn device_not_found(&self) -> Error {
        warn!("no answer from {} at {} baud", self.port, self.baud);
        Error::DeviceNotFound {
            port: self.port.clone(),
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PollingMode;
    use std::collections::VecDeque;

    /// Answers every line with a canned reply and records baud changes.
    #[derive(Debug)]
    struct EchoTransport {
        pending: VecDeque<u8>,
        replies: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        timeout: Duration,
        baud: u32,
        baud_changes: Vec<u32>,
    }

    impl EchoTransport {
        fn new(replies: &[&[u8]]) -> Self {
            EchoTransport {
                pending: VecDeque::new(),
                replies: replies.iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
                timeout: Duration::ZERO,
                baud: 115_200,
                baud_changes: Vec::new(),
            }
        }
    }

    impl Transport for EchoTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.pending.pop_front() {
                Some(b) if !buf.is_empty() => {
                    buf[0] = b;
                    Ok(1)
                }
                _ => {
                    std::thread::sleep(self.timeout);
                    Ok(0)
                }
            }
        }

        fn write_all(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            if data.ends_with(b"\n") {
                if let Some(reply) = self.replies.pop_front() {
                    self.pending.extend(reply);
                }
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            Ok(())
        }

        fn baud_rate(&self) -> Result<u32> {
            Ok(self.baud)
        }

        fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
            self.baud = baud;
            self.baud_changes.push(baud);
            Ok(())
        }

        fn clear_buffers(&mut self) -> Result<()> {
            self.pending.clear();
            Ok(())
        }
    }

    fn quick_config() -> SessionConfig {
        SessionConfig::default()
            .with_timeout_secs(1)
            .with_autobaud_time(Duration::ZERO)
            .with_polling(PollingMode::Fine)
    }

    #[test]
    fn test_sync_sequence() {
        let transport = EchoTransport::new(&[b";\r\n> ", b"print(\"%sync%\");\r\n%sync%\r\n> "]);
        let session = Session::new(transport, &quick_config()).unwrap();
        assert_eq!(session.state(), SyncState::Synced);
        assert_eq!(session.transport().written, b";\nprint(\"%sync%\");\n");
    }

    #[test]
    fn test_silent_device_is_not_found() {
        let transport = EchoTransport::new(&[]);
        let err = Session::new(transport, &quick_config()).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { .. }), "got {:?}", err);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_baud_switch_and_restore() {
        let sync: &[&[u8]] = &[b";\r\n> ", b"%sync%\r\n> "];
        let mut replies: Vec<&[u8]> = sync.to_vec();
        replies.push(b"");
        replies.extend_from_slice(sync);
        let transport = EchoTransport::new(&replies);

        let config = quick_config().with_baud(230_400);
        let mut session = Session::new(transport, &config).unwrap();
        assert_eq!(session.baud(), 230_400);
        assert_eq!(session.transport().baud_changes, vec![230_400]);

        session.close();
        assert!(session.is_closed());
        assert_eq!(session.baud(), 115_200);
        assert_eq!(session.transport().baud_changes, vec![230_400, 115_200]);
        let written = String::from_utf8_lossy(&session.transport().written).into_owned();
        assert!(written.contains("uart.setup(0,230400,8,0,1,1)\n"));
        assert!(written.ends_with("uart.setup(0,115200,8,0,1,1)\n"));

        assert!(matches!(session.exchange("print(1)"), Err(Error::Closed)));
    }
}
