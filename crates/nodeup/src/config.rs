//! Session configuration.
//!
//! Values come from defaults, an optional YAML file and the command line, in
//! increasing order of precedence. Only the first two live here.

use std::path::Path;
use std::time::Duration;

use nodeup_protocol::DEFAULT_BAUD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exchange::PollingMode;

/// Environment variable that overrides the default serial port.
pub const PORT_ENV: &str = "SERIALPORT";

/// Timeout standing in for "no timeout" when the configured value is zero.
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(999_999);

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name.
    pub port: String,

    /// Baud rate to run transfers at. The session switches to it after the
    /// first synchronization if it differs from `start_baud`.
    pub baud: u32,

    /// Baud rate the device is running at when the port is opened.
    pub start_baud: u32,

    /// Response timeout in seconds. Zero means practically unbounded.
    pub timeout_secs: u64,

    /// Time to let the device's autobaud detector settle (milliseconds).
    /// Zero skips the autobaud preamble.
    pub autobaud_time_ms: u64,

    /// How reads wait for data.
    pub polling: PollingMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            port: default_port(),
            baud: DEFAULT_BAUD,
            start_baud: DEFAULT_BAUD,
            timeout_secs: 5,
            autobaud_time_ms: 300,
            polling: PollingMode::default(),
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a YAML file. Missing fields take their
    /// defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(Error::Config("port must not be empty".to_string()));
        }
        if self.baud == 0 || self.start_baud == 0 {
            return Err(Error::Config("baud rates must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the serial port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Set the transfer baud rate.
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Set the baud rate the device starts at.
    pub fn with_start_baud(mut self, start_baud: u32) -> Self {
        self.start_baud = start_baud;
        self
    }

    /// Set the response timeout in seconds (0 = practically unbounded).
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the autobaud settle time.
    pub fn with_autobaud_time(mut self, autobaud_time: Duration) -> Self {
        self.autobaud_time_ms = autobaud_time.as_millis() as u64;
        self
    }

    /// Set the polling mode.
    pub fn with_polling(mut self, polling: PollingMode) -> Self {
        self.polling = polling;
        self
    }

    /// The response timeout, with zero mapped to [`UNBOUNDED_TIMEOUT`].
    pub fn timeout(&self) -> Duration {
        timeout_from_secs(self.timeout_secs)
    }

    /// The autobaud settle time.
    pub fn autobaud_time(&self) -> Duration {
        Duration::from_millis(self.autobaud_time_ms)
    }
}

/// Convert a timeout in seconds, treating zero as practically unbounded.
pub fn timeout_from_secs(secs: u64) -> Duration {
    if secs == 0 {
        UNBOUNDED_TIMEOUT
    } else {
        Duration::from_secs(secs)
    }
}

/// The serial port used when none is configured: `$SERIALPORT`, or the usual
/// USB-UART device name for the platform.
pub fn default_port() -> String {
    if let Ok(port) = std::env::var(PORT_ENV) {
        if !port.is_empty() {
            return port;
        }
    }
    if cfg!(windows) {
        "COM1".to_string()
    } else if cfg!(target_os = "macos") {
        "/dev/tty.SLAB_USBtoUART".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}
