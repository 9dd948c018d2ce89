//! Byte transports to a device.
//!
//! The engine talks to a [`Transport`]; [`SerialTransport`] is the real
//! implementation on top of the `serialport` crate. Tests plug in simulated
//! devices instead.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::Result;

/// A duplex byte channel to a device.
pub trait Transport: Send {
    /// Read whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the read timeout. A closed
    /// channel is reported as an `UnexpectedEof` I/O error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Block until written data has been handed to the device.
    fn flush(&mut self) -> Result<()>;

    /// Current read timeout.
    fn timeout(&self) -> Duration;

    /// Set the read timeout used by [`Transport::read`].
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Current baud rate.
    fn baud_rate(&self) -> Result<u32>;

    /// Reconfigure the baud rate.
    fn set_baud_rate(&mut self, baud: u32) -> Result<()>;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Human readable name of the channel, used in diagnostics.
    fn name(&self) -> String {
        "<unnamed>".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn baud_rate(&self) -> Result<u32> {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        (**self).set_baud_rate(baud)
    }

    fn clear_buffers(&mut self) -> Result<()> {
        (**self).clear_buffers()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Serial transport for UART communication.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open a serial port at 8N1 without flow control.
    ///
    /// RTS and DTR are deasserted right after opening. On the usual NodeMCU
    /// wiring RTS drives CH_PD (reset) and DTR drives GPIO0 (boot mode), so
    /// this releases the device from reset into normal boot.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self> {
        info!("opening port {} with {} baud", path, baud);
        let mut port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;

        port.write_request_to_send(false)?;
        port.write_data_terminal_ready(false)?;

        Ok(SerialTransport {
            port,
            path: path.to_string(),
        })
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport").field("path", &self.path).finish()
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn baud_rate(&self) -> Result<u32> {
        Ok(self.port.baud_rate()?)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.port.set_baud_rate(baud)?;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}
