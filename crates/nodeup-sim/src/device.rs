//! The simulated device as seen through a serial port.

use std::sync::Arc;
use std::time::Duration;

use log::trace;
use nodeup::Transport;
use parking_lot::Mutex;

use crate::state::{DeviceState, DeviceStats, Fault};

/// A NodeMCU stand-in reachable through [`Transport`].
///
/// Everything the host writes is processed immediately, so replies are ready
/// by the time the host reads. When the device has nothing to say, reads
/// block for the transport timeout like a real port would.
#[derive(Debug)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
    host_baud: u32,
    timeout: Duration,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A freshly flashed device: empty filesystem, no companion routines.
    pub fn new() -> Self {
        let state = DeviceState::default();
        SimulatedDevice {
            host_baud: state.baud,
            state: Arc::new(Mutex::new(state)),
            timeout: Duration::ZERO,
        }
    }

    /// A port with nothing attached.
    pub fn silent() -> Self {
        let device = Self::new();
        device.state.lock().silent = true;
        device
    }

    /// Output emitted right after the host first clears its buffers, as if
    /// the device were still booting.
    pub fn with_banner(self, banner: impl Into<Vec<u8>>) -> Self {
        self.state.lock().banner = Some(banner.into());
        self
    }

    /// Store a file before the session starts.
    pub fn with_file(self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.state.lock().files.insert(name.to_string(), data.into());
        self
    }

    /// Inject a fault.
    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.lock().faults.push(fault);
        self
    }

    /// Free heap reported by `node.heap()`.
    pub fn with_heap(self, heap: u32) -> Self {
        self.state.lock().heap = heap;
        self
    }

    /// Baud rate the device boots at. The host side starts at the same rate.
    pub fn with_boot_baud(mut self, baud: u32) -> Self {
        {
            let mut state = self.state.lock();
            state.baud = baud;
            state.boot_baud = baud;
        }
        self.host_baud = baud;
        self
    }

    /// A handle for inspecting the device after the transport has been
    /// handed to a session.
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Transport for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> nodeup::Result<usize> {
        let data = self.state.lock().take_output(buf.len(), self.host_baud);
        if data.is_empty() {
            std::thread::sleep(self.timeout);
            return Ok(0);
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn write_all(&mut self, data: &[u8]) -> nodeup::Result<()> {
        trace!("host wrote {} bytes at {} baud", data.len(), self.host_baud);
        self.state.lock().receive(data, self.host_baud);
        Ok(())
    }

    fn flush(&mut self) -> nodeup::Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> nodeup::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn baud_rate(&self) -> nodeup::Result<u32> {
        Ok(self.host_baud)
    }

    fn set_baud_rate(&mut self, baud: u32) -> nodeup::Result<()> {
        self.host_baud = baud;
        Ok(())
    }

    fn clear_buffers(&mut self) -> nodeup::Result<()> {
        self.state.lock().clear_output();
        Ok(())
    }

    fn name(&self) -> String {
        "simulated".to_string()
    }
}

/// Shared view of a [`SimulatedDevice`]'s state.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl DeviceHandle {
    /// Contents of a file on the device.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(name).cloned()
    }

    /// Names of all files on the device, sorted.
    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Store a file.
    pub fn insert_file(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(name.to_string(), data.into());
    }

    /// Whether a global function is defined.
    pub fn has_function(&self, name: &str) -> bool {
        self.state.lock().functions.contains_key(name)
    }

    /// Baud rate the device UART is running at.
    pub fn baud(&self) -> u32 {
        self.state.lock().baud
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DeviceStats {
        self.state.lock().stats.clone()
    }

    /// Reset the counters.
    pub fn reset_stats(&self) {
        self.state.lock().stats = DeviceStats::default();
    }

    /// Inject a fault into a running device.
    pub fn add_fault(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }
}
