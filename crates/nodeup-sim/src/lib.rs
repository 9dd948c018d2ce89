//! # nodeup-sim
//!
//! An in-process NodeMCU stand-in for exercising the nodeup engine without
//! hardware.
//!
//! [`SimulatedDevice`] implements [`nodeup::Transport`] and speaks the Lua
//! prompt (echo, output, `> ` prompt, `>> ` inside unfinished blocks) and the
//! companion routine protocol byte for byte. Routines only exist once their
//! definitions have been sent, so bootstrapping is exercised for real. A baud
//! rate mismatch between host and device garbles traffic in both directions.
//!
//! ```rust,ignore
//! use nodeup::{Session, SessionConfig, Verify};
//! use nodeup_sim::SimulatedDevice;
//!
//! let device = SimulatedDevice::new();
//! let handle = device.handle();
//! let mut session = Session::new(device, &SessionConfig::default())?;
//! session.prepare()?;
//! session.write_bytes("init.lua", b"print('hi')", Verify::Raw)?;
//! assert_eq!(handle.file("init.lua").unwrap(), b"print('hi')");
//! ```

mod device;
mod state;

pub use device::{DeviceHandle, SimulatedDevice};
pub use state::{DeviceStats, Fault};
