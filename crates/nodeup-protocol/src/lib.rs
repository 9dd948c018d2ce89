//! NodeMCU Transfer Protocol
//!
//! This crate provides the wire-level pieces needed to move files to and from
//! NodeMCU firmware. The firmware has no bulk-transfer facility of its own: it
//! exposes an interactive Lua prompt that echoes input and runs one line at a
//! time. Transfers therefore happen in two layers:
//!
//! - **Text layer**: Lua statements sent as `\n`-terminated lines, answered with
//!   the echoed line, any output, and the `> ` prompt.
//! - **Binary layer**: small companion routines (`recv`, `send`, `shafile`) that
//!   are installed on the device and then exchange fixed-size frames.
//!
//! # Frame Layout
//!
//! ```text
//! +------+-----+----------------+-------------------+
//! | 0x01 | len | payload[0..len]| zero padding      |
//! +------+-----+----------------+-------------------+
//!   1      1     len <= 128       128 - len
//! ```
//!
//! Every frame is exactly 130 bytes. A frame with `len == 0` ends the
//! transfer. Each frame is answered by a single ACK (`0x06`) byte.
//!
//! # Example
//!
//! ```rust,ignore
//! use nodeup_protocol::{Command, Frame, RemotePath};
//!
//! let dest = RemotePath::new("init.lua")?;
//! let line = Command::Remove { path: dest.to_string() }.encode();
//! let frame = Frame::new(b"print('hi')")?.encode();
//! ```

mod commands;
mod companion;
mod constants;
mod error;
mod frame;
mod path;
mod responses;

pub use commands::*;
pub use companion::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use path::*;
pub use responses::*;
