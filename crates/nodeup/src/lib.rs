//! Host-side engine for moving files to and from NodeMCU devices.
//!
//! A [`Session`] owns a [`Transport`] for its whole lifetime. Opening one
//! synchronizes with the Lua prompt and optionally switches baud rate;
//! afterwards the session can install the companion routines
//! ([`Session::prepare`]), upload and download files, verify uploads and run
//! single-shot commands.
//!
//! ```rust,ignore
//! use nodeup::{Session, SessionConfig, Verify};
//!
//! let config = SessionConfig::default().with_port("/dev/ttyUSB0").with_baud(230400);
//! let mut session = Session::open(&config)?;
//! session.prepare()?;
//! session.write_file("init.lua", None, Verify::Sha1)?;
//! let heap = session.node_heap()?;
//! session.close();
//! ```
//!
//! All operations are blocking and bounded by the session timeout; nothing is
//! retried internally.

mod commands;
mod config;
mod error;
mod exchange;
mod prepare;
mod session;
mod transfer;
mod transport;
mod verify;

pub use config::{default_port, timeout_from_secs, SessionConfig, PORT_ENV, UNBOUNDED_TIMEOUT};
pub use error::{Error, Result, VerificationError};
pub use exchange::{Link, PollingMode, MAX_RESPONSE_LEN, POLL_INTERVAL};
pub use prepare::PrepareOutcome;
pub use session::{Session, SyncState, BAUD_SWITCH_DELAY, FORMAT_TIMEOUT};
pub use transport::{SerialTransport, Transport};
pub use verify::{sha1_hex, Verify};

pub use nodeup_protocol::{RemoteFile, RemotePath, Reply};
