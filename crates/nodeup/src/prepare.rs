//! Installing the companion routines on the device.

use nodeup_protocol::{Command, CompanionProgram, COMPANION_FUNCTIONS};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;

/// What [`Session::prepare`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Every companion routine was already defined.
    AlreadyPresent,
    /// The companion program was uploaded.
    Installed {
        /// Number of lines sent.
        lines: usize,
    },
}

impl<T: Transport> Session<T> {
    /// Make sure the companion routines exist on the device.
    ///
    /// If any routine is missing the whole program is sent again, one line at
    /// a time. Any line the interpreter does not accept aborts the install.
    pub fn prepare(&mut self) -> Result<PrepareOutcome> {
        info!("preparing device");
        if self.companion_present()? {
            debug!("companion routines already present");
            return Ok(PrepareOutcome::AlreadyPresent);
        }

        let program = CompanionProgram::new(self.baud());
        let limit = program.response_limit();
        let lines = program.lines();
        for line in &lines {
            let reply = self.exchange(line)?;
            if reply.has_error_marker() || reply.len() > limit {
                return Err(Error::Bootstrap {
                    line: line.clone(),
                    response: reply.text().to_string(),
                });
            }
        }
        info!("installed companion routines ({} lines)", lines.len());
        Ok(PrepareOutcome::Installed { lines: lines.len() })
    }

    fn companion_present(&mut self) -> Result<bool> {
        for name in COMPANION_FUNCTIONS {
            let probe = Command::Probe {
                name: (*name).to_string(),
            };
            let reply = self.exchange(&probe.to_command_string())?;
            if !reply.is_function() {
                debug!("{} is missing", name);
                return Ok(false);
            }
        }
        Ok(true)
    }
}
