//! Post-transfer verification.

use std::fmt;
use std::str::FromStr;

use nodeup_protocol::{Command, RemotePath};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::error::{Error, Result, VerificationError};
use crate::session::Session;
use crate::transport::Transport;

/// How an upload is checked after the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verify {
    /// No check.
    #[default]
    None,
    /// Download the file again and compare bytes.
    Raw,
    /// Compare the local SHA-1 digest with one computed on the device.
    #[serde(alias = "digest")]
    Sha1,
}

impl FromStr for Verify {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Verify::None),
            "raw" => Ok(Verify::Raw),
            "sha1" | "digest" => Ok(Verify::Sha1),
            other => Err(Error::Config(format!("unknown verification mode: {}", other))),
        }
    }
}

impl fmt::Display for Verify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verify::None => "none",
            Verify::Raw => "raw",
            Verify::Sha1 => "sha1",
        };
        f.write_str(name)
    }
}

/// Lowercase hex SHA-1 digest of `data`.
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

impl<T: Transport> Session<T> {
    /// Check that `path` on the device holds exactly `content`.
    pub fn verify(&mut self, path: &RemotePath, content: &[u8], mode: Verify) -> Result<()> {
        match mode {
            Verify::None => Ok(()),
            Verify::Raw => self.verify_raw(path, content),
            Verify::Sha1 => self.verify_digest(path, content),
        }
    }

    fn verify_raw(&mut self, path: &RemotePath, content: &[u8]) -> Result<()> {
        info!("verifying {} by reading it back", path);
        let remote = self.read_bytes(path.as_str())?;
        if remote.as_ref() != content {
            return Err(VerificationError::ContentMismatch {
                path: path.to_string(),
                local_len: content.len(),
                remote_len: remote.len(),
            }
            .into());
        }
        debug!("raw verification of {} passed", path);
        Ok(())
    }

    fn verify_digest(&mut self, path: &RemotePath, content: &[u8]) -> Result<()> {
        info!("verifying {} with SHA1", path);
        let local = sha1_hex(content);
        let reply = self.exchange(
            &Command::Sha1 {
                path: path.to_string(),
            }
            .to_command_string(),
        )?;
        let remote = reply.digest().ok_or_else(|| VerificationError::DigestMissing {
            path: path.to_string(),
            response: reply.text().to_string(),
        })?;
        if remote != local {
            return Err(VerificationError::DigestMismatch {
                path: path.to_string(),
                local,
                remote: remote.to_string(),
            }
            .into());
        }
        debug!("digest {} matches", local);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_parse_verify_mode() {
        assert_eq!("none".parse::<Verify>().unwrap(), Verify::None);
        assert_eq!("RAW".parse::<Verify>().unwrap(), Verify::Raw);
        assert_eq!("digest".parse::<Verify>().unwrap(), Verify::Sha1);
        assert!("md5".parse::<Verify>().is_err());
        assert_eq!(Verify::Sha1.to_string(), "sha1");
    }
}
