//! Remote path validation.

use std::fmt;

use crate::constants::MAX_FS_NAME_LEN;
use crate::error::{ProtocolError, ProtocolResult};

/// A file name on the device filesystem, 1 to [`MAX_FS_NAME_LEN`] bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// Validate and wrap a remote path.
    pub fn new(path: impl Into<String>) -> ProtocolResult<Self> {
        let path = path.into();
        let len = path.len();
        if len == 0 || len > MAX_FS_NAME_LEN {
            return Err(ProtocolError::PathLength { path, len });
        }
        Ok(RemotePath(path))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bounds() {
        assert!(RemotePath::new("").is_err());
        assert!(RemotePath::new("a").is_ok());
        assert!(RemotePath::new("a".repeat(31)).is_ok());
        assert_eq!(
            RemotePath::new("a".repeat(32)),
            Err(ProtocolError::PathLength {
                path: "a".repeat(32),
                len: 32
            })
        );
    }

    #[test]
    fn test_length_counts_bytes() {
        // 16 two-byte characters
        assert!(RemotePath::new("é".repeat(16)).is_err());
        assert!(RemotePath::new("é".repeat(15)).is_ok());
    }
}
