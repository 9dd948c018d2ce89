//! Parsing of interpreter replies.
//!
//! A reply to a statement looks like:
//!
//! ```text
//! <echoed statement>\r\n
//! <output line>\r\n
//! ...
//! >
//! ```
//!
//! The checks here are substring heuristics, not a Lua parser: the device
//! gives no structured status for a line it rejected.

use crate::constants::{ERROR_MARKERS, FORMAT_DONE_MARKER, FUNCTION_MARKER};
use crate::error::{ProtocolError, ProtocolResult};

/// Length of a hex encoded SHA-1 digest.
pub const SHA1_HEX_LEN: usize = 40;

/// A reply read back from the interpreter, decoded as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    text: String,
}

impl Reply {
    /// Decode a raw reply. Invalid UTF-8 is replaced, not rejected.
    pub fn new(raw: &[u8]) -> Self {
        Reply {
            text: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// The full reply text, including echo and prompt.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the raw reply in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the reply is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the interpreter reported an error for the line.
    pub fn has_error_marker(&self) -> bool {
        ERROR_MARKERS.iter().any(|marker| self.text.contains(marker))
    }

    /// Whether a probe reply shows a callable routine.
    pub fn is_function(&self) -> bool {
        self.text.contains(FUNCTION_MARKER)
    }

    /// Whether a `file.format()` reply reports success.
    pub fn is_format_done(&self) -> bool {
        self.text.contains(FORMAT_DONE_MARKER)
    }

    /// Output lines between the echoed statement and the trailing prompt.
    pub fn body_lines(&self) -> Vec<&str> {
        let lines: Vec<&str> = self.text.split("\r\n").collect();
        if lines.len() < 2 {
            return Vec::new();
        }
        lines[1..lines.len() - 1].to_vec()
    }

    /// Everything after the echoed statement, without the trailing prompt.
    pub fn output(&self) -> &str {
        let body = self.text.split_once("\r\n").map_or("", |(_, rest)| rest);
        body.strip_suffix("> ").unwrap_or(body)
    }

    /// Parse the free heap size printed by `print(node.heap())`.
    pub fn heap(&self) -> ProtocolResult<u32> {
        let line = self
            .body_lines()
            .first()
            .copied()
            .ok_or_else(|| ProtocolError::ParseError(format!("no heap value in {:?}", self.text)))?;
        line.trim()
            .parse()
            .map_err(|_| ProtocolError::ParseError(format!("invalid heap value: {:?}", line)))
    }

    /// Find the hex digest printed by `shafile`.
    ///
    /// Returns the first line made of exactly [`SHA1_HEX_LEN`] hex characters.
    pub fn digest(&self) -> Option<&str> {
        self.text
            .split("\r\n")
            .flat_map(|line| line.split('\n'))
            .map(str::trim)
            .find(|line| line.len() == SHA1_HEX_LEN && line.chars().all(|c| c.is_ascii_hexdigit()))
    }

    /// Parse the listing printed by the list-files statement.
    pub fn file_list(&self) -> ProtocolResult<Vec<RemoteFile>> {
        self.body_lines()
            .into_iter()
            .filter(|line| !line.is_empty())
            .map(RemoteFile::parse)
            .collect()
    }
}

/// A file entry from the device filesystem listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

impl RemoteFile {
    /// Parse a `name\tsize` line.
    pub fn parse(line: &str) -> ProtocolResult<RemoteFile> {
        let (name, size) = line
            .rsplit_once('\t')
            .ok_or_else(|| ProtocolError::ParseError(format!("expected name<TAB>size: {:?}", line)))?;
        let size = size
            .trim()
            .parse()
            .map_err(|_| ProtocolError::ParseError(format!("invalid file size: {:?}", size)))?;
        Ok(RemoteFile {
            name: name.to_string(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_markers() {
        let reply = Reply::new(b"x=\r\nstdin:1: unexpected symbol near '='\r\n> ");
        assert!(reply.has_error_marker());
        let reply = Reply::new(b"x=1\r\n> ");
        assert!(!reply.has_error_marker());
    }

    #[test]
    fn test_probe_reply() {
        assert!(Reply::new(b"print(recv)\r\nfunction: 0x3fff0a28\r\n> ").is_function());
        assert!(!Reply::new(b"print(recv)\r\nnil\r\n> ").is_function());
    }

    #[test]
    fn test_output_strips_echo_and_prompt() {
        let reply = Reply::new(b"do local fd\r\n---a.txt---\nhello\n---\n> ");
        assert_eq!(reply.output(), "---a.txt---\nhello\n---\n");
        assert_eq!(Reply::new(b"x=1\r\n> ").output(), "");
    }

    #[test]
    fn test_heap() {
        let reply = Reply::new(b"print(node.heap())\r\n43512\r\n> ");
        assert_eq!(reply.heap(), Ok(43512));
        assert!(Reply::new(b"print(node.heap())\r\n> ").heap().is_err());
    }

    #[test]
    fn test_digest() {
        let hex = "a9993e364706816aba3e25717850c26c9cd0d89d";
        let reply = Reply::new(format!("shafile(\"abc\")\r\n{}\r\n> ", hex).as_bytes());
        assert_eq!(reply.digest(), Some(hex));
        assert_eq!(Reply::new(b"shafile(\"abc\")\r\nnil\r\n> ").digest(), None);
    }

    #[test]
    fn test_file_list() {
        let reply = Reply::new(b"for key,value in pairs(file.list()) do print(key,value) end\r\ninit.lua\t120\r\ndata.bin\t4096\r\n> ");
        let files = reply.file_list().unwrap();
        assert_eq!(
            files,
            vec![
                RemoteFile {
                    name: "init.lua".to_string(),
                    size: 120
                },
                RemoteFile {
                    name: "data.bin".to_string(),
                    size: 4096
                },
            ]
        );
    }

    #[test]
    fn test_empty_file_list() {
        let reply = Reply::new(b"for key,value in pairs(file.list()) do print(key,value) end\r\n> ");
        assert!(reply.file_list().unwrap().is_empty());
    }
}
