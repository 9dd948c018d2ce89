//! Companion routines installed on the device.
//!
//! The interpreter cannot receive binary data by itself, so the host uploads a
//! small Lua program defining three global routines:
//!
//! - `recv(baud)`: prints `C`, reads a NUL-terminated name, then 130-byte
//!   frames, ACKing each one, until a zero-length frame arrives.
//! - `send(f)`: waits for `C`, sends `f` NUL-terminated, then one frame per
//!   ACK, ending with a zero-length frame.
//! - `shafile(f)`: prints the hex SHA-1 digest of `f`.
//!
//! `recv` turns the interpreter echo off while frames are flowing. Turning echo
//! off means calling `uart.setup`, which also sets the baud rate, so the host
//! passes its current rate with every call. The rate the program was built for
//! is only the fallback for a bare `recv()`.

use crate::constants::BOOTSTRAP_RESPONSE_SLACK;

/// Global routines the transfer protocol depends on, in probe order.
pub const COMPANION_FUNCTIONS: &[&str] = &["recv", "shafile", "send"];

const BAUD_PLACEHOLDER: &str = "{baud}";

const RECV_LUA: &str = r#"
function recv(b)
  b = b or {baud}
  local on, w, ack, nak = uart.on, uart.write, '\6', '\21'
  local fopen = file.open or io.open
  local fd
  local function finish(reply)
    if fd then fd:close() end
    w(0, reply)
    uart.setup(0, b, 8, 0, 1, 1)
    on('data')
  end
  local function recv_block(d)
    local t, l = d:byte(1, 2)
    if t ~= 1 then return finish(nak) end
    if l > 0 then
      fd:write(d:sub(3, l + 2))
      w(0, ack)
    else
      finish(ack)
    end
  end
  local function recv_name(d)
    d = d:gsub('%z.*', '')
    file.remove(d)
    fd = fopen(d, 'w')
    on('data', 130, recv_block, 0)
    w(0, ack)
  end
  uart.setup(0, b, 8, 0, 1, 0)
  on('data', '\0', recv_name, 0)
  w(0, 'C')
end
function shafile(f) print(crypto.toHex(crypto.fhash('sha1', f))) end
"#;

const SEND_LUA: &str = r#"
function send(f)
  local fd = (file.open or io.open)(f)
  if fd == nil then
    print('un' .. 'expected could not open ' .. f)
    return
  end
  local on, w, len, ch, rep = uart.on, uart.write, string.len, string.char, string.rep
  local function send_block(d)
    local l = len(d)
    w(0, '\001' .. ch(l) .. d .. rep('\0', 128 - l))
    return l
  end
  local function send_file()
    local s, p = fd:seek('end', 0), 0
    fd:seek('set', 0)
    on('data', 1, function(data)
      if data == '\006' and p < s then
        p = p + send_block(fd:read(128))
      else
        send_block('')
        fd:close()
        on('data')
      end
    end, 0)
    w(0, f .. '\000')
  end
  on('data', 1, function(data)
    on('data')
    if data == 'C' then send_file() else print('transfer interrupted') fd:close() end
  end, 0)
end
"#;

/// The companion program, specialized for a baud rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionProgram {
    source: String,
}

impl CompanionProgram {
    /// Build the program with `baud` as the fallback rate for `recv`.
    pub fn new(baud: u32) -> Self {
        let source = format!("{}\n{}", RECV_LUA, SEND_LUA).replace(BAUD_PLACEHOLDER, &baud.to_string());
        CompanionProgram { source }
    }

    /// Full program source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lines to send one by one, with insignificant whitespace removed and
    /// blank lines skipped.
    pub fn lines(&self) -> Vec<String> {
        self.source
            .replace('\r', "")
            .split('\n')
            .map(minify_line)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Replies longer than this mean the device did not accept a line.
    pub fn response_limit(&self) -> usize {
        self.source.len() + BOOTSTRAP_RESPONSE_SLACK
    }
}

fn minify_line(line: &str) -> String {
    line.trim().replace(", ", ",").replace(" = ", "=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_is_substituted() {
        let program = CompanionProgram::new(230400);
        assert!(!program.source().contains(BAUD_PLACEHOLDER));
        assert!(program.source().contains("b = b or 230400"));
        assert!(program.source().contains("uart.setup(0, b, 8, 0, 1, 0)"));
    }

    #[test]
    fn test_lines_are_minified() {
        let program = CompanionProgram::new(115200);
        let lines = program.lines();
        assert!(!lines.is_empty());
        for line in &lines {
            assert!(!line.is_empty());
            assert!(!line.contains(", "), "unminified line: {}", line);
            assert!(!line.contains(" = "), "unminified line: {}", line);
            assert_eq!(line.trim(), line);
        }
        assert!(lines.contains(&"b=b or 115200".to_string()));
        assert!(lines.contains(&"uart.setup(0,b,8,0,1,0)".to_string()));
    }

    #[test]
    fn test_defines_every_function() {
        let lines = CompanionProgram::new(9600).lines();
        for name in COMPANION_FUNCTIONS {
            let prefix = format!("function {}(", name);
            assert!(lines.iter().any(|l| l.starts_with(&prefix)), "missing {}", name);
        }
    }
}
