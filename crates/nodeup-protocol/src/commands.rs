//! Lua statements sent to the interactive prompt.
//!
//! Every interaction outside the binary transfer itself is a single line of
//! Lua. The statements fall into a few groups:
//! - Handshake statements (neutral statement, sync marker, UART setup)
//! - Companion routine calls (`recv`, `send`, `shafile`) and probes
//! - Filesystem and node commands

use crate::constants::{AUTOBAUD_PREAMBLE, LINE_TERMINATOR, SYNC_MARKER};

const LIST_FILES: &str = "for key,value in pairs(file.list()) do print(key,value) end";
const REMOVE_ALL_FILES: &str = "for key,value in pairs(file.list()) do file.remove(key) end";
const PRINT_FILE_PREFIX: &str = "do local fd,data=(file.open or io.open)(";

/// A statement understood by the device's Lua interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========== Handshake ==========
    /// An empty statement, used to get the prompt into a defined state.
    Empty,

    /// Print the sync marker.
    Sync,

    /// A run of `U` characters for the autobaud detector.
    Autobaud,

    /// Reconfigure UART 0.
    UartSetup {
        /// New baud rate.
        baud: u32,
        /// Whether the interpreter echoes input.
        echo: bool,
    },

    // ========== Companion Routines ==========
    /// Print the value bound to a global name.
    Probe {
        /// Global name to inspect.
        name: String,
    },

    /// Start the `recv` routine at the given baud rate.
    Recv {
        /// Baud rate the UART is kept at while frames flow.
        baud: u32,
    },

    /// Start the `send` routine for a file.
    Send {
        /// Remote file to send.
        path: String,
    },

    /// Print the SHA-1 digest of a remote file.
    Sha1 {
        /// Remote file to hash.
        path: String,
    },

    // ========== Filesystem ==========
    /// Print every file and its size, tab separated.
    ListFiles,

    /// Format the filesystem.
    Format,

    /// Remove a file.
    Remove {
        /// Remote file to remove.
        path: String,
    },

    /// Remove every file.
    RemoveAll,

    /// Compile a Lua file into bytecode (`.lc`).
    Compile {
        /// Remote source file.
        path: String,
    },

    /// Execute a file.
    DoFile {
        /// Remote file to execute.
        path: String,
    },

    /// Print a file between `---name---` and `---` marker lines.
    PrintFile {
        /// Remote file to print.
        path: String,
    },

    // ========== Node ==========
    /// Print the free heap size.
    Heap,

    /// Restart the device.
    Restart,

    // ========== Raw ==========
    /// Send a raw line.
    Raw {
        /// The raw statement text.
        line: String,
    },
}

impl Command {
    /// Encode the command as a line to send to the interpreter.
    pub fn encode(&self) -> Vec<u8> {
        encode_line(&self.to_command_string())
    }

    /// Get the statement text without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Empty => ";".to_string(),
            Command::Sync => format!("print(\"{}\");", SYNC_MARKER),
            Command::Autobaud => AUTOBAUD_PREAMBLE.to_string(),
            Command::UartSetup { baud, echo } => {
                format!("uart.setup(0,{},8,0,1,{})", baud, u8::from(*echo))
            }

            Command::Probe { name } => format!("print({})", name),
            Command::Recv { baud } => format!("recv({})", baud),
            Command::Send { path } => format!("send({})", lua_string(path)),
            Command::Sha1 { path } => format!("shafile({})", lua_string(path)),

            Command::ListFiles => LIST_FILES.to_string(),
            Command::Format => "file.format()".to_string(),
            Command::Remove { path } => format!("file.remove({})", lua_string(path)),
            Command::RemoveAll => REMOVE_ALL_FILES.to_string(),
            Command::Compile { path } => format!("node.compile({})", lua_string(path)),
            Command::DoFile { path } => format!("dofile({})", lua_string(path)),
            Command::PrintFile { path } => {
                let quoted = lua_string(path);
                format!(
                    "{}{q},'---'..{q}..'---\\n' while data do uart.write(0,data) data=fd:read(1024) end fd:close() uart.write(0,'---\\n') end",
                    PRINT_FILE_PREFIX,
                    q = quoted
                )
            }

            Command::Heap => "print(node.heap())".to_string(),
            Command::Restart => "node.restart()".to_string(),

            Command::Raw { line } => line.clone(),
        }
    }

    /// Recognize a statement produced by [`Command::to_command_string`].
    ///
    /// Returns `None` for anything else, including arbitrary Lua.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        match line {
            "" | ";" => return Some(Command::Empty),
            AUTOBAUD_PREAMBLE => return Some(Command::Autobaud),
            LIST_FILES => return Some(Command::ListFiles),
            REMOVE_ALL_FILES => return Some(Command::RemoveAll),
            "file.format()" => return Some(Command::Format),
            "print(node.heap())" => return Some(Command::Heap),
            "node.restart()" => return Some(Command::Restart),
            _ => {}
        }
        if line == Command::Sync.to_command_string() {
            return Some(Command::Sync);
        }
        if let Some(args) = line.strip_prefix("uart.setup(0,").and_then(|s| s.strip_suffix(')')) {
            let parts: Vec<&str> = args.split(',').collect();
            if parts.len() == 5 {
                let baud = parts[0].parse().ok()?;
                let echo = parts[4] != "0";
                return Some(Command::UartSetup { baud, echo });
            }
            return None;
        }
        if let Some(baud) = line.strip_prefix("recv(").and_then(|s| s.strip_suffix(')')) {
            return Some(Command::Recv {
                baud: baud.parse().ok()?,
            });
        }
        if let Some(rest) = line.strip_prefix(PRINT_FILE_PREFIX) {
            let (path, _) = parse_lua_string(rest)?;
            return Some(Command::PrintFile { path });
        }

        let calls: [(&str, fn(String) -> Command); 5] = [
            ("send", |path| Command::Send { path }),
            ("shafile", |path| Command::Sha1 { path }),
            ("file.remove", |path| Command::Remove { path }),
            ("node.compile", |path| Command::Compile { path }),
            ("dofile", |path| Command::DoFile { path }),
        ];
        for (name, build) in calls {
            if let Some(path) = parse_call(line, name) {
                return Some(build(path));
            }
        }

        let name = line.strip_prefix("print(")?.strip_suffix(')')?;
        let starts_identifier = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_');
        if starts_identifier && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Some(Command::Probe {
                name: name.to_string(),
            });
        }
        None
    }
}

/// Append the line terminator to a statement.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(LINE_TERMINATOR.as_bytes());
    buf
}

/// Quote `value` as a double-quoted Lua string literal.
pub fn lua_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Parse a double-quoted Lua string literal at the start of `input`.
///
/// Returns the unescaped value and the remaining input.
pub fn parse_lua_string(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            '"' => return Some((value, &body[i + 1..])),
            _ => value.push(c),
        }
    }
    None
}

fn parse_call(line: &str, name: &str) -> Option<String> {
    let args = line.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')?;
    let (value, rest) = parse_lua_string(args)?;
    rest.is_empty().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sync() {
        assert_eq!(Command::Sync.encode(), b"print(\"%sync%\");\n");
    }

    #[test]
    fn test_encode_uart_setup() {
        let cmd = Command::UartSetup {
            baud: 9600,
            echo: true,
        };
        assert_eq!(cmd.to_command_string(), "uart.setup(0,9600,8,0,1,1)");
    }

    #[test]
    fn test_encode_file_commands() {
        let remove = Command::Remove {
            path: "a.lua".to_string(),
        };
        assert_eq!(remove.encode(), b"file.remove(\"a.lua\")\n");
        assert_eq!(Command::Heap.to_command_string(), "print(node.heap())");
        assert_eq!(
            Command::Compile {
                path: "x.lua".to_string()
            }
            .to_command_string(),
            "node.compile(\"x.lua\")"
        );
    }

    #[test]
    fn test_encode_recv_passes_baud() {
        assert_eq!(Command::Recv { baud: 230400 }.encode(), b"recv(230400)\n");
    }

    #[test]
    fn test_lua_string_escaping() {
        assert_eq!(lua_string(r#"a"b\c"#), r#""a\"b\\c""#);
        let (value, rest) = parse_lua_string(r#""a\"b\\c")"#).unwrap();
        assert_eq!(value, r#"a"b\c"#);
        assert_eq!(rest, ")");
        assert!(parse_lua_string("\"unterminated").is_none());
    }

    #[test]
    fn test_parse_recognizes_generated_statements() {
        let commands = [
            Command::Empty,
            Command::Sync,
            Command::UartSetup {
                baud: 230400,
                echo: false,
            },
            Command::Probe {
                name: "shafile".to_string(),
            },
            Command::Send {
                path: "data \"1\".txt".to_string(),
            },
            Command::PrintFile {
                path: "init.lua".to_string(),
            },
            Command::Recv { baud: 115200 },
            Command::ListFiles,
            Command::Restart,
        ];
        for cmd in commands {
            assert_eq!(Command::parse(&cmd.to_command_string()), Some(cmd));
        }
    }

    #[test]
    fn test_parse_rejects_arbitrary_lua() {
        assert_eq!(Command::parse("x = 1"), None);
        assert_eq!(Command::parse("print(1 + 2)"), None);
        assert_eq!(Command::parse("print(42)"), None);
        assert_eq!(Command::parse("send(\"a\") extra"), None);
        assert_eq!(Command::parse("recv()"), None);
    }
}
