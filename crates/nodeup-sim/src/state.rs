//! Device-side state machine: the Lua prompt plus the companion routines.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, trace};
use nodeup_protocol::{
    Command, ACK, BLOCK_START, CHUNK_SIZE, DEFAULT_BAUD, FRAME_SIZE, NAK, NUL, SYNC_MARKER, TRANSFER_START,
};
use sha1::{Digest, Sha1};

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ">> ";
const CORRUPT_START: u8 = 0x02;

/// Faults the simulated device can be told to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Answer the n-th content frame of every upload (0-based) with NAK.
    NakFrame(usize),
    /// Report this string instead of the real digest from `shafile`.
    DigestOverride(String),
    /// Reject the first line of every function definition.
    RejectDefinitions,
    /// Answer the destination name given to `recv` with NAK.
    RejectName,
    /// Start every frame streamed by `send` with a wrong byte.
    CorruptFrameStart,
    /// Stop `send` halfway through its first frame.
    StallMidFrame,
    /// Keep the UART at its current rate whatever `uart.setup` asks for.
    IgnoreBaudChange,
}

/// Counters collected while the device runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Top-level statements executed, in order.
    pub lines_executed: Vec<String>,
    /// Lines received as part of function definitions.
    pub definition_lines: usize,
    /// Payload lengths of the frames received by `recv`, terminal included.
    pub frames_received: Vec<usize>,
    /// Bytes consumed by `recv` while reading frames.
    pub frame_bytes_received: usize,
    /// Frames streamed by `send`, terminal included.
    pub frames_sent: usize,
    /// Bytes written by the host.
    pub bytes_written: usize,
    /// Bytes lost to a baud rate mismatch.
    pub garbled_bytes: usize,
    /// Files passed to `dofile`.
    pub files_executed: Vec<String>,
}

#[derive(Debug)]
enum Mode {
    Interpreter,
    RecvName { name: Vec<u8> },
    RecvBlock { file: String, block: Vec<u8>, frames: usize },
    AwaitStart { file: String },
    Sending { file: String, data: Vec<u8>, pos: usize },
    /// Swallows everything, like a device that hung mid-transfer.
    Stalled,
}

/// Everything the simulated device knows.
#[derive(Debug)]
pub struct DeviceState {
    pub(crate) files: BTreeMap<String, Vec<u8>>,
    pub(crate) functions: BTreeMap<String, Vec<String>>,
    pub(crate) faults: Vec<Fault>,
    pub(crate) stats: DeviceStats,
    pub(crate) baud: u32,
    pub(crate) boot_baud: u32,
    pub(crate) heap: u32,
    pub(crate) silent: bool,
    pub(crate) banner: Option<Vec<u8>>,
    echo: bool,
    mode: Mode,
    line: Vec<u8>,
    chunk: Vec<String>,
    depth: i32,
    output: VecDeque<(u8, u32)>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            files: BTreeMap::new(),
            functions: BTreeMap::new(),
            faults: Vec::new(),
            stats: DeviceStats::default(),
            baud: DEFAULT_BAUD,
            boot_baud: DEFAULT_BAUD,
            heap: 43_512,
            silent: false,
            banner: None,
            echo: true,
            mode: Mode::Interpreter,
            line: Vec::new(),
            chunk: Vec::new(),
            depth: 0,
            output: VecDeque::new(),
        }
    }
}

impl DeviceState {
    /// Feed bytes arriving on the UART at `host_baud`.
    pub(crate) fn receive(&mut self, data: &[u8], host_baud: u32) {
        self.stats.bytes_written += data.len();
        if self.silent {
            return;
        }
        if host_baud != self.baud {
            trace!("dropping {} bytes sent at {} baud, device at {}", data.len(), host_baud, self.baud);
            self.stats.garbled_bytes += data.len();
            return;
        }
        for &byte in data {
            self.receive_byte(byte);
        }
    }

    /// Take up to `max` pending output bytes as seen by a host at `host_baud`.
    pub(crate) fn take_output(&mut self, max: usize, host_baud: u32) -> Vec<u8> {
        let n = max.min(self.output.len());
        self.output
            .drain(..n)
            .map(|(byte, baud)| if baud == host_baud { byte } else { !byte })
            .collect()
    }

    #[cfg(test)]
    fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Drop pending output. The boot banner, if still pending, shows up right
    /// after the first clear.
    pub(crate) fn clear_output(&mut self) {
        self.output.clear();
        if let Some(banner) = self.banner.take() {
            self.emit(&banner);
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        let baud = self.baud;
        self.output.extend(bytes.iter().map(|&b| (b, baud)));
    }

    fn emit_str(&mut self, text: &str) {
        self.emit(text.as_bytes());
    }

    fn println(&mut self, text: &str) {
        self.emit_str(text);
        self.emit_str("\r\n");
    }

    fn receive_byte(&mut self, byte: u8) {
        match std::mem::replace(&mut self.mode, Mode::Interpreter) {
            Mode::Interpreter => {
                if byte == b'\n' {
                    let line = String::from_utf8_lossy(&self.line).trim_end_matches('\r').to_string();
                    self.line.clear();
                    self.interpret(&line);
                } else {
                    self.line.push(byte);
                }
            }
            Mode::RecvName { mut name } => {
                if byte == NUL && self.faults.contains(&Fault::RejectName) {
                    debug!("recv: rejecting name");
                    self.finish_recv(NAK);
                } else if byte == NUL {
                    let file = String::from_utf8_lossy(&name).into_owned();
                    debug!("recv: receiving {}", file);
                    self.files.insert(file.clone(), Vec::new());
                    self.mode = Mode::RecvBlock {
                        file,
                        block: Vec::with_capacity(FRAME_SIZE),
                        frames: 0,
                    };
                    self.emit(&[ACK]);
                } else {
                    name.push(byte);
                    self.mode = Mode::RecvName { name };
                }
            }
            Mode::Stalled => {
                self.mode = Mode::Stalled;
            }
            Mode::RecvBlock { file, mut block, frames } => {
                block.push(byte);
                self.stats.frame_bytes_received += 1;
                if block.len() < FRAME_SIZE {
                    self.mode = Mode::RecvBlock { file, block, frames };
                    return;
                }
                self.receive_block(file, &block, frames);
            }
            Mode::AwaitStart { file } => {
                if byte == TRANSFER_START {
                    let data = self.files.get(&file).cloned().unwrap_or_default();
                    let mut name = file.clone().into_bytes();
                    name.push(NUL);
                    self.emit(&name);
                    self.mode = Mode::Sending { file, data, pos: 0 };
                } else {
                    self.println("transfer interrupted");
                }
            }
            Mode::Sending { file, data, pos } => {
                if byte == ACK && pos < data.len() {
                    let end = (pos + CHUNK_SIZE).min(data.len());
                    let chunk = data[pos..end].to_vec();
                    self.mode = Mode::Sending { file, data, pos: end };
                    self.send_block(&chunk);
                } else {
                    self.send_block(&[]);
                    debug!("send: finished {}", file);
                }
            }
        }
    }

    fn receive_block(&mut self, file: String, block: &[u8], frames: usize) {
        let len = block[1] as usize;
        if block[0] != BLOCK_START || len > CHUNK_SIZE || self.faults.contains(&Fault::NakFrame(frames)) {
            debug!("recv: rejecting frame {}", frames);
            self.finish_recv(NAK);
            return;
        }
        self.stats.frames_received.push(len);
        if len == 0 {
            debug!("recv: finished {}", file);
            self.finish_recv(ACK);
            return;
        }
        self.files.entry(file.clone()).or_default().extend_from_slice(&block[2..2 + len]);
        self.emit(&[ACK]);
        self.mode = Mode::RecvBlock {
            file,
            block: Vec::with_capacity(FRAME_SIZE),
            frames: frames + 1,
        };
    }

    fn finish_recv(&mut self, reply: u8) {
        self.emit(&[reply]);
        self.echo = true;
        self.mode = Mode::Interpreter;
    }

    fn send_block(&mut self, payload: &[u8]) {
        let mut frame = vec![BLOCK_START, payload.len() as u8];
        frame.extend_from_slice(payload);
        frame.resize(FRAME_SIZE, 0);
        if self.faults.contains(&Fault::CorruptFrameStart) {
            frame[0] = CORRUPT_START;
        }
        if self.faults.contains(&Fault::StallMidFrame) {
            frame.truncate(FRAME_SIZE / 2);
            self.mode = Mode::Stalled;
        }
        self.emit(&frame);
        self.stats.frames_sent += 1;
    }

    fn interpret(&mut self, line: &str) {
        if self.echo {
            self.println(line);
        }

        let starts_definition = self.chunk.is_empty() && line.starts_with("function ");
        if starts_definition && self.faults.contains(&Fault::RejectDefinitions) {
            self.println("stdin:1: unexpected symbol near 'function'");
            self.emit_str(PROMPT);
            return;
        }

        self.depth += block_delta(line);
        if self.depth > 0 {
            self.chunk.push(line.to_string());
            self.emit_str(CONTINUATION_PROMPT);
            return;
        }
        self.depth = 0;

        if starts_definition || !self.chunk.is_empty() {
            let mut chunk = std::mem::take(&mut self.chunk);
            chunk.push(line.to_string());
            self.close_chunk(chunk);
        } else {
            self.stats.lines_executed.push(line.to_string());
            self.execute(line);
        }
        self.emit_str(PROMPT);
    }

    fn close_chunk(&mut self, chunk: Vec<String>) {
        let Some(first) = chunk.first() else {
            return;
        };
        match function_name(first) {
            Some(name) => {
                self.stats.definition_lines += chunk.len();
                debug!("defined function {}", name);
                self.functions.insert(name, chunk);
            }
            None => {
                self.stats.lines_executed.push(chunk.join("\n"));
            }
        }
    }

    fn execute(&mut self, line: &str) {
        let Some(command) = Command::parse(line) else {
            self.execute_raw(line);
            return;
        };
        match command {
            Command::Empty => {}
            Command::Sync => self.println(SYNC_MARKER),
            Command::Autobaud => self.println("stdin:1: '=' expected near '<eof>'"),
            Command::UartSetup { baud, echo } => {
                self.set_baud(baud);
                self.echo = echo;
            }
            Command::Probe { name } => {
                if self.functions.contains_key(&name) {
                    let address = 0x3fff_0000u32 + name.len() as u32 * 0x40;
                    self.println(&format!("function: 0x{:08x}", address));
                } else {
                    self.println("nil");
                }
            }
            Command::Recv { baud } => {
                if !self.require("recv") {
                    return;
                }
                self.set_baud(baud);
                self.echo = false;
                self.emit(&[TRANSFER_START]);
                self.mode = Mode::RecvName { name: Vec::new() };
            }
            Command::Send { path } => {
                if !self.require("send") {
                    return;
                }
                if self.files.contains_key(&path) {
                    self.mode = Mode::AwaitStart { file: path };
                } else {
                    self.println(&format!("unexpected could not open {}", path));
                }
            }
            Command::Sha1 { path } => {
                if !self.require("shafile") {
                    return;
                }
                let digest = self.faults.iter().find_map(|fault| match fault {
                    Fault::DigestOverride(digest) => Some(digest.clone()),
                    _ => None,
                });
                let reply = match (digest, self.files.get(&path)) {
                    (_, None) => "stdin:1: bad argument #2 to 'fhash' (could not open file)".to_string(),
                    (Some(digest), Some(_)) => digest,
                    (None, Some(data)) => hex::encode(Sha1::digest(data)),
                };
                self.println(&reply);
            }
            Command::ListFiles => {
                let listing: Vec<String> = self
                    .files
                    .iter()
                    .map(|(name, data)| format!("{}\t{}", name, data.len()))
                    .collect();
                for entry in listing {
                    self.println(&entry);
                }
            }
            Command::Format => {
                self.files.clear();
                self.println("format done");
            }
            Command::Remove { path } => {
                self.files.remove(&path);
            }
            Command::RemoveAll => self.files.clear(),
            Command::Compile { path } => match self.files.get(&path).cloned() {
                Some(source) => {
                    let stem = path.strip_suffix(".lua").unwrap_or(&path);
                    let mut bytecode = b"\x1bLua".to_vec();
                    bytecode.extend_from_slice(&source);
                    self.files.insert(format!("{}.lc", stem), bytecode);
                }
                None => self.println(&format!("stdin:1: cannot open {}", path)),
            },
            Command::DoFile { path } => {
                if self.files.contains_key(&path) {
                    self.stats.files_executed.push(path);
                } else {
                    self.println(&format!("stdin:1: cannot open {}", path));
                }
            }
            Command::PrintFile { path } => match self.files.get(&path).cloned() {
                Some(data) => {
                    self.emit_str(&format!("---{}---\n", path));
                    self.emit(&data);
                    self.emit_str("---\n");
                }
                None => self.println("stdin:1: attempt to index local 'fd' (a nil value)"),
            },
            Command::Heap => {
                let heap = self.heap;
                self.println(&heap.to_string());
            }
            Command::Restart => self.restart(),
            Command::Raw { line } => self.execute_raw(&line),
        }
    }

    /// The handful of plain statements the simulator understands.
    fn execute_raw(&mut self, line: &str) {
        let trimmed = line.trim().trim_end_matches(';');
        if let Some(arg) = trimmed.strip_prefix("print(").and_then(|s| s.strip_suffix(')')) {
            let arg = arg.trim();
            let quoted = (arg.starts_with('"') && arg.ends_with('"')) || (arg.starts_with('\'') && arg.ends_with('\''));
            if quoted && arg.len() >= 2 {
                self.println(&arg[1..arg.len() - 1]);
                return;
            }
            if let Ok(value) = arg.parse::<i64>() {
                self.println(&value.to_string());
                return;
            }
        }
        let is_assignment = trimmed
            .split_once('=')
            .is_some_and(|(name, value)| is_identifier(name.trim()) && !value.trim().is_empty());
        if !is_assignment && !trimmed.is_empty() {
            let near = trimmed.chars().next().unwrap_or(' ');
            self.println(&format!("stdin:1: unexpected symbol near '{}'", near));
        }
    }

    fn require(&mut self, name: &str) -> bool {
        if self.functions.contains_key(name) {
            return true;
        }
        self.println(&format!("stdin:1: attempt to call global '{}' (a nil value)", name));
        false
    }

    fn set_baud(&mut self, baud: u32) {
        if baud != self.baud && self.faults.contains(&Fault::IgnoreBaudChange) {
            debug!("ignoring switch to {} baud", baud);
            return;
        }
        self.baud = baud;
    }

    fn restart(&mut self) {
        debug!("restarting");
        self.functions.clear();
        self.baud = self.boot_baud;
        self.echo = true;
        self.line.clear();
        self.chunk.clear();
        self.depth = 0;
        self.emit_str("\r\nNodeMCU (simulated)\r\n");
    }
}

fn function_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("function ")?;
    let name: String = rest.chars().take_while(|&c| c.is_ascii_alphanumeric() || c == '_').collect();
    (!name.is_empty()).then_some(name)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Net number of blocks a line opens, ignoring string literals.
fn block_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    let mut finish_word = |word: &mut String| {
        match word.as_str() {
            "function" | "do" | "then" => delta += 1,
            "elseif" | "end" => delta -= 1,
            _ => {}
        }
        word.clear();
    };

    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        finish_word(&mut word);
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
    }
    finish_word(&mut word);
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_delta() {
        assert_eq!(block_delta("function recv()"), 1);
        assert_eq!(block_delta("if fd then fd:close() end"), 0);
        assert_eq!(block_delta("on('data',1,function(data)"), 1);
        assert_eq!(block_delta("end,0)"), -1);
        assert_eq!(block_delta("print('end of the function')"), 0);
        assert_eq!(block_delta("for key,value in pairs(file.list()) do print(key,value) end"), 0);
        assert_eq!(block_delta("if a then x() elseif b then y() end"), 0);
    }

    #[test]
    fn test_function_name() {
        assert_eq!(function_name("function shafile(f) print(f) end"), Some("shafile".to_string()));
        assert_eq!(function_name("local function finish(reply)"), None);
    }

    #[test]
    fn test_prompt_after_statement() {
        let mut state = DeviceState::default();
        state.receive(b"print(\"%sync%\");\n", DEFAULT_BAUD);
        let out = state.take_output(usize::MAX, DEFAULT_BAUD);
        assert_eq!(out, b"print(\"%sync%\");\r\n%sync%\r\n> ");
    }

    #[test]
    fn test_definition_uses_continuation_prompt() {
        let mut state = DeviceState::default();
        state.receive(b"function hello()\nprint(1)\nend\n", DEFAULT_BAUD);
        let out = String::from_utf8(state.take_output(usize::MAX, DEFAULT_BAUD)).unwrap();
        assert_eq!(out, "function hello()\r\n>> print(1)\r\n>> end\r\n> ");
        assert!(state.functions.contains_key("hello"));
        assert!(state.stats.lines_executed.is_empty());
    }

    #[test]
    fn test_baud_mismatch_garbles() {
        let mut state = DeviceState::default();
        state.receive(b"print(1)\n", 9600);
        assert!(!state.has_output());
        assert_eq!(state.stats.garbled_bytes, 9);

        state.receive(b"print(1)\n", DEFAULT_BAUD);
        let out = state.take_output(usize::MAX, 9600);
        assert_ne!(out, b"print(1)\r\n1\r\n> ");
    }
}
