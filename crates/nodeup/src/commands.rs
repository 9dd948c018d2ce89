//! Single-shot filesystem and node commands.

use std::path::Path;

use nodeup_protocol::{Command, RemoteFile, RemotePath, Reply};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{Session, FORMAT_TIMEOUT};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// List the files on the device.
    pub fn file_list(&mut self) -> Result<Vec<RemoteFile>> {
        let reply = self.run(Command::ListFiles)?;
        let files = reply.file_list()?;
        for file in &files {
            info!("{}\t{}", file.name, file.size);
        }
        Ok(files)
    }

    /// Format the device filesystem. This can take minutes.
    pub fn file_format(&mut self) -> Result<Reply> {
        info!("formatting filesystem");
        let command = Command::Format.to_command_string();
        let reply = self.exchange_with_timeout(&command, FORMAT_TIMEOUT)?;
        if !reply.is_format_done() {
            warn!("format did not confirm: {:?}", reply.text());
        }
        Ok(reply)
    }

    /// Compile a Lua file into bytecode next to it.
    pub fn file_compile(&mut self, path: &str) -> Result<Reply> {
        let path = validate(path)?;
        info!("compiling {}", path);
        self.run(Command::Compile { path })
    }

    /// Remove a file.
    pub fn file_remove(&mut self, path: &str) -> Result<Reply> {
        let path = validate(path)?;
        info!("removing {}", path);
        self.run(Command::Remove { path })
    }

    /// Remove every file.
    pub fn file_remove_all(&mut self) -> Result<Reply> {
        info!("removing all files");
        self.run(Command::RemoveAll)
    }

    /// Execute a file on the device.
    pub fn file_do(&mut self, path: &str) -> Result<Reply> {
        let path = validate(path)?;
        info!("executing {}", path);
        self.run(Command::DoFile { path })
    }

    /// Print a remote file, framed by `---name---` and `---` lines.
    pub fn file_print(&mut self, path: &str) -> Result<Reply> {
        let path = validate(path)?;
        self.run(Command::PrintFile { path })
    }

    /// Free heap on the device, in bytes.
    pub fn node_heap(&mut self) -> Result<u32> {
        let heap = self.run(Command::Heap)?.heap()?;
        info!("heap: {}", heap);
        Ok(heap)
    }

    /// Restart the device.
    ///
    /// The interpreter prompt comes back after the restart banner, so the
    /// session should be synchronized again before further use.
    pub fn node_restart(&mut self) -> Result<Reply> {
        info!("restarting device");
        self.run(Command::Restart)
    }

    /// Run Lua source line by line and return the replies.
    pub fn exec_lines(&mut self, source: &str) -> Result<Vec<Reply>> {
        source
            .lines()
            .map(|line| {
                let reply = self.exchange(line)?;
                debug!("{}", reply.output().trim_end());
                Ok(reply)
            })
            .collect()
    }

    /// Run a local Lua file on the device, line by line.
    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<Reply>> {
        let path = path.as_ref();
        info!("executing {}", path.display());
        let source = std::fs::read_to_string(path)?;
        self.exec_lines(&source)
    }

    fn run(&mut self, command: Command) -> Result<Reply> {
        let text = command.to_command_string();
        let reply = self.exchange(&text)?;
        if reply.has_error_marker() {
            return Err(Error::RemoteError {
                command: text,
                response: reply.text().to_string(),
            });
        }
        Ok(reply)
    }
}

fn validate(path: &str) -> Result<String> {
    RemotePath::new(path)
        .map(|path| path.to_string())
        .map_err(Error::Validation)
}
