//! Chunked upload and download.
//!
//! Both directions hand the UART over to a companion routine on the device
//! and then move [`Frame`]s, one ACK per frame.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use nodeup_protocol::{
    Command, Frame, FrameCodec, RemotePath, ACK, FRAME_SIZE, NUL, RECV_PROMPT, TRANSFER_START,
};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::exchange::Link;
use crate::session::Session;
use crate::transport::Transport;
use crate::verify::Verify;

/// How long to collect trailing output after a rejected frame.
const DIAGNOSTIC_WINDOW: Duration = Duration::from_millis(200);

impl<T: Transport> Session<T> {
    /// Upload `content` to `destination` on the device.
    ///
    /// The destination is validated before anything is written. A frame that
    /// is not ACKed aborts the whole upload.
    pub fn write_bytes(&mut self, destination: &str, content: &[u8], verify: Verify) -> Result<()> {
        let path = RemotePath::new(destination).map_err(Error::Validation)?;
        info!("transferring {} bytes to {}", content.len(), path);
        let timeout = self.timeout();
        let baud = self.baud();
        let link = self.link()?;

        link.write_line(&Command::Recv { baud }.to_command_string())?;
        link.read_until(RECV_PROMPT, timeout)?;

        let mut name = path.as_bytes().to_vec();
        name.push(NUL);
        link.write(&name, true)?;
        match link.read_byte(timeout)? {
            Some(ACK) => {}
            received => {
                return Err(Error::NoAck {
                    context: format!("destination name {}", path),
                    received,
                })
            }
        }

        let mut frames = 0;
        for frame in Frame::chunks(content) {
            send_frame(link, &frame, timeout)?;
            frames += 1;
        }
        send_frame(link, &Frame::terminal(), timeout)?;
        debug!("sent {} frames to {}", frames + 1, path);

        self.verify(&path, content, verify)
    }

    /// Upload a local file. The destination defaults to the file's name.
    pub fn write_file(&mut self, source: impl AsRef<Path>, destination: Option<&str>, verify: Verify) -> Result<()> {
        let source = source.as_ref();
        let destination = match destination {
            Some(destination) => destination.to_string(),
            None => file_name(source)?,
        };
        let content = std::fs::read(source)?;
        info!("uploading {} to {}", source.display(), destination);
        self.write_bytes(&destination, &content, verify)
    }

    /// Download a remote file.
    ///
    /// Fails with [`Error::RemoteError`] before any binary exchange if the
    /// device cannot open the file.
    pub fn read_bytes(&mut self, remote: &str) -> Result<Bytes> {
        let path = RemotePath::new(remote).map_err(Error::Validation)?;
        let command = Command::Send {
            path: path.to_string(),
        }
        .to_command_string();
        let reply = self.exchange(&command)?;
        if reply.has_error_marker() {
            return Err(Error::RemoteError {
                command,
                response: reply.text().to_string(),
            });
        }

        let timeout = self.timeout();
        let link = self.link()?;
        link.write(&[TRANSFER_START], true)?;
        let echoed = link.read_until(&[NUL], timeout)?;
        info!(
            "receiving {}",
            String::from_utf8_lossy(&echoed[..echoed.len() - 1]).trim()
        );
        link.write(&[ACK], true)?;

        let mut codec = FrameCodec::new();
        let mut data = BytesMut::new();
        loop {
            let frame = receive_frame(link, &mut codec, timeout)?;
            if frame.is_terminal() {
                break;
            }
            link.write(&[ACK], true)?;
            data.extend_from_slice(frame.payload());
        }
        debug!("received {} bytes from {}", data.len(), path);
        Ok(data.freeze())
    }

    /// Download a remote file into `destination`, or into a local file of the
    /// same name. Returns the local path written.
    pub fn read_file(&mut self, remote: &str, destination: Option<&Path>) -> Result<PathBuf> {
        let data = self.read_bytes(remote)?;
        let local = destination.map_or_else(|| PathBuf::from(remote), Path::to_path_buf);
        std::fs::write(&local, &data)?;
        info!("wrote {} bytes to {}", data.len(), local.display());
        Ok(local)
    }
}

fn send_frame<T: Transport>(link: &mut Link<T>, frame: &Frame, timeout: Duration) -> Result<()> {
    trace!("sending frame with {} bytes", frame.payload().len());
    link.write(&frame.encode(), true)?;
    match link.read_byte(timeout)? {
        Some(ACK) => Ok(()),
        received => {
            let mut actual = BytesMut::new();
            actual.extend(received);
            actual.extend_from_slice(&link.drain(DIAGNOSTIC_WINDOW));
            warn!("frame not acknowledged, device sent: {:?}", String::from_utf8_lossy(&actual));
            Err(Error::bad_response(&[ACK], &actual))
        }
    }
}

/// Read exactly the bytes missing from the current frame, so anything the
/// device sends ahead stays queued in the transport until it is ACKed for.
fn receive_frame<T: Transport>(link: &mut Link<T>, codec: &mut FrameCodec, timeout: Duration) -> Result<Frame> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; FRAME_SIZE];
    loop {
        if let Some(frame) = codec.decode()? {
            return Ok(frame);
        }
        let n = link.read_available(&mut buf[..codec.missing()], deadline)?;
        if n == 0 {
            if codec.buffered_len() > 0 {
                warn!("stream stalled inside a frame: {}", hex::encode(codec.buffered()));
            }
            return Ok(codec.finish()?);
        }
        codec.push(&buf[..n])?;
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("no file name in {}", path.display())))
}
