//! Local IPC client for the Discord presence service.
//!
//! ## Wire Format
//!
//! Every message is a frame: little-endian `u32` opcode, little-endian `u32`
//! body length, then a UTF-8 JSON body.
//!
//! ```text
//! client → HANDSHAKE {"v":1,"client_id":"…"}
//! server → FRAME     {"cmd":"DISPATCH","evt":"READY",…}
//! client → FRAME     {"cmd":"SET_ACTIVITY","nonce":"…","args":{"pid":…,"activity":{…}|null}}
//! server → FRAME     {"cmd":"SET_ACTIVITY","evt":null|"ERROR",…}
//! ```
//!
//! ## Endpoints
//!
//! Unix: `discord-ipc-0` … `discord-ipc-9` under `XDG_RUNTIME_DIR`, `TMPDIR`,
//! `TMP`, `TEMP`, then `/tmp`. Windows: `\\?\pipe\discord-ipc-N`.

use chrono::Utc;
use rand::RngCore;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::SinkError;
use crate::presentation::SinkPayload;
use crate::sink::PresenceSink;

const ENDPOINT_COUNT: u32 = 10;
const MAX_FRAME_BYTES: usize = 64 * 1024;
#[cfg(unix)]
const IO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake,
    Frame,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn code(self) -> u32 {
        match self {
            Opcode::Handshake => 0,
            Opcode::Frame => 1,
            Opcode::Close => 2,
            Opcode::Ping => 3,
            Opcode::Pong => 4,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, SinkError> {
        match code {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(SinkError::Frame(format!("unknown opcode {}", other))),
        }
    }
}

pub fn write_frame<W: Write + ?Sized>(
    writer: &mut W,
    opcode: Opcode,
    payload: &Value,
) -> Result<(), SinkError> {
    let body = serde_json::to_vec(payload)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(SinkError::Frame(format!(
            "frame of {} bytes exceeds limit",
            body.len()
        )));
    }
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(&opcode.code().to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<(Opcode, Value), SinkError> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let opcode = Opcode::from_code(u32::from_le_bytes([
        header[0], header[1], header[2], header[3],
    ]))?;
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(SinkError::Frame(format!(
            "frame of {} bytes exceeds limit",
            length
        )));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((opcode, value))
}

trait IpcStream: Read + Write + Send {}
impl<T: Read + Write + Send> IpcStream for T {}

pub struct DiscordIpc {
    client_id: String,
    socket_dirs: Vec<PathBuf>,
    stream: Option<Box<dyn IpcStream>>,
}

impl DiscordIpc {
    pub fn new(client_id: &str) -> Self {
        Self::with_socket_dirs(client_id, default_socket_dirs())
    }

    /// Searches only `socket_dirs` for endpoints (Unix). Used by tests and by
    /// setups with a nonstandard runtime directory.
    pub fn with_socket_dirs(client_id: &str, socket_dirs: Vec<PathBuf>) -> Self {
        DiscordIpc {
            client_id: client_id.to_string(),
            socket_dirs,
            stream: None,
        }
    }

    #[cfg(unix)]
    fn open_endpoint(&self) -> Result<Box<dyn IpcStream>, SinkError> {
        use std::os::unix::net::UnixStream;

        for dir in &self.socket_dirs {
            for index in 0..ENDPOINT_COUNT {
                let path = dir.join(format!("discord-ipc-{}", index));
                match UnixStream::connect(&path) {
                    Ok(stream) => {
                        let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
                        let _ = stream.set_write_timeout(Some(IO_TIMEOUT));
                        debug!(path = %path.display(), "Opened presence IPC socket");
                        return Ok(Box::new(stream));
                    }
                    Err(_) => continue,
                }
            }
        }
        Err(SinkError::NoEndpoint)
    }

    #[cfg(windows)]
    fn open_endpoint(&self) -> Result<Box<dyn IpcStream>, SinkError> {
        for index in 0..ENDPOINT_COUNT {
            let path = format!(r"\\?\pipe\discord-ipc-{}", index);
            if let Ok(pipe) = fs_err::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
            {
                debug!(path = %path, "Opened presence IPC pipe");
                return Ok(Box::new(pipe));
            }
        }
        Err(SinkError::NoEndpoint)
    }

    fn exchange(&mut self, request: &Value) -> Result<(), SinkError> {
        let stream: &mut dyn IpcStream = match self.stream.as_mut() {
            Some(stream) => &mut **stream,
            None => return Err(SinkError::NotConnected),
        };
        write_frame(stream, Opcode::Frame, request)?;

        loop {
            let (opcode, reply) = read_frame(stream)?;
            match opcode {
                Opcode::Ping => write_frame(stream, Opcode::Pong, &reply)?,
                Opcode::Frame => return check_reply(&reply),
                Opcode::Close => return Err(SinkError::Closed(reply_message(&reply))),
                other => {
                    return Err(SinkError::Frame(format!(
                        "unexpected {:?} frame in reply",
                        other
                    )))
                }
            }
        }
    }

    fn set_activity(&mut self, activity: Value) -> Result<(), SinkError> {
        let request = json!({
            "cmd": "SET_ACTIVITY",
            "nonce": make_nonce(),
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            },
        });

        let result = self.exchange(&request);
        if let Err(err) = &result {
            // A rejected payload leaves the connection usable.
            if !matches!(err, SinkError::Rejected(_)) {
                self.stream = None;
            }
        }
        result
    }
}

impl PresenceSink for DiscordIpc {
    fn connect(&mut self) -> Result<(), SinkError> {
        self.stream = None;
        let mut stream = self.open_endpoint()?;

        write_frame(
            &mut *stream,
            Opcode::Handshake,
            &json!({ "v": 1, "client_id": self.client_id }),
        )?;
        let (opcode, reply) = read_frame(&mut *stream)?;
        match opcode {
            Opcode::Frame => check_reply(&reply)?,
            Opcode::Close => return Err(SinkError::Closed(reply_message(&reply))),
            other => {
                return Err(SinkError::Frame(format!(
                    "unexpected {:?} frame during handshake",
                    other
                )))
            }
        }

        self.stream = Some(stream);
        info!(client_id = %self.client_id, "Connected to presence IPC");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn update(&mut self, payload: &SinkPayload) -> Result<(), SinkError> {
        self.set_activity(activity_json(payload))
    }

    fn clear(&mut self) -> Result<(), SinkError> {
        self.set_activity(Value::Null)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut stream) = self.stream.take() {
            write_frame(&mut *stream, Opcode::Close, &json!({}))?;
            info!("Disconnected from presence IPC");
        }
        Ok(())
    }
}

fn activity_json(payload: &SinkPayload) -> Value {
    json!({
        "state": payload.state,
        "details": payload.details,
        "timestamps": { "start": payload.start },
        "assets": {
            "large_image": payload.large_image,
            "large_text": payload.large_text,
            "small_image": payload.small_image,
            "small_text": payload.small_text,
        },
    })
}

fn check_reply(reply: &Value) -> Result<(), SinkError> {
    if reply.get("evt").and_then(Value::as_str) == Some("ERROR") {
        return Err(SinkError::Rejected(reply_message(reply)));
    }
    Ok(())
}

fn reply_message(reply: &Value) -> String {
    reply
        .pointer("/data/message")
        .or_else(|| reply.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

fn make_nonce() -> String {
    let mut random = rand::thread_rng();
    format!("{}-{:x}", Utc::now().timestamp_millis(), random.next_u64())
}

fn default_socket_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect();
    dirs.push(PathBuf::from("/tmp"));
    dirs.dedup();
    dirs
}
