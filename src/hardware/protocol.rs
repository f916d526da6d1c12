//! Hardware bridge message protocol
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ActuatorError;

/// Largest frame either side may send
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Requests from the daemon to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check sent once after spawning
    Ping,

    SetSpeed { speed: i16 },

    SetSteering { angle: i16 },

    SetPan { angle: i16 },

    SetTilt { angle: i16 },

    Stop,

    ReadDistance,

    ReadGrayscale,
}

impl Request {
    /// Operation name used in errors and logs
    pub fn op(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::SetSpeed { .. } => "set_speed",
            Request::SetSteering { .. } => "set_steering",
            Request::SetPan { .. } => "set_pan",
            Request::SetTilt { .. } => "set_tilt",
            Request::Stop => "stop",
            Request::ReadDistance => "read_distance",
            Request::ReadGrayscale => "read_grayscale",
        }
    }
}

/// Responses from the bridge to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    /// Actuator command applied
    Ok,

    Distance { cm: f64 },

    Grayscale { values: [u16; 3] },

    /// Command failed on the hardware side
    Error { code: String, message: String },
}

/// Send a length-prefixed JSON message
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), ActuatorError> {
    let bytes = serde_json::to_vec(msg).map_err(|e| ActuatorError::Protocol(e.to_string()))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| ActuatorError::Protocol("message too large".to_string()))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON message
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, ActuatorError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(ActuatorError::Protocol(format!("message of {len} bytes exceeds limit")));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    serde_json::from_slice(&buf).map_err(|e| ActuatorError::Protocol(e.to_string()))
}
