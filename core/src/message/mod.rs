//! Wire Protocol — JSON frames between the relay and city channels
//!
//! Inbound frames are classified by their `type` field before their body is
//! parsed, so a plain `message` broadcast keeps every field it arrived with.

pub mod types;

pub use types::{DecryptedTrace, Inbound, Outbound, RelayEnvelope, SendRequest};

use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum inbound frame size: 256 KB
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Inbound parse failures. The frame is dropped; the channel stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Frame has no type field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid {kind} frame: {reason}")]
    InvalidFields { kind: &'static str, reason: String },
}

/// Classify and parse one inbound text frame
pub fn parse_inbound(raw: &str) -> Result<Inbound, MessageError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(MessageError::TooLarge(raw.len()));
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| MessageError::InvalidJson(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(MessageError::MissingType)?
        .to_string();

    match kind.as_str() {
        "ping" => Ok(Inbound::Ping {
            timestamp: value.get("timestamp").cloned(),
        }),
        "pong" | "heartbeat" => Ok(Inbound::Ack),
        "message" => Ok(Inbound::Broadcast(value)),
        "send_encrypted" => {
            let request: SendRequest = serde_json::from_value(value).map_err(|e| {
                MessageError::InvalidFields {
                    kind: "send_encrypted",
                    reason: e.to_string(),
                }
            })?;
            if request.to.is_empty() {
                return Err(MessageError::InvalidFields {
                    kind: "send_encrypted",
                    reason: "missing recipient".to_string(),
                });
            }
            if request.message.is_empty() {
                return Err(MessageError::InvalidFields {
                    kind: "send_encrypted",
                    reason: "missing message".to_string(),
                });
            }
            Ok(Inbound::SendEncrypted(request))
        }
        "encrypted_message" => {
            let envelope: RelayEnvelope = serde_json::from_value(value).map_err(|e| {
                MessageError::InvalidFields {
                    kind: "encrypted_message",
                    reason: e.to_string(),
                }
            })?;
            if envelope.from.is_empty() || envelope.to.is_empty() || envelope.encrypted_data.is_empty() {
                return Err(MessageError::InvalidFields {
                    kind: "encrypted_message",
                    reason: "from, to and encrypted_data are required".to_string(),
                });
            }
            Ok(Inbound::Envelope(envelope))
        }
        other => Err(MessageError::UnknownType(other.to_string())),
    }
}

/// Serialize an outbound frame
pub fn encode_outbound(message: &Outbound) -> Result<String, MessageError> {
    serde_json::to_string(message).map_err(|e| MessageError::InvalidJson(e.to_string()))
}

/// Seconds since the Unix epoch, millisecond precision
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
        / 1000.0
}
