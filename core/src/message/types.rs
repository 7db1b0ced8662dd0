// Wire message types — JSON text frames exchanged with each city

use crate::codec::CodeTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request from a city to send an encrypted message along the tree
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
}

/// A self-describing encrypted message travelling hop by hop.
///
/// Created once per send and forwarded unchanged; every hop can locate
/// itself in `route` without any other state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub from: String,
    pub to: String,
    /// Source to destination inclusive
    pub route: Vec<String>,
    /// Plaintext echo for display at the receiving end
    #[serde(default)]
    pub original_message: String,
    /// Compressed bit-string that was encrypted
    pub huffman_encoded: String,
    pub huffman_codes: CodeTable,
    /// hex(nonce || ciphertext)
    pub encrypted_data: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl RelayEnvelope {
    /// Position of `city` in the route, if present
    pub fn position_of(&self, city: &str) -> Option<usize> {
        self.route.iter().position(|c| c == city)
    }

    /// The hop after `city`, if `city` is on the route and not last
    pub fn next_hop(&self, city: &str) -> Option<&str> {
        let index = self.position_of(city)?;
        self.route.get(index + 1).map(String::as_str)
    }

    pub fn is_destination(&self, city: &str) -> bool {
        self.to == city
    }
}

/// Everything the destination saw while opening an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedTrace {
    pub from: String,
    pub original_message: String,
    pub huffman_encoded: String,
    pub huffman_codes: CodeTable,
    /// Ciphertext before decryption
    pub aes_encrypted: String,
    /// Bit-string after decryption, before decompression
    pub aes_decrypted: String,
    pub final_message: String,
    pub timestamp: f64,
}

/// Frames the relay sends to cities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Pong {
        #[serde(default)]
        timestamp: Option<Value>,
    },
    Heartbeat {
        timestamp: f64,
    },
    Error {
        message: String,
    },
    System {
        message: String,
        timestamp: f64,
    },
    EncryptedMessage(RelayEnvelope),
    DecryptedMessage(DecryptedTrace),
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Liveness probe; answered with `pong` carrying the same timestamp
    Ping { timestamp: Option<Value> },
    /// Client reply to our heartbeat or pong; nothing to do
    Ack,
    /// Plain broadcast, forwarded verbatim
    Broadcast(Value),
    SendEncrypted(SendRequest),
    Envelope(RelayEnvelope),
}

impl Inbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::Ping { .. } => "ping",
            Inbound::Ack => "ack",
            Inbound::Broadcast(_) => "message",
            Inbound::SendEncrypted(_) => "send_encrypted",
            Inbound::Envelope(_) => "encrypted_message",
        }
    }
}
