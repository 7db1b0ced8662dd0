//! Dispatcher — state machine over one inbound frame
//!
//! `ping` is answered inline on the sender's own channel. Everything that
//! fans out (`message`, `send_encrypted`, `encrypted_message`) runs as a
//! detached task, so a session's receive turn never waits on a delivery
//! addressed back to itself.

use crate::codec::{CodecError, MessageCodec};
use crate::message::{
    encode_outbound, now_timestamp, parse_inbound, DecryptedTrace, Inbound, MessageError,
    Outbound, RelayEnvelope, SendRequest, MAX_FRAME_SIZE,
};
use crate::routing::{RouteError, RoutingEngine};
use crate::session::{ChannelHandle, DeliveryReport, SessionRegistry};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why an encrypted send was not relayed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SendError {
    #[error("{0}")]
    Route(#[from] RouteError),
    #[error("{0}")]
    Codec(#[from] CodecError),
    /// The envelope would not fit in one frame at the next hop
    #[error("{0}")]
    Frame(#[from] MessageError),
}

/// What happened to an envelope at one city
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeOutcome {
    /// Decrypted at the destination and handed to its session
    Delivered(DecryptedTrace),
    /// Passed on unchanged to the next hop
    Forwarded { next: String },
    /// Destination could not open it; dropped
    DecryptFailed(CodecError),
    /// This city is neither the destination nor a forwarding hop
    NotOnRoute,
}

#[derive(Clone)]
pub struct Dispatcher {
    routing: Arc<RwLock<RoutingEngine>>,
    codec: MessageCodec,
    registry: SessionRegistry,
}

impl Dispatcher {
    pub fn new(
        routing: Arc<RwLock<RoutingEngine>>,
        codec: MessageCodec,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            routing,
            codec,
            registry,
        }
    }

    /// Classify one raw frame from `city` and act on it.
    ///
    /// Malformed frames are returned as errors for the caller to log; the
    /// channel stays open either way.
    pub async fn handle(
        &self,
        city: &str,
        channel: &ChannelHandle,
        raw: &str,
    ) -> Result<&'static str, MessageError> {
        let inbound = parse_inbound(raw)?;
        let kind = inbound.kind();

        match inbound {
            Inbound::Ping { timestamp } => {
                self.reply(city, channel, &Outbound::Pong { timestamp }).await;
            }
            Inbound::Ack => {}
            Inbound::Broadcast(_) => {
                let registry = self.registry.clone();
                let payload = raw.to_string();
                tokio::spawn(async move {
                    registry.broadcast(&payload).await;
                });
            }
            Inbound::SendEncrypted(request) => {
                let dispatcher = self.clone();
                let (from, channel) = (city.to_string(), channel.clone());
                tokio::spawn(async move {
                    let _ = dispatcher.send_encrypted(&from, &channel, request).await;
                });
            }
            Inbound::Envelope(envelope) => {
                let dispatcher = self.clone();
                let city = city.to_string();
                tokio::spawn(async move {
                    dispatcher.receive_envelope(&city, envelope).await;
                });
            }
        }

        Ok(kind)
    }

    async fn reply(&self, city: &str, channel: &ChannelHandle, message: &Outbound) {
        let payload = match encode_outbound(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode reply to {}: {}", city, e);
                return;
            }
        };
        if let Err(e) = self.registry.deliver(channel, &payload).await {
            warn!("Reply to {} failed: {}", city, e);
        }
    }

    // ========================================================================
    // send_encrypted
    // ========================================================================

    /// Route, encrypt and relay one message from `from`.
    ///
    /// Any failure is reported to the requester only, as an `error` frame on
    /// its own channel, and returned.
    pub async fn send_encrypted(
        &self,
        from: &str,
        channel: &ChannelHandle,
        request: SendRequest,
    ) -> Result<DeliveryReport, SendError> {
        match self.build_and_relay(from, &request).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Encrypted send {} -> {} failed: {}", from, request.to, e);
                let notice = Outbound::Error {
                    message: format!("Failed to send encrypted message: {}", e),
                };
                self.reply(from, channel, &notice).await;
                Err(e)
            }
        }
    }

    async fn build_and_relay(
        &self,
        from: &str,
        request: &SendRequest,
    ) -> Result<DeliveryReport, SendError> {
        let route = {
            let routing = self.routing.read();
            routing.query_route(from, &request.to)?.route
        };

        let key = self
            .codec
            .establish_shared_key_offloaded(from, &request.to)
            .await?;
        let sealed = self.codec.encrypt_offloaded(&request.message, key).await?;

        let envelope = RelayEnvelope {
            from: from.to_string(),
            to: request.to.clone(),
            route,
            original_message: request.message.clone(),
            huffman_encoded: sealed.bitstring,
            huffman_codes: sealed.table,
            encrypted_data: sealed.ciphertext,
            timestamp: now_timestamp(),
        };

        let frame = encode_outbound(&Outbound::EncryptedMessage(envelope.clone()))?;
        if frame.len() > MAX_FRAME_SIZE {
            return Err(MessageError::TooLarge(frame.len()).into());
        }

        let report = self.registry.relay(&envelope).await;
        info!(
            "Relayed {} -> {} via {} ({} delivered, {} offline)",
            from,
            request.to,
            envelope.route.join(" -> "),
            report.delivered.len(),
            report.skipped.len()
        );

        self.registry.announce(format!(
            "{} sent an encrypted message to {}, route: {}",
            from,
            request.to,
            envelope.route.join(" -> ")
        ));
        Ok(report)
    }

    // ========================================================================
    // encrypted_message
    // ========================================================================

    /// Handle an envelope that arrived on `city`'s channel
    pub async fn receive_envelope(&self, city: &str, envelope: RelayEnvelope) -> EnvelopeOutcome {
        if envelope.is_destination(city) {
            return self.open_at_destination(city, envelope).await;
        }

        match envelope.next_hop(city) {
            Some(next) => {
                let next = next.to_string();
                let forwarded = self
                    .registry
                    .send_message(&next, &Outbound::EncryptedMessage(envelope.clone()))
                    .await;
                if forwarded {
                    debug!("{} forwarded {} -> {} to {}", city, envelope.from, envelope.to, next);
                } else {
                    warn!("{} could not forward to {}", city, next);
                }
                self.registry.announce(format!(
                    "{} forwarded message from {} to {} (next: {})",
                    city, envelope.from, envelope.to, next
                ));
                EnvelopeOutcome::Forwarded { next }
            }
            None => {
                debug!(
                    "{} is not on route {} -> {}, ignoring envelope",
                    city, envelope.from, envelope.to
                );
                EnvelopeOutcome::NotOnRoute
            }
        }
    }

    async fn open_at_destination(&self, city: &str, envelope: RelayEnvelope) -> EnvelopeOutcome {
        let opened = match self.codec.shared_key(&envelope.from, &envelope.to) {
            Some(key) => {
                self.codec
                    .decrypt_offloaded(&envelope.encrypted_data, key, envelope.huffman_codes.clone())
                    .await
            }
            None => Err(CodecError::MissingKey(format!(
                "{}-{}",
                envelope.from, envelope.to
            ))),
        };

        let stages = match opened {
            Ok(stages) => stages,
            Err(e) => {
                warn!(
                    "{} failed to decrypt message from {}: {}",
                    city, envelope.from, e
                );
                let notice = Outbound::Error {
                    message: format!("Failed to decrypt message from {}: {}", envelope.from, e),
                };
                self.registry.send_message(city, &notice).await;
                return EnvelopeOutcome::DecryptFailed(e);
            }
        };

        let trace = DecryptedTrace {
            from: envelope.from.clone(),
            original_message: envelope.original_message,
            huffman_encoded: envelope.huffman_encoded,
            huffman_codes: envelope.huffman_codes,
            aes_encrypted: envelope.encrypted_data,
            aes_decrypted: stages.intermediate,
            final_message: stages.plaintext,
            timestamp: envelope.timestamp,
        };

        self.registry
            .send_message(city, &Outbound::DecryptedMessage(trace.clone()))
            .await;
        info!("{} received encrypted message from {}", city, envelope.from);
        self.registry.announce(format!(
            "{} received an encrypted message from {}",
            city, envelope.from
        ));
        EnvelopeOutcome::Delivered(trace)
    }
}
