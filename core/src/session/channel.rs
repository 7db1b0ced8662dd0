//! Channel abstraction — one live duplex connection per city
//!
//! The gateway wraps whatever transport it accepted (WebSocket, in-memory
//! test pipe, ...) in a [`Channel`]. Failures are classified by the channel
//! itself through [`TransportError`], so the registry never inspects error
//! text to decide whether a session is gone.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Transport-level send failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer closed the connection
    #[error("Channel closed: {0}")]
    Closed(String),
    /// The connection was reset or dropped underneath us
    #[error("Connection reset: {0}")]
    Reset(String),
    /// The send did not complete within the configured bound
    #[error("Send timed out: {0}")]
    Timeout(String),
    /// Any other failure that does not prove the connection is dead
    #[error("Transient transport error: {0}")]
    Transient(String),
}

impl TransportError {
    /// True when the failure proves the channel is unusable and the
    /// session should be evicted.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Closed(_) | TransportError::Reset(_))
    }
}

/// A duplex text channel to one city
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver one text payload
    async fn send(&self, payload: &str) -> Result<(), TransportError>;

    /// Close the channel. Must be idempotent.
    async fn close(&self);
}

/// Process-unique identity of one accepted channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ChannelId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Shared handle to a channel plus its identity.
///
/// Two handles are equal only if they were cloned from the same
/// [`ChannelHandle::new`] call.
#[derive(Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    inner: Arc<dyn Channel>,
}

impl ChannelHandle {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            id: ChannelId::next(),
            inner: channel,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.inner.send(payload).await
    }

    pub async fn close(&self) {
        self.inner.close().await
    }
}

impl PartialEq for ChannelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChannelHandle {}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle").field("id", &self.id).finish()
    }
}
