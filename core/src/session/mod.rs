//! Session Registry — at most one live channel per city
//!
//! - `channel`: transport abstraction with typed failure classification
//! - `registry`: city → channel map, fan-out and eviction
//! - `keepalive`: heartbeat loop bound to one channel identity

pub mod channel;
mod keepalive;
pub mod registry;

pub use channel::{Channel, ChannelHandle, ChannelId, TransportError};
pub use registry::{DeliveryReport, SessionRegistry};
