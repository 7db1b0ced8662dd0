//! Session registry — city identity → live channel
//!
//! The map sits behind a `parking_lot::RwLock` that is never held across an
//! await. Fan-out sends run concurrently against a snapshot of the map, and
//! evictions are applied only after every send has resolved.
//!
//! Every mutation that removes an entry checks channel identity first, so a
//! late disconnect or failed send from a superseded channel never evicts the
//! session that replaced it.

use super::channel::{ChannelHandle, TransportError};
use super::keepalive;
use crate::config::RelayConfig;
use crate::message::{encode_outbound, now_timestamp, Outbound, RelayEnvelope};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

struct SessionEntry {
    channel: ChannelHandle,
    keepalive: Option<AbortHandle>,
}

impl SessionEntry {
    fn stop_keepalive(&mut self) {
        if let Some(handle) = self.keepalive.take() {
            handle.abort();
        }
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    /// Send failed; includes evicted cities
    pub failed: Vec<String>,
    /// Failed with a disconnect and removed from the registry
    pub evicted: Vec<String>,
    /// Targets with no registered session
    pub skipped: Vec<String>,
}

impl DeliveryReport {
    pub fn delivered_to(&self, city: &str) -> bool {
        self.delivered.iter().any(|c| c == city)
    }
}

/// Owned session state, cheap to clone and share between tasks
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    config: Arc<RelayConfig>,
}

impl SessionRegistry {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Register `channel` as the live session for `city`.
    ///
    /// A previous session for the same city is evicted and closed. The join
    /// notice to other cities runs as a detached task; connect never waits
    /// on it and never fails because of it.
    pub async fn connect(&self, city: &str, channel: ChannelHandle) {
        let keepalive = self.config.keepalive_interval().map(|period| {
            keepalive::spawn(self.clone(), city.to_string(), channel.clone(), period)
        });

        let previous = {
            let mut sessions = self.sessions.write();
            sessions.insert(
                city.to_string(),
                SessionEntry {
                    channel: channel.clone(),
                    keepalive,
                },
            )
        };

        if let Some(mut old) = previous {
            old.stop_keepalive();
            info!(
                "Session for {} superseded: {} replaced by {}",
                city,
                old.channel.id(),
                channel.id()
            );
            old.channel.close().await;
        } else {
            info!("{} connected ({})", city, channel.id());
        }

        if !self.is_monitor(city) {
            self.announce(format!("{} joined the city network", city));
        }
    }

    /// Remove `city` only if `channel` is still its registered session.
    ///
    /// Returns true when an entry was removed. Stale or repeated calls are
    /// no-ops.
    pub fn disconnect(&self, city: &str, channel: &ChannelHandle) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(city) {
                Some(entry) if entry.channel == *channel => sessions.remove(city),
                _ => None,
            }
        };

        match removed {
            Some(mut entry) => {
                entry.stop_keepalive();
                info!("{} disconnected ({})", city, channel.id());
                true
            }
            None => {
                debug!("Ignoring stale disconnect for {} ({})", city, channel.id());
                false
            }
        }
    }

    pub fn is_current(&self, city: &str, channel: &ChannelHandle) -> bool {
        self.sessions
            .read()
            .get(city)
            .map(|entry| entry.channel == *channel)
            .unwrap_or(false)
    }

    pub fn channel_for(&self, city: &str) -> Option<ChannelHandle> {
        self.sessions.read().get(city).map(|entry| entry.channel.clone())
    }

    /// Registered city identities, sorted, without the monitor
    pub fn active_cities(&self) -> Vec<String> {
        let mut cities: Vec<String> = self
            .sessions
            .read()
            .keys()
            .filter(|city| !self.is_monitor(city))
            .cloned()
            .collect();
        cities.sort();
        cities
    }

    /// Number of registered sessions, monitor included
    pub fn connection_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn is_monitor(&self, city: &str) -> bool {
        city == self.config.monitor_city
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// One send bounded by the configured timeout
    pub async fn deliver(
        &self,
        channel: &ChannelHandle,
        payload: &str,
    ) -> Result<(), TransportError> {
        let limit = self.config.send_timeout();
        match tokio::time::timeout(limit, channel.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!("{:?}", limit))),
        }
    }

    /// Best-effort send to one city. Failures are logged, never raised.
    pub async fn send_to(&self, city: &str, payload: &str) -> bool {
        let Some(channel) = self.channel_for(city) else {
            debug!("No session for {}, dropping message", city);
            return false;
        };

        match self.deliver(&channel, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to {} failed: {}", city, e);
                if e.is_disconnect() {
                    self.evict(vec![(city.to_string(), channel)]).await;
                }
                false
            }
        }
    }

    /// Serialize and send one outbound frame to `city`
    pub async fn send_message(&self, city: &str, message: &Outbound) -> bool {
        match encode_outbound(message) {
            Ok(payload) => self.send_to(city, &payload).await,
            Err(e) => {
                warn!("Failed to encode message for {}: {}", city, e);
                false
            }
        }
    }

    /// Send `payload` to every registered session concurrently
    pub async fn broadcast(&self, payload: &str) -> DeliveryReport {
        let targets: Vec<(String, ChannelHandle)> = self
            .sessions
            .read()
            .iter()
            .map(|(city, entry)| (city.clone(), entry.channel.clone()))
            .collect();

        self.fan_out(targets, Vec::new(), payload).await
    }

    /// Send an envelope to every city on its route plus the monitor
    pub async fn relay(&self, envelope: &RelayEnvelope) -> DeliveryReport {
        let payload = match encode_outbound(&Outbound::EncryptedMessage(envelope.clone())) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode envelope {} -> {}: {}", envelope.from, envelope.to, e);
                return DeliveryReport::default();
            }
        };

        let mut seen = HashSet::new();
        let mut wanted: Vec<&str> = envelope
            .route
            .iter()
            .map(String::as_str)
            .filter(|city| seen.insert(*city))
            .collect();
        if !seen.contains(self.config.monitor_city.as_str()) {
            wanted.push(self.config.monitor_city.as_str());
        }

        let (targets, skipped) = {
            let sessions = self.sessions.read();
            let mut targets = Vec::new();
            let mut skipped = Vec::new();
            for city in wanted {
                match sessions.get(city) {
                    Some(entry) => targets.push((city.to_string(), entry.channel.clone())),
                    None => skipped.push(city.to_string()),
                }
            }
            (targets, skipped)
        };

        for city in &skipped {
            debug!("Relay {} -> {}: {} is offline", envelope.from, envelope.to, city);
        }

        self.fan_out(targets, skipped, &payload).await
    }

    /// Broadcast a `system` notice as a detached task.
    ///
    /// Returns `None` when notices are disabled.
    pub fn announce(&self, text: impl Into<String>) -> Option<JoinHandle<DeliveryReport>> {
        if !self.config.system_notices {
            return None;
        }

        let notice = Outbound::System {
            message: text.into(),
            timestamp: now_timestamp(),
        };
        let registry = self.clone();
        Some(tokio::spawn(async move {
            match encode_outbound(&notice) {
                Ok(payload) => registry.broadcast(&payload).await,
                Err(e) => {
                    warn!("Failed to encode system notice: {}", e);
                    DeliveryReport::default()
                }
            }
        }))
    }

    async fn fan_out(
        &self,
        targets: Vec<(String, ChannelHandle)>,
        skipped: Vec<String>,
        payload: &str,
    ) -> DeliveryReport {
        let sends = targets.iter().map(|(_, channel)| self.deliver(channel, payload));
        let results = join_all(sends).await;

        let mut report = DeliveryReport {
            skipped,
            ..Default::default()
        };
        let mut dead = Vec::new();

        for ((city, channel), result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => report.delivered.push(city),
                Err(e) => {
                    warn!("Delivery to {} ({}) failed: {}", city, channel.id(), e);
                    report.failed.push(city.clone());
                    if e.is_disconnect() {
                        dead.push((city, channel));
                    }
                }
            }
        }

        report.evicted = self.evict(dead).await;
        report
    }

    /// Remove sessions proven dead, skipping any that were superseded
    async fn evict(&self, dead: Vec<(String, ChannelHandle)>) -> Vec<String> {
        let mut evicted = Vec::new();
        for (city, channel) in dead {
            if self.disconnect(&city, &channel) {
                info!("Evicted {} after transport disconnect", city);
                channel.close().await;
                evicted.push(city);
            }
        }
        evicted
    }
}
