// Per-session heartbeat loop
//
// Bound to one channel identity. Exits silently once that channel is no
// longer the one registered for its city, and exits after the first failed
// probe. Eviction is left to the gateway's disconnect path.

use super::channel::ChannelHandle;
use super::registry::SessionRegistry;
use crate::message::{encode_outbound, now_timestamp, Outbound};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub(crate) fn spawn(
    registry: SessionRegistry,
    city: String,
    channel: ChannelHandle,
    period: Duration,
) -> AbortHandle {
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if !registry.is_current(&city, &channel) {
                debug!("Keepalive for {} ({}) superseded, stopping", city, channel.id());
                break;
            }

            let probe = match encode_outbound(&Outbound::Heartbeat {
                timestamp: now_timestamp(),
            }) {
                Ok(probe) => probe,
                Err(e) => {
                    warn!("Failed to encode heartbeat: {}", e);
                    break;
                }
            };

            if let Err(e) = registry.deliver(&channel, &probe).await {
                warn!("Heartbeat to {} ({}) failed: {}", city, channel.id(), e);
                break;
            }
        }
    });
    task.abort_handle()
}
