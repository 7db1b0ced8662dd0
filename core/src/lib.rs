// CityNet Core — encrypted relay over a minimum-spanning-tree city network
//
// A city never talks to another city directly. Its messages are compressed,
// sealed under a pairwise key and walked hop by hop along the spanning tree.

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod routing;
pub mod session;

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

pub use codec::{CodeTable, CodecError, MessageCodec};
pub use config::RelayConfig;
pub use dispatch::{Dispatcher, EnvelopeOutcome, SendError};
pub use message::{DecryptedTrace, Inbound, MessageError, Outbound, RelayEnvelope};
pub use routing::{City, Edge, LoadSummary, RouteError, RouteInfo, RoutingEngine, TopologyStatus};
pub use session::{Channel, ChannelHandle, DeliveryReport, SessionRegistry, TransportError};

// ============================================================================
// NETWORK FACADE
// ============================================================================

/// Owned network state: topology, key cache and sessions.
///
/// Each instance is fully independent. Clones share state.
#[derive(Clone)]
pub struct CityNetwork {
    routing: Arc<RwLock<RoutingEngine>>,
    codec: MessageCodec,
    registry: SessionRegistry,
    dispatcher: Dispatcher,
}

impl CityNetwork {
    pub fn new(config: RelayConfig) -> Self {
        let routing = Arc::new(RwLock::new(RoutingEngine::new()));
        let codec = MessageCodec::new(config.codec_workers);
        let registry = SessionRegistry::new(config);
        let dispatcher = Dispatcher::new(routing.clone(), codec.clone(), registry.clone());
        Self {
            routing,
            codec,
            registry,
            dispatcher,
        }
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    /// Replace the topology. A rejected load leaves the previous one in place.
    pub fn load_topology(&self, cities: Vec<City>, edges: Vec<Edge>) -> Result<LoadSummary, RouteError> {
        self.routing.write().load(cities, edges)
    }

    pub fn query_route(&self, from: &str, to: &str) -> Result<RouteInfo, RouteError> {
        self.routing.read().query_route(from, to)
    }

    pub fn intermediate_cities(&self, from: &str, to: &str) -> Vec<String> {
        self.routing.read().intermediate_cities(from, to)
    }

    pub fn topology_status(&self) -> TopologyStatus {
        self.routing.read().status()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn active_cities(&self) -> Vec<String> {
        self.registry.active_cities()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    pub async fn connect(&self, city: &str, channel: ChannelHandle) {
        self.registry.connect(city, channel).await
    }

    pub fn disconnect(&self, city: &str, channel: &ChannelHandle) -> bool {
        self.registry.disconnect(city, channel)
    }

    /// Feed one raw frame received on `city`'s channel
    pub async fn handle_inbound(
        &self,
        city: &str,
        channel: &ChannelHandle,
        raw: &str,
    ) -> Result<&'static str, MessageError> {
        let kind = self.dispatcher.handle(city, channel, raw).await?;
        debug!("Handled {} from {}", kind, city);
        Ok(kind)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }
}

impl Default for CityNetwork {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
