// Integration test: end-to-end encrypted relay over the spanning tree
//
// Cities are in-memory recording channels attached through the facade.
// Every frame goes in through `handle_inbound` exactly as a gateway would
// feed it, and comes out as JSON on the recipients' channels.

use async_trait::async_trait;
use citynet_core::{
    Channel, ChannelHandle, City, CityNetwork, Edge, RelayConfig, RelayEnvelope, TransportError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct RecordingChannel {
    frames: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.frames
            .send(payload.to_string())
            .map_err(|_| TransportError::Closed("city went away".into()))
    }

    async fn close(&self) {}
}

struct Endpoint {
    name: &'static str,
    handle: ChannelHandle,
    inbox: mpsc::UnboundedReceiver<String>,
}

impl Endpoint {
    /// Next frame whose `type` is `kind`, skipping anything else
    async fn expect(&mut self, kind: &str) -> Value {
        loop {
            let raw = timeout(Duration::from_secs(3), self.inbox.recv())
                .await
                .unwrap_or_else(|_| panic!("{} timed out waiting for {}", self.name, kind))
                .expect("inbox closed");
            let frame: Value = serde_json::from_str(&raw).unwrap();
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// Next `system` notice containing `text`
    async fn expect_notice(&mut self, text: &str) -> String {
        loop {
            let notice = self.expect("system").await;
            let message = notice["message"].as_str().unwrap_or_default().to_string();
            if message.contains(text) {
                return message;
            }
        }
    }

    async fn quiet_for(&mut self, window: Duration) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(raw)) = timeout(window, self.inbox.recv()).await {
            frames.push(serde_json::from_str(&raw).unwrap());
        }
        frames
    }
}

async fn attach(network: &CityNetwork, name: &'static str) -> Endpoint {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ChannelHandle::new(Arc::new(RecordingChannel { frames: tx }));
    network.connect(name, handle.clone()).await;
    Endpoint {
        name,
        handle,
        inbox: rx,
    }
}

fn network(system_notices: bool) -> CityNetwork {
    tracing_subscriber::fmt()
        .with_env_filter("citynet_core=debug")
        .try_init()
        .ok();

    CityNetwork::new(RelayConfig {
        keepalive_interval_secs: 0,
        system_notices,
        ..Default::default()
    })
}

fn load_chain(network: &CityNetwork) {
    let cities = ["Beijing", "Zhengzhou", "Wuhan", "Guangzhou"]
        .into_iter()
        .map(City::named)
        .collect();
    let edges = vec![
        Edge::new(0, 1, 620.0),
        Edge::new(1, 2, 470.0),
        Edge::new(2, 3, 840.0),
        Edge::new(0, 3, 1900.0),
    ];
    network.load_topology(cities, edges).unwrap();
}

#[tokio::test]
async fn test_message_walks_the_tree() {
    let network = network(false);
    load_chain(&network);

    let mut beijing = attach(&network, "Beijing").await;
    let mut zhengzhou = attach(&network, "Zhengzhou").await;
    let mut wuhan = attach(&network, "Wuhan").await;
    let mut guangzhou = attach(&network, "Guangzhou").await;
    let mut monitor = attach(&network, "Monitor_Admin").await;

    let request = json!({"type": "send_encrypted", "to": "Guangzhou", "message": "南下的消息"});
    let kind = network
        .handle_inbound("Beijing", &beijing.handle, &request.to_string())
        .await
        .unwrap();
    assert_eq!(kind, "send_encrypted");

    // Every city on the route and the monitor see the same envelope
    let envelope = guangzhou.expect("encrypted_message").await;
    assert_eq!(
        envelope["route"],
        json!(["Beijing", "Zhengzhou", "Wuhan", "Guangzhou"])
    );
    for city in [&mut beijing, &mut zhengzhou, &mut wuhan, &mut monitor] {
        assert_eq!(city.expect("encrypted_message").await, envelope);
    }

    // Zhengzhou hands the envelope back to the relay; it is forwarded as-is
    network
        .handle_inbound("Zhengzhou", &zhengzhou.handle, &envelope.to_string())
        .await
        .unwrap();
    assert_eq!(wuhan.expect("encrypted_message").await, envelope);

    // The destination opens it
    network
        .handle_inbound("Guangzhou", &guangzhou.handle, &envelope.to_string())
        .await
        .unwrap();
    let trace = guangzhou.expect("decrypted_message").await;
    assert_eq!(trace["final_message"], "南下的消息");
    assert_eq!(trace["from"], "Beijing");
    assert_eq!(trace["aes_encrypted"], envelope["encrypted_data"]);
    assert_eq!(trace["aes_decrypted"], envelope["huffman_encoded"]);
    assert_eq!(trace["huffman_codes"], envelope["huffman_codes"]);
}

#[tokio::test]
async fn test_relay_without_topology_only_tells_sender() {
    let network = network(true);
    let mut a = attach(&network, "Shenyang").await;
    let mut b = attach(&network, "Dalian").await;
    a.quiet_for(Duration::from_millis(100)).await;
    b.quiet_for(Duration::from_millis(100)).await;

    let request = json!({"type": "send_encrypted", "to": "Dalian", "message": "hi"});
    network
        .handle_inbound("Shenyang", &a.handle, &request.to_string())
        .await
        .unwrap();

    let error = a.expect("error").await;
    assert!(error["message"].as_str().unwrap().contains("Topology not loaded"));
    assert!(b.quiet_for(Duration::from_millis(200)).await.is_empty());
}

#[tokio::test]
async fn test_envelope_from_the_wire_is_self_describing() {
    let network = network(false);
    load_chain(&network);
    let mut beijing = attach(&network, "Beijing").await;
    let mut wuhan = attach(&network, "Wuhan").await;

    let request = json!({"type": "send_encrypted", "to": "Wuhan", "message": "hop"});
    network
        .handle_inbound("Beijing", &beijing.handle, &request.to_string())
        .await
        .unwrap();
    beijing.expect("encrypted_message").await;

    let frame = wuhan.expect("encrypted_message").await;
    let envelope: RelayEnvelope = serde_json::from_value(frame).unwrap();
    assert_eq!(envelope.next_hop("Beijing"), Some("Zhengzhou"));
    assert_eq!(envelope.next_hop("Zhengzhou"), Some("Wuhan"));
    assert!(envelope.is_destination("Wuhan"));
}

#[tokio::test]
async fn test_system_notices_announce_relay() {
    let network = network(true);
    load_chain(&network);
    let mut beijing = attach(&network, "Beijing").await;
    let mut wuhan = attach(&network, "Wuhan").await;

    beijing.expect_notice("Wuhan joined").await;

    let request = json!({"type": "send_encrypted", "to": "Wuhan", "message": "ping"});
    network
        .handle_inbound("Beijing", &beijing.handle, &request.to_string())
        .await
        .unwrap();

    let notice = wuhan
        .expect_notice("route: Beijing -> Zhengzhou -> Wuhan")
        .await;
    assert!(notice.starts_with("Beijing sent an encrypted message to Wuhan"));
}

#[tokio::test]
async fn test_monitor_join_is_silent() {
    let network = network(true);
    let mut city = attach(&network, "Nanjing").await;
    city.quiet_for(Duration::from_millis(100)).await;

    let _monitor = attach(&network, "Monitor_Admin").await;
    let frames = city.quiet_for(Duration::from_millis(200)).await;
    assert!(frames.iter().all(|f| f["type"] != "system"));
    assert_eq!(network.active_cities(), vec!["Nanjing".to_string()]);
    assert_eq!(network.connection_count(), 2);
}

#[tokio::test]
async fn test_malformed_frames_keep_channel_open() {
    let network = network(false);
    let mut city = attach(&network, "Kunming").await;

    assert!(network
        .handle_inbound("Kunming", &city.handle, "definitely not json")
        .await
        .is_err());
    assert!(network
        .handle_inbound("Kunming", &city.handle, r#"{"type":"send_encrypted","message":"x"}"#)
        .await
        .is_err());

    network
        .handle_inbound("Kunming", &city.handle, r#"{"type":"ping","timestamp":7}"#)
        .await
        .unwrap();
    assert_eq!(city.expect("pong").await["timestamp"], 7);
    assert_eq!(network.active_cities(), vec!["Kunming".to_string()]);
}
