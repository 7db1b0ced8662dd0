// WebSocket gateway — one `/ws/{city}` socket per city session
//
// The gateway only moves frames. Each accepted socket becomes a channel in
// the core network; every text frame it reads is handed to the dispatcher.

use async_trait::async_trait;
use citynet_core::{Channel, ChannelHandle, CityNetwork, TransportError};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warp::ws::{Message, WebSocket};
use warp::Filter;

// ============================================================================
// SOCKET CHANNEL
// ============================================================================

enum Outgoing {
    Text(String),
    Close,
}

/// Outbound half of a socket, fed through a bounded queue to a writer task
struct WsChannel {
    tx: mpsc::Sender<Outgoing>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.tx
            .send(Outgoing::Text(payload.to_string()))
            .await
            .map_err(|_| TransportError::Closed("socket writer stopped".to_string()))
    }

    async fn close(&self) {
        let _ = tokio::time::timeout(Duration::from_secs(1), self.tx.send(Outgoing::Close)).await;
    }
}

// ============================================================================
// SERVER START
// ============================================================================

pub async fn serve(network: CityNetwork, port: u16) {
    let network_filter = warp::any().map({
        let network = network.clone();
        move || network.clone()
    });

    let ws_route = warp::path!("ws" / String)
        .and(warp::ws())
        .and(network_filter)
        .map(|city: String, ws: warp::ws::Ws, network: CityNetwork| {
            ws.on_upgrade(move |socket| handle_connection(socket, city, network))
        });

    let cors = warp::cors().allow_any_origin();
    let routes = ws_route.with(cors);

    info!("Gateway listening on 0.0.0.0:{}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}

// ============================================================================
// WEBSOCKET HANDLER
// ============================================================================

async fn handle_connection(ws: WebSocket, city: String, network: CityNetwork) {
    let city = decode_city(&city);
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Outgoing>(network.registry().config().channel_buffer.max(1));

    // Writer task: queue -> socket
    let writer_city = city.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                Outgoing::Text(text) => ws_tx.send(Message::text(text)).await,
                Outgoing::Close => {
                    let _ = ws_tx.send(Message::close()).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!("Socket write for {} failed: {}", writer_city, e);
                break;
            }
        }
    });

    let channel = ChannelHandle::new(Arc::new(WsChannel { tx }));
    network.connect(&city, channel.clone()).await;

    // Reader loop: socket -> dispatcher
    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Socket read for {} failed: {}", city, e);
                break;
            }
        };

        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_str() else {
            continue;
        };

        if let Err(e) = network.handle_inbound(&city, &channel, text).await {
            warn!("Dropping frame from {}: {}", city, e);
        }
    }

    network.disconnect(&city, &channel);
    writer.abort();
}

/// Percent-decode a city name taken from the request path
fn decode_city(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_city() {
        assert_eq!(decode_city("Beijing"), "Beijing");
        assert_eq!(decode_city("%E5%8C%97%E4%BA%AC"), "北京");
        assert_eq!(decode_city("New%20York"), "New York");
        assert_eq!(decode_city("bad%zz"), "bad%zz");
        assert_eq!(decode_city("trailing%2"), "trailing%2");
        assert_eq!(decode_city("%+41"), "%+41");
        assert_eq!(decode_city("a%-1b"), "a%-1b");
    }

    #[tokio::test]
    async fn test_ws_channel_reports_closed_writer() {
        let (tx, rx) = mpsc::channel(1);
        let channel = WsChannel { tx };
        drop(rx);
        let err = channel.send("x").await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_ws_channel_queues_text() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = WsChannel { tx };
        channel.send("hello").await.unwrap();
        channel.close().await;

        assert!(matches!(rx.recv().await, Some(Outgoing::Text(t)) if t == "hello"));
        assert!(matches!(rx.recv().await, Some(Outgoing::Close)));
    }
}
