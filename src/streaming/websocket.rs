// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! WebSocket server for the live event feed
//!
//! Each client gets its own hub subscription. Frames, in order:
//! `welcome`, one `history` frame with the replayed log backlog, then one
//! `event` frame per published envelope.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::StreamingConfig;
use crate::core::{Engine, Envelope, SubscriberId};

/// WebSocket server
pub struct WebSocketServer {
    addr: String,
    max_clients: usize,
    engine: Arc<Engine>,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
}

struct ClientHandle {
    addr: SocketAddr,
    subscriber: SubscriberId,
}

impl WebSocketServer {
    pub fn new(config: &StreamingConfig, engine: Arc<Engine>) -> Self {
        Self {
            addr: config.websocket_addr(),
            max_clients: config.websocket_max_clients,
            engine,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local);

        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let max_clients = self.max_clients;
        let client_shutdown = shutdown.resubscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let client_count = clients.read().await.len();
                                if client_count >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                tokio::spawn(handle_connection(
                                    stream,
                                    addr,
                                    engine.clone(),
                                    clients.clone(),
                                    client_shutdown.resubscribe(),
                                ));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Connected peers and the hub subscriber serving each
    pub async fn clients(&self) -> Vec<(SocketAddr, SubscriberId)> {
        self.clients
            .read()
            .await
            .values()
            .map(|c| (c.addr, c.subscriber))
            .collect()
    }
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

fn event_frame(envelope: &Envelope) -> Message {
    text(json!({
        "type": "event",
        "seq": envelope.seq,
        "event": envelope.event.as_ref(),
    }))
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    engine: Arc<Engine>,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let mut subscription = engine.subscribe();
    info!(
        "New WebSocket connection from {} (id: {}, subscriber {})",
        addr,
        client_id,
        subscription.id()
    );

    clients.write().await.insert(
        client_id.clone(),
        ClientHandle {
            addr,
            subscriber: subscription.id(),
        },
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = json!({
        "type": "welcome",
        "client_id": client_id,
        "server": engine.config().app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "mode": engine.mode(),
        "alarm": engine.alarm_snapshot(),
    });

    let (backlog, early) = split_backlog(subscription.drain(), subscription.live_from());
    let history = json!({ "type": "history", "entries": backlog });

    let greeted = async {
        ws_sender.send(text(welcome)).await?;
        ws_sender.send(text(history)).await?;
        for envelope in &early {
            ws_sender.send(event_frame(envelope)).await?;
        }
        Ok::<_, tokio_tungstenite::tungstenite::Error>(())
    };
    if let Err(e) = greeted.await {
        warn!("Failed to greet {}: {}", addr, e);
    } else {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(body))) => {
                            debug!("Received from {}: {}", addr, body);
                            let is_ping = serde_json::from_str::<Value>(&body)
                                .ok()
                                .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == "ping"))
                                .unwrap_or(false);
                            if is_ping {
                                let _ = ws_sender.send(text(json!({"type": "pong"}))).await;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket closed by client {}", addr);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_sender.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error from {}: {}", addr, e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                envelope = subscription.recv() => {
                    match envelope {
                        Some(envelope) => {
                            if let Err(e) = ws_sender.send(event_frame(&envelope)).await {
                                warn!("Failed to send to {}: {}", addr, e);
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = shutdown.recv() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    if subscription.dropped() > 0 {
        warn!("Client {} lost {} events to a full queue", addr, subscription.dropped());
    }
    clients.write().await.remove(&client_id);
    drop(subscription);

    info!("WebSocket client {} disconnected", addr);
}

/// Separate replayed log entries from live envelopes queued behind them
fn split_backlog(queued: Vec<Envelope>, live_from: u64) -> (Vec<Envelope>, Vec<Envelope>) {
    queued.into_iter().partition(|envelope| envelope.seq < live_from)
}
