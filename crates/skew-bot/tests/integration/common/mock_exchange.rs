//! Mock exchange for integration tests.
//!
//! Accepts one JSON-RPC WebSocket client at a time and:
//! - answers `public/auth` (or rejects it)
//! - acknowledges `public/set_heartbeat`, `public/test` and subscriptions
//! - records every request it receives
//! - pushes frames and closes the connection on demand

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Instruction for the connection task.
enum Control {
    Send(String),
    Close,
}

/// Behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    pub reject_auth: bool,
}

pub struct MockExchange {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl MockExchange {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let recorded = received.clone();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                handle_connection(stream, options, recorded, control_rx).await;
            }
        });

        Self {
            addr,
            received,
            control_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn push(&self, frame: Value) {
        let _ = self.control_tx.send(Control::Send(frame.to_string()));
    }

    pub fn send_test_request(&self) {
        self.push(json!({
            "jsonrpc": "2.0",
            "method": "heartbeat",
            "params": { "type": "test_request" }
        }));
    }

    pub fn close(&self) {
        let _ = self.control_tx.send(Control::Close);
    }

    pub async fn received(&self) -> Vec<Value> {
        self.received.lock().await.clone()
    }

    /// Requests received with `method`.
    pub async fn requests(&self, method: &str) -> Vec<Value> {
        self.received()
            .await
            .into_iter()
            .filter(|request| request["method"] == method)
            .collect()
    }

    /// Wait until `count` requests with `method` have arrived.
    pub async fn wait_for(&self, method: &str, count: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let matching = self.requests(method).await;
                if matching.len() >= count {
                    return matching;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} x {method}"))
    }
}

fn response(id: &Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result, "testnet": true }).to_string()
}

fn reply_to(request: &Value, options: MockOptions) -> Option<String> {
    let id = &request["id"];
    match request["method"].as_str()? {
        "public/auth" if options.reject_auth => Some(
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": 13004, "message": "invalid_credentials" }
            })
            .to_string(),
        ),
        "public/auth" => Some(response(
            id,
            json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 900,
                "token_type": "bearer",
                "scope": "session:test"
            }),
        )),
        "public/set_heartbeat" => Some(response(id, json!("ok"))),
        "public/test" => Some(response(id, json!({ "version": "1.2.26" }))),
        "private/subscribe" | "private/unsubscribe" => {
            Some(response(id, request["params"]["channels"].clone()))
        }
        _ => None,
    }
}

async fn handle_connection(
    stream: TcpStream,
    options: MockOptions,
    received: Arc<Mutex<Vec<Value>>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let reply = reply_to(&request, options);
                    received.lock().await.push(request);
                    if let Some(reply) = reply {
                        if write.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            control = control_rx.recv() => match control {
                Some(Control::Send(frame)) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
