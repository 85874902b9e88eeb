//! In-process audio node for integration tests
//!
//! Serves `/streams/node/:source` (snapshot, then pushed updates and pings),
//! `POST /commands/node/:source`, and the node-less `/streams/session` socket.
//! Queue mutations posted over HTTP are applied and pushed as plain `QUEUE`
//! updates. Commands sent over the session socket are answered with the matching
//! `*_RESPONSE` message, like a real session server does.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amq_client::ClientConfig;
use amq_client::config::Timeouts;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const SESSION_SOURCE: &str = "kitchen";

#[derive(Debug, Clone)]
enum Push {
    Text(String),
    Close,
}

struct NodeState {
    queue: Mutex<Vec<String>>,
    posted: Mutex<Vec<(String, Value)>>,
    reject: Mutex<Option<StatusCode>>,
    ping_every: Option<Duration>,
    pushes: broadcast::Sender<Push>,
    hold_removes: AtomicBool,
    held: Mutex<Vec<String>>,
    open_streams: AtomicUsize,
}

impl NodeState {
    fn queue_json(&self) -> Value {
        let queue = self.queue.lock().unwrap();
        Value::Array(
            queue
                .iter()
                .map(|name| json!({ "identifier": name, "name": name }))
                .collect(),
        )
    }

    fn push_queue(&self) {
        let message = json!({ "QUEUE": self.queue_json() }).to_string();
        let _ = self.pushes.send(Push::Text(message));
    }

    /// Apply a queue command to the node's queue; the answer tag if it was one
    fn apply_command(&self, body: &Value) -> Option<&'static str> {
        let mut queue = self.queue.lock().unwrap();
        if let Some(index) = body["REMOVE_QUEUE_ITEM"]["index"].as_u64() {
            let index = index as usize;
            (index < queue.len()).then(|| queue.remove(index))?;
            Some("REMOVE_QUEUE_ITEM_RESPONSE")
        } else if let (Some(old), Some(new)) = (
            body["MOVE_QUEUE_ITEM"]["oldPos"].as_u64(),
            body["MOVE_QUEUE_ITEM"]["newPos"].as_u64(),
        ) {
            let (old, new) = (old as usize, new as usize);
            if old >= queue.len() || new >= queue.len() {
                return None;
            }
            let item = queue.remove(old);
            queue.insert(new, item);
            Some("MOVE_QUEUE_ITEM_RESPONSE")
        } else if let Some(title) = body["ADD_QUEUE_ITEM"]["title"].as_str() {
            queue.push(title.to_string());
            Some("ADD_QUEUE_ITEM_RESPONSE")
        } else if body.get("READ_QUEUE_ITEMS").is_some() {
            Some("READ_QUEUE_ITEMS_RESPONSE")
        } else {
            None
        }
    }

    /// Session answer to `body`, if the command has one
    fn session_answer(&self, body: &Value) -> Option<(&'static str, String)> {
        if let Some(name) = body["SET_ACTIVE_SOURCE"]["sourceName"].as_str() {
            let text = json!({ "SET_ACTIVE_SOURCE_RESPONSE": { "sourceName": name } });
            return Some(("SET_ACTIVE_SOURCE_RESPONSE", text.to_string()));
        }
        let tag = self.apply_command(body)?;
        let text = json!({ (tag): { "queue": self.queue_json() } });
        Some((tag, text.to_string()))
    }
}

/// Running mock node bound to a random local port
pub struct MockNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
}

impl MockNode {
    /// Node that pings every 50ms
    pub async fn start(queue: &[&str]) -> Self {
        Self::start_with_ping(queue, Some(Duration::from_millis(50))).await
    }

    pub async fn start_with_ping(queue: &[&str], ping_every: Option<Duration>) -> Self {
        let (pushes, _) = broadcast::channel(32);
        let state = Arc::new(NodeState {
            queue: Mutex::new(queue.iter().map(|s| s.to_string()).collect()),
            posted: Mutex::new(Vec::new()),
            reject: Mutex::new(None),
            ping_every,
            pushes,
            hold_removes: AtomicBool::new(false),
            held: Mutex::new(Vec::new()),
            open_streams: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/streams/node/:source", get(node_stream))
            .route("/streams/session", get(session_stream))
            .route("/commands/node/:source", post(command))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    /// Client config pointed at this node
    pub fn config(&self, heartbeat: Option<Duration>) -> ClientConfig {
        ClientConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            secure: false,
            timeouts: Timeouts {
                heartbeat,
                ..Timeouts::default()
            },
        }
    }

    /// Replace the queue and push it to open streams
    pub fn set_queue(&self, queue: &[&str]) {
        *self.state.queue.lock().unwrap() = queue.iter().map(|s| s.to_string()).collect();
        self.state.push_queue();
    }

    /// Push a raw text frame to open streams
    pub fn push_raw(&self, text: &str) {
        let _ = self.state.pushes.send(Push::Text(text.to_string()));
    }

    /// Close every open stream
    pub fn close_streams(&self) {
        let _ = self.state.pushes.send(Push::Close);
    }

    /// Answer further commands with `status`
    pub fn reject_with(&self, status: StatusCode) {
        *self.state.reject.lock().unwrap() = Some(status);
    }

    /// Apply session removes but keep their answers until `release_held`
    pub fn hold_removes(&self) {
        self.state.hold_removes.store(true, Ordering::SeqCst);
    }

    pub fn release_held(&self) {
        self.state.hold_removes.store(false, Ordering::SeqCst);
        for text in self.state.held.lock().unwrap().drain(..) {
            let _ = self.state.pushes.send(Push::Text(text));
        }
    }

    pub fn queue(&self) -> Vec<String> {
        self.state.queue.lock().unwrap().clone()
    }

    /// `(source, body)` for every command received
    pub fn posted(&self) -> Vec<(String, Value)> {
        self.state.posted.lock().unwrap().clone()
    }

    /// Streams the node is still serving
    pub fn open_streams(&self) -> usize {
        self.state.open_streams.load(Ordering::SeqCst)
    }
}

async fn node_stream(
    ws: WebSocketUpgrade,
    Path(_source): Path<String>,
    State(state): State<Arc<NodeState>>,
) -> Response {
    let snapshot = json!({
        "SESSION_CONNECTED_RESPONSE": {
            "queue": state.queue_json(),
            "health": "good",
        }
    });
    ws.on_upgrade(move |socket| serve_stream(socket, state, snapshot, false))
}

async fn session_stream(ws: WebSocketUpgrade, State(state): State<Arc<NodeState>>) -> Response {
    let snapshot = json!({
        "SESSION_CONNECTED_RESPONSE": {
            "queue": state.queue_json(),
            "sources": [SESSION_SOURCE],
        }
    });
    ws.on_upgrade(move |socket| serve_stream(socket, state, snapshot, true))
}

async fn serve_stream(mut socket: WebSocket, state: Arc<NodeState>, snapshot: Value, session: bool) {
    state.open_streams.fetch_add(1, Ordering::SeqCst);
    let mut pushes = state.pushes.subscribe();

    if socket.send(Message::Text(snapshot.to_string())).await.is_ok() {
        let mut ping = state.ping_every.map(tokio::time::interval);

        loop {
            tokio::select! {
                push = pushes.recv() => match push {
                    Ok(Push::Text(text)) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Push::Close) | Err(_) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = async {
                    match ping.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if socket.send(Message::Ping(b"heart-beat".to_vec())).await.is_err() {
                        break;
                    }
                }
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Text(text))) if session => session_command(&state, &text),
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.open_streams.fetch_sub(1, Ordering::SeqCst);
}

fn session_command(state: &NodeState, text: &str) {
    let Ok(body) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let source = body
        .as_object()
        .and_then(|fields| fields.values().next())
        .and_then(|params| params["sourceName"].as_str())
        .unwrap_or_default()
        .to_string();
    state.posted.lock().unwrap().push((source, body.clone()));

    let Some((tag, answer)) = state.session_answer(&body) else {
        return;
    };
    if tag == "REMOVE_QUEUE_ITEM_RESPONSE" && state.hold_removes.load(Ordering::SeqCst) {
        state.held.lock().unwrap().push(answer);
        return;
    }
    let _ = state.pushes.send(Push::Text(answer));
}

async fn command(
    Path(source): Path<String>,
    State(state): State<Arc<NodeState>>,
    body: String,
) -> (StatusCode, String) {
    let body: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };
    state.posted.lock().unwrap().push((source, body.clone()));

    if let Some(status) = *state.reject.lock().unwrap() {
        return (status, json!({ "error": "node rejected command" }).to_string());
    }

    if state.apply_command(&body).is_some() {
        state.push_queue();
    }
    (StatusCode::OK, String::new())
}
