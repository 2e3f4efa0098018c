// In-process hub speaking just enough of the WebSocket API for the manager:
// the auth handshake, config polling, bulk queries, subscriptions and
// service calls. Every inbound frame is recorded with the index of the
// connection it arrived on.

#![allow(dead_code, clippy::unwrap_used)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hassdeck_core::ConnectionConfig;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub const TOKEN: &str = "secret-token";
pub const RETRY: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(5);

type Frames = Arc<Mutex<Vec<(usize, Value)>>>;

#[derive(Debug, Clone)]
pub struct HubScript {
    pub token: String,
    pub states: Value,
    pub services: Value,
    /// `get_config` replies reporting a non-running hub before `RUNNING`.
    pub not_running_polls: usize,
    /// Leave the socket open after answering a wrong token with `auth_invalid`.
    pub keep_open_after_reject: bool,
}

impl Default for HubScript {
    fn default() -> Self {
        Self {
            token: TOKEN.into(),
            states: json!([
                { "entity_id": "light.kitchen", "state": "on", "attributes": { "friendly_name": "Kitchen", "brightness": 200 } },
                { "entity_id": "sensor.outside", "state": "12.5", "attributes": { "unit_of_measurement": "°C" } },
                { "entity_id": "light.hall", "state": "off", "attributes": {} },
                { "entity_id": "switch.fan", "state": "on", "attributes": {} },
            ]),
            services: json!({
                "light": {
                    "turn_on": { "fields": { "brightness": { "selector": { "number": {} } } } },
                    "turn_off": { "fields": {} },
                },
                "switch": { "toggle": { "fields": {} } },
            }),
            not_running_polls: 0,
            keep_open_after_reject: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Control {
    Push(Value),
    Drop,
}

pub struct MockHub {
    pub port: u16,
    frames: Frames,
    connections: Arc<AtomicUsize>,
    control: broadcast::Sender<Control>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHub {
    pub async fn start(script: HubScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (control, _) = broadcast::channel(64);
        let hub = Self {
            port,
            frames: Arc::default(),
            connections: Arc::default(),
            control,
        };

        let script = Arc::new(script);
        let frames = Arc::clone(&hub.frames);
        let connections = Arc::clone(&hub.connections);
        let control = hub.control.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    index,
                    stream,
                    Arc::clone(&script),
                    Arc::clone(&frames),
                    control.subscribe(),
                ));
            }
        });
        hub
    }

    /// Manager settings pointing at this hub, plain `ws://`.
    pub fn config(&self) -> ConnectionConfig {
        self.config_with_token(TOKEN)
    }

    pub fn config_with_token(&self, token: &str) -> ConnectionConfig {
        ConnectionConfig {
            use_tls: false,
            reconnect_interval: RETRY,
            ..ConnectionConfig::new("127.0.0.1", self.port, token)
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<(usize, Value)> {
        lock(&self.frames).clone()
    }

    /// Frames of one `type`, with their connection index.
    pub fn frames_of(&self, kind: &str) -> Vec<(usize, Value)> {
        self.frames()
            .into_iter()
            .filter(|(_, frame)| frame["type"] == kind)
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.frames_of(kind).len()
    }

    /// Send a raw frame on every open connection.
    pub fn push(&self, frame: Value) {
        let _ = self.control.send(Control::Push(frame));
    }

    /// Push a trigger event as the hub does for a state subscription.
    /// `None` reports the entity as removed.
    pub fn push_state(&self, entity_id: &str, state: Option<(&str, Value)>) {
        let subscription = self
            .frames_of("subscribe_trigger")
            .iter()
            .rev()
            .find(|(_, frame)| frame["trigger"]["entity_id"] == entity_id)
            .map_or(Value::Null, |(_, frame)| frame["id"].clone());
        let to_state = state.map_or(Value::Null, |(state, attributes)| {
            json!({ "entity_id": entity_id, "state": state, "attributes": attributes })
        });
        self.push(json!({
            "id": subscription,
            "type": "event",
            "event": {
                "variables": {
                    "trigger": {
                        "platform": "state",
                        "entity_id": entity_id,
                        "from_state": null,
                        "to_state": to_state,
                    }
                }
            }
        }));
    }

    /// Drop every open connection without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) -> bool {
    ws.send(Message::Text(frame.to_string().into())).await.is_ok()
}

async fn serve(
    index: usize,
    stream: TcpStream,
    script: Arc<HubScript>,
    frames: Frames,
    mut control: broadcast::Receiver<Control>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    if !send(&mut ws, json!({ "type": "auth_required", "ha_version": "2024.6.0" })).await {
        return;
    }

    let mut polls = 0;
    loop {
        tokio::select! {
            command = control.recv() => match command {
                Ok(Control::Push(frame)) => {
                    if !send(&mut ws, frame).await {
                        return;
                    }
                }
                Ok(Control::Drop) | Err(RecvError::Closed) => return,
                Err(RecvError::Lagged(_)) => {}
            },
            message = ws.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                };
                lock(&frames).push((index, frame.clone()));

                let rejected = frame["type"] == "auth" && frame["access_token"] != script.token.as_str();
                if !send(&mut ws, respond(&script, &frame, &mut polls)).await {
                    return;
                }
                if rejected && !script.keep_open_after_reject {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    }
}

fn respond(script: &HubScript, frame: &Value, polls: &mut usize) -> Value {
    let id = frame["id"].clone();
    let ok = |result: Value| json!({ "id": id.clone(), "type": "result", "success": true, "result": result });

    match frame["type"].as_str().unwrap_or_default() {
        "auth" if frame["access_token"] == script.token.as_str() => {
            json!({ "type": "auth_ok", "ha_version": "2024.6.0" })
        }
        "auth" => json!({ "type": "auth_invalid", "message": "Invalid access token or password" }),
        "get_config" => {
            *polls += 1;
            let state = if *polls > script.not_running_polls {
                "RUNNING"
            } else {
                "NOT_RUNNING"
            };
            ok(json!({ "state": state, "version": "2024.6.0" }))
        }
        "get_states" => ok(script.states.clone()),
        "get_services" => ok(script.services.clone()),
        "subscribe_trigger" | "unsubscribe_events" => ok(Value::Null),
        "call_service" => ok(json!({ "context": { "id": "01HX" } })),
        _ => json!({
            "id": id.clone(),
            "type": "result",
            "success": false,
            "error": { "code": "unknown_command", "message": "Unknown command." }
        }),
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await a future with the standard timeout.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future).await.unwrap()
}
