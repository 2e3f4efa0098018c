//! One physical hub socket.
//!
//! A [`Channel`] is opened cold, started once, and closed once. The
//! background task owns the socket: it drains the outbound queue, routes
//! `result` frames to the waiting request by id, answers `auth_required`,
//! and reports everything else upward as [`ChannelEvent`]s. A fresh channel
//! (with a fresh generation) is created for every reconnect attempt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::frame::{
    Envelope, HUB_RUNNING, HubEvent, Inbound, MessageIds, Reply, Request, error_text, field_str,
};
use crate::transport::ChannelConfig;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

// ── ChannelEvent ─────────────────────────────────────────────────────

/// Notifications a channel sends to its owner.
///
/// Every variant carries the generation of the socket that produced it so
/// the owner can drop notifications from a socket it already replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The transport is up; the handshake is about to start.
    SocketOpened { generation: u64 },
    /// The hub accepted the token and reports `RUNNING`.
    Connected { generation: u64 },
    /// The hub refused the token. The socket usually closes right after.
    AuthRejected { generation: u64, message: String },
    /// An entity changed on the hub.
    Event { generation: u64, event: HubEvent },
    /// The socket went away without [`Channel::close`] being called.
    /// Sent at most once per channel.
    Closed { generation: u64, reason: String },
}

impl ChannelEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::SocketOpened { generation }
            | Self::Connected { generation }
            | Self::AuthRejected { generation, .. }
            | Self::Event { generation, .. }
            | Self::Closed { generation, .. } => *generation,
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────────

/// Handle to one hub socket. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

#[derive(Debug)]
struct ChannelInner {
    config: ChannelConfig,
    generation: u64,
    ids: MessageIds,
    /// Transport is up; handshake traffic may flow.
    socket_open: AtomicBool,
    /// Handshake finished and the hub is running; ordinary traffic may flow.
    connected: AtomicBool,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    auth_waiter: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    /// Held for the whole of a `send_and_receive` call.
    request_lock: tokio::sync::Mutex<()>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    /// Build a channel in the disconnected state. Does not touch the network.
    ///
    /// `cancel` should be a child of the owner's token; cancelling it is the
    /// same as calling [`close`](Self::close).
    pub fn open(
        config: ChannelConfig,
        events: mpsc::UnboundedSender<ChannelEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChannelInner {
                config,
                generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
                ids: MessageIds::new(),
                socket_open: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                pending: Mutex::new(HashMap::new()),
                auth_waiter: Mutex::new(None),
                request_lock: tokio::sync::Mutex::new(()),
                events,
                cancel,
            }),
        }
    }

    /// Spawn the socket task. Only the first call has any effect.
    pub fn start(&self) {
        let Some(outbound) = lock(&self.inner.outbound_rx).take() else {
            debug!(generation = self.generation(), "channel already started");
            return;
        };
        let channel = self.clone();
        tokio::spawn(async move { channel.run(outbound).await });
    }

    /// Stop the socket task. No `Closed` event is sent for a deliberate close.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        self.teardown();
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn url(&self) -> &Url {
        &self.inner.config.url
    }

    pub fn is_socket_open(&self) -> bool {
        self.inner.socket_open.load(Ordering::SeqCst)
    }

    /// Handshake complete and the socket still up.
    pub fn is_connected(&self) -> bool {
        self.is_socket_open() && self.inner.connected.load(Ordering::SeqCst)
    }

    /// Wrap a request in an envelope, assigning the next message id.
    pub fn create_message(&self, request: Request) -> Envelope {
        let id = request.carries_id().then(|| self.inner.ids.next_id());
        Envelope { id, request }
    }

    /// Fire-and-forget send.
    ///
    /// With `check_connected`, the frame is dropped unless the handshake has
    /// finished. Returns whether the frame was queued.
    pub fn send(&self, request: Request, check_connected: bool) -> bool {
        if check_connected && !self.is_connected() {
            debug!(
                generation = self.generation(),
                kind = request.kind(),
                "dropping request, channel not connected"
            );
            return false;
        }
        let envelope = self.create_message(request);
        self.transmit(&envelope)
    }

    /// Send a request and wait for the `result` frame carrying its id.
    ///
    /// Returns [`Reply::empty`] without transmitting when the socket is not
    /// open, and also when the socket goes away before the reply arrives.
    /// Only one request is in flight per channel at a time.
    pub async fn send_and_receive(&self, request: Request) -> Reply {
        if !self.is_socket_open() {
            return Reply::empty();
        }

        let _guard = self.inner.request_lock.lock().await;
        let kind = request.kind();
        let envelope = self.create_message(request);
        let Some(id) = envelope.id else {
            debug!(kind, "request kind has no reply to wait for");
            return Reply::empty();
        };

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(id, tx);

        // Teardown clears the flag before draining `pending`, so re-checking
        // here means the sender cannot be stranded.
        if !self.is_socket_open() || !self.transmit(&envelope) {
            lock(&self.inner.pending).remove(&id);
            return Reply::empty();
        }

        let reply = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Reply::empty(),
            reply = rx => reply.unwrap_or_default(),
        };
        lock(&self.inner.pending).remove(&id);

        if !reply.success && reply.id == id {
            warn!(
                generation = self.generation(),
                id,
                kind,
                error = %reply.error,
                "request rejected by hub"
            );
        }
        reply
    }

    /// Answer `auth_required`, then poll `get_config` until the hub runs.
    ///
    /// A rejected token ends the attempt; nothing here retries it.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let generation = self.generation();
        let (tx, rx) = oneshot::channel();
        *lock(&self.inner.auth_waiter) = Some(tx);

        let access_token = self.inner.config.token.expose_secret().to_owned();
        if !self.send(Request::Auth { access_token }, false) {
            return Err(Error::NotConnected);
        }

        match rx.await {
            Ok(Ok(())) => debug!(generation, "access token accepted"),
            Ok(Err(message)) => return Err(Error::AuthRejected { message }),
            Err(_) => return Err(Error::NotConnected),
        }

        self.wait_until_running().await?;

        self.inner.connected.store(true, Ordering::SeqCst);
        info!(generation, url = %self.url(), "channel connected");
        self.emit(ChannelEvent::Connected { generation });
        Ok(())
    }

    async fn wait_until_running(&self) -> Result<(), Error> {
        let retry = self.inner.config.retry_interval;
        loop {
            if !self.is_socket_open() {
                return Err(Error::NotConnected);
            }

            let reply = self.send_and_receive(Request::GetConfig).await;
            let state = reply
                .result
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if reply.success && state.eq_ignore_ascii_case(HUB_RUNNING) {
                return Ok(());
            }

            info!(
                generation = self.generation(),
                state,
                delay_ms = u64::try_from(retry.as_millis()).unwrap_or(u64::MAX),
                "hub not running yet"
            );
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => return Err(Error::NotConnected),
                () = tokio::time::sleep(retry) => {}
            }
        }
    }

    // ── Socket task ──────────────────────────────────────────────────

    async fn run(self, outbound: mpsc::UnboundedReceiver<String>) {
        let generation = self.generation();
        let outcome = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => None,
            result = self.connect_and_read(outbound) => Some(result),
        };

        let deliberate = self.inner.cancel.is_cancelled();
        self.teardown();
        // Stops a handshake that may still be polling.
        self.inner.cancel.cancel();

        match outcome {
            Some(result) if !deliberate => {
                let reason = match result {
                    Ok(()) => "socket closed by hub".to_owned(),
                    Err(e) => e.to_string(),
                };
                info!(generation, reason, "channel closed");
                self.emit(ChannelEvent::Closed { generation, reason });
            }
            _ => debug!(generation, "channel shut down"),
        }
    }

    async fn connect_and_read(
        &self,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> Result<(), Error> {
        let generation = self.generation();
        let url = self.url().as_str();
        info!(generation, url, "connecting to hub");

        let connector = self.inner.config.connector()?;
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(url, None, false, connector)
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        self.inner.socket_open.store(true, Ordering::SeqCst);
        debug!(generation, "socket open");
        self.emit(ChannelEvent::SocketOpened { generation });

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                Some(text) = outbound.recv() => {
                    trace!(generation, frame = %text, "frame sent");
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_message(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (u16::from(cf.code), cf.reason.as_str().to_owned()))
                            .unwrap_or_default();
                        return Err(Error::WebSocketClosed { code, reason });
                    }
                    Some(Ok(Message::Ping(_))) => trace!(generation, "ping"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Route one inbound text frame.
    fn on_message(&self, text: &str) {
        let generation = self.generation();
        trace!(generation, frame = text, "frame received");

        let frame: Inbound = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    generation,
                    error = %e,
                    kind = %field_str(text, "type"),
                    "ignoring unreadable frame"
                );
                return;
            }
        };

        match frame {
            Inbound::AuthRequired => {
                let channel = self.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        () = channel.inner.cancel.cancelled() => {}
                        result = channel.authenticate() => {
                            if let Err(e) = result {
                                debug!(generation, error = %e, "handshake did not complete");
                            }
                        }
                    }
                });
            }
            Inbound::AuthOk => self.resolve_auth(Ok(())),
            Inbound::AuthNok { message } => {
                let message = message.unwrap_or_default();
                warn!(generation, reason = %message, "hub rejected access token");
                self.emit(ChannelEvent::AuthRejected {
                    generation,
                    message: message.clone(),
                });
                self.resolve_auth(Err(message));
            }
            Inbound::Result {
                id,
                success,
                result,
                error,
            } => {
                let reply = Reply {
                    id,
                    success,
                    result,
                    error: error_text(&error),
                };
                match lock(&self.inner.pending).remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!(generation, id, "result for no pending request"),
                }
            }
            Inbound::Event { id, event } => match HubEvent::from_payload(id, &event) {
                Some(event) => self.emit(ChannelEvent::Event { generation, event }),
                None => debug!(generation, "event without an entity change"),
            },
            Inbound::Unknown => {
                debug!(generation, kind = %field_str(text, "type"), "ignoring frame");
            }
        }
    }

    fn resolve_auth(&self, outcome: Result<(), String>) {
        match lock(&self.inner.auth_waiter).take() {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!(generation = self.generation(), "unexpected handshake reply"),
        }
    }

    fn transmit(&self, envelope: &Envelope) -> bool {
        match envelope.to_text() {
            Ok(text) => self.inner.outbound_tx.send(text).is_ok(),
            Err(e) => {
                warn!(error = %e, kind = envelope.request.kind(), "could not encode request");
                false
            }
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if self.inner.events.send(event).is_err() {
            trace!(generation = self.generation(), "event receiver gone");
        }
    }

    /// Mark the socket down and release every waiter.
    fn teardown(&self) {
        self.inner.socket_open.store(false, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);
        lock(&self.inner.pending).clear();
        lock(&self.inner.auth_waiter).take();
    }
}
