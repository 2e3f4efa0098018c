// ── ConnectionManager ──
//
// Owns the channel lifecycle and wires channel events into the store and
// the subscription registry. One long-lived event pump per manager handles
// every `ChannelEvent` in order: state transitions, the post-connect bulk
// refresh and resubscribe, event dispatch, and the constant-backoff
// reconnect after a lost socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use hassdeck_api::{Channel, ChannelEvent, HubEvent, Request};
use serde_json::Value;
use strum::{Display, IntoStaticStr};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::callback::{CallbackSet, EntityCallback, ReadyCallback, StatusCallback};
use crate::config::ConnectionConfig;
use crate::convert::{actions_from_services, entities_from_states};
use crate::error::CoreError;
use crate::model::{ActionFields, EntityRecord, EntitySnapshot};
use crate::registry::{Removal, SubscriptionRegistry};
use crate::store::SyncStore;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

impl ConnectionState {
    /// User-facing status line.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Disconnected => "Not connected",
            Self::Connecting => "Connecting…",
            Self::Authenticating => "Authenticating…",
            Self::Connected => "Connected",
        }
    }
}

// ── ConnectionManager ────────────────────────────────────────────

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Query and command methods
/// never fail: when the hub is unreachable they return empty or placeholder
/// data and log why. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ArcSwap<ConnectionConfig>,
    store: Arc<SyncStore>,
    registry: SubscriptionRegistry,
    ready: CallbackSet<()>,
    status: ArcSwapOption<StatusCallback>,
    state: watch::Sender<ConnectionState>,
    last_error: watch::Sender<Option<CoreError>>,
    /// The live socket, if any. Events from any other generation are stale.
    channel: ArcSwapOption<Channel>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    cancel: CancellationToken,
    /// Child of `cancel` for the current connection attempt, including a
    /// pending reconnect sleep. Replaced on every `connect()`.
    connection_cancel: Mutex<CancellationToken>,
    /// Serializes bulk loads so a lazy getter and the post-connect refresh
    /// never both issue `get_states`.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    /// Create a manager. Does NOT connect; call [`connect()`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_error, _) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let connection_cancel = cancel.child_token();

        Self {
            inner: Arc::new(ManagerInner {
                config: ArcSwap::from_pointee(config),
                store: Arc::new(SyncStore::new()),
                registry: SubscriptionRegistry::new(),
                ready: CallbackSet::default(),
                status: ArcSwapOption::empty(),
                state,
                last_error,
                channel: ArcSwapOption::empty(),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                cancel,
                connection_cancel: Mutex::new(connection_cancel),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> Arc<ConnectionConfig> {
        self.inner.config.load_full()
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start connecting with the current configuration.
    ///
    /// Returns immediately. Any existing socket is closed first. With host,
    /// port or token missing, no socket is opened and the state stays
    /// [`Disconnected`](ConnectionState::Disconnected).
    pub fn connect(&self) {
        self.ensure_pump();
        let token = self.fresh_connection_token();
        self.close_channel();

        let config = self.inner.config.load_full();
        if !config.is_complete() {
            let missing = config.missing_fields().join(", ");
            warn!(missing, "hub settings incomplete, not connecting");
            self.set_error(Some(CoreError::Config {
                message: format!("missing {missing}"),
            }));
            self.set_state(ConnectionState::Disconnected);
            self.notify_status(ConnectionState::Disconnected);
            return;
        }

        let channel_config = match config.channel_config() {
            Ok(channel_config) => channel_config,
            Err(e) => {
                warn!(error = %e, "cannot build hub address, not connecting");
                self.set_error(Some(e));
                self.set_state(ConnectionState::Disconnected);
                self.notify_status(ConnectionState::Disconnected);
                return;
            }
        };

        self.set_error(None);
        let channel = Channel::open(
            channel_config,
            self.inner.events_tx.clone(),
            token.child_token(),
        );
        info!(generation = channel.generation(), url = %channel.url(), "connecting to hub");
        // Stored before starting so its first event is not taken as stale.
        self.inner.channel.store(Some(Arc::new(channel.clone())));
        self.set_state(ConnectionState::Connecting);
        channel.start();
    }

    /// Close the socket and cancel any pending reconnect.
    pub fn disconnect(&self) {
        lock(&self.inner.connection_cancel).cancel();
        self.close_channel();
        self.inner.registry.invalidate();
        self.set_state(ConnectionState::Disconnected);
        info!("disconnected from hub");
    }

    pub fn reconnect(&self) {
        self.disconnect();
        self.connect();
    }

    /// Swap in new settings and reconnect with them.
    pub fn update_config(&self, config: ConnectionConfig) {
        let hub_changed = {
            let current = self.inner.config.load();
            current.host != config.host || current.port != config.port
        };
        self.inner.config.store(Arc::new(config));
        if hub_changed {
            self.inner.store.clear();
        }
        self.reconnect();
    }

    /// Stop for good: closes the socket and ends the event pump.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.close_channel();
        self.inner.registry.invalidate();
        self.set_state(ConnectionState::Disconnected);
        debug!("connection manager shut down");
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Connected, and the socket behind it is still up.
    pub fn is_connected(&self) -> bool {
        self.connected_channel().is_some()
    }

    /// Why the last attempt did not reach the connected state, if known.
    pub fn last_error(&self) -> Option<CoreError> {
        self.inner.last_error.borrow().clone()
    }

    pub fn set_connection_status_callback(&self, callback: StatusCallback) {
        self.inner.status.store(Some(Arc::new(callback)));
    }

    pub fn clear_connection_status_callback(&self) {
        self.inner.status.store(None);
    }

    /// Returns `false` if the handle was already registered.
    pub fn add_ready_callback(&self, callback: ReadyCallback) -> bool {
        self.inner.ready.insert(callback)
    }

    pub fn remove_ready_callback(&self, callback: &ReadyCallback) -> bool {
        self.inner.ready.remove(callback)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Domains with at least one entity, in first-discovery order.
    pub async fn get_domains(&self) -> Vec<String> {
        self.ensure_entities().await;
        self.inner.store.domains()
    }

    pub async fn get_entities(&self, domain: &str) -> Vec<EntityRecord> {
        self.ensure_entities().await;
        self.inner.store.entities(domain)
    }

    pub async fn get_actions(&self, domain: &str) -> ActionFields {
        self.ensure_actions().await;
        self.inner.store.actions(domain)
    }

    pub async fn get_domains_for_actions(&self) -> Vec<String> {
        self.ensure_actions().await;
        self.inner.store.action_domains()
    }

    /// Cached entity merged with the live connectivity flag.
    ///
    /// Malformed ids get an `N/A` placeholder and unknown ids an `unknown`
    /// one; neither is written to the cache.
    pub fn get_entity(&self, entity_id: &str) -> EntitySnapshot {
        let connected = self.is_connected();
        let well_formed = entity_id
            .split_once('.')
            .is_some_and(|(domain, object)| !domain.is_empty() && !object.is_empty());
        if !well_formed {
            return EntityRecord::placeholder(entity_id).snapshot(connected);
        }
        self.inner
            .store
            .entity(entity_id)
            .unwrap_or_else(|| EntityRecord::unknown(entity_id))
            .snapshot(connected)
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Watch an entity. The first callback for an id subscribes on the hub
    /// (right away when connected, otherwise after the next connect).
    pub async fn add_tracked_entity(&self, entity_id: &str, callback: EntityCallback) {
        if !self.inner.registry.add(entity_id, callback) {
            return;
        }
        if let Some(channel) = self.connected_channel() {
            self.subscribe(&channel, entity_id).await;
        }
    }

    /// Stop watching. The last callback for an id unsubscribes on the hub.
    pub async fn remove_tracked_entity(&self, entity_id: &str, callback: &EntityCallback) {
        match self.inner.registry.remove(entity_id, callback) {
            Removal::Last {
                subscription: Some(subscription),
            } => {
                if let Some(channel) = self.connected_channel() {
                    let reply = channel
                        .send_and_receive(Request::UnsubscribeEvents { subscription })
                        .await;
                    debug!(entity_id, subscription, ok = reply.success, "unsubscribed");
                }
            }
            removal => trace!(entity_id, ?removal, "tracked callback removed"),
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Fire-and-forget `domain.action` against one entity.
    ///
    /// Dropped (and logged) unless connected. Returns whether a frame was
    /// sent; the hub's verdict is not awaited.
    pub fn perform_action(&self, domain: &str, action: &str, entity_id: &str, data: Value) -> bool {
        let Some(channel) = self.connected_channel() else {
            warn!(domain, action, entity_id, "not connected, action dropped");
            return false;
        };
        let sent = channel.send(Request::call_service(domain, action, entity_id, data), true);
        debug!(domain, action, entity_id, sent, "action sent");
        sent
    }

    /// Like [`perform_action`](Self::perform_action) but waits for the hub's
    /// reply and surfaces a rejection.
    pub async fn call_action(
        &self,
        domain: &str,
        action: &str,
        entity_id: &str,
        data: Value,
    ) -> Result<Value, CoreError> {
        let channel = self.connected_channel().ok_or(CoreError::Disconnected)?;
        let reply = channel
            .send_and_receive(Request::call_service(domain, action, entity_id, data))
            .await;
        if reply.success {
            Ok(reply.result)
        } else if reply.id == 0 {
            Err(CoreError::Disconnected)
        } else {
            Err(CoreError::Request {
                message: reply.error,
            })
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn ensure_pump(&self) {
        let Some(rx) = lock(&self.inner.events_rx).take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(event_pump(weak, rx, cancel));
    }

    /// Cancel the previous attempt (and any reconnect sleep) and hand out a
    /// token for the next one.
    fn fresh_connection_token(&self) -> CancellationToken {
        let mut current = lock(&self.inner.connection_cancel);
        current.cancel();
        *current = self.inner.cancel.child_token();
        current.clone()
    }

    fn close_channel(&self) {
        if let Some(channel) = self.inner.channel.swap(None) {
            debug!(generation = channel.generation(), "closing channel");
            channel.close();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner
            .channel
            .load()
            .as_ref()
            .is_some_and(|c| c.generation() == generation)
    }

    fn current_channel(&self, generation: u64) -> Option<Arc<Channel>> {
        self.inner
            .channel
            .load_full()
            .filter(|c| c.generation() == generation)
    }

    /// Drop the stored channel if it is still `generation`.
    fn forget_channel(&self, generation: u64) {
        self.inner
            .channel
            .rcu(|current| current.clone().filter(|c| c.generation() != generation));
    }

    fn connected_channel(&self) -> Option<Arc<Channel>> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.inner
            .channel
            .load_full()
            .filter(|channel| channel.is_connected())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
            self.notify_status(state);
        }
    }

    /// Move to `state` only while `generation` is the live socket.
    ///
    /// The check runs under the state lock and `connect()` stores its channel
    /// before publishing, so a socket that was just replaced can never
    /// overwrite the state of its successor. Returns whether `generation`
    /// was still live.
    fn set_state_for(&self, generation: u64, state: ConnectionState) -> bool {
        let mut live = false;
        let mut previous = state;
        self.inner.state.send_if_modified(|current| {
            live = self.is_current(generation);
            if !live || *current == state {
                return false;
            }
            previous = std::mem::replace(current, state);
            true
        });
        if previous != state {
            debug!(generation, from = %previous, to = %state, "connection state changed");
            self.notify_status(state);
        }
        live
    }

    fn notify_status(&self, state: ConnectionState) {
        if let Some(callback) = self.inner.status.load_full() {
            callback.call(state.status_text());
        }
    }

    fn set_error(&self, error: Option<CoreError>) {
        self.inner.last_error.send_replace(error);
    }

    async fn ensure_entities(&self) {
        if self.inner.store.has_entities() {
            return;
        }
        let Some(channel) = self.connected_channel() else {
            return;
        };
        let _guard = self.inner.refresh_lock.lock().await;
        if !self.inner.store.has_entities() {
            self.load_entities(&channel).await;
        }
    }

    async fn ensure_actions(&self) {
        if self.inner.store.has_actions() {
            return;
        }
        let Some(channel) = self.connected_channel() else {
            return;
        };
        let _guard = self.inner.refresh_lock.lock().await;
        if !self.inner.store.has_actions() {
            self.load_actions(&channel).await;
        }
    }

    async fn load_entities(&self, channel: &Channel) {
        let reply = channel.send_and_receive(Request::GetStates).await;
        if reply.success {
            let records = entities_from_states(&reply.result);
            info!(count = records.len(), "entities loaded");
            self.inner.store.apply_states(records);
        } else {
            debug!(error = %reply.error, "entity load failed");
        }
    }

    async fn load_actions(&self, channel: &Channel) {
        let reply = channel.send_and_receive(Request::GetServices).await;
        if reply.success {
            let schema = actions_from_services(&reply.result);
            info!(domains = schema.len(), "action schemas loaded");
            self.inner.store.apply_services(schema);
        } else {
            debug!(error = %reply.error, "action load failed");
        }
    }

    async fn subscribe(&self, channel: &Channel, entity_id: &str) {
        let reply = channel
            .send_and_receive(Request::subscribe_state(entity_id))
            .await;
        if !reply.success {
            debug!(entity_id, error = %reply.error, "subscribe failed");
            return;
        }

        let subscription = reply.id;
        if !self.inner.registry.set_subscription(entity_id, subscription) {
            debug!(entity_id, subscription, "subscription no longer needed");
            channel.send(Request::UnsubscribeEvents { subscription }, true);
            return;
        }
        // The socket may have been replaced while the reply was in flight;
        // a stale id would stop the next replay from resubscribing.
        if !self.is_current(channel.generation()) {
            self.inner.registry.clear_subscription(entity_id, subscription);
            return;
        }
        debug!(entity_id, subscription, "subscribed");
    }

    // ── Event handling ───────────────────────────────────────────

    async fn handle_event(&self, event: ChannelEvent) {
        let generation = event.generation();
        let Some(channel) = self.current_channel(generation) else {
            debug!(generation, "ignoring event from stale socket");
            return;
        };

        match event {
            ChannelEvent::SocketOpened { .. } => {
                self.set_state_for(generation, ConnectionState::Authenticating);
            }
            ChannelEvent::AuthRejected { message, .. } => {
                self.on_auth_rejected(&channel, &message).await;
            }
            ChannelEvent::Connected { .. } => self.on_connected(&channel).await,
            ChannelEvent::Event { event, .. } => self.dispatch(event),
            ChannelEvent::Closed { reason, .. } => self.on_closed(&channel, &reason).await,
        }
    }

    /// A refused token ends the attempt. Our end of the socket is closed, so
    /// a hub that keeps it open cannot leave the state at `Authenticating`,
    /// and the lost-socket path takes over with the auth error kept.
    async fn on_auth_rejected(&self, channel: &Channel, message: &str) {
        warn!(generation = channel.generation(), reason = %message, "access token rejected");
        self.set_error(Some(CoreError::AuthenticationFailed {
            message: message.to_owned(),
        }));
        channel.close();
        self.on_closed(channel, "access token rejected").await;
    }

    async fn on_connected(&self, channel: &Channel) {
        let generation = channel.generation();
        {
            // Taken before publishing `Connected` so lazy getters wait for
            // this refresh instead of starting their own.
            let _guard = self.inner.refresh_lock.lock().await;
            if !self.set_state_for(generation, ConnectionState::Connected) {
                debug!(generation, "socket replaced before it finished connecting");
                return;
            }
            self.set_error(None);
            info!(generation, "hub connected");
            self.load_entities(channel).await;
            self.load_actions(channel).await;
        }

        let targets = self.inner.registry.replay_targets();
        if !targets.is_empty() {
            debug!(count = targets.len(), "resubscribing tracked entities");
        }
        for entity_id in targets {
            self.subscribe(channel, &entity_id).await;
        }

        if self.is_current(generation) && channel.is_connected() {
            self.inner.ready.call_all(&());
        }
    }

    async fn on_closed(&self, channel: &Channel, reason: &str) {
        let generation = channel.generation();
        // An auth rejection recorded for this attempt says more than the close.
        let url = channel.url().to_string();
        self.inner.last_error.send_if_modified(|error| {
            if error.is_some() {
                return false;
            }
            *error = Some(CoreError::ConnectionFailed {
                url,
                reason: reason.to_owned(),
            });
            true
        });
        if !self.set_state_for(generation, ConnectionState::Disconnected) {
            debug!(generation, "closed socket was already replaced");
            return;
        }
        self.forget_channel(generation);
        self.inner.registry.invalidate();

        let interval = self.config().reconnect_interval;
        let token = lock(&self.inner.connection_cancel).clone();
        info!(
            generation,
            reason,
            delay_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "hub connection lost, reconnecting"
        );

        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(generation, "reconnect cancelled");
                return;
            }
            () = tokio::time::sleep(interval) => {}
        }
        self.connect();
    }

    fn dispatch(&self, event: HubEvent) {
        let HubEvent {
            entity_id,
            new_state,
            ..
        } = event;
        let updated = self
            .inner
            .store
            .apply_state_change(&entity_id, new_state.map(EntityRecord::from));

        let callbacks = self.inner.registry.callbacks(&entity_id);
        if callbacks.is_empty() {
            return;
        }
        let connected = self.is_connected();
        let snapshot = updated
            .unwrap_or_else(|| EntityRecord::unknown(&entity_id))
            .snapshot(connected);
        trace!(entity_id, callbacks = callbacks.len(), "dispatching entity update");
        for callback in callbacks {
            callback.call(&snapshot);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.inner.config.load().host)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Event pump ───────────────────────────────────────────────────

/// Handles channel events in arrival order until the manager is dropped
/// or shut down. Callbacks run on this task and must not block.
async fn event_pump(
    inner: Weak<ManagerInner>,
    mut rx: mpsc::UnboundedReceiver<ChannelEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = ConnectionManager { inner };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = manager.handle_event(event) => {}
        }
    }
    debug!("event pump exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::callback::Callback;
    use hassdeck_api::StateSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn idle_manager() -> ConnectionManager {
        let mut config = ConnectionConfig::new("127.0.0.1", 1, "abc");
        config.use_tls = false;
        config.reconnect_interval = Duration::from_secs(60);
        ConnectionManager::new(config)
    }

    /// A channel wired to the manager's event queue but never started.
    fn unstarted_channel(manager: &ConnectionManager) -> Arc<Channel> {
        let config = manager.config().channel_config().unwrap();
        Arc::new(Channel::open(
            config,
            manager.inner.events_tx.clone(),
            CancellationToken::new(),
        ))
    }

    fn record_statuses(manager: &ConnectionManager) -> Arc<Mutex<Vec<String>>> {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        manager.set_connection_status_callback(Callback::new(move |status: &str| {
            lock(&sink).push(status.to_owned());
        }));
        statuses
    }

    #[test]
    fn status_texts() {
        assert_eq!(ConnectionState::Disconnected.status_text(), "Not connected");
        assert_eq!(ConnectionState::Connecting.status_text(), "Connecting…");
        assert_eq!(ConnectionState::Authenticating.status_text(), "Authenticating…");
        assert_eq!(ConnectionState::Connected.status_text(), "Connected");
        assert_eq!(ConnectionState::Authenticating.to_string(), "authenticating");
    }

    #[tokio::test]
    async fn incomplete_config_stays_disconnected() {
        let manager = ConnectionManager::new(ConnectionConfig::new("", 8123, "abc"));
        let statuses = record_statuses(&manager);

        manager.connect();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.inner.channel.load().is_none());
        assert!(matches!(manager.last_error(), Some(CoreError::Config { .. })));
        assert_eq!(*lock(&statuses), vec!["Not connected".to_owned()]);
    }

    #[tokio::test]
    async fn queries_while_disconnected_are_empty() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        assert!(manager.get_domains().await.is_empty());
        assert!(manager.get_entities("light").await.is_empty());
        assert!(manager.get_actions("light").await.is_empty());
        assert!(manager.get_domains_for_actions().await.is_empty());
    }

    #[test]
    fn get_entity_placeholders() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        for id in ["", "kitchen", ".kitchen", "light."] {
            let snapshot = manager.get_entity(id);
            assert_eq!(snapshot.state, "N/A", "{id:?}");
            assert!(snapshot.attributes.is_empty());
            assert!(!snapshot.connected);
        }
        assert_eq!(manager.get_entity("light.kitchen").state, "unknown");
        assert!(manager.store().entity("light.kitchen").is_none());
    }

    #[test]
    fn perform_action_while_disconnected_is_dropped() {
        let manager = ConnectionManager::new(ConnectionConfig::new("localhost", 8123, "abc"));
        assert!(!manager.perform_action("light", "turn_on", "light.kitchen", Value::Null));
    }

    #[tokio::test]
    async fn tracking_while_disconnected_defers_subscribe() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let cb: EntityCallback = Callback::new(|_| {});
        manager.add_tracked_entity("light.kitchen", cb.clone()).await;
        assert_eq!(manager.registry().replay_targets(), vec!["light.kitchen"]);

        manager.remove_tracked_entity("light.kitchen", &cb).await;
        assert_eq!(manager.registry().subscription("light.kitchen"), None);
        assert_eq!(manager.registry().callback_count("light.kitchen"), 0);
    }

    #[test]
    fn ready_callbacks_deduplicate() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let cb: ReadyCallback = Callback::new(move |()| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(manager.add_ready_callback(cb.clone()));
        assert!(!manager.add_ready_callback(cb.clone()));
        manager.inner.ready.call_all(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.remove_ready_callback(&cb));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let manager = ConnectionManager::new(ConnectionConfig::new("localhost", 8123, "abc"));
        manager.disconnect();
        manager.shutdown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn events_from_replaced_socket_are_ignored() {
        let manager = idle_manager();
        let old = unstarted_channel(&manager);
        let live = unstarted_channel(&manager);
        manager.inner.channel.store(Some(Arc::clone(&live)));
        manager.set_state(ConnectionState::Connected);

        let closed = ChannelEvent::Closed {
            generation: old.generation(),
            reason: "reset by peer".into(),
        };
        // A close taken as live would sit in the reconnect sleep.
        tokio::time::timeout(Duration::from_secs(1), manager.handle_event(closed))
            .await
            .unwrap();
        let changed = ChannelEvent::Event {
            generation: old.generation(),
            event: HubEvent {
                subscription: None,
                entity_id: "light.kitchen".into(),
                new_state: Some(StateSnapshot {
                    state: "on".into(),
                    ..StateSnapshot::default()
                }),
            },
        };
        manager.handle_event(changed).await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        let current = manager.inner.channel.load_full().unwrap();
        assert_eq!(current.generation(), live.generation());
        assert!(!lock(&manager.inner.connection_cancel).is_cancelled());
        assert!(manager.last_error().is_none());
        assert!(manager.store().entity("light.kitchen").is_none());
    }

    #[tokio::test]
    async fn handshake_finishing_on_replaced_socket_is_ignored() {
        let manager = idle_manager();
        let old = unstarted_channel(&manager);
        let live = unstarted_channel(&manager);
        manager.inner.channel.store(Some(Arc::clone(&live)));
        manager.set_state(ConnectionState::Connecting);
        let statuses = record_statuses(&manager);

        manager.on_connected(&old).await;

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(lock(&statuses).is_empty());
    }

    #[tokio::test]
    async fn rejected_token_closes_socket_and_waits_to_retry() {
        let manager = idle_manager();
        let live = unstarted_channel(&manager);
        manager.inner.channel.store(Some(Arc::clone(&live)));
        manager.set_state(ConnectionState::Authenticating);
        let statuses = record_statuses(&manager);

        let handler = manager.clone();
        let rejected = ChannelEvent::AuthRejected {
            generation: live.generation(),
            message: "Invalid access token".into(),
        };
        let task = tokio::spawn(async move { handler.handle_event(rejected).await });
        tokio::time::timeout(Duration::from_secs(1), async {
            while manager.inner.channel.load().is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!live.is_socket_open());
        assert!(matches!(
            manager.last_error(),
            Some(CoreError::AuthenticationFailed { .. })
        ));
        assert_eq!(*lock(&statuses), vec!["Not connected".to_owned()]);

        // The hub closing its end afterwards is stale.
        manager
            .handle_event(ChannelEvent::Closed {
                generation: live.generation(),
                reason: "closed by hub".into(),
            })
            .await;
        assert!(matches!(
            manager.last_error(),
            Some(CoreError::AuthenticationFailed { .. })
        ));

        manager.disconnect();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn lost_socket_reports_endpoint_url() {
        let manager = idle_manager();
        let live = unstarted_channel(&manager);
        manager.inner.channel.store(Some(Arc::clone(&live)));
        manager.set_state(ConnectionState::Connected);

        let handler = manager.clone();
        let closed = ChannelEvent::Closed {
            generation: live.generation(),
            reason: "reset by peer".into(),
        };
        let task = tokio::spawn(async move { handler.handle_event(closed).await });

        tokio::time::timeout(Duration::from_secs(1), async {
            while manager.inner.channel.load().is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        match manager.last_error() {
            Some(CoreError::ConnectionFailed { url, reason }) => {
                assert_eq!(url, "ws://127.0.0.1:1/api/websocket");
                assert_eq!(reason, "reset by peer");
            }
            other => panic!("unexpected error {other:?}"),
        }

        // Cancels the pending reconnect sleep.
        manager.disconnect();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
