//! Mock socket for testing.
//!
//! Records every request, answers from a scripted queue or from an
//! in-memory field store, and hands out shared [`MockChannel`]s whose state
//! and data can be driven from tests.

use super::{Channel, ChannelState, Listener, Socket, SocketEvent, WatchHandler};
use crate::emitter::{Emitter, ListenerId};
use crate::registry::{ChannelRegistry, ReleaseHandle};
use async_trait::async_trait;
use crudfield_types::{ChannelName, FieldKey, FieldQuery, Packet, RemoteError, RpcEvent};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// Mock socket for testing.
///
/// By default subscriptions are confirmed immediately and requests are
/// answered from an in-memory store keyed by field: `update` stores the
/// value, `delete` clears it, `read` returns it (or null).
#[derive(Debug)]
pub struct MockSocket {
    inner: Arc<Mutex<MockSocketInner>>,
    channels: ChannelRegistry<MockChannel>,
    authenticate: Arc<Emitter<()>>,
    held: watch::Sender<bool>,
}

#[derive(Debug)]
struct MockSocketInner {
    auto_subscribe: bool,
    publish_writes: bool,
    requests: Vec<(RpcEvent, FieldQuery)>,
    responses: VecDeque<Result<Value, RemoteError>>,
    store: HashMap<FieldKey, Value>,
}

impl Default for MockSocketInner {
    fn default() -> Self {
        Self {
            auto_subscribe: true,
            publish_writes: false,
            requests: Vec::new(),
            responses: VecDeque::new(),
            store: HashMap::new(),
        }
    }
}

impl MockSocket {
    /// Create a new mock socket.
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(MockSocketInner::default())),
            channels: ChannelRegistry::new(),
            authenticate: Arc::new(Emitter::new()),
            held,
        }
    }

    /// Confirm subscriptions immediately (default) or leave them pending.
    pub fn set_auto_subscribe(&self, enabled: bool) {
        self.lock().auto_subscribe = enabled;
    }

    /// Publish a packet on the field channel after each successful
    /// `update`/`delete`, the way a CRUD server announces writes.
    pub fn set_publish_writes(&self, enabled: bool) {
        self.lock().publish_writes = enabled;
    }

    /// Queue the reply for the next request.
    ///
    /// Queued replies take precedence over the in-memory store.
    pub fn queue_response(&self, response: Result<Value, RemoteError>) {
        self.lock().responses.push_back(response);
    }

    /// Cause the next request to fail with `{ "message": error }`.
    pub fn fail_next(&self, error: &str) {
        self.queue_response(Err(RemoteError::message(error)));
    }

    /// Seed the in-memory store.
    pub fn set_field(&self, key: &FieldKey, value: Value) {
        self.lock().store.insert(key.clone(), value);
    }

    /// Read the in-memory store.
    pub fn field(&self, key: &FieldKey) -> Option<Value> {
        self.lock().store.get(key).cloned()
    }

    /// Hold every reply until [`MockSocket::release`] is called.
    ///
    /// Requests are still recorded as soon as they are emitted.
    pub fn hold_responses(&self) {
        self.held.send_replace(true);
    }

    /// Let held replies through.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Get all requests that were emitted.
    pub fn requests(&self) -> Vec<(RpcEvent, FieldQuery)> {
        self.lock().requests.clone()
    }

    /// Get the requests of one kind.
    pub fn requests_for(&self, event: RpcEvent) -> Vec<FieldQuery> {
        self.lock()
            .requests
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, q)| q.clone())
            .collect()
    }

    /// Get the last request that was emitted.
    pub fn last_request(&self) -> Option<(RpcEvent, FieldQuery)> {
        self.lock().requests.last().cloned()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Look up a live channel.
    pub fn channel(&self, name: &ChannelName) -> Option<Arc<MockChannel>> {
        self.channels.get(name)
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.channels().len()
    }

    /// Push a packet to the watchers of a channel, if it exists.
    pub fn publish(&self, name: &ChannelName, packet: Option<Packet>) -> bool {
        match self.channels.get(name) {
            Some(channel) => {
                channel.publish(packet);
                true
            }
            None => false,
        }
    }

    /// Simulate a re-authentication.
    ///
    /// Confirmed subscriptions drop back to `Pending` (the server has to
    /// re-check permissions), then `authenticate` listeners fire.
    pub fn authenticate(&self) {
        for channel in self.channels.channels() {
            channel.drop_subscription();
        }
        self.authenticate.emit(&());
    }

    /// Number of `authenticate` listeners.
    pub fn authenticate_listeners(&self) -> usize {
        self.authenticate.listener_count()
    }

    fn respond(&self, event: RpcEvent, query: &FieldQuery) -> Result<Value, RemoteError> {
        let mut inner = self.lock();
        if let Some(scripted) = inner.responses.pop_front() {
            return scripted;
        }

        let key = query.key();
        let value = match event {
            RpcEvent::Read => inner.store.get(&key).cloned().unwrap_or(Value::Null),
            RpcEvent::Update => {
                let value = query.value.clone().unwrap_or(Value::Null);
                inner.store.insert(key, value.clone());
                value
            }
            RpcEvent::Delete => {
                inner.store.remove(&key);
                Value::Null
            }
        };
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, MockSocketInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockSocket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Socket for MockSocket {
    type Channel = MockChannel;

    fn subscribe(&self, name: &ChannelName) -> Arc<MockChannel> {
        let (channel, _) = self
            .channels
            .get_or_insert_with(name, |release| MockChannel::new(name.clone(), Some(release)));
        let auto = self.lock().auto_subscribe;
        channel.request_subscription(auto);
        channel
    }

    async fn emit(&self, event: RpcEvent, query: FieldQuery) -> Result<Value, RemoteError> {
        let response = self.respond(event, &query);
        let publish = self.lock().publish_writes;
        self.lock().requests.push((event, query.clone()));

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if publish && response.is_ok() {
            let name = query.key().channel_name();
            let packet = match event {
                RpcEvent::Update => Some(Packet::update(query.value.unwrap_or(Value::Null))),
                RpcEvent::Delete => Some(Packet::delete()),
                RpcEvent::Read => None,
            };
            if let Some(packet) = packet {
                self.publish(&name, Some(packet));
            }
        }

        response
    }

    fn on(&self, event: SocketEvent, listener: Listener) -> ListenerId {
        match event {
            SocketEvent::Authenticate => self.authenticate.on(Arc::new(move |_: &()| listener())),
        }
    }

    fn off(&self, event: SocketEvent, id: ListenerId) -> bool {
        match event {
            SocketEvent::Authenticate => self.authenticate.off(id),
        }
    }
}

/// Mock channel for testing.
#[derive(Debug)]
pub struct MockChannel {
    name: ChannelName,
    state: watch::Sender<ChannelState>,
    watchers: Emitter<Option<Packet>>,
    transitions: Emitter<ChannelState>,
    subscribe_requests: AtomicUsize,
    destroyed: AtomicBool,
    release: Option<ReleaseHandle<MockChannel>>,
}

impl MockChannel {
    /// Create a standalone channel in the `Unsubscribed` state.
    pub fn standalone(name: ChannelName) -> Self {
        Self::new(name, None)
    }

    fn new(name: ChannelName, release: Option<ReleaseHandle<MockChannel>>) -> Self {
        let (state, _) = watch::channel(ChannelState::Unsubscribed);
        Self {
            name,
            state,
            watchers: Emitter::new(),
            transitions: Emitter::new(),
            subscribe_requests: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            release,
        }
    }

    /// Move to a new subscription state, notifying observers even if the
    /// state is unchanged.
    pub fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state.clone());
        self.transitions.emit(&state);
    }

    /// Confirm a pending subscription.
    pub fn confirm_subscription(&self) {
        self.set_state(ChannelState::Subscribed);
    }

    /// Refuse the subscription with `{ "message": error }`.
    pub fn fail_subscription(&self, error: &str) {
        self.set_state(ChannelState::Failed(RemoteError::message(error)));
    }

    /// Deliver a packet to every watcher.
    pub fn publish(&self, packet: Option<Packet>) {
        self.watchers.emit(&packet);
    }

    /// How many times a subscription was requested.
    pub fn subscribe_requests(&self) -> usize {
        self.subscribe_requests.load(Ordering::SeqCst)
    }

    /// Check if the channel was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn request_subscription(&self, auto: bool) {
        self.subscribe_requests.fetch_add(1, Ordering::SeqCst);
        let next = if auto {
            ChannelState::Subscribed
        } else {
            ChannelState::Pending
        };
        // Subscribing to an already subscribed channel is a no-op
        let modified = self.state.send_if_modified(|state| {
            if *state == ChannelState::Subscribed || *state == next {
                false
            } else {
                *state = next.clone();
                true
            }
        });
        if modified {
            self.transitions.emit(&next);
        }
    }

    /// Confirmed subscription falls back to `Pending`.
    fn drop_subscription(&self) {
        let modified = self.state.send_if_modified(|state| {
            if *state == ChannelState::Subscribed {
                *state = ChannelState::Pending;
                true
            } else {
                false
            }
        });
        if modified {
            self.transitions.emit(&ChannelState::Pending);
        }
    }
}

impl Channel for MockChannel {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    fn transitions(&self) -> (ListenerId, mpsc::UnboundedReceiver<ChannelState>) {
        self.transitions.channel()
    }

    fn close_transitions(&self, id: ListenerId) -> bool {
        self.transitions.off(id)
    }

    fn watch(&self, handler: WatchHandler) -> ListenerId {
        self.watchers
            .on(Arc::new(move |packet: &Option<Packet>| handler(packet.clone())))
    }

    fn unwatch(&self, id: ListenerId) -> bool {
        self.watchers.off(id)
    }

    fn watcher_count(&self) -> usize {
        self.watchers.listener_count()
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watchers.clear();
        self.transitions.clear();
        self.set_state(ChannelState::Unsubscribed);
        if let Some(release) = &self.release {
            release.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> FieldKey {
        FieldKey::new("user", "42", "name")
    }

    // ===========================================
    // Request / Response Tests
    // ===========================================

    #[tokio::test]
    async fn records_requests() {
        let socket = MockSocket::new();
        let query = FieldQuery::for_key(&key());

        socket.emit(RpcEvent::Read, query.clone()).await.unwrap();

        assert_eq!(socket.requests(), vec![(RpcEvent::Read, query.clone())]);
        assert_eq!(socket.requests_for(RpcEvent::Read), vec![query]);
        assert!(socket.requests_for(RpcEvent::Update).is_empty());
    }

    #[tokio::test]
    async fn store_backs_default_responses() {
        let socket = MockSocket::new();
        let read = FieldQuery::for_key(&key());

        assert_eq!(socket.emit(RpcEvent::Read, read.clone()).await.unwrap(), Value::Null);

        let update = read.clone().with_value(json!("Alice"));
        assert_eq!(socket.emit(RpcEvent::Update, update).await.unwrap(), json!("Alice"));
        assert_eq!(socket.emit(RpcEvent::Read, read.clone()).await.unwrap(), json!("Alice"));

        socket.emit(RpcEvent::Delete, read.clone()).await.unwrap();
        assert_eq!(socket.field(&key()), None);
    }

    #[tokio::test]
    async fn queued_responses_take_precedence() {
        let socket = MockSocket::new();
        socket.set_field(&key(), json!("stored"));
        socket.queue_response(Ok(json!("scripted")));
        socket.fail_next("boom");

        let query = FieldQuery::for_key(&key());
        assert_eq!(socket.emit(RpcEvent::Read, query.clone()).await.unwrap(), json!("scripted"));
        let err = socket.emit(RpcEvent::Read, query.clone()).await.unwrap_err();
        assert_eq!(err, RemoteError::message("boom"));
        assert_eq!(socket.emit(RpcEvent::Read, query).await.unwrap(), json!("stored"));
    }

    #[tokio::test]
    async fn held_responses_wait_for_release() {
        let socket = Arc::new(MockSocket::new());
        socket.hold_responses();

        let task = {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                socket
                    .emit(RpcEvent::Read, FieldQuery::for_key(&key()))
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(socket.requests().len(), 1);
        assert!(!task.is_finished());

        socket.release();
        assert!(task.await.unwrap().is_ok());
    }

    // ===========================================
    // Channel Tests
    // ===========================================

    #[test]
    fn subscribe_shares_channels() {
        let socket = MockSocket::new();
        let name = key().channel_name();

        let a = socket.subscribe(&name);
        let b = socket.subscribe(&name);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.subscribe_requests(), 2);
        assert_eq!(socket.channel_count(), 1);
        assert!(a.is_subscribed());
    }

    #[test]
    fn manual_subscription_stays_pending() {
        let socket = MockSocket::new();
        socket.set_auto_subscribe(false);
        let channel = socket.subscribe(&key().channel_name());

        assert_eq!(*channel.state().borrow(), ChannelState::Pending);
        channel.confirm_subscription();
        assert!(channel.is_subscribed());
    }

    #[test]
    fn watchers_receive_packets() {
        let channel = MockChannel::standalone(key().channel_name());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = channel.watch(Arc::new(move |packet: Option<Packet>| {
            sink.lock().unwrap().push(packet)
        }));

        channel.publish(Some(Packet::delete()));
        channel.publish(None);
        assert!(channel.unwatch(id));
        channel.publish(None);

        assert_eq!(*seen.lock().unwrap(), vec![Some(Packet::delete()), None]);
        assert_eq!(channel.watcher_count(), 0);
    }

    #[test]
    fn destroy_releases_from_socket() {
        let socket = MockSocket::new();
        let name = key().channel_name();
        let channel = socket.subscribe(&name);

        channel.destroy();
        channel.destroy();

        assert!(channel.is_destroyed());
        assert_eq!(*channel.state().borrow(), ChannelState::Unsubscribed);
        assert!(socket.channel(&name).is_none());

        // A fresh subscription creates a new channel
        let again = socket.subscribe(&name);
        assert!(!Arc::ptr_eq(&channel, &again));
    }

    #[tokio::test]
    async fn transitions_keep_every_change() {
        let socket = MockSocket::new();
        socket.set_auto_subscribe(false);
        let channel = socket.subscribe(&key().channel_name());
        let (id, mut transitions) = channel.transitions();

        channel.fail_subscription("forbidden");
        channel.set_state(ChannelState::Pending);
        channel.confirm_subscription();
        // Re-requesting a confirmed subscription changes nothing
        socket.subscribe(&key().channel_name());
        assert!(channel.close_transitions(id));
        channel.set_state(ChannelState::Pending);

        assert_eq!(
            transitions.recv().await,
            Some(ChannelState::Failed(RemoteError::message("forbidden")))
        );
        assert_eq!(transitions.recv().await, Some(ChannelState::Pending));
        assert_eq!(transitions.recv().await, Some(ChannelState::Subscribed));
        assert!(transitions.try_recv().is_err());
    }

    #[test]
    fn authenticate_drops_confirmed_subscriptions() {
        let socket = MockSocket::new();
        let channel = socket.subscribe(&key().channel_name());
        let (_, mut transitions) = channel.transitions();

        socket.authenticate();

        assert_eq!(*channel.state().borrow(), ChannelState::Pending);
        assert_eq!(transitions.try_recv().ok(), Some(ChannelState::Pending));
    }

    #[tokio::test]
    async fn publish_writes_announces_updates() {
        let socket = MockSocket::new();
        socket.set_publish_writes(true);
        let channel = socket.subscribe(&key().channel_name());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.watch(Arc::new(move |packet: Option<Packet>| {
            sink.lock().unwrap().push(packet)
        }));

        let update = FieldQuery::for_key(&key()).with_value(json!("Bob"));
        socket.emit(RpcEvent::Update, update).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(Packet::update(json!("Bob")))]);
    }

    // ===========================================
    // Lifecycle Event Tests
    // ===========================================

    #[test]
    fn authenticate_listeners_fire_until_removed() {
        let socket = MockSocket::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = socket.on(
            SocketEvent::Authenticate,
            Arc::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        socket.authenticate();
        assert!(socket.off(SocketEvent::Authenticate, id));
        socket.authenticate();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(socket.authenticate_listeners(), 0);
    }
}
