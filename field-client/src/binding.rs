//! FieldBinding - a live mirror of one field of one resource.
//!
//! A binding subscribes to the field's channel, reads the value once the
//! subscription is confirmed, and afterwards keeps [`FieldBinding::value`]
//! current from three sources: pushes on the channel, explicit
//! [`FieldBinding::load_data`] calls, and the reload that follows a
//! re-subscription after the socket re-authenticates.
//!
//! # Architecture
//!
//! ```text
//! Application → FieldBinding → Socket → Network
//!                   ↓      ↑
//!         field-core     Channel (pushes, subscription state)
//! ```
//!
//! Lifecycle decisions come from [`BindingPhase`] and value bookkeeping
//! from [`ValueState`]; this module executes the resulting actions and
//! dispatches `change` / `error` events.
//!
//! # Example
//!
//! ```ignore
//! let socket = Arc::new(MockSocket::new());
//! let field = FieldBinding::new(socket, FieldOptions::new("user", "42", "name"))?;
//! field.on_change(|change| println!("{} -> {}", change.old_value, change.new_value));
//!
//! field.update(json!("Bob")).await?;
//! field.destroy();
//! ```
//!
//! Writes are optimistic: `update` and `delete` change the local value and
//! emit `change` before the request is sent, and a rejected request does
//! not restore the previous value. Overlapping writes and pushes are not
//! serialized; whichever lands last wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crudfield_core::{Action, BindingPhase, Event, PacketOutcome, ValueState};
use crudfield_types::{
    ChannelName, FieldChange, FieldError, FieldKey, FieldQuery, Packet, RpcEvent,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, FieldOptions};
use crate::emitter::{Emitter, ListenerId};
use crate::socket::{Channel, ChannelState, Socket, SocketEvent};

/// Future returned by the write operations.
pub type WriteFuture = Pin<Box<dyn Future<Output = Result<Value, FieldError>> + Send>>;

/// Events emitted by a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    /// The value changed.
    Change(FieldChange),
    /// A read or subscription failed.
    Error(FieldError),
}

/// A client-side mirror of one field of one resource instance.
///
/// Cloning a binding yields another handle to the same binding.
pub struct FieldBinding<S: Socket> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: Socket> {
    runtime: Handle,
    socket: Arc<S>,
    key: FieldKey,
    channel_name: ChannelName,
    channel: Arc<S::Channel>,
    values: Mutex<ValueState>,
    phase: Mutex<BindingPhase>,
    events: Emitter<FieldEvent>,
    wiring: Mutex<Wiring>,
}

/// Everything `destroy` has to undo.
#[derive(Default)]
struct Wiring {
    watcher: Option<ListenerId>,
    transitions: Option<ListenerId>,
    authenticate: Option<ListenerId>,
    observer: Option<JoinHandle<()>>,
}

impl<S: Socket> FieldBinding<S> {
    /// Bind a field using the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::NoRuntime`] outside a tokio runtime.
    pub fn new(socket: Arc<S>, options: FieldOptions) -> Result<Self, FieldError> {
        Self::with_config(socket, options, &ClientConfig::default())
    }

    /// Bind a field, deriving the channel name from `config`.
    ///
    /// Reads and subscription tracking run on the tokio runtime current at
    /// this call.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::NoRuntime`] outside a tokio runtime.
    pub fn with_config(
        socket: Arc<S>,
        options: FieldOptions,
        config: &ClientConfig,
    ) -> Result<Self, FieldError> {
        let runtime = Handle::try_current().map_err(|_| FieldError::NoRuntime)?;
        let key = options.key();
        let channel_name = config.channel_name(&key);

        // The subscription itself is carried out here: every later step
        // needs the channel handle.
        let (phase, _) = BindingPhase::new().on_event(Event::SubscribeRequested);
        tracing::debug!("Subscribing to {}", channel_name);
        let channel = socket.subscribe(&channel_name);

        let inner = Arc::new(Inner {
            runtime,
            socket,
            key,
            channel_name,
            channel,
            values: Mutex::new(ValueState::new()),
            phase: Mutex::new(phase),
            events: Emitter::new(),
            wiring: Mutex::new(Wiring::default()),
        });

        let watcher = {
            let weak = Arc::downgrade(&inner);
            inner.channel.watch(Arc::new(move |packet: Option<Packet>| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_channel_data(packet);
                }
            }))
        };

        // Open the transition stream before reading the present state, so
        // nothing that happens in between is lost. A channel that was
        // already subscribed loads right away.
        let (transitions, stream) = inner.channel.transitions();
        let current = inner.channel.state().borrow().clone();
        inner.handle_channel_state(current);
        let observer = inner
            .runtime
            .spawn(observe_channel(Arc::downgrade(&inner), stream));

        let authenticate = {
            let weak = Arc::downgrade(&inner);
            inner.socket.on(
                SocketEvent::Authenticate,
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(Event::Authenticated);
                    }
                }),
            )
        };

        *inner.wiring() = Wiring {
            watcher: Some(watcher),
            transitions: Some(transitions),
            authenticate: Some(authenticate),
            observer: Some(observer),
        };

        Ok(Self { inner })
    }

    /// Bind every field declared in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::NoRuntime`] outside a tokio runtime.
    pub fn bind_all(socket: &Arc<S>, config: &ClientConfig) -> Result<Vec<Self>, FieldError> {
        config
            .fields
            .iter()
            .map(|options| Self::with_config(Arc::clone(socket), options.clone(), config))
            .collect()
    }

    /// Re-read the field from the server.
    ///
    /// Fire-and-forget: the outcome is reported through `change` or
    /// `error` events. The returned handle may be awaited to know when the
    /// read has been applied.
    pub fn load_data(&self) -> JoinHandle<()> {
        Inner::load(&self.inner)
    }

    /// Write local edits back to the server.
    ///
    /// Resolves immediately with the current value, without a request, if
    /// nothing changed since the last load.
    pub fn save(&self) -> WriteFuture {
        let value = {
            let values = self.inner.values();
            if !values.is_dirty() {
                let value = values.value().clone();
                return Box::pin(async move { Ok(value) });
            }
            values.value().clone()
        };
        self.update(value)
    }

    /// Set the value and send it to the server.
    ///
    /// The value is updated and `change` emitted before this returns; the
    /// returned future resolves with the server's reply. The local value is
    /// kept if the server rejects the write.
    pub fn update(&self, new_value: Value) -> WriteFuture {
        let change = self
            .inner
            .values()
            .set_optimistic(&self.inner.key.field, new_value.clone());
        self.inner.emit_change(change);

        let query = FieldQuery::for_key(&self.inner.key).with_value(new_value);
        Box::pin(Inner::request(&self.inner, RpcEvent::Update, query))
    }

    /// Clear the value and delete it on the server.
    ///
    /// Like [`FieldBinding::update`], the local value becomes null before
    /// the request is sent and stays null if the request fails.
    pub fn delete(&self) -> WriteFuture {
        let change = self
            .inner
            .values()
            .set_optimistic(&self.inner.key.field, Value::Null);
        self.inner.emit_change(change);

        let query = FieldQuery::for_key(&self.inner.key);
        Box::pin(Inner::request(&self.inner, RpcEvent::Delete, query))
    }

    /// Stop tracking the field.
    ///
    /// Detaches from the socket and channel and releases the channel when
    /// no other watcher remains. Requests already in flight still complete.
    /// Calling this again has no effect.
    pub fn destroy(&self) {
        self.inner.dispatch(Event::DestroyRequested);
    }

    /// Edit the value locally, without emitting `change` or contacting the
    /// server. A later [`FieldBinding::save`] sends it.
    pub fn set_value(&self, value: Value) {
        self.inner.values().set_local(value);
    }

    /// Current value, including unsaved local edits.
    pub fn value(&self) -> Value {
        self.inner.values().value().clone()
    }

    /// Last value confirmed by the server.
    pub fn loaded_value(&self) -> Value {
        self.inner.values().loaded_value().clone()
    }

    /// Check if the value differs from the last loaded value.
    pub fn is_dirty(&self) -> bool {
        self.inner.values().is_dirty()
    }

    /// Check if the binding has not been destroyed.
    pub fn is_active(&self) -> bool {
        self.inner.phase().is_active()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BindingPhase {
        self.inner.phase().clone()
    }

    /// The field this binding mirrors.
    pub fn key(&self) -> &FieldKey {
        &self.inner.key
    }

    /// Name of the field channel.
    pub fn channel_name(&self) -> &ChannelName {
        &self.inner.channel_name
    }

    /// The (possibly shared) channel handle.
    pub fn channel(&self) -> &Arc<S::Channel> {
        &self.inner.channel
    }

    /// Register a listener for all binding events.
    pub fn on(&self, handler: impl Fn(&FieldEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on(Arc::new(handler))
    }

    /// Register a listener for the next binding event only.
    pub fn once(&self, handler: impl Fn(&FieldEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.once(Arc::new(handler))
    }

    /// Register a listener for `change` events.
    pub fn on_change(&self, handler: impl Fn(&FieldChange) + Send + Sync + 'static) -> ListenerId {
        self.on(move |event| {
            if let FieldEvent::Change(change) = event {
                handler(change);
            }
        })
    }

    /// Register a listener for `error` events.
    pub fn on_error(&self, handler: impl Fn(&FieldError) + Send + Sync + 'static) -> ListenerId {
        self.on(move |event| {
            if let FieldEvent::Error(error) = event {
                handler(error);
            }
        })
    }

    /// Remove a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Receive every future event through a channel.
    pub fn events(&self) -> (ListenerId, tokio::sync::mpsc::UnboundedReceiver<FieldEvent>) {
        self.inner.events.channel()
    }
}

impl<S: Socket> Clone for FieldBinding<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Socket> std::fmt::Debug for FieldBinding<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldBinding")
            .field("channel", &self.inner.channel_name)
            .field("phase", &*self.inner.phase())
            .field("value", self.inner.values().value())
            .finish()
    }
}

impl<S: Socket> Inner<S> {
    fn dispatch(self: &Arc<Self>, event: Event) {
        let actions = {
            let mut phase = self.phase();
            let (next, actions) = phase.clone().on_event(event);
            *phase = next;
            actions
        };

        for action in actions {
            self.execute(action);
        }
    }

    fn execute(self: &Arc<Self>, action: Action) {
        match action {
            Action::Subscribe | Action::Resubscribe => {
                tracing::debug!("Resubscribing to {}", self.channel_name);
                self.socket.subscribe(&self.channel_name);
            }
            Action::Load => {
                Self::load(self);
            }
            Action::EmitError(error) => {
                self.events.emit(&FieldEvent::Error(error));
            }
            Action::Detach => self.detach(),
        }
    }

    fn handle_channel_state(self: &Arc<Self>, state: ChannelState) {
        match state {
            ChannelState::Subscribed => self.dispatch(Event::ChannelSubscribed),
            ChannelState::Failed(raw) => {
                let error = FieldError::from(raw);
                tracing::warn!("Subscription to {} failed: {}", self.channel_name, error);
                self.dispatch(Event::SubscribeFailed { error });
            }
            ChannelState::Pending | ChannelState::Unsubscribed => {}
        }
    }

    fn handle_channel_data(self: &Arc<Self>, packet: Option<Packet>) {
        tracing::trace!("Packet on {}: {:?}", self.channel_name, packet);
        let outcome = self.values().apply_packet(&self.key.field, packet);
        match outcome {
            PacketOutcome::Changed(change) => self.emit_change(change),
            PacketOutcome::Reload => {
                Self::load(self);
            }
        }
    }

    fn load(this: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(this);
        this.runtime.spawn(async move {
            tracing::debug!("Reading {}", inner.key);
            let query = FieldQuery::for_key(&inner.key);
            match inner.socket.emit(RpcEvent::Read, query).await {
                Ok(result) => {
                    let change = inner.values().apply_loaded(&inner.key.field, result);
                    inner.emit_change(change);
                }
                Err(raw) => {
                    let error = FieldError::from(raw);
                    tracing::warn!("Read of {} failed: {}", inner.key, error);
                    inner.events.emit(&FieldEvent::Error(error));
                }
            }
        })
    }

    fn request(
        this: &Arc<Self>,
        event: RpcEvent,
        query: FieldQuery,
    ) -> impl Future<Output = Result<Value, FieldError>> + Send + 'static {
        let socket = Arc::clone(&this.socket);
        let key = this.key.clone();
        async move {
            socket.emit(event, query).await.map_err(|raw| {
                let error = FieldError::from(raw);
                tracing::warn!("{} of {} failed: {}", event, key, error);
                error
            })
        }
    }

    fn detach(&self) {
        let wiring = std::mem::take(&mut *self.wiring());

        if let Some(id) = wiring.authenticate {
            self.socket.off(SocketEvent::Authenticate, id);
        }
        if let Some(id) = wiring.transitions {
            self.channel.close_transitions(id);
        }
        if let Some(observer) = wiring.observer {
            observer.abort();
        }
        if let Some(id) = wiring.watcher {
            self.channel.unwatch(id);
        }

        if self.channel.watcher_count() == 0 {
            tracing::debug!("Releasing channel {}", self.channel_name);
            self.channel.destroy();
        } else {
            tracing::debug!(
                "Channel {} still has {} watchers",
                self.channel_name,
                self.channel.watcher_count()
            );
        }
    }

    fn emit_change(&self, change: FieldChange) {
        self.events.emit(&FieldEvent::Change(change));
    }

    fn values(&self) -> MutexGuard<'_, ValueState> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn phase(&self) -> MutexGuard<'_, BindingPhase> {
        self.phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wiring(&self) -> MutexGuard<'_, Wiring> {
        self.wiring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Follow subscription state transitions until the binding goes away.
async fn observe_channel<S: Socket>(
    inner: Weak<Inner<S>>,
    mut transitions: mpsc::UnboundedReceiver<ChannelState>,
) {
    while let Some(state) = transitions.recv().await {
        match inner.upgrade() {
            Some(inner) => inner.handle_channel_state(state),
            None => break,
        }
    }
}
