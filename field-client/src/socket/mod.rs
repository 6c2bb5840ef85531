//! Socket and channel abstraction for crud-field.
//!
//! A field binding talks to the server through two collaborators:
//! - a [`Socket`] that issues `read`/`update`/`delete` requests, hands out
//!   channels and announces (re-)authentication
//! - a [`Channel`] per field that delivers pushed [`Packet`]s to watchers
//!   and reports its subscription state
//!
//! # Design
//!
//! Channels are shared: subscribing twice to the same name yields the same
//! handle, and a channel is only destroyed once no watcher remains.
//!
//! Subscription state is exposed twice rather than as separate "subscribe"
//! and "subscribeFail" callbacks: [`Channel::state`] is a
//! [`tokio::sync::watch`] receiver holding the present state, so an observer
//! attaching late knows where the channel stands, and
//! [`Channel::transitions`] queues every later transition in order, so a
//! failure followed quickly by a retry is never collapsed away.
//!
//! # Example
//!
//! ```ignore
//! let socket = Arc::new(MockSocket::new());
//! let channel = socket.subscribe(&key.channel_name());
//! let id = channel.watch(Arc::new(|packet| println!("{packet:?}")));
//! let value = socket.emit(RpcEvent::Read, FieldQuery::for_key(&key)).await?;
//! ```

mod mock;

pub use mock::{MockChannel, MockSocket};

use async_trait::async_trait;
use crudfield_types::{ChannelName, FieldQuery, Packet, RemoteError, RpcEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::emitter::ListenerId;

/// Subscription state of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelState {
    /// Not subscribed, or subscription was dropped.
    Unsubscribed,
    /// Subscription requested, awaiting confirmation.
    Pending,
    /// Subscription confirmed.
    Subscribed,
    /// Subscription was refused.
    Failed(RemoteError),
}

/// Lifecycle events a socket announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEvent {
    /// The socket (re-)authenticated; channel permissions may have changed.
    Authenticate,
}

/// Listener for socket lifecycle events.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handler for channel data.
///
/// `None` means the publisher had nothing to send and watchers should
/// re-read the field.
pub type WatchHandler = Arc<dyn Fn(Option<Packet>) + Send + Sync>;

/// Socket trait for field bindings.
///
/// Implementations handle the underlying connection (WebSocket, in-process
/// mock, etc).
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Channel handle type handed out by [`Socket::subscribe`].
    type Channel: Channel;

    /// Request a subscription and return the (shared) channel handle.
    ///
    /// Calling this again for an already known channel re-requests the
    /// subscription and returns the same handle.
    fn subscribe(&self, name: &ChannelName) -> Arc<Self::Channel>;

    /// Send a request and wait for the server's reply.
    async fn emit(&self, event: RpcEvent, query: FieldQuery) -> Result<Value, RemoteError>;

    /// Register a lifecycle listener.
    fn on(&self, event: SocketEvent, listener: Listener) -> ListenerId;

    /// Remove a lifecycle listener. Returns `false` if it was not registered.
    fn off(&self, event: SocketEvent, id: ListenerId) -> bool;
}

/// A named pub/sub topic.
pub trait Channel: Send + Sync + 'static {
    /// The channel name.
    fn name(&self) -> &ChannelName;

    /// Current subscription state.
    ///
    /// The receiver only keeps the latest state; use
    /// [`Channel::transitions`] to see every change.
    fn state(&self) -> watch::Receiver<ChannelState>;

    /// Receive every future state transition, in order.
    ///
    /// The stream stays open until [`Channel::close_transitions`] is called
    /// with the returned id or the channel is destroyed.
    fn transitions(&self) -> (ListenerId, mpsc::UnboundedReceiver<ChannelState>);

    /// Stop a transition stream. Returns `false` if it was not open.
    fn close_transitions(&self, id: ListenerId) -> bool;

    /// Register a data handler.
    fn watch(&self, handler: WatchHandler) -> ListenerId;

    /// Remove a data handler. Returns `false` if it was not registered.
    fn unwatch(&self, id: ListenerId) -> bool;

    /// Number of registered data handlers.
    fn watcher_count(&self) -> usize;

    /// Unsubscribe and release the channel.
    fn destroy(&self);

    /// Check if the subscription is currently confirmed.
    fn is_subscribed(&self) -> bool {
        matches!(*self.state().borrow(), ChannelState::Subscribed)
    }
}
