//! # field-client
//!
//! Client-side reactive field bindings for crud-field.
//!
//! A [`FieldBinding`] mirrors one named field of one resource instance and
//! keeps it in sync with the server over a pub/sub channel plus a
//! `read`/`update`/`delete` request pair.
//!
//! ## Features
//!
//! - **Live values**: channel pushes, explicit reads and re-authentication
//!   all refresh the bound value
//! - **Optimistic writes**: `update`/`delete` apply locally before the
//!   server answers
//! - **Shared channels**: bindings on the same field share one channel,
//!   released when the last watcher leaves
//! - **Socket Abstraction**: pluggable socket layer ([`MockSocket`] for tests)
//!
//! ## Example
//!
//! ```ignore
//! use crudfield_client::{FieldBinding, FieldOptions, MockSocket};
//!
//! let socket = Arc::new(MockSocket::new());
//! let name = FieldBinding::new(socket, FieldOptions::new("user", "42", "name"))?;
//!
//! name.on_change(|change| println!("now {}", change.new_value));
//! name.update(json!("Bob")).await?;
//! name.destroy();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod config;
pub mod emitter;
pub mod registry;
pub mod socket;

pub use binding::{FieldBinding, FieldEvent, WriteFuture};
pub use config::{ClientConfig, ConfigError, FieldOptions};
pub use emitter::{Emitter, Handler, ListenerId};
pub use registry::{ChannelRegistry, ReleaseHandle};
pub use socket::{
    Channel, ChannelState, Listener, MockChannel, MockSocket, Socket, SocketEvent, WatchHandler,
};

pub use crudfield_core::{BindingPhase, ValueState};
pub use crudfield_types::{
    ChannelName, FieldChange, FieldError, FieldKey, FieldQuery, Packet, RemoteError, RpcEvent,
};
