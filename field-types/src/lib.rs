//! # field-types
//!
//! Wire format types for crud-field reactive field bindings.
//!
//! This crate provides the foundational types used across all crud-field crates:
//! - [`FieldKey`], [`ChannelName`] - Identity and channel naming
//! - [`RpcEvent`], [`FieldQuery`] - Request/response RPC payloads
//! - [`Packet`] - Channel push payloads
//! - [`FieldChange`] - Change notifications
//! - [`FieldError`], [`RemoteError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod key;
mod messages;

pub use error::{FieldError, RemoteError};
pub use key::{ChannelName, FieldKey, DEFAULT_CHANNEL_PREFIX};
pub use messages::{FieldChange, FieldQuery, Packet, RpcEvent, DELETE_PACKET_TYPE};
