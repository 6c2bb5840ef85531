//! # field-core
//!
//! Pure logic for crud-field (no I/O, instant tests).
//!
//! This crate holds the two pieces of a field binding that can be reasoned
//! about without a socket:
//! - [`ValueState`] - the current and last-loaded value and how reads,
//!   pushes and local edits move them
//! - [`BindingPhase`] - the binding lifecycle as an event-driven state
//!   machine producing [`Action`]s
//!
//! The actual I/O (subscribing, emitting requests, dispatching events) is
//! performed by `field-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod state;
pub mod value;

pub use state::{Action, BindingPhase, Event};
pub use value::{PacketOutcome, ValueState};
