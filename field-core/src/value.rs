//! Value tracking for a single field.
//!
//! `value` is what the application sees and may edit locally;
//! `loaded_value` is the last value confirmed by the server. The two only
//! diverge through local edits (`set_local`, `set_optimistic`).

use crudfield_types::{FieldChange, Packet};
use serde_json::Value;

/// Result of applying a channel packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketOutcome {
    /// The packet carried data and the value moved.
    Changed(FieldChange),
    /// The packet carried no data; the caller should re-read the field.
    Reload,
}

/// Current and last-loaded value of a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueState {
    value: Value,
    loaded_value: Value,
}

impl ValueState {
    /// Create an empty state (both values null).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, including unsaved local edits.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Last value confirmed by the server.
    pub fn loaded_value(&self) -> &Value {
        &self.loaded_value
    }

    /// Check if the value was edited locally since the last load.
    pub fn is_dirty(&self) -> bool {
        self.value != self.loaded_value
    }

    /// Apply the result of a `read`.
    pub fn apply_loaded(&mut self, field: &str, result: Value) -> FieldChange {
        self.loaded_value = result.clone();
        self.replace(field, result)
    }

    /// Apply a packet pushed on the field channel.
    ///
    /// `None` means the publisher had no data to send; nothing changes and
    /// the caller is asked to reload instead.
    pub fn apply_packet(&mut self, field: &str, packet: Option<Packet>) -> PacketOutcome {
        let Some(packet) = packet else {
            return PacketOutcome::Reload;
        };

        let new_value = if packet.is_delete() {
            Value::Null
        } else {
            packet.value.unwrap_or(Value::Null)
        };

        self.loaded_value = new_value.clone();
        PacketOutcome::Changed(self.replace(field, new_value))
    }

    /// Set the value ahead of server confirmation.
    ///
    /// `loaded_value` is left alone, so a rejected write stays visible as a
    /// dirty value.
    pub fn set_optimistic(&mut self, field: &str, new_value: Value) -> FieldChange {
        self.replace(field, new_value)
    }

    /// Edit the value locally without producing a change record.
    pub fn set_local(&mut self, new_value: Value) {
        self.value = new_value;
    }

    fn replace(&mut self, field: &str, new_value: Value) -> FieldChange {
        let old_value = std::mem::replace(&mut self.value, new_value);
        FieldChange {
            field: field.to_string(),
            old_value,
            new_value: self.value.clone(),
        }
    }
}
