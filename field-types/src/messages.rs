//! RPC payloads and channel packets.
//!
//! Field values travel as plain JSON. JSON `null` stands for "no value",
//! which is also what a deleted field reads as.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::FieldKey;

/// Packet type announcing that a field was deleted.
pub const DELETE_PACKET_TYPE: &str = "delete";

/// Request/response events a binding emits over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcEvent {
    /// Fetch the current field value.
    Read,
    /// Overwrite the field value.
    Update,
    /// Delete the field value.
    Delete,
}

impl RpcEvent {
    /// Event name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for RpcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `read`, `update` or `delete` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource instance id.
    #[serde(rename = "id")]
    pub resource_id: String,
    /// Field name.
    pub field: String,
    /// New value (only present on `update`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldQuery {
    /// Query addressing a field, without a value.
    pub fn for_key(key: &FieldKey) -> Self {
        Self {
            resource_type: key.resource_type.clone(),
            resource_id: key.resource_id.clone(),
            field: key.field.clone(),
            value: None,
        }
    }

    /// Attach a value (for `update`).
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// The field key this query addresses.
    pub fn key(&self) -> FieldKey {
        FieldKey::new(&self.resource_type, &self.resource_id, &self.field)
    }
}

/// A message published on a field channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet type; `"delete"` clears the field, anything else sets it.
    #[serde(rename = "type")]
    pub kind: String,
    /// New value, absent on deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Packet {
    /// A packet announcing a new value.
    pub fn update(value: Value) -> Self {
        Self {
            kind: "update".to_string(),
            value: Some(value),
        }
    }

    /// A packet announcing deletion.
    pub fn delete() -> Self {
        Self {
            kind: DELETE_PACKET_TYPE.to_string(),
            value: None,
        }
    }

    /// Check if this packet deletes the field.
    pub fn is_delete(&self) -> bool {
        self.kind == DELETE_PACKET_TYPE
    }
}

/// Payload of the `change` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    /// Name of the field that changed.
    pub field: String,
    /// Value before the change.
    pub old_value: Value,
    /// Value after the change.
    pub new_value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rpc_event_wire_names() {
        assert_eq!(RpcEvent::Read.as_str(), "read");
        assert_eq!(RpcEvent::Update.to_string(), "update");
        assert_eq!(serde_json::to_value(RpcEvent::Delete).unwrap(), json!("delete"));
    }

    #[test]
    fn read_query_omits_value() {
        let query = FieldQuery::for_key(&FieldKey::new("user", "42", "name"));
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"type": "user", "id": "42", "field": "name"})
        );
    }

    #[test]
    fn update_query_carries_value() {
        let query = FieldQuery::for_key(&FieldKey::new("user", "42", "name")).with_value(json!("Bob"));
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"type": "user", "id": "42", "field": "name", "value": "Bob"})
        );
    }

    #[test]
    fn update_query_keeps_explicit_null() {
        let query = FieldQuery::for_key(&FieldKey::new("a", "1", "b")).with_value(Value::Null);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["value"], Value::Null);
        assert!(json.as_object().unwrap().contains_key("value"));
    }

    #[test]
    fn packet_parses_delete() {
        let packet: Packet = serde_json::from_value(json!({"type": "delete"})).unwrap();
        assert!(packet.is_delete());
        assert_eq!(packet.value, None);
    }

    #[test]
    fn packet_parses_arbitrary_type() {
        let packet: Packet =
            serde_json::from_value(json!({"type": "set", "value": {"x": 1}})).unwrap();
        assert!(!packet.is_delete());
        assert_eq!(packet.value, Some(json!({"x": 1})));
    }

    #[test]
    fn change_uses_camel_case() {
        let change = FieldChange {
            field: "name".into(),
            old_value: Value::Null,
            new_value: json!("Alice"),
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({"field": "name", "oldValue": null, "newValue": "Alice"})
        );
    }
}
