//! Identity and channel naming for field bindings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::FieldError;

/// Channel prefix used by CRUD resources.
pub const DEFAULT_CHANNEL_PREFIX: &str = "crud";

/// Identity of one field of one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    /// Resource type, e.g. `"user"`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource instance id.
    #[serde(rename = "id")]
    pub resource_id: String,
    /// Field name on the resource.
    pub field: String,
}

impl FieldKey {
    /// Create a new key.
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            field: field.into(),
        }
    }

    /// Channel name under the default `crud` prefix.
    pub fn channel_name(&self) -> ChannelName {
        ChannelName::for_field(DEFAULT_CHANNEL_PREFIX, self)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.resource_type, self.resource_id, self.field
        )
    }
}

/// Name of a pub/sub channel carrying updates for one field.
///
/// Format: `{prefix}>{type}/{id}/{field}`. Segments are concatenated
/// verbatim, nothing is escaped.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Build the channel name for a field under the given prefix.
    pub fn for_field(prefix: &str, key: &FieldKey) -> Self {
        Self(format!(
            "{}>{}/{}/{}",
            prefix, key.resource_type, key.resource_id, key.field
        ))
    }

    /// Wrap an arbitrary channel name without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the name back into its prefix and field key.
    ///
    /// The type ends at the first `/` and the field starts after the last
    /// one, so resource ids may themselves contain `/`.
    pub fn parse_key(&self) -> Result<(&str, FieldKey), FieldError> {
        let invalid = || FieldError::InvalidChannelName(self.0.clone());

        let (prefix, path) = self.0.split_once('>').ok_or_else(invalid)?;
        let (resource_type, rest) = path.split_once('/').ok_or_else(invalid)?;
        let (resource_id, field) = rest.rsplit_once('/').ok_or_else(invalid)?;

        if prefix.is_empty() || resource_type.is_empty() || field.is_empty() {
            return Err(invalid());
        }

        Ok((prefix, FieldKey::new(resource_type, resource_id, field)))
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelName({})", self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelName {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = Self::new(s);
        name.parse_key()?;
        Ok(name)
    }
}
