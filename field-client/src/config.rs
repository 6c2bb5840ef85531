//! Configuration loading for crud-field clients.
//!
//! Configuration is read from TOML. Every key is optional:
//!
//! ```toml
//! channel_prefix = "crud"
//!
//! [[field]]
//! resource_type = "user"
//! resource_id = "42"
//! name = "email"
//! ```

use crudfield_types::{ChannelName, FieldKey, DEFAULT_CHANNEL_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for field bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Prefix of field channel names (default: `crud`).
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Fields to bind on startup.
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldOptions>,
}

/// Describes a single field binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Resource type, e.g. `"user"`.
    pub resource_type: String,
    /// Resource instance id.
    pub resource_id: String,
    /// Field name.
    pub name: String,
}

impl FieldOptions {
    /// Create options for one field.
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            name: name.into(),
        }
    }

    /// The field key these options address.
    pub fn key(&self) -> FieldKey {
        FieldKey::new(&self.resource_type, &self.resource_id, &self.name)
    }
}

impl From<FieldKey> for FieldOptions {
    fn from(key: FieldKey) -> Self {
        Self {
            resource_type: key.resource_type,
            resource_id: key.resource_id,
            name: key.field,
        }
    }
}

fn default_channel_prefix() -> String {
    DEFAULT_CHANNEL_PREFIX.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            fields: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: Some(path.to_path_buf()),
            source: e,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: None,
            source: e,
        })
    }

    /// Set the channel prefix.
    pub fn with_channel_prefix(mut self, prefix: &str) -> Self {
        self.channel_prefix = prefix.to_string();
        self
    }

    /// Channel name for a field under this configuration.
    pub fn channel_name(&self, key: &FieldKey) -> ChannelName {
        ChannelName::for_field(&self.channel_prefix, key)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration.
    #[error("failed to parse config{}: {source}", file_suffix(.path))]
    ParseError {
        /// Path to the configuration file, if read from disk.
        path: Option<PathBuf>,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

fn file_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" file {}", path.display()),
        None => String::new(),
    }
}
