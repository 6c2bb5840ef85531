//! Shared channel tracking.
//!
//! Several bindings may watch the same field, so a socket keeps one channel
//! per name. [`ChannelRegistry`] maps names to channel handles; each channel
//! gets a [`ReleaseHandle`] it uses to drop itself from the registry when it
//! is destroyed.

use crudfield_types::ChannelName;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

type ChannelMap<C> = DashMap<ChannelName, Arc<C>>;

/// Name → channel map shared between a socket and its channels.
pub struct ChannelRegistry<C> {
    channels: Arc<ChannelMap<C>>,
}

impl<C> ChannelRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Return the channel for `name`, creating it if absent.
    ///
    /// The returned flag is `true` when a new channel was created.
    pub fn get_or_insert_with<F>(&self, name: &ChannelName, create: F) -> (Arc<C>, bool)
    where
        F: FnOnce(ReleaseHandle<C>) -> C,
    {
        if let Some(existing) = self.channels.get(name) {
            return (Arc::clone(existing.value()), false);
        }

        let mut created = false;
        let entry = self.channels.entry(name.clone()).or_insert_with(|| {
            created = true;
            Arc::new(create(ReleaseHandle {
                name: name.clone(),
                channels: Arc::downgrade(&self.channels),
            }))
        });
        (Arc::clone(entry.value()), created)
    }

    /// Look up a channel by name.
    pub fn get(&self, name: &ChannelName) -> Option<Arc<C>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Handles of all registered channels.
    pub fn channels(&self) -> Vec<Arc<C>> {
        self.channels.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Names of all registered channels, sorted.
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<_> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl<C> Default for ChannelRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ChannelRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl<C> std::fmt::Debug for ChannelRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .finish()
    }
}

/// Lets a channel remove itself from the registry that created it.
///
/// Holds the registry weakly, so a channel outliving its socket does not
/// keep the map alive.
pub struct ReleaseHandle<C> {
    name: ChannelName,
    channels: Weak<ChannelMap<C>>,
}

impl<C> ReleaseHandle<C> {
    /// Remove the channel from the registry. Returns `false` if the
    /// registry is gone or the name was not registered.
    pub fn release(&self) -> bool {
        match self.channels.upgrade() {
            Some(channels) => channels.remove(&self.name).is_some(),
            None => false,
        }
    }
}

impl<C> std::fmt::Debug for ReleaseHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("name", &self.name)
            .finish()
    }
}
