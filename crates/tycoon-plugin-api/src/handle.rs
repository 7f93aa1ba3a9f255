//! Owner-tagged registries with generation-counted handles.
//!
//! Hooks, intervals and sockets all live in an [`OwnedRegistry`]. Every entry
//! records the plugin that created it so a stopping plugin's entries can be
//! revoked in one call. Handles start at 1; 0 is never issued and is the
//! "invalid handle" value scripts may pass around.

use std::collections::HashMap;

use crate::types::PluginId;

/// Opaque handle to a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Rebuild a handle from the number a script holds. 0 is invalid.
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct OwnedRegistry<T> {
    items: HashMap<u64, (PluginId, T)>,
    order: Vec<u64>,
    generation: u64,
}

impl<T> Default for OwnedRegistry<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
            generation: 0,
        }
    }
}

impl<T> OwnedRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry and return its handle.
    pub fn insert(&mut self, owner: PluginId, item: T) -> Handle {
        self.generation += 1;
        let id = self.generation;
        self.items.insert(id, (owner, item));
        self.order.push(id);
        Handle(id)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.items.get(&handle.0).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.items.get_mut(&handle.0).map(|(_, t)| t)
    }

    pub fn owner_of(&self, handle: Handle) -> Option<PluginId> {
        self.items.get(&handle.0).map(|(owner, _)| *owner)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.items.contains_key(&handle.0)
    }

    /// Remove an entry by handle.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let (_, item) = self.items.remove(&handle.0)?;
        self.order.retain(|&id| id != handle.0);
        Some(item)
    }

    /// Remove an entry only if `owner` created it.
    pub fn remove_owned(&mut self, owner: PluginId, handle: Handle) -> Option<T> {
        if self.owner_of(handle)? != owner {
            return None;
        }
        self.remove(handle)
    }

    /// Iterate over all entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, PluginId, &T)> {
        self.order.iter().filter_map(move |&id| {
            self.items
                .get(&id)
                .map(|(owner, t)| (Handle(id), *owner, t))
        })
    }

    /// Get all handles for a plugin, in registration order.
    pub fn handles_for(&self, owner: PluginId) -> Vec<Handle> {
        self.iter()
            .filter(|(_, o, _)| *o == owner)
            .map(|(h, _, _)| h)
            .collect()
    }

    /// Remove all entries for a plugin, returning them in registration order.
    pub fn remove_owner(&mut self, owner: PluginId) -> Vec<T> {
        self.handles_for(owner)
            .into_iter()
            .filter_map(|h| self.remove(h))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
