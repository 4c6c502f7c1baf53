//! Thread-safe name-keyed registries.
//!
//! [`Registry`] is the building block for every pluggable catalog in the engine:
//! it stores plain values or constructor functions under unique, non-empty names.
//! The component catalogs in [`components`] specialize it for sources,
//! transformers and destinations.
//!
//! Registries are always constructed explicitly and handed to whoever needs
//! them; there is no process-wide default instance.

pub mod components;

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

pub use components::{
    ComponentConfig, ComponentRegistry, DestinationFactory, DestinationRegistry, SourceFactory,
    SourceRegistry, TransformerFactory, TransformerRegistry,
};

use crate::Result;

/// Errors reported by registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Names must be non-empty.
    #[error("name cannot be empty")]
    EmptyName,
    /// No entry exists under the given name.
    #[error("item not found: {0}")]
    NotFound(String),
}

/// A thread-safe registry mapping names to values.
///
/// Reads share the lock; writes are exclusive. Registering an existing name
/// overwrites the previous value.
pub struct Registry<T> {
    items: RwLock<HashMap<String, T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Register `item` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, item: T) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName.into());
        }
        self.items.write().insert(name, item);
        Ok(())
    }

    /// Apply `updater` to the current value of `name` and store the result.
    ///
    /// The entry is left untouched when the updater fails.
    pub fn update<F>(&self, name: &str, updater: F) -> Result<()>
    where
        F: FnOnce(&T) -> Result<T>,
    {
        let mut items = self.items.write();
        let current = items
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let updated = updater(current)?;
        items.insert(name.to_string(), updated);
        Ok(())
    }

    /// Remove `name`. Returns `true` if an entry was removed.
    pub fn delete(&self, name: &str) -> bool {
        self.items.write().remove(name).is_some()
    }

    /// Names of all entries, sorted.
    pub fn get_all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.items.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.items.write().clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: Clone> Registry<T> {
    /// Get a clone of the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<T> {
        self.items.read().get(name).cloned()
    }

    /// Get the value stored under `name`, creating it with `creator` if absent.
    ///
    /// Uses check-lock-check: a shared-lock lookup first, then a second lookup
    /// under the exclusive lock before the creator runs. Concurrent callers
    /// racing on the same absent name therefore run the creator at most once.
    /// A failing creator leaves the registry unchanged.
    pub fn get_or_create<F>(&self, name: &str, creator: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if name.is_empty() {
            return Err(RegistryError::EmptyName.into());
        }

        if let Some(item) = self.items.read().get(name) {
            return Ok(item.clone());
        }

        let mut items = self.items.write();
        if let Some(item) = items.get(name) {
            return Ok(item.clone());
        }

        let item = creator()?;
        items.insert(name.to_string(), item.clone());
        Ok(item)
    }
}
