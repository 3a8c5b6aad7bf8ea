// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use dashmap::DashMap;

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidName { name: String, registry: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{} registration failed: The name '{name}' is invalid (empty or whitespace-only names are not allowed).", registry)
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
            registry: registry_name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Thread-safe name to item table. Registration is last-write-wins so that hosts
/// can shadow builtins at runtime.
pub struct Registry<T> {
    inner: DashMap<String, T>,
    name: String,
}

impl<T: Clone> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: &str) -> Self {
        Self {
            inner: DashMap::new(),
            name: registry_name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item, replacing any previous item of the same name.
    /// Returns the replaced item.
    pub fn register(&self, name: &str, item: T) -> Result<Option<T>, RegistryError> {
        validate_name(name, &self.name)?;
        Ok(self.inner.insert(name.to_string(), item))
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.inner.get(name).map(|entry| entry.value().clone())
    }

    /// Remove an item by name. Returns the removed item if it existed.
    pub fn remove(&self, name: &str) -> Option<T> {
        self.inner.remove(name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// List all registered item names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of all (name, item) pairs.
    pub fn entries(&self) -> Vec<(String, T)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<T: Clone> Clone for Registry<T> {
    fn clone(&self) -> Self {
        let copy = Registry::new(&self.name);
        for (name, item) in self.entries() {
            copy.inner.insert(name, item);
        }
        copy
    }
}
