use super::{KeyPath, Store, StoreError, StoreValue};
use crate::model::types::OwnerId;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

type Namespace = DashMap<KeyPath, BTreeMap<String, StoreValue>>;

/// In-process store.
///
/// Structure: `Owner -> Key path -> Value name -> Value`. A key exists exactly
/// when it has an entry in its owner's namespace, so creating a key inserts
/// empty entries for it and for every ancestor.
#[derive(Clone, Default)]
pub struct MemoryStore {
    owners: Arc<DashMap<OwnerId, Namespace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held for `owner`.
    pub fn key_count(&self, owner: &OwnerId) -> usize {
        self.owners
            .get(owner)
            .map(|namespace| namespace.len())
            .unwrap_or(0)
    }

    fn ensure_key(&self, owner: &OwnerId, key: &KeyPath) {
        let namespace = self.owners.entry(owner.clone()).or_default();
        let mut current = Some(key.clone());
        while let Some(path) = current {
            if path.segments().is_empty() {
                break;
            }
            current = path.parent();
            namespace.entry(path).or_default();
        }
    }
}

impl Store for MemoryStore {
    fn create_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        self.ensure_key(owner, key);
        Ok(())
    }

    fn key_exists(&self, owner: &OwnerId, key: &KeyPath) -> Result<bool, StoreError> {
        Ok(self
            .owners
            .get(owner)
            .map(|namespace| namespace.contains_key(key))
            .unwrap_or(false))
    }

    fn read_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
    ) -> Result<Option<StoreValue>, StoreError> {
        if let Some(namespace) = self.owners.get(owner) {
            if let Some(values) = namespace.get(key) {
                return Ok(values.get(name).cloned());
            }
        }
        Ok(None)
    }

    fn write_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
        value: StoreValue,
    ) -> Result<(), StoreError> {
        self.ensure_key(owner, key);
        if let Some(namespace) = self.owners.get(owner) {
            if let Some(mut values) = namespace.get_mut(key) {
                values.insert(name.to_string(), value);
            }
        }
        tracing::trace!("Wrote {}/{} for {}", key, name, owner);
        Ok(())
    }

    fn delete_value(&self, owner: &OwnerId, key: &KeyPath, name: &str) -> Result<(), StoreError> {
        if let Some(namespace) = self.owners.get(owner) {
            if let Some(mut values) = namespace.get_mut(key) {
                values.remove(name);
            }
        }
        Ok(())
    }

    fn enumerate_values(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
    ) -> Result<Option<Vec<(String, StoreValue)>>, StoreError> {
        let Some(namespace) = self.owners.get(owner) else {
            return Ok(None);
        };
        let entries = namespace.get(key).map(|values| {
            values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        });
        Ok(entries)
    }

    fn delete_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        if let Some(namespace) = self.owners.get(owner) {
            namespace.retain(|path, _| !path.is_within(key));
        }
        Ok(())
    }

    fn delete_key_if_empty(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        let Some(namespace) = self.owners.get(owner) else {
            return Ok(());
        };

        let has_values = match namespace.get(key) {
            Some(values) => !values.is_empty(),
            // Key does not exist, nothing to do.
            None => return Ok(()),
        };
        if has_values {
            return Ok(());
        }

        let has_subkeys = namespace
            .iter()
            .any(|entry| entry.key().is_descendant_of(key));
        if has_subkeys {
            return Ok(());
        }

        namespace.remove(key);
        tracing::debug!("Deleted empty key {} for {}", key, owner);
        Ok(())
    }
}
