//! Persistent Storage Module
//!
//! Namespaced, hierarchical key-value storage scoped by owner. The library only
//! relies on the operations of the [`Store`] trait; any backend that provides
//! "namespaced, per-owner, delete-if-empty" semantics can sit underneath.
//!
//! ## Core Concepts
//! - **Owner**: every call is parameterized by an [`OwnerId`]; owners never see
//!   each other's keys.
//! - **Keys**: a [`KeyPath`] names a node in a tree. Writing a value creates the
//!   key and all of its ancestors.
//! - **Values**: named [`StoreValue`]s hang off a key, either text or a number.
//!
//! ## Backends
//! - **`memory`**: `MemoryStore`, concurrent maps held in process. Used by tests.
//! - **`file`**: `FileStore`, one JSON document per owner under a root directory.

pub mod file;
pub mod memory;


use crate::model::types::OwnerId;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// A value attached to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Number(u64),
    Text(String),
}

impl StoreValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoreValue::Text(text) => Some(text),
            StoreValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            StoreValue::Number(number) => Some(*number),
            StoreValue::Text(_) => None,
        }
    }
}

/// Path of a key in the store tree. Segments must not contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn new(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn parent(&self) -> Option<KeyPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &KeyPath) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    /// True for `other` itself and everything below it.
    pub fn is_within(&self, other: &KeyPath) -> bool {
        self == other || self.is_descendant_of(other)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Owner-scoped hierarchical key-value storage.
///
/// Implementations must be safe to share between threads. Deleting something
/// that does not exist is not an error.
pub trait Store: Send + Sync {
    /// Creates `key` and its ancestors if missing.
    fn create_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError>;

    fn key_exists(&self, owner: &OwnerId, key: &KeyPath) -> Result<bool, StoreError>;

    fn read_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
    ) -> Result<Option<StoreValue>, StoreError>;

    /// Writes a value, creating the key first when needed.
    fn write_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
        value: StoreValue,
    ) -> Result<(), StoreError>;

    fn delete_value(&self, owner: &OwnerId, key: &KeyPath, name: &str) -> Result<(), StoreError>;

    /// Values under `key` in ascending name order, or `None` if the key is missing.
    fn enumerate_values(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
    ) -> Result<Option<Vec<(String, StoreValue)>>, StoreError>;

    /// Deletes `key` together with all of its subkeys and values.
    fn delete_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError>;

    /// Deletes `key` only if it has neither values nor subkeys.
    fn delete_key_if_empty(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError>;
}
