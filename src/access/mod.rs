//! Access Control Module
//!
//! Serializes every store-touching operation behind one exclusive lock and
//! answers whether an owner may read or write its namespace.
//!
//! ## Core Concepts
//! - **Gate**: an [`AccessGate`] implementation owns the lock and the
//!   permission checks. The library never talks to the lock primitive directly.
//! - **Guard**: [`lock`] returns an [`ExclusiveLock`] that releases on drop.
//!   Internal components take `&ExclusiveLock` as a constructor argument, so
//!   holding one is proof that the lock is already held. The lock is not
//!   re-entrant: a public operation acquires it exactly once.
//!
//! ## Submodules
//! - **`gate`**: `ProcessGate`, a mutex/condvar lock with a bounded wait and an
//!   in-memory permission table.
//! - **`file_lock`**: `FileLockGate`, which adds a cross-process lock file and
//!   derives write permission from the store directory.

pub mod file_lock;
pub mod gate;


use crate::error::{Result, RlzError};
use crate::model::types::OwnerId;

use std::time::Duration;

/// How long a caller waits for the exclusive lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Lock and permission provider shared by every public operation.
pub trait AccessGate: Send + Sync {
    /// Blocks until the lock is held or the gate's timeout elapses.
    fn acquire_exclusive(&self) -> Result<()>;

    fn release_exclusive(&self);

    fn owner_has_access(&self, owner: &OwnerId, write: bool) -> bool;

    /// Makes the shared state usable by every local account.
    ///
    /// Idempotent. Returns `true` when something had to be changed.
    fn ensure_broad_access(&self) -> Result<bool>;
}

/// RAII guard for the gate's exclusive lock.
pub struct ExclusiveLock<'a> {
    gate: &'a dyn AccessGate,
}

impl<'a> ExclusiveLock<'a> {
    /// Fails with `AccessDenied` unless `owner` has the requested access.
    pub fn require_access(&self, owner: &OwnerId, write: bool) -> Result<()> {
        if self.gate.owner_has_access(owner, write) {
            Ok(())
        } else {
            tracing::debug!("Access denied for {} (write={})", owner, write);
            Err(RlzError::AccessDenied {
                owner: owner.clone(),
                write,
            })
        }
    }

    pub fn has_access(&self, owner: &OwnerId, write: bool) -> bool {
        self.gate.owner_has_access(owner, write)
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        self.gate.release_exclusive();
    }
}

/// Acquires the exclusive lock on `gate`.
pub fn lock(gate: &dyn AccessGate) -> Result<ExclusiveLock<'_>> {
    gate.acquire_exclusive()?;
    Ok(ExclusiveLock { gate })
}
