use super::{AccessGate, DEFAULT_LOCK_TIMEOUT};
use crate::error::{Result, RlzError};
use crate::model::types::OwnerId;

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    Denied,
}

/// In-process gate.
///
/// The lock is a flag behind a mutex; waiters park on a condvar for at most
/// `timeout`. Owners are allowed everything unless restricted through
/// [`ProcessGate::restrict`].
pub struct ProcessGate {
    held: Mutex<bool>,
    released: Condvar,
    timeout: Duration,
    restrictions: DashMap<OwnerId, Permission>,
    broadened: AtomicBool,
}

impl Default for ProcessGate {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl ProcessGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            timeout,
            restrictions: DashMap::new(),
            broadened: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn restrict(&self, owner: OwnerId, permission: Permission) {
        self.restrictions.insert(owner, permission);
    }

    pub fn unrestrict(&self, owner: &OwnerId) {
        self.restrictions.remove(owner);
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccessGate for ProcessGate {
    fn acquire_exclusive(&self) -> Result<()> {
        // A panic while holding the flag does not corrupt it.
        let guard = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut held, wait) = self
            .released
            .wait_timeout_while(guard, self.timeout, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);

        if wait.timed_out() && *held {
            tracing::warn!("Exclusive lock not acquired within {:?}", self.timeout);
            return Err(RlzError::LockTimeout(self.timeout));
        }
        *held = true;
        Ok(())
    }

    fn release_exclusive(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_one();
    }

    fn owner_has_access(&self, owner: &OwnerId, write: bool) -> bool {
        match self.restrictions.get(owner).map(|entry| *entry.value()) {
            None => true,
            Some(Permission::ReadOnly) => !write,
            Some(Permission::Denied) => false,
        }
    }

    fn ensure_broad_access(&self) -> Result<bool> {
        Ok(!self.broadened.swap(true, Ordering::SeqCst))
    }
}
