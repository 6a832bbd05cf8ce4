use super::protocol::{EVENTS_PING_INTERVAL, NO_EVENTS_PING_INTERVAL};
use crate::access::ExclusiveLock;
use crate::error::{Result, RlzError};
use crate::model::types::{OwnerId, Product};
use crate::state::events::EventStore;
use crate::state::ping_times_key;
use crate::storage::{Store, StoreValue};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: u64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Last-ping bookkeeping and the ping throttle.
pub struct PingScheduler<'a> {
    store: &'a dyn Store,
    owner: &'a OwnerId,
    clock: &'a dyn Clock,
    events: EventStore<'a>,
}

impl<'a> PingScheduler<'a> {
    pub fn new(
        store: &'a dyn Store,
        owner: &'a OwnerId,
        clock: &'a dyn Clock,
        lock: &ExclusiveLock<'_>,
    ) -> Self {
        Self {
            store,
            owner,
            clock,
            events: EventStore::new(store, owner, lock),
        }
    }

    pub fn last_ping_time(&self, product: Product) -> Result<Option<u64>> {
        let value = self
            .store
            .read_value(self.owner, &ping_times_key(), product.name())?;
        Ok(value.and_then(|value| value.as_number()))
    }

    /// Whether enough time has passed since the last ping of `product`.
    ///
    /// The minimum spacing is one day while events are pending and a week
    /// otherwise. A clock that moved backwards always allows a ping.
    pub fn is_ping_time(&self, product: Product, skip_throttle: bool) -> Result<bool> {
        if skip_throttle {
            return Ok(true);
        }
        let Some(last_ping) = self.last_ping_time(product)? else {
            return Ok(true);
        };

        let now = self.clock.now_millis();
        if now < last_ping {
            tracing::debug!("Clock moved back since last ping of {}", product);
            return Ok(true);
        }

        let interval = if self.events.has_events(product)? {
            EVENTS_PING_INTERVAL
        } else {
            NO_EVENTS_PING_INTERVAL
        };
        Ok(now - last_ping >= interval.as_millis() as u64)
    }

    pub fn update_last_ping_time(&self, product: Product) -> Result<()> {
        self.store.write_value(
            self.owner,
            &ping_times_key(),
            product.name(),
            StoreValue::Number(self.clock.now_millis()),
        )?;
        Ok(())
    }

    pub fn clear_last_ping_time(&self, product: Product) -> Result<()> {
        let key = ping_times_key();
        self.store.delete_value(self.owner, &key, product.name())?;
        if self.last_ping_time(product)?.is_some() {
            tracing::warn!("Last ping time of {} survived delete", product);
            return Err(RlzError::VerificationFailed(format!("{}/{}", key, product)));
        }
        Ok(())
    }
}
