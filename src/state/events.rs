use super::{events_key, stateful_events_key};
use crate::access::ExclusiveLock;
use crate::error::{Result, RlzError};
use crate::model::buffer::CappedString;
use crate::model::types::{AccessPoint, Event, EventToken, OwnerId, Product};
use crate::ping::protocol::{EVENTS_CGI_VARIABLE, MAX_CGI_LENGTH};
use crate::storage::{KeyPath, Store, StoreValue};

/// Per-product event sets of one owner.
///
/// Transient events are reported on the next ping and cleared once the server
/// acknowledges them. Stateful events are never reported again: recording a
/// transient event that is already stateful is a silent no-op.
pub struct EventStore<'a> {
    store: &'a dyn Store,
    owner: &'a OwnerId,
}

impl<'a> EventStore<'a> {
    pub fn new(store: &'a dyn Store, owner: &'a OwnerId, _lock: &ExclusiveLock<'_>) -> Self {
        Self { store, owner }
    }

    pub fn record(&self, product: Product, point: AccessPoint, event: Event) -> Result<()> {
        let token = EventToken::new(point, event)?;
        if self.is_stateful(product, &token)? {
            tracing::debug!("Skipping {} for {}: already stateful", token, product);
            return Ok(());
        }

        self.store.write_value(
            self.owner,
            &events_key(product),
            &token.encode(),
            StoreValue::Number(1),
        )?;
        Ok(())
    }

    /// Marks an event as stateful and drops any pending transient copy.
    pub fn record_stateful(&self, product: Product, point: AccessPoint, event: Event) -> Result<()> {
        let token = EventToken::new(point, event)?;
        let name = token.encode();

        self.store.write_value(
            self.owner,
            &stateful_events_key(product),
            &name,
            StoreValue::Number(1),
        )?;
        self.delete_verified(&events_key(product), &name)
    }

    pub fn clear(&self, product: Product, point: AccessPoint, event: Event) -> Result<()> {
        let token = EventToken::new(point, event)?;
        self.delete_verified(&events_key(product), &token.encode())
    }

    pub fn is_stateful(&self, product: Product, token: &EventToken) -> Result<bool> {
        let value = self
            .store
            .read_value(self.owner, &stateful_events_key(product), &token.encode())?;
        Ok(value.is_some())
    }

    /// Pending transient events in store enumeration order. Names that do not
    /// decode to a token are skipped.
    pub fn tokens(&self, product: Product) -> Result<Vec<EventToken>> {
        let Some(values) = self.store.enumerate_values(self.owner, &events_key(product))? else {
            return Ok(Vec::new());
        };

        Ok(values
            .into_iter()
            .filter_map(|(name, _)| {
                let token = EventToken::decode(&name);
                if token.is_none() {
                    tracing::debug!("Ignoring unreadable event entry '{}'", name);
                }
                token
            })
            .collect())
    }

    pub fn has_events(&self, product: Product) -> Result<bool> {
        Ok(!self.tokens(product)?.is_empty())
    }

    /// Writes `events=TOK1,TOK2,...` into `out`.
    pub fn as_cgi(&self, product: Product, out: &mut CappedString) -> Result<()> {
        out.reset()?;

        let prefix = format!("{}=", EVENTS_CGI_VARIABLE);
        if out.capacity() <= prefix.len() {
            return Err(RlzError::BufferTooSmall {
                needed: prefix.len() + 1,
                capacity: out.capacity(),
            });
        }

        let tokens = self.tokens(product)?;
        if tokens.is_empty() {
            return Err(RlzError::NotFound);
        }

        let joined: Vec<String> = tokens.iter().map(EventToken::encode).collect();
        let cgi = format!("{}{}", prefix, joined.join(","));
        if cgi.len() >= MAX_CGI_LENGTH {
            return Err(RlzError::BufferTooSmall {
                needed: cgi.len() + 1,
                capacity: MAX_CGI_LENGTH,
            });
        }
        out.fill(&cgi)
    }

    /// Removes both event sets of `product`.
    pub fn clear_all(&self, product: Product) -> Result<()> {
        for key in [events_key(product), stateful_events_key(product)] {
            self.store.delete_key(self.owner, &key)?;
            if self.store.key_exists(self.owner, &key)? {
                tracing::warn!("Key {} survived delete for {}", key, self.owner);
                return Err(RlzError::VerificationFailed(key.to_string()));
            }
        }
        Ok(())
    }

    fn delete_verified(&self, key: &KeyPath, name: &str) -> Result<()> {
        self.store.delete_value(self.owner, key, name)?;
        if self.store.read_value(self.owner, key, name)?.is_some() {
            tracing::warn!("Value {}/{} survived delete for {}", key, name, self.owner);
            return Err(RlzError::VerificationFailed(format!("{}/{}", key, name)));
        }
        Ok(())
    }
}
