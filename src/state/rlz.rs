use super::rlzs_key;
use crate::access::ExclusiveLock;
use crate::error::{Result, RlzError};
use crate::model::types::{AccessPoint, OwnerId, MAX_RLZ_LENGTH};
use crate::storage::{Store, StoreValue};

/// Characters that may appear in a stored RLZ or deal code.
pub fn is_good_rlz_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'_' | b'-' | b'!' | b'@' | b'$' | b'*' | b'(' | b')' | b';' | b'.' | b'<' | b'>'
        )
}

/// Replaces every byte outside the RLZ character set with `.`.
///
/// Works on bytes, so a multi-byte character becomes several dots and the
/// result has the same byte length as the input.
pub fn normalize_rlz(raw: &str) -> String {
    raw.bytes()
        .map(|byte| if is_good_rlz_char(byte) { byte as char } else { '.' })
        .collect()
}

/// RLZ values of one owner, keyed by access point.
pub struct RlzStore<'a> {
    store: &'a dyn Store,
    owner: &'a OwnerId,
}

impl<'a> RlzStore<'a> {
    pub fn new(store: &'a dyn Store, owner: &'a OwnerId, _lock: &ExclusiveLock<'_>) -> Self {
        Self { store, owner }
    }

    /// Stored value, or `None` for unsupported points and unset values.
    pub fn get(&self, point: AccessPoint) -> Result<Option<String>> {
        if !point.is_supported() {
            return Ok(None);
        }
        let value = self.store.read_value(self.owner, &rlzs_key(), point.code())?;
        Ok(value
            .as_ref()
            .and_then(|value| value.as_text())
            .filter(|text| !text.is_empty())
            .map(str::to_string))
    }

    /// Stores a normalized value. An empty value clears the access point.
    pub fn set(&self, point: AccessPoint, value: &str) -> Result<()> {
        if !point.is_supported() {
            return Err(RlzError::UnsupportedAccessPoint(point.code().to_string()));
        }
        if value.len() > MAX_RLZ_LENGTH {
            tracing::warn!("RLZ for {} is {} bytes, not stored", point, value.len());
            return Err(RlzError::ValueTooLong {
                len: value.len(),
                max: MAX_RLZ_LENGTH,
            });
        }

        let key = rlzs_key();
        let normalized = normalize_rlz(value);
        if normalized.is_empty() {
            self.store.delete_value(self.owner, &key, point.code())?;
            if self.store.read_value(self.owner, &key, point.code())?.is_some() {
                tracing::warn!("RLZ for {} survived delete", point);
                return Err(RlzError::VerificationFailed(format!("{}/{}", key, point)));
            }
            return Ok(());
        }

        self.store
            .write_value(self.owner, &key, point.code(), StoreValue::Text(normalized))?;
        Ok(())
    }
}
