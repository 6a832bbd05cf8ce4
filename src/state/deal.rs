use super::rlz::normalize_rlz;
use super::{dcc_key, machine_key, DCC_VALUE, MACHINE_ID_VALUE};
use crate::access::ExclusiveLock;
use crate::error::{Result, RlzError};
use crate::model::buffer::CappedString;
use crate::model::types::{OwnerId, MAX_DCC_LENGTH};
use crate::ping::checksum::checksum_offset;
use crate::ping::protocol::{DCC_CGI_VARIABLE, SET_DCC_RESPONSE_VARIABLE};
use crate::storage::{Store, StoreValue};

/// Machine-wide deal confirmation code and machine id.
///
/// Both live under the machine owner regardless of which user is calling.
pub struct DealCodeStore<'a> {
    store: &'a dyn Store,
    owner: OwnerId,
}

impl<'a> DealCodeStore<'a> {
    pub fn new(store: &'a dyn Store, _lock: &ExclusiveLock<'_>) -> Self {
        Self {
            store,
            owner: OwnerId::machine(),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Stores a normalized code. An empty code clears it.
    pub fn set(&self, dcc: &str) -> Result<()> {
        if dcc.len() > MAX_DCC_LENGTH {
            tracing::warn!("Deal code is {} bytes, not stored", dcc.len());
            return Err(RlzError::ValueTooLong {
                len: dcc.len(),
                max: MAX_DCC_LENGTH,
            });
        }

        let normalized = normalize_rlz(dcc);
        if normalized.is_empty() {
            return self.clear();
        }
        self.store.write_value(
            &self.owner,
            &dcc_key(),
            DCC_VALUE,
            StoreValue::Text(normalized),
        )?;
        Ok(())
    }

    pub fn get(&self) -> Result<Option<String>> {
        let value = self.store.read_value(&self.owner, &dcc_key(), DCC_VALUE)?;
        Ok(value
            .as_ref()
            .and_then(|value| value.as_text())
            .filter(|text| !text.is_empty())
            .map(str::to_string))
    }

    /// Writes `dcc=<code>` into `out`.
    pub fn as_cgi(&self, out: &mut CappedString) -> Result<()> {
        out.reset()?;
        let dcc = self.get()?.ok_or(RlzError::NotFound)?;
        out.fill(&format!("{}={}", DCC_CGI_VARIABLE, dcc))
    }

    pub fn clear(&self) -> Result<()> {
        let key = dcc_key();
        self.store.delete_value(&self.owner, &key, DCC_VALUE)?;
        if self.store.read_value(&self.owner, &key, DCC_VALUE)?.is_some() {
            tracing::warn!("Deal code survived delete");
            return Err(RlzError::VerificationFailed(format!("{}/{}", key, DCC_VALUE)));
        }
        Ok(())
    }

    /// Persistent identifier of this machine, created on first use.
    ///
    /// The id is a random v4 UUID stored under the machine owner. It is not
    /// derived from any hardware or OS identity, so wiping the store yields a
    /// new id.
    pub fn machine_id(&self) -> Result<String> {
        let key = machine_key();
        if let Some(StoreValue::Text(id)) = self.store.read_value(&self.owner, &key, MACHINE_ID_VALUE)? {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        self.store
            .write_value(&self.owner, &key, MACHINE_ID_VALUE, StoreValue::Text(id.clone()))?;
        tracing::info!("Generated machine id {}", id);
        Ok(id)
    }
}

/// Pulls a deal code out of the checksummed part of a ping response.
///
/// With `set_value` the new code (`set_dcc: ...`) is returned, otherwise the
/// server's echo of the current one (`dcc: ...`). Only the first matching
/// line counts. Returns `None` for an invalid response, a missing line or an
/// over-long value.
pub fn extract_from_response(response: &str, set_value: bool) -> Option<String> {
    let offset = checksum_offset(response).ok()?;
    let wanted = if set_value {
        SET_DCC_RESPONSE_VARIABLE
    } else {
        DCC_CGI_VARIABLE
    };

    for line in response[..offset].split('\n') {
        let Some(separator) = line.find(": ") else {
            continue;
        };
        if line[..separator].trim() != wanted {
            continue;
        }

        let value = line[separator + 2..].trim_start();
        let value = value
            .split(|c: char| c.is_ascii_whitespace())
            .next()
            .unwrap_or_default();
        if value.len() > MAX_DCC_LENGTH {
            tracing::debug!("Rejecting {}-byte {} value", value.len(), wanted);
            return None;
        }
        return Some(value.to_string());
    }
    None
}

/// Decides whether a ping response carries a new deal code for this machine.
///
/// The server must echo the code it believes is current (a missing echo is
/// read as empty) and that echo must equal `stored`. Only then is a
/// `set_dcc` value that differs from `stored` returned.
pub fn new_code_from_ping_response(response: &str, stored: Option<&str>) -> Result<Option<String>> {
    checksum_offset(response)?;

    let stored = stored.unwrap_or_default();
    let echo = extract_from_response(response, false).unwrap_or_default();
    if echo != stored {
        tracing::debug!("Deal code echo '{}' does not match stored '{}'", echo, stored);
        return Ok(None);
    }

    Ok(extract_from_response(response, true).filter(|new_code| new_code != stored))
}
