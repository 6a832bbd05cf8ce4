use super::protocol::{CHECKSUM_FIELD, MAX_PING_RESPONSE_LENGTH};
use crate::error::{Result, RlzError};

/// CRC-32 (IEEE) of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Lenient hex parse used for the checksum field.
///
/// Surrounding whitespace and a `0x` prefix are accepted. Parsing stops at the
/// first non-hex character, so `"12f 121"` is `0x12f` and `"g12f"` is `0`.
pub fn hex_string_to_integer(text: &str) -> u32 {
    let text = text.trim_start();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    let mut value: u32 = 0;
    for (index, c) in text.char_indices() {
        match c.to_digit(16) {
            Some(digit) => value = value.wrapping_mul(16).wrapping_add(digit),
            None => {
                if !text[index..].trim().is_empty() {
                    tracing::debug!("Checksum '{}' contains non-hex characters", text.trim());
                }
                break;
            }
        }
    }
    value
}

/// Validates the checksum of a ping response.
///
/// Returns the byte offset where the checksummed message ends: the index of
/// the `\n` that starts the checksum line, or `0` for a response that
/// consists of the checksum line alone.
pub fn checksum_offset(response: &str) -> Result<usize> {
    if response.is_empty() {
        return Err(RlzError::InvalidArgument("empty ping response"));
    }
    if response.len() > MAX_PING_RESPONSE_LENGTH {
        tracing::warn!("Ping response is {} bytes, too long to parse", response.len());
        return Err(RlzError::ResponseTooLong {
            len: response.len(),
            max: MAX_PING_RESPONSE_LENGTH,
        });
    }

    let marker = format!("\n{}", CHECKSUM_FIELD);
    let (offset, field_start, calculated) = match response.find(&marker) {
        // The message includes the newline that opens the checksum line.
        Some(index) => (index, index + marker.len(), crc32(&response.as_bytes()[..=index])),
        None if response.starts_with(CHECKSUM_FIELD) => (0, CHECKSUM_FIELD.len(), crc32(b"")),
        None => return Err(RlzError::ChecksumMismatch),
    };

    let field_end = response[field_start..]
        .find('\n')
        .map(|end| field_start + end)
        .unwrap_or(response.len());
    let received = hex_string_to_integer(response[field_start..field_end].trim());

    if received != calculated {
        tracing::debug!(
            "Checksum mismatch: received {:08x}, calculated {:08x}",
            received,
            calculated
        );
        return Err(RlzError::ChecksumMismatch);
    }
    Ok(offset)
}

pub fn is_ping_response_valid(response: &str) -> bool {
    checksum_offset(response).is_ok()
}
