use crate::error::RlzError;

/// Caller-sized output for CGI fragments and other bounded strings.
///
/// `capacity` follows the C convention of the wire protocol: it
/// counts a terminator slot, so a value of `n` bytes needs a capacity of at
/// least `n + 1`. A write either stores the complete value or fails with
/// `BufferTooSmall` and leaves the buffer empty. It never truncates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedString {
    value: String,
    capacity: usize,
}

impl CappedString {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            value: String::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }

    /// Largest value length this buffer can hold.
    pub fn max_len(&self) -> usize {
        self.capacity.saturating_sub(1)
    }

    /// Fails with `InvalidArgument` for a zero-capacity buffer, clearing it otherwise.
    pub fn reset(&mut self) -> Result<(), RlzError> {
        self.value.clear();
        if self.capacity == 0 {
            return Err(RlzError::InvalidArgument("output buffer has zero capacity"));
        }
        Ok(())
    }

    /// Replaces the contents with `value` if it fits.
    pub fn fill(&mut self, value: &str) -> Result<(), RlzError> {
        self.value.clear();
        if value.len() > self.max_len() {
            return Err(RlzError::BufferTooSmall {
                needed: value.len() + 1,
                capacity: self.capacity,
            });
        }
        self.value.push_str(value);
        Ok(())
    }

    pub fn into_string(self) -> String {
        self.value
    }
}
