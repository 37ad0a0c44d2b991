//! Item key encoding and generation.
//!
//! # Invariants
//! - Keys are 8-byte big-endian nanosecond timestamps, so byte order equals
//!   numeric order.
//! - One `KeyGenerator` never hands out the same key twice, even when the
//!   wall clock stalls or steps backwards.

use super::validation::ValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Encoded key width in bytes.
pub const ITEM_KEY_LEN: usize = 8;

/// Opaque, order-preserving item key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey([u8; ITEM_KEY_LEN]);

impl ItemKey {
    pub const MIN: ItemKey = ItemKey([0; ITEM_KEY_LEN]);
    pub const MAX: ItemKey = ItemKey([u8::MAX; ITEM_KEY_LEN]);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos.to_be_bytes())
    }

    pub fn as_nanos(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Builds a key from raw storage bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let raw: [u8; ITEM_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ValidationError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Decodes the standard-base64 transport form.
    pub fn from_base64(text: &str) -> Result<Self, ValidationError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|err| ValidationError::InvalidKeyEncoding(err.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Strictly monotonic key source backed by the system clock.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    last_issued: AtomicU64,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a key greater than every key previously issued by `self`.
    pub fn next_key(&self) -> ItemKey {
        let now = now_nanos();
        let mut previous = self.last_issued.load(Ordering::Acquire);
        loop {
            let candidate = now.max(previous.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ItemKey::from_nanos(candidate),
                Err(actual) => previous = actual,
            }
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
