//! Human-readable order numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 7;

/// Order number of the form `ORD-YYYYMMDD-XXXXXXX`.
///
/// The date is the UTC creation date and the suffix is seven upper-case
/// base-36 characters drawn from a fresh UUID. Uniqueness is enforced by the
/// order store, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a new order number for the given instant.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self::from_parts(now, Uuid::new_v4())
    }

    fn from_parts(now: DateTime<Utc>, entropy: Uuid) -> Self {
        let mut value = entropy.as_u128();
        let mut suffix = [b'0'; SUFFIX_LEN];
        for slot in suffix.iter_mut().rev() {
            *slot = ALPHABET[(value % 36) as usize];
            value /= 36;
        }
        let suffix: String = suffix.iter().map(|&b| b as char).collect();
        Self(format!("ORD-{}-{}", now.format("%Y%m%d"), suffix))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
