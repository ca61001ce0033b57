//! Document records and keys

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};

/// Partition used when the caller does not name one
pub const DEFAULT_PARTITION: &str = "default";

/// Maximum length of a partition id or document id, in characters
pub const MAX_KEY_CHARS: usize = 255;

/// `(partition_id, id)` primary key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub partition: String,
    pub id: String,
}

impl DocumentKey {
    /// Build a key, validating both parts
    pub fn new(partition: impl Into<String>, id: impl Into<String>) -> StoreResult<Self> {
        let key = Self {
            partition: partition.into(),
            id: id.into(),
        };
        validate_part("partition", &key.partition)?;
        validate_part("id", &key.id)?;
        Ok(key)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.id)
    }
}

/// Validate a partition id on its own
pub fn validate_partition(partition: &str) -> StoreResult<()> {
    validate_part("partition", partition)
}

fn validate_part(what: &str, value: &str) -> StoreResult<()> {
    let chars = value.chars().count();
    if chars == 0 || chars > MAX_KEY_CHARS {
        return Err(StoreError::InvalidKey(format!(
            "{} must be 1-{} characters, got {}",
            what, MAX_KEY_CHARS, chars
        )));
    }
    Ok(())
}

/// A stored document with its lifecycle timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub value: serde_json::Value,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(value: serde_json::Value, now: DateTime<Utc>, expires: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            created: now,
            updated: None,
            expires,
        }
    }

    /// Expired once `now >= expires`; records without expiry never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(at) if now >= at)
    }

    /// Replace the value, keeping `created`
    pub fn replace(&mut self, value: serde_json::Value, now: DateTime<Utc>, expires: Option<DateTime<Utc>>) {
        self.value = value;
        self.updated = Some(now);
        self.expires = expires;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_bounds() {
        assert!(DocumentKey::new("p", "k").is_ok());
        assert!(DocumentKey::new("", "k").is_err());
        assert!(DocumentKey::new("p", "x".repeat(255)).is_ok());
        assert!(DocumentKey::new("p", "x".repeat(256)).is_err());
        // counted in characters, not bytes
        assert!(DocumentKey::new("p", "é".repeat(255)).is_ok());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let record = DocumentRecord::new(serde_json::json!(1), now, Some(now));
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::seconds(1)));
        assert!(!DocumentRecord::new(serde_json::json!(1), now, None).is_expired(now));
    }

    #[test]
    fn test_replace_keeps_created() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        let mut record = DocumentRecord::new(serde_json::json!("v1"), t0, None);
        record.replace(serde_json::json!("v2"), t1, None);
        assert_eq!(record.created, t0);
        assert_eq!(record.updated, Some(t1));
        assert_eq!(record.value, serde_json::json!("v2"));
    }
}
