//! Correlation identifiers
//!
//! The relay protocol as deployed has no correlation field; `id` and
//! `replyTo` are an extension used by strict correlation. Identifiers are
//! opaque strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier matching a reply to the request that caused it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Monotonic generator producing `<prefix>-<n>` identifiers
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Create a generator; the first ID is `<prefix>-1`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Produce the next identifier
    pub fn next_id(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_monotonic() {
        let ids = CorrelationIdGenerator::new("c1");
        assert_eq!(ids.next_id(), CorrelationId::new("c1-1"));
        assert_eq!(ids.next_id(), CorrelationId::new("c1-2"));
        assert_eq!(ids.next_id().as_str(), "c1-3");
    }

    #[test]
    fn test_correlation_id_serializes_as_plain_string() {
        let id = CorrelationId::new("req-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""req-7""#);
        assert_eq!(format!("{}", id), "req-7");
    }
}
