//! Rollback point identity.
//!
//! A rollback id names one snapshot directory under the backup root.
//!
//! Format: `<component>_<YYYYmmdd_HHMMSS>_<4 hex chars>`
//! Example: `firewall_20260805_101500_9f2c`
//!
//! The random suffix disambiguates two operations for the same component
//! started within the same second. Ids written by older tool versions
//! (without the suffix) remain valid: identity is whatever directory name
//! the metadata was stored under, and the parser accepts both shapes.
//!
//! The empty id is a sentinel meaning "rollback recording disabled": every
//! capture and restore call against it is a no-op, never an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a rollback point within the backup root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollbackId(pub String);

impl RollbackId {
    /// Build an id from its components.
    ///
    /// `timestamp` must already be formatted as `YYYYmmdd_HHMMSS`;
    /// `suffix` is four lowercase hex characters.
    pub fn new(component: &str, timestamp: &str, suffix: &str) -> Self {
        RollbackId(format!("{}_{}_{}", component, timestamp, suffix))
    }

    /// The sentinel id returned when rollback recording is disabled.
    pub fn disabled() -> Self {
        RollbackId(String::new())
    }

    /// True for the disabled sentinel.
    pub fn is_disabled(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse an id string, rejecting anything that cannot name a directory.
    ///
    /// Accepts both suffixed ids and legacy `<component>_<timestamp>` ids.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > 128 {
            return None;
        }
        // Directory-name safety: the id is joined onto the backup root.
        if s.contains('/') || s.contains("..") || s.starts_with('.') {
            return None;
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return None;
        }
        Some(RollbackId(s.to_string()))
    }

    /// The component prefix, when the id follows the standard shape.
    pub fn component(&self) -> Option<&str> {
        // component_YYYYmmdd_HHMMSS[_suffix]: the date part is 8 digits.
        let mut idx = None;
        for (i, _) in self.0.match_indices('_') {
            let rest = &self.0[i + 1..];
            if rest.len() >= 8 && rest.as_bytes()[..8].iter().all(|b| b.is_ascii_digit()) {
                idx = Some(i);
                break;
            }
        }
        idx.map(|i| &self.0[..i])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RollbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RollbackId {
    fn from(s: String) -> Self {
        RollbackId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_format() {
        let id = RollbackId::new("firewall", "20260805_101500", "9f2c");
        assert_eq!(id.as_str(), "firewall_20260805_101500_9f2c");
    }

    #[test]
    fn test_disabled_sentinel() {
        let id = RollbackId::disabled();
        assert!(id.is_disabled());
        assert!(!RollbackId::new("privacy", "20260805_101500", "0a1b").is_disabled());
    }

    #[test]
    fn test_parse_accepts_legacy_shape() {
        // Older tool versions wrote ids without the random suffix.
        assert!(RollbackId::parse("firewall_20260805_101500").is_some());
        assert!(RollbackId::parse("firewall_20260805_101500_9f2c").is_some());
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert!(RollbackId::parse("").is_none());
        assert!(RollbackId::parse("../etc").is_none());
        assert!(RollbackId::parse("a/b").is_none());
        assert!(RollbackId::parse(".hidden").is_none());
    }

    #[test]
    fn test_component_prefix() {
        let id = RollbackId::new("app_security", "20260805_101500", "9f2c");
        assert_eq!(id.component(), Some("app_security"));

        let legacy = RollbackId::parse("privacy_20260805_101500").unwrap();
        assert_eq!(legacy.component(), Some("privacy"));

        assert_eq!(RollbackId::parse("oddball").unwrap().component(), None);
    }
}
