//! Owner identity supplied by the identity provider

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identity of the signed-in user
///
/// The core never inspects it beyond equality; credentials stay with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for a blank identifier
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session-lifecycle signal from the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    SignedIn(Identity),
    SignedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_identity_rejected() {
        assert!(Identity::new("  ").is_none());
        assert_eq!(Identity::new(" uid-1 ").unwrap().as_str(), "uid-1");
    }
}
