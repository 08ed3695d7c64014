//! Acting identity
//!
//! The identity is an opaque string (usually an email address) supplied by
//! whatever authenticated the user. tripsync does not verify it; it only
//! stamps it into written records and uses it to filter the trips a user can
//! pull.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing an identity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity must not be empty")]
    Empty,

    #[error("identity '{0}' must not contain whitespace")]
    Whitespace(String),
}

/// The acting user's identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse an identity, trimming surrounding whitespace
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(IdentityError::Whitespace(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
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

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let identity = Identity::parse("  ana@example.com \n").unwrap();
        assert_eq!(identity.as_str(), "ana@example.com");
        assert_eq!(identity.to_string(), "ana@example.com");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Identity::parse("   "), Err(IdentityError::Empty));
    }

    #[test]
    fn test_parse_rejects_inner_whitespace() {
        assert!(matches!(
            Identity::parse("ana @example.com"),
            Err(IdentityError::Whitespace(_))
        ));
    }

    #[test]
    fn test_is_opaque() {
        // Case is preserved; the identity is not interpreted
        let identity: Identity = "Ana@Example.COM".parse().unwrap();
        assert_eq!(identity.as_str(), "Ana@Example.COM");
    }

    #[test]
    fn test_serde_validates() {
        let identity: Identity = serde_json::from_str("\"bo@example.com\"").unwrap();
        assert_eq!(identity.as_str(), "bo@example.com");

        let err = serde_json::from_str::<Identity>("\"\"");
        assert!(err.is_err());
    }
}
