//! Domain model types for lkp.
//!
//! This module defines the core types used throughout the crate:
//! - [`Namespace`] - One of the two independent token universes
//! - [`EntityName`] - The name a token is bound to within a namespace
//! - [`Token`] - An opaque, fixed-alphabet access token
//! - [`Registration`] - A persisted `(entity_name, token)` pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::generator::BASE62_ALPHABET;

/// One of the two disjoint registration namespaces.
///
/// Uniqueness of names and tokens is enforced within a namespace only;
/// the same token may legitimately appear once in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Registrations keyed by service name.
    Service,

    /// Registrations keyed by user name.
    User,
}

impl Namespace {
    /// All namespaces, in a stable order.
    pub const ALL: [Namespace; 2] = [Namespace::Service, Namespace::User];

    /// Get the namespace as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::User => "user",
        }
    }

    /// Name of the relation holding this namespace's registrations.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Service => "service_tokens",
            Self::User => "user_tokens",
        }
    }

    /// Name of the entity-name column in [`table`](Self::table).
    pub fn name_column(&self) -> &'static str {
        match self {
            Self::Service => "service_name",
            Self::User => "user_name",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(Self::Service),
            "user" => Ok(Self::User),
            other => Err(ParseError::UnknownNamespace {
                got: other.to_string(),
            }),
        }
    }
}

/// Name of an entity within a namespace (e.g., a service or user name).
///
/// Names are stored exactly as given, including the empty name. No case
/// folding is applied because the persisted column compares
/// case-sensitively.
///
/// # Examples
///
/// ```
/// use lkp_core::EntityName;
///
/// let billing = EntityName::new("billing-api");
/// assert_eq!(billing.as_str(), "billing-api");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityName(String);

impl EntityName {
    /// Create a new entity name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the entity name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An opaque access token.
///
/// Every character is drawn from [`BASE62_ALPHABET`]. The value is only
/// reachable through [`as_str()`](Token::as_str); `Debug` output is redacted
/// so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    /// Validate and wrap a token read from storage or user input.
    pub fn parse(value: impl Into<String>) -> Result<Self, ParseError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ParseError::EmptyToken);
        }
        if let Some(bad) = value.chars().find(|c| !is_base62(*c)) {
            return Err(ParseError::InvalidTokenChar { found: bad });
        }
        Ok(Self(value))
    }

    /// Wrap a value produced by the generator, which only emits alphabet symbols.
    pub(crate) fn from_generated(value: String) -> Self {
        debug_assert!(value.chars().all(is_base62));
        Self(value)
    }

    /// Expose the token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of characters in the token.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Tokens are never empty; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token([REDACTED; {}])", self.0.len())
    }
}

impl TryFrom<String> for Token {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

fn is_base62(c: char) -> bool {
    c.is_ascii() && BASE62_ALPHABET.contains(&(c as u8))
}

/// A persisted binding of an entity name to its token within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// The namespace the registration lives in.
    pub namespace: Namespace,

    /// The entity the token is bound to.
    pub entity_name: EntityName,

    /// The issued token.
    pub token: Token,
}

impl Registration {
    /// Create a new registration.
    pub fn new(namespace: Namespace, entity_name: EntityName, token: Token) -> Self {
        Self {
            namespace,
            entity_name,
            token,
        }
    }
}

/// Error parsing a model value from text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown namespace '{got}', expected 'service' or 'user'")]
    UnknownNamespace { got: String },

    #[error("token is empty")]
    EmptyToken,

    #[error("token contains non-base62 character {found:?}")]
    InvalidTokenChar { found: char },

    #[error("invalid access key: {message}")]
    InvalidKey { message: String },
}
