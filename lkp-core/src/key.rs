//! Access key composition.
//!
//! An access key joins a fixed prefix with one service token and one user
//! token: `lkp-<serviceToken>-<userToken>`. Tokens never contain `-`, so a
//! key splits back into its parts unambiguously.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LkpError;
use crate::model::{ParseError, Token};
use crate::token::TokenManager;

/// Prefix of every access key.
pub const KEY_PREFIX: &str = "lkp";

const SEPARATOR: char = '-';

/// A composed access key.
///
/// The buffer is wiped on drop and `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey {
    value: String,
}

impl AccessKey {
    /// Compose a key from a service token and a user token.
    pub fn compose(service: &Token, user: &Token) -> Self {
        Self {
            value: format!(
                "{KEY_PREFIX}{SEPARATOR}{}{SEPARATOR}{}",
                service.as_str(),
                user.as_str()
            ),
        }
    }

    /// Parse and validate a key string.
    ///
    /// # Examples
    ///
    /// ```
    /// use lkp_core::AccessKey;
    ///
    /// let key = AccessKey::parse("lkp-000JVb3WII-01HvWXNAa7").unwrap();
    /// assert_eq!(key.service_token(), "000JVb3WII");
    /// assert_eq!(key.user_token(), "01HvWXNAa7");
    /// ```
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let mut parts = value.split(SEPARATOR);
        let (prefix, service, user) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(prefix), Some(service), Some(user), None) => (prefix, service, user),
            _ => {
                return Err(ParseError::InvalidKey {
                    message: "expected three '-' separated parts".to_string(),
                });
            }
        };

        if prefix != KEY_PREFIX {
            return Err(ParseError::InvalidKey {
                message: format!("expected prefix '{}', got '{}'", KEY_PREFIX, prefix),
            });
        }

        let service = Token::parse(service)?;
        let user = Token::parse(user)?;
        Ok(Self::compose(&service, &user))
    }

    /// Expose the key value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// The service token part.
    pub fn service_token(&self) -> &str {
        self.value.split(SEPARATOR).nth(1).unwrap_or_default()
    }

    /// The user token part.
    pub fn user_token(&self) -> &str {
        self.value.split(SEPARATOR).nth(2).unwrap_or_default()
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessKey([REDACTED])")
    }
}

/// Issue the access key for a service/user pair.
///
/// Gets or creates the service token, then the user token, and composes
/// them. Any failure is returned to the caller.
pub async fn issue_key<M>(
    manager: &M,
    service_name: &str,
    user_name: &str,
) -> Result<AccessKey, LkpError>
where
    M: TokenManager + ?Sized,
{
    let service = manager.service_token(service_name).await?;
    let user = manager.user_token(user_name).await?;

    tracing::debug!(service = service_name, user = user_name, "Composed access key");
    Ok(AccessKey::compose(&service, &user))
}
