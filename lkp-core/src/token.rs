//! Token issuance contract.
//!
//! This module provides:
//! - [`TokenError`] - Failures surfaced by get-or-create
//! - [`TokenManager`] - Trait for get-or-create token issuance

use async_trait::async_trait;
use thiserror::Error;

use crate::generator::GenerateError;
use crate::model::{EntityName, Namespace, Token};
use crate::store::StoreError;

/// Error type for token issuance.
///
/// Unique conflicts never appear here directly: they are absorbed by the
/// retry loop, and only surface as [`TokenError::RetriesExhausted`] once
/// the configured attempt budget is spent.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Secure randomness could not be obtained.
    #[error("token generation failed: {0}")]
    Generate(#[from] GenerateError),

    /// Storage error other than a unique conflict.
    #[error("storage error: {0}")]
    StorageError(#[from] StoreError),

    /// Every insert attempt hit a unique conflict.
    #[error("gave up issuing {namespace} token for '{entity}' after {attempts} conflicting attempts")]
    RetriesExhausted {
        namespace: Namespace,
        entity: String,
        attempts: u32,
    },
}

/// Trait for get-or-create token issuance.
///
/// # Example
///
/// ```rust,ignore
/// use lkp_core::{TokenManager, TokenError};
///
/// async fn tokens_for(manager: &impl TokenManager) -> Result<(), TokenError> {
///     let service = manager.service_token("billing").await?;
///     let again = manager.service_token("billing").await?;
///     assert_eq!(service, again);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Return the token bound to `entity`, creating and persisting one on
    /// first use.
    ///
    /// Repeated calls for the same name return the same token.
    async fn get_or_create(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Token, TokenError>;

    /// Return the token bound to `entity` without creating one.
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, TokenError>;

    /// Get-or-create in the service namespace.
    async fn service_token(&self, service_name: &str) -> Result<Token, TokenError> {
        self.get_or_create(Namespace::Service, &EntityName::new(service_name))
            .await
    }

    /// Get-or-create in the user namespace.
    async fn user_token(&self, user_name: &str) -> Result<Token, TokenError> {
        self.get_or_create(Namespace::User, &EntityName::new(user_name))
            .await
    }
}
