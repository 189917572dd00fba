//! Token registration storage.
//!
//! This module provides:
//! - [`TokenStore`] - Trait for per-namespace registration backends
//! - [`MemoryStore`] - In-memory implementation for testing and fallback
//! - [`PostgresStore`] - PostgreSQL implementation (with `postgres` feature)
//! - [`connect_store`] - Helper to open the backend named in configuration
//!
//! # Relations
//!
//! Each namespace maps to its own relation with two unique columns:
//!
//! | namespace | relation         | name column    |
//! |-----------|------------------|----------------|
//! | service   | `service_tokens` | `service_name` |
//! | user      | `user_tokens`    | `user_name`    |
//!
//! Stores are append-only: there is no update or delete path.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::model::{EntityName, Namespace, ParseError, Registration, Token};

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Error type for token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity name or the token already exists in the namespace.
    ///
    /// The store does not report which column conflicted; callers retry
    /// with a fresh token either way.
    #[error("unique constraint violated in {namespace} namespace")]
    UniqueConflict { namespace: Namespace },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// A persisted token failed validation on read.
    #[error("corrupt registration: {0}")]
    Corrupt(#[from] ParseError),

    /// The database driver reported an error.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this error is a retryable uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UniqueConflict { .. })
    }
}

/// Abstraction over registration storage backends.
///
/// Implementations must enforce uniqueness of both the entity name and
/// the token within each namespace, atomically with the insert.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up the token bound to `entity`.
    ///
    /// Returns `Ok(None)` if the entity has never been registered.
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError>;

    /// Persist a new `(entity, token)` pair.
    ///
    /// Returns [`StoreError::UniqueConflict`] if either value is already
    /// present in the namespace.
    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError>;

    /// List every registration in a namespace, ordered by entity name.
    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError>;

    /// Check if an entity is registered without returning its token.
    async fn exists(&self, namespace: Namespace, entity: &EntityName) -> Result<bool, StoreError> {
        Ok(self.lookup(namespace, entity).await?.is_some())
    }
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError> {
        (**self).lookup(namespace, entity).await
    }

    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError> {
        (**self).insert(namespace, entity, token).await
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError> {
        (**self).list(namespace).await
    }
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError> {
        (**self).lookup(namespace, entity).await
    }

    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError> {
        (**self).insert(namespace, entity, token).await
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError> {
        (**self).list(namespace).await
    }
}

/// Open the storage backend selected in `config`.
///
/// # Backend Selection Logic
///
/// - [`StoreBackend::Memory`]: returns an empty [`MemoryStore`]
/// - [`StoreBackend::Postgres`] with the `postgres` feature: connects a
///   [`PostgresStore`] and, when `run_migrations` is set, creates the
///   relations
/// - [`StoreBackend::Postgres`] without the feature: fails, since silently
///   issuing non-persistent tokens would break get-or-create across runs
pub async fn connect_store(config: &DatabaseConfig) -> Result<Box<dyn TokenStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!(
                "Using in-memory token store. Registrations will not persist across restarts."
            );
            Ok(Box::new(MemoryStore::new()))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(config).await?;
            tracing::info!(
                host = %config.db_host,
                port = config.db_port,
                database = %config.db_name,
                "Connected to PostgreSQL token store"
            );
            if config.run_migrations {
                store.migrate().await?;
                tracing::debug!("Token relations migrated");
            }
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => Err(StoreError::BackendError {
            message: "postgres backend requested but the postgres feature is not enabled"
                .to_string(),
        }),
    }
}
