//! # lkp Core
//!
//! Issues opaque access tokens bound one-to-one to named services and
//! users, with get-or-create semantics: asking twice for the same name
//! returns the same token.
//!
//! This crate provides:
//! - A base62 token generator over a secure entropy source
//! - The [`TokenStore`] trait with in-memory and PostgreSQL backends
//! - [`DefaultTokenManager`], which reconciles an in-process lock with the
//!   store's uniqueness constraints under concurrent registration
//! - [`issue_key`], which composes `lkp-<service>-<user>` access keys
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lkp_core::{Config, DefaultTokenManager, issue_key};
//!
//! async fn key_for(config: &Config) -> Result<String, lkp_core::LkpError> {
//!     let manager = DefaultTokenManager::connect(config).await?;
//!     let key = issue_key(&manager, "billing", "alice").await?;
//!     Ok(key.expose().to_string())
//! }
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod key;
pub mod model;
pub mod store;
pub mod token;
pub mod token_manager;

// Re-export commonly used types at crate root
pub use model::{
    EntityName,
    Namespace,
    ParseError,
    Registration,
    Token,
};

pub use generator::{
    BASE62_ALPHABET,
    EntropySource,
    GenerateError,
    GeneratorMode,
    OsEntropy,
    TOKEN_LENGTH,
    TokenGenerator,
    generate_token,
};

pub use store::{
    MemoryStore,
    StoreError,
    TokenStore,
    connect_store,
};

#[cfg(feature = "postgres")]
pub use store::PostgresStore;

pub use token::{
    TokenError,
    TokenManager,
};

pub use token_manager::{
    DefaultTokenManager,
    IssuanceLock,
    RetryPolicy,
};

pub use key::{
    AccessKey,
    KEY_PREFIX,
    issue_key,
};

pub use config::{
    Config,
    ConfigError,
    DatabaseConfig,
    IssuanceConfig,
    StoreBackend,
};

pub use error::LkpError;
