//! Default implementation of the TokenManager trait.
//!
//! This module provides [`DefaultTokenManager`], which issues tokens with
//! get-or-create semantics on top of any [`TokenStore`].
//!
//! # Protocol
//!
//! 1. Take the [`IssuanceLock`]. One lock covers both namespaces.
//! 2. Look the entity up; return the stored token if present.
//! 3. Otherwise generate a token and insert it. On a unique conflict,
//!    look the entity up again (another process may have registered it)
//!    and, if it is still missing, retry with a fresh token after a
//!    backoff, up to the [`RetryPolicy`] limit.
//! 4. The lock guard is dropped on every exit path.
//!
//! The lock only removes duplicate work inside one process. Across
//! processes the store's unique constraints decide which insert wins.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use lkp_core::{DefaultTokenManager, MemoryStore, TokenManager};
//!
//! let manager = DefaultTokenManager::new(MemoryStore::new());
//!
//! let token = manager.service_token("billing").await?;
//! assert_eq!(token, manager.service_token("billing").await?);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    config::{Config, IssuanceConfig},
    error::LkpError,
    generator::{TOKEN_LENGTH, TokenGenerator},
    model::{EntityName, Namespace, Token},
    store::{TokenStore, connect_store},
    token::{TokenError, TokenManager},
};

/// Default number of insert attempts per get-or-create call.
const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Default delay after the first conflict.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(5);

/// Default ceiling for the conflict backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Mutual exclusion shared by every get-or-create call that holds a clone.
///
/// Managers built with clones of the same lock serialize against each
/// other; a manager built with [`IssuanceLock::new`] has a private lock.
#[derive(Debug, Clone, Default)]
pub struct IssuanceLock(Arc<Mutex<()>>);

impl IssuanceLock {
    /// Create a new, unshared lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }

    /// Whether two handles refer to the same lock.
    pub fn same_as(&self, other: &IssuanceLock) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How unique conflicts are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total insert attempts allowed; `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Delay after the first conflict. Doubles on each further conflict.
    pub initial_backoff: Duration,

    /// Ceiling for the delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retry forever with no delay.
    ///
    /// Sustained contention can keep a caller looping indefinitely.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Allow `max_attempts` attempts with no delay between them.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Default implementation of TokenManager.
///
/// The manager never caches registrations; every call re-queries the
/// store.
///
/// # Type Parameters
///
/// * `S` - The token store implementation to use
pub struct DefaultTokenManager<S: TokenStore> {
    store: S,
    generator: TokenGenerator,
    retry: RetryPolicy,
    lock: IssuanceLock,
}

impl<S: TokenStore> DefaultTokenManager<S> {
    /// Create a token manager with OS entropy, the default retry policy and
    /// a private lock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
            retry: RetryPolicy::default(),
            lock: IssuanceLock::new(),
        }
    }

    /// Create a token manager tuned by configuration.
    pub fn from_config(store: S, config: &IssuanceConfig) -> Self {
        Self::new(store)
            .with_generator(TokenGenerator::new().with_mode(config.generator))
            .with_retry_policy(config.retry_policy())
    }

    /// Replace the token generator.
    pub fn with_generator(mut self, generator: TokenGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share an existing lock instead of the private one.
    pub fn with_lock(mut self, lock: IssuanceLock) -> Self {
        self.lock = lock;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The lock this manager serializes on.
    pub fn lock(&self) -> &IssuanceLock {
        &self.lock
    }

    /// The active retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn create(&self, namespace: Namespace, entity: &EntityName) -> Result<Token, TokenError> {
        let mut attempts = 0u32;
        let mut backoff = self.retry.initial_backoff;

        loop {
            attempts = attempts.saturating_add(1);
            let token = self.generator.generate(TOKEN_LENGTH)?;

            match self.store.insert(namespace, entity, &token).await {
                Ok(()) => {
                    tracing::info!(
                        %namespace,
                        entity = %entity,
                        attempts,
                        "Issued new token"
                    );
                    return Ok(token);
                }
                Err(e) if e.is_conflict() => {
                    // A conflict on the name column means someone else won.
                    if let Some(existing) = self.store.lookup(namespace, entity).await? {
                        tracing::info!(
                            %namespace,
                            entity = %entity,
                            "Entity registered concurrently, using existing token"
                        );
                        return Ok(existing);
                    }

                    if self.retry.exhausted(attempts) {
                        tracing::error!(
                            %namespace,
                            entity = %entity,
                            attempts,
                            "Token issuance retries exhausted"
                        );
                        return Err(TokenError::RetriesExhausted {
                            namespace,
                            entity: entity.to_string(),
                            attempts,
                        });
                    }

                    tracing::warn!(
                        %namespace,
                        entity = %entity,
                        attempts,
                        "Token collided with an existing registration, retrying"
                    );

                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                        backoff = self.retry.next_backoff(backoff);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl DefaultTokenManager<Box<dyn TokenStore>> {
    /// Open the configured store and build a manager over it.
    pub async fn connect(config: &Config) -> Result<Self, LkpError> {
        let store = connect_store(&config.database).await?;
        Ok(Self::from_config(store, &config.issuance))
    }
}

impl<S: TokenStore> std::fmt::Debug for DefaultTokenManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultTokenManager")
            .field("generator", &self.generator)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: TokenStore + 'static> TokenManager for DefaultTokenManager<S> {
    async fn get_or_create(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Token, TokenError> {
        let _guard = self.lock.acquire().await;

        if let Some(token) = self.store.lookup(namespace, entity).await? {
            tracing::debug!(%namespace, entity = %entity, "Using existing token");
            return Ok(token);
        }

        self.create(namespace, entity).await
    }

    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, TokenError> {
        Ok(self.store.lookup(namespace, entity).await?)
    }
}
