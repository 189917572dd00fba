//! Concurrent issuance tests.
//!
//! These tests run many get-or-create calls at once on a multi-threaded
//! runtime to check that:
//! - Distinct names always receive distinct, singly-persisted tokens
//! - Racing callers for one name all observe the same token
//! - Managers with separate locks still converge through the store's
//!   uniqueness constraints
//! - One shared lock serializes calls across both namespaces

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lkp_core::{
    DefaultTokenManager, EntityName, IssuanceLock, MemoryStore, Namespace, Registration,
    StoreError, Token, TokenManager, TokenStore,
};
use tokio::task::JoinSet;

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 32;

/// A memory store that records how many calls overlap.
#[derive(Default)]
struct OverlapStore {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl OverlapStore {
    async fn track<T>(&self, fut: impl std::future::Future<Output = T>) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Widen the window for any overlap to show up.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let out = fut.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[async_trait]
impl TokenStore for OverlapStore {
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError> {
        self.track(self.inner.lookup(namespace, entity)).await
    }

    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError> {
        self.track(self.inner.insert(namespace, entity, token)).await
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError> {
        self.inner.list(namespace).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_names_get_distinct_tokens() {
    let manager = Arc::new(DefaultTokenManager::new(MemoryStore::new()));

    let mut set = JoinSet::new();
    for i in 0..CONCURRENCY {
        let manager = manager.clone();
        set.spawn(async move {
            let name = format!("service-{i:03}");
            let token = manager.service_token(&name).await.expect("issue should succeed");
            (name, token)
        });
    }

    let mut tokens = HashSet::new();
    while let Some(result) = set.join_next().await {
        let (name, token) = result.expect("task should not panic");
        let stored = manager
            .lookup(Namespace::Service, &EntityName::new(name))
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), Some(&token), "Returned token must be the persisted one");
        tokens.insert(token);
    }

    assert_eq!(tokens.len(), CONCURRENCY, "Every name gets its own token");
    assert_eq!(manager.store().len(Namespace::Service), CONCURRENCY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_callers_for_one_name_agree() {
    let manager = Arc::new(DefaultTokenManager::new(MemoryStore::new()));

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let manager = manager.clone();
        set.spawn(async move { manager.user_token("alice").await.expect("issue should succeed") });
    }

    let mut tokens = HashSet::new();
    while let Some(result) = set.join_next().await {
        tokens.insert(result.expect("task should not panic"));
    }

    assert_eq!(tokens.len(), 1, "All callers observe the same token");
    assert_eq!(manager.store().len(Namespace::User), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_locks_converge_through_store() {
    let store = Arc::new(MemoryStore::new());
    // Two managers standing in for two processes sharing one database.
    let managers = [
        Arc::new(DefaultTokenManager::new(store.clone())),
        Arc::new(DefaultTokenManager::new(store.clone())),
    ];
    assert!(!managers[0].lock().same_as(managers[1].lock()));

    let mut set = JoinSet::new();
    for i in 0..CONCURRENCY {
        let manager = managers[i % 2].clone();
        set.spawn(async move {
            manager
                .service_token("contested")
                .await
                .expect("issue should succeed")
        });
    }

    let mut tokens = HashSet::new();
    while let Some(result) = set.join_next().await {
        tokens.insert(result.expect("task should not panic"));
    }

    assert_eq!(tokens.len(), 1);
    assert_eq!(store.len(Namespace::Service), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_lock_serializes_both_namespaces() {
    let manager = Arc::new(DefaultTokenManager::new(OverlapStore::default()));

    let mut set = JoinSet::new();
    for i in 0..16 {
        let manager = manager.clone();
        set.spawn(async move {
            if i % 2 == 0 {
                manager.service_token(&format!("svc-{i}")).await
            } else {
                manager.user_token(&format!("usr-{i}")).await
            }
        });
    }

    while let Some(result) = set.join_next().await {
        result.expect("task should not panic").expect("issue should succeed");
    }

    assert_eq!(
        manager.store().max_in_flight.load(Ordering::SeqCst),
        1,
        "Store calls must never overlap under one lock"
    );
    assert_eq!(manager.store().inner.len(Namespace::Service), 8);
    assert_eq!(manager.store().inner.len(Namespace::User), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn injected_lock_spans_managers() {
    let lock = IssuanceLock::new();
    let store = Arc::new(OverlapStore::default());
    let services = Arc::new(DefaultTokenManager::new(store.clone()).with_lock(lock.clone()));
    let users = Arc::new(DefaultTokenManager::new(store.clone()).with_lock(lock));

    let mut set = JoinSet::new();
    for i in 0..8 {
        let services = services.clone();
        let users = users.clone();
        set.spawn(async move { services.service_token(&format!("svc-{i}")).await });
        set.spawn(async move { users.user_token(&format!("usr-{i}")).await });
    }

    while let Some(result) = set.join_next().await {
        result.expect("task should not panic").expect("issue should succeed");
    }

    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
}
