//! In-memory token store implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{StoreError, TokenStore};
use crate::model::{EntityName, Namespace, Registration, Token};

/// One namespace's registrations with both uniqueness indexes.
#[derive(Debug, Default)]
struct Relation {
    by_name: HashMap<EntityName, Token>,
    tokens: HashSet<Token>,
}

/// In-memory token store for testing and development.
///
/// This store is not persistent; registrations are lost when the process
/// exits. Both uniqueness checks and the insert happen under a single
/// write lock, so concurrent writers see the same conflict semantics a
/// database unique constraint provides.
pub struct MemoryStore {
    relations: RwLock<HashMap<Namespace, Relation>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            relations: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store pre-populated with registrations.
    ///
    /// Later duplicates of an entity name or token are ignored.
    pub fn with_registrations(registrations: impl IntoIterator<Item = Registration>) -> Self {
        let mut relations: HashMap<Namespace, Relation> = HashMap::new();
        for reg in registrations {
            let relation = relations.entry(reg.namespace).or_default();
            if relation.by_name.contains_key(&reg.entity_name)
                || relation.tokens.contains(&reg.token)
            {
                continue;
            }
            relation.tokens.insert(reg.token.clone());
            relation.by_name.insert(reg.entity_name, reg.token);
        }
        Self {
            relations: RwLock::new(relations),
        }
    }

    /// Number of registrations in a namespace.
    pub fn len(&self, namespace: Namespace) -> usize {
        self.relations
            .read()
            .get(&namespace)
            .map(|r| r.by_name.len())
            .unwrap_or(0)
    }

    /// Whether a namespace has no registrations.
    pub fn is_empty(&self, namespace: Namespace) -> bool {
        self.len(namespace) == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("services", &self.len(Namespace::Service))
            .field("users", &self.len(Namespace::User))
            .finish()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError> {
        let relations = self.relations.read();
        Ok(relations
            .get(&namespace)
            .and_then(|r| r.by_name.get(entity))
            .cloned())
    }

    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError> {
        let mut relations = self.relations.write();
        let relation = relations.entry(namespace).or_default();

        if relation.by_name.contains_key(entity) || relation.tokens.contains(token) {
            return Err(StoreError::UniqueConflict { namespace });
        }

        relation.tokens.insert(token.clone());
        relation.by_name.insert(entity.clone(), token.clone());
        Ok(())
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError> {
        let relations = self.relations.read();
        let mut registrations: Vec<Registration> = relations
            .get(&namespace)
            .map(|r| {
                r.by_name
                    .iter()
                    .map(|(name, token)| Registration::new(namespace, name.clone(), token.clone()))
                    .collect()
            })
            .unwrap_or_default();
        registrations.sort_by(|a, b| a.entity_name.as_str().cmp(b.entity_name.as_str()));
        Ok(registrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> Token {
        Token::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_insert_lookup() {
        let store = MemoryStore::new();
        let entity = EntityName::new("billing");

        store
            .insert(Namespace::Service, &entity, &token("AAAAAAAAAA"))
            .await
            .unwrap();
        let retrieved = store.lookup(Namespace::Service, &entity).await.unwrap();

        assert_eq!(retrieved, Some(token("AAAAAAAAAA")));
    }

    #[tokio::test]
    async fn test_memory_store_lookup_unknown() {
        let store = MemoryStore::new();
        let result = store
            .lookup(Namespace::User, &EntityName::new("unknown"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_duplicate_name_conflicts() {
        let store = MemoryStore::new();
        let entity = EntityName::new("alice");

        store
            .insert(Namespace::User, &entity, &token("AAAAAAAAAA"))
            .await
            .unwrap();
        let result = store
            .insert(Namespace::User, &entity, &token("BBBBBBBBBB"))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::UniqueConflict {
                namespace: Namespace::User
            })
        ));
        // The original binding is untouched.
        assert_eq!(
            store.lookup(Namespace::User, &entity).await.unwrap(),
            Some(token("AAAAAAAAAA"))
        );
    }

    #[tokio::test]
    async fn test_memory_store_duplicate_token_conflicts() {
        let store = MemoryStore::new();

        store
            .insert(Namespace::User, &EntityName::new("alice"), &token("AAAAAAAAAA"))
            .await
            .unwrap();
        let result = store
            .insert(Namespace::User, &EntityName::new("bob"), &token("AAAAAAAAAA"))
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert!(
            store
                .lookup(Namespace::User, &EntityName::new("bob"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_memory_store_namespaces_are_disjoint() {
        let store = MemoryStore::new();
        let entity = EntityName::new("shared");
        let shared = token("SSSSSSSSSS");

        store.insert(Namespace::Service, &entity, &shared).await.unwrap();
        store.insert(Namespace::User, &entity, &shared).await.unwrap();

        assert_eq!(store.len(Namespace::Service), 1);
        assert_eq!(store.len(Namespace::User), 1);
    }

    #[tokio::test]
    async fn test_memory_store_list_sorted() {
        let store = MemoryStore::new();
        store
            .insert(Namespace::Service, &EntityName::new("zeta"), &token("Z000000000"))
            .await
            .unwrap();
        store
            .insert(Namespace::Service, &EntityName::new("alpha"), &token("A000000000"))
            .await
            .unwrap();

        let listed = store.list(Namespace::Service).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(store.list(Namespace::User).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_with_registrations() {
        let store = MemoryStore::with_registrations(vec![
            Registration::new(Namespace::User, EntityName::new("alice"), token("AAAAAAAAAA")),
            Registration::new(Namespace::User, EntityName::new("alice"), token("BBBBBBBBBB")),
        ]);

        assert_eq!(store.len(Namespace::User), 1);
        assert_eq!(
            store
                .lookup(Namespace::User, &EntityName::new("alice"))
                .await
                .unwrap(),
            Some(token("AAAAAAAAAA"))
        );
        assert!(store.is_empty(Namespace::Service));
    }
}
