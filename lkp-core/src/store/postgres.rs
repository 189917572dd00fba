//! PostgreSQL-backed token store implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{StoreError, TokenStore};
use crate::config::DatabaseConfig;
use crate::model::{EntityName, Namespace, Registration, Token};

/// Token store backed by PostgreSQL.
///
/// Relation and column names come from [`Namespace`] and are never taken
/// from input, so they are formatted into the SQL while entity names and
/// tokens are always bound as parameters.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool using the settings in `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_url())
            .await
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to connect to PostgreSQL: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create both token relations if they do not exist.
    ///
    /// Safe to run against a database that already has them.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for namespace in Namespace::ALL {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    token   TEXT NOT NULL UNIQUE,
                    {column} TEXT NOT NULL UNIQUE
                )
                "#,
                table = namespace.table(),
                column = namespace.name_column(),
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl TokenStore for PostgresStore {
    async fn lookup(
        &self,
        namespace: Namespace,
        entity: &EntityName,
    ) -> Result<Option<Token>, StoreError> {
        let sql = format!(
            "SELECT token FROM {} WHERE {} = $1",
            namespace.table(),
            namespace.name_column()
        );

        let row: Option<String> = sqlx::query_scalar(&sql)
            .bind(entity.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Token::parse).transpose()?)
    }

    async fn insert(
        &self,
        namespace: Namespace,
        entity: &EntityName,
        token: &Token,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (token, {}) VALUES ($1, $2)",
            namespace.table(),
            namespace.name_column()
        );

        let result = sqlx::query(&sql)
            .bind(token.as_str())
            .bind(entity.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::UniqueConflict { namespace })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<Registration>, StoreError> {
        let sql = format!(
            "SELECT {column}, token FROM {table} ORDER BY {column}",
            table = namespace.table(),
            column = namespace.name_column()
        );

        let rows: Vec<(String, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(name, token)| -> Result<Registration, StoreError> {
                Ok(Registration::new(
                    namespace,
                    EntityName::new(name),
                    Token::parse(token)?,
                ))
            })
            .collect()
    }
}
