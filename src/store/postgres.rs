//! PostgreSQL graph and mount stores for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! Graphs are stored whole as JSONB next to a `version` column that the
//! compare-and-swap in [`GraphRepository::save`] runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;

use super::{GraphRepository, MountStore};
use crate::config::env_or;
use crate::graph::KnowledgeGraph;
use crate::types::{MountType, WorkMount};

/// DDL for the tables used by [`PostgresStore`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_graphs (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    version     BIGINT NOT NULL,
    document    JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS work_mounts (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    content_id  TEXT NOT NULL,
    graph_id    TEXT NOT NULL,
    node_id     TEXT NOT NULL,
    position    INTEGER NOT NULL DEFAULT 0,
    is_primary  BOOLEAN NOT NULL DEFAULT FALSE,
    mount_type  TEXT NOT NULL,
    metadata    JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    UNIQUE (content_id, graph_id, node_id)
);

CREATE INDEX IF NOT EXISTS work_mounts_node_idx ON work_mounts (graph_id, node_id);
CREATE INDEX IF NOT EXISTS work_mounts_content_idx ON work_mounts (content_id);
CREATE INDEX IF NOT EXISTS work_mounts_owner_idx ON work_mounts (owner_id);
"#;

const MOUNT_COLUMNS: &str = "id, owner_id, content_id, graph_id, node_id, position, \
     is_primary, mount_type, metadata, created_at, updated_at";

const MOUNT_ORDER: &str = "ORDER BY position, created_at, id";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "postgresql://localhost/knowledge".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Stored graph version differs from the expected one.
    #[error("Version conflict on graph {graph_id}: expected {expected}, found {found:?}")]
    VersionConflict {
        /// Graph being saved.
        graph_id: String,
        /// Version the caller loaded.
        expected: u64,
        /// Version currently stored, if the row still exists.
        found: Option<u64>,
    },
    /// Triple already bound by another mount.
    #[error("Mount already exists for content {content_id} at {graph_id}/{node_id}")]
    DuplicateMount {
        /// Content id.
        content_id: String,
        /// Graph id.
        graph_id: String,
        /// Node id.
        node_id: String,
    },
    /// Mount not found.
    #[error("Mount not found: {0}")]
    MountNotFound(String),
}

/// PostgreSQL-backed graph repository and mount store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Create the tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Parse a mount from a database row.
    fn parse_mount_row(row: &PgRow) -> Result<WorkMount, sqlx::Error> {
        let mount_type: String = row.try_get("mount_type")?;
        let metadata: Json<serde_json::Map<String, serde_json::Value>> = row.try_get("metadata")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(WorkMount {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            content_id: row.try_get("content_id")?,
            graph_id: row.try_get("graph_id")?,
            node_id: row.try_get("node_id")?,
            position: row.try_get("position")?,
            is_primary: row.try_get("is_primary")?,
            mount_type: parse_mount_type(&mount_type)?,
            metadata: metadata.0,
            created_at,
            updated_at,
        })
    }

    async fn fetch_mounts(&self, filter: &str, binds: &[&str]) -> Result<Vec<WorkMount>, PostgresError> {
        let sql = format!("SELECT {MOUNT_COLUMNS} FROM work_mounts WHERE {filter} {MOUNT_ORDER}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(Self::parse_mount_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }
}

/// Stored `mount_type` values outside the known set are a decode error.
fn parse_mount_type(value: &str) -> Result<MountType, sqlx::Error> {
    MountType::from_str(value)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown mount_type {value:?}").into()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[async_trait]
impl GraphRepository for PostgresStore {
    type Error = PostgresError;

    async fn load(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>, Self::Error> {
        let row: Option<(Json<KnowledgeGraph>,)> =
            sqlx::query_as("SELECT document FROM knowledge_graphs WHERE id = $1")
                .bind(graph_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(graph),)| graph))
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<(), Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_graphs (id, owner_id, version, document, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE
               SET owner_id = EXCLUDED.owner_id,
                   version = EXCLUDED.version,
                   document = EXCLUDED.document,
                   updated_at = NOW()
             WHERE knowledge_graphs.version = $5
            "#,
        )
        .bind(&graph.id)
        .bind(&graph.owner_id)
        .bind(graph.version() as i64)
        .bind(Json(graph))
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT version FROM knowledge_graphs WHERE id = $1")
                    .bind(&graph.id)
                    .fetch_optional(&self.pool)
                    .await?;
            tracing::warn!(
                graph_id = %graph.id,
                expected = expected_version,
                found = ?found,
                "Graph save lost a version race"
            );
            return Err(PostgresError::VersionConflict {
                graph_id: graph.id.clone(),
                expected: expected_version,
                found: found.map(|v| v as u64),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MountStore for PostgresStore {
    type Error = PostgresError;

    async fn insert(&self, mount: WorkMount) -> Result<(), Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO work_mounts (id, owner_id, content_id, graph_id, node_id, position,
                                     is_primary, mount_type, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&mount.id)
        .bind(&mount.owner_id)
        .bind(&mount.content_id)
        .bind(&mount.graph_id)
        .bind(&mount.node_id)
        .bind(mount.position)
        .bind(mount.is_primary)
        .bind(mount.mount_type.to_string())
        .bind(Json(&mount.metadata))
        .bind(mount.created_at)
        .bind(mount.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(PostgresError::DuplicateMount {
                content_id: mount.content_id,
                graph_id: mount.graph_id,
                node_id: mount.node_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, mount: WorkMount) -> Result<(), Self::Error> {
        let result = sqlx::query(
            r#"
            UPDATE work_mounts
               SET position = $2, is_primary = $3, mount_type = $4,
                   metadata = $5, updated_at = $6
             WHERE id = $1
            "#,
        )
        .bind(&mount.id)
        .bind(mount.position)
        .bind(mount.is_primary)
        .bind(mount.mount_type.to_string())
        .bind(Json(&mount.metadata))
        .bind(mount.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::MountNotFound(mount.id));
        }
        Ok(())
    }

    async fn remove(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        let sql = format!("DELETE FROM work_mounts WHERE id = $1 RETURNING {MOUNT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(mount_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(Self::parse_mount_row)
            .transpose()
            .map_err(PostgresError::from)
    }

    async fn get(&self, mount_id: &str) -> Result<Option<WorkMount>, Self::Error> {
        Ok(self.fetch_mounts("id = $1", &[mount_id]).await?.into_iter().next())
    }

    async fn find(
        &self,
        content_id: &str,
        graph_id: &str,
        node_id: &str,
    ) -> Result<Option<WorkMount>, Self::Error> {
        Ok(self
            .fetch_mounts(
                "content_id = $1 AND graph_id = $2 AND node_id = $3",
                &[content_id, graph_id, node_id],
            )
            .await?
            .into_iter()
            .next())
    }

    async fn list_by_node(&self, graph_id: &str, node_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.fetch_mounts("graph_id = $1 AND node_id = $2", &[graph_id, node_id]).await
    }

    async fn list_by_graph(&self, graph_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.fetch_mounts("graph_id = $1", &[graph_id]).await
    }

    async fn list_by_content(&self, content_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.fetch_mounts("content_id = $1", &[content_id]).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkMount>, Self::Error> {
        self.fetch_mounts("owner_id = $1", &[owner_id]).await
    }

    async fn rebind_node(
        &self,
        graph_id: &str,
        old_node_id: &str,
        new_node_id: &str,
    ) -> Result<usize, Self::Error> {
        let result = sqlx::query(
            "UPDATE work_mounts SET node_id = $3, updated_at = NOW() WHERE graph_id = $1 AND node_id = $2",
        )
        .bind(graph_id)
        .bind(old_node_id)
        .bind(new_node_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() as usize),
            Err(err) if is_unique_violation(&err) => {
                let content_id: Option<String> = sqlx::query_scalar(
                    r#"
                    SELECT content_id FROM work_mounts
                     WHERE graph_id = $1 AND node_id = $3
                       AND content_id IN (SELECT content_id FROM work_mounts
                                           WHERE graph_id = $1 AND node_id = $2)
                     LIMIT 1
                    "#,
                )
                .bind(graph_id)
                .bind(old_node_id)
                .bind(new_node_id)
                .fetch_optional(&self.pool)
                .await?;
                Err(PostgresError::DuplicateMount {
                    content_id: content_id.unwrap_or_default(),
                    graph_id: graph_id.to_string(),
                    node_id: new_node_id.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn is_duplicate_mount(error: &Self::Error) -> bool {
        matches!(error, PostgresError::DuplicateMount { .. })
    }
}
