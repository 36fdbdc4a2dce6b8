//! SQLite-backed persistence implementation.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;

use super::{InstanceRecord, RuntimeStore, SnapshotRecord, StoredBookmark, StoredTrigger};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from an existing pool.
    ///
    /// The caller is responsible for running migrations; prefer
    /// [`SqliteStore::from_path`] unless the pool is shared.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite store from a file path.
    ///
    /// Creates parent directories and the database file if needed, connects
    /// with sensible defaults, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Storage {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::Storage {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| CoreError::Storage {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RuntimeStore for SqliteStore {
    async fn create_instance(&self, record: &InstanceRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO instances (instance_id, definition_id, definition_version, status,
                                   sub_status, correlation_id, parent_instance_id, state,
                                   created_at, updated_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.instance_id)
        .bind(&record.definition_id)
        .bind(record.definition_version)
        .bind(&record.status)
        .bind(&record.sub_status)
        .bind(&record.correlation_id)
        .bind(&record.parent_instance_id)
        .bind(&record.state)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, CoreError> {
        let record = sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT instance_id, definition_id, definition_version, status, sub_status,
                   correlation_id, parent_instance_id, state, created_at, updated_at, finished_at
            FROM instances
            WHERE instance_id = ?
            "#,
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save_instance_state(&self, record: &InstanceRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE instances
            SET status = ?, sub_status = ?, correlation_id = ?, state = ?,
                updated_at = ?, finished_at = ?
            WHERE instance_id = ?
            "#,
        )
        .bind(&record.status)
        .bind(&record.sub_status)
        .bind(&record.correlation_id)
        .bind(&record.state)
        .bind(record.updated_at)
        .bind(record.finished_at)
        .bind(&record.instance_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::InstanceNotFound {
                instance_id: record.instance_id.clone(),
            });
        }

        Ok(())
    }

    async fn count_running(
        &self,
        definition_id: Option<&str>,
        version: Option<i32>,
        correlation_id: Option<&str>,
    ) -> Result<i64, CoreError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM instances
            WHERE status IN ('running', 'suspended')
              AND (?1 IS NULL OR definition_id = ?1)
              AND (?2 IS NULL OR definition_version = ?2)
              AND (?3 IS NULL OR correlation_id = ?3)
            "#,
        )
        .bind(definition_id)
        .bind(version)
        .bind(correlation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    async fn store_bookmarks(
        &self,
        hash: &str,
        bookmarks: &[StoredBookmark],
    ) -> Result<(), CoreError> {
        for bookmark in bookmarks {
            sqlx::query(
                r#"
                INSERT INTO bookmarks (bookmark_id, instance_id, hash, activity_node_id,
                                       activity_instance_id, payload, correlation_id,
                                       auto_burn, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (instance_id, bookmark_id) DO UPDATE SET
                    hash = excluded.hash,
                    activity_node_id = excluded.activity_node_id,
                    activity_instance_id = excluded.activity_instance_id,
                    payload = excluded.payload,
                    correlation_id = excluded.correlation_id,
                    auto_burn = excluded.auto_burn
                "#,
            )
            .bind(&bookmark.bookmark_id)
            .bind(&bookmark.instance_id)
            .bind(hash)
            .bind(&bookmark.activity_node_id)
            .bind(&bookmark.activity_instance_id)
            .bind(&bookmark.payload)
            .bind(&bookmark.correlation_id)
            .bind(bookmark.auto_burn)
            .bind(bookmark.created_at)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn remove_bookmarks(
        &self,
        hash: &str,
        instance_id: &str,
        bookmark_ids: &[String],
    ) -> Result<u64, CoreError> {
        let mut removed = 0u64;
        for bookmark_id in bookmark_ids {
            let result = sqlx::query(
                r#"
                DELETE FROM bookmarks
                WHERE hash = ? AND instance_id = ? AND bookmark_id = ?
                "#,
            )
            .bind(hash)
            .bind(instance_id)
            .bind(bookmark_id)
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
        }

        Ok(removed)
    }

    async fn remove_bookmarks_by_instance(
        &self,
        hash: &str,
        instance_id: &str,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM bookmarks
            WHERE hash = ? AND instance_id = ?
            "#,
        )
        .bind(hash)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_bookmarks(
        &self,
        hash: &str,
        correlation_id: Option<&str>,
    ) -> Result<Vec<StoredBookmark>, CoreError> {
        let bookmarks = sqlx::query_as::<_, StoredBookmark>(
            r#"
            SELECT bookmark_id, instance_id, hash, activity_node_id, activity_instance_id,
                   payload, correlation_id, auto_burn, created_at
            FROM bookmarks
            WHERE hash = ?1
              AND (?2 IS NULL OR correlation_id = ?2)
            ORDER BY created_at, bookmark_id
            "#,
        )
        .bind(hash)
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookmarks)
    }

    async fn replace_triggers(
        &self,
        definition_id: &str,
        triggers: &[StoredTrigger],
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM triggers WHERE definition_id = ?")
            .bind(definition_id)
            .execute(&mut *tx)
            .await?;

        for trigger in triggers {
            sqlx::query(
                r#"
                INSERT INTO triggers (definition_id, activity_id, hash)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(definition_id)
            .bind(&trigger.activity_id)
            .bind(&trigger.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_triggers(&self, definition_id: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM triggers WHERE definition_id = ?")
            .bind(definition_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_triggers(&self, hash: &str) -> Result<Vec<StoredTrigger>, CoreError> {
        let triggers = sqlx::query_as::<_, StoredTrigger>(
            r#"
            SELECT definition_id, activity_id, hash
            FROM triggers
            WHERE hash = ?
            ORDER BY definition_id, activity_id
            "#,
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await?;

        Ok(triggers)
    }

    async fn find_triggers_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<StoredTrigger>, CoreError> {
        let triggers = sqlx::query_as::<_, StoredTrigger>(
            r#"
            SELECT definition_id, activity_id, hash
            FROM triggers
            WHERE definition_id = ?
            ORDER BY activity_id
            "#,
        )
        .bind(definition_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(triggers)
    }

    async fn save_snapshot(&self, actor_key: &str, instance_id: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (actor_key, instance_id, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (actor_key) DO UPDATE SET
                instance_id = excluded.instance_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(actor_key)
        .bind(instance_id)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_snapshot(&self, actor_key: &str) -> Result<Option<SnapshotRecord>, CoreError> {
        let snapshot = sqlx::query_as::<_, SnapshotRecord>(
            r#"
            SELECT actor_key, instance_id, updated_at
            FROM snapshots
            WHERE actor_key = ?
            "#,
        )
        .bind(actor_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    async fn delete_snapshot(&self, actor_key: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM snapshots WHERE actor_key = ?")
            .bind(actor_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
