//! Persistence interfaces and backends for weft-core.
//!
//! One trait covers the three durable concerns of the runtime: the workflow
//! instance store, the bookmark/trigger index, and the actor snapshot store.
//! All index mutations are addressed per content hash so unrelated hashes
//! are never contended.

pub mod memory;
pub mod sqlite;

pub use self::memory::InMemoryStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use weft_engine::{Bookmark, WorkflowState};

/// Workflow instance record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstanceRecord {
    /// Unique identifier for the instance.
    pub instance_id: String,
    /// Definition the instance was created from.
    pub definition_id: String,
    /// Version of the definition.
    pub definition_version: i32,
    /// Current status (running, suspended, finished, faulted, cancelled).
    pub status: String,
    /// Current sub-status.
    pub sub_status: String,
    /// Optional grouping key.
    pub correlation_id: Option<String>,
    /// Parent instance for sub-workflows.
    pub parent_instance_id: Option<String>,
    /// Serialized execution state (JSON).
    pub state: String,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Build a record from a workflow state, serializing it.
    pub fn from_state(state: &WorkflowState) -> Result<Self, CoreError> {
        let now = Utc::now();
        Ok(Self {
            instance_id: state.id.clone(),
            definition_id: state.definition_id.clone(),
            definition_version: state.definition_version,
            status: state.status.as_str().to_string(),
            sub_status: state.sub_status.as_str().to_string(),
            correlation_id: state.correlation_id.clone(),
            parent_instance_id: state.parent_instance_id.clone(),
            state: serde_json::to_string(state)?,
            created_at: state.created_at,
            updated_at: now,
            finished_at: state.status.is_terminal().then_some(now),
        })
    }

    /// Deserialize the stored execution state.
    pub fn workflow_state(&self) -> Result<WorkflowState, CoreError> {
        Ok(serde_json::from_str(&self.state)?)
    }
}

/// Bookmark record from the index.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredBookmark {
    /// Unique bookmark identifier.
    pub bookmark_id: String,
    /// Owning instance.
    pub instance_id: String,
    /// Content hash used for routing.
    pub hash: String,
    /// Node of the activity that created the bookmark.
    pub activity_node_id: String,
    /// Activity instance that created the bookmark.
    pub activity_instance_id: String,
    /// Opaque payload handed back on resume, base64-encoded.
    pub payload: Option<String>,
    /// Correlation ID inherited from the instance.
    pub correlation_id: Option<String>,
    /// Whether the bookmark is consumed on a single match.
    pub auto_burn: bool,
    /// When the bookmark was stored.
    pub created_at: DateTime<Utc>,
}

impl StoredBookmark {
    /// Build an index record from an instance's bookmark.
    pub fn from_bookmark(
        bookmark: &Bookmark,
        instance_id: &str,
        correlation_id: Option<&str>,
    ) -> Self {
        Self {
            bookmark_id: bookmark.id.clone(),
            instance_id: instance_id.to_string(),
            hash: bookmark.hash.clone(),
            activity_node_id: bookmark.activity_node_id.clone(),
            activity_instance_id: bookmark.activity_instance_id.clone(),
            payload: bookmark
                .payload
                .as_deref()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            correlation_id: bookmark
                .correlation_id
                .clone()
                .or_else(|| correlation_id.map(str::to_string)),
            auto_burn: bookmark.auto_burn,
            created_at: Utc::now(),
        }
    }
}

/// Trigger record from the index.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredTrigger {
    /// Definition the trigger belongs to.
    pub definition_id: String,
    /// The triggering activity's node ID.
    pub activity_id: String,
    /// Content hash used for routing.
    pub hash: String,
}

/// Actor recovery snapshot: a pointer record sufficient to rehydrate full
/// state lazily from the instance store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRecord {
    /// The actor identity the snapshot belongs to.
    pub actor_key: String,
    /// The instance bound to that actor identity.
    pub instance_id: String,
    /// When the snapshot was last written.
    pub updated_at: DateTime<Utc>,
}

/// Persistence interface used by actors, the index, and the runtime facade.
#[allow(missing_docs)]
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    // ========================================================================
    // Workflow instance store
    // ========================================================================

    /// Insert a new instance record. Fails if the instance already exists.
    async fn create_instance(&self, record: &InstanceRecord) -> Result<(), CoreError>;

    async fn find_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, CoreError>;

    /// Overwrite an instance's state and status columns.
    async fn save_instance_state(&self, record: &InstanceRecord) -> Result<(), CoreError>;

    /// Count non-terminal instances, optionally filtered.
    async fn count_running(
        &self,
        definition_id: Option<&str>,
        version: Option<i32>,
        correlation_id: Option<&str>,
    ) -> Result<i64, CoreError>;

    // ========================================================================
    // Bookmark index (per-hash granularity)
    // ========================================================================

    /// Upsert bookmarks under one hash.
    async fn store_bookmarks(
        &self,
        hash: &str,
        bookmarks: &[StoredBookmark],
    ) -> Result<(), CoreError>;

    /// Delete specific bookmarks of one instance under one hash. Bookmark
    /// IDs are only unique within an instance, so removal is always
    /// instance-scoped. Removing an already-removed bookmark is a no-op.
    /// Returns the number actually removed.
    async fn remove_bookmarks(
        &self,
        hash: &str,
        instance_id: &str,
        bookmark_ids: &[String],
    ) -> Result<u64, CoreError>;

    /// Delete all of one instance's bookmarks under one hash. Idempotent.
    async fn remove_bookmarks_by_instance(
        &self,
        hash: &str,
        instance_id: &str,
    ) -> Result<u64, CoreError>;

    /// Fetch bookmarks under one hash, optionally filtered by correlation ID.
    async fn find_bookmarks(
        &self,
        hash: &str,
        correlation_id: Option<&str>,
    ) -> Result<Vec<StoredBookmark>, CoreError>;

    // ========================================================================
    // Trigger index
    // ========================================================================

    /// Replace all triggers for a definition with the given set.
    async fn replace_triggers(
        &self,
        definition_id: &str,
        triggers: &[StoredTrigger],
    ) -> Result<(), CoreError>;

    /// Remove all triggers for a definition. Idempotent.
    async fn remove_triggers(&self, definition_id: &str) -> Result<u64, CoreError>;

    /// Fetch triggers matching a hash.
    async fn find_triggers(&self, hash: &str) -> Result<Vec<StoredTrigger>, CoreError>;

    /// Fetch all triggers for a definition.
    async fn find_triggers_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<StoredTrigger>, CoreError>;

    // ========================================================================
    // Actor snapshot store
    // ========================================================================

    /// Write (or overwrite) the snapshot for an actor identity.
    async fn save_snapshot(&self, actor_key: &str, instance_id: &str) -> Result<(), CoreError>;

    async fn load_snapshot(&self, actor_key: &str) -> Result<Option<SnapshotRecord>, CoreError>;

    /// Delete the snapshot for an actor identity. Idempotent.
    async fn delete_snapshot(&self, actor_key: &str) -> Result<(), CoreError>;
}
