// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence implementation.
//!
//! Used by tests and embedded deployments that do not need durability. The
//! bookmark index is sharded by hash, matching the per-hash mutation
//! granularity of the durable backends.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::CoreError;

use super::{InstanceRecord, RuntimeStore, SnapshotRecord, StoredBookmark, StoredTrigger};

#[derive(Default)]
struct Inner {
    instances: HashMap<String, InstanceRecord>,
    /// hash -> bookmarks under that hash
    bookmarks: HashMap<String, Vec<StoredBookmark>>,
    /// definition_id -> triggers for that definition
    triggers: HashMap<String, Vec<StoredTrigger>>,
    snapshots: HashMap<String, SnapshotRecord>,
}

/// In-memory store backed by mutexed hash maps.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("in-memory store poisoned")
    }
}

#[async_trait]
impl RuntimeStore for InMemoryStore {
    async fn create_instance(&self, record: &InstanceRecord) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.instances.contains_key(&record.instance_id) {
            return Err(CoreError::Storage {
                operation: "create_instance".to_string(),
                details: format!("instance '{}' already exists", record.instance_id),
            });
        }
        inner
            .instances
            .insert(record.instance_id.clone(), record.clone());
        Ok(())
    }

    async fn find_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, CoreError> {
        Ok(self.lock().instances.get(instance_id).cloned())
    }

    async fn save_instance_state(&self, record: &InstanceRecord) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if !inner.instances.contains_key(&record.instance_id) {
            return Err(CoreError::InstanceNotFound {
                instance_id: record.instance_id.clone(),
            });
        }
        inner
            .instances
            .insert(record.instance_id.clone(), record.clone());
        Ok(())
    }

    async fn count_running(
        &self,
        definition_id: Option<&str>,
        version: Option<i32>,
        correlation_id: Option<&str>,
    ) -> Result<i64, CoreError> {
        let inner = self.lock();
        let count = inner
            .instances
            .values()
            .filter(|record| matches!(record.status.as_str(), "running" | "suspended"))
            .filter(|record| definition_id.is_none_or(|id| record.definition_id == id))
            .filter(|record| version.is_none_or(|v| record.definition_version == v))
            .filter(|record| {
                correlation_id.is_none_or(|c| record.correlation_id.as_deref() == Some(c))
            })
            .count();
        Ok(count as i64)
    }

    async fn store_bookmarks(
        &self,
        hash: &str,
        bookmarks: &[StoredBookmark],
    ) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let entries = inner.bookmarks.entry(hash.to_string()).or_default();
        for bookmark in bookmarks {
            entries.retain(|existing| {
                existing.bookmark_id != bookmark.bookmark_id
                    || existing.instance_id != bookmark.instance_id
            });
            entries.push(bookmark.clone());
        }
        Ok(())
    }

    async fn remove_bookmarks(
        &self,
        hash: &str,
        instance_id: &str,
        bookmark_ids: &[String],
    ) -> Result<u64, CoreError> {
        let mut inner = self.lock();
        let Some(entries) = inner.bookmarks.get_mut(hash) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|bookmark| {
            bookmark.instance_id != instance_id || !bookmark_ids.contains(&bookmark.bookmark_id)
        });
        Ok((before - entries.len()) as u64)
    }

    async fn remove_bookmarks_by_instance(
        &self,
        hash: &str,
        instance_id: &str,
    ) -> Result<u64, CoreError> {
        let mut inner = self.lock();
        let Some(entries) = inner.bookmarks.get_mut(hash) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|bookmark| bookmark.instance_id != instance_id);
        Ok((before - entries.len()) as u64)
    }

    async fn find_bookmarks(
        &self,
        hash: &str,
        correlation_id: Option<&str>,
    ) -> Result<Vec<StoredBookmark>, CoreError> {
        let inner = self.lock();
        let bookmarks = inner
            .bookmarks
            .get(hash)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|bookmark| {
                        correlation_id
                            .is_none_or(|c| bookmark.correlation_id.as_deref() == Some(c))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(bookmarks)
    }

    async fn replace_triggers(
        &self,
        definition_id: &str,
        triggers: &[StoredTrigger],
    ) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if triggers.is_empty() {
            inner.triggers.remove(definition_id);
        } else {
            inner
                .triggers
                .insert(definition_id.to_string(), triggers.to_vec());
        }
        Ok(())
    }

    async fn remove_triggers(&self, definition_id: &str) -> Result<u64, CoreError> {
        let mut inner = self.lock();
        let removed = inner
            .triggers
            .remove(definition_id)
            .map(|entries| entries.len())
            .unwrap_or(0);
        Ok(removed as u64)
    }

    async fn find_triggers(&self, hash: &str) -> Result<Vec<StoredTrigger>, CoreError> {
        let inner = self.lock();
        let mut matched: Vec<StoredTrigger> = inner
            .triggers
            .values()
            .flatten()
            .filter(|trigger| trigger.hash == hash)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (&a.definition_id, &a.activity_id).cmp(&(&b.definition_id, &b.activity_id))
        });
        Ok(matched)
    }

    async fn find_triggers_by_definition(
        &self,
        definition_id: &str,
    ) -> Result<Vec<StoredTrigger>, CoreError> {
        Ok(self
            .lock()
            .triggers
            .get(definition_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, actor_key: &str, instance_id: &str) -> Result<(), CoreError> {
        let mut inner = self.lock();
        inner.snapshots.insert(
            actor_key.to_string(),
            SnapshotRecord {
                actor_key: actor_key.to_string(),
                instance_id: instance_id.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load_snapshot(&self, actor_key: &str) -> Result<Option<SnapshotRecord>, CoreError> {
        Ok(self.lock().snapshots.get(actor_key).cloned())
    }

    async fn delete_snapshot(&self, actor_key: &str) -> Result<(), CoreError> {
        self.lock().snapshots.remove(actor_key);
        Ok(())
    }
}
