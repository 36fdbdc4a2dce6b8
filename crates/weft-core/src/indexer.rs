// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trigger indexing for workflow definitions.
//!
//! Whenever a definition is published its trigger sources are hashed and the
//! stored trigger set is replaced; when it is retracted or deleted the set is
//! removed. Every structural change is broadcast so downstream caches can
//! evict the affected hashes.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument};

use weft_engine::WorkflowDefinition;

use crate::error::CoreError;
use crate::notifications::RuntimeEvent;
use crate::persistence::{RuntimeStore, StoredTrigger};
use crate::stimulus::StimulusHasher;

/// Outcome of re-indexing one definition's triggers.
#[derive(Debug, Clone, Default)]
pub struct IndexedTriggers {
    /// Hashes newly added by the re-index.
    pub added_hashes: Vec<String>,
    /// Hashes no longer present after the re-index.
    pub removed_hashes: Vec<String>,
}

/// Maintains the trigger index and emits invalidation events.
pub struct TriggerIndexer {
    store: Arc<dyn RuntimeStore>,
    hasher: StimulusHasher,
    events: broadcast::Sender<RuntimeEvent>,
}

impl TriggerIndexer {
    /// Create an indexer over the given store and event channel.
    pub fn new(store: Arc<dyn RuntimeStore>, events: broadcast::Sender<RuntimeEvent>) -> Self {
        Self {
            store,
            hasher: StimulusHasher::new(),
            events,
        }
    }

    /// Re-index a published definition's triggers.
    ///
    /// Replaces the stored trigger set for the definition with hashes
    /// computed from its trigger sources, then emits `TriggersIndexed`
    /// followed by `DefinitionPublished`.
    #[instrument(skip(self, definition), fields(definition_id = %definition.definition_id))]
    pub async fn index_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<IndexedTriggers, CoreError> {
        let existing = self
            .store
            .find_triggers_by_definition(&definition.definition_id)
            .await?;

        let triggers: Vec<StoredTrigger> = definition
            .triggers
            .iter()
            .map(|source| StoredTrigger {
                definition_id: definition.definition_id.clone(),
                activity_id: source.activity_id.clone(),
                hash: self.hasher.hash(&source.activity_type_name, &source.payload),
            })
            .collect();

        self.store
            .replace_triggers(&definition.definition_id, &triggers)
            .await?;

        let diff = diff_hashes(&existing, &triggers);
        info!(
            added = diff.added_hashes.len(),
            removed = diff.removed_hashes.len(),
            "definition triggers indexed"
        );

        self.emit(RuntimeEvent::TriggersIndexed {
            definition_id: definition.definition_id.clone(),
            added_hashes: diff.added_hashes.clone(),
            removed_hashes: diff.removed_hashes.clone(),
        });
        self.emit(RuntimeEvent::DefinitionPublished {
            definition_id: definition.definition_id.clone(),
        });

        Ok(diff)
    }

    /// Remove a retracted definition's triggers.
    pub async fn retract_definition(
        &self,
        definition_id: &str,
    ) -> Result<IndexedTriggers, CoreError> {
        let diff = self.remove_all_triggers(definition_id).await?;
        self.emit(RuntimeEvent::DefinitionRetracted {
            definition_id: definition_id.to_string(),
        });
        Ok(diff)
    }

    /// Remove a deleted definition's triggers.
    pub async fn delete_definition(
        &self,
        definition_id: &str,
    ) -> Result<IndexedTriggers, CoreError> {
        let diff = self.remove_all_triggers(definition_id).await?;
        self.emit(RuntimeEvent::DefinitionDeleted {
            definition_id: definition_id.to_string(),
        });
        Ok(diff)
    }

    async fn remove_all_triggers(&self, definition_id: &str) -> Result<IndexedTriggers, CoreError> {
        let existing = self.store.find_triggers_by_definition(definition_id).await?;
        self.store.remove_triggers(definition_id).await?;

        let diff = diff_hashes(&existing, &[]);
        self.emit(RuntimeEvent::TriggersIndexed {
            definition_id: definition_id.to_string(),
            added_hashes: Vec::new(),
            removed_hashes: diff.removed_hashes.clone(),
        });

        Ok(diff)
    }

    fn emit(&self, event: RuntimeEvent) {
        // Delivery is best-effort here; a receiverless channel just means no
        // cache is mirroring the index right now.
        let _ = self.events.send(event);
    }
}

fn diff_hashes(existing: &[StoredTrigger], updated: &[StoredTrigger]) -> IndexedTriggers {
    let existing_hashes: HashSet<&str> = existing.iter().map(|t| t.hash.as_str()).collect();
    let updated_hashes: HashSet<&str> = updated.iter().map(|t| t.hash.as_str()).collect();

    let mut added_hashes: Vec<String> = updated_hashes
        .difference(&existing_hashes)
        .map(|hash| hash.to_string())
        .collect();
    let mut removed_hashes: Vec<String> = existing_hashes
        .difference(&updated_hashes)
        .map(|hash| hash.to_string())
        .collect();
    added_hashes.sort();
    removed_hashes.sort();

    IndexedTriggers {
        added_hashes,
        removed_hashes,
    }
}
