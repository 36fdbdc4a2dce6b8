// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster runtime facade for workflow instances.
//!
//! Translates caller-facing operations (start, resume, trigger, state
//! export/import, counting) into addressed calls against instance actors and
//! the bookmark/trigger index. Every call is routed by a stable key: the
//! instance ID for instance operations, the stimulus hash for bookmark and
//! trigger lookups. Callers never learn which actor - or which node - holds
//! the target.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_core::runtime::ClusterRuntime;
//! use weft_core::persistence::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::from_path(".data/weft.db").await?);
//!
//!     let runtime = ClusterRuntime::builder()
//!         .store(store)
//!         .definitions(definitions)
//!         .host_factory(host_factory)
//!         .build()?;
//!
//!     let result = runtime
//!         .trigger_workflows("HttpEndpoint", serde_json::json!({"path": "/orders"}), Default::default())
//!         .await?;
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use weft_engine::{DefinitionHandle, DefinitionStore, WorkflowHostFactory, WorkflowState};

use crate::error::CoreError;
use crate::indexer::{IndexedTriggers, TriggerIndexer};
use crate::messages::{
    BulkExecutionResult, CanStartRequest, CanStartResult, CandidateFailure, CountFilter,
    CreateInstanceRequest, ExecutionResult, ResumeOptions, ResumeResult, RunInstanceRequest,
    StartOptions, TriggerOptions, TriggerResult, WorkflowMatch, WorkflowsFilter,
};
use crate::notifications::RuntimeEvent;
use crate::persistence::{RuntimeStore, StoredBookmark};
use crate::registry::ActorRegistry;
use crate::stimulus::StimulusHasher;

/// Builder for creating a [`ClusterRuntime`].
pub struct ClusterRuntimeBuilder {
    store: Option<Arc<dyn RuntimeStore>>,
    definitions: Option<Arc<dyn DefinitionStore>>,
    host_factory: Option<Arc<dyn WorkflowHostFactory>>,
    mailbox_capacity: usize,
    event_capacity: usize,
}

impl std::fmt::Debug for ClusterRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRuntimeBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("definitions", &self.definitions.as_ref().map(|_| "..."))
            .field("host_factory", &self.host_factory.as_ref().map(|_| "..."))
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

impl Default for ClusterRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            definitions: None,
            host_factory: None,
            mailbox_capacity: 64,
            event_capacity: 256,
        }
    }
}

impl ClusterRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn store(mut self, store: Arc<dyn RuntimeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the definition store (required).
    pub fn definitions(mut self, definitions: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Set the execution host factory (required).
    pub fn host_factory(mut self, host_factory: Arc<dyn WorkflowHostFactory>) -> Self {
        self.host_factory = Some(host_factory);
        self
    }

    /// Set the per-actor mailbox capacity.
    ///
    /// Default: 64
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Set the runtime event channel capacity.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the runtime.
    ///
    /// Returns an error if required collaborators are missing.
    pub fn build(self) -> Result<ClusterRuntime> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let definitions = self
            .definitions
            .ok_or_else(|| anyhow::anyhow!("definitions is required"))?;
        let host_factory = self
            .host_factory
            .ok_or_else(|| anyhow::anyhow!("host_factory is required"))?;

        let (events, _) = broadcast::channel(self.event_capacity);
        let registry = ActorRegistry::new(
            store.clone(),
            definitions.clone(),
            host_factory,
            self.mailbox_capacity,
        );
        let indexer = TriggerIndexer::new(store.clone(), events.clone());

        Ok(ClusterRuntime {
            store,
            definitions,
            registry,
            indexer,
            hasher: StimulusHasher::new(),
            events,
        })
    }
}

/// The cluster runtime: the caller-facing facade over instance actors, the
/// bookmark/trigger index, and the snapshot store.
pub struct ClusterRuntime {
    store: Arc<dyn RuntimeStore>,
    definitions: Arc<dyn DefinitionStore>,
    registry: ActorRegistry,
    indexer: TriggerIndexer,
    hasher: StimulusHasher,
    events: broadcast::Sender<RuntimeEvent>,
}

impl std::fmt::Debug for ClusterRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRuntime")
            .field("store", &"...")
            .field("definitions", &"...")
            .field("host_factory", &"...")
            .finish_non_exhaustive()
    }
}

impl ClusterRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ClusterRuntimeBuilder {
        ClusterRuntimeBuilder::new()
    }

    /// Subscribe to definition and trigger-index change events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// The actor registry for this node.
    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    /// The persistence layer.
    pub fn store(&self) -> &Arc<dyn RuntimeStore> {
        &self.store
    }

    // ========================================================================
    // Single-instance operations
    // ========================================================================

    /// Probe whether a definition would admit a start, without paying for a
    /// durable instance. Returns the probed instance ID alongside the
    /// verdict.
    pub async fn can_start_workflow(
        &self,
        definition_id: &str,
        options: StartOptions,
    ) -> Result<CanStartResult, CoreError> {
        let instance_id = options
            .instance_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = CanStartRequest {
            definition_handle: DefinitionHandle {
                definition_id: definition_id.to_string(),
                version: options.version,
            },
            trigger_activity_id: options.trigger_activity_id,
            correlation_id: options.correlation_id,
            input: options.input,
        };

        let client = self.registry.client(&instance_id);
        let result = client.can_start(request).await;

        // The probe leaves no durable footprint; release its actor. A later
        // start against the same instance ID spawns a fresh one.
        self.registry.stop(&instance_id).await;

        Ok(CanStartResult {
            instance_id,
            can_start: result?,
        })
    }

    /// Create and run a workflow instance from a definition.
    #[instrument(skip(self, options))]
    pub async fn start_workflow(
        &self,
        definition_id: &str,
        options: StartOptions,
    ) -> Result<ExecutionResult, CoreError> {
        let instance_id = options
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let client = self.registry.client(&instance_id);

        client
            .create(CreateInstanceRequest {
                instance_id: Some(instance_id.clone()),
                definition_handle: DefinitionHandle {
                    definition_id: definition_id.to_string(),
                    version: options.version,
                },
                correlation_id: options.correlation_id,
                input: options.input.clone(),
                properties: options.properties.clone(),
                parent_instance_id: options.parent_instance_id,
            })
            .await?;

        let response = client
            .run(RunInstanceRequest {
                trigger_activity_id: options.trigger_activity_id,
                input: options.input,
                properties: options.properties,
                ..Default::default()
            })
            .await?;

        debug!(instance_id = %instance_id, status = %response.status, "workflow started");

        Ok(ExecutionResult {
            instance_id,
            bookmarks: response.bookmarks,
        })
    }

    /// Start a workflow if its definition exists; `None` when it does not.
    ///
    /// The soft not-found applies to starts only: operating on an existing
    /// instance ID that cannot be found remains a fatal error.
    pub async fn try_start_workflow(
        &self,
        definition_id: &str,
        options: StartOptions,
    ) -> Result<Option<ExecutionResult>, CoreError> {
        let handle = DefinitionHandle {
            definition_id: definition_id.to_string(),
            version: options.version,
        };
        if self
            .definitions
            .find(&handle)
            .await
            .map_err(CoreError::from)?
            .is_none()
        {
            return Ok(None);
        }

        self.start_workflow(definition_id, options).await.map(Some)
    }

    /// Resume one workflow instance, optionally at a specific bookmark.
    pub async fn resume_workflow(
        &self,
        instance_id: &str,
        options: ResumeOptions,
    ) -> Result<ResumeResult, CoreError> {
        let client = self.registry.client(instance_id);
        let response = client
            .run(RunInstanceRequest {
                bookmark_id: options.bookmark_id,
                activity_handle: options.activity_id,
                input: options.input,
                properties: options.properties,
                ..Default::default()
            })
            .await?;

        Ok(ResumeResult {
            bookmarks: response.bookmarks,
        })
    }

    /// Cooperatively cancel a workflow instance.
    pub async fn cancel_workflow(&self, instance_id: &str) -> Result<(), CoreError> {
        self.registry.client(instance_id).cancel().await
    }

    /// Export an instance's full serialized state.
    pub async fn export_workflow_state(
        &self,
        instance_id: &str,
    ) -> Result<WorkflowState, CoreError> {
        let serialized = self.registry.client(instance_id).export_state().await?;
        Ok(serde_json::from_str(&serialized)?)
    }

    /// Import a full workflow state into the actor addressed by its ID,
    /// replacing and persisting it.
    pub async fn import_workflow_state(&self, state: &WorkflowState) -> Result<(), CoreError> {
        let serialized = serde_json::to_string(state)?;
        self.registry.client(&state.id).import_state(serialized).await
    }

    /// Ask an instance's actor to stop after its mailbox drains.
    pub async fn stop_workflow_actor(&self, instance_id: &str) {
        self.registry.stop(instance_id).await;
    }

    // ========================================================================
    // Bulk stimulus operations
    // ========================================================================

    /// Start every definition whose trigger matches the stimulus.
    ///
    /// Two-phase per candidate: the cheap can-start probe runs first, and
    /// only admitted candidates pay for a durable instance and host. One
    /// candidate's failure never aborts the rest; failures are reported in
    /// the result.
    #[instrument(skip(self, payload, options))]
    pub async fn start_workflows(
        &self,
        activity_type_name: &str,
        payload: &serde_json::Value,
        options: &TriggerOptions,
    ) -> Result<BulkExecutionResult, CoreError> {
        let hash = self.hasher.hash(activity_type_name, payload);
        let triggers = self.store.find_triggers(&hash).await?;
        let mut result = BulkExecutionResult::default();

        for trigger in triggers {
            let start_options = StartOptions {
                correlation_id: options.correlation_id.clone(),
                input: options.input.clone(),
                trigger_activity_id: Some(trigger.activity_id.clone()),
                ..Default::default()
            };

            match self
                .can_start_workflow(&trigger.definition_id, start_options.clone())
                .await
            {
                Ok(can_start) if !can_start.can_start => {
                    debug!(
                        definition_id = %trigger.definition_id,
                        "trigger matched but can-start check rejected the candidate"
                    );
                }
                Ok(_) => match self
                    .start_workflow(&trigger.definition_id, start_options)
                    .await
                {
                    Ok(execution) => result.succeeded.push(execution),
                    Err(error) => {
                        warn!(definition_id = %trigger.definition_id, %error, "start candidate failed");
                        result.failures.push(CandidateFailure {
                            definition_id: Some(trigger.definition_id.clone()),
                            instance_id: None,
                            bookmark_id: None,
                            error_code: error.error_code().to_string(),
                            error: error.to_string(),
                        });
                    }
                },
                Err(error) => {
                    warn!(definition_id = %trigger.definition_id, %error, "can-start check failed");
                    result.failures.push(CandidateFailure {
                        definition_id: Some(trigger.definition_id.clone()),
                        instance_id: None,
                        bookmark_id: None,
                        error_code: error.error_code().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Resume every instance with a bookmark matching the stimulus.
    ///
    /// Multiple bookmarks for the same instance are resumed independently,
    /// one `Run` per bookmark: a bookmark match is always scoped to exactly
    /// one activity resumption point.
    #[instrument(skip(self, payload, options))]
    pub async fn resume_workflows(
        &self,
        activity_type_name: &str,
        payload: &serde_json::Value,
        options: &TriggerOptions,
    ) -> Result<BulkExecutionResult, CoreError> {
        let hash = self.hasher.hash(activity_type_name, payload);
        let bookmarks = self
            .store
            .find_bookmarks(&hash, options.correlation_id.as_deref())
            .await?;
        let mut result = BulkExecutionResult::default();

        for bookmark in bookmarks {
            let resume = self
                .resume_workflow(
                    &bookmark.instance_id,
                    ResumeOptions {
                        bookmark_id: Some(bookmark.bookmark_id.clone()),
                        correlation_id: options.correlation_id.clone(),
                        input: options.input.clone(),
                        ..Default::default()
                    },
                )
                .await;

            match resume {
                Ok(resumed) => result.succeeded.push(ExecutionResult {
                    instance_id: bookmark.instance_id.clone(),
                    bookmarks: resumed.bookmarks,
                }),
                Err(error) => {
                    warn!(
                        instance_id = %bookmark.instance_id,
                        bookmark_id = %bookmark.bookmark_id,
                        %error,
                        "resume candidate failed"
                    );
                    result.failures.push(CandidateFailure {
                        definition_id: None,
                        instance_id: Some(bookmark.instance_id.clone()),
                        bookmark_id: Some(bookmark.bookmark_id.clone()),
                        error_code: error.error_code().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Start and resume workflows for one stimulus: the unconditional union
    /// of [`start_workflows`](Self::start_workflows) and
    /// [`resume_workflows`](Self::resume_workflows). A stimulus may
    /// simultaneously start new instances and resume existing ones.
    pub async fn trigger_workflows(
        &self,
        activity_type_name: &str,
        payload: &serde_json::Value,
        options: &TriggerOptions,
    ) -> Result<TriggerResult, CoreError> {
        let started = self
            .start_workflows(activity_type_name, payload, options)
            .await?;
        let resumed = self
            .resume_workflows(activity_type_name, payload, options)
            .await?;

        let mut failures = started.failures;
        failures.extend(resumed.failures);

        Ok(TriggerResult {
            started: started.succeeded,
            resumed: resumed.succeeded,
            failures,
        })
    }

    /// Collect the workflows a stimulus would start or resume, without
    /// executing any of them. Startable matches have already passed the
    /// can-start check; pass a match to
    /// [`execute_workflow`](Self::execute_workflow) to run it.
    pub async fn find_workflows(
        &self,
        filter: &WorkflowsFilter,
    ) -> Result<Vec<WorkflowMatch>, CoreError> {
        let hash = self.hasher.hash(&filter.activity_type_name, &filter.payload);
        let mut matches = Vec::new();

        for trigger in self.store.find_triggers(&hash).await? {
            let can_start = self
                .can_start_workflow(
                    &trigger.definition_id,
                    StartOptions {
                        correlation_id: filter.correlation_id.clone(),
                        input: filter.input.clone(),
                        trigger_activity_id: Some(trigger.activity_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;

            if can_start.can_start {
                matches.push(WorkflowMatch::Startable {
                    definition_id: trigger.definition_id,
                    instance_id: can_start.instance_id,
                    activity_id: trigger.activity_id,
                    correlation_id: filter.correlation_id.clone(),
                });
            }
        }

        for bookmark in self
            .store
            .find_bookmarks(&hash, filter.correlation_id.as_deref())
            .await?
        {
            matches.push(WorkflowMatch::Resumable {
                instance_id: bookmark.instance_id,
                bookmark_id: bookmark.bookmark_id,
                correlation_id: filter.correlation_id.clone(),
            });
        }

        Ok(matches)
    }

    /// Execute a previously collected workflow match.
    pub async fn execute_workflow(
        &self,
        workflow_match: &WorkflowMatch,
        input: Option<serde_json::Value>,
    ) -> Result<ExecutionResult, CoreError> {
        match workflow_match {
            WorkflowMatch::Startable {
                definition_id,
                instance_id,
                activity_id,
                correlation_id,
            } => {
                self.start_workflow(
                    definition_id,
                    StartOptions {
                        instance_id: Some(instance_id.clone()),
                        correlation_id: correlation_id.clone(),
                        input,
                        trigger_activity_id: Some(activity_id.clone()),
                        ..Default::default()
                    },
                )
                .await
            }
            WorkflowMatch::Resumable {
                instance_id,
                bookmark_id,
                correlation_id,
            } => {
                let resumed = self
                    .resume_workflow(
                        instance_id,
                        ResumeOptions {
                            bookmark_id: Some(bookmark_id.clone()),
                            correlation_id: correlation_id.clone(),
                            input,
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(ExecutionResult {
                    instance_id: instance_id.clone(),
                    bookmarks: resumed.bookmarks,
                })
            }
        }
    }

    // ========================================================================
    // Index maintenance
    // ========================================================================

    /// Apply a bookmark diff for an instance: removals are deleted by hash
    /// group first, then additions are upserted, so there is no transient
    /// state where both old and new entries for the same activity are
    /// simultaneously resumable.
    pub async fn update_bookmarks(
        &self,
        instance_id: &str,
        added: &[weft_engine::Bookmark],
        removed: &[weft_engine::Bookmark],
        correlation_id: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut removed_hashes: Vec<&str> = removed.iter().map(|b| b.hash.as_str()).collect();
        removed_hashes.sort_unstable();
        removed_hashes.dedup();
        for hash in removed_hashes {
            let bookmark_ids: Vec<String> = removed
                .iter()
                .filter(|b| b.hash == hash)
                .map(|b| b.id.clone())
                .collect();
            self.store
                .remove_bookmarks(hash, instance_id, &bookmark_ids)
                .await?;
        }

        let mut added_hashes: Vec<&str> = added.iter().map(|b| b.hash.as_str()).collect();
        added_hashes.sort_unstable();
        added_hashes.dedup();
        for hash in added_hashes {
            let bookmarks: Vec<StoredBookmark> = added
                .iter()
                .filter(|b| b.hash == hash)
                .map(|b| StoredBookmark::from_bookmark(b, instance_id, correlation_id))
                .collect();
            self.store.store_bookmarks(hash, &bookmarks).await?;
        }

        Ok(())
    }

    /// Re-index a published definition's triggers and notify caches.
    pub async fn index_triggers(
        &self,
        definition: &weft_engine::WorkflowDefinition,
    ) -> Result<IndexedTriggers, CoreError> {
        self.indexer.index_definition(definition).await
    }

    /// Remove a retracted definition's triggers and notify caches.
    pub async fn retract_definition(
        &self,
        definition_id: &str,
    ) -> Result<IndexedTriggers, CoreError> {
        self.indexer.retract_definition(definition_id).await
    }

    /// Remove a deleted definition's triggers and notify caches.
    pub async fn delete_definition(
        &self,
        definition_id: &str,
    ) -> Result<IndexedTriggers, CoreError> {
        self.indexer.delete_definition(definition_id).await
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Count non-terminal workflow instances, optionally filtered.
    pub async fn count_running_workflows(&self, filter: &CountFilter) -> Result<i64, CoreError> {
        self.store
            .count_running(
                filter.definition_id.as_deref(),
                filter.version,
                filter.correlation_id.as_deref(),
            )
            .await
    }

    /// Stop all actors on this node after their mailboxes drain.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_collaborators() {
        let result = ClusterRuntime::builder().build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("store is required"));
    }

    #[test]
    fn test_builder_debug_redacts_collaborators() {
        let builder = ClusterRuntime::builder().mailbox_capacity(8);
        let debug = format!("{:?}", builder);
        assert!(debug.contains("mailbox_capacity: 8"));
    }
}
