// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for weft-core integration tests.
//!
//! Provides a TestContext wiring an in-memory store, an in-memory definition
//! store, and a scripted stub engine behind the cluster runtime.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub use weft_core::persistence::RuntimeStore;

use weft_core::persistence::InMemoryStore;
use weft_core::runtime::ClusterRuntime;
use weft_core::stimulus::StimulusHasher;
use weft_engine::{
    Bookmark, EngineError, InMemoryDefinitionStore, Incident, RunOptions, RunOutcome,
    TriggerSource, WorkflowDefinition, WorkflowHost, WorkflowHostFactory, WorkflowState,
    WorkflowStatus, WorkflowSubStatus,
};

/// An activity that suspends the workflow until a matching stimulus arrives.
#[derive(Debug, Clone)]
pub struct WaitPoint {
    pub activity_id: String,
    pub activity_type_name: String,
    pub payload: serde_json::Value,
}

impl WaitPoint {
    pub fn new(activity_id: &str, activity_type_name: &str, payload: serde_json::Value) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            activity_type_name: activity_type_name.to_string(),
            payload,
        }
    }
}

/// Scripted behavior for a stub execution host, keyed by definition ID.
#[derive(Debug, Clone)]
pub struct StubBehavior {
    /// Wait points reached on a fresh run; the instance suspends on them.
    pub wait_points: Vec<WaitPoint>,
    /// Verdict of the can-start check.
    pub admit: bool,
    /// When set, a fresh run faults with this message.
    pub fault_message: Option<String>,
    /// Artificial latency inside each run, for serialization tests.
    pub run_delay: Option<Duration>,
}

impl StubBehavior {
    /// Runs to completion on the first pass.
    pub fn completing() -> Self {
        Self {
            wait_points: Vec::new(),
            admit: true,
            fault_message: None,
            run_delay: None,
        }
    }

    /// Suspends on the given wait points; finishes once all are resumed.
    pub fn waiting(wait_points: Vec<WaitPoint>) -> Self {
        Self {
            wait_points,
            ..Self::completing()
        }
    }

    /// Rejects the can-start check.
    pub fn rejecting() -> Self {
        Self {
            admit: false,
            ..Self::completing()
        }
    }

    /// Faults on the first pass.
    pub fn faulting(message: &str) -> Self {
        Self {
            fault_message: Some(message.to_string()),
            ..Self::completing()
        }
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = Some(delay);
        self
    }
}

/// Host factory producing scripted stub hosts. Records every run's enter and
/// exit instants so tests can assert serialization.
pub struct StubHostFactory {
    behaviors: Mutex<HashMap<String, StubBehavior>>,
    pub run_log: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl StubHostFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(HashMap::new()),
            run_log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn set_behavior(&self, definition_id: &str, behavior: StubBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(definition_id.to_string(), behavior);
    }

    fn behavior_for(&self, definition_id: &str) -> StubBehavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(definition_id)
            .cloned()
            .unwrap_or_else(StubBehavior::completing)
    }
}

#[async_trait]
impl WorkflowHostFactory for StubHostFactory {
    async fn create(
        &self,
        definition: Arc<WorkflowDefinition>,
        state: WorkflowState,
    ) -> Result<Box<dyn WorkflowHost>, EngineError> {
        let behavior = self.behavior_for(&definition.definition_id);
        Ok(Box::new(StubHost {
            state,
            behavior,
            run_log: self.run_log.clone(),
        }))
    }
}

struct StubHost {
    state: WorkflowState,
    behavior: StubBehavior,
    run_log: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl StubHost {
    fn bump_run_counter(&mut self) {
        let runs = self
            .state
            .variables
            .get("runs")
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        self.state.variables.insert("runs".to_string(), json!(runs + 1));
    }

    fn outcome(&self) -> RunOutcome {
        RunOutcome {
            status: self.state.status,
            sub_status: self.state.sub_status,
            incidents: self.state.incidents.clone(),
            bookmarks: self.state.bookmarks.clone(),
        }
    }
}

#[async_trait]
impl WorkflowHost for StubHost {
    fn state(&self) -> &WorkflowState {
        &self.state
    }

    fn replace_state(&mut self, state: WorkflowState) {
        self.state = state;
    }

    async fn can_start(
        &mut self,
        _options: &RunOptions,
        _cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        Ok(self.behavior.admit)
    }

    async fn run(
        &mut self,
        options: &RunOptions,
        _cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let entered = Instant::now();
        if let Some(delay) = self.behavior.run_delay {
            tokio::time::sleep(delay).await;
        }

        self.bump_run_counter();

        if self.state.status.is_terminal() && options.bookmark_id.is_none() {
            // A run against a terminal instance leaves it untouched.
        } else if let Some(bookmark_id) = &options.bookmark_id {
            // Resume: the matched bookmark is consumed if auto-burn.
            let Some(bookmark) = self.state.find_bookmark(bookmark_id).cloned() else {
                return Err(EngineError::Execution(format!(
                    "bookmark '{}' not found",
                    bookmark_id
                )));
            };
            if bookmark.auto_burn {
                self.state.bookmarks.retain(|b| b.id != bookmark.id);
            }
            if self.state.bookmarks.is_empty() {
                self.state.status = WorkflowStatus::Finished;
                self.state.sub_status = WorkflowSubStatus::Finished;
                self.state.output = options.input.clone();
            } else {
                self.state.status = WorkflowStatus::Suspended;
                self.state.sub_status = WorkflowSubStatus::Suspended;
            }
        } else if let Some(message) = self.behavior.fault_message.clone() {
            self.state.status = WorkflowStatus::Faulted;
            self.state.sub_status = WorkflowSubStatus::Faulted;
            self.state.incidents.push(Incident {
                activity_id: "stub-activity".to_string(),
                message,
                timestamp: Utc::now(),
            });
        } else if self.state.status == WorkflowStatus::Suspended {
            // A run against a suspended instance without a bookmark leaves
            // the bookmark set untouched.
        } else if !self.behavior.wait_points.is_empty() {
            let hasher = StimulusHasher::new();
            for (index, point) in self.behavior.wait_points.iter().enumerate() {
                self.state.bookmarks.push(Bookmark {
                    id: format!("{}-bm-{}", self.state.id, index),
                    name: point.activity_type_name.clone(),
                    hash: hasher.hash(&point.activity_type_name, &point.payload),
                    activity_node_id: point.activity_id.clone(),
                    activity_instance_id: format!("{}-act-{}", self.state.id, index),
                    payload: None,
                    correlation_id: self.state.correlation_id.clone(),
                    auto_burn: true,
                });
            }
            self.state.status = WorkflowStatus::Suspended;
            self.state.sub_status = WorkflowSubStatus::Suspended;
        } else {
            self.state.status = WorkflowStatus::Finished;
            self.state.sub_status = WorkflowSubStatus::Finished;
            self.state.output = options.input.clone();
        }

        self.state.updated_at = Utc::now();
        self.run_log.lock().unwrap().push((entered, Instant::now()));
        Ok(self.outcome())
    }

    async fn cancel(&mut self, _cancel: &CancellationToken) -> Result<(), EngineError> {
        self.state.status = WorkflowStatus::Cancelled;
        self.state.sub_status = WorkflowSubStatus::Cancelled;
        self.state.bookmarks.clear();
        self.state.updated_at = Utc::now();
        Ok(())
    }
}

/// Test context wiring the runtime over in-memory collaborators.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub definitions: Arc<InMemoryDefinitionStore>,
    pub host_factory: Arc<StubHostFactory>,
    pub runtime: ClusterRuntime,
}

impl TestContext {
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(InMemoryStore::new());
        let definitions = Arc::new(InMemoryDefinitionStore::new());
        let host_factory = StubHostFactory::new();

        let runtime = ClusterRuntime::builder()
            .store(store.clone())
            .definitions(definitions.clone())
            .host_factory(host_factory.clone())
            .build()
            .expect("runtime builds with all collaborators set");

        Self {
            store,
            definitions,
            host_factory,
            runtime,
        }
    }

    /// Publish a definition and index its triggers.
    pub async fn publish(&self, definition: WorkflowDefinition) {
        let stored = self.definitions.publish(definition);
        self.runtime
            .index_triggers(&stored)
            .await
            .expect("trigger indexing succeeds");
    }
}

/// A definition with one HTTP trigger and no wait points.
pub fn http_definition(definition_id: &str, path: &str) -> WorkflowDefinition {
    WorkflowDefinition {
        definition_id: definition_id.to_string(),
        version: 1,
        name: definition_id.to_string(),
        triggers: vec![TriggerSource {
            activity_id: format!("{}-trigger", definition_id),
            activity_type_name: "HttpEndpoint".to_string(),
            payload: json!({"path": path}),
        }],
        published: true,
    }
}

/// A definition without any triggers.
pub fn plain_definition(definition_id: &str) -> WorkflowDefinition {
    WorkflowDefinition {
        definition_id: definition_id.to_string(),
        version: 1,
        name: definition_id.to_string(),
        triggers: Vec::new(),
        published: true,
    }
}

/// The hash the runtime computes for a stimulus, for direct index assertions.
pub fn stimulus_hash(activity_type_name: &str, payload: &serde_json::Value) -> String {
    StimulusHasher::new().hash(activity_type_name, payload)
}

/// Install a test subscriber once so RUST_LOG surfaces runtime traces.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
