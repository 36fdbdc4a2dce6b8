// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The execution host contract.
//!
//! A [`WorkflowHost`] is a workflow definition loaded into memory together
//! with one instance's state. The runtime drives it through `run`/`cancel`
//! and reads the updated state back; how the host schedules activities,
//! binds variables, or evaluates expressions is engine-internal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::definition::WorkflowDefinition;
use crate::state::{Bookmark, Incident, WorkflowState, WorkflowStatus, WorkflowSubStatus};

/// Errors surfaced by the execution engine.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A workflow definition could not be resolved.
    #[error("workflow definition '{0}' not found")]
    DefinitionNotFound(String),

    /// Execution failed inside the engine.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The operation was cancelled before completing.
    #[error("execution cancelled")]
    Cancelled,
}

/// Parameters for one execution pass over an instance.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resume the activity waiting on this bookmark.
    pub bookmark_id: Option<String>,
    /// Schedule a specific activity by handle.
    pub activity_handle: Option<String>,
    /// The trigger activity that admitted this start.
    pub trigger_activity_id: Option<String>,
    /// Input handed to the resumed or started activity.
    pub input: Option<serde_json::Value>,
    /// Additional caller properties.
    pub properties: Option<serde_json::Value>,
}

/// Result of one execution pass.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Status after the pass.
    pub status: WorkflowStatus,
    /// Sub-status after the pass.
    pub sub_status: WorkflowSubStatus,
    /// Incidents recorded during the pass.
    pub incidents: Vec<Incident>,
    /// Bookmarks active after the pass.
    pub bookmarks: Vec<Bookmark>,
}

/// A loaded execution host bound to one instance's state.
#[async_trait]
pub trait WorkflowHost: Send + Sync {
    /// The instance state as of the last completed operation.
    fn state(&self) -> &WorkflowState;

    /// Replace the instance state wholesale (state import).
    fn replace_state(&mut self, state: WorkflowState);

    /// Cheap admissibility check: would a start through the given trigger
    /// activity be accepted? Must not mutate durable state.
    async fn can_start(
        &mut self,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError>;

    /// Advance the instance: start fresh, resume a bookmark, or schedule a
    /// specific activity, per the options.
    async fn run(
        &mut self,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError>;

    /// Cooperatively cancel the instance.
    async fn cancel(&mut self, cancel: &CancellationToken) -> Result<(), EngineError>;
}

/// Creates hosts from a definition and an instance state.
#[async_trait]
pub trait WorkflowHostFactory: Send + Sync {
    /// Construct a host for the given definition, bound to the given state.
    async fn create(
        &self,
        definition: Arc<WorkflowDefinition>,
        state: WorkflowState,
    ) -> Result<Box<dyn WorkflowHost>, EngineError>;
}
