// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request, response, and option types for runtime and actor operations.
//!
//! These are logical contracts: transport-agnostic, serde-serializable where
//! callers need to ship them across a process boundary.

use serde::{Deserialize, Serialize};
use weft_engine::{
    Bookmark, DefinitionHandle, Incident, RunOptions, VersionOptions, WorkflowStatus,
    WorkflowSubStatus,
};

/// Request to create a workflow instance on an actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Caller-supplied instance ID; generated when absent.
    pub instance_id: Option<String>,
    /// The definition to instantiate.
    pub definition_handle: DefinitionHandle,
    /// Optional grouping key.
    pub correlation_id: Option<String>,
    /// Input handed to the instance.
    pub input: Option<serde_json::Value>,
    /// Additional caller properties.
    pub properties: Option<serde_json::Value>,
    /// Parent instance for sub-workflows.
    pub parent_instance_id: Option<String>,
}

/// Request to probe whether a definition would admit a start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanStartRequest {
    /// The definition to probe.
    pub definition_handle: DefinitionHandle,
    /// The trigger activity the stimulus arrived through.
    pub trigger_activity_id: Option<String>,
    /// Optional grouping key.
    pub correlation_id: Option<String>,
    /// Input that would be handed to the instance.
    pub input: Option<serde_json::Value>,
}

/// Request to advance a workflow instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInstanceRequest {
    /// Resume the activity waiting on this bookmark.
    pub bookmark_id: Option<String>,
    /// Schedule a specific activity by handle.
    pub activity_handle: Option<String>,
    /// The trigger activity that admitted this start.
    pub trigger_activity_id: Option<String>,
    /// Input for the resumed or started activity.
    pub input: Option<serde_json::Value>,
    /// Additional caller properties.
    pub properties: Option<serde_json::Value>,
}

impl RunInstanceRequest {
    /// Convert into engine run options.
    pub fn into_options(self) -> RunOptions {
        RunOptions {
            bookmark_id: self.bookmark_id,
            activity_handle: self.activity_handle,
            trigger_activity_id: self.trigger_activity_id,
            input: self.input,
            properties: self.properties,
        }
    }
}

/// Response from advancing a workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInstanceResponse {
    /// Status after the pass.
    pub status: WorkflowStatus,
    /// Sub-status after the pass.
    pub sub_status: WorkflowSubStatus,
    /// Incidents recorded during the pass.
    pub incidents: Vec<Incident>,
    /// Bookmarks active after the pass.
    pub bookmarks: Vec<Bookmark>,
}

/// Options for starting a workflow through the cluster runtime.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Which definition version to start.
    pub version: VersionOptions,
    /// Pre-generated instance ID; generated when absent.
    pub instance_id: Option<String>,
    /// Optional grouping key.
    pub correlation_id: Option<String>,
    /// Input handed to the instance.
    pub input: Option<serde_json::Value>,
    /// Additional caller properties.
    pub properties: Option<serde_json::Value>,
    /// The trigger activity that admitted this start.
    pub trigger_activity_id: Option<String>,
    /// Parent instance for sub-workflows.
    pub parent_instance_id: Option<String>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            version: VersionOptions::Published,
            instance_id: None,
            correlation_id: None,
            input: None,
            properties: None,
            trigger_activity_id: None,
            parent_instance_id: None,
        }
    }
}

/// Options for resuming a single workflow instance.
#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    /// The bookmark to resume.
    pub bookmark_id: Option<String>,
    /// Resume by activity handle instead of bookmark ID.
    pub activity_id: Option<String>,
    /// Optional grouping key.
    pub correlation_id: Option<String>,
    /// Input for the resumed activity.
    pub input: Option<serde_json::Value>,
    /// Additional caller properties.
    pub properties: Option<serde_json::Value>,
}

/// Options for bulk trigger/resume operations keyed by stimulus.
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    /// Restrict matched bookmarks to this correlation ID.
    pub correlation_id: Option<String>,
    /// Input handed to each started or resumed instance.
    pub input: Option<serde_json::Value>,
}

/// Result of a can-start probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanStartResult {
    /// The instance ID the probe was addressed by.
    pub instance_id: String,
    /// Whether the definition would admit the start.
    pub can_start: bool,
}

/// Result of starting or resuming one workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The affected instance.
    pub instance_id: String,
    /// Bookmarks active after the operation.
    pub bookmarks: Vec<Bookmark>,
}

/// Result of resuming one workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeResult {
    /// Bookmarks active after the resume.
    pub bookmarks: Vec<Bookmark>,
}

/// A candidate that failed during a bulk start/resume operation.
///
/// Bulk operations evaluate candidates independently: one candidate's
/// failure never aborts the rest, and failures are reported here instead of
/// being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// The definition involved, for start candidates.
    pub definition_id: Option<String>,
    /// The instance involved, when known.
    pub instance_id: Option<String>,
    /// The bookmark involved, for resume candidates.
    pub bookmark_id: Option<String>,
    /// Stable error code from [`crate::error::CoreError::error_code`].
    pub error_code: String,
    /// Human-readable error message.
    pub error: String,
}

/// Result of a bulk start or bulk resume operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkExecutionResult {
    /// Candidates that were started or resumed.
    pub succeeded: Vec<ExecutionResult>,
    /// Candidates that failed; see [`CandidateFailure`].
    pub failures: Vec<CandidateFailure>,
}

/// Result of triggering workflows: the union of bulk start and bulk resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerResult {
    /// Instances started by the stimulus.
    pub started: Vec<ExecutionResult>,
    /// Instances resumed by the stimulus.
    pub resumed: Vec<ExecutionResult>,
    /// Candidates that failed on either side.
    pub failures: Vec<CandidateFailure>,
}

/// A workflow matched by a stimulus, collected without executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowMatch {
    /// A definition whose trigger matched and whose can-start check passed.
    Startable {
        /// The matched definition.
        definition_id: String,
        /// The instance ID reserved for the start.
        instance_id: String,
        /// The trigger activity that matched.
        activity_id: String,
        /// Correlation ID carried from the filter.
        correlation_id: Option<String>,
    },
    /// An existing instance with a matching bookmark.
    Resumable {
        /// The matched instance.
        instance_id: String,
        /// The matched bookmark.
        bookmark_id: String,
        /// Correlation ID carried from the filter.
        correlation_id: Option<String>,
    },
}

/// Filter for collecting workflow matches for a stimulus.
#[derive(Debug, Clone)]
pub struct WorkflowsFilter {
    /// The stimulus activity type name.
    pub activity_type_name: String,
    /// The stimulus payload.
    pub payload: serde_json::Value,
    /// Restrict matches to this correlation ID.
    pub correlation_id: Option<String>,
    /// Input handed to matches executed later.
    pub input: Option<serde_json::Value>,
}

/// Filter for counting running workflow instances.
#[derive(Debug, Clone, Default)]
pub struct CountFilter {
    /// Restrict to one definition.
    pub definition_id: Option<String>,
    /// Restrict to one definition version.
    pub version: Option<i32>,
    /// Restrict to one correlation ID.
    pub correlation_id: Option<String>,
}
