// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow instance state model.
//!
//! [`WorkflowState`] is the full serialized execution state of one workflow
//! instance: lifecycle status, active bookmarks, recorded incidents, and
//! variables. It is what the runtime persists, snapshots, exports, and
//! imports; the execution engine mutates it through a host.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Instance is actively executing or ready to execute.
    Running,
    /// Instance is waiting on one or more bookmarks.
    Suspended,
    /// Instance completed successfully.
    Finished,
    /// Instance faulted with one or more incidents.
    Faulted,
    /// Instance was cancelled.
    Cancelled,
}

impl WorkflowStatus {
    /// Whether this status is terminal (no further execution possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Faulted | Self::Cancelled)
    }

    /// Stable lowercase name, as stored in the instance store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Finished => "finished",
            Self::Faulted => "faulted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer-grained phase within a [`WorkflowStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowSubStatus {
    /// Created but not yet run.
    Pending,
    /// An execution pass is in progress.
    Executing,
    /// Waiting on bookmarks.
    Suspended,
    /// Completed successfully.
    Finished,
    /// Faulted.
    Faulted,
    /// Cancelled.
    Cancelled,
}

impl WorkflowSubStatus {
    /// Stable lowercase name, as stored in the instance store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Finished => "finished",
            Self::Faulted => "faulted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowSubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault recorded during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// The activity that faulted.
    pub activity_id: String,
    /// Human-readable fault message.
    pub message: String,
    /// When the fault was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A durable marker recording that a suspended instance resumes when a
/// stimulus matching `hash` arrives.
///
/// The hash is a deterministic function of the owning activity's type name
/// and the semantically relevant payload fields, so structurally identical
/// stimuli resolve to the same hash regardless of instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique within the owning instance.
    pub id: String,
    /// Activity type name that created the bookmark.
    pub name: String,
    /// Content hash used for stimulus routing.
    pub hash: String,
    /// Node of the activity that created the bookmark.
    pub activity_node_id: String,
    /// Activity instance that created the bookmark.
    pub activity_instance_id: String,
    /// Opaque payload handed back to the activity on resume. Base64-encoded
    /// in serialized form.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub payload: Option<Vec<u8>>,
    /// Correlation ID inherited from the instance, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// When true, the bookmark is consumed on a single successful match.
    #[serde(default = "default_auto_burn")]
    pub auto_burn: bool,
}

fn default_auto_burn() -> bool {
    true
}

mod opt_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Full serialized execution state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The workflow instance ID.
    pub id: String,
    /// Definition this instance was created from.
    pub definition_id: String,
    /// Version of the definition this instance was created from.
    pub definition_version: i32,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Finer-grained phase.
    pub sub_status: WorkflowSubStatus,
    /// Optional caller-supplied grouping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Parent instance for sub-workflows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_instance_id: Option<String>,
    /// Input handed to the instance at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    /// Output produced on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Workflow variables, keyed by name.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Active bookmarks.
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    /// Faults recorded during execution.
    #[serde(default)]
    pub incidents: Vec<Incident>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the state was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create the initial state for a freshly created instance.
    pub fn new(id: impl Into<String>, definition_id: impl Into<String>, version: i32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            definition_id: definition_id.into(),
            definition_version: version,
            status: WorkflowStatus::Running,
            sub_status: WorkflowSubStatus::Pending,
            correlation_id: None,
            parent_instance_id: None,
            input: None,
            output: None,
            variables: BTreeMap::new(),
            bookmarks: Vec::new(),
            incidents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Find a bookmark by ID.
    pub fn find_bookmark(&self, bookmark_id: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == bookmark_id)
    }
}
