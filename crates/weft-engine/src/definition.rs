// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow definition handles, versioning, and trigger sources.
//!
//! Definition storage and versioning live outside the runtime; the runtime
//! only resolves definitions through [`DefinitionStore`]. The in-memory
//! implementation here backs tests and embedded deployments.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::host::EngineError;

/// How a definition version is selected when resolving a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOptions {
    /// The currently published version.
    Published,
    /// The highest version, published or not.
    Latest,
    /// An exact version number.
    Exact(i32),
}

impl fmt::Display for VersionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => f.write_str("published"),
            Self::Latest => f.write_str("latest"),
            Self::Exact(version) => write!(f, "exact({})", version),
        }
    }
}

/// A reference to a workflow definition: ID plus version selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionHandle {
    /// The definition ID.
    pub definition_id: String,
    /// Version selection.
    pub version: VersionOptions,
}

impl DefinitionHandle {
    /// Handle selecting the published version of a definition.
    pub fn published(definition_id: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            version: VersionOptions::Published,
        }
    }

    /// Handle selecting the latest version of a definition.
    pub fn latest(definition_id: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            version: VersionOptions::Latest,
        }
    }

    /// Handle selecting an exact version of a definition.
    pub fn exact(definition_id: impl Into<String>, version: i32) -> Self {
        Self {
            definition_id: definition_id.into(),
            version: VersionOptions::Exact(version),
        }
    }
}

impl fmt::Display for DefinitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.definition_id, self.version)
    }
}

/// A trigger declared on a definition: an activity that can start fresh
/// instances when a matching stimulus arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSource {
    /// The triggering activity's node ID.
    pub activity_id: String,
    /// The triggering activity's type name.
    pub activity_type_name: String,
    /// Semantically relevant payload fields used for hash computation.
    pub payload: serde_json::Value,
}

/// One version of a workflow definition.
///
/// The activity graph itself is opaque to the runtime; only the identity,
/// version, and declared trigger sources are visible here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// The definition ID, stable across versions.
    pub definition_id: String,
    /// This version's number.
    pub version: i32,
    /// Display name.
    pub name: String,
    /// Triggers declared by this version.
    pub triggers: Vec<TriggerSource>,
    /// Whether this version is the published one.
    pub published: bool,
}

/// Resolves definition handles to definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Find the definition a handle resolves to, or `None` if absent.
    async fn find(
        &self,
        handle: &DefinitionHandle,
    ) -> Result<Option<Arc<WorkflowDefinition>>, EngineError>;
}

/// In-memory definition store with publish/retract/delete lifecycle.
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    versions: RwLock<HashMap<String, Vec<Arc<WorkflowDefinition>>>>,
}

impl InMemoryDefinitionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition version and mark it as the published one.
    ///
    /// Any previously published version of the same definition is
    /// unpublished. Returns the stored definition.
    pub fn publish(&self, mut definition: WorkflowDefinition) -> Arc<WorkflowDefinition> {
        definition.published = true;
        let mut versions = self.versions.write().expect("definition store poisoned");
        let entries = versions.entry(definition.definition_id.clone()).or_default();
        for entry in entries.iter_mut() {
            if entry.published {
                let mut unpublished = (**entry).clone();
                unpublished.published = false;
                *entry = Arc::new(unpublished);
            }
        }
        entries.retain(|entry| entry.version != definition.version);
        let stored = Arc::new(definition);
        entries.push(stored.clone());
        entries.sort_by_key(|entry| entry.version);
        stored
    }

    /// Unpublish all versions of a definition, keeping them resolvable by
    /// exact version.
    pub fn retract(&self, definition_id: &str) {
        let mut versions = self.versions.write().expect("definition store poisoned");
        if let Some(entries) = versions.get_mut(definition_id) {
            for entry in entries.iter_mut() {
                if entry.published {
                    let mut unpublished = (**entry).clone();
                    unpublished.published = false;
                    *entry = Arc::new(unpublished);
                }
            }
        }
    }

    /// Remove all versions of a definition.
    pub fn delete(&self, definition_id: &str) {
        let mut versions = self.versions.write().expect("definition store poisoned");
        versions.remove(definition_id);
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn find(
        &self,
        handle: &DefinitionHandle,
    ) -> Result<Option<Arc<WorkflowDefinition>>, EngineError> {
        let versions = self.versions.read().expect("definition store poisoned");
        let Some(entries) = versions.get(&handle.definition_id) else {
            return Ok(None);
        };

        let found = match handle.version {
            VersionOptions::Published => entries.iter().rev().find(|entry| entry.published),
            VersionOptions::Latest => entries.last(),
            VersionOptions::Exact(version) => {
                entries.iter().find(|entry| entry.version == version)
            }
        };

        Ok(found.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, version: i32) -> WorkflowDefinition {
        WorkflowDefinition {
            definition_id: id.to_string(),
            version,
            name: format!("{} v{}", id, version),
            triggers: Vec::new(),
            published: false,
        }
    }

    #[tokio::test]
    async fn test_publish_and_resolve_published() {
        let store = InMemoryDefinitionStore::new();
        store.publish(definition("def-1", 1));
        store.publish(definition("def-1", 2));

        let found = store
            .find(&DefinitionHandle::published("def-1"))
            .await
            .unwrap()
            .expect("published version");
        assert_eq!(found.version, 2);

        // Version 1 is still resolvable by exact version.
        let old = store
            .find(&DefinitionHandle::exact("def-1", 1))
            .await
            .unwrap()
            .expect("exact version");
        assert_eq!(old.version, 1);
        assert!(!old.published);
    }

    #[tokio::test]
    async fn test_retract_removes_published_resolution() {
        let store = InMemoryDefinitionStore::new();
        store.publish(definition("def-1", 1));
        store.retract("def-1");

        let published = store
            .find(&DefinitionHandle::published("def-1"))
            .await
            .unwrap();
        assert!(published.is_none());

        let latest = store
            .find(&DefinitionHandle::latest("def-1"))
            .await
            .unwrap();
        assert!(latest.is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_all_versions() {
        let store = InMemoryDefinitionStore::new();
        store.publish(definition("def-1", 1));
        store.delete("def-1");

        let found = store
            .find(&DefinitionHandle::latest("def-1"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_unknown_definition_resolves_to_none() {
        let store = InMemoryDefinitionStore::new();
        let found = store
            .find(&DefinitionHandle::published("missing"))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
