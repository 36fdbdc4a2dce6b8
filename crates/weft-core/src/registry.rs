// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Actor registry: resolves an instance ID to its owning actor.
//!
//! One mailbox per instance ID guarantees serialization without a global
//! lock. The registry is the per-node shard of actor placement; in a
//! distributed deployment a consistent-hashing or leader-assignment layer
//! decides which node's registry owns a key, and callers never learn which.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use weft_engine::{DefinitionStore, WorkflowHostFactory};

use crate::actor::{ActorHandle, ActorMessage, spawn_actor};
use crate::error::CoreError;
use crate::messages::{
    CanStartRequest, CreateInstanceRequest, RunInstanceRequest, RunInstanceResponse,
};
use crate::persistence::RuntimeStore;

/// Registry of live instance actors, keyed by instance ID.
pub struct ActorRegistry {
    actors: Mutex<HashMap<String, ActorHandle>>,
    store: Arc<dyn RuntimeStore>,
    definitions: Arc<dyn DefinitionStore>,
    host_factory: Arc<dyn WorkflowHostFactory>,
    mailbox_capacity: usize,
}

impl ActorRegistry {
    /// Create a registry over the given collaborators.
    pub fn new(
        store: Arc<dyn RuntimeStore>,
        definitions: Arc<dyn DefinitionStore>,
        host_factory: Arc<dyn WorkflowHostFactory>,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            actors: Mutex::new(HashMap::new()),
            store,
            definitions,
            host_factory,
            mailbox_capacity,
        }
    }

    /// Resolve the actor owning an instance ID, spawning it on demand.
    ///
    /// A stopped actor is respawned; it re-recovers its snapshot before
    /// processing the first new message.
    pub fn client(&self, instance_id: &str) -> ActorClient {
        let mut actors = self.actors.lock().expect("actor registry poisoned");

        let handle = actors
            .entry(instance_id.to_string())
            .or_insert_with(|| self.spawn(instance_id));

        if handle.sender.is_closed() {
            debug!(instance_id, "respawning stopped instance actor");
            *handle = self.spawn(instance_id);
        }

        ActorClient {
            instance_id: instance_id.to_string(),
            sender: handle.sender.clone(),
        }
    }

    /// Number of live actors on this node.
    pub fn len(&self) -> usize {
        let mut actors = self.actors.lock().expect("actor registry poisoned");
        actors.retain(|_, handle| !handle.join.is_finished());
        actors.len()
    }

    /// Whether no actors are live on this node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask one actor to stop after its mailbox drains. Fire-and-forget:
    /// buffered messages still complete.
    pub async fn stop(&self, instance_id: &str) {
        let handle = {
            let mut actors = self.actors.lock().expect("actor registry poisoned");
            actors.remove(instance_id)
        };

        if let Some(handle) = handle {
            let _ = handle.sender.send(ActorMessage::Stop).await;
        }
    }

    /// Stop all actors and wait for their mailboxes to drain.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, ActorHandle)> = {
            let mut actors = self.actors.lock().expect("actor registry poisoned");
            actors.drain().collect()
        };

        for (instance_id, handle) in drained {
            let _ = handle.sender.send(ActorMessage::Stop).await;
            if handle.join.await.is_err() {
                debug!(instance_id, "actor task aborted during shutdown");
            }
        }
    }

    fn spawn(&self, instance_id: &str) -> ActorHandle {
        spawn_actor(
            instance_id.to_string(),
            self.store.clone(),
            self.definitions.clone(),
            self.host_factory.clone(),
            self.mailbox_capacity,
        )
    }
}

/// Typed client for one instance actor's mailbox.
#[derive(Clone)]
pub struct ActorClient {
    instance_id: String,
    sender: mpsc::Sender<ActorMessage>,
}

impl ActorClient {
    /// The instance ID this client addresses.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Create the workflow instance. Fatal if the actor already holds one.
    pub async fn create(&self, request: CreateInstanceRequest) -> Result<String, CoreError> {
        self.request(|reply| ActorMessage::Create { request, reply })
            .await
    }

    /// Probe whether a start would be admitted.
    pub async fn can_start(&self, request: CanStartRequest) -> Result<bool, CoreError> {
        self.request(|reply| ActorMessage::CanStart { request, reply })
            .await
    }

    /// Advance the instance.
    pub async fn run(&self, request: RunInstanceRequest) -> Result<RunInstanceResponse, CoreError> {
        self.request(|reply| ActorMessage::Run { request, reply })
            .await
    }

    /// Cooperatively cancel the instance.
    pub async fn cancel(&self) -> Result<(), CoreError> {
        self.request(|reply| ActorMessage::Cancel { reply }).await
    }

    /// Export the full serialized instance state.
    pub async fn export_state(&self) -> Result<String, CoreError> {
        self.request(|reply| ActorMessage::ExportState { reply })
            .await
    }

    /// Replace the full instance state and persist it.
    pub async fn import_state(&self, serialized_state: String) -> Result<(), CoreError> {
        self.request(|reply| ActorMessage::ImportState {
            serialized_state,
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, CoreError>>) -> ActorMessage,
    ) -> Result<T, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| CoreError::ActorUnavailable {
                instance_id: self.instance_id.clone(),
            })?;

        reply_rx.await.map_err(|_| CoreError::ActorUnavailable {
            instance_id: self.instance_id.clone(),
        })?
    }
}
