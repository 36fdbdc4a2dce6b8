// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The per-instance actor: a single task owning one workflow instance.
//!
//! Every operation against an instance flows through its actor's mailbox and
//! is awaited inline by the actor's own task. That inline await is the whole
//! reentrancy mechanism: while a definition lookup, engine invocation, or
//! store call is pending, later messages for the same instance accumulate in
//! the channel and are processed strictly afterwards, in enqueue order. No
//! worker thread blocks, no second operation interleaves, and a failed
//! operation resolves the caller's reply channel while the actor stays alive
//! for the next message.
//!
//! On a cold spawn the actor first recovers its snapshot - a pointer record
//! holding just the instance ID - and loads the full execution host lazily on
//! the first operation that needs it. `Stop` closes the mailbox; messages
//! already enqueued still complete before the task exits.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use weft_engine::{
    Bookmark, DefinitionHandle, DefinitionStore, WorkflowDefinition, WorkflowHost,
    WorkflowHostFactory, WorkflowState, WorkflowStatus,
};

use crate::error::CoreError;
use crate::messages::{
    CanStartRequest, CreateInstanceRequest, RunInstanceRequest, RunInstanceResponse,
};
use crate::persistence::{InstanceRecord, RuntimeStore, StoredBookmark};

/// Messages processed by an instance actor.
pub(crate) enum ActorMessage {
    Create {
        request: CreateInstanceRequest,
        reply: oneshot::Sender<Result<String, CoreError>>,
    },
    CanStart {
        request: CanStartRequest,
        reply: oneshot::Sender<Result<bool, CoreError>>,
    },
    Run {
        request: RunInstanceRequest,
        reply: oneshot::Sender<Result<RunInstanceResponse, CoreError>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    ExportState {
        reply: oneshot::Sender<Result<String, CoreError>>,
    },
    ImportState {
        serialized_state: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Stop,
}

/// Handle to a spawned instance actor.
pub(crate) struct ActorHandle {
    pub(crate) sender: mpsc::Sender<ActorMessage>,
    pub(crate) join: JoinHandle<()>,
}

/// Spawn an instance actor for the given identity.
pub(crate) fn spawn_actor(
    actor_key: String,
    store: Arc<dyn RuntimeStore>,
    definitions: Arc<dyn DefinitionStore>,
    host_factory: Arc<dyn WorkflowHostFactory>,
    mailbox_capacity: usize,
) -> ActorHandle {
    let (sender, mailbox) = mpsc::channel(mailbox_capacity);

    let actor = InstanceActor {
        actor_key,
        store,
        definitions,
        host_factory,
        cancel: CancellationToken::new(),
        instance_id: None,
        host: None,
    };

    let join = tokio::spawn(actor.run(mailbox));

    ActorHandle { sender, join }
}

struct InstanceActor {
    actor_key: String,
    store: Arc<dyn RuntimeStore>,
    definitions: Arc<dyn DefinitionStore>,
    host_factory: Arc<dyn WorkflowHostFactory>,
    cancel: CancellationToken,
    instance_id: Option<String>,
    host: Option<Box<dyn WorkflowHost>>,
}

impl InstanceActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<ActorMessage>) {
        let mut recovered = false;

        while let Some(message) = mailbox.recv().await {
            // A restarted actor must finish recovering before accepting
            // work. A recovery failure fails the in-flight message and is
            // retried on the next one; it is never masked.
            if !recovered {
                match self.recover().await {
                    Ok(()) => recovered = true,
                    Err(error) => {
                        warn!(actor_key = %self.actor_key, %error, "snapshot recovery failed");
                        Self::reject(message, error);
                        continue;
                    }
                }
            }

            match message {
                ActorMessage::Create { request, reply } => {
                    let _ = reply.send(self.create(request).await);
                }
                ActorMessage::CanStart { request, reply } => {
                    let _ = reply.send(self.can_start(request).await);
                }
                ActorMessage::Run { request, reply } => {
                    let _ = reply.send(self.run_instance(request).await);
                }
                ActorMessage::Cancel { reply } => {
                    let _ = reply.send(self.cancel_instance().await);
                }
                ActorMessage::ExportState { reply } => {
                    let _ = reply.send(self.export_state().await);
                }
                ActorMessage::ImportState {
                    serialized_state,
                    reply,
                } => {
                    let _ = reply.send(self.import_state(serialized_state).await);
                }
                ActorMessage::Stop => {
                    // Close the mailbox so no new messages can be enqueued;
                    // recv() keeps yielding already-buffered messages until
                    // the queue drains, then the loop exits. Never a hard
                    // stop mid-operation.
                    mailbox.close();
                }
            }
        }

        self.cancel.cancel();
        debug!(actor_key = %self.actor_key, "instance actor stopped");
    }

    /// Fail a message without processing it.
    fn reject(message: ActorMessage, error: CoreError) {
        match message {
            ActorMessage::Create { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::CanStart { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::Run { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::Cancel { reply } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::ExportState { reply } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::ImportState { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::Stop => {}
        }
    }

    /// Recover the snapshot pointer for this actor identity, if any. The
    /// full execution host stays unloaded until an operation needs it.
    async fn recover(&mut self) -> Result<(), CoreError> {
        if let Some(snapshot) = self.store.load_snapshot(&self.actor_key).await? {
            debug!(
                actor_key = %self.actor_key,
                instance_id = %snapshot.instance_id,
                "recovered instance binding from snapshot"
            );
            self.instance_id = Some(snapshot.instance_id);
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(actor_key = %self.actor_key))]
    async fn create(&mut self, request: CreateInstanceRequest) -> Result<String, CoreError> {
        if let Some(instance_id) = &self.instance_id {
            return Err(CoreError::InstanceAlreadyCreated {
                instance_id: instance_id.clone(),
            });
        }

        let definition = self.find_definition(&request.definition_handle).await?;

        let instance_id = request
            .instance_id
            .unwrap_or_else(|| self.actor_key.clone());

        let mut state = WorkflowState::new(
            instance_id.clone(),
            definition.definition_id.clone(),
            definition.version,
        );
        state.correlation_id = request.correlation_id;
        state.parent_instance_id = request.parent_instance_id;
        state.input = request.input;

        let record = InstanceRecord::from_state(&state)?;
        self.store.create_instance(&record).await?;

        let host = self
            .host_factory
            .create(definition, state)
            .await
            .map_err(CoreError::from)?;

        self.instance_id = Some(instance_id.clone());
        self.host = Some(host);
        self.save_snapshot().await?;

        debug!(instance_id = %instance_id, "workflow instance created");
        Ok(instance_id)
    }

    /// Probe whether a start through the given trigger would be admitted.
    /// Leaves no durable footprint and does not bind an instance to this
    /// actor.
    async fn can_start(&mut self, request: CanStartRequest) -> Result<bool, CoreError> {
        let definition = self.find_definition(&request.definition_handle).await?;

        let mut state = WorkflowState::new(
            self.actor_key.clone(),
            definition.definition_id.clone(),
            definition.version,
        );
        state.correlation_id = request.correlation_id;
        state.input = request.input.clone();

        let mut host = self
            .host_factory
            .create(definition, state)
            .await
            .map_err(CoreError::from)?;

        let options = RunInstanceRequest {
            trigger_activity_id: request.trigger_activity_id,
            input: request.input,
            ..Default::default()
        }
        .into_options();

        let cancel = self.cancel.clone();
        host.can_start(&options, &cancel)
            .await
            .map_err(CoreError::from)
    }

    #[instrument(skip(self, request), fields(actor_key = %self.actor_key))]
    async fn run_instance(
        &mut self,
        request: RunInstanceRequest,
    ) -> Result<RunInstanceResponse, CoreError> {
        self.ensure_host().await?;
        let cancel = self.cancel.clone();
        let Some(host) = self.host.as_mut() else {
            return Err(CoreError::InstanceNotFound {
                instance_id: self.actor_key.clone(),
            });
        };

        let before = host.state().bookmarks.clone();
        let outcome = host
            .run(&request.into_options(), &cancel)
            .await
            .map_err(CoreError::from)?;
        let state = host.state().clone();

        self.persist_state(&state).await?;
        self.sync_bookmark_index(&state.id, &before, &state).await?;
        self.save_snapshot().await?;

        Ok(RunInstanceResponse {
            status: outcome.status,
            sub_status: outcome.sub_status,
            incidents: outcome.incidents,
            bookmarks: outcome.bookmarks,
        })
    }

    async fn cancel_instance(&mut self) -> Result<(), CoreError> {
        self.ensure_host().await?;
        let cancel = self.cancel.clone();
        let Some(host) = self.host.as_mut() else {
            return Err(CoreError::InstanceNotFound {
                instance_id: self.actor_key.clone(),
            });
        };

        let before = host.state().bookmarks.clone();
        host.cancel(&cancel).await.map_err(CoreError::from)?;
        let state = host.state().clone();

        self.persist_state(&state).await?;
        self.sync_bookmark_index(&state.id, &before, &state).await?;
        self.save_snapshot().await?;

        Ok(())
    }

    async fn export_state(&mut self) -> Result<String, CoreError> {
        self.ensure_host().await?;
        let Some(host) = self.host.as_ref() else {
            return Err(CoreError::InstanceNotFound {
                instance_id: self.actor_key.clone(),
            });
        };
        Ok(serde_json::to_string(host.state())?)
    }

    /// Replace the full instance state and persist it. Works against a
    /// freshly addressed actor: the imported state is rebound to this
    /// actor's identity.
    async fn import_state(&mut self, serialized_state: String) -> Result<(), CoreError> {
        let mut state: WorkflowState = serde_json::from_str(&serialized_state)?;

        let instance_id = self
            .instance_id
            .clone()
            .unwrap_or_else(|| self.actor_key.clone());
        state.id = instance_id.clone();

        let handle = DefinitionHandle::exact(state.definition_id.clone(), state.definition_version);
        let definition = self.find_definition(&handle).await?;

        // Bookmarks currently indexed for this instance, for diffing.
        let before = match self.host.as_ref() {
            Some(host) => host.state().bookmarks.clone(),
            None => match self.store.find_instance(&instance_id).await? {
                Some(record) => record.workflow_state()?.bookmarks,
                None => Vec::new(),
            },
        };

        let record = InstanceRecord::from_state(&state)?;
        if self.store.find_instance(&instance_id).await?.is_some() {
            self.store.save_instance_state(&record).await?;
        } else {
            self.store.create_instance(&record).await?;
        }

        if let Some(host) = self.host.as_mut() {
            host.replace_state(state.clone());
        } else {
            let host = self
                .host_factory
                .create(definition, state.clone())
                .await
                .map_err(CoreError::from)?;
            self.host = Some(host);
        }

        self.instance_id = Some(instance_id.clone());
        self.sync_bookmark_index(&instance_id, &before, &state).await?;
        self.save_snapshot().await?;

        Ok(())
    }

    /// Load the execution host if it is not already in memory: instance
    /// store, then definition store, then host construction.
    async fn ensure_host(&mut self) -> Result<(), CoreError> {
        if self.host.is_some() {
            return Ok(());
        }

        let instance_id =
            self.instance_id
                .clone()
                .ok_or_else(|| CoreError::InstanceNotFound {
                    instance_id: self.actor_key.clone(),
                })?;

        // Absence here is fatal: the actor was bound to an instance that the
        // durable store no longer has.
        let record = self
            .store
            .find_instance(&instance_id)
            .await?
            .ok_or_else(|| CoreError::InstanceNotFound {
                instance_id: instance_id.clone(),
            })?;

        let state = record.workflow_state()?;
        let handle = DefinitionHandle::exact(record.definition_id.clone(), record.definition_version);
        let definition = self.find_definition(&handle).await?;

        let host = self
            .host_factory
            .create(definition, state)
            .await
            .map_err(CoreError::from)?;
        self.host = Some(host);

        Ok(())
    }

    async fn find_definition(
        &self,
        handle: &DefinitionHandle,
    ) -> Result<Arc<WorkflowDefinition>, CoreError> {
        self.definitions
            .find(handle)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::DefinitionNotFound {
                definition_id: handle.definition_id.clone(),
            })
    }

    async fn persist_state(&self, state: &WorkflowState) -> Result<(), CoreError> {
        let record = InstanceRecord::from_state(state)?;
        self.store.save_instance_state(&record).await
    }

    /// Persist the recovery snapshot, or delete it once the instance has
    /// finished so snapshot storage stays bounded. Terminal instances replay
    /// from the durable instance store only.
    async fn save_snapshot(&self) -> Result<(), CoreError> {
        let finished = self
            .host
            .as_ref()
            .is_some_and(|host| host.state().status == WorkflowStatus::Finished);

        if finished {
            self.store.delete_snapshot(&self.actor_key).await
        } else if let Some(instance_id) = &self.instance_id {
            self.store.save_snapshot(&self.actor_key, instance_id).await
        } else {
            Ok(())
        }
    }

    /// Reconcile the bookmark index with the instance's bookmark set after a
    /// state change. Removals are applied before additions so there is no
    /// window where old and new entries for the same activity are both
    /// resumable. All mutations are addressed per hash.
    async fn sync_bookmark_index(
        &self,
        instance_id: &str,
        before: &[Bookmark],
        state: &WorkflowState,
    ) -> Result<(), CoreError> {
        let after = &state.bookmarks;
        let before_ids: HashSet<&str> = before.iter().map(|b| b.id.as_str()).collect();
        let after_ids: HashSet<&str> = after.iter().map(|b| b.id.as_str()).collect();

        let mut removed_by_hash: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for bookmark in before.iter().filter(|b| !after_ids.contains(b.id.as_str())) {
            removed_by_hash
                .entry(bookmark.hash.as_str())
                .or_default()
                .push(bookmark.id.clone());
        }
        for (hash, bookmark_ids) in &removed_by_hash {
            self.store
                .remove_bookmarks(hash, instance_id, bookmark_ids)
                .await?;
        }

        let mut added_by_hash: BTreeMap<&str, Vec<StoredBookmark>> = BTreeMap::new();
        for bookmark in after.iter().filter(|b| !before_ids.contains(b.id.as_str())) {
            added_by_hash
                .entry(bookmark.hash.as_str())
                .or_default()
                .push(StoredBookmark::from_bookmark(
                    bookmark,
                    instance_id,
                    state.correlation_id.as_deref(),
                ));
        }
        for (hash, bookmarks) in &added_by_hash {
            self.store.store_bookmarks(hash, bookmarks).await?;
        }

        Ok(())
    }
}
