// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Weft Core - Cluster Runtime for Durable Workflow Instances
//!
//! This crate is the execution and resumption runtime for long-running,
//! resumable workflows. Each workflow instance is a durable, independently
//! addressable unit of state owned by a single-threaded-per-key actor, and
//! can be created, advanced, cancelled, exported, and reimported without the
//! caller knowing which node - or whether any node - currently holds it in
//! memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        External Callers                             │
//! │            (API layer, dispatchers, stimulus senders)               │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       ClusterRuntime (facade)                       │
//! │      start / resume / trigger / export / import / count / index     │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                        │                        │
//!          │ instance ID            │ stimulus hash          │ events
//!          ▼                        ▼                        ▼
//! ┌──────────────────┐   ┌──────────────────────┐   ┌──────────────────┐
//! │  ActorRegistry   │   │ Bookmark/Trigger     │   │ Invalidation     │
//! │  one actor per   │   │ Index (per-hash      │   │ listeners        │
//! │  instance ID     │   │ granularity)         │   │ (route caches)   │
//! └──────────────────┘   └──────────────────────┘   └──────────────────┘
//!          │
//!          ▼
//! ┌──────────────────┐        ┌─────────────────────────────────────────┐
//! │  InstanceActor   │───────▶│ RuntimeStore (instances, bookmarks,     │
//! │  mailbox loop    │        │ triggers, actor snapshots)              │
//! └──────────────────┘        └─────────────────────────────────────────┘
//! ```
//!
//! # Instance routing
//!
//! An external stimulus (activity type name + payload) is hashed into a
//! content key. The key resolves, without any table scan, to the bookmarks
//! of instances waiting on it and the triggers of definitions eligible to
//! start from it. Matched instances are resumed one `Run` per bookmark;
//! matched definitions pass a cheap can-start probe before a durable
//! instance is created.
//!
//! # Serialization guarantee
//!
//! Operations against one instance ID are strictly serialized: the owning
//! actor processes its mailbox one message at a time and awaits every
//! external call (definition lookup, engine invocation, persistence) inline.
//! Operations on different instances proceed fully in parallel.
//!
//! # Modules
//!
//! - [`config`]: Runtime configuration from environment variables
//! - [`error`]: Error types with stable error code mapping
//! - [`stimulus`]: Content-addressed stimulus hashing
//! - [`messages`]: Request/response contracts for runtime and actor operations
//! - [`persistence`]: Store trait plus SQLite and in-memory backends
//! - [`actor`]: The per-instance actor and its mailbox loop
//! - [`registry`]: Actor placement and typed actor clients
//! - [`indexer`]: Trigger indexing for published definitions
//! - [`notifications`]: Change events and idempotent cache invalidation
//! - [`runtime`]: The cluster runtime facade

#![deny(missing_docs)]

/// The per-instance actor and its mailbox loop.
mod actor;

/// Runtime configuration from environment variables.
pub mod config;

/// Error types for runtime operations.
pub mod error;

/// Trigger indexing for published definitions.
pub mod indexer;

/// Request/response contracts for runtime and actor operations.
pub mod messages;

/// Change events and idempotent cache invalidation.
pub mod notifications;

/// Persistence trait and backends.
pub mod persistence;

/// Actor placement and typed actor clients.
pub mod registry;

/// The cluster runtime facade.
pub mod runtime;

/// Content-addressed stimulus hashing.
pub mod stimulus;

pub use error::{CoreError, Result};
pub use runtime::{ClusterRuntime, ClusterRuntimeBuilder};
pub use stimulus::StimulusHasher;
