// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime event notifications and cache invalidation.
//!
//! Downstream consumers (route tables, reverse-proxy caches) mirror parts of
//! the trigger index and must be told when it changes. Delivery is
//! at-least-once over a broadcast channel; eviction is idempotent, so
//! re-applying an event or evicting a key that was never cached is a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A structural change to definitions or the trigger index.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A definition version was published.
    DefinitionPublished {
        /// The affected definition.
        definition_id: String,
    },
    /// A definition was retracted.
    DefinitionRetracted {
        /// The affected definition.
        definition_id: String,
    },
    /// A definition was deleted.
    DefinitionDeleted {
        /// The affected definition.
        definition_id: String,
    },
    /// A definition's triggers were re-indexed.
    TriggersIndexed {
        /// The affected definition.
        definition_id: String,
        /// Hashes added by the re-index.
        added_hashes: Vec<String>,
        /// Hashes removed by the re-index.
        removed_hashes: Vec<String>,
    },
}

/// A cached route entry: which definition and activity a hash routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRoute {
    /// The definition the hash routes to.
    pub definition_id: String,
    /// The trigger activity within that definition.
    pub activity_id: String,
}

#[derive(Default)]
struct CacheInner {
    routes: HashMap<String, CachedRoute>,
    /// definition_id -> hashes cached for it, for definition-keyed eviction
    by_definition: HashMap<String, HashSet<String>>,
}

/// A routing-table mirror of the trigger index, maintained by eviction.
///
/// Both eviction entry points are safe to call for keys that were never
/// cached.
#[derive(Default)]
pub struct TriggerRouteCache {
    inner: Mutex<CacheInner>,
}

impl TriggerRouteCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a route for a hash.
    pub fn insert(&self, hash: impl Into<String>, route: CachedRoute) {
        let hash = hash.into();
        let mut inner = self.lock();
        inner
            .by_definition
            .entry(route.definition_id.clone())
            .or_default()
            .insert(hash.clone());
        inner.routes.insert(hash, route);
    }

    /// Look up the cached route for a hash.
    pub fn get(&self, hash: &str) -> Option<CachedRoute> {
        self.lock().routes.get(hash).cloned()
    }

    /// Evict one hash. No-op if the hash was never cached.
    pub fn evict_hash(&self, hash: &str) {
        let mut inner = self.lock();
        if let Some(route) = inner.routes.remove(hash) {
            if let Some(hashes) = inner.by_definition.get_mut(&route.definition_id) {
                hashes.remove(hash);
                if hashes.is_empty() {
                    inner.by_definition.remove(&route.definition_id);
                }
            }
        }
    }

    /// Evict every hash cached for a definition. No-op for unknown
    /// definitions.
    pub fn evict_definition(&self, definition_id: &str) {
        let mut inner = self.lock();
        if let Some(hashes) = inner.by_definition.remove(definition_id) {
            for hash in hashes {
                inner.routes.remove(&hash);
            }
        }
    }

    /// Drop every cached route.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.routes.clear();
        inner.by_definition.clear();
    }

    /// Number of cached routes.
    pub fn len(&self) -> usize {
        self.lock().routes.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().routes.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().expect("route cache poisoned")
    }
}

/// Spawn a task that keeps a route cache consistent with runtime events.
///
/// Affected hashes are evicted before the definition key, mirroring the
/// order index changes land in. A lagged receiver clears the whole cache:
/// missing an eviction is the one failure mode a mirror cannot tolerate.
pub fn spawn_invalidation_listener(
    mut events: broadcast::Receiver<RuntimeEvent>,
    cache: Arc<TriggerRouteCache>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => apply_event(&event, &cache),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "invalidation listener lagged; clearing route cache");
                    cache.clear();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("invalidation listener stopped");
    })
}

fn apply_event(event: &RuntimeEvent, cache: &TriggerRouteCache) {
    match event {
        RuntimeEvent::DefinitionPublished { definition_id }
        | RuntimeEvent::DefinitionRetracted { definition_id }
        | RuntimeEvent::DefinitionDeleted { definition_id } => {
            cache.evict_definition(definition_id);
        }
        RuntimeEvent::TriggersIndexed {
            definition_id,
            added_hashes,
            removed_hashes,
        } => {
            for hash in removed_hashes.iter().chain(added_hashes) {
                cache.evict_hash(hash);
            }
            cache.evict_definition(definition_id);
        }
    }
}
