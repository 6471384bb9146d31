// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-container statistics records and their in-process cache.
//!
//! The cache exists to make `length` O(1) and to avoid re-reading the
//! `_stat` entry from the substrate on every call. It is authoritative only
//! as long as it mirrors the last *committed* transaction: callers must
//! compute the new record, persist it inside the `sled` transaction, and
//! only then call [`StatsCache::get_or_load`] to obtain (and mutate) the
//! cached entry under its own lock. A transaction that never commits must
//! never have touched the cache in the first place. The cache itself is
//! plain `std` synchronization because every engine operation that touches
//! it already runs inside `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::sequence::ZERO_POINT;

/// Persisted metadata for a queue container.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Next sequence to consume (inclusive), biased by `ZERO_POINT`.
    pub head: u64,
    /// Next sequence to assign (exclusive), biased by `ZERO_POINT`.
    pub tail: u64,
    /// Sequences in `[head, tail)` whose items were deleted by identity.
    pub removed: Vec<u64>,
}

impl QueueStats {
    /// `tail - head - |removed|`, the logical queue length.
    pub fn length(&self) -> u64 {
        self.tail
            .saturating_sub(self.head)
            .saturating_sub(self.removed.len() as u64)
    }

    /// Drops every entry `< head` from `removed`.
    pub fn compact_removed(&mut self) {
        self.removed.retain(|&s| s >= self.head);
    }
}

/// Persisted metadata for a list container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListStats {
    /// Next biased sequence to assign on push-front (decrements each call).
    pub prev_sequence: u64,
}

impl Default for ListStats {
    fn default() -> Self {
        Self {
            prev_sequence: ZERO_POINT,
        }
    }
}

/// Process-wide cache of per-container stats, each entry independently
/// lockable so that concurrent writers to *different* containers never
/// contend with each other.
pub struct StatsCache<T> {
    containers: RwLock<HashMap<String, Arc<Mutex<T>>>>,
}

impl<T> StatsCache<T> {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for `name`, inserting a fresh one built from
    /// `load` if this is the first access for that container.
    pub fn get_or_load<F>(&self, name: &str, load: F) -> Arc<Mutex<T>>
    where
        F: FnOnce() -> T,
    {
        if let Some(entry) = self.containers.read().unwrap().get(name) {
            return Arc::clone(entry);
        }
        let mut containers = self.containers.write().unwrap();
        Arc::clone(
            containers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(load()))),
        )
    }

    /// Evicts the cached entry for `name` (called by `drop`).
    pub fn evict(&self, name: &str) {
        self.containers.write().unwrap().remove(name);
    }
}

impl<T> Default for StatsCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
