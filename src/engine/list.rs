// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bidirectional cursor list engine.
//!
//! Unlike a queue, a list has no implicit head/tail bookkeeping beyond the
//! next biased sequence to hand out on `push_front`: `push_back` draws its
//! key from the substrate's monotonic id generator, which already produces
//! an increasing, order-preserving unsigned sequence. `next`/`prev` walk the
//! `elements` tree directly via `sled`'s range iteration, skipping sequences
//! whose payload was deleted (holes left by `remove`/`remove_by_id`).

use std::sync::Arc;

use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

use super::error::EngineError;
use super::identity::{extract_id, lookup_id_by_seq, lookup_seq_by_id, put_identity_refs, remove_identity_refs};
use super::sequence::{decode_seq, encode_seq};
use super::stats::{ListStats, StatsCache};
use super::store::{Substrate, STAT_KEY};

/// One item and the logical position it was found at, returned by every
/// traversal operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Positioned {
    pub position: i64,
    pub value: Value,
}

/// A persistent doubly-traversable container. `push_back`/`push_front` add
/// items at either end; `next`/`prev` walk from a position; `get`/`get_by_id`
/// and `update_by_id`/`remove`/`remove_by_id` work by position or identity.
#[derive(Clone)]
pub struct ListEngine {
    substrate: Arc<Substrate>,
    stats: Arc<StatsCache<ListStats>>,
}

impl ListEngine {
    pub fn new(substrate: Substrate) -> Self {
        Self {
            substrate: Arc::new(substrate),
            stats: Arc::new(StatsCache::new()),
        }
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&ListEngine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| EngineError::Storage(format!("blocking task panicked: {e}")))?
    }

    /// Appends `payload` at the end, using the substrate's monotonic id
    /// generator for its position. Errors with `Exists` if `payload` carries
    /// an identity already present in the list.
    pub async fn push_back(&self, list: &str, payload: Value) -> Result<i64, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.push_back_blocking(&list, payload))
            .await
    }

    /// Prepends `payload` at a position before every existing item.
    pub async fn push_front(&self, list: &str, payload: Value) -> Result<i64, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.push_front_blocking(&list, payload))
            .await
    }

    /// The item at the lowest live position, if any.
    pub async fn front(&self, list: &str) -> Result<Option<Positioned>, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.edge_blocking(&list, true))
            .await
    }

    /// The item at the highest live position, if any.
    pub async fn back(&self, list: &str) -> Result<Option<Positioned>, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.edge_blocking(&list, false))
            .await
    }

    /// The first live item strictly after `position`. Errors with
    /// `OutOfRange` if none exists.
    pub async fn next(&self, list: &str, position: i64) -> Result<Positioned, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.step_blocking(&list, position, true))
            .await
    }

    /// The first live item strictly before `position`. Errors with
    /// `OutOfRange` if none exists.
    pub async fn prev(&self, list: &str, position: i64) -> Result<Positioned, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.step_blocking(&list, position, false))
            .await
    }

    /// The payload at exactly `position`.
    pub async fn get(&self, list: &str, position: i64) -> Result<Value, EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.get_blocking(&list, position))
            .await
    }

    /// The payload and position of the item bearing identity `id`.
    pub async fn get_by_id(&self, list: &str, id: &str) -> Result<Positioned, EngineError> {
        let list = list.to_string();
        let id = id.to_string();
        self.run_blocking(move |engine| engine.get_by_id_blocking(&list, &id))
            .await
    }

    /// Overwrites the payload bearing `payload`'s own `_id` in place.
    /// Fails with `NoIdentity` if `payload` carries none.
    pub async fn update_by_id(&self, list: &str, payload: Value) -> Result<(), EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.update_by_id_blocking(&list, payload))
            .await
    }

    /// Deletes the item at `position`.
    pub async fn remove(&self, list: &str, position: i64) -> Result<(), EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.remove_blocking(&list, position))
            .await
    }

    /// Deletes the item bearing identity `id`.
    pub async fn remove_by_id(&self, list: &str, id: &str) -> Result<(), EngineError> {
        let list = list.to_string();
        let id = id.to_string();
        self.run_blocking(move |engine| engine.remove_by_id_blocking(&list, &id))
            .await
    }

    /// Number of live items, counted by range-scanning the `elements` tree.
    /// Unlike a queue's O(1) `length`, a list has no running count to cache:
    /// positions are assigned from both ends and from a shared monotonic
    /// counter, so there is no `tail - head` arithmetic to fall back on.
    pub async fn length(&self, list: &str) -> u64 {
        let list = list.to_string();
        self.run_blocking(move |engine| Ok(engine.length_blocking(&list)))
            .await
            .unwrap_or(0)
    }

    /// Deletes the container and evicts its cached statistics.
    pub async fn drop_list(&self, list: &str) -> Result<(), EngineError> {
        let list = list.to_string();
        self.run_blocking(move |engine| engine.drop_blocking(&list))
            .await
    }

    /// Flushes all pending writes to disk. Called on cooperative shutdown so
    /// a committed-but-not-yet-synced transaction isn't left to `sled`'s
    /// drop handler.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.run_blocking(|engine| engine.substrate.flush()).await
    }

    fn load_stats(stat_tree: &sled::Tree) -> ListStats {
        stat_tree
            .get(STAT_KEY)
            .ok()
            .flatten()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn push_back_blocking(&self, list: &str, payload: Value) -> Result<i64, EngineError> {
        let trees = self.substrate.container(list)?;
        let id = extract_id(&payload).map(str::to_string);
        let encoded = serde_json::to_vec(&payload)?;
        // The monotonic id generator hands out increasing integers starting
        // at zero; the reference implementation's equivalent counter
        // (BoltDB's `Bucket.NextSequence`) starts at one, so the first
        // push-back must land at position 1, immediately after push-front's
        // starting position of 0.
        let position = i64::try_from(self.substrate.next_id()?)
            .map_err(|_| EngineError::Corrupted("monotonic id exceeded i64 range".into()))?
            + 1;
        let key = encode_seq(position);

        let outcome: Result<(), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id).transaction(
                |(elements, id2seq, seq2id)| {
                    if let Some(id) = &id {
                        if lookup_seq_by_id(id2seq, id)?.is_some() {
                            return Err(ConflictableTransactionError::Abort(EngineError::Exists));
                        }
                    }
                    elements.insert(key.as_slice(), encoded.as_slice())?;
                    if let Some(id) = &id {
                        put_identity_refs(id2seq, seq2id, id, &key)?;
                    }
                    Ok(())
                },
            );
        outcome?;
        Ok(position)
    }

    fn push_front_blocking(&self, list: &str, payload: Value) -> Result<i64, EngineError> {
        let trees = self.substrate.container(list)?;
        let stats_lock = self
            .stats
            .get_or_load(list, || Self::load_stats(&trees.stat));
        let id = extract_id(&payload).map(str::to_string);
        let encoded = serde_json::to_vec(&payload)?;

        let mut stats = stats_lock.lock().unwrap();
        let outcome: Result<(i64, ListStats), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id, &trees.stat).transaction(
                |(elements, id2seq, seq2id, stat)| {
                    if let Some(id) = &id {
                        if lookup_seq_by_id(id2seq, id)?.is_some() {
                            return Err(ConflictableTransactionError::Abort(EngineError::Exists));
                        }
                    }
                    let mut new_stats = stats.clone();
                    let biased = new_stats.prev_sequence;
                    let key = biased.to_be_bytes();
                    let position = decode_seq(&key)
                        .ok_or_else(|| ConflictableTransactionError::Abort(EngineError::Corrupted("key width".into())))?;
                    new_stats.prev_sequence -= 1;

                    elements.insert(key.as_slice(), encoded.as_slice())?;
                    if let Some(id) = &id {
                        put_identity_refs(id2seq, seq2id, id, &key)?;
                    }
                    let stat_bytes = serde_json::to_vec(&new_stats)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    stat.insert(STAT_KEY, stat_bytes)?;

                    Ok((position, new_stats))
                },
            );

        let (position, new_stats) = outcome?;
        *stats = new_stats;
        Ok(position)
    }

    fn edge_blocking(&self, list: &str, front: bool) -> Result<Option<Positioned>, EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;
        let found = if front {
            trees.elements.iter().next()
        } else {
            trees.elements.iter().next_back()
        };
        let Some(entry) = found else {
            return Ok(None);
        };
        let (key, value) = entry?;
        let position = decode_seq(&key)
            .ok_or_else(|| EngineError::Corrupted("stored key has unexpected width".into()))?;
        let value: Value = serde_json::from_slice(&value)?;
        Ok(Some(Positioned { position, value }))
    }

    fn step_blocking(&self, list: &str, position: i64, forward: bool) -> Result<Positioned, EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;
        let key = encode_seq(position);
        let found = if forward {
            trees
                .elements
                .range((std::ops::Bound::Excluded(key.to_vec()), std::ops::Bound::Unbounded))
                .next()
        } else {
            trees
                .elements
                .range((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(key.to_vec())))
                .next_back()
        };
        let (found_key, value) = found.ok_or(EngineError::OutOfRange)??;
        let found_position = decode_seq(&found_key)
            .ok_or_else(|| EngineError::Corrupted("stored key has unexpected width".into()))?;
        let value: Value = serde_json::from_slice(&value)?;
        Ok(Positioned {
            position: found_position,
            value,
        })
    }

    fn get_blocking(&self, list: &str, position: i64) -> Result<Value, EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;
        let key = encode_seq(position);
        let value = trees.elements.get(key)?.ok_or(EngineError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn get_by_id_blocking(&self, list: &str, id: &str) -> Result<Positioned, EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;
        let seq_key = trees
            .id2seq
            .get(id.as_bytes())?
            .ok_or(EngineError::NotFound)?;
        let value = trees
            .elements
            .get(seq_key.as_ref())?
            .ok_or_else(|| EngineError::Corrupted("identity ref with no payload".into()))?;
        let position = decode_seq(&seq_key)
            .ok_or_else(|| EngineError::Corrupted("stored key has unexpected width".into()))?;
        Ok(Positioned {
            position,
            value: serde_json::from_slice(&value)?,
        })
    }

    fn update_by_id_blocking(&self, list: &str, payload: Value) -> Result<(), EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let id = extract_id(&payload)
            .ok_or(EngineError::NoIdentity)?
            .to_string();
        let trees = self.substrate.container(list)?;
        let encoded = serde_json::to_vec(&payload)?;

        let outcome: Result<(), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq).transaction(|(elements, id2seq)| {
                let seq_key = lookup_seq_by_id(id2seq, &id)?
                    .ok_or_else(|| ConflictableTransactionError::Abort(EngineError::NotFound))?;
                elements.insert(seq_key.as_ref(), encoded.as_slice())?;
                Ok(())
            });
        outcome?;
        Ok(())
    }

    fn remove_blocking(&self, list: &str, position: i64) -> Result<(), EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;
        let key = encode_seq(position);

        let outcome: Result<(), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id).transaction(
                |(elements, id2seq, seq2id)| {
                    if elements.remove(key.as_slice())?.is_none() {
                        return Err(ConflictableTransactionError::Abort(EngineError::NotFound));
                    }
                    if let Some(id_bytes) = lookup_id_by_seq(seq2id, &key)? {
                        let id = String::from_utf8(id_bytes.to_vec()).map_err(|e| {
                            ConflictableTransactionError::Abort(EngineError::Corrupted(e.to_string()))
                        })?;
                        remove_identity_refs(id2seq, seq2id, &id, &key)?;
                    }
                    Ok(())
                },
            );
        outcome?;
        Ok(())
    }

    fn remove_by_id_blocking(&self, list: &str, id: &str) -> Result<(), EngineError> {
        if !self.substrate.container_exists(list) {
            return Err(EngineError::ListNotExists);
        }
        let trees = self.substrate.container(list)?;

        let outcome: Result<(), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id).transaction(
                |(elements, id2seq, seq2id)| {
                    let seq_key = lookup_seq_by_id(id2seq, id)?
                        .ok_or_else(|| ConflictableTransactionError::Abort(EngineError::NotFound))?;
                    elements.remove(seq_key.as_ref())?;
                    remove_identity_refs(id2seq, seq2id, id, seq_key.as_ref())?;
                    Ok(())
                },
            );
        outcome?;
        Ok(())
    }

    fn length_blocking(&self, list: &str) -> u64 {
        if !self.substrate.container_exists(list) {
            return 0;
        }
        let Ok(trees) = self.substrate.container(list) else {
            return 0;
        };
        trees.elements.len() as u64
    }

    fn drop_blocking(&self, list: &str) -> Result<(), EngineError> {
        let existed = self.substrate.drop_container(list)?;
        self.stats.evict(list);
        if existed {
            Ok(())
        } else {
            Err(EngineError::ListNotExists)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> (ListEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let substrate = Substrate::open(&dir.path().join("list.db")).unwrap();
        (ListEngine::new(substrate), dir)
    }

    #[tokio::test]
    async fn push_back_then_front_and_back() {
        let (l, _dir) = engine();
        l.push_back("l1", json!("a")).await.unwrap();
        l.push_back("l1", json!("b")).await.unwrap();
        l.push_back("l1", json!("c")).await.unwrap();

        assert_eq!(l.front("l1").await.unwrap().unwrap().value, json!("a"));
        assert_eq!(l.back("l1").await.unwrap().unwrap().value, json!("c"));
        assert_eq!(l.length("l1").await, 3);
    }

    #[tokio::test]
    async fn push_front_precedes_every_pushed_back_item() {
        let (l, _dir) = engine();
        l.push_back("l2", json!("middle")).await.unwrap();
        l.push_front("l2", json!("first")).await.unwrap();

        assert_eq!(l.front("l2").await.unwrap().unwrap().value, json!("first"));
    }

    #[tokio::test]
    async fn next_skips_a_removed_hole() {
        let (l, _dir) = engine();
        let p0 = l.push_back("l3", json!("a")).await.unwrap();
        let p1 = l.push_back("l3", json!("b")).await.unwrap();
        let p2 = l.push_back("l3", json!("c")).await.unwrap();

        l.remove("l3", p1).await.unwrap();

        let at_p0 = l.next("l3", p0).await.unwrap();
        assert_eq!(at_p0.value, json!("c"));
        assert_eq!(at_p0.position, p2);
    }

    #[tokio::test]
    async fn prev_walks_backward_and_stops_at_start() {
        let (l, _dir) = engine();
        let p0 = l.push_back("l4", json!("a")).await.unwrap();
        let p1 = l.push_back("l4", json!("b")).await.unwrap();

        assert_eq!(l.prev("l4", p1).await.unwrap().position, p0);
        let err = l.prev("l4", p0).await.unwrap_err();
        assert_eq!(err.kind(), "OutOfRange");
    }

    #[tokio::test]
    async fn update_by_id_overwrites_in_place() {
        let (l, _dir) = engine();
        let pos = l.push_back("l5", json!({"_id": "x", "v": 1})).await.unwrap();
        l.update_by_id("l5", json!({"_id": "x", "v": 2})).await.unwrap();

        assert_eq!(l.get("l5", pos).await.unwrap(), json!({"_id": "x", "v": 2}));
        assert_eq!(l.get_by_id("l5", "x").await.unwrap().value, json!({"_id": "x", "v": 2}));
    }

    #[tokio::test]
    async fn update_by_id_rejects_anonymous_payload() {
        let (l, _dir) = engine();
        let err = l.update_by_id("l5b", json!({"v": 1})).await.unwrap_err();
        assert_eq!(err.kind(), "NoIdentity");
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let (l, _dir) = engine();
        l.push_back("l6", json!({"_id": "dup"})).await.unwrap();
        let err = l.push_back("l6", json!({"_id": "dup"})).await.unwrap_err();
        assert_eq!(err.kind(), "Exists");
    }

    #[tokio::test]
    async fn remove_by_id_then_get_by_id_not_found() {
        let (l, _dir) = engine();
        l.push_back("l7", json!({"_id": "x"})).await.unwrap();
        l.remove_by_id("l7", "x").await.unwrap();
        let err = l.get_by_id("l7", "x").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert_eq!(l.length("l7").await, 0);
    }

    #[tokio::test]
    async fn operations_on_unknown_list_error() {
        let (l, _dir) = engine();
        assert_eq!(l.front("never").await.unwrap_err().kind(), "ListNotExists");
        assert_eq!(l.get("never", 0).await.unwrap_err().kind(), "ListNotExists");
    }
}
