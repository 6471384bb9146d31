// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIFO queue engine.
//!
//! Every public method is an `async fn` that hands the actual `sled` work
//! to [`tokio::task::spawn_blocking`], matching the rest of this codebase's
//! rule that blocking I/O never runs on a runtime worker thread. Each has a
//! private `*_blocking` twin holding the real logic, which a transaction may
//! invoke (and retry) any number of times before committing.

use std::sync::Arc;

use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::debug;

use super::error::EngineError;
use super::identity::{extract_id, lookup_id_by_seq, lookup_seq_by_id, put_identity_refs, remove_identity_refs};
use super::sequence::{decode_biased, encode_biased};
use super::stats::{QueueStats, StatsCache};
use super::store::{Substrate, STAT_KEY};

/// A persistent FIFO container: [`push`](QueueEngine::push) appends,
/// [`shift`](QueueEngine::shift) consumes from the front,
/// [`unshift`](QueueEngine::unshift) prepends, `remove`/`get` work by
/// identity.
#[derive(Clone)]
pub struct QueueEngine {
    substrate: Arc<Substrate>,
    stats: Arc<StatsCache<QueueStats>>,
}

impl QueueEngine {
    pub fn new(substrate: Substrate) -> Self {
        Self {
            substrate: Arc::new(substrate),
            stats: Arc::new(StatsCache::new()),
        }
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&QueueEngine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| EngineError::Storage(format!("blocking task panicked: {e}")))?
    }

    /// Appends `payload`, or replaces an existing item of the same identity
    /// in place without advancing the tail.
    pub async fn push(&self, queue: &str, payload: Value) -> Result<(), EngineError> {
        let queue = queue.to_string();
        self.run_blocking(move |engine| engine.push_blocking(&queue, payload))
            .await
    }

    /// Pops and returns the oldest live item, or `None` if the queue is
    /// empty. Errors only if the queue was never created.
    pub async fn shift(&self, queue: &str) -> Result<Option<Value>, EngineError> {
        let queue = queue.to_string();
        self.run_blocking(move |engine| engine.shift_blocking(&queue))
            .await
    }

    /// Prepends `payload` at `head - 1`.
    pub async fn unshift(&self, queue: &str, payload: Value) -> Result<(), EngineError> {
        let queue = queue.to_string();
        self.run_blocking(move |engine| engine.unshift_blocking(&queue, payload))
            .await
    }

    /// Removes the item bearing `id`.
    pub async fn remove(&self, queue: &str, id: &str) -> Result<(), EngineError> {
        let queue = queue.to_string();
        let id = id.to_string();
        self.run_blocking(move |engine| engine.remove_blocking(&queue, &id))
            .await
    }

    /// Returns the payload bearing `id` without mutating the queue.
    pub async fn get(&self, queue: &str, id: &str) -> Result<Value, EngineError> {
        let queue = queue.to_string();
        let id = id.to_string();
        self.run_blocking(move |engine| engine.get_blocking(&queue, &id))
            .await
    }

    /// `tail - head - |removed|`. Zero for a queue that was never created.
    pub async fn length(&self, queue: &str) -> u64 {
        let queue = queue.to_string();
        self.run_blocking(move |engine| Ok(engine.length_blocking(&queue)))
            .await
            .unwrap_or(0)
    }

    /// Deletes the container and evicts its cached statistics.
    pub async fn drop_queue(&self, queue: &str) -> Result<(), EngineError> {
        let queue = queue.to_string();
        self.run_blocking(move |engine| engine.drop_blocking(&queue))
            .await
    }

    /// Flushes all pending writes to disk. Called on cooperative shutdown so
    /// a committed-but-not-yet-synced transaction isn't left to `sled`'s
    /// drop handler.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.run_blocking(|engine| engine.substrate.flush()).await
    }

    fn load_stats(stat_tree: &sled::Tree) -> QueueStats {
        stat_tree
            .get(STAT_KEY)
            .ok()
            .flatten()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn push_blocking(&self, queue: &str, payload: Value) -> Result<(), EngineError> {
        let trees = self.substrate.container(queue)?;
        let stats_lock = self
            .stats
            .get_or_load(queue, || Self::load_stats(&trees.stat));
        let id = extract_id(&payload).map(str::to_string);
        let encoded = serde_json::to_vec(&payload)?;

        let mut stats = stats_lock.lock().unwrap();
        let outcome: Result<QueueStats, TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id, &trees.stat).transaction(
                |(elements, id2seq, seq2id, stat)| {
                    let mut new_stats = stats.clone();
                    let existing_seq = match &id {
                        Some(id) => lookup_seq_by_id(id2seq, id)?,
                        None => None,
                    };

                    let seq_key = match &existing_seq {
                        Some(seq_bytes) => seq_bytes.to_vec(),
                        None => {
                            let key = encode_biased(new_stats.tail);
                            new_stats.tail += 1;
                            key.to_vec()
                        }
                    };

                    elements.insert(seq_key.as_slice(), encoded.as_slice())?;

                    if existing_seq.is_none() {
                        if let Some(id) = &id {
                            put_identity_refs(id2seq, seq2id, id, &seq_key)?;
                        }
                        let stat_bytes = serde_json::to_vec(&new_stats)
                            .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                        stat.insert(STAT_KEY, stat_bytes)?;
                    }

                    Ok(new_stats)
                },
            );

        let new_stats = outcome?;
        *stats = new_stats;
        Ok(())
    }

    fn shift_blocking(&self, queue: &str) -> Result<Option<Value>, EngineError> {
        if !self.substrate.container_exists(queue) {
            return Err(EngineError::QueueNotExists);
        }
        let trees = self.substrate.container(queue)?;
        let stats_lock = self
            .stats
            .get_or_load(queue, || Self::load_stats(&trees.stat));
        let mut stats = stats_lock.lock().unwrap();

        let outcome: Result<(Option<Value>, QueueStats), TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id, &trees.stat).transaction(
                |(elements, id2seq, seq2id, stat)| {
                    let mut new_stats = stats.clone();
                    let mut found = None;
                    let mut seq = new_stats.head;
                    while seq < new_stats.tail {
                        let key = encode_biased(seq);
                        if let Some(value) = elements.get(key)? {
                            found = Some((key, value));
                            break;
                        }
                        seq += 1;
                    }

                    let Some((key, value)) = found else {
                        return Ok((None, new_stats));
                    };

                    elements.remove(key.as_slice())?;
                    if let Some(id_bytes) = lookup_id_by_seq(seq2id, &key)? {
                        let id = String::from_utf8(id_bytes.to_vec()).map_err(|e| {
                            ConflictableTransactionError::Abort(EngineError::Corrupted(e.to_string()))
                        })?;
                        remove_identity_refs(id2seq, seq2id, &id, &key)?;
                    }

                    new_stats.head = seq + 1;
                    new_stats.compact_removed();

                    let payload: Value = serde_json::from_slice(&value)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    let stat_bytes = serde_json::to_vec(&new_stats)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    stat.insert(STAT_KEY, stat_bytes)?;

                    Ok((Some(payload), new_stats))
                },
            );

        let (payload, new_stats) = outcome?;
        *stats = new_stats;
        debug!(queue, found = payload.is_some(), "shift");
        Ok(payload)
    }

    fn unshift_blocking(&self, queue: &str, payload: Value) -> Result<(), EngineError> {
        if !self.substrate.container_exists(queue) {
            return Err(EngineError::QueueNotExists);
        }
        let trees = self.substrate.container(queue)?;
        let stats_lock = self
            .stats
            .get_or_load(queue, || Self::load_stats(&trees.stat));
        let id = extract_id(&payload).map(str::to_string);
        let encoded = serde_json::to_vec(&payload)?;

        let mut stats = stats_lock.lock().unwrap();
        if stats.head == 0 {
            return Err(EngineError::AtBeginning);
        }

        let outcome: Result<QueueStats, TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id, &trees.stat).transaction(
                |(elements, id2seq, seq2id, stat)| {
                    let mut new_stats = stats.clone();
                    if new_stats.head == 0 {
                        return Err(ConflictableTransactionError::Abort(EngineError::AtBeginning));
                    }

                    if let Some(id) = &id {
                        if let Some(existing_seq) = lookup_seq_by_id(id2seq, id)? {
                            elements.remove(existing_seq.as_ref())?;
                            remove_identity_refs(id2seq, seq2id, id, existing_seq.as_ref())?;
                            if let Some(removed_seq) = decode_seq_as_biased(&existing_seq) {
                                new_stats.removed.push(removed_seq);
                            }
                        }
                    }

                    new_stats.head -= 1;
                    let key = encode_biased(new_stats.head);
                    elements.insert(key.as_slice(), encoded.as_slice())?;
                    if let Some(id) = &id {
                        put_identity_refs(id2seq, seq2id, id, &key)?;
                    }
                    new_stats.compact_removed();

                    let stat_bytes = serde_json::to_vec(&new_stats)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    stat.insert(STAT_KEY, stat_bytes)?;

                    Ok(new_stats)
                },
            );

        let new_stats = outcome?;
        *stats = new_stats;
        Ok(())
    }

    fn remove_blocking(&self, queue: &str, id: &str) -> Result<(), EngineError> {
        if !self.substrate.container_exists(queue) {
            return Err(EngineError::QueueNotExists);
        }
        let trees = self.substrate.container(queue)?;
        let stats_lock = self
            .stats
            .get_or_load(queue, || Self::load_stats(&trees.stat));
        let mut stats = stats_lock.lock().unwrap();

        let outcome: Result<QueueStats, TransactionError<EngineError>> =
            (&trees.elements, &trees.id2seq, &trees.seq2id, &trees.stat).transaction(
                |(elements, id2seq, seq2id, stat)| {
                    let seq_key = lookup_seq_by_id(id2seq, id)?
                        .ok_or_else(|| ConflictableTransactionError::Abort(EngineError::NotFound))?;

                    elements.remove(seq_key.as_ref())?;
                    remove_identity_refs(id2seq, seq2id, id, seq_key.as_ref())?;

                    let mut new_stats = stats.clone();
                    if let Some(removed_seq) = decode_seq_as_biased(&seq_key) {
                        new_stats.removed.push(removed_seq);
                    }

                    let stat_bytes = serde_json::to_vec(&new_stats)
                        .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
                    stat.insert(STAT_KEY, stat_bytes)?;

                    Ok(new_stats)
                },
            );

        let new_stats = outcome?;
        *stats = new_stats;
        Ok(())
    }

    fn get_blocking(&self, queue: &str, id: &str) -> Result<Value, EngineError> {
        if !self.substrate.container_exists(queue) {
            return Err(EngineError::QueueNotExists);
        }
        let trees = self.substrate.container(queue)?;
        let seq_key = trees
            .id2seq
            .get(id.as_bytes())?
            .ok_or(EngineError::NotFound)?;
        let payload = trees
            .elements
            .get(seq_key.as_ref())?
            .ok_or_else(|| EngineError::Corrupted("identity ref with no payload".into()))?;
        Ok(serde_json::from_slice(&payload)?)
    }

    fn length_blocking(&self, queue: &str) -> u64 {
        if !self.substrate.container_exists(queue) {
            return 0;
        }
        let trees = match self.substrate.container(queue) {
            Ok(trees) => trees,
            Err(_) => return 0,
        };
        let stats_lock = self
            .stats
            .get_or_load(queue, || Self::load_stats(&trees.stat));
        stats_lock.lock().unwrap().length()
    }

    fn drop_blocking(&self, queue: &str) -> Result<(), EngineError> {
        let existed = self.substrate.drop_container(queue)?;
        self.stats.evict(queue);
        if existed {
            Ok(())
        } else {
            Err(EngineError::QueueNotExists)
        }
    }
}

/// Decodes a key that stores a biased (already zero-point-shifted) sequence,
/// as used by queue `head`/`tail`/`removed` bookkeeping.
fn decode_seq_as_biased(bytes: &[u8]) -> Option<u64> {
    decode_biased(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> (QueueEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let substrate = Substrate::open(&dir.path().join("queue.db")).unwrap();
        (QueueEngine::new(substrate), dir)
    }

    #[tokio::test]
    async fn fifo_order() {
        let (q, _dir) = engine();
        q.push("q1", json!("a")).await.unwrap();
        q.push("q1", json!("b")).await.unwrap();
        q.push("q1", json!("c")).await.unwrap();

        assert_eq!(q.shift("q1").await.unwrap(), Some(json!("a")));
        assert_eq!(q.shift("q1").await.unwrap(), Some(json!("b")));
        assert_eq!(q.shift("q1").await.unwrap(), Some(json!("c")));
        assert_eq!(q.length("q1").await, 0);
        assert_eq!(q.shift("q1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn shift_on_unknown_queue_errors() {
        let (q, _dir) = engine();
        let err = q.shift("never").await.unwrap_err();
        assert_eq!(err.kind(), "QueueNotExists");
    }

    #[tokio::test]
    async fn push_replaces_identified_item_in_place() {
        let (q, _dir) = engine();
        q.push("q2", json!({"_id": "1", "d": 1})).await.unwrap();
        q.push("q2", json!({"_id": "2", "d": 2})).await.unwrap();
        q.push("q2", json!({"_id": "1", "d": 4})).await.unwrap();

        assert_eq!(q.length("q2").await, 2);
        assert_eq!(q.shift("q2").await.unwrap(), Some(json!({"_id": "1", "d": 4})));
        assert_eq!(q.shift("q2").await.unwrap(), Some(json!({"_id": "2", "d": 2})));
    }

    #[tokio::test]
    async fn remove_by_identity_skips_item_on_shift() {
        let (q, _dir) = engine();
        for i in 0..5 {
            q.push("q3", json!({"_id": i.to_string(), "n": i}))
                .await
                .unwrap();
        }
        q.remove("q3", "2").await.unwrap();
        assert_eq!(q.length("q3").await, 4);

        let mut seen = Vec::new();
        while let Some(item) = q.shift("q3").await.unwrap() {
            seen.push(item["_id"].as_str().unwrap().to_string());
        }
        assert_eq!(seen, vec!["0", "1", "3", "4"]);
    }

    #[tokio::test]
    async fn unshift_prepends_and_rejects_at_beginning() {
        let (q, _dir) = engine();
        q.push("q4", json!("middle")).await.unwrap();
        let err = q.unshift("q4", json!("front")).await.unwrap_err();
        assert_eq!(err.kind(), "AtBeginning");
    }

    #[tokio::test]
    async fn unshift_after_shift_frees_room_at_the_front() {
        let (q, _dir) = engine();
        q.push("q5", json!("a")).await.unwrap();
        q.push("q5", json!("b")).await.unwrap();
        assert_eq!(q.shift("q5").await.unwrap(), Some(json!("a")));
        q.unshift("q5", json!("front")).await.unwrap();
        assert_eq!(q.shift("q5").await.unwrap(), Some(json!("front")));
        assert_eq!(q.shift("q5").await.unwrap(), Some(json!("b")));
    }

    #[tokio::test]
    async fn get_returns_without_mutating() {
        let (q, _dir) = engine();
        q.push("q6", json!({"_id": "x", "v": 1})).await.unwrap();
        assert_eq!(q.get("q6", "x").await.unwrap(), json!({"_id": "x", "v": 1}));
        assert_eq!(q.length("q6").await, 1);
        let err = q.get("q6", "missing").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn drop_removes_container_and_cache() {
        let (q, _dir) = engine();
        q.push("q7", json!("a")).await.unwrap();
        q.drop_queue("q7").await.unwrap();
        assert_eq!(q.length("q7").await, 0);
        let err = q.drop_queue("q7").await.unwrap_err();
        assert_eq!(err.kind(), "QueueNotExists");
    }

    #[tokio::test]
    async fn removed_hole_compacts_once_head_passes_it() {
        let (q, _dir) = engine();
        for i in 0..3 {
            q.push("q8", json!({"_id": i.to_string()})).await.unwrap();
        }
        q.remove("q8", "1").await.unwrap();
        q.shift("q8").await.unwrap(); // consumes id "0", head now points past the hole at "1"
        // after this shift, head has advanced past the removed sequence
        assert_eq!(q.length("q8").await, 1);
    }
}
