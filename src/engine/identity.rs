// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity extraction and the bidirectional `id<->seq` index.
//!
//! All helpers here run inside the caller's `sled` transaction closure; none
//! of them commit anything on their own.

use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use serde_json::Value;

use super::error::EngineError;

/// Returns the non-empty string `_id` field of `payload` if it is present.
///
/// Anonymous payloads (no `_id`, a non-string `_id`, or an empty string) are
/// never rejected on this basis -- they simply don't participate in the
/// identity index.
pub fn extract_id(payload: &Value) -> Option<&str> {
    let id = payload.as_object()?.get("_id")?.as_str()?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Writes the bidirectional `id -> seq` / `seq -> id` link.
pub fn put_identity_refs(
    id2seq: &TransactionalTree,
    seq2id: &TransactionalTree,
    id: &str,
    seq_key: &[u8],
) -> Result<(), ConflictableTransactionError<EngineError>> {
    id2seq.insert(id.as_bytes(), seq_key)?;
    seq2id.insert(seq_key, id.as_bytes())?;
    Ok(())
}

/// Deletes both directions of the identity link, if present.
pub fn remove_identity_refs(
    id2seq: &TransactionalTree,
    seq2id: &TransactionalTree,
    id: &str,
    seq_key: &[u8],
) -> Result<(), ConflictableTransactionError<EngineError>> {
    id2seq.remove(id.as_bytes())?;
    seq2id.remove(seq_key)?;
    Ok(())
}

/// Resolves an identity to the sequence key of the item bearing it.
pub fn lookup_seq_by_id(
    id2seq: &TransactionalTree,
    id: &str,
) -> Result<Option<sled::IVec>, ConflictableTransactionError<EngineError>> {
    Ok(id2seq.get(id.as_bytes())?)
}

/// Looks up the identity bound to a sequence key, if any.
pub fn lookup_id_by_seq(
    seq2id: &TransactionalTree,
    seq_key: &[u8],
) -> Result<Option<sled::IVec>, ConflictableTransactionError<EngineError>> {
    Ok(seq2id.get(seq_key)?)
}
