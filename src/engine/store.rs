// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ordered-key substrate backing both engines.
//!
//! A [`Substrate`] owns one `sled::Db` (one on-disk file) per container
//! family. Each container gets four `sled::Tree`s, opened lazily on first
//! access and dropped together on `drop_container`.

use std::path::Path;

use super::error::EngineError;

/// Key under which a container's statistics record is stored in its `stat`
/// tree.
pub const STAT_KEY: &[u8] = b"stat";

/// The four sub-namespaces that make up one container.
pub struct ContainerTrees {
    pub elements: sled::Tree,
    pub id2seq: sled::Tree,
    pub seq2id: sled::Tree,
    pub stat: sled::Tree,
}

/// An embedded, transactional, ordered-key store for one container family
/// (all queues, or all lists).
pub struct Substrate {
    db: sled::Db,
}

impl Substrate {
    /// Opens (creating if absent) the substrate file at `path`.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Opens the four trees belonging to container `name`, creating any
    /// that don't exist yet.
    pub fn container(&self, name: &str) -> Result<ContainerTrees, EngineError> {
        Ok(ContainerTrees {
            elements: self.db.open_tree(format!("{name}\0elements"))?,
            id2seq: self.db.open_tree(format!("{name}\0id2seq"))?,
            seq2id: self.db.open_tree(format!("{name}\0seq2id"))?,
            stat: self.db.open_tree(format!("{name}\0stat"))?,
        })
    }

    /// Returns true if any of `name`'s trees already exist, without
    /// creating them.
    pub fn container_exists(&self, name: &str) -> bool {
        let elements_name = format!("{name}\0elements");
        self.db
            .tree_names()
            .iter()
            .any(|t| t.as_ref() == elements_name.as_bytes())
    }

    /// Deletes all four trees belonging to container `name`.
    ///
    /// Returns `false` if the container's `elements` tree did not exist
    /// (the other three are dropped unconditionally since an
    /// identity-only write could, in principle, have created them first).
    pub fn drop_container(&self, name: &str) -> Result<bool, EngineError> {
        let existed = self.db.drop_tree(format!("{name}\0elements"))?;
        self.db.drop_tree(format!("{name}\0id2seq"))?;
        self.db.drop_tree(format!("{name}\0seq2id"))?;
        self.db.drop_tree(format!("{name}\0stat"))?;
        Ok(existed)
    }

    /// The database's monotonic id generator, used for list push-back.
    pub fn next_id(&self) -> Result<u64, EngineError> {
        Ok(self.db.generate_id()?)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let substrate = Substrate::open(&dir.path().join("q.db")).unwrap();

        assert!(!substrate.container_exists("orders"));
        let trees = substrate.container("orders").unwrap();
        trees.elements.insert(b"k", b"v").unwrap();
        assert!(substrate.container_exists("orders"));

        let existed = substrate.drop_container("orders").unwrap();
        assert!(existed);
        assert!(!substrate.container_exists("orders"));
    }

    #[test]
    fn next_id_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let substrate = Substrate::open(&dir.path().join("l.db")).unwrap();
        let a = substrate.next_id().unwrap();
        let b = substrate.next_id().unwrap();
        assert!(b > a);
    }
}
