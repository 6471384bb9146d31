// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end scenarios against the queue engine, driven directly through
//! `Engines` rather than over a socket.

use serde_json::json;
use tempfile::tempdir;

use persist_queue_service::engine::Engines;

fn engines() -> (Engines, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let engines = Engines::open(&dir.path().join("queue.db"), &dir.path().join("list.db")).unwrap();
    (engines, dir)
}

#[tokio::test]
async fn fifo_order_is_preserved_end_to_end() {
    let (engines, _dir) = engines();
    let q = &engines.queues;

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
async fn pushing_a_known_identity_replaces_it_in_place() {
    let (engines, _dir) = engines();
    let q = &engines.queues;

    q.push("q2", json!({"_id": "1", "d": 1})).await.unwrap();
    q.push("q2", json!({"_id": "2", "d": 2})).await.unwrap();
    q.push("q2", json!({"_id": "1", "d": 4})).await.unwrap();

    assert_eq!(q.length("q2").await, 2);
    assert_eq!(q.shift("q2").await.unwrap(), Some(json!({"_id": "1", "d": 4})));
    assert_eq!(q.shift("q2").await.unwrap(), Some(json!({"_id": "2", "d": 2})));
}

#[tokio::test]
async fn removing_by_identity_leaves_a_hole_that_shift_skips() {
    let (engines, _dir) = engines();
    let q = &engines.queues;

    for i in 0..5 {
        q.push("q3", json!({"_id": i.to_string(), "d": i})).await.unwrap();
    }
    q.remove("q3", "2").await.unwrap();
    assert_eq!(q.length("q3").await, 4);

    for i in [0, 1, 3, 4] {
        assert_eq!(
            q.shift("q3").await.unwrap(),
            Some(json!({"_id": i.to_string(), "d": i}))
        );
    }
    assert_eq!(q.shift("q3").await.unwrap(), None);
}
