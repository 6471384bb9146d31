// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue/list RPC wire protocol.
//!
//! A simple length-prefixed JSON protocol, not interoperable with any other
//! wire format.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One RPC frame. Requests carry a caller-chosen `id` that is echoed back
/// on the matching `response`/`error` so a connection can have several
/// requests in flight at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "request")]
    Request { id: u64, op: String, args: Vec<Value> },

    #[serde(rename = "response")]
    Response { id: u64, result: Value },

    #[serde(rename = "error")]
    Error { id: u64, kind: String, message: String },
}

impl Frame {
    pub fn response(id: u64, result: Value) -> Self {
        Self::Response { id, result }
    }

    pub fn error(id: u64, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Protocol-level error types, distinct from [`crate::engine::EngineError`]:
/// these arise from malformed framing, not from container operations.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    FrameTooLarge { len: usize, max: usize },
    InvalidMessage(String),
    IoError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds the {}-byte limit", len, max)
            }
            Self::InvalidMessage(s) => write!(f, "invalid message: {}", s),
            Self::IoError(s) => write!(f, "I/O error: {}", s),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrips_through_json() {
        let frame = Frame::Request {
            id: 7,
            op: "queue.push".into(),
            args: vec![json!("orders"), json!({"_id": "1"})],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"request\""));

        let parsed: Frame = serde_json::from_str(&json).unwrap();
        match parsed {
            Frame::Request { id, op, args } => {
                assert_eq!(id, 7);
                assert_eq!(op, "queue.push");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("wrong frame variant"),
        }
    }

    #[test]
    fn response_roundtrips() {
        let frame = Frame::response(3, json!({"ok": true}));
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        match parsed {
            Frame::Response { id, result } => {
                assert_eq!(id, 3);
                assert_eq!(result, json!({"ok": true}));
            }
            _ => panic!("wrong frame variant"),
        }
    }

    #[test]
    fn error_carries_stable_kind_tag() {
        let frame = Frame::error(9, "NotFound", "no item bearing that identity");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"NotFound\""));
    }
}
