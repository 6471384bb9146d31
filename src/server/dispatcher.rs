// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Maps textual RPC operation names to engine calls.
//!
//! Argument decoding is positional and happens entirely before any engine
//! call: a request with the wrong arity or a wrong leading-argument type is
//! rejected with `InvalidArguments` without ever touching a container,
//! mirroring the discipline the rest of this codebase applies at its own
//! wire boundary (convert to typed values first, mutate state second).

use serde_json::{json, Value};

use crate::engine::{EngineError, Engines, Positioned};

/// Dispatches one decoded request to its engine operation and returns the
/// JSON result value, or the `EngineError` to report back to the caller.
pub async fn dispatch(engines: &Engines, op: &str, args: &[Value]) -> Result<Value, EngineError> {
    match op {
        "queue.push" => {
            let (name, payload) = name_and_payload(args)?;
            engines.queues.push(name, payload).await?;
            Ok(Value::Null)
        }
        "queue.shift" => {
            let name = name_arg(args)?;
            let item = engines.queues.shift(name).await?;
            Ok(item.unwrap_or(Value::Null))
        }
        "queue.unshift" => {
            let (name, payload) = name_and_payload(args)?;
            engines.queues.unshift(name, payload).await?;
            Ok(Value::Null)
        }
        "queue.remove" => {
            let (name, id) = name_and_id(args)?;
            engines.queues.remove(name, id).await?;
            Ok(Value::Null)
        }
        "queue.get" => {
            let (name, id) = name_and_id(args)?;
            engines.queues.get(name, id).await
        }
        "queue.length" => {
            let name = name_arg(args)?;
            Ok(json!(engines.queues.length(name).await))
        }
        "queue.drop" => {
            let name = name_arg(args)?;
            engines.queues.drop_queue(name).await?;
            Ok(Value::Null)
        }

        "list.pushBack" => {
            let (name, payload) = name_and_payload(args)?;
            let position = engines.lists.push_back(name, payload).await?;
            Ok(json!(position))
        }
        "list.pushFront" => {
            let (name, payload) = name_and_payload(args)?;
            let position = engines.lists.push_front(name, payload).await?;
            Ok(json!(position))
        }
        "list.front" => {
            let name = name_arg(args)?;
            let found = engines.lists.front(name).await?;
            positioned_or_not_found(found)
        }
        "list.back" => {
            let name = name_arg(args)?;
            let found = engines.lists.back(name).await?;
            positioned_or_not_found(found)
        }
        "list.next" => {
            let (name, position) = name_and_position(args)?;
            let found = engines.lists.next(name, position).await?;
            Ok(positioned(found))
        }
        "list.prev" => {
            let (name, position) = name_and_position(args)?;
            let found = engines.lists.prev(name, position).await?;
            Ok(positioned(found))
        }
        "list.get" => {
            let (name, position) = name_and_position(args)?;
            engines.lists.get(name, position).await
        }
        "list.getById" => {
            let (name, id) = name_and_id(args)?;
            let found = engines.lists.get_by_id(name, id).await?;
            Ok(positioned(found))
        }
        "list.updateById" => {
            let (name, payload) = name_and_payload(args)?;
            engines.lists.update_by_id(name, payload).await?;
            Ok(Value::Null)
        }
        "list.remove" => {
            let (name, position) = name_and_position(args)?;
            engines.lists.remove(name, position).await?;
            Ok(Value::Null)
        }
        "list.removeById" => {
            let (name, id) = name_and_id(args)?;
            engines.lists.remove_by_id(name, id).await?;
            Ok(Value::Null)
        }
        "list.length" => {
            let name = name_arg(args)?;
            Ok(json!(engines.lists.length(name).await))
        }
        "list.drop" => {
            let name = name_arg(args)?;
            engines.lists.drop_list(name).await?;
            Ok(Value::Null)
        }

        other => Err(EngineError::InvalidArguments(format!(
            "unknown operation \"{}\"",
            other
        ))),
    }
}

fn positioned(found: Positioned) -> Value {
    json!({ "element": found.value, "position": found.position })
}

fn positioned_or_not_found(found: Option<Positioned>) -> Result<Value, EngineError> {
    found.map(positioned).ok_or(EngineError::NotFound)
}

fn name_arg(args: &[Value]) -> Result<&str, EngineError> {
    args.first()
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidArguments("expected a container name string".into()))
}

fn str_arg(args: &[Value], index: usize) -> Result<&str, EngineError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidArguments(format!("expected a string at position {}", index)))
}

fn i64_arg(args: &[Value], index: usize) -> Result<i64, EngineError> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::InvalidArguments(format!("expected an integer at position {}", index)))
}

fn name_and_payload(args: &[Value]) -> Result<(&str, Value), EngineError> {
    if args.len() != 2 {
        return Err(EngineError::InvalidArguments(format!(
            "expected 2 arguments, got {}",
            args.len()
        )));
    }
    Ok((name_arg(args)?, args[1].clone()))
}

fn name_and_id<'a>(args: &'a [Value]) -> Result<(&'a str, &'a str), EngineError> {
    if args.len() != 2 {
        return Err(EngineError::InvalidArguments(format!(
            "expected 2 arguments, got {}",
            args.len()
        )));
    }
    Ok((name_arg(args)?, str_arg(args, 1)?))
}

fn name_and_position(args: &[Value]) -> Result<(&str, i64), EngineError> {
    if args.len() != 2 {
        return Err(EngineError::InvalidArguments(format!(
            "expected 2 arguments, got {}",
            args.len()
        )));
    }
    Ok((name_arg(args)?, i64_arg(args, 1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engines() -> (Engines, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engines = Engines::open(&dir.path().join("q.db"), &dir.path().join("l.db")).unwrap();
        (engines, dir)
    }

    #[tokio::test]
    async fn push_then_shift_round_trip() {
        let (engines, _dir) = engines();
        dispatch(&engines, "queue.push", &[json!("q"), json!("a")])
            .await
            .unwrap();
        let result = dispatch(&engines, "queue.shift", &[json!("q")]).await.unwrap();
        assert_eq!(result, json!("a"));
    }

    #[tokio::test]
    async fn wrong_arity_is_rejected_before_touching_the_engine() {
        let (engines, _dir) = engines();
        let err = dispatch(&engines, "queue.push", &[json!("q")]).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArguments");
        assert_eq!(engines.queues.length("q").await, 0);
    }

    #[tokio::test]
    async fn wrong_leading_type_is_rejected() {
        let (engines, _dir) = engines();
        let err = dispatch(&engines, "queue.length", &[json!(42)]).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArguments");
    }

    #[tokio::test]
    async fn list_traversal_wraps_element_and_position() {
        let (engines, _dir) = engines();
        dispatch(&engines, "list.pushBack", &[json!("l"), json!("a")])
            .await
            .unwrap();
        let result = dispatch(&engines, "list.front", &[json!("l")]).await.unwrap();
        assert_eq!(result["element"], json!("a"));
        assert_eq!(result["position"], json!(1));
    }

    #[tokio::test]
    async fn unknown_operation_is_invalid_arguments() {
        let (engines, _dir) = engines();
        let err = dispatch(&engines, "queue.frobnicate", &[]).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArguments");
    }
}
