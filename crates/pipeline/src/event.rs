//! Events and contexts
//!
//! Events are JSON values. The context is a JSON object travelling next to
//! the event; the pipeline merges its base context into it on every inject.

use serde_json::{Map, Value};

/// An event flowing through a pipeline
pub type Event = Value;

/// Per-event metadata
pub type Context = Map<String, Value>;

/// Merge the request context over the base context; request keys win
pub fn merge_context(base: &Context, request: Option<Context>) -> Context {
    let mut merged = base.clone();
    if let Some(request) = request {
        merged.extend(request);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => Context::new(),
        }
    }

    #[test]
    fn test_merge_request_wins() {
        let base = ctx(json!({"env": "prod", "region": "eu"}));
        let merged = merge_context(&base, Some(ctx(json!({"env": "dev", "id": 7}))));

        assert_eq!(merged["env"], "dev");
        assert_eq!(merged["region"], "eu");
        assert_eq!(merged["id"], 7);
    }

    #[test]
    fn test_merge_without_request() {
        let base = ctx(json!({"env": "prod"}));
        assert_eq!(merge_context(&base, None), base);
    }
}
