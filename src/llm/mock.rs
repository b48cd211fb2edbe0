//! Offline backend: canned answers per schema name, or a value synthesized
//! from the schema itself

use super::{LlmClient, LlmError, LlmRequest};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockLlmClient {
    responses: HashMap<String, Value>,
    failing: HashSet<String>,
    seen: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `schema_name` with `value`
    pub fn with_response(mut self, schema_name: &str, value: Value) -> Self {
        self.responses.insert(schema_name.to_string(), value);
        self
    }

    /// Fail every request for `schema_name`
    pub fn failing_on(mut self, schema_name: &str) -> Self {
        self.failing.insert(schema_name.to_string());
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.seen.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_json(&self, request: LlmRequest) -> Result<Value, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }

        if self.failing.contains(&request.schema_name) {
            return Err(LlmError::Api {
                status: 500,
                body: format!("mock failure for {}", request.schema_name),
            });
        }

        Ok(match self.responses.get(&request.schema_name) {
            Some(value) => value.clone(),
            None => fill_from_schema(&request.schema, &request.schema_name),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Smallest value that satisfies the common JSON Schema keywords
pub fn fill_from_schema(schema: &Value, name: &str) -> Value {
    if let Some(first) = schema.get("enum").and_then(Value::as_array).and_then(|v| v.first()) {
        return first.clone();
    }

    match schema.get("type").and_then(Value::as_str).unwrap_or("object") {
        "object" => {
            let mut out = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, sub) in props {
                    out.insert(key.clone(), fill_from_schema(sub, key));
                }
            }
            Value::Object(out)
        }
        "array" => {
            let min = schema.get("minItems").and_then(Value::as_u64).unwrap_or(1).max(1);
            let item = schema.get("items").cloned().unwrap_or_else(|| json!({"type": "string"}));
            Value::Array((0..min).map(|_| fill_from_schema(&item, name)).collect())
        }
        "integer" => json!(schema.get("minimum").and_then(Value::as_i64).unwrap_or(1).max(1)),
        "number" => json!(schema.get("minimum").and_then(Value::as_f64).unwrap_or(0.5)),
        "boolean" => json!(true),
        _ => {
            let mut text = format!("mock {}", name.replace('_', " "));
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                text = text.chars().take(max as usize).collect();
            }
            json!(text)
        }
    }
}
