use std::sync::Arc;

use minijinja::Value;
use minijinja::value::{Enumerator, Object};
use serde::Serialize;

/// Response from adapter statement execution
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct AdapterResponse {
    /// Message from adapter
    pub message: String,
    /// Status code from adapter
    pub code: String,
    /// Rows affected by statement
    pub rows_affected: i64,
    /// Query ID of executed statement, if available
    pub query_id: Option<String>,
}

impl AdapterResponse {
    /// Generic acknowledgment carrying no row count or job metadata.
    pub fn ok() -> Self {
        AdapterResponse {
            message: "OK".to_string(),
            ..Default::default()
        }
    }
}

impl Object for AdapterResponse {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "message" => Some(Value::from(self.message.clone())),
            "code" => Some(Value::from(self.code.clone())),
            "rows_affected" => Some(Value::from(self.rows_affected)),
            "query_id" => Some(Value::from(self.query_id.clone())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["message", "code", "rows_affected", "query_id"])
    }
}

impl std::fmt::Display for AdapterResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
