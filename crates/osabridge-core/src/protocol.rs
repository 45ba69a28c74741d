//! Wire protocol: one JSON command per input line, one JSON result per output line

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Controller → bridge command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// Discriminator attached to every error result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    JsonDecode,
    UnknownAction,
    Validation,
    /// Rejected by the sanitizer or the script guard
    Policy,
    /// Interpreter exited nonzero or the script reported an error
    Execution,
    Timeout,
    Spawn,
    Platform,
    Internal,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::JsonDecode => "json_decode",
            ErrorType::UnknownAction => "unknown_action",
            ErrorType::Validation => "validation",
            ErrorType::Policy => "policy",
            ErrorType::Execution => "execution",
            ErrorType::Timeout => "timeout",
            ErrorType::Spawn => "spawn",
            ErrorType::Platform => "platform",
            ErrorType::Internal => "internal",
        }
    }
}

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Bridge → controller result: `status`, action payload, `execution_time_ms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
    pub fn with_status(status: &str) -> Self {
        let mut map = Map::new();
        map.insert("status".to_string(), Value::String(status.to_string()));
        Self(map)
    }

    pub fn success() -> Self {
        Self::with_status(STATUS_SUCCESS)
    }

    pub fn error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::with_status(STATUS_ERROR)
            .field("message", message.into())
            .field("error_type", error_type.as_str())
    }

    /// Add a payload field. `status` cannot be overwritten this way.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "status" {
            self.0.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(STATUS_SUCCESS)
    }

    pub fn set_execution_time_ms(&mut self, ms: u64) {
        self.0.insert("execution_time_ms".to_string(), Value::from(ms));
    }

    /// Single-line JSON; non-ASCII text is kept as literal characters.
    pub fn to_line(&self) -> String {
        // a map of JSON values always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| {
            r#"{"status":"error","message":"Unexpected error","error_type":"internal"}"#.to_string()
        })
    }
}
