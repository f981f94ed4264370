//! Task outcome wire types: status, output, free-form metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome status of one task execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ok,
    Error,
    Timeout,
}

/// Terminal state of a step task as reported on `task:ended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Done,
    Failed,
}

/// Immutable outcome of one task execution.
///
/// `metadata` is a free-form map; every constructor records `durationMs`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub output: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskResult {
    fn with_duration(status: TaskStatus, output: impl Into<String>, duration_ms: u64) -> Self {
        let mut metadata = Map::new();
        metadata.insert("durationMs".to_string(), Value::from(duration_ms));
        Self {
            status,
            output: output.into(),
            metadata,
        }
    }

    /// Successful outcome.
    pub fn ok(output: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_duration(TaskStatus::Ok, output, duration_ms)
    }

    /// Failed outcome; `output` carries the error text.
    pub fn error(output: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_duration(TaskStatus::Error, output, duration_ms)
    }

    /// Timed-out outcome.
    pub fn timeout(output: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_duration(TaskStatus::Timeout, output, duration_ms)
    }

    /// Attaches an extra metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Duration recorded at construction, when present.
    pub fn duration_ms(&self) -> Option<u64> {
        self.metadata.get("durationMs").and_then(Value::as_u64)
    }

    /// Whether this task ended [`TaskStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == TaskStatus::Ok
    }
}
