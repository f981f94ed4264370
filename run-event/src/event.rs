//! Dashboard event union: one variant per `data:` line on the event stream.
//!
//! The `type` field discriminates; payload fields are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{TaskOutcome, TaskResult};

/// One dashboard event. Serialized as `{"type":"<name>", ...payload}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "run:started", rename_all = "camelCase")]
    RunStarted { run_id: String, goal: String },

    #[serde(rename = "step:thinking", rename_all = "camelCase")]
    StepThinking { run_id: String, step_number: u32 },

    #[serde(rename = "step:started", rename_all = "camelCase")]
    StepStarted {
        run_id: String,
        step_number: u32,
        task_ids: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tasks: Option<Vec<String>>,
    },

    #[serde(rename = "task:started", rename_all = "camelCase")]
    TaskStarted {
        run_id: String,
        step_number: u32,
        task_id: String,
    },

    #[serde(rename = "task:chunk", rename_all = "camelCase")]
    TaskChunk {
        run_id: String,
        step_number: u32,
        task_id: String,
        content: String,
        done: bool,
    },

    #[serde(rename = "task:ended", rename_all = "camelCase")]
    TaskEnded {
        run_id: String,
        step_number: u32,
        task_id: String,
        result: TaskResult,
        status: TaskOutcome,
    },

    #[serde(rename = "step:ended", rename_all = "camelCase")]
    StepEnded { run_id: String, step_number: u32 },

    #[serde(rename = "run:complete", rename_all = "camelCase")]
    RunComplete {
        run_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        duration_ms: u64,
    },

    #[serde(rename = "run:error", rename_all = "camelCase")]
    RunError { run_id: String, error: String },

    #[serde(rename = "run:deleted", rename_all = "camelCase")]
    RunDeleted { run_id: String },
}

impl RunEvent {
    /// Serializes this event to a JSON object (the `data:` payload).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepThinking { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::TaskStarted { run_id, .. }
            | RunEvent::TaskChunk { run_id, .. }
            | RunEvent::TaskEnded { run_id, .. }
            | RunEvent::StepEnded { run_id, .. }
            | RunEvent::RunComplete { run_id, .. }
            | RunEvent::RunError { run_id, .. }
            | RunEvent::RunDeleted { run_id } => run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn run_started_wire_shape() {
        let ev = RunEvent::RunStarted {
            run_id: "r1".to_string(),
            goal: "do things".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"run:started\""));
        assert!(json.contains("\"runId\":\"r1\""));
        assert!(json.contains("\"goal\":\"do things\""));
    }

    #[test]
    fn step_started_omits_absent_tasks() {
        let ev = RunEvent::StepStarted {
            run_id: "r1".to_string(),
            step_number: 2,
            task_ids: vec!["t1".to_string()],
            tasks: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"stepNumber\":2"));
        assert!(json.contains("\"taskIds\":[\"t1\"]"));
        assert!(!json.contains("\"tasks\""));
    }

    #[test]
    fn task_ended_roundtrip() {
        let ev = RunEvent::TaskEnded {
            run_id: "r1".to_string(),
            step_number: 1,
            task_id: "t1".to_string(),
            result: TaskResult::ok("output", 12),
            status: TaskOutcome::Done,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"task:ended\""));
        assert!(json.contains("\"status\":\"done\""));
        let back: RunEvent = serde_json::from_str(&json).unwrap();
        match back {
            RunEvent::TaskEnded { result, status, .. } => {
                assert_eq!(result.status, TaskStatus::Ok);
                assert_eq!(status, TaskOutcome::Done);
            }
            _ => panic!("expected task:ended"),
        }
    }

    #[test]
    fn run_complete_without_answer() {
        let ev = RunEvent::RunComplete {
            run_id: "r1".to_string(),
            answer: None,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"durationMs\":1500"));
        assert!(!json.contains("\"answer\""));
    }

    #[test]
    fn run_id_accessor_covers_variants() {
        let ev = RunEvent::RunDeleted {
            run_id: "gone".to_string(),
        };
        assert_eq!(ev.run_id(), "gone");
    }
}
