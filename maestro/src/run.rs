//! Run model: one end-to-end execution of a goal, composed of steps.
//!
//! Serializes to the dashboard JSON shape (camelCase). The loop is the single
//! writer; the dashboard reads snapshots.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use run_event::TaskResult;

use crate::directive::TaskSpec;

/// Lifecycle state of a run. Alternates thinking↔executing until a terminal
/// transition to done or error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Thinking,
    Executing,
    Done,
    Error,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Error)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Thinking => "thinking",
            RunState::Executing => "executing",
            RunState::Done => "done",
            RunState::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thinking" => Ok(RunState::Thinking),
            "executing" => Ok(RunState::Executing),
            "done" => Ok(RunState::Done),
            "error" => Ok(RunState::Error),
            _ => Err(format!("unknown run state: {}", s)),
        }
    }
}

/// Status of one task inside a step. Advances monotonically
/// pending → running → done | failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepTaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One unit inside a step: a prompt, an optional routing hint, and (once
/// terminal) the result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTask {
    pub id: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub status: StepTaskStatus,
    /// Present iff status is done or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl StepTask {
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: spec.id,
            task: spec.task,
            agent: spec.agent,
            status: StepTaskStatus::Pending,
            result: None,
        }
    }

    /// Records the terminal outcome: done for ok results, failed otherwise.
    pub fn complete(&mut self, result: TaskResult) {
        self.status = if result.is_ok() {
            StepTaskStatus::Done
        } else {
            StepTaskStatus::Failed
        };
        self.result = Some(result);
    }
}

/// One executed batch of tasks following a single think.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 1-based, strictly increasing within a run.
    pub step_number: u32,
    pub tasks: Vec<StepTask>,
}

impl Step {
    pub fn new(step_number: u32, specs: Vec<TaskSpec>) -> Self {
        Self {
            step_number,
            tasks: specs.into_iter().map(StepTask::from_spec).collect(),
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

/// The unit of work: a goal driven to completion over appended steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
    pub goal: String,
    pub state: RunState,
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds.
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Run {
    /// Creates a run in `thinking` with `started_at` set to now.
    pub fn new(run_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            goal: goal.into(),
            state: RunState::Thinking,
            steps: Vec::new(),
            final_answer: None,
            error: None,
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
        }
    }

    /// Terminal transition to done. `finished_at` is set only on the first
    /// terminal transition.
    pub fn finish(&mut self, answer: impl Into<String>) {
        self.state = RunState::Done;
        self.final_answer = Some(answer.into());
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now().timestamp_millis());
        }
    }

    /// Terminal transition to error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = RunState::Error;
        self.error = Some(error.into());
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now().timestamp_millis());
        }
    }

    /// Wall-clock duration, once terminal.
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|f| f.saturating_sub(self.started_at).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_thinking() {
        let run = Run::new("r1", "do things");
        assert_eq!(run.state, RunState::Thinking);
        assert!(run.steps.is_empty());
        assert!(run.finished_at.is_none());
        assert!(run.started_at > 0);
    }

    #[test]
    fn finish_sets_answer_and_finished_at_once() {
        let mut run = Run::new("r1", "g");
        run.finish("the answer");
        assert_eq!(run.state, RunState::Done);
        assert_eq!(run.final_answer.as_deref(), Some("the answer"));
        let first = run.finished_at.unwrap();
        run.finish("again");
        assert_eq!(run.finished_at.unwrap(), first);
    }

    #[test]
    fn fail_sets_error() {
        let mut run = Run::new("r1", "g");
        run.fail("boom");
        assert_eq!(run.state, RunState::Error);
        assert_eq!(run.error.as_deref(), Some("boom"));
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn step_task_complete_maps_status() {
        let mut task = StepTask::from_spec(TaskSpec {
            id: "t1".to_string(),
            task: "do".to_string(),
            agent: None,
        });
        assert_eq!(task.status, StepTaskStatus::Pending);
        task.complete(TaskResult::error("nope", 1));
        assert_eq!(task.status, StepTaskStatus::Failed);
        assert!(task.result.is_some());
    }

    #[test]
    fn run_serializes_camel_case() {
        let run = Run::new("r1", "g");
        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"runId\":\"r1\""));
        assert!(json.contains("\"startedAt\""));
        assert!(!json.contains("\"finalAnswer\""));
        assert!(json.contains("\"state\":\"thinking\""));
    }

    #[test]
    fn run_state_roundtrip() {
        for s in [
            RunState::Thinking,
            RunState::Executing,
            RunState::Done,
            RunState::Error,
        ] {
            let parsed: RunState = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("finished".parse::<RunState>().is_err());
    }
}
