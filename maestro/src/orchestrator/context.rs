//! Context assembly for the think step: system prompt with the agent roster,
//! the goal, and the accumulated step transcript with truncated outputs.

use crate::agent::AgentRegistry;
use crate::run::{Step, StepTaskStatus};

/// Default cap on each prior task output inside the context.
pub const DEFAULT_OUTPUT_TRUNCATION: usize = 3000;

/// Marker appended to outputs cut at the truncation limit.
pub const TRUNCATION_MARKER: &str = "…(truncated)";

/// Suffix forcing a finish once the step budget is spent.
pub const FORCED_FINISH_SUFFIX: &str = "You MUST respond with a finish action now";

const SYSTEM_PROMPT_HEADER: &str = "\
You are an orchestrator coordinating a pool of specialized agents. Each turn, \
inspect the goal and all results so far, then respond with ONLY a JSON object \
in one of two shapes:

To dispatch work (tasks run in parallel, so they must be independent):
{\"action\":\"execute\",\"tasks\":[{\"id\":\"t1\",\"task\":\"<instructions>\",\"agent\":\"<name or capability, optional>\"}]}

When the goal is fully met:
{\"action\":\"finish\",\"answer\":\"<final answer synthesized from the results>\"}

Available agents:";

/// Renders the agent roster as prompt lines.
pub fn agent_roster(registry: &AgentRegistry) -> String {
    if registry.is_empty() {
        return "(none registered; tasks will fail)".to_string();
    }
    registry
        .iter()
        .map(|adapter| {
            let mut line = format!("- {} ({})", adapter.name(), adapter.kind());
            if let Some(desc) = adapter.description() {
                line.push_str(": ");
                line.push_str(desc);
            }
            if !adapter.capabilities().is_empty() {
                line.push_str(&format!(" [capabilities: {}]", adapter.capabilities().join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the full context string for one think turn.
pub fn build_context(goal: &str, roster: &str, steps: &[Step], output_truncation: usize) -> String {
    let mut context = format!("{}\n{}\n\nGoal: {}", SYSTEM_PROMPT_HEADER, roster, goal);
    if steps.is_empty() {
        return context;
    }
    context.push_str("\n\nResults so far:");
    for step in steps {
        context.push_str(&format!("\n\nStep {}:", step.step_number));
        for task in &step.tasks {
            let agent = task.agent.as_deref().unwrap_or("auto");
            let status = match task.status {
                StepTaskStatus::Pending => "pending",
                StepTaskStatus::Running => "running",
                StepTaskStatus::Done => "done",
                StepTaskStatus::Failed => "failed",
            };
            context.push_str(&format!("\n- Task {} ({}) [{}]", task.id, agent, status));
            if let Some(result) = &task.result {
                context.push('\n');
                context.push_str(&truncate_output(&result.output, output_truncation));
            }
        }
    }
    context
}

/// Cuts `output` at `limit` characters and appends the truncation marker.
pub fn truncate_output(output: &str, limit: usize) -> String {
    if output.chars().count() <= limit {
        return output.to_string();
    }
    let mut truncated: String = output.chars().take(limit).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
