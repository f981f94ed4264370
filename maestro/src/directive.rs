//! Directive parsing: extract a JSON instruction from raw thinker output.
//!
//! Thinkers are asked for a bare JSON object but routinely wrap it in code
//! fences or prose, or get truncated mid-answer. The pipeline tries, in order:
//!
//! 1. strip a leading ```/```json fence and trailing fence, parse;
//! 2. the substring from the first `{` to the last `}`, parse;
//! 3. truncated-finish salvage: recover the answer text of a cut-off
//!    `{"action":"finish","answer":"…` object;
//! 4. fail, preserving whether no object was found or the JSON was invalid
//!    (the orchestrator re-prompts exactly once on those two).
//!
//! Salvage and the re-prompt are plain `Result` control flow; nothing unwinds.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Minimum recovered answer length for a salvaged finish to count.
const SALVAGE_MIN_ANSWER_LEN: usize = 10;

/// One task inside an execute directive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Structured instruction emitted by the thinker each iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Directive {
    /// Dispatch this batch of tasks in parallel.
    Execute { tasks: Vec<TaskSpec> },
    /// The goal is met; `answer` is the final synthesized reply.
    Finish { answer: String },
}

/// Why thinker output failed to become a directive.
#[derive(Debug, Error)]
pub enum DirectiveError {
    /// No `{…}` region at all in the output.
    #[error("no JSON object in thinker output")]
    NoJsonObject,

    /// A `{…}` region existed but was not parseable JSON (after salvage).
    #[error("invalid JSON in thinker output: {0}")]
    InvalidJson(String),

    /// Valid JSON with an action outside {execute, finish}.
    #[error("Unknown orchestrator action: {0}")]
    UnknownAction(String),

    /// Execute directive with no tasks.
    #[error("execute directive has no tasks")]
    NoTasks,

    /// A task entry without a usable id or prompt.
    #[error("invalid task at index {0}: {1}")]
    InvalidTask(usize, String),

    /// Finish directive with no answer.
    #[error("finish directive has no answer")]
    NoAnswer,
}

impl DirectiveError {
    /// Parse-stage failures trigger the single re-prompt; schema violations
    /// abort the run immediately.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            DirectiveError::NoJsonObject | DirectiveError::InvalidJson(_)
        )
    }
}

/// Parses raw thinker output into a [`Directive`].
pub fn parse_directive(raw: &str) -> Result<Directive, DirectiveError> {
    let fenced = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str::<Value>(fenced.trim()) {
        return validate(value);
    }

    match extract_json_region(raw) {
        Some(region) => match serde_json::from_str::<Value>(region) {
            Ok(value) => validate(value),
            Err(e) => salvage_truncated_finish(raw)
                .map(|answer| Directive::Finish { answer })
                .ok_or_else(|| DirectiveError::InvalidJson(e.to_string())),
        },
        None => salvage_truncated_finish(raw)
            .map(|answer| Directive::Finish { answer })
            .ok_or(DirectiveError::NoJsonObject),
    }
}

/// The re-prompt suffix appended to the context when parsing fails once.
pub const REPROMPT_SUFFIX: &str = "IMPORTANT: Respond with ONLY a JSON object, no other text.";

/// Removes a leading ``` or ```json fence line and a trailing ``` fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line ("json", "", …).
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// The substring from the first `{` through the last `}`, if any.
fn extract_json_region(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end >= start).then(|| &raw[start..=end])
}

/// Recovers the answer from a truncated `{"action":"finish","answer":"…`.
///
/// Idempotent on complete finish JSON: the trailing `"}` is stripped as noise,
/// so a valid object salvages to the same answer it parses to.
fn salvage_truncated_finish(raw: &str) -> Option<String> {
    let finish_re = Regex::new(r#""action"\s*:\s*"finish""#).ok()?;
    if !finish_re.is_match(raw) {
        return None;
    }
    let answer_re = Regex::new(r#""answer"\s*:\s*""#).ok()?;
    let m = answer_re.find(raw)?;
    let tail = &raw[m.end()..];
    let cleaned = tail.trim_end_matches(|c: char| {
        c == '"' || c == '}' || c == '`' || c.is_whitespace()
    });
    let answer = unescape_json_fragment(cleaned);
    (answer.len() >= SALVAGE_MIN_ANSWER_LEN).then_some(answer)
}

/// Un-escapes the sequences a truncated JSON string can carry: \n, \", \\.
/// Unknown escapes are kept verbatim.
fn unescape_json_fragment(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Schema validation of a parsed JSON object.
fn validate(value: Value) -> Result<Directive, DirectiveError> {
    let action = value.get("action").and_then(Value::as_str);
    match action {
        Some("execute") => {
            let tasks = value
                .get("tasks")
                .and_then(Value::as_array)
                .ok_or(DirectiveError::NoTasks)?;
            if tasks.is_empty() {
                return Err(DirectiveError::NoTasks);
            }
            let mut specs = Vec::with_capacity(tasks.len());
            for (i, entry) in tasks.iter().enumerate() {
                specs.push(validate_task(i, entry)?);
            }
            Ok(Directive::Execute { tasks: specs })
        }
        Some("finish") => {
            let answer = value
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if answer.is_empty() {
                return Err(DirectiveError::NoAnswer);
            }
            Ok(Directive::Finish {
                answer: answer.to_string(),
            })
        }
        Some(other) => Err(DirectiveError::UnknownAction(other.to_string())),
        None => Err(DirectiveError::UnknownAction("(missing)".to_string())),
    }
}

fn validate_task(index: usize, entry: &Value) -> Result<TaskSpec, DirectiveError> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DirectiveError::InvalidTask(index, "missing id".to_string()))?;
    let task = entry
        .get("task")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DirectiveError::InvalidTask(index, "missing task".to_string()))?;
    let agent = entry
        .get("agent")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(TaskSpec {
        id: id.to_string(),
        task: task.to_string(),
        agent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute_one() -> &'static str {
        r#"{"action":"execute","tasks":[{"id":"t1","task":"X"}]}"#
    }

    #[test]
    fn parses_bare_json() {
        let d = parse_directive(execute_one()).unwrap();
        match d {
            Directive::Execute { tasks } => {
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].id, "t1");
                assert_eq!(tasks[0].task, "X");
                assert_eq!(tasks[0].agent, None);
            }
            _ => panic!("expected execute"),
        }
    }

    #[test]
    fn parses_fenced_json() {
        let raw = format!("```json\n{}\n```", execute_one());
        let d = parse_directive(&raw).unwrap();
        assert!(matches!(d, Directive::Execute { .. }));
    }

    #[test]
    fn parses_bare_fence_without_language() {
        let raw = format!("```\n{}\n```", execute_one());
        assert!(parse_directive(&raw).is_ok());
    }

    #[test]
    fn parses_prose_wrapped_json() {
        let raw = format!("Let me think.\n\n{}", execute_one());
        let d = parse_directive(&raw).unwrap();
        match d {
            Directive::Execute { tasks } => assert_eq!(tasks[0].id, "t1"),
            _ => panic!("expected execute"),
        }
    }

    #[test]
    fn salvages_truncated_finish() {
        let raw = "```json\n{\"action\":\"finish\",\"answer\":\"Here is answer to the goal";
        let d = parse_directive(raw).unwrap();
        match d {
            Directive::Finish { answer } => {
                assert!(answer.starts_with("Here is answer"), "{}", answer);
            }
            _ => panic!("expected finish"),
        }
    }

    #[test]
    fn salvage_unescapes_sequences() {
        let raw = r#"{"action":"finish","answer":"line one\nsaid \"hi\" and a slash \\ done"#;
        let d = parse_directive(raw).unwrap();
        match d {
            Directive::Finish { answer } => {
                assert!(answer.contains("line one\nsaid \"hi\""), "{}", answer);
                assert!(answer.contains("slash \\ done"), "{}", answer);
            }
            _ => panic!("expected finish"),
        }
    }

    #[test]
    fn salvage_is_idempotent_on_valid_finish() {
        let raw = r#"{"action":"finish","answer":"A complete final answer."}"#;
        let parsed = parse_directive(raw).unwrap();
        let salvaged = salvage_truncated_finish(raw).unwrap();
        match parsed {
            Directive::Finish { answer } => assert_eq!(answer, salvaged),
            _ => panic!("expected finish"),
        }
    }

    #[test]
    fn salvage_rejects_short_answers() {
        let raw = r#"{"action":"finish","answer":"short"#;
        assert!(matches!(
            parse_directive(raw),
            Err(DirectiveError::NoJsonObject)
        ));
    }

    #[test]
    fn unknown_action_is_validation_error() {
        let err = parse_directive(r#"{"action":"dance"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown orchestrator action: dance");
        assert!(!err.is_parse_failure());
    }

    #[test]
    fn empty_tasks_rejected() {
        let err = parse_directive(r#"{"action":"execute","tasks":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no tasks"), "{}", err);
    }

    #[test]
    fn empty_answer_rejected() {
        let err = parse_directive(r#"{"action":"finish","answer":""}"#).unwrap_err();
        assert!(err.to_string().contains("no answer"), "{}", err);
    }

    #[test]
    fn task_without_id_rejected() {
        let err = parse_directive(r#"{"action":"execute","tasks":[{"task":"X"}]}"#).unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidTask(0, _)));
    }

    #[test]
    fn no_braces_is_no_json_object() {
        let err = parse_directive("I could not decide what to do.").unwrap_err();
        assert!(matches!(err, DirectiveError::NoJsonObject));
        assert!(err.is_parse_failure());
    }

    #[test]
    fn garbage_braces_is_invalid_json() {
        let err = parse_directive("some {not json at all} trailing").unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidJson(_)));
        assert!(err.is_parse_failure());
    }

    #[test]
    fn directive_roundtrip_through_pipeline() {
        let original = Directive::Execute {
            tasks: vec![TaskSpec {
                id: "a".to_string(),
                task: "research topic".to_string(),
                agent: Some("researcher".to_string()),
            }],
        };
        let json = serde_json::to_string(&original).unwrap();
        let reparsed = parse_directive(&json).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn agent_hint_preserved() {
        let raw = r#"{"action":"execute","tasks":[{"id":"t","task":"X","agent":"coder"}]}"#;
        match parse_directive(raw).unwrap() {
            Directive::Execute { tasks } => assert_eq!(tasks[0].agent.as_deref(), Some("coder")),
            _ => panic!("expected execute"),
        }
    }
}
