//! Secondary dependency-graph executor.
//!
//! The adaptive loop never uses this: its directives carry no dependencies
//! and each step is an independent batch. This module remains as a documented
//! API for callers that do have a fixed task graph — tasks with explicit
//! `depends_on` edges, executed in parallel waves, with downstream tasks
//! skipped when a dependency fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use run_event::TaskResult;

use crate::agent::AgentRegistry;
use crate::observer::RunObserver;
use crate::run::{Step, StepTaskStatus};
use crate::directive::TaskSpec;
use crate::executor::execute_step;

/// One node of a task graph.
#[derive(Clone, Debug)]
pub struct DagTask {
    pub id: String,
    pub task: String,
    pub agent: Option<String>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("duplicate task id: {0}")]
    DuplicateId(String),
    #[error("task {0} depends on itself")]
    SelfLoop(String),
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },
    #[error("task graph contains a cycle")]
    Cycle,
}

/// Outcome of one graph execution.
#[derive(Debug, Default)]
pub struct DagOutcome {
    pub results: HashMap<String, TaskResult>,
    /// Tasks never dispatched because a dependency failed.
    pub skipped: Vec<String>,
}

/// Rejects duplicate ids, self-loops, unknown dependencies, and cycles.
pub fn validate(tasks: &[DagTask]) -> Result<(), DagError> {
    let mut ids = HashSet::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(DagError::DuplicateId(task.id.clone()));
        }
    }
    for task in tasks {
        for dep in &task.depends_on {
            if dep == &task.id {
                return Err(DagError::SelfLoop(task.id.clone()));
            }
            if !ids.contains(dep.as_str()) {
                return Err(DagError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    topological_order(tasks).map(|_| ())
}

/// Kahn's ordering: every dependency precedes its dependents. `Err(Cycle)`
/// when no such ordering exists.
pub fn topological_order(tasks: &[DagTask]) -> Result<Vec<String>, DagError> {
    let mut in_degree: HashMap<&str, usize> =
        tasks.iter().map(|t| (t.id.as_str(), t.depends_on.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        for dep in &task.depends_on {
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(tasks.len());
    while let Some(id) = ready.pop() {
        order.push(id.to_string());
        for dependent in dependents.get(id).cloned().unwrap_or_default() {
            let degree = in_degree.get_mut(dependent).expect("known id");
            *degree -= 1;
            if *degree == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() == tasks.len() {
        Ok(order)
    } else {
        Err(DagError::Cycle)
    }
}

/// Executes the graph in parallel waves of ready tasks.
///
/// With `skip_downstream` (the default posture), every transitive dependent
/// of a failed task is skipped instead of dispatched.
pub async fn execute_dag(
    tasks: &[DagTask],
    registry: &AgentRegistry,
    max_concurrency: usize,
    skip_downstream: bool,
    observer: &Arc<dyn RunObserver>,
) -> Result<DagOutcome, DagError> {
    validate(tasks)?;

    let mut outcome = DagOutcome::default();
    let mut done: HashSet<String> = HashSet::new();
    let mut failed: HashSet<String> = HashSet::new();
    let mut skipped: HashSet<String> = HashSet::new();
    let mut wave_number = 0u32;

    while done.len() + failed.len() + skipped.len() < tasks.len() {
        // Ready: untouched tasks whose dependencies are all done.
        let mut ready: Vec<&DagTask> = Vec::new();
        for task in tasks {
            if done.contains(&task.id) || failed.contains(&task.id) || skipped.contains(&task.id) {
                continue;
            }
            if skip_downstream
                && task
                    .depends_on
                    .iter()
                    .any(|dep| failed.contains(dep) || skipped.contains(dep))
            {
                skipped.insert(task.id.clone());
                outcome.skipped.push(task.id.clone());
                continue;
            }
            if task.depends_on.iter().all(|dep| done.contains(dep)) {
                ready.push(task);
            }
        }
        if ready.is_empty() {
            // Only possible when failures block progress without skipping.
            break;
        }

        wave_number += 1;
        let specs: Vec<TaskSpec> = ready
            .iter()
            .map(|t| TaskSpec {
                id: t.id.clone(),
                task: t.task.clone(),
                agent: t.agent.clone(),
            })
            .collect();
        let mut step = Step::new(wave_number, specs);
        execute_step(&mut step, registry, max_concurrency, observer).await;

        for task in step.tasks {
            let result = task.result.clone().expect("terminal task has result");
            match task.status {
                StepTaskStatus::Done => {
                    done.insert(task.id.clone());
                }
                _ => {
                    failed.insert(task.id.clone());
                }
            }
            outcome.results.insert(task.id, result);
        }
    }

    // Anything still untouched is transitively blocked.
    for task in tasks {
        if !done.contains(&task.id) && !failed.contains(&task.id) && !skipped.contains(&task.id) {
            outcome.skipped.push(task.id.clone());
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FunctionAdapter;
    use crate::observer::NoopObserver;

    fn task(id: &str, deps: &[&str]) -> DagTask {
        DagTask {
            id: id.to_string(),
            task: format!("run {}", id),
            agent: None,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn validate_rejects_self_loop() {
        let tasks = vec![task("a", &["a"])];
        assert_eq!(validate(&tasks), Err(DagError::SelfLoop("a".to_string())));
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let tasks = vec![task("a", &["ghost"])];
        assert_eq!(
            validate(&tasks),
            Err(DagError::UnknownDependency {
                task: "a".to_string(),
                dependency: "ghost".to_string()
            })
        );
    }

    #[test]
    fn validate_rejects_cycle_and_duplicates() {
        let cycle = vec![task("a", &["b"]), task("b", &["a"])];
        assert_eq!(validate(&cycle), Err(DagError::Cycle));

        let dupes = vec![task("a", &[]), task("a", &[])];
        assert_eq!(validate(&dupes), Err(DagError::DuplicateId("a".to_string())));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let tasks = vec![task("c", &["a", "b"]), task("a", &[]), task("b", &["a"])];
        let order = topological_order(&tasks).unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[tokio::test]
    async fn execute_runs_waves_and_skips_downstream() {
        let mut registry = AgentRegistry::new();
        registry
            .add(Arc::new(FunctionAdapter::new("worker", |t: String| async move {
                if t.contains("bad") {
                    Err("exploded".to_string())
                } else {
                    Ok(t)
                }
            })))
            .unwrap();

        let tasks = vec![
            task("ok", &[]),
            DagTask {
                id: "bad".to_string(),
                task: "bad stuff".to_string(),
                agent: None,
                depends_on: vec![],
            },
            task("after-bad", &["bad"]),
            task("after-ok", &["ok"]),
        ];
        let observer: Arc<dyn RunObserver> = Arc::new(NoopObserver);
        let outcome = execute_dag(&tasks, &registry, 4, true, &observer)
            .await
            .unwrap();

        assert!(outcome.results["ok"].is_ok());
        assert!(!outcome.results["bad"].is_ok());
        assert!(outcome.results.contains_key("after-ok"));
        assert_eq!(outcome.skipped, vec!["after-bad".to_string()]);
    }

    #[tokio::test]
    async fn parallel_roots_complete_before_dependent() {
        let mut registry = AgentRegistry::new();
        registry
            .add(Arc::new(FunctionAdapter::new("w", |t: String| async move { Ok(t) })))
            .unwrap();
        let tasks = vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])];
        let observer: Arc<dyn RunObserver> = Arc::new(NoopObserver);
        let outcome = execute_dag(&tasks, &registry, 2, true, &observer)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.skipped.is_empty());
        assert!(outcome.results.values().all(|r| r.is_ok()));
    }
}
