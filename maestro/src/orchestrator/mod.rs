//! The adaptive orchestration loop: Think ↔ Execute until the thinker declares
//! completion or the step budget runs out.
//!
//! The loop is the single writer of the shared [`Run`]; observers are invoked
//! from the loop task and the dashboard reads snapshots through the
//! `Arc<RwLock<Run>>` handed back by [`Orchestrator::spawn`].

pub mod context;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::directive::{parse_directive, Directive, REPROMPT_SUFFIX};
use crate::error::OrchestratorError;
use crate::executor::execute_step;
use crate::observer::RunObserver;
use crate::run::{Run, RunState, Step, StepTaskStatus};
use crate::store::RunStore;
use crate::thinker::Thinker;

use context::{agent_roster, build_context, DEFAULT_OUTPUT_TRUNCATION, FORCED_FINISH_SUFFIX};

/// Fallback answer when the budget is spent and nothing succeeded.
const NO_RESULTS_ANSWER: &str = "No results collected.";

/// Per-run options.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Caller-chosen run id; a fresh UUID when absent.
    pub run_id: Option<String>,
    /// Max tasks in flight per dispatch window.
    pub max_concurrency: usize,
    /// Step budget: max think→execute iterations before a forced finish.
    pub max_steps: u32,
    /// Per-task output cap inside the think context.
    pub output_truncation: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            max_concurrency: 8,
            max_steps: 10,
            output_truncation: DEFAULT_OUTPUT_TRUNCATION,
        }
    }
}

/// The Think↔Execute state machine.
pub struct Orchestrator {
    thinker: Arc<dyn Thinker>,
    agents: Arc<AgentRegistry>,
    store: Option<Arc<dyn RunStore>>,
}

impl Orchestrator {
    pub fn new(thinker: Arc<dyn Thinker>, agents: Arc<AgentRegistry>) -> Self {
        Self {
            thinker,
            agents,
            store: None,
        }
    }

    /// Attaches a run store; the run is persisted on creation, after every
    /// step, and at the terminal transition.
    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// Drives one goal to completion and returns the terminal run.
    pub async fn run(
        &self,
        goal: &str,
        options: RunOptions,
        observer: Arc<dyn RunObserver>,
    ) -> Run {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let run = Arc::new(RwLock::new(Run::new(run_id, goal)));
        self.drive(Arc::clone(&run), options, observer).await;
        let snapshot = run.read().await.clone();
        snapshot
    }

    /// Starts a run on its own task, returning the live snapshot handle and
    /// the join handle. Used by the dashboard.
    pub fn spawn(
        self: &Arc<Self>,
        goal: &str,
        options: RunOptions,
        observer: Arc<dyn RunObserver>,
    ) -> (Arc<RwLock<Run>>, tokio::task::JoinHandle<()>) {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let run = Arc::new(RwLock::new(Run::new(run_id, goal)));
        let this = Arc::clone(self);
        let handle = {
            let run = Arc::clone(&run);
            tokio::spawn(async move {
                this.drive(run, options, observer).await;
            })
        };
        (run, handle)
    }

    /// One think turn without execution: returns the raw directive.
    pub async fn plan(&self, goal: &str) -> Result<Directive, OrchestratorError> {
        let roster = agent_roster(&self.agents);
        let context = build_context(goal, &roster, &[], DEFAULT_OUTPUT_TRUNCATION);
        self.think(&context).await
    }

    async fn drive(
        &self,
        run: Arc<RwLock<Run>>,
        options: RunOptions,
        observer: Arc<dyn RunObserver>,
    ) {
        self.persist(&run).await;
        let outcome = self.iterate(&run, &options, &observer).await;
        match outcome {
            Ok(Some(answer)) => {
                run.write().await.finish(answer.clone());
                observer.on_finish(&answer).await;
            }
            Ok(None) => {
                // Budget exhausted: one forced think, then emergency synthesis.
                let answer = self.forced_finish(&run, &options).await;
                run.write().await.finish(answer.clone());
                observer.on_finish(&answer).await;
            }
            Err(e) => {
                let message = e.to_string();
                run.write().await.fail(message.clone());
                observer.on_error(&message).await;
            }
        }
        self.persist(&run).await;
    }

    /// Runs up to `max_steps` iterations. `Ok(Some(answer))` on a finish
    /// directive, `Ok(None)` when the budget is exhausted.
    async fn iterate(
        &self,
        run: &Arc<RwLock<Run>>,
        options: &RunOptions,
        observer: &Arc<dyn RunObserver>,
    ) -> Result<Option<String>, OrchestratorError> {
        let roster = agent_roster(&self.agents);
        for step_number in 1..=options.max_steps {
            let context = {
                let snapshot = run.read().await;
                build_context(
                    &snapshot.goal,
                    &roster,
                    &snapshot.steps,
                    options.output_truncation,
                )
            };
            run.write().await.state = RunState::Thinking;
            observer.on_thinking(step_number).await;

            match self.think(&context).await? {
                Directive::Finish { answer } => {
                    debug!(step_number, "thinker finished");
                    return Ok(Some(answer));
                }
                Directive::Execute { tasks } => {
                    let mut step = Step::new(step_number, tasks);
                    {
                        let mut r = run.write().await;
                        r.state = RunState::Executing;
                        r.steps.push(step.clone());
                    }
                    let task_ids = step.task_ids();
                    observer
                        .on_step_start(step_number, &task_ids, &step.tasks)
                        .await;
                    execute_step(&mut step, &self.agents, options.max_concurrency, observer).await;
                    {
                        let mut r = run.write().await;
                        if let Some(slot) = r.steps.last_mut() {
                            *slot = step;
                        }
                    }
                    self.persist(run).await;
                    observer.on_step_end(step_number).await;
                }
            }
        }
        Ok(None)
    }

    /// The budget-exhausted path: re-think with the forced-finish suffix; any
    /// non-finish outcome falls back to emergency synthesis.
    async fn forced_finish(&self, run: &Arc<RwLock<Run>>, options: &RunOptions) -> String {
        let roster = agent_roster(&self.agents);
        let context = {
            let snapshot = run.read().await;
            let base = build_context(
                &snapshot.goal,
                &roster,
                &snapshot.steps,
                options.output_truncation,
            );
            format!("{}\n\n{}", base, FORCED_FINISH_SUFFIX)
        };
        match self.think(&context).await {
            Ok(Directive::Finish { answer }) => answer,
            Ok(Directive::Execute { .. }) => {
                debug!("forced finish still produced execute; synthesizing");
                emergency_synthesis(&run.read().await.steps)
            }
            Err(e) => {
                warn!("forced finish think failed: {}; synthesizing", e);
                emergency_synthesis(&run.read().await.steps)
            }
        }
    }

    /// One think: invoke the thinker and parse; on a parse-stage failure,
    /// re-prompt exactly once. Schema violations abort without a retry.
    async fn think(&self, context: &str) -> Result<Directive, OrchestratorError> {
        let raw = self.thinker.think(context).await?;
        match parse_directive(&raw) {
            Ok(directive) => Ok(directive),
            Err(first) if first.is_parse_failure() => {
                debug!("directive parse failed ({}); re-prompting once", first);
                let retry_context = format!("{}\n\n{}", context, REPROMPT_SUFFIX);
                let raw = self.thinker.think(&retry_context).await?;
                parse_directive(&raw).map_err(Into::into)
            }
            Err(validation) => Err(validation.into()),
        }
    }

    async fn persist(&self, run: &Arc<RwLock<Run>>) {
        if let Some(store) = &self.store {
            let snapshot = run.read().await.clone();
            if let Err(e) = store.upsert(&snapshot).await {
                warn!(run_id = %snapshot.run_id, "run persistence failed: {}", e);
            }
        }
    }
}

/// Concatenates every done task's output as markdown sections; the literal
/// fallback when nothing succeeded.
fn emergency_synthesis(steps: &[Step]) -> String {
    let sections: Vec<String> = steps
        .iter()
        .flat_map(|step| step.tasks.iter())
        .filter(|task| task.status == StepTaskStatus::Done)
        .filter_map(|task| {
            task.result
                .as_ref()
                .map(|result| format!("## Task {}\n\n{}", task.id, result.output))
        })
        .collect();
    if sections.is_empty() {
        NO_RESULTS_ANSWER.to_string()
    } else {
        sections.join("\n\n")
    }
}
