//! # Maestro
//!
//! An adaptive multi-agent orchestration core: given a natural-language goal and
//! a pool of specialized executor agents, Maestro drives an iterative
//! **Think → Execute** loop controlled by an external language model (the
//! "thinker") until the thinker declares completion or a step budget runs out.
//! Each iteration the thinker sees the goal plus all accumulated step outputs
//! and emits one structured directive: a batch of tasks to dispatch in
//! parallel, or a final synthesized answer.
//!
//! ## Design principles
//!
//! - **No pre-planned task graph**: parallelism is per-step only; the thinker
//!   re-plans after every step from the full transcript.
//! - **Failure isolation**: one task failing never cancels its siblings; the
//!   thinker sees the failure in the next context and routes around it.
//! - **Capability interfaces at the seams**: executors implement
//!   [`AgentAdapter`]; the thinker is any [`Thinker`]; run persistence is any
//!   [`RunStore`]. The three concrete adapters (in-process callable, HTTP
//!   endpoint, gateway chat) are parallel implementations, not a hierarchy.
//! - **Explicit results, not unwinding**: directive salvage and the re-prompt
//!   path are `Result` control flow so partial parses return without panics.
//!
//! ## Main modules
//!
//! - [`orchestrator`]: [`Orchestrator`], [`RunOptions`] — the Think↔Execute
//!   state machine with step cap, forced finish and emergency synthesis.
//! - [`directive`]: [`Directive`], [`parse_directive`] — robust extraction of
//!   JSON directives from fenced / prose-wrapped / truncated thinker output.
//! - [`agent`]: [`AgentAdapter`], [`FunctionAdapter`], [`HttpAdapter`],
//!   [`GatewayAdapter`], [`AgentRegistry`], SOUL.md parsing ([`SoulDoc`]).
//! - [`executor`]: windowed parallel dispatch of one step's task batch.
//! - [`gateway`]: [`GatewayClient`] — login, signed WebSocket handshake,
//!   request/response correlation by id, chat correlation by runId;
//!   [`GatewayRegistry`], [`DeviceIdentity`], wire frames.
//! - [`store`]: [`RunStore`] trait and the SQLite implementation.
//! - [`run`]: [`Run`], [`Step`], [`StepTask`] — the persistent run model.
//! - [`observer`]: [`RunObserver`] — lifecycle callbacks driving the dashboard.
//! - [`limiter`], [`cache`]: sliding-window rate limiter and TTL+LRU task cache.
//! - [`dag`]: secondary dependency-graph executor (not used by the adaptive loop).

pub mod agent;
pub mod cache;
pub mod dag;
pub mod directive;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod limiter;
pub mod observer;
pub mod orchestrator;
pub mod run;
pub mod store;
pub mod thinker;

pub use agent::{
    AgentAdapter, AgentError, AgentHealth, AgentRegistry, FunctionAdapter, GatewayAdapter,
    HttpAdapter, RegistryError, SoulDoc, TaskChunk,
};
pub use directive::{parse_directive, Directive, DirectiveError, TaskSpec};
pub use error::OrchestratorError;
pub use executor::execute_step;
pub use gateway::{
    discover_agents, DeviceIdentity, DiscoveredAgent, GatewayClient, GatewayConfig, GatewayError,
    GatewayRegistry, IdentityError,
};
pub use observer::{NoopObserver, RunObserver};
pub use orchestrator::{Orchestrator, RunOptions};
pub use run::{Run, RunState, Step, StepTask, StepTaskStatus};
pub use run_event::{RunEvent, TaskOutcome, TaskResult, TaskStatus};
pub use store::{RunStore, SqliteRunStore, StoreError};
pub use thinker::{ScriptedThinker, Thinker};
