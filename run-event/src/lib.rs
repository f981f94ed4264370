//! Run event protocol: the dashboard SSE event union and task outcome wire types.
//!
//! This crate defines the wire shape of the events broadcast over the dashboard
//! event stream. It does not depend on the core crate; the core bridges its run
//! lifecycle callbacks into [`RunEvent`] values and the server serializes them
//! as `data: <json>\n\n` lines.

pub mod event;
pub mod task;

pub use event::RunEvent;
pub use task::{TaskOutcome, TaskResult, TaskStatus};
