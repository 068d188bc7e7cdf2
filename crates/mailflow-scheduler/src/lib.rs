//! # Mailflow Scheduler
//!
//! The scheduling and execution core: the task model, file-backed task and
//! event persistence, recurrence arithmetic, template rendering, recipient
//! resolution, and the `TaskManager` that drives the send/collect/summarize/
//! store pipeline for due tasks.

pub mod engine;
pub mod events;
pub mod recipients;
pub mod recurrence;
pub mod store;
pub mod task;
pub mod template;

pub use engine::{TaskManager, run_scheduler_loop};
pub use events::{Event, EventLog};
pub use store::TaskStore;
pub use task::{Recurrence, Task};
