//! WOPR runtime: the per-session queue, the dispatch engine that drives
//! provider turns, and the capability-gated tool surface.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod dispatch;
pub mod error;
pub mod openai_compat;
pub mod prelude;
pub mod queue;
pub mod tools;

pub use dispatch::{DispatchOptions, DispatchOutcome, Dispatcher};
pub use error::{RuntimeError, RuntimeResult};
pub use openai_compat::OpenAiGateway;
pub use queue::{DispatchWorker, QueueManager, QueueStats, QueuedItem};
pub use tools::{
    core_tools, cron_tools, session_send_tool, CronDirectory, ExecutionSurface, NoopSandboxBridge, SandboxBridge, ToolCatalogue, ToolHandler,
    ToolOutcome,
};
