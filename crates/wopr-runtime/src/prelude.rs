//! Commonly imported runtime types.

pub use crate::dispatch::{DispatchOptions, DispatchOutcome, Dispatcher};
pub use crate::error::{RuntimeError, RuntimeResult};
pub use crate::openai_compat::OpenAiGateway;
pub use crate::queue::{DispatchWorker, QueueManager, QueueStats, QueuedItem};
pub use crate::tools::{ExecutionSurface, NoopSandboxBridge, SandboxBridge, ToolCatalogue, ToolHandler, ToolOutcome};
