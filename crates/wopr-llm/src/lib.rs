//! WOPR LLM - provider registry and streaming query contract.
//!
//! This crate provides:
//! - The `LlmClient`/`ProviderDescriptor` traits every backend implements
//! - Message, tool-call, and streaming event types shared with `wopr-runtime`
//! - `EchoProvider`/`MockProvider` for exercising the dispatch path without
//!   network credentials, and a `claude`-shaped HTTP provider skeleton
//! - `ProviderRegistry`, resolving a session's effective provider and
//!   polling registered providers for health

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod claude;
pub mod echo;
pub mod error;
pub mod mock;
pub mod prelude;
pub mod provider;
pub mod query;
pub mod registry;
pub mod types;

pub use error::{LlmError, LlmResult};
pub use provider::{ClientConfig, CredentialType, LlmClient, ProviderDescriptor, StreamBox};
pub use query::{query, QueryOptions, QueryResult, QueryUsage};
pub use registry::{ProviderHealth, ProviderRegistry};
pub use types::{
    ContentPart, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason, StreamEvent,
    ToolCall, ToolCallResult, Usage,
};
