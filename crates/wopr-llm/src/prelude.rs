//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_llm::prelude::*;` to import the provider and message types
//! most crates need.

pub use crate::{
    query, ClientConfig, ContentPart, CredentialType, LlmClient, LlmError, LlmResult,
    LlmToolDefinition, Message, MessageContent, MessageRole, ProviderDescriptor, ProviderHealth,
    ProviderRegistry, QueryOptions, QueryResult, QueryUsage, StopReason, StreamBox, StreamEvent,
    ToolCall, ToolCallResult, Usage,
};
