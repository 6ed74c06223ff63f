//! The dispatch engine: turns one queued message into a provider turn,
//! running the middleware/tool loop and persisting the conversation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use wopr_core::{ConversationEntry, ConversationEntryType, InjectId, Session, Timestamp};
use wopr_events::{EventBus, EventMetadata, HookEvent, HookKind, HookOutcome, WoprEvent};
use wopr_llm::{query, ProviderRegistry, QueryOptions, QueryUsage};
use wopr_security::SecurityKernel;
use wopr_storage::Store;

use crate::error::{RuntimeError, RuntimeResult};
use crate::queue::{DispatchWorker, QueuedItem};
use crate::tools::ToolCatalogue;

/// How many prior conversation entries to fold into the provider's context
/// window alongside the session's system prompt.
const CONTEXT_WINDOW_ENTRIES: usize = 50;

/// The maximum number of provider round-trips a single dispatch will drive
/// before giving up on an agent stuck calling tools forever.
const MAX_TOOL_ROUNDS: usize = 8;

/// The settled result of one queued item, handed back through the queue's
/// oneshot channel.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The inject-id this outcome resolves.
    pub inject_id: InjectId,
    /// The final response text (after outgoing middleware).
    pub text: String,
    /// Accumulated token/cost usage across every provider round-trip.
    pub usage: QueryUsage,
    /// Why the last provider round-trip stopped.
    pub finish_reason: wopr_llm::StopReason,
}

/// Per-call overrides the spec's `dispatch(... , {silent?, onStream?})`
/// signature allows; `on_stream` mirrors `session:stream` chunks to a local
/// caller without requiring a bus subscription.
#[derive(Default)]
pub struct DispatchOptions {
    /// Skip appending the response entry to the conversation log.
    pub silent: bool,
    /// Called with each text chunk as it streams in, alongside the bus event.
    pub on_stream: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

/// Runs the eight-step dispatch pipeline (resolve context, incoming
/// middleware, append inbound entry, resolve provider, stream + resolve
/// tool calls, outgoing middleware, append response entry, emit terminal
/// events) against the shared store, provider registry, tool catalogue,
/// and event bus.
pub struct Dispatcher {
    store: Store,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolCatalogue>,
    events: Arc<EventBus>,
    kernel: Arc<SecurityKernel>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Store,
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolCatalogue>,
        events: Arc<EventBus>,
        kernel: Arc<SecurityKernel>,
    ) -> Self {
        Self { store, providers, tools, events, kernel }
    }

    /// Drive one queued item through the full pipeline. `cancel` is checked
    /// at every suspension point; on cancellation, whatever text has
    /// accumulated so far is flushed to the conversation log and events
    /// before the dispatch is rejected.
    pub async fn dispatch(
        &self,
        session: &str,
        item: &QueuedItem,
        cancel: &CancellationToken,
        options: &DispatchOptions,
    ) -> RuntimeResult<DispatchOutcome> {
        let record = self
            .store
            .sessions()?
            .get(session)
            .await?
            .ok_or_else(|| RuntimeError::SessionNotFound(session.to_string()))?;

        let mut messages = self.resolve_context(session).await?;

        let inbound = self.run_hook(HookKind::MessageIncoming, session, &item.source, &item.message)?;

        let decision = self.kernel.evaluate_injection(item.source.clone(), session).await?;
        let mut ctx = decision
            .context
            .ok_or_else(|| RuntimeError::SecurityDenied("no security context resolved for this injection".into()))?;
        if !decision.allowed {
            return Err(RuntimeError::SecurityDenied(decision.reason.unwrap_or_default()));
        }
        ctx.inject_id = Some(item.inject_id.clone());

        self.append_entry(session, item.source.kind.as_pattern_str(), &inbound, ConversationEntryType::Message, None)
            .await?;
        messages.push(wopr_llm::Message::user(&inbound));

        let client = self.providers.resolve_provider(&record).await?;
        let tool_defs = self.tools.visible_definitions(&ctx.granted_capabilities).await;

        let mut final_text = String::new();
        let mut usage = QueryUsage::default();
        let mut finish_reason = wopr_llm::StopReason::EndTurn;

        for _ in 0..MAX_TOOL_ROUNDS {
            if cancel.is_cancelled() {
                return self.flush_cancelled(session, &item.inject_id, &final_text, usage).await;
            }

            let query_options = QueryOptions { system: record.context.clone(), tools: tool_defs.clone(), ..Default::default() };
            let session_name = session.to_string();
            let inject_id = item.inject_id.to_string();
            let events = Arc::clone(&self.events);
            let on_stream = options.on_stream.as_ref();
            let result = query::query(client.as_ref(), &messages, &query_options, move |event| {
                if let wopr_llm::StreamEvent::TextDelta { text } = event {
                    events.publish(WoprEvent::SessionStream {
                        metadata: EventMetadata::for_session(session_name.clone()),
                        session: session_name.clone(),
                        inject_id: inject_id.clone(),
                        chunk: text.clone(),
                    });
                    if let Some(callback) = on_stream {
                        callback(text);
                    }
                }
            })
            .await?;

            final_text.push_str(&result.text);
            usage.prompt_tokens += result.usage.prompt_tokens;
            usage.completion_tokens += result.usage.completion_tokens;
            finish_reason = result.finish_reason;

            if result.tool_calls.is_empty() {
                break;
            }

            messages.push(wopr_llm::Message::assistant_with_tools(result.tool_calls.clone()));
            for call in &result.tool_calls {
                if cancel.is_cancelled() {
                    return self.flush_cancelled(session, &item.inject_id, &final_text, usage).await;
                }
                let outcome = self.tools.invoke(&call.name, call.arguments.clone(), &ctx).await;
                let tool_result = match outcome {
                    Ok(outcome) => wopr_llm::ToolCallResult { call_id: call.id.clone(), content: outcome.content, is_error: outcome.is_error },
                    Err(err) => wopr_llm::ToolCallResult { call_id: call.id.clone(), content: err.to_string(), is_error: true },
                };
                self.events.publish(WoprEvent::ToolInvoked {
                    metadata: EventMetadata::for_session(session),
                    tool: call.name.clone(),
                    session: session.to_string(),
                });
                messages.push(wopr_llm::Message::tool_result(tool_result));
            }
        }

        let outbound = self.run_hook(HookKind::MessageOutgoing, session, &item.source, &final_text)?;

        if !options.silent {
            self.append_entry(session, "assistant", &outbound, ConversationEntryType::Response, None).await?;
        }

        self.events.publish(WoprEvent::SessionResponse {
            metadata: EventMetadata::for_session(session),
            session: session.to_string(),
            inject_id: item.inject_id.to_string(),
        });
        self.events.publish(WoprEvent::Custom {
            metadata: EventMetadata::for_session(session),
            name: "session:complete".to_string(),
            payload: serde_json::json!({
                "injectId": item.inject_id.to_string(),
                "finishReason": format!("{finish_reason:?}"),
            }),
        });

        Ok(DispatchOutcome { inject_id: item.inject_id.clone(), text: outbound, usage, finish_reason })
    }

    async fn resolve_context(&self, session: &str) -> RuntimeResult<Vec<wopr_llm::Message>> {
        let history = self.store.conversation(session)?.history().await?;
        let recent = history.iter().rev().take(CONTEXT_WINDOW_ENTRIES).rev();
        let mut messages = Vec::new();
        for entry in recent {
            let message = match entry.kind {
                ConversationEntryType::Response => wopr_llm::Message::assistant(&entry.content),
                ConversationEntryType::Context | ConversationEntryType::Middleware => continue,
                ConversationEntryType::Message => wopr_llm::Message::user(&entry.content),
            };
            messages.push(message);
        }
        Ok(messages)
    }

    fn run_hook(
        &self,
        kind: HookKind,
        session: &str,
        source: &wopr_core::InjectionSource,
        payload: &str,
    ) -> RuntimeResult<String> {
        let event = HookEvent {
            kind,
            metadata: EventMetadata::for_session(session),
            source: source.clone(),
            payload: payload.to_string(),
        };
        match self.events.run_hook(event) {
            HookOutcome::Continue(rewritten) => Ok(rewritten),
            HookOutcome::Prevent { reason } => Err(RuntimeError::SecurityDenied(reason)),
        }
    }

    async fn append_entry(
        &self,
        session: &str,
        from: &str,
        content: &str,
        kind: ConversationEntryType,
        channel: Option<wopr_core::ChannelRef>,
    ) -> RuntimeResult<()> {
        let entry = ConversationEntry {
            ts: chrono::Utc::now(),
            from: from.to_string(),
            sender_id: None,
            content: content.to_string(),
            kind,
            channel,
        };
        self.store.conversation(session)?.append(&entry).await?;
        Ok(())
    }

    async fn flush_cancelled(
        &self,
        session: &str,
        inject_id: &InjectId,
        partial_text: &str,
        usage: QueryUsage,
    ) -> RuntimeResult<DispatchOutcome> {
        if !partial_text.is_empty() {
            self.append_entry(session, "assistant", partial_text, ConversationEntryType::Response, None).await?;
        }
        self.events.publish(WoprEvent::Custom {
            metadata: EventMetadata::for_session(session),
            name: "session:complete".to_string(),
            payload: serde_json::json!({"injectId": inject_id.to_string(), "finishReason": "cancelled"}),
        });
        let _ = usage;
        Err(RuntimeError::Cancelled)
    }
}

#[async_trait::async_trait]
impl DispatchWorker for Dispatcher {
    async fn run(&self, session: &str, item: QueuedItem, cancel: CancellationToken) -> RuntimeResult<DispatchOutcome> {
        self.dispatch(session, &item, &cancel, &DispatchOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wopr_config::Config;
    use wopr_core::{InjectionSource, InjectionType, TrustLevel};
    use wopr_llm::echo::EchoProvider;
    use wopr_storage::kv::MemoryKvStore;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    async fn dispatcher(dir: &std::path::Path) -> Dispatcher {
        let store = Store::new(Arc::new(MemoryKvStore::new()));
        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(EchoProvider)).await;
        providers.configure("echo", None).await.unwrap();

        let config = Config::load(dir).unwrap();
        let audit = wopr_audit::AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        let kernel = Arc::new(wopr_security::SecurityKernel::new(config, store.clone(), audit));
        let tools = Arc::new(ToolCatalogue::new(Arc::clone(&kernel), Arc::new(crate::tools::NoopSandboxBridge)));
        let events = Arc::new(EventBus::new());

        Dispatcher::new(store, providers, tools, events, kernel)
    }

    fn item(message: &str) -> QueuedItem {
        let source = InjectionSource::new(InjectionType::Cli, now()).with_trust_level(TrustLevel::Owner);
        QueuedItem {
            inject_id: InjectId::new(now()),
            message: message.to_string(),
            source,
            priority: 0,
            sequence: 0,
            enqueued_at: now(),
        }
    }

    #[tokio::test]
    async fn dispatch_echoes_and_persists_response() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path()).await;
        dispatcher.store.sessions().unwrap().put(&Session::new("alpha", now())).await.unwrap();

        let item = item("hello there");
        let cancel = CancellationToken::new();
        let outcome = dispatcher.dispatch("alpha", &item, &cancel, &DispatchOptions::default()).await.unwrap();

        assert!(outcome.text.contains("hello there"));
        let history = dispatcher.store.conversation("alpha").unwrap().history().await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn missing_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path()).await;
        let item = item("hi");
        let cancel = CancellationToken::new();
        let result = dispatcher.dispatch("ghost", &item, &cancel, &DispatchOptions::default()).await;
        assert!(matches!(result, Err(RuntimeError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_flushes_nothing_and_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path()).await;
        dispatcher.store.sessions().unwrap().put(&Session::new("alpha", now())).await.unwrap();

        let item = item("hello");
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let result = dispatcher.dispatch("alpha", &item, &cancel, &DispatchOptions::default()).await;
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }
}
