//! The per-injection tool catalogue: capability-gated lookup, sandbox
//! routing, and the fixed core tool set named in `TOOL_CAPABILITY_MAP`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use wopr_core::{tool_capability, Capability, CronHistoryEntry, CronJob, CronScript, InjectionSource, SecurityContext, Timestamp};
use wopr_events::{EventBus, EventMetadata, WoprEvent};
use wopr_security::SecurityKernel;
use wopr_storage::Store;

use crate::error::{RuntimeError, RuntimeResult};
use crate::queue::QueueManager;

/// A tool's outcome, fed back to the provider as a tool-result message.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true }
    }
}

/// Whether a tool handler may execute in-process or must cross the sandbox
/// bridge first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionSurface {
    InProcess,
    RequiresHost,
}

/// A registered tool handler, matching the spec's `{name, description,
/// inputSchema, handler(args, ctx)}` shape.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn surface(&self) -> ExecutionSurface {
        ExecutionSurface::InProcess
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome;
}

/// Opt-in collaborator for tools flagged `RequiresHost`. No container
/// runtime is implemented here; `NoopSandboxBridge` rejects every call so
/// hosts without sandboxing configured fail closed rather than silently
/// running host-flagged tools in-process.
#[async_trait]
pub trait SandboxBridge: Send + Sync {
    async fn resolve_context(&self, session: &str) -> RuntimeResult<()>;
    async fn exec_in_container(&self, session: &str, tool: &str, args: Value) -> RuntimeResult<ToolOutcome>;
}

/// A sandbox bridge for hosts with no container runtime configured.
pub struct NoopSandboxBridge;

#[async_trait]
impl SandboxBridge for NoopSandboxBridge {
    async fn resolve_context(&self, _session: &str) -> RuntimeResult<()> {
        Ok(())
    }

    async fn exec_in_container(&self, _session: &str, tool: &str, _args: Value) -> RuntimeResult<ToolOutcome> {
        Ok(ToolOutcome::error(format!("no sandbox runtime configured for host-only tool {tool}")))
    }
}

/// A narrow seam onto the live cron scheduler, implemented in `wopr-cron`
/// (which already depends on this crate) so the cron tool handlers here
/// never need a dependency back onto it.
#[async_trait]
pub trait CronDirectory: Send + Sync {
    async fn create_job(
        &self,
        name: String,
        schedule: String,
        session: String,
        message: String,
        scripts: Vec<CronScript>,
        creator: InjectionSource,
        requesting_session: Option<String>,
        now: Timestamp,
    ) -> RuntimeResult<CronJob>;
    async fn remove_job(&self, name: &str) -> RuntimeResult<()>;
    async fn list_jobs(&self) -> RuntimeResult<Vec<CronJob>>;
    async fn history(&self, name: &str) -> RuntimeResult<Vec<CronHistoryEntry>>;
}

/// The per-session tool catalogue: a static core set plus dynamically
/// registered extensions, evaluated against the security kernel at call
/// time.
///
/// Handlers live behind a [`tokio::sync::RwLock`] rather than a plain map so
/// that `register` can take `&self`: the catalogue is wrapped in `Arc` and
/// handed to the dispatcher before every collaborator it depends on (the
/// queue, the cron scheduler) exists, so late handlers are registered into
/// the same shared instance once those collaborators are built.
pub struct ToolCatalogue {
    handlers: RwLock<HashMap<String, Box<dyn ToolHandler>>>,
    kernel: Arc<SecurityKernel>,
    sandbox: Arc<dyn SandboxBridge>,
}

impl ToolCatalogue {
    #[must_use]
    pub fn new(kernel: Arc<SecurityKernel>, sandbox: Arc<dyn SandboxBridge>) -> Self {
        Self { handlers: RwLock::new(HashMap::new()), kernel, sandbox }
    }

    pub async fn register(&self, handler: Box<dyn ToolHandler>) {
        self.handlers.write().await.insert(handler.name().to_string(), handler);
    }

    /// The tool definitions visible to a caller holding `granted`, omitting
    /// any whose `TOOL_CAPABILITY_MAP` entry isn't held.
    pub async fn visible_definitions(&self, granted: &[Capability]) -> Vec<wopr_llm::LlmToolDefinition> {
        self.handlers
            .read()
            .await
            .values()
            .filter(|handler| match tool_capability(handler.name()) {
                Some(required) => granted.iter().any(|held| held.satisfies(&required)),
                None => true,
            })
            .map(|handler| {
                wopr_llm::LlmToolDefinition::new(handler.name(), handler.input_schema())
                    .with_description(handler.description())
            })
            .collect()
    }

    /// Evaluate a tool call under the per-injection `SecurityContext`:
    /// look up the handler, enforce its required capability (and the
    /// dangerous-tool raw-grant check via the kernel), then execute
    /// in-process or via the sandbox bridge.
    pub async fn invoke(&self, name: &str, args: Value, ctx: &SecurityContext) -> RuntimeResult<ToolOutcome> {
        let handlers = self.handlers.read().await;
        let handler = handlers.get(name).ok_or_else(|| RuntimeError::UnknownTool(name.to_string()))?;

        self.kernel.check_tool(ctx, name).map_err(|err| RuntimeError::SecurityDenied(err.to_string()))?;

        let outcome = match handler.surface() {
            ExecutionSurface::InProcess => handler.execute(args, ctx).await,
            ExecutionSurface::RequiresHost => {
                self.sandbox.resolve_context(&ctx.target_session).await?;
                self.sandbox.exec_in_container(&ctx.target_session, name, args).await?
            }
        };
        Ok(outcome)
    }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn arg_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

/// `sessions_list` — every session name currently known to the store.
struct SessionsListTool {
    store: Store,
}

#[async_trait]
impl ToolHandler for SessionsListTool {
    fn name(&self) -> &str {
        "sessions_list"
    }
    fn description(&self) -> &str {
        "List every known session's name."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let repo = match self.store.sessions() {
            Ok(repo) => repo,
            Err(err) => return ToolOutcome::error(err.to_string()),
        };
        match repo.list().await {
            Ok(sessions) => {
                let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
                ToolOutcome::success(serde_json::json!(names).to_string())
            }
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `sessions_history` — a session's conversation log, optionally tail-limited.
struct SessionsHistoryTool {
    store: Store,
}

#[async_trait]
impl ToolHandler for SessionsHistoryTool {
    fn name(&self) -> &str {
        "sessions_history"
    }
    fn description(&self) -> &str {
        "Read a session's conversation history, optionally limited to the last `limit` entries."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"session": {"type": "string"}, "limit": {"type": "integer"}},
            "required": ["session"],
        })
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(session) = arg_str(&args, "session") else {
            return ToolOutcome::error("missing required field: session");
        };
        let limit = arg_usize(&args, "limit");
        let repo = match self.store.conversation(session) {
            Ok(repo) => repo,
            Err(err) => return ToolOutcome::error(err.to_string()),
        };
        match repo.history_tail(limit).await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(json) => ToolOutcome::success(json),
                Err(err) => ToolOutcome::error(err.to_string()),
            },
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `sessions_spawn` — create a new session if one doesn't already exist.
struct SessionsSpawnTool {
    store: Store,
}

#[async_trait]
impl ToolHandler for SessionsSpawnTool {
    fn name(&self) -> &str {
        "sessions_spawn"
    }
    fn description(&self) -> &str {
        "Create a new session with an optional context, idempotent on name."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "context": {"type": "string"}},
            "required": ["name"],
        })
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(name) = arg_str(&args, "name") else {
            return ToolOutcome::error("missing required field: name");
        };
        let repo = match self.store.sessions() {
            Ok(repo) => repo,
            Err(err) => return ToolOutcome::error(err.to_string()),
        };
        match repo.get(name).await {
            Ok(Some(existing)) => return ToolOutcome::success(serde_json::json!({"name": existing.name, "created": false}).to_string()),
            Ok(None) => {}
            Err(err) => return ToolOutcome::error(err.to_string()),
        }
        let mut session = wopr_core::Session::new(name, chrono::Utc::now());
        session.context = arg_str(&args, "context").map(str::to_string);
        match repo.put(&session).await {
            Ok(()) => ToolOutcome::success(serde_json::json!({"name": session.name, "created": true}).to_string()),
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `sessions_send` — enqueue an injection into another session (invariant:
/// requires `cross.inject`, enforced by the catalogue before this runs).
struct SessionsSendTool {
    queue: Arc<QueueManager>,
}

#[async_trait]
impl ToolHandler for SessionsSendTool {
    fn name(&self) -> &str {
        "sessions_send"
    }
    fn description(&self) -> &str {
        "Send a message into another session's queue."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"session": {"type": "string"}, "message": {"type": "string"}},
            "required": ["session", "message"],
        })
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let (Some(session), Some(message)) = (arg_str(&args, "session"), arg_str(&args, "message")) else {
            return ToolOutcome::error("missing required field: session and message");
        };
        let source = InjectionSource::new(wopr_core::InjectionType::Internal, chrono::Utc::now()).with_target(session);
        let (inject_id, _rx) = self.queue.enqueue(session, message.to_string(), source, 0, chrono::Utc::now()).await;
        ToolOutcome::success(serde_json::json!({"injectId": inject_id.to_string()}).to_string())
    }
}

/// `config_get` — read a config value by dot path, redacted by the kernel.
struct ConfigGetTool {
    kernel: Arc<SecurityKernel>,
}

#[async_trait]
impl ToolHandler for ConfigGetTool {
    fn name(&self) -> &str {
        "config_get"
    }
    fn description(&self) -> &str {
        "Read a config value by dot path (secrets are redacted)."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(path) = arg_str(&args, "path") else {
            return ToolOutcome::error("missing required field: path");
        };
        match self.kernel.config_get(path) {
            Some(value) => ToolOutcome::success(value.to_string()),
            None => ToolOutcome::success(Value::Null.to_string()),
        }
    }
}

/// `config_set` — write a config value by dot path and persist it.
struct ConfigSetTool {
    kernel: Arc<SecurityKernel>,
}

#[async_trait]
impl ToolHandler for ConfigSetTool {
    fn name(&self) -> &str {
        "config_set"
    }
    fn description(&self) -> &str {
        "Write a config value by dot path, persisting it to disk."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "value": {}},
            "required": ["path", "value"],
        })
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(path) = arg_str(&args, "path") else {
            return ToolOutcome::error("missing required field: path");
        };
        let value = args.get("value").cloned().unwrap_or(Value::Null);
        match self.kernel.config_set(path, value) {
            Ok(()) => ToolOutcome::success("ok"),
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `config_provider_defaults` — write a provider's default options in one call.
struct ConfigProviderDefaultsTool {
    kernel: Arc<SecurityKernel>,
}

#[async_trait]
impl ToolHandler for ConfigProviderDefaultsTool {
    fn name(&self) -> &str {
        "config_provider_defaults"
    }
    fn description(&self) -> &str {
        "Set a provider's default options under `providers.<name>.defaults`."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"provider": {"type": "string"}, "defaults": {"type": "object"}},
            "required": ["provider", "defaults"],
        })
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(provider) = arg_str(&args, "provider") else {
            return ToolOutcome::error("missing required field: provider");
        };
        let defaults = args.get("defaults").cloned().unwrap_or_else(|| serde_json::json!({}));
        let path = format!("providers.{provider}.defaults");
        match self.kernel.config_set(&path, defaults) {
            Ok(()) => ToolOutcome::success("ok"),
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// A key-prefixed handler over the generic profile store, backing the
/// memory/identity/soul/self-reflection tool surface. One instance per
/// (name, description, key-prefix) combination.
struct ProfileTool {
    store: Store,
    name: &'static str,
    description: &'static str,
    prefix: &'static str,
    mode: ProfileMode,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ProfileMode {
    /// Read the single value at `{prefix}:{session}`.
    Get,
    /// Overwrite the single value at `{prefix}:{session}`.
    Set,
    /// Append a line to the value at `{prefix}:{session}`, creating it if absent.
    Append,
    /// Substring-match over every `{prefix}:*` key and value.
    Search,
}

impl ProfileTool {
    fn key(&self, session: &str) -> String {
        format!("{}:{session}", self.prefix)
    }
}

#[async_trait]
impl ToolHandler for ProfileTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        self.description
    }
    fn input_schema(&self) -> Value {
        match self.mode {
            ProfileMode::Get => serde_json::json!({"type": "object", "properties": {"session": {"type": "string"}}, "required": ["session"]}),
            ProfileMode::Set | ProfileMode::Append => serde_json::json!({
                "type": "object",
                "properties": {"session": {"type": "string"}, "value": {"type": "string"}},
                "required": ["session", "value"],
            }),
            ProfileMode::Search => serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        }
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let repo = match self.store.profile() {
            Ok(repo) => repo,
            Err(err) => return ToolOutcome::error(err.to_string()),
        };
        match self.mode {
            ProfileMode::Get => {
                let session = arg_str(&args, "session").unwrap_or(&ctx.target_session);
                match repo.get(&self.key(session)).await {
                    Ok(Some(value)) => ToolOutcome::success(value),
                    Ok(None) => ToolOutcome::success(""),
                    Err(err) => ToolOutcome::error(err.to_string()),
                }
            }
            ProfileMode::Set => {
                let session = arg_str(&args, "session").unwrap_or(&ctx.target_session);
                let Some(value) = arg_str(&args, "value") else {
                    return ToolOutcome::error("missing required field: value");
                };
                match repo.set(&self.key(session), value).await {
                    Ok(()) => ToolOutcome::success("ok"),
                    Err(err) => ToolOutcome::error(err.to_string()),
                }
            }
            ProfileMode::Append => {
                let session = arg_str(&args, "session").unwrap_or(&ctx.target_session);
                let Some(value) = arg_str(&args, "value") else {
                    return ToolOutcome::error("missing required field: value");
                };
                let key = self.key(session);
                let existing = match repo.get(&key).await {
                    Ok(existing) => existing,
                    Err(err) => return ToolOutcome::error(err.to_string()),
                };
                let combined = match existing {
                    Some(prior) if !prior.is_empty() => format!("{prior}\n{value}"),
                    _ => value.to_string(),
                };
                match repo.set(&key, &combined).await {
                    Ok(()) => ToolOutcome::success("ok"),
                    Err(err) => ToolOutcome::error(err.to_string()),
                }
            }
            ProfileMode::Search => {
                let Some(query) = arg_str(&args, "query") else {
                    return ToolOutcome::error("missing required field: query");
                };
                match repo.search_prefixed(&format!("{}:", self.prefix), query).await {
                    Ok(matches) => ToolOutcome::success(serde_json::json!(matches).to_string()),
                    Err(err) => ToolOutcome::error(err.to_string()),
                }
            }
        }
    }
}

/// `event_emit` — publish a named, arbitrary-payload event.
struct EventEmitTool {
    events: Arc<EventBus>,
}

#[async_trait]
impl ToolHandler for EventEmitTool {
    fn name(&self) -> &str {
        "event_emit"
    }
    fn description(&self) -> &str {
        "Publish a named event with an arbitrary JSON payload."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "payload": {}},
            "required": ["name"],
        })
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let Some(name) = arg_str(&args, "name") else {
            return ToolOutcome::error("missing required field: name");
        };
        let payload = args.get("payload").cloned().unwrap_or(Value::Null);
        self.events.publish(WoprEvent::Custom {
            metadata: EventMetadata::for_session(ctx.target_session.clone()),
            name: name.to_string(),
            payload,
        });
        ToolOutcome::success("ok")
    }
}

/// `notify` — a user-facing notification, modeled as a `Custom` event under
/// a fixed `notify` name so subscribers can filter on it without collision.
struct NotifyTool {
    events: Arc<EventBus>,
}

#[async_trait]
impl ToolHandler for NotifyTool {
    fn name(&self) -> &str {
        "notify"
    }
    fn description(&self) -> &str {
        "Send a user-facing notification."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]})
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let Some(message) = arg_str(&args, "message") else {
            return ToolOutcome::error("missing required field: message");
        };
        self.events.publish(WoprEvent::Custom {
            metadata: EventMetadata::for_session(ctx.target_session.clone()),
            name: "notify".to_string(),
            payload: serde_json::json!({"message": message}),
        });
        ToolOutcome::success("ok")
    }
}

/// `event_list` — the audit log's history, which doubles as the durable
/// event record since `EventBus` itself keeps no backlog.
struct EventListTool {
    kernel: Arc<SecurityKernel>,
}

#[async_trait]
impl ToolHandler for EventListTool {
    fn name(&self) -> &str {
        "event_list"
    }
    fn description(&self) -> &str {
        "List the audit history of past actions, oldest first."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        match self.kernel.audit_history().await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(json) => ToolOutcome::success(json),
                Err(err) => ToolOutcome::error(err.to_string()),
            },
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `http_fetch` — host-only; no in-process execution, routed to the
/// sandbox bridge by the catalogue. The body here is an unreachable
/// defensive fallback.
struct HttpFetchTool;

#[async_trait]
impl ToolHandler for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }
    fn description(&self) -> &str {
        "Fetch a URL from within the sandboxed execution environment."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]})
    }
    fn surface(&self) -> ExecutionSurface {
        ExecutionSurface::RequiresHost
    }
    async fn execute(&self, _args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        ToolOutcome::error("http_fetch must be routed through the sandbox bridge")
    }
}

/// `exec_command` — host-only, see [`HttpFetchTool`].
struct ExecCommandTool;

#[async_trait]
impl ToolHandler for ExecCommandTool {
    fn name(&self) -> &str {
        "exec_command"
    }
    fn description(&self) -> &str {
        "Run a shell command inside the sandboxed execution environment."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]})
    }
    fn surface(&self) -> ExecutionSurface {
        ExecutionSurface::RequiresHost
    }
    async fn execute(&self, _args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        ToolOutcome::error("exec_command must be routed through the sandbox bridge")
    }
}

/// `security_whoami` — introspect the caller's own resolved context.
struct SecurityWhoamiTool;

#[async_trait]
impl ToolHandler for SecurityWhoamiTool {
    fn name(&self) -> &str {
        "security_whoami"
    }
    fn description(&self) -> &str {
        "Describe the caller's resolved trust level, session, and granted capabilities."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let capabilities: Vec<&str> = ctx.granted_capabilities.iter().map(Capability::as_str).collect();
        ToolOutcome::success(
            serde_json::json!({
                "session": ctx.target_session,
                "trustLevel": ctx.trust_level,
                "sourceType": ctx.source.kind,
                "capabilities": capabilities,
            })
            .to_string(),
        )
    }
}

/// `security_check` — test whether the caller's granted set satisfies a
/// named capability.
struct SecurityCheckTool;

#[async_trait]
impl ToolHandler for SecurityCheckTool {
    fn name(&self) -> &str {
        "security_check"
    }
    fn description(&self) -> &str {
        "Check whether the caller holds a given capability."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"capability": {"type": "string"}}, "required": ["capability"]})
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let Some(capability) = arg_str(&args, "capability") else {
            return ToolOutcome::error("missing required field: capability");
        };
        let required = Capability::new(capability);
        let held = ctx.has_capability(&required);
        ToolOutcome::success(serde_json::json!({"capability": capability, "held": held}).to_string())
    }
}

/// `cron_list` — every persisted cron job.
struct CronListTool {
    cron: Arc<dyn CronDirectory>,
}

#[async_trait]
impl ToolHandler for CronListTool {
    fn name(&self) -> &str {
        "cron_list"
    }
    fn description(&self) -> &str {
        "List every cron job."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        match self.cron.list_jobs().await {
            Ok(jobs) => match serde_json::to_string(&jobs) {
                Ok(json) => ToolOutcome::success(json),
                Err(err) => ToolOutcome::error(err.to_string()),
            },
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `cron_create` — create a cron job targeting the caller's own session by
/// default.
struct CronCreateTool {
    cron: Arc<dyn CronDirectory>,
}

#[async_trait]
impl ToolHandler for CronCreateTool {
    fn name(&self) -> &str {
        "cron_create"
    }
    fn description(&self) -> &str {
        "Create a cron job on a 5-field schedule (or \"once\") that injects a message into a session."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "schedule": {"type": "string"},
                "session": {"type": "string"},
                "message": {"type": "string"},
            },
            "required": ["name", "schedule", "message"],
        })
    }
    async fn execute(&self, args: Value, ctx: &SecurityContext) -> ToolOutcome {
        let (Some(name), Some(schedule), Some(message)) =
            (arg_str(&args, "name"), arg_str(&args, "schedule"), arg_str(&args, "message"))
        else {
            return ToolOutcome::error("missing required field: name, schedule, and message");
        };
        let session = arg_str(&args, "session").unwrap_or(&ctx.target_session).to_string();
        let result = self
            .cron
            .create_job(
                name.to_string(),
                schedule.to_string(),
                session,
                message.to_string(),
                Vec::new(),
                ctx.source.clone(),
                Some(ctx.target_session.clone()),
                chrono::Utc::now(),
            )
            .await;
        match result {
            Ok(job) => match serde_json::to_string(&job) {
                Ok(json) => ToolOutcome::success(json),
                Err(err) => ToolOutcome::error(err.to_string()),
            },
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `cron_delete` — remove a cron job by name.
struct CronDeleteTool {
    cron: Arc<dyn CronDirectory>,
}

#[async_trait]
impl ToolHandler for CronDeleteTool {
    fn name(&self) -> &str {
        "cron_delete"
    }
    fn description(&self) -> &str {
        "Remove a cron job by name."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]})
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(name) = arg_str(&args, "name") else {
            return ToolOutcome::error("missing required field: name");
        };
        match self.cron.remove_job(name).await {
            Ok(()) => ToolOutcome::success("ok"),
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// `cron_history` — a cron job's fire history.
struct CronHistoryTool {
    cron: Arc<dyn CronDirectory>,
}

#[async_trait]
impl ToolHandler for CronHistoryTool {
    fn name(&self) -> &str {
        "cron_history"
    }
    fn description(&self) -> &str {
        "List a cron job's past fires."
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]})
    }
    async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
        let Some(name) = arg_str(&args, "name") else {
            return ToolOutcome::error("missing required field: name");
        };
        match self.cron.history(name).await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(json) => ToolOutcome::success(json),
                Err(err) => ToolOutcome::error(err.to_string()),
            },
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }
}

/// Build every core handler that doesn't depend on the session queue or the
/// cron scheduler, for registration before either exists.
#[must_use]
pub fn core_tools(store: Store, kernel: Arc<SecurityKernel>, events: Arc<EventBus>) -> Vec<Box<dyn ToolHandler>> {
    vec![
        Box::new(SessionsListTool { store: store.clone() }),
        Box::new(SessionsHistoryTool { store: store.clone() }),
        Box::new(SessionsSpawnTool { store: store.clone() }),
        Box::new(ConfigGetTool { kernel: Arc::clone(&kernel) }),
        Box::new(ConfigSetTool { kernel: Arc::clone(&kernel) }),
        Box::new(ConfigProviderDefaultsTool { kernel: Arc::clone(&kernel) }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "memory_read",
            description: "Read this session's freeform memory.",
            prefix: "memory",
            mode: ProfileMode::Get,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "memory_write",
            description: "Append a line to this session's freeform memory.",
            prefix: "memory",
            mode: ProfileMode::Append,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "memory_search",
            description: "Search across every session's freeform memory.",
            prefix: "memory",
            mode: ProfileMode::Search,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "memory_get",
            description: "Read another session's freeform memory by name.",
            prefix: "memory",
            mode: ProfileMode::Get,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "identity_get",
            description: "Read this session's agent identity/persona document.",
            prefix: "identity",
            mode: ProfileMode::Get,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "identity_update",
            description: "Overwrite this session's agent identity/persona document.",
            prefix: "identity",
            mode: ProfileMode::Set,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "soul_get",
            description: "Read this session's core values/soul document.",
            prefix: "soul",
            mode: ProfileMode::Get,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "soul_update",
            description: "Overwrite this session's core values/soul document.",
            prefix: "soul",
            mode: ProfileMode::Set,
        }),
        Box::new(ProfileTool {
            store: store.clone(),
            name: "self_reflect",
            description: "Append a self-reflection entry for this session.",
            prefix: "reflections",
            mode: ProfileMode::Append,
        }),
        Box::new(EventEmitTool { events: Arc::clone(&events) }),
        Box::new(NotifyTool { events: Arc::clone(&events) }),
        Box::new(EventListTool { kernel: Arc::clone(&kernel) }),
        Box::new(HttpFetchTool),
        Box::new(ExecCommandTool),
        Box::new(SecurityWhoamiTool),
        Box::new(SecurityCheckTool),
    ]
}

/// The `sessions_send` handler, split out from [`core_tools`] because it
/// needs the session queue, which isn't built yet when the rest of the core
/// set is registered.
#[must_use]
pub fn session_send_tool(queue: Arc<QueueManager>) -> Box<dyn ToolHandler> {
    Box::new(SessionsSendTool { queue })
}

/// The `cron_*` handlers, split out from [`core_tools`] because they need
/// the live cron scheduler, which is built after the queue.
#[must_use]
pub fn cron_tools(cron: Arc<dyn CronDirectory>) -> Vec<Box<dyn ToolHandler>> {
    vec![
        Box::new(CronListTool { cron: Arc::clone(&cron) }),
        Box::new(CronCreateTool { cron: Arc::clone(&cron) }),
        Box::new(CronDeleteTool { cron: Arc::clone(&cron) }),
        Box::new(CronHistoryTool { cron }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopr_config::Config;
    use wopr_storage::kv::MemoryKvStore;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &str {
            "memory_read"
        }
        fn description(&self) -> &str {
            "Echoes its input back."
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: Value, _ctx: &SecurityContext) -> ToolOutcome {
            ToolOutcome::success(args.to_string())
        }
    }

    async fn kernel(dir: &std::path::Path) -> Arc<SecurityKernel> {
        let config = Config::load(dir).unwrap();
        let store = Store::new(Arc::new(MemoryKvStore::new()));
        let audit = wopr_audit::AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        Arc::new(SecurityKernel::new(config, store, audit))
    }

    fn owner_context(session: &str) -> SecurityContext {
        let source = wopr_core::InjectionSource::new(wopr_core::InjectionType::Cli, chrono::Utc::now());
        SecurityContext {
            request_id: "req-1".into(),
            source,
            target_session: session.into(),
            trust_level: wopr_core::TrustLevel::Owner,
            granted_capabilities: vec![Capability::wildcard()],
            created_at: chrono::Utc::now(),
            inject_id: None,
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let catalogue = ToolCatalogue::new(kernel(dir.path()).await, Arc::new(NoopSandboxBridge));
        let ctx = owner_context("alpha");
        let result = catalogue.invoke("does_not_exist", Value::Null, &ctx).await;
        assert!(matches!(result, Err(RuntimeError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn owner_can_invoke_registered_tool() {
        let dir = tempfile::tempdir().unwrap();
        let catalogue = ToolCatalogue::new(kernel(dir.path()).await, Arc::new(NoopSandboxBridge));
        catalogue.register(Box::new(EchoTool)).await;
        let ctx = owner_context("alpha");
        let outcome = catalogue.invoke("memory_read", serde_json::json!({"q": 1}), &ctx).await.unwrap();
        assert!(!outcome.is_error);
    }

    #[tokio::test]
    async fn visible_definitions_hides_ungranted_tools() {
        let dir = tempfile::tempdir().unwrap();
        let catalogue = ToolCatalogue::new(kernel(dir.path()).await, Arc::new(NoopSandboxBridge));
        catalogue.register(Box::new(EchoTool)).await;
        let none: Vec<Capability> = vec![];
        assert!(catalogue.visible_definitions(&none).await.is_empty());
        let all = vec![Capability::wildcard()];
        assert_eq!(catalogue.visible_definitions(&all).await.len(), 1);
    }

    #[tokio::test]
    async fn core_tools_cover_the_full_capability_map() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel(dir.path()).await;
        let store = Store::new(Arc::new(MemoryKvStore::new()));
        let events = Arc::new(EventBus::new());
        let catalogue = ToolCatalogue::new(Arc::clone(&kernel), Arc::new(NoopSandboxBridge));
        for handler in core_tools(store, Arc::clone(&kernel), events) {
            catalogue.register(handler).await;
        }
        let ctx = owner_context("alpha");
        let all = vec![Capability::wildcard()];
        let visible: Vec<String> = catalogue.visible_definitions(&all).await.into_iter().map(|def| def.name.clone()).collect();
        for (tool_name, _) in wopr_core::TOOL_CAPABILITY_MAP {
            if *tool_name == "sessions_send" || tool_name.starts_with("cron_") {
                continue;
            }
            assert!(visible.contains(&(*tool_name).to_string()), "missing core tool {tool_name}");
        }
        let outcome = catalogue.invoke("security_whoami", Value::Null, &ctx).await.unwrap();
        assert!(!outcome.is_error);
    }

    #[tokio::test]
    async fn dangerous_tools_are_registered_but_fail_closed_without_a_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel(dir.path()).await;
        let store = Store::new(Arc::new(MemoryKvStore::new()));
        let events = Arc::new(EventBus::new());
        let catalogue = ToolCatalogue::new(Arc::clone(&kernel), Arc::new(NoopSandboxBridge));
        for handler in core_tools(store, Arc::clone(&kernel), events) {
            catalogue.register(handler).await;
        }
        let mut ctx = owner_context("alpha");
        ctx.source.granted_capabilities = Some(vec![Capability::new("inject.network")]);
        let outcome = catalogue.invoke("http_fetch", serde_json::json!({"url": "https://example.com"}), &ctx).await.unwrap();
        assert!(outcome.is_error);
        assert!(outcome.content.contains("no sandbox runtime"));
    }
}
