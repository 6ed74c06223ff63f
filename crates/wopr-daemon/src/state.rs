//! Wires every collaborator crate into one shared daemon state: config,
//! storage, identity, security kernel, provider registry, dispatch engine,
//! session queue, cron scheduler, and event bus.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use wopr_audit::AuditLog;
use wopr_config::Config;
use wopr_core::Timestamp;
use wopr_cron::CronScheduler;
use wopr_crypto::DaemonIdentity;
use wopr_events::EventBus;
use wopr_llm::{claude::ClaudeProvider, echo::EchoProvider, ProviderRegistry};
use wopr_runtime::{Dispatcher, NoopSandboxBridge, OpenAiGateway, QueueManager, ToolCatalogue};
use wopr_security::SecurityKernel;
use wopr_storage::{FileKvStore, KvStore, Store};

use crate::paths::DaemonPaths;

/// Everything an HTTP handler or the cron ticker needs, cloned cheaply via
/// `Arc` out of one daemon instance.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub identity: Arc<DaemonIdentity>,
    pub providers: Arc<ProviderRegistry>,
    pub kernel: Arc<SecurityKernel>,
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<QueueManager>,
    pub cron: Arc<CronScheduler>,
    pub events: Arc<EventBus>,
    pub openai: Arc<OpenAiGateway>,
}

/// Build every collaborator and wire them together against `home`.
///
/// Registers the `echo` provider unconditionally (it needs no credential
/// and backs the daemon's self-test surface) and `claude` if an API key is
/// configured at `providers.claude.apiKey`.
///
/// # Errors
///
/// Returns an error if the key-value store, identity directory, or
/// configuration cannot be loaded.
pub async fn bootstrap(home: std::path::PathBuf) -> anyhow::Result<AppState> {
    let paths = DaemonPaths::new(home.clone());
    tokio::fs::create_dir_all(&home).await?;

    let config = Config::load(&home)?;
    let identity = DaemonIdentity::load_or_generate(paths.identity_dir())?;

    let kv: Arc<dyn KvStore> = Arc::new(FileKvStore::open(&home).await?);
    let store = Store::new(kv.clone());

    let providers = Arc::new(ProviderRegistry::new());
    providers.register(Arc::new(EchoProvider)).await;
    providers.configure("echo", None).await?;
    if let Some(api_key) = config.get("providers.claude.apiKey").and_then(|v| v.as_str()) {
        providers.register(Arc::new(ClaudeProvider)).await;
        providers.configure("claude", Some(api_key)).await?;
    }

    let kernel_audit = AuditLog::new(kv.clone())?;
    let kernel = Arc::new(SecurityKernel::new(config.clone(), store.clone(), kernel_audit));

    let tools = Arc::new(ToolCatalogue::new(Arc::clone(&kernel), Arc::new(NoopSandboxBridge)));
    let events = Arc::new(EventBus::new());
    for handler in wopr_runtime::core_tools(store.clone(), Arc::clone(&kernel), Arc::clone(&events)) {
        tools.register(handler).await;
    }

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::clone(&providers), Arc::clone(&tools), Arc::clone(&events), Arc::clone(&kernel)));
    let queue = Arc::new(QueueManager::new(
        Arc::clone(&dispatcher) as Arc<dyn wopr_runtime::DispatchWorker>,
        Arc::clone(&events),
    ));
    tools.register(wopr_runtime::session_send_tool(Arc::clone(&queue))).await;

    let cron_audit = AuditLog::new(kv)?;
    let cron = Arc::new(CronScheduler::new(store.clone(), config.clone(), Arc::clone(&kernel), Arc::clone(&queue), Arc::clone(&events), cron_audit));
    let cron_directory = Arc::clone(&cron) as Arc<dyn wopr_runtime::CronDirectory>;
    for handler in wopr_runtime::cron_tools(cron_directory) {
        tools.register(handler).await;
    }

    let openai = Arc::new(OpenAiGateway::new(store.clone(), Arc::clone(&providers), Arc::clone(&queue)));

    Ok(AppState {
        store,
        config: Arc::new(config),
        identity: Arc::new(identity),
        providers,
        kernel,
        dispatcher,
        queue,
        cron,
        events,
        openai,
    })
}

/// Recompute the cron scheduler's next-fire table and spawn its ticker.
/// Returns a token the caller cancels to stop the ticker cleanly.
pub async fn spawn_cron(state: &AppState, now: Timestamp) -> anyhow::Result<CancellationToken> {
    state.cron.bootstrap(now).await?;
    let cancel = CancellationToken::new();
    let scheduler = Arc::clone(&state.cron);
    let ticker_cancel = cancel.clone();
    tokio::spawn(async move { scheduler.run(ticker_cancel).await });
    Ok(cancel)
}
