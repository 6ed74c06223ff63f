//! The daemon-wide cron ticker: job CRUD, next-fire tracking, and firing
//! due jobs through the session queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use wopr_audit::{AuditAction, AuditLog, AuditOutcome};
use wopr_config::Config;
use wopr_core::{Capability, CronHistoryEntry, CronJob, CronScript, InjectionSource, InjectionType, Timestamp, TrustLevel};
use wopr_events::EventBus;
use wopr_runtime::QueueManager;
use wopr_security::SecurityKernel;
use wopr_storage::Store;

use crate::error::{CronError, CronResult};
use crate::executor;
use crate::schedule::Schedule;

/// The minimum idle sleep between ticks when no job has a known next-fire
/// time, so a freshly created job is never more than this long from being
/// picked up.
const FALLBACK_TICK_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Input to [`CronScheduler::create_job`], before schedule resolution fills
/// in `once`/`runAt`.
#[derive(Debug, Clone)]
pub struct NewCronJob {
    /// Unique job name.
    pub name: String,
    /// A 5-field cron expression, or relative/absolute one-shot syntax.
    pub schedule: String,
    /// The session this job injects into.
    pub session: String,
    /// The message template.
    pub message: String,
    /// Scripts to run before templating, if any.
    pub scripts: Vec<CronScript>,
}

/// Owns every persisted [`CronJob`], the in-memory next-fire table derived
/// from them, and the single background ticker that fires due jobs.
pub struct CronScheduler {
    store: Store,
    config: RwLock<Config>,
    kernel: Arc<SecurityKernel>,
    queue: Arc<QueueManager>,
    events: Arc<EventBus>,
    audit: AuditLog,
    next_fire: RwLock<HashMap<String, Timestamp>>,
}

impl CronScheduler {
    /// Build a scheduler over the given collaborators. Call
    /// [`CronScheduler::bootstrap`] once before [`CronScheduler::run`] to
    /// populate the next-fire table from persisted jobs.
    #[must_use]
    pub fn new(store: Store, config: Config, kernel: Arc<SecurityKernel>, queue: Arc<QueueManager>, events: Arc<EventBus>, audit: AuditLog) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            kernel,
            queue,
            events,
            audit,
            next_fire: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the in-memory config snapshot, e.g. after a reload.
    pub fn set_config(&self, config: Config) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    fn cron_scripts_enabled(&self) -> bool {
        self.config.read().expect("config lock poisoned").cron_scripts_enabled()
    }

    fn enforcement_mode(&self) -> String {
        self.config.read().expect("config lock poisoned").enforcement_mode()
    }

    /// Recompute each persisted job's next-fire time from `now`. Missed
    /// fires during downtime are never backfilled — a schedule's next
    /// occurrence is always computed relative to the moment this runs, not
    /// to whatever the job's last fire was before a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store can't be read.
    pub async fn bootstrap(&self, now: Timestamp) -> CronResult<()> {
        let jobs = self.store.cron_jobs()?.list().await?;
        let mut table = HashMap::new();
        for job in jobs {
            let schedule = if job.once {
                Schedule::Once(job.run_at.unwrap_or(now))
            } else {
                Schedule::parse(&job.schedule, now)?
            };
            if let Some(next) = schedule.next_fire_after(now - Duration::seconds(1)) {
                table.insert(job.name, next);
            }
        }
        *self.next_fire.write().expect("next-fire lock poisoned") = table;
        Ok(())
    }

    /// Create and persist a new job, rejecting it if scripts are attached
    /// while `daemon.cronScriptsEnabled` is off, or if it targets a session
    /// other than `requesting_session` without the `cross.inject`
    /// capability (logged but allowed outside `enforce` mode).
    ///
    /// # Errors
    ///
    /// Returns [`CronError::JobAlreadyExists`], [`CronError::ScriptsDisabled`],
    /// [`CronError::InvalidSchedule`], or [`CronError::InjectionRejected`].
    pub async fn create_job(&self, input: NewCronJob, creator: InjectionSource, requesting_session: Option<&str>, now: Timestamp) -> CronResult<CronJob> {
        if self.store.cron_jobs()?.get(&input.name).await?.is_some() {
            return Err(CronError::JobAlreadyExists(input.name));
        }
        if !input.scripts.is_empty() && !self.cron_scripts_enabled() {
            return Err(CronError::ScriptsDisabled);
        }
        let schedule = Schedule::parse(&input.schedule, now)?;

        if let Some(requester) = requesting_session {
            if requester != input.session {
                self.check_cross_inject(&creator, &input.session).await?;
            }
        }

        let (schedule_str, once, run_at) = match &schedule {
            Schedule::Once(at) => ("once".to_string(), true, Some(*at)),
            Schedule::Cron { .. } => (input.schedule.clone(), false, None),
        };

        let job = CronJob {
            name: input.name,
            schedule: schedule_str,
            session: input.session,
            message: input.message,
            scripts: input.scripts,
            once,
            run_at,
        };
        self.store.cron_jobs()?.put(&job).await?;
        if let Some(next) = schedule.next_fire_after(now - Duration::seconds(1)) {
            self.next_fire.write().expect("next-fire lock poisoned").insert(job.name.clone(), next);
        }
        Ok(job)
    }

    async fn check_cross_inject(&self, creator: &InjectionSource, target_session: &str) -> CronResult<()> {
        let decision = self.kernel.evaluate_injection(creator.clone(), target_session).await?;
        let has_cross_inject = decision.context.as_ref().is_some_and(|ctx| ctx.has_capability(&Capability::new("cross.inject")));
        if has_cross_inject {
            return Ok(());
        }
        if self.enforcement_mode() == "enforce" {
            return Err(CronError::InjectionRejected("cross.inject capability required".into()));
        }
        warn!(target = target_session, "cron job targets another session without cross.inject under non-enforce mode");
        Ok(())
    }

    /// Remove a job and forget its next-fire entry.
    ///
    /// # Errors
    ///
    /// Returns [`CronError::JobNotFound`] if no such job exists, or a
    /// storage error.
    pub async fn remove_job(&self, name: &str) -> CronResult<()> {
        self.next_fire.write().expect("next-fire lock poisoned").remove(name);
        if self.store.cron_jobs()?.delete(name).await? {
            Ok(())
        } else {
            Err(CronError::JobNotFound(name.to_string()))
        }
    }

    /// List every persisted job.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_jobs(&self) -> CronResult<Vec<CronJob>> {
        Ok(self.store.cron_jobs()?.list().await?)
    }

    /// The run history for one job, chronological.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn history(&self, name: &str) -> CronResult<Vec<CronHistoryEntry>> {
        Ok(self.store.cron_history(name)?.history().await?)
    }

    /// The earliest known next-fire time across every tracked job.
    #[must_use]
    pub fn next_wake(&self) -> Option<Timestamp> {
        self.next_fire.read().expect("next-fire lock poisoned").values().min().copied()
    }

    /// Fire every job whose next-fire time is at or before `now`, recording
    /// a history entry for each and advancing (or clearing) its next-fire
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store can't be read.
    pub async fn tick(&self, now: Timestamp) -> CronResult<Vec<CronHistoryEntry>> {
        let due: Vec<String> = {
            let table = self.next_fire.read().expect("next-fire lock poisoned");
            table.iter().filter(|(_, next)| **next <= now).map(|(name, _)| name.clone()).collect()
        };

        let mut entries = Vec::with_capacity(due.len());
        for name in due {
            let Some(job) = self.store.cron_jobs()?.get(&name).await? else {
                self.next_fire.write().expect("next-fire lock poisoned").remove(&name);
                continue;
            };

            let entry = self.fire_job(&job, now).await;
            self.store.cron_history(&job.name)?.append(&entry).await?;
            entries.push(entry);

            if job.once {
                self.store.cron_jobs()?.delete(&job.name).await?;
                self.next_fire.write().expect("next-fire lock poisoned").remove(&job.name);
            } else {
                match Schedule::parse(&job.schedule, now) {
                    Ok(schedule) => match schedule.next_fire_after(now) {
                        Some(next) => {
                            self.next_fire.write().expect("next-fire lock poisoned").insert(job.name.clone(), next);
                        }
                        None => {
                            self.next_fire.write().expect("next-fire lock poisoned").remove(&job.name);
                        }
                    },
                    Err(err) => {
                        error!(job = %job.name, %err, "recurring job's stored schedule no longer parses");
                        self.next_fire.write().expect("next-fire lock poisoned").remove(&job.name);
                    }
                }
            }
        }
        Ok(entries)
    }

    async fn fire_job(&self, job: &CronJob, now: Timestamp) -> CronHistoryEntry {
        let outcomes = if job.scripts.is_empty() {
            Vec::new()
        } else if self.cron_scripts_enabled() {
            executor::run_scripts(&job.scripts).await
        } else {
            executor::disabled_outcomes(&job.scripts)
        };
        let script_error = outcomes.iter().find(|o| !o.success).map(|o| format!("script {} failed: {}", o.name, o.error.clone().unwrap_or_default()));
        let message = executor::template_message(&job.message, &outcomes);

        let source = InjectionSource::new(InjectionType::Cron, now).with_trust_level(TrustLevel::Owner).with_target(job.session.clone());

        let (_, rx) = self.queue.enqueue(&job.session, message.clone(), source.clone(), 0, now).await;
        let dispatch_error = match rx.await {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some("dispatch result channel closed before resolving".to_string()),
        };

        let success = dispatch_error.is_none() && script_error.is_none();
        let error = if success { None } else { dispatch_error.or(script_error) };
        let duration_ms = (chrono::Utc::now() - now).num_milliseconds().max(0) as u64;

        let outcome = if success { AuditOutcome::success() } else { AuditOutcome::failure(error.clone().unwrap_or_default()) };
        if let Err(err) = self.audit.append(now, AuditAction::CronFired { job: job.name.clone() }, outcome, source, Some(job.session.clone()), error.clone()).await {
            error!(job = %job.name, %err, "failed to append cron audit entry");
        }

        CronHistoryEntry { ts: now, name: job.name.clone(), session: job.session.clone(), message, success, duration_ms, error }
    }

    /// Run the ticker loop until `cancel` fires: each iteration ticks due
    /// jobs, then sleeps until the earliest remaining next-fire (or a
    /// fallback interval if nothing is scheduled, so newly created jobs are
    /// never stranded behind an indefinite sleep).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let now = chrono::Utc::now();
            if let Err(err) = self.tick(now).await {
                error!(%err, "cron tick failed");
            }

            let sleep_for = self
                .next_wake()
                .and_then(|next| (next - chrono::Utc::now()).to_std().ok())
                .unwrap_or(FALLBACK_TICK_INTERVAL)
                .min(FALLBACK_TICK_INTERVAL);

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl wopr_runtime::CronDirectory for CronScheduler {
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
    ) -> wopr_runtime::RuntimeResult<CronJob> {
        let input = NewCronJob { name, schedule, session, message, scripts };
        self.create_job(input, creator, requesting_session.as_deref(), now)
            .await
            .map_err(|err| wopr_runtime::RuntimeError::External(err.to_string()))
    }

    async fn remove_job(&self, name: &str) -> wopr_runtime::RuntimeResult<()> {
        self.remove_job(name).await.map_err(|err| wopr_runtime::RuntimeError::External(err.to_string()))
    }

    async fn list_jobs(&self) -> wopr_runtime::RuntimeResult<Vec<CronJob>> {
        self.list_jobs().await.map_err(|err| wopr_runtime::RuntimeError::External(err.to_string()))
    }

    async fn history(&self, name: &str) -> wopr_runtime::RuntimeResult<Vec<CronHistoryEntry>> {
        self.history(name).await.map_err(|err| wopr_runtime::RuntimeError::External(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopr_core::Session;
    use wopr_llm::echo::EchoProvider;
    use wopr_llm::ProviderRegistry;
    use wopr_runtime::{Dispatcher, NoopSandboxBridge, ToolCatalogue};
    use wopr_storage::kv::MemoryKvStore;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    async fn scheduler(dir: &std::path::Path) -> (CronScheduler, Store) {
        let store = Store::new(Arc::new(MemoryKvStore::new()));

        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(EchoProvider)).await;
        providers.configure("echo", None).await.unwrap();

        let mut config = Config::load(dir).unwrap();
        config.set("daemon.cronScriptsEnabled", serde_json::json!(true)).unwrap();

        let audit = AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        let kernel = Arc::new(SecurityKernel::new(config.clone(), store.clone(), AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap()));
        let tools = Arc::new(ToolCatalogue::new(Arc::clone(&kernel), Arc::new(NoopSandboxBridge)));
        let events = Arc::new(EventBus::new());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), providers, tools, events.clone(), Arc::clone(&kernel)));
        let queue = Arc::new(QueueManager::new(dispatcher, events.clone()));

        (CronScheduler::new(store.clone(), config, kernel, queue, events, audit), store)
    }

    #[tokio::test]
    async fn once_job_fires_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store) = scheduler(dir.path()).await;
        store.sessions().unwrap().put(&Session::new("alpha", now())).await.unwrap();

        let created = now();
        let source = InjectionSource::new(InjectionType::Cli, created).with_trust_level(TrustLevel::Owner);
        scheduler
            .create_job(
                NewCronJob { name: "one".into(), schedule: "+0s".into(), session: "alpha".into(), message: "hi".into(), scripts: vec![] },
                source,
                Some("alpha"),
                created,
            )
            .await
            .unwrap();

        let fire_at = created + Duration::seconds(1);
        let entries = scheduler.tick(fire_at).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);

        assert!(scheduler.list_jobs().await.unwrap().is_empty());
        assert_eq!(scheduler.history("one").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_unknown_job_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _store) = scheduler(dir.path()).await;
        let result = scheduler.remove_job("ghost").await;
        assert!(matches!(result, Err(CronError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn script_templating_records_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store) = scheduler(dir.path()).await;
        store.sessions().unwrap().put(&Session::new("alpha", now())).await.unwrap();

        let created = now();
        let source = InjectionSource::new(InjectionType::Cli, created).with_trust_level(TrustLevel::Owner);
        let scripts = vec![
            CronScript { name: "a".into(), command: "echo hello".into(), cwd: None, timeout: None },
            CronScript { name: "b".into(), command: "false".into(), cwd: None, timeout: None },
        ];
        scheduler
            .create_job(
                NewCronJob { name: "templated".into(), schedule: "* * * * *".into(), session: "alpha".into(), message: "a={{a}} b={{b}}".into(), scripts },
                source,
                Some("alpha"),
                created,
            )
            .await
            .unwrap();

        let fire_at = scheduler.next_wake().unwrap();
        let entries = scheduler.tick(fire_at).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].message, "a=hello b=[script error: exit code 1]");
        assert!(scheduler.list_jobs().await.unwrap().iter().any(|j| j.name == "templated"));
    }

    #[tokio::test]
    async fn job_targeting_missing_session_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _store) = scheduler(dir.path()).await;

        let created = now();
        let source = InjectionSource::new(InjectionType::Cli, created).with_trust_level(TrustLevel::Owner);
        scheduler
            .create_job(
                NewCronJob { name: "ghost".into(), schedule: "+0s".into(), session: "nowhere".into(), message: "hi".into(), scripts: vec![] },
                source,
                Some("nowhere"),
                created,
            )
            .await
            .unwrap();

        let entries = scheduler.tick(created + Duration::seconds(1)).await.unwrap();
        assert!(!entries[0].success);
        assert!(entries[0].error.as_deref().unwrap().contains("session not found"));
    }

    #[tokio::test]
    async fn scripts_disabled_at_create_time_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(Arc::new(MemoryKvStore::new()));
        let config = Config::load(dir.path()).unwrap();
        let audit = AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        let kernel = Arc::new(SecurityKernel::new(config.clone(), store.clone(), AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap()));
        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(EchoProvider)).await;
        providers.configure("echo", None).await.unwrap();
        let tools = Arc::new(ToolCatalogue::new(Arc::clone(&kernel), Arc::new(NoopSandboxBridge)));
        let events = Arc::new(EventBus::new());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), providers, tools, events.clone(), Arc::clone(&kernel)));
        let queue = Arc::new(QueueManager::new(dispatcher, events.clone()));
        let scheduler = CronScheduler::new(store, config, kernel, queue, events, audit);

        let created = now();
        let source = InjectionSource::new(InjectionType::Cli, created).with_trust_level(TrustLevel::Owner);
        let result = scheduler
            .create_job(
                NewCronJob {
                    name: "blocked".into(),
                    schedule: "* * * * *".into(),
                    session: "alpha".into(),
                    message: "hi".into(),
                    scripts: vec![CronScript { name: "a".into(), command: "echo hi".into(), cwd: None, timeout: None }],
                },
                source,
                Some("alpha"),
                created,
            )
            .await;
        assert!(matches!(result, Err(CronError::ScriptsDisabled)));
    }
}
