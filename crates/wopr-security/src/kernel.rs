//! The security kernel: the ordered injection-evaluation pipeline, the
//! gateway-forwarding helpers, and the tool-level capability gate.
//!
//! This is a thin composition layer. Every primitive it reasons about —
//! access patterns, trust ordering, capability hierarchy, the dangerous-tool
//! exception — already lives in `wopr_core`; the kernel's job is to pull
//! configuration, resolve grants, run the steps in the documented order, and
//! record the outcome to the audit log.

use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;
use wopr_audit::{AuditAction, AuditLog, AuditOutcome};
use wopr_config::Config;
use wopr_core::capability::{DANGEROUS_TOOLS, SECURITY_INTROSPECTION_TOOLS, expand, tool_capability};
use wopr_core::{AccessPattern, Capability, ErrorKind, InjectionSource, InjectionType, SecurityContext, TrustLevel};
use wopr_storage::Store;

use crate::context::ContextStore;
use crate::error::{SecurityError, SecurityResult};
use crate::ratelimit::{RateLimit, RateLimiter};

/// The outcome of `evaluate_injection`.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the injection may proceed.
    pub allowed: bool,
    /// A human-readable reason, present whenever a check failed (even if
    /// `allowed` is still true under `warn`/`off` enforcement).
    pub reason: Option<String>,
    /// The resulting security context, present whenever a context could be
    /// built at all (i.e. except for unresolvable-grant failures).
    pub context: Option<SecurityContext>,
}

/// The result of a gateway-forwarding check.
#[derive(Debug, Clone)]
pub struct ForwardDecision {
    /// Whether `from` may forward into `to`.
    pub allowed: bool,
    /// The reason forwarding was refused, if `allowed` is false.
    pub reason: Option<String>,
}

/// A failed pipeline step, carried internally until enforcement mode decides
/// whether it actually blocks the injection.
struct Denial {
    kind: ErrorKind,
    reason: String,
}

/// The security kernel. Owns no long-lived session state beyond the
/// in-flight context table and rate-limit buckets; everything else is read
/// fresh from config and storage on each evaluation so a config reload or a
/// grant revocation takes effect on the next injection.
pub struct SecurityKernel {
    config: RwLock<Config>,
    store: Store,
    audit: AuditLog,
    contexts: ContextStore,
    rate_limiter: RateLimiter,
}

impl SecurityKernel {
    /// Build a kernel over the given config, store, and audit log, with the
    /// default rate-limit policy.
    #[must_use]
    pub fn new(config: Config, store: Store, audit: AuditLog) -> Self {
        Self {
            config: RwLock::new(config),
            store,
            audit,
            contexts: ContextStore::new(),
            rate_limiter: RateLimiter::new(RateLimit::default()),
        }
    }

    /// Replace the in-memory config snapshot, e.g. after a reload.
    pub fn set_config(&self, config: Config) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    /// Read a config value by dot path, redacted for any tool or management
    /// surface reachable from outside the process.
    #[must_use]
    pub fn config_get(&self, dot_path: &str) -> Option<Value> {
        self.config.read().expect("config lock poisoned").get_redacted(dot_path)
    }

    /// Set a config value by dot path and persist it to `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Config`] if the path walks through a
    /// non-object value or the write to disk fails.
    pub fn config_set(&self, dot_path: &str, value: Value) -> SecurityResult<()> {
        let mut config = self.config.write().expect("config lock poisoned");
        config.set(dot_path, value)?;
        config.save()?;
        Ok(())
    }

    fn enforcement_mode(&self) -> String {
        self.config.read().expect("config lock poisoned").enforcement_mode()
    }

    fn level_capabilities(&self, level: TrustLevel) -> Vec<Capability> {
        let key = format!("security.trustLevels.{}.capabilities", level_key(level));
        let configured = self
            .config
            .read()
            .expect("config lock poisoned")
            .get(&key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(Capability::new)
                    .collect::<Vec<_>>()
            });
        configured.unwrap_or_else(|| default_level_capabilities(level))
    }

    fn effective_access_list(&self, session: &str) -> SecurityResult<Vec<AccessPattern>> {
        let config = self.config.read().expect("config lock poisoned");
        let raw = config
            .get(&format!("security.sessions.{session}.access"))
            .and_then(Value::as_array)
            .or_else(|| config.get("security.defaults.access").and_then(Value::as_array));

        let Some(raw) = raw else {
            // No session-specific or global default configured: fall back
            // to requiring at least `trusted`, rather than silently
            // admitting every source.
            return Ok(vec![AccessPattern::Trust(TrustLevel::Trusted)]);
        };
        raw.iter()
            .map(|v| {
                let s = v
                    .as_str()
                    .ok_or_else(|| SecurityError::InvalidPattern("access pattern entry must be a string".into()))?;
                AccessPattern::parse(s).map_err(|_| SecurityError::InvalidPattern(s.to_string()))
            })
            .collect()
    }

    /// Whether `session` is configured as a gateway, able to receive
    /// lower-trust traffic and forward it onward.
    #[must_use]
    pub fn is_gateway(&self, session: &str) -> bool {
        self.config
            .read()
            .expect("config lock poisoned")
            .get(&format!("security.sessions.{session}.gateway"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether gateway session `from` may forward an injection into `to`:
    /// `from` must itself be configured as a gateway, and `to`'s effective
    /// access list must accept a source whose `gatewaySession` is `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if `to`'s access list contains an unparsable
    /// pattern.
    pub fn can_gateway_forward(&self, from: &str, to: &str) -> SecurityResult<ForwardDecision> {
        if !self.is_gateway(from) {
            return Ok(ForwardDecision {
                allowed: false,
                reason: Some(format!("{from} is not configured as a gateway")),
            });
        }
        let forwarded = InjectionSource::new(InjectionType::Gateway, Utc::now())
            .with_identity(wopr_core::IdentityRef {
                gateway_session: Some(from.to_string()),
                ..Default::default()
            })
            .with_target(to);
        let patterns = self.effective_access_list(to)?;
        if patterns.iter().any(|p| p.matches(&forwarded)) {
            Ok(ForwardDecision { allowed: true, reason: None })
        } else {
            Ok(ForwardDecision {
                allowed: false,
                reason: Some(format!("{to} does not accept forwards from {from}")),
            })
        }
    }

    /// Run the full decision pipeline for `source` injecting into
    /// `target_session`. Always emits an audit entry, regardless of outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if storage, config, or audit access itself fails —
    /// never for an ordinary access/capability denial, which is represented
    /// in the returned [`Decision`] instead.
    pub async fn evaluate_injection(
        &self,
        mut source: InjectionSource,
        target_session: &str,
    ) -> SecurityResult<Decision> {
        source.target_session = Some(target_session.to_string());
        let mut denial: Option<Denial> = None;

        // Step 2: trust derivation.
        let base_capabilities = if let Some(grant_id) = source.grant_id.clone() {
            match self.store.access_grants()?.get(&grant_id).await? {
                Some(grant) => {
                    if grant.expires_at.is_some_and(|exp| exp <= Utc::now()) {
                        denial = Some(Denial {
                            kind: ErrorKind::AccessDenied,
                            reason: format!("access grant {grant_id} has expired"),
                        });
                        Vec::new()
                    } else {
                        source.trust_level = grant.trust_level;
                        grant.capabilities
                    }
                }
                None => {
                    denial = Some(Denial {
                        kind: ErrorKind::AccessDenied,
                        reason: format!("access grant {grant_id} does not exist"),
                    });
                    Vec::new()
                }
            }
        } else if let Some(explicit) = source.granted_capabilities.clone() {
            explicit
        } else {
            self.level_capabilities(source.trust_level)
        };
        source.granted_capabilities = Some(base_capabilities.clone());

        // Step 3: access-pattern match (only if trust derivation succeeded).
        if denial.is_none() {
            match self.effective_access_list(target_session) {
                Ok(patterns) => {
                    if !patterns.iter().any(|p| p.matches(&source)) {
                        denial = Some(Denial {
                            kind: ErrorKind::AccessDenied,
                            reason: "no access pattern matched this source".into(),
                        });
                    }
                }
                Err(err) => {
                    denial = Some(Denial {
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Step 4: gateway routing decision.
        if denial.is_none()
            && !self.is_gateway(target_session)
            && !source.trust_level.meets(TrustLevel::Trusted)
            && !matches!(source.kind, InjectionType::Internal | InjectionType::Cli | InjectionType::Daemon)
        {
            let forwarded_ok = match source.identity.as_ref().and_then(|id| id.gateway_session.as_deref()) {
                Some(gateway) => self.can_gateway_forward(gateway, target_session)?.allowed,
                None => false,
            };
            if !forwarded_ok {
                denial = Some(Denial {
                    kind: ErrorKind::GatewayRequired,
                    reason: format!("{target_session} requires a gateway forward for this source"),
                });
            }
        }

        // Rate limiting, consulted before the (potentially expensive)
        // capability expansion, so a rejected burst never pays for it.
        if denial.is_none() {
            let key = RateLimiter::key_for(&source, target_session);
            if !self.rate_limiter.check(&key) {
                denial = Some(Denial {
                    kind: ErrorKind::RateLimited,
                    reason: format!("rate limit exceeded for {key}"),
                });
            }
        }

        // Step 5: capability baseline.
        let granted_capabilities: Vec<Capability> = base_capabilities
            .iter()
            .flat_map(expand)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        let enforcement = self.enforcement_mode();
        let allowed = match (enforcement.as_str(), &denial) {
            ("off" | "warn", _) => true,
            (_, None) => true,
            (_, Some(_)) => false,
        };
        if enforcement == "warn" {
            if let Some(d) = &denial {
                tracing::warn!(session = target_session, reason = %d.reason, "injection check failed under warn enforcement");
            }
        }

        let context = SecurityContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            source: source.clone(),
            target_session: target_session.to_string(),
            trust_level: source.trust_level,
            granted_capabilities,
            created_at: Utc::now(),
            inject_id: None,
        };

        // Step 6: audit, unconditionally.
        let outcome = match &denial {
            Some(d) => AuditOutcome::failure(format!("{}: {}", d.kind.code(), d.reason)),
            None => AuditOutcome::success(),
        };
        self.audit
            .append(
                Utc::now(),
                AuditAction::InjectionEvaluated,
                outcome,
                source.clone(),
                Some(target_session.to_string()),
                denial.as_ref().map(|d| d.reason.clone()),
            )
            .await?;

        if allowed {
            self.contexts.store(context.clone());
        }

        Ok(Decision {
            allowed,
            reason: denial.map(|d| d.reason),
            context: Some(context),
        })
    }

    /// Whether `context`'s granted capabilities satisfy `required`.
    #[must_use]
    pub fn check_capability(&self, context: &SecurityContext, required: &Capability) -> bool {
        context.has_capability(required)
    }

    /// The throwing counterpart to [`SecurityKernel::check_capability`].
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::CapabilityDenied`] if the context lacks the
    /// capability.
    pub fn require_capability(&self, context: &SecurityContext, required: &Capability) -> SecurityResult<()> {
        if self.check_capability(context, required) {
            Ok(())
        } else {
            Err(SecurityError::CapabilityDenied {
                capability: required.clone(),
                held: context.granted_capabilities.clone(),
            })
        }
    }

    /// The tool-level re-entry check run by the dispatch engine's tool
    /// surface before invoking `tool_name`.
    ///
    /// Security-introspection tools always pass. Tools in the dangerous set
    /// (`http_fetch`, `exec_command`, `notify`) require their exact leaf
    /// capability in the source's raw (pre-expansion) grant set — the
    /// general dotted-hierarchy rule in `Capability::satisfies` does not
    /// apply to them, per the invariant documented on `DANGEROUS_TOOLS`.
    /// Every other mapped tool goes through the ordinary expanded-baseline
    /// check; unmapped tools are denied.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::CapabilityDenied`] if the required
    /// capability is absent.
    pub fn check_tool(&self, context: &SecurityContext, tool_name: &str) -> SecurityResult<()> {
        if SECURITY_INTROSPECTION_TOOLS.contains(&tool_name) {
            return Ok(());
        }
        if let Some((_, cap_str)) = DANGEROUS_TOOLS.iter().find(|(name, _)| *name == tool_name) {
            let leaf = Capability::new(*cap_str);
            let raw = context.source.granted_capabilities.as_deref().unwrap_or(&[]);
            if raw.iter().any(|c| c.is_wildcard() || c.as_str() == leaf.as_str()) {
                return Ok(());
            }
            return Err(SecurityError::CapabilityDenied {
                capability: leaf,
                held: raw.to_vec(),
            });
        }
        let Some(cap) = tool_capability(tool_name) else {
            return Err(SecurityError::CapabilityDenied {
                capability: Capability::new(tool_name),
                held: context.granted_capabilities.clone(),
            });
        };
        self.require_capability(context, &cap)
    }

    /// The audit log's full history, oldest first, for the `event_list`
    /// tool surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store read fails.
    pub async fn audit_history(&self) -> SecurityResult<Vec<wopr_audit::AuditEntry>> {
        Ok(self.audit.history().await?)
    }

    /// Retrieve the context currently active for `session_name`, if any.
    #[must_use]
    pub fn retrieve_context(&self, session_name: &str) -> Option<SecurityContext> {
        self.contexts.retrieve(session_name)
    }

    /// Drop the context for `session_name`, e.g. once dispatch completes.
    pub fn clear_context(&self, session_name: &str) {
        self.contexts.clear(session_name);
    }
}

fn level_key(level: TrustLevel) -> &'static str {
    match level {
        TrustLevel::Owner => "owner",
        TrustLevel::Trusted => "trusted",
        TrustLevel::SemiTrusted => "semi-trusted",
        TrustLevel::Untrusted => "untrusted",
    }
}

/// The baseline capability set for a trust level absent any
/// `security.trustLevels.<level>.capabilities` override: owner gets the
/// wildcard, lower levels get progressively narrower defaults, untrusted
/// gets nothing until an explicit grant says otherwise.
fn default_level_capabilities(level: TrustLevel) -> Vec<Capability> {
    match level {
        TrustLevel::Owner => vec![Capability::wildcard()],
        TrustLevel::Trusted => vec![
            Capability::new("inject"),
            Capability::new("session.history"),
            Capability::new("memory.read"),
            Capability::new("memory.write"),
        ],
        TrustLevel::SemiTrusted => vec![Capability::new("session.history")],
        TrustLevel::Untrusted => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use wopr_storage::kv::MemoryKvStore;

    async fn kernel() -> (SecurityKernel, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        let kv = Arc::new(MemoryKvStore::new());
        let store = Store::new(kv.clone());
        let audit = AuditLog::new(kv).unwrap();
        (SecurityKernel::new(config, store, audit), dir)
    }

    /// Flip a kernel's enforcement mode to `"enforce"`; the compiled-in
    /// default is `"warn"`, which only logs denials rather than blocking
    /// them, so tests asserting an actual block opt into `enforce` explicitly.
    fn enforce(kernel: &SecurityKernel, dir: &std::path::Path) {
        let mut cfg = Config::load(dir).unwrap();
        cfg.set("security.enforcement", Value::String("enforce".into())).unwrap();
        kernel.set_config(cfg);
    }

    #[tokio::test]
    async fn owner_source_is_allowed_by_default() {
        let (kernel, _dir) = kernel().await;
        let source = InjectionSource::new(InjectionType::Cli, Utc::now());
        let decision = kernel.evaluate_injection(source, "main").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.context.is_some());
    }

    #[tokio::test]
    async fn untrusted_p2p_source_is_denied_without_grant() {
        let (kernel, dir) = kernel().await;
        enforce(&kernel, dir.path());
        let source = InjectionSource::new(InjectionType::P2p, Utc::now());
        let decision = kernel.evaluate_injection(source, "main").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("no access pattern matched this source"));
    }

    #[tokio::test]
    async fn warn_mode_allows_but_records_reason() {
        let (kernel, _dir) = kernel().await;
        let source = InjectionSource::new(InjectionType::P2p, Utc::now());
        let decision = kernel.evaluate_injection(source, "main").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.reason.is_some());
    }

    #[tokio::test]
    async fn unknown_grant_id_is_denied() {
        let (kernel, dir) = kernel().await;
        enforce(&kernel, dir.path());
        let mut source = InjectionSource::new(InjectionType::Api, Utc::now());
        source.grant_id = Some("missing-grant".into());
        let decision = kernel.evaluate_injection(source, "main").await.unwrap();
        assert!(!decision.allowed);
    }

    #[test]
    fn check_tool_bypasses_for_introspection_tools() {
        let context = SecurityContext {
            request_id: "r".into(),
            source: InjectionSource::new(InjectionType::P2p, Utc::now()),
            target_session: "main".into(),
            trust_level: TrustLevel::Untrusted,
            granted_capabilities: vec![],
            created_at: Utc::now(),
            inject_id: None,
        };
        let kernel = SecurityKernel::new(
            Config::load(tempdir().unwrap().path()).unwrap(),
            Store::new(Arc::new(MemoryKvStore::new())),
            AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap(),
        );
        assert!(kernel.check_tool(&context, "security_whoami").is_ok());
    }

    #[test]
    fn check_tool_requires_explicit_leaf_for_dangerous_tools() {
        let mut context = SecurityContext {
            request_id: "r".into(),
            source: InjectionSource::new(InjectionType::Plugin, Utc::now()),
            target_session: "main".into(),
            trust_level: TrustLevel::Trusted,
            granted_capabilities: expand(&Capability::new("inject")),
            created_at: Utc::now(),
            inject_id: None,
        };
        context.source.granted_capabilities = Some(vec![Capability::new("inject")]);
        let kernel = SecurityKernel::new(
            Config::load(tempdir().unwrap().path()).unwrap(),
            Store::new(Arc::new(MemoryKvStore::new())),
            AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap(),
        );
        // The expanded baseline contains inject.network, but the dangerous
        // tool check must consult the raw grant set, which only has `inject`.
        assert!(kernel.check_tool(&context, "http_fetch").is_err());

        context.source.granted_capabilities = Some(vec![Capability::new("inject.network")]);
        assert!(kernel.check_tool(&context, "http_fetch").is_ok());
    }
}
