//! engine.rs
//! Covenant-gated execution of registered scripts.
//!
//! An invocation passes rate limiting, provenance verification, trust scoring
//! and the status policy before its logic runs. Every invocation that gets
//! past the registry lookup produces exactly one audit record, whatever the
//! outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditRecord, PendingAudit, Verdict, RUNTIME_ERROR_PREFIX};
use crate::config_loader::EngineConfig;
use crate::errors::CovenantResult;
use crate::policy::Policy;
use crate::provenance;
use crate::rate_limiter::{RateLimiter, TokenBucketLimiter};
use crate::registry::ScriptRegistry;
use crate::resonance::ResonanceScorer;
use crate::script::{ScriptDefinition, ScriptInputs};
use crate::trust_scorer::{ScorerKind, ScoringRequest, TrustScorer};

pub const MESSAGE_THROTTLED: &str = "Throttled";
pub const MESSAGE_DENIED: &str = "Denied by covenant";
pub const MESSAGE_RUNTIME_ERROR: &str = "Runtime error";

/// Caller-supplied context for a single invocation. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionContext {
    /// Rate-limit bucket key; defaults to `script:<id>` when unset or empty.
    pub rate_key: Option<String>,
    pub evidence: Vec<String>,
    pub topic: Option<String>,
    /// Timestamp covered by the signature; defaults to now (RFC 3339).
    pub timestamp: Option<String>,
    /// Base64 HMAC-SHA256 over `claim + "\n" + timestamp`.
    pub signature: Option<String>,
    pub secret: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_key(mut self, key: impl Into<String>) -> Self {
        self.rate_key = Some(key.into());
        self
    }

    pub fn with_evidence<I, S>(mut self, evidence: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evidence = evidence.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>, secret: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self.secret = Some(secret.into());
        self
    }
}

/// Result of a single invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub message: String,
    #[serde(rename = "auditRecord")]
    pub audit: AuditRecord,
}

/// One entry of a trigger fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub script_id: String,
    pub script_name: String,
    /// Present whenever the invocation produced a verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<Invocation>,
    /// Present when the script's logic failed or the branch itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

enum LogicOutcome {
    Completed { output: Value, message: String },
    Failed(String),
}

/// Registry, limiter, scorer, policy and audit trail of one engine instance.
pub struct CovenantEngine {
    registry: ScriptRegistry,
    limiter: Arc<dyn RateLimiter>,
    scorer: TrustScorer,
    policy: Policy,
    audit: AuditLog,
    logic_timeout: Option<Duration>,
}

impl CovenantEngine {
    pub fn new() -> Self {
        Self {
            registry: ScriptRegistry::new(),
            limiter: Arc::new(TokenBucketLimiter::default()),
            scorer: TrustScorer::default(),
            policy: Policy::default(),
            audit: AuditLog::new(),
            logic_timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> CovenantResult<Self> {
        config.validate()?;
        let scorer = match config.scorer {
            ScorerKind::Linguistic => TrustScorer::linguistic(),
            ScorerKind::Resonance => {
                TrustScorer::Resonance(ResonanceScorer::with_scale(config.resonance_scale))
            }
        };

        info!(
            scorer = ?config.scorer,
            capacity = config.rate_limit.capacity,
            refill_per_second = config.rate_limit.refill_per_second,
            denied_below = config.policy.denied_below,
            warning_below = config.policy.warning_below,
            "Covenant engine configured"
        );

        Ok(Self::new()
            .with_limiter(Arc::new(TokenBucketLimiter::new(config.rate_limit)))
            .with_scorer(scorer)
            .with_policy(Policy::new(config.policy))
            .with_logic_timeout(config.logic_timeout()))
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_scorer(mut self, scorer: TrustScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logic_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.logic_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn scorer(&self) -> &TrustScorer {
        &self.scorer
    }

    pub fn register(&self, script: ScriptDefinition) -> CovenantResult<()> {
        self.registry.register(script)
    }

    pub fn get(&self, id: &str) -> CovenantResult<Arc<ScriptDefinition>> {
        self.registry.get(id)
    }

    pub fn list(&self) -> CovenantResult<Vec<Arc<ScriptDefinition>>> {
        self.registry.list()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Snapshot of the audit trail, oldest first.
    pub fn get_audit_log(&self) -> Vec<AuditRecord> {
        self.audit.records()
    }

    pub fn clear_audit_log(&self) -> usize {
        let cleared = self.audit.clear();
        info!(cleared, "Audit log cleared");
        cleared
    }

    /// Run one script under the covenant.
    ///
    /// Only an unknown id is an error; throttling, denial and logic failures
    /// come back as verdicts with an audit record.
    pub async fn run(
        &self,
        id: &str,
        inputs: ScriptInputs,
        ctx: &ExecutionContext,
    ) -> CovenantResult<Invocation> {
        let script = self.registry.get(id)?;
        let pending = PendingAudit::begin(&script.id, &script.trigger);

        // Rate limiting
        let rate_key = ctx
            .rate_key
            .clone()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| format!("script:{}", script.id));
        if !self.limiter.consume(&rate_key) {
            debug!(script_id = %script.id, rate_key = %rate_key, "Invocation throttled");
            return Ok(self.record(pending, Verdict::throttled(), MESSAGE_THROTTLED, None, false));
        }

        // Provenance
        let claim = provenance::claim_for(&script);
        let timestamp = ctx
            .timestamp
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let provenance_verified = provenance::verify(
            &provenance::signing_message(&claim, &timestamp),
            ctx.signature.as_deref(),
            ctx.secret.as_deref(),
        );

        // Trust scoring and policy
        let assessment = self.scorer.assess(&ScoringRequest {
            claim: &claim,
            evidence: &ctx.evidence,
            provenance_verified,
            topic: ctx.topic.as_deref().unwrap_or(""),
            source: &script.source,
        });
        let status = self.policy.decide(assessment.score);
        debug!(
            script_id = %script.id,
            score = assessment.score,
            status = %status,
            provenance_verified,
            "Covenant assessment"
        );

        if !self.policy.permits(status, script.strict_scan) {
            let verdict = Verdict::from_assessment(status, &assessment);
            return Ok(self.record(pending, verdict, MESSAGE_DENIED, None, provenance_verified));
        }

        match self.execute(&script, inputs).await {
            LogicOutcome::Completed { output, message } => {
                let verdict = Verdict::from_assessment(status, &assessment);
                Ok(self.record(pending, verdict, message, Some(output), provenance_verified))
            }
            LogicOutcome::Failed(reason) => {
                warn!(script_id = %script.id, reason = %reason, "Script logic failed");
                let verdict = Verdict::runtime_error(assessment.score, &reason);
                Ok(self.record(pending, verdict, MESSAGE_RUNTIME_ERROR, None, provenance_verified))
            }
        }
    }

    /// Run every script registered for `trigger` concurrently, with a
    /// default context.
    pub async fn run_trigger(
        &self,
        trigger: &str,
        inputs: ScriptInputs,
    ) -> CovenantResult<Vec<TriggerOutcome>> {
        self.run_trigger_with(trigger, inputs, &ExecutionContext::default())
            .await
    }

    /// Fan `trigger` out to its scripts. One entry per script, in trigger
    /// index order; a failing branch never affects its siblings.
    pub async fn run_trigger_with(
        &self,
        trigger: &str,
        inputs: ScriptInputs,
        ctx: &ExecutionContext,
    ) -> CovenantResult<Vec<TriggerOutcome>> {
        let scripts = self.registry.by_trigger(trigger)?;
        if scripts.is_empty() {
            info!(trigger = %trigger, "No scripts registered for trigger");
            return Ok(Vec::new());
        }

        info!(trigger = %trigger, scripts = scripts.len(), "Dispatching trigger");

        let branches = scripts.iter().map(|script| {
            let inputs = inputs.clone();
            async move {
                let result = AssertUnwindSafe(self.run(&script.id, inputs, ctx))
                    .catch_unwind()
                    .await;

                let (invocation, error) = match result {
                    Ok(Ok(invocation)) => {
                        let error = invocation
                            .verdict
                            .explanation
                            .strip_prefix(RUNTIME_ERROR_PREFIX)
                            .map(str::to_string);
                        (Some(invocation), error)
                    }
                    Ok(Err(e)) => (None, Some(e.to_string())),
                    Err(payload) => (None, Some(format!("panicked: {}", panic_message(payload.as_ref())))),
                };

                TriggerOutcome {
                    script_id: script.id.clone(),
                    script_name: script.name.clone(),
                    invocation,
                    error,
                }
            }
        });

        Ok(join_all(branches).await)
    }

    async fn execute(&self, script: &ScriptDefinition, inputs: ScriptInputs) -> LogicOutcome {
        let missing = script.missing_inputs(&inputs);
        if !missing.is_empty() {
            return LogicOutcome::Failed(format!("Missing required inputs: {}", missing.join(", ")));
        }

        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| script.logic().invoke(inputs))) {
            Ok(future) => future,
            Err(payload) => {
                return LogicOutcome::Failed(format!("logic panicked: {}", panic_message(payload.as_ref())))
            }
        };
        let guarded = AssertUnwindSafe(future).catch_unwind();

        let completed = match self.logic_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(completed) => completed,
                Err(_) => {
                    return LogicOutcome::Failed(format!("timed out after {}ms", limit.as_millis()))
                }
            },
            None => guarded.await,
        };

        let output = match completed {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return LogicOutcome::Failed(e.to_string()),
            Err(payload) => {
                return LogicOutcome::Failed(format!("logic panicked: {}", panic_message(payload.as_ref())))
            }
        };

        let message = match std::panic::catch_unwind(AssertUnwindSafe(|| script.voice(&output))) {
            Ok(Some(line)) => line,
            Ok(None) => format!("{} executed", script.name),
            Err(payload) => {
                return LogicOutcome::Failed(format!(
                    "voice line panicked: {}",
                    panic_message(payload.as_ref())
                ))
            }
        };

        LogicOutcome::Completed { output, message }
    }

    fn record(
        &self,
        pending: PendingAudit,
        verdict: Verdict,
        message: impl Into<String>,
        output: Option<Value>,
        provenance_verified: bool,
    ) -> Invocation {
        let message = message.into();
        let audit = pending.finish(verdict.clone(), message.clone(), output.clone(), provenance_verified);
        self.audit.append(audit.clone());
        Invocation {
            verdict,
            output,
            message,
            audit,
        }
    }
}

impl Default for CovenantEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
