// audit.rs - Verdicts and the append-only audit trail of script invocations

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{CovenantError, CovenantResult};
use crate::policy::VerdictStatus;
use crate::trust_scorer::TrustAssessment;

pub const RATE_LIMIT_EXPLANATION: &str = "rate-limit";
pub const RUNTIME_ERROR_PREFIX: &str = "runtime-error: ";
/// Ceiling applied to the assessed score when logic fails.
pub const RUNTIME_ERROR_SCORE_CAP: f64 = 0.5;

/// Severity levels for structured log classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Covenant decision attached to an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub status: VerdictStatus,
    pub score: f64,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tips: Vec<String>,
}

impl Verdict {
    pub fn from_assessment(status: VerdictStatus, assessment: &TrustAssessment) -> Self {
        Self {
            status,
            score: assessment.score,
            explanation: assessment.explanation.clone(),
            tips: assessment.tips.clone(),
        }
    }

    /// Verdict for a call rejected by the rate limiter.
    pub fn throttled() -> Self {
        Self {
            status: VerdictStatus::Denied,
            score: 0.0,
            explanation: RATE_LIMIT_EXPLANATION.to_string(),
            tips: vec!["Reduce call frequency.".to_string()],
        }
    }

    /// Verdict for logic that failed after admission.
    pub fn runtime_error(assessed_score: f64, message: &str) -> Self {
        Self {
            status: VerdictStatus::Denied,
            score: assessed_score.min(RUNTIME_ERROR_SCORE_CAP),
            explanation: format!("{RUNTIME_ERROR_PREFIX}{message}"),
            tips: Vec::new(),
        }
    }

    pub fn is_runtime_error(&self) -> bool {
        self.explanation.starts_with(RUNTIME_ERROR_PREFIX)
    }

    pub fn severity(&self) -> LogLevel {
        if self.is_runtime_error() {
            LogLevel::Error
        } else {
            match self.status {
                VerdictStatus::Approved => LogLevel::Info,
                VerdictStatus::Warning | VerdictStatus::Denied => LogLevel::Warn,
            }
        }
    }
}

/// One invocation attempt and its outcome. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: String,
    pub script_id: String,
    pub trigger: String,
    pub verdict: Verdict,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub provenance_verified: bool,
}

/// Start of an invocation, completed into an [`AuditRecord`] exactly once.
#[derive(Debug)]
pub struct PendingAudit {
    script_id: String,
    trigger: String,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl PendingAudit {
    pub fn begin(script_id: &str, trigger: &str) -> Self {
        Self {
            script_id: script_id.to_string(),
            trigger: trigger.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn finish(
        self,
        verdict: Verdict,
        message: impl Into<String>,
        output: Option<Value>,
        provenance_verified: bool,
    ) -> AuditRecord {
        AuditRecord {
            record_id: Uuid::new_v4().to_string(),
            script_id: self.script_id,
            trigger: self.trigger,
            verdict,
            message: message.into(),
            output,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            provenance_verified,
        }
    }
}

/// In-memory, append-only audit trail
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds whole records: each push is a single
    // operation, so the trail stays usable.
    fn guard(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record and emit it as a structured log event.
    pub fn append(&self, record: AuditRecord) {
        match record.verdict.severity() {
            LogLevel::Info => info!(
                target: "moscript::audit",
                record_id = %record.record_id,
                script_id = %record.script_id,
                status = %record.verdict.status,
                score = record.verdict.score,
                duration_ms = record.duration_ms,
                "{}", record.message
            ),
            LogLevel::Warn => warn!(
                target: "moscript::audit",
                record_id = %record.record_id,
                script_id = %record.script_id,
                status = %record.verdict.status,
                score = record.verdict.score,
                explanation = %record.verdict.explanation,
                "{}", record.message
            ),
            LogLevel::Error => error!(
                target: "moscript::audit",
                record_id = %record.record_id,
                script_id = %record.script_id,
                explanation = %record.verdict.explanation,
                "{}", record.message
            ),
        }

        self.guard().push(record);
    }

    /// Snapshot of every record, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.guard().clone()
    }

    pub fn for_script(&self, script_id: &str) -> Vec<AuditRecord> {
        self.guard()
            .iter()
            .filter(|record| record.script_id == script_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut records = self.guard();
        let count = records.len();
        records.clear();
        count
    }

    /// Export as newline-delimited JSON.
    pub fn to_json_lines(&self) -> CovenantResult<String> {
        let records = self.guard();
        let mut out = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| CovenantError::serialization("audit export", e))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}
