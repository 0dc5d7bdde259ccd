use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CovenantError, CovenantResult};

/// Covenant status bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Approved,
    Warning,
    Denied,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Approved => "approved",
            VerdictStatus::Warning => "warning",
            VerdictStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score thresholds mapping a trust score to a status.
///
/// `score < denied_below` is denied, `score < warning_below` is a warning,
/// anything else is approved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    pub denied_below: f64,
    pub warning_below: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            denied_below: 0.92,
            warning_below: 0.95,
        }
    }
}

impl PolicyThresholds {
    pub fn validate(&self) -> CovenantResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.denied_below) || !in_range(self.warning_below) {
            return Err(CovenantError::config("policy thresholds must lie within [0, 1]"));
        }
        if self.denied_below > self.warning_below {
            return Err(CovenantError::config(
                "policy.denied_below must not exceed policy.warning_below",
            ));
        }
        Ok(())
    }
}

/// Deterministic score-to-status policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    thresholds: PolicyThresholds,
}

impl Policy {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    pub fn decide(&self, score: f64) -> VerdictStatus {
        if score.is_nan() || score < self.thresholds.denied_below {
            VerdictStatus::Denied
        } else if score < self.thresholds.warning_below {
            VerdictStatus::Warning
        } else {
            VerdictStatus::Approved
        }
    }

    /// Whether a script may run given its status and strict-scan flag.
    pub fn permits(&self, status: VerdictStatus, strict_scan: bool) -> bool {
        !(strict_scan && status == VerdictStatus::Denied)
    }
}
