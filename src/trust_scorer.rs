use serde::{Deserialize, Serialize};

use crate::resonance::ResonanceScorer;
use crate::truth_filter::{TruthFilter, TruthInput};

/// Outcome of a trust heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Always within [0, 1].
    pub score: f64,
    pub explanation: String,
    pub tips: Vec<String>,
}

/// Which heuristic backs an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    #[default]
    Linguistic,
    Resonance,
}

/// Everything either heuristic may read about an invocation.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub claim: &'a str,
    pub evidence: &'a [String],
    pub provenance_verified: bool,
    pub topic: &'a str,
    /// Declared logic body of the script being invoked.
    pub source: &'a str,
}

/// The trust heuristic selected for an engine instance.
#[derive(Debug, Clone)]
pub enum TrustScorer {
    Linguistic(TruthFilter),
    Resonance(ResonanceScorer),
}

impl TrustScorer {
    pub fn linguistic() -> Self {
        Self::Linguistic(TruthFilter)
    }

    pub fn resonance() -> Self {
        Self::Resonance(ResonanceScorer::default())
    }

    pub fn kind(&self) -> ScorerKind {
        match self {
            Self::Linguistic(_) => ScorerKind::Linguistic,
            Self::Resonance(_) => ScorerKind::Resonance,
        }
    }

    pub fn assess(&self, request: &ScoringRequest<'_>) -> TrustAssessment {
        match self {
            Self::Linguistic(filter) => filter.evaluate(&TruthInput {
                claim: request.claim,
                evidence: request.evidence,
                provenance_verified: request.provenance_verified,
                topic: request.topic,
            }),
            Self::Resonance(scorer) => scorer.assess(request.source),
        }
    }
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::linguistic()
    }
}

/// Clamp to [0, 1] and drop floating-point noise from the additive steps.
pub(crate) fn normalize_score(score: f64) -> f64 {
    let clamped = score.clamp(0.0, 1.0);
    (clamped * 10_000.0).round() / 10_000.0
}
