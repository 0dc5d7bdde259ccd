//! Weighted-term resonance scoring of a script's declared logic body.
//!
//! Each covenant term contributes `weight × occurrences`. The raw sum is
//! mapped onto [0, 1] with `1 - exp(-raw / scale)`, so a body that mentions
//! nothing from the covenant sits at 0, supportive terms push it toward 1,
//! and negative terms (dynamic evaluation and friends) drag it back down.

use serde::{Deserialize, Serialize};

use crate::trust_scorer::{normalize_score, TrustAssessment};

/// One row of the covenant table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovenantTerm {
    pub term: String,
    pub weight: f64,
    pub scripture: String,
}

impl CovenantTerm {
    pub fn new(term: &str, weight: f64, scripture: &str) -> Self {
        Self {
            term: term.to_string(),
            weight,
            scripture: scripture.to_string(),
        }
    }
}

/// The built-in covenant table.
pub fn default_codex() -> Vec<CovenantTerm> {
    vec![
        CovenantTerm::new("soulprint", 2.5, "Identity is the first truth."),
        CovenantTerm::new("covenant", 3.0, "The pact binds all logic."),
        CovenantTerm::new("resonance", 1.5, "Alignment with the core vibrates through the Grid."),
        CovenantTerm::new("MoScript", 2.0, "Truth sealed in executable form."),
        CovenantTerm::new("import", 1.0, "Knowledge from the outside must be declared."),
        CovenantTerm::new("execute", 0.5, "Action follows will."),
        CovenantTerm::new("eval", -10.0, "Unbound execution is a path to chaos."),
        CovenantTerm::new("dangerously", -5.0, "Risk must be named and acknowledged."),
    ]
}

pub const DEFAULT_SCALE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermMatch {
    pub term: String,
    pub weight: f64,
    pub occurrences: usize,
}

impl TermMatch {
    fn contribution(&self) -> f64 {
        self.weight * self.occurrences as f64
    }
}

/// Full resonance reading of a text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResonanceReading {
    pub raw: f64,
    pub score: f64,
    /// Matched terms, in codex order.
    pub matches: Vec<TermMatch>,
    /// Scripture of the matched term with the largest absolute weight.
    pub scripture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResonanceScorer {
    codex: Vec<CovenantTerm>,
    scale: f64,
}

impl ResonanceScorer {
    pub fn new(codex: Vec<CovenantTerm>, scale: f64) -> Self {
        Self { codex, scale }
    }

    pub fn with_scale(scale: f64) -> Self {
        Self::new(default_codex(), scale)
    }

    pub fn codex(&self) -> &[CovenantTerm] {
        &self.codex
    }

    pub fn read(&self, text: &str) -> ResonanceReading {
        let matches: Vec<TermMatch> = self
            .codex
            .iter()
            .filter(|entry| !entry.term.is_empty())
            .filter_map(|entry| {
                let occurrences = text.matches(entry.term.as_str()).count();
                (occurrences > 0).then(|| TermMatch {
                    term: entry.term.clone(),
                    weight: entry.weight,
                    occurrences,
                })
            })
            .collect();

        let raw = matches
            .iter()
            .map(TermMatch::contribution)
            .fold(0.0, |acc, c| acc + c);
        let score = if raw <= 0.0 || self.scale <= 0.0 {
            0.0
        } else {
            normalize_score(1.0 - (-raw / self.scale).exp())
        };

        let scripture = matches
            .iter()
            .fold(None::<&TermMatch>, |best, candidate| match best {
                Some(b) if b.weight.abs() >= candidate.weight.abs() => Some(b),
                _ => Some(candidate),
            })
            .and_then(|best| self.scripture_of(&best.term));

        ResonanceReading {
            raw,
            score,
            matches,
            scripture,
        }
    }

    /// Scriptures of every codex term present in `text`, in codex order.
    pub fn alignment(&self, text: &str) -> Vec<String> {
        self.codex
            .iter()
            .filter(|entry| !entry.term.is_empty() && text.contains(entry.term.as_str()))
            .map(|entry| entry.scripture.clone())
            .collect()
    }

    pub fn assess(&self, text: &str) -> TrustAssessment {
        let reading = self.read(text);

        let mut tips: Vec<String> = reading
            .matches
            .iter()
            .filter(|m| m.weight < 0.0)
            .map(|m| format!("Remove '{}' from the script body.", m.term))
            .collect();
        if reading.matches.is_empty() {
            tips.push("Reference covenant terms in the script body.".to_string());
        }

        let matched = if reading.matches.is_empty() {
            "none".to_string()
        } else {
            reading
                .matches
                .iter()
                .map(|m| format!("{}x{}", m.term, m.occurrences))
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut parts = vec![format!("raw={}", reading.raw), format!("matches={matched}")];
        if let Some(scripture) = &reading.scripture {
            parts.push(format!("scripture={scripture}"));
        }

        TrustAssessment {
            score: reading.score,
            explanation: parts.join(" | "),
            tips,
        }
    }

    fn scripture_of(&self, term: &str) -> Option<String> {
        self.codex
            .iter()
            .find(|entry| entry.term == term)
            .map(|entry| entry.scripture.clone())
    }
}

impl Default for ResonanceScorer {
    fn default() -> Self {
        Self::new(default_codex(), DEFAULT_SCALE)
    }
}
