//! Linguistic and evidence heuristic ("truth filter").
//!
//! Starts from 0.50 and applies independent additive adjustments for claim
//! shape, attached evidence, provenance and topic sensitivity. Every penalty
//! that has a remedy contributes a tip.

use lazy_static::lazy_static;
use regex::Regex;

use crate::trust_scorer::{normalize_score, TrustAssessment};

lazy_static! {
    static ref URL_PATTERN: Regex = Regex::new(r"(?i)^https?://").unwrap();
    static ref DRAMATIC_PUNCTUATION: Regex = Regex::new(r"[!?]{3,}").unwrap();
    static ref HIGH_STAKES_TOPIC: Regex = Regex::new(r"health|finance|politics|security").unwrap();
}

const BASE_SCORE: f64 = 0.50;

pub const TIP_MORE_CONTEXT: &str = "Add more context.";
pub const TIP_ALL_CAPS: &str = "Avoid excessive ALL CAPS.";
pub const TIP_PUNCTUATION: &str = "Reduce dramatic punctuation.";
pub const TIP_ATTACH_SOURCE: &str = "Attach at least one reputable source.";
pub const TIP_SIGN_PROVENANCE: &str = "Include a signed provenance header.";
pub const TIP_HIGH_STAKES: &str = "High-stakes topics need multiple independent sources.";

/// Inputs of the truth filter
#[derive(Debug, Clone, Copy)]
pub struct TruthInput<'a> {
    pub claim: &'a str,
    /// URLs and free-text notes.
    pub evidence: &'a [String],
    pub provenance_verified: bool,
    /// May be empty.
    pub topic: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TruthFilter;

impl TruthFilter {
    pub fn evaluate(&self, input: &TruthInput<'_>) -> TrustAssessment {
        let claim = input.claim.trim();
        let topic = input.topic.to_lowercase();
        let mut score = BASE_SCORE;
        let mut tips = Vec::new();

        // Linguistic sanity
        let length = claim.chars().count();
        let upper = claim.chars().filter(|c| c.is_ascii_uppercase()).count();
        let caps_ratio = upper as f64 / length.max(1) as f64;

        if length >= 80 {
            score += 0.10;
        }
        if length < 20 {
            score -= 0.10;
            tips.push(TIP_MORE_CONTEXT.to_string());
        }
        if caps_ratio > 0.30 {
            score -= 0.10;
            tips.push(TIP_ALL_CAPS.to_string());
        }
        if DRAMATIC_PUNCTUATION.is_match(claim) {
            score -= 0.05;
            tips.push(TIP_PUNCTUATION.to_string());
        }

        // Evidence
        let url_count = input
            .evidence
            .iter()
            .filter(|entry| URL_PATTERN.is_match(entry))
            .count();
        let other_count = input.evidence.len() - url_count;
        if url_count >= 1 {
            score += 0.15;
        }
        if url_count >= 2 {
            score += 0.05;
        }
        if other_count >= 1 {
            score += 0.05;
        }
        if input.evidence.is_empty() {
            tips.push(TIP_ATTACH_SOURCE.to_string());
        }

        // Provenance
        if input.provenance_verified {
            score += 0.12;
        } else {
            score -= 0.05;
            tips.push(TIP_SIGN_PROVENANCE.to_string());
        }

        // Topic caution
        if HIGH_STAKES_TOPIC.is_match(&topic) {
            score -= 0.05;
            if url_count < 2 {
                tips.push(TIP_HIGH_STAKES.to_string());
            }
        }

        let mut parts = vec![
            format!("len={length}"),
            format!("evidence(urls={url_count}, other={other_count})"),
            format!(
                "provenance={}",
                if input.provenance_verified { "verified" } else { "unverified" }
            ),
        ];
        if !topic.is_empty() {
            parts.push(format!("topic={topic}"));
        }

        TrustAssessment {
            score: normalize_score(score),
            explanation: parts.join(" | "),
            tips,
        }
    }
}
