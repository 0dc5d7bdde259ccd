use crate::errors::{CovenantError, CovenantResult};
use crate::script::ScriptDefinition;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref ID_PATTERN: Regex = Regex::new(r"^mo-[a-z0-9]+(?:-[a-z0-9]+)*-v\d+$").unwrap();

    /// Constructs a declared logic body must not reference: dynamic evaluation,
    /// process spawning and direct shell execution. Each entry pairs the
    /// reported label with its pattern.
    static ref FORBIDDEN_CONSTRUCTS: Vec<(&'static str, Regex)> = [
        ("eval(", r"\beval\s*\("),
        ("Function(", r"\bFunction\s*\("),
        ("child_process", r"child_process"),
        ("process.exec", r"process\.exec\b"),
        ("std::process::Command", r"std::process::Command\b"),
        ("Command::new(", r"\bCommand::new\s*\("),
        ("libc::system", r"libc::system\b"),
        ("/bin/sh", r"/bin/sh\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).unwrap()))
    .collect();
}

/// Structural gatekeeper run before a script may enter a registry.
pub struct ScriptValidator;

impl ScriptValidator {
    /// Validate a single script, short-circuiting on the first failed rule.
    pub fn validate(script: &ScriptDefinition) -> CovenantResult<()> {
        if script.id.is_empty() || !script.id.starts_with("mo-") {
            return Err(CovenantError::validation(
                "id",
                format!(
                    "Invalid MoScript ID: \"{}\". Must be a string starting with \"mo-\".",
                    script.id
                ),
            ));
        }

        if !ID_PATTERN.is_match(&script.id) {
            return Err(CovenantError::validation(
                "id",
                format!(
                    "MoScript ID does not match pattern 'mo-<name>-v<number>': \"{}\"",
                    script.id
                ),
            ));
        }

        if script.name.is_empty() {
            return Err(CovenantError::validation(
                "name",
                format!("Invalid MoScript Name for ID \"{}\". Must be a non-empty string.", script.id),
            ));
        }

        if script.trigger.is_empty() {
            return Err(CovenantError::validation(
                "trigger",
                format!("Invalid MoScript Trigger for ID \"{}\". Must be a non-empty string.", script.id),
            ));
        }

        if let Some(construct) = Self::forbidden_construct(&script.source) {
            return Err(CovenantError::validation(
                "logic",
                format!(
                    "Logic for \"{}\" contains forbidden constructs: {construct}",
                    script.id
                ),
            ));
        }

        Ok(())
    }

    /// Validate a batch, additionally rejecting ids repeated within it.
    pub fn validate_all(scripts: &[ScriptDefinition]) -> CovenantResult<()> {
        let mut seen = HashSet::new();
        for script in scripts {
            Self::validate(script)?;
            if !seen.insert(script.id.as_str()) {
                return Err(CovenantError::duplicate_id(script.id.clone()));
            }
        }
        Ok(())
    }

    /// First deny-listed construct found in `source`, if any.
    pub fn forbidden_construct(source: &str) -> Option<&'static str> {
        FORBIDDEN_CONSTRUCTS
            .iter()
            .find(|(_, pattern)| pattern.is_match(source))
            .map(|(label, _)| *label)
    }

    pub fn is_valid_id(id: &str) -> bool {
        ID_PATTERN.is_match(id)
    }
}
