//! Library root for the `moscript_covenant` crate
//! Covenant-gated registry and execution engine for MoScripts

// Core error handling
pub mod errors;

// Script definitions & registry
pub mod registry;
pub mod script;
pub mod validator;

// Trust & covenant
pub mod policy;
pub mod provenance;
pub mod resonance;
pub mod trust_scorer;
pub mod truth_filter;

// Security protections
pub mod rate_limiter;

// Audit trail
pub mod audit;

// Execution
pub mod engine;

// Built-in scripts
pub mod logistics;

// Configuration & CLI
pub mod cli;
pub mod config_loader;

// Logging
pub mod log_sink;

#[cfg(test)]
mod tests {
    pub mod engine_pipeline_test;
    pub mod trigger_fanout_test;
    pub mod test_utils;
}

pub use audit::{AuditLog, AuditRecord, Verdict};
pub use config_loader::EngineConfig;
pub use engine::{CovenantEngine, ExecutionContext, Invocation, TriggerOutcome};
pub use errors::{CovenantError, CovenantResult};
pub use policy::VerdictStatus;
pub use registry::ScriptRegistry;
pub use script::{ScriptDefinition, ScriptInputs};
