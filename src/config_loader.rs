use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::errors::{CovenantError, CovenantResult};
use crate::policy::PolicyThresholds;
use crate::rate_limiter::RateLimitConfig;
use crate::resonance::DEFAULT_SCALE;
use crate::trust_scorer::ScorerKind;

pub const DEFAULT_CONFIG_FILE: &str = "moscript.toml";
pub const ENV_PREFIX: &str = "MOSCRIPT_";

/// Engine configuration.
///
/// Layered as: built-in defaults, then `moscript.toml`, then
/// `MOSCRIPT_*` environment variables (`MOSCRIPT_RATE_LIMIT__CAPACITY=5`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub policy: PolicyThresholds,
    #[serde(default)]
    pub scorer: ScorerKind,
    #[serde(default = "default_resonance_scale")]
    pub resonance_scale: f64,
    /// Upper bound on a single logic call; unbounded when unset.
    #[serde(default)]
    pub logic_timeout_ms: Option<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_resonance_scale() -> f64 {
    DEFAULT_SCALE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            policy: PolicyThresholds::default(),
            scorer: ScorerKind::default(),
            resonance_scale: default_resonance_scale(),
            logic_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn logic_timeout(&self) -> Option<Duration> {
        self.logic_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> CovenantResult<()> {
        if self.rate_limit.capacity == 0 {
            return Err(CovenantError::config("rate_limit.capacity must be at least 1"));
        }
        if !self.rate_limit.refill_per_second.is_finite() || self.rate_limit.refill_per_second <= 0.0 {
            return Err(CovenantError::config(
                "rate_limit.refill_per_second must be a positive number",
            ));
        }
        self.policy.validate()?;
        if !self.resonance_scale.is_finite() || self.resonance_scale <= 0.0 {
            return Err(CovenantError::config("resonance_scale must be a positive number"));
        }
        if self.logic_timeout_ms == Some(0) {
            return Err(CovenantError::config("logic_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn figment_for(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(EngineConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load from `moscript.toml` in the working directory plus the environment.
pub fn load_config() -> CovenantResult<EngineConfig> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Load from an explicit TOML file plus the environment. A missing file
/// falls back to defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> CovenantResult<EngineConfig> {
    let config: EngineConfig = figment_for(path.as_ref()).extract()?;
    config.validate()?;
    Ok(config)
}
