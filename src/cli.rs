use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use crate::config_loader::{load_config, load_config_from, EngineConfig};
use crate::engine::{CovenantEngine, ExecutionContext};
use crate::logistics::builtin_scripts;
use crate::provenance;
use crate::resonance::ResonanceScorer;
use crate::script::ScriptInputs;
use crate::validator::ScriptValidator;

/// Top-level CLI interface for the covenant engine
#[derive(Parser)]
#[command(
    name = "moscript",
    version,
    about = "Covenant-gated MoScript execution engine"
)]
pub struct Cli {
    /// Configuration file (defaults to ./moscript.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the audit trail as JSON lines after the command
    #[arg(long, global = true)]
    pub audit: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Execution context flags shared by `run` and `trigger`
#[derive(Args, Debug, Default)]
pub struct ContextArgs {
    /// Rate-limit bucket key (defaults to script:<id>)
    #[arg(long)]
    pub rate_key: Option<String>,
    /// Evidence entry (URL or note); repeatable
    #[arg(long)]
    pub evidence: Vec<String>,
    #[arg(long)]
    pub topic: Option<String>,
    /// RFC 3339 timestamp covered by the signature
    #[arg(long)]
    pub timestamp: Option<String>,
    /// Base64 HMAC-SHA256 provenance signature
    #[arg(long)]
    pub signature: Option<String>,
    #[arg(long)]
    pub secret: Option<String>,
}

impl ContextArgs {
    pub fn to_context(&self) -> ExecutionContext {
        ExecutionContext {
            rate_key: self.rate_key.clone(),
            evidence: self.evidence.clone(),
            topic: self.topic.clone(),
            timestamp: self.timestamp.clone(),
            signature: self.signature.clone(),
            secret: self.secret.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered scripts and triggers
    List,

    /// Run one script by id
    Run {
        #[arg(long)]
        id: String,
        /// Inputs as a JSON object
        #[arg(short, long, default_value = "{}")]
        inputs: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Fan a trigger out to every script registered for it
    Trigger {
        #[arg(long)]
        name: String,
        #[arg(short, long, default_value = "{}")]
        inputs: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Produce a provenance signature for a script invocation
    Sign {
        #[arg(long)]
        id: String,
        #[arg(long)]
        secret: String,
        /// RFC 3339 timestamp to sign (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Check a logic body for forbidden constructs and covenant resonance
    Lint {
        /// Logic body text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        source: Option<String>,
        /// File holding the logic body
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub fn load_engine_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Engine with every built-in script registered.
pub fn build_engine(config: &EngineConfig) -> Result<CovenantEngine> {
    let engine = CovenantEngine::from_config(config)?;
    engine.registry().register_all(builtin_scripts()?)?;
    Ok(engine)
}

fn parse_inputs(raw: &str) -> Result<ScriptInputs> {
    match serde_json::from_str::<Value>(raw).context("--inputs is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--inputs must be a JSON object, got {other}"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn dispatch(cli: Cli, config: &EngineConfig) -> Result<()> {
    let engine = build_engine(config)?;

    match &cli.command {
        Commands::List => {
            let scripts: Vec<Value> = engine
                .list()?
                .iter()
                .map(|script| {
                    json!({
                        "id": script.id,
                        "name": script.name,
                        "trigger": script.trigger,
                        "inputs": script.inputs,
                        "strictScan": script.strict_scan,
                        "voiced": script.has_voice_line(),
                    })
                })
                .collect();
            print_json(&json!({
                "scripts": scripts,
                "triggers": engine.registry().triggers()?,
                "scorer": engine.scorer().kind(),
                "stats": engine.registry().stats()?,
            }))?;
        }
        Commands::Run { id, inputs, context } => {
            let inputs = parse_inputs(inputs)?;
            let invocation = engine.run(id, inputs, &context.to_context()).await?;
            print_json(&invocation)?;
        }
        Commands::Trigger { name, inputs, context } => {
            let inputs = parse_inputs(inputs)?;
            let outcomes = engine
                .run_trigger_with(name, inputs, &context.to_context())
                .await?;
            print_json(&outcomes)?;
        }
        Commands::Sign { id, secret, timestamp } => {
            let script = engine.get(id)?;
            let claim = provenance::claim_for(&script);
            let timestamp = timestamp.clone().unwrap_or_else(|| Utc::now().to_rfc3339());
            let signature = provenance::sign(&provenance::signing_message(&claim, &timestamp), secret);
            print_json(&json!({
                "claim": claim,
                "timestamp": timestamp,
                "signature": signature,
            }))?;
        }
        Commands::Lint { source, file } => {
            let source = match (source, file) {
                (Some(text), _) => text.clone(),
                (None, Some(file)) => std::fs::read_to_string(file)
                    .with_context(|| format!("reading {}", file.display()))?,
                (None, None) => anyhow::bail!("lint needs --source or --file"),
            };
            let reading = ResonanceScorer::with_scale(config.resonance_scale).read(&source);
            print_json(&json!({
                "forbidden": ScriptValidator::forbidden_construct(&source),
                "resonance": reading,
            }))?;
        }
    }

    if cli.audit {
        print!("{}", engine.audit().to_json_lines()?);
    }

    Ok(())
}
