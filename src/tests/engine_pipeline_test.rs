use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{json, Value};

use super::test_utils::*;
use crate::engine::{CovenantEngine, ExecutionContext, MESSAGE_DENIED, MESSAGE_RUNTIME_ERROR, MESSAGE_THROTTLED};
use crate::errors::CovenantError;
use crate::policy::{Policy, PolicyThresholds, VerdictStatus};
use crate::provenance;
use crate::script::{ScriptDefinition, ScriptInputs};
use crate::trust_scorer::TrustScorer;

#[tokio::test]
async fn test_lenient_script_always_runs() {
    let engine = CovenantEngine::new();
    let (script, calls) = counting_echo("mo-echo-v1", "onEcho", false);
    engine.register(script).unwrap();

    let result = engine
        .run("mo-echo-v1", sample_inputs(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Denied);
    assert_eq!(result.output, Some(json!({ "value": 7 })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_strict_denied_never_invokes_logic() {
    let engine = CovenantEngine::new();
    let (script, calls) = counting_echo("mo-echo-v1", "onEcho", true);
    engine.register(script).unwrap();

    let result = engine
        .run("mo-echo-v1", sample_inputs(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Denied);
    assert_eq!(result.message, MESSAGE_DENIED);
    assert!(result.output.is_none());
    assert!(result.audit.output.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.get_audit_log().len(), 1);
}

#[tokio::test]
async fn test_strict_script_runs_in_warning_band() {
    // Unsourced, unsigned claim of ordinary length scores 0.45.
    let engine = CovenantEngine::new().with_policy(Policy::new(PolicyThresholds {
        denied_below: 0.4,
        warning_below: 0.5,
    }));
    let (script, calls) = counting_echo("mo-echo-v1", "onEcho", true);
    engine.register(script).unwrap();

    let result = engine
        .run("mo-echo-v1", sample_inputs(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.score, 0.45);
    assert_eq!(result.verdict.status, VerdictStatus::Warning);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result
        .verdict
        .tips
        .contains(&"Attach at least one reputable source.".to_string()));
}

#[tokio::test]
async fn test_approved_run_uses_voice_line() {
    let engine = permissive_engine();
    engine
        .register(constant("mo-constant-v1", "onTick", json!(3)))
        .unwrap();

    let result = engine
        .run("mo-constant-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Approved);
    assert_eq!(result.message, "constant says 3");
    assert_eq!(result.audit.message, "constant says 3");
    assert_eq!(result.audit.output, Some(json!(3)));
}

#[tokio::test]
async fn test_throttled_invocation_is_audited() {
    let engine = tight_engine(1);
    let (script, calls) = counting_echo("mo-echo-v1", "onEcho", false);
    engine.register(script).unwrap();
    let ctx = ExecutionContext::default();

    engine.run("mo-echo-v1", sample_inputs(), &ctx).await.unwrap();
    let throttled = engine.run("mo-echo-v1", sample_inputs(), &ctx).await.unwrap();

    assert_eq!(throttled.verdict.status, VerdictStatus::Denied);
    assert_eq!(throttled.verdict.score, 0.0);
    assert_eq!(throttled.verdict.explanation, "rate-limit");
    assert_eq!(throttled.verdict.tips, vec!["Reduce call frequency.".to_string()]);
    assert_eq!(throttled.message, MESSAGE_THROTTLED);
    assert!(throttled.output.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get_audit_log().len(), 2);
}

#[tokio::test]
async fn test_rate_keys_are_independent() {
    let engine = tight_engine(1);
    engine.register(echo("mo-echo-v1", "onEcho", false)).unwrap();

    let alice = ExecutionContext::new().with_rate_key("user:alice");
    let bob = ExecutionContext::new().with_rate_key("user:bob");

    let first = engine.run("mo-echo-v1", sample_inputs(), &alice).await.unwrap();
    let second = engine.run("mo-echo-v1", sample_inputs(), &bob).await.unwrap();
    let third = engine.run("mo-echo-v1", sample_inputs(), &alice).await.unwrap();

    assert!(first.output.is_some());
    assert!(second.output.is_some());
    assert_eq!(third.verdict.explanation, "rate-limit");
}

#[tokio::test]
async fn test_signed_context_verifies_provenance() {
    let engine = CovenantEngine::new();
    engine.register(echo("mo-echo-v1", "onEcho", false)).unwrap();
    let script = engine.get("mo-echo-v1").unwrap();

    let timestamp = "2026-03-01T12:00:00+00:00";
    let message = provenance::signing_message(&provenance::claim_for(&script), timestamp);
    let signature = provenance::sign(&message, "shared-secret");

    let signed = ExecutionContext::new()
        .with_timestamp(timestamp)
        .with_signature(signature.clone(), "shared-secret");
    let result = engine.run("mo-echo-v1", sample_inputs(), &signed).await.unwrap();
    assert!(result.audit.provenance_verified);
    assert!(result.verdict.explanation.contains("provenance=verified"));
    assert_eq!(result.verdict.score, 0.62);

    let wrong_secret = ExecutionContext::new()
        .with_timestamp(timestamp)
        .with_signature(signature, "other-secret");
    let result = engine.run("mo-echo-v1", sample_inputs(), &wrong_secret).await.unwrap();
    assert!(!result.audit.provenance_verified);
    assert_eq!(result.verdict.score, 0.45);
}

#[tokio::test]
async fn test_logic_error_becomes_runtime_error_verdict() {
    let engine = permissive_engine();
    engine.register(failing("mo-fail-v1", "onFail", "boom")).unwrap();

    let result = engine
        .run("mo-fail-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Denied);
    assert_eq!(result.verdict.explanation, "runtime-error: boom");
    assert!(result.verdict.score <= 0.5);
    assert_eq!(result.message, MESSAGE_RUNTIME_ERROR);
    assert!(result.output.is_none());
    assert_eq!(engine.get_audit_log().len(), 1);
}

#[tokio::test]
async fn test_missing_inputs_skip_logic() {
    let engine = CovenantEngine::new();
    let script = ScriptDefinition::builder("mo-sum-v1", "Sum", "onSum")
        .inputs(["a", "b"])
        .sync_logic(|_| panic!("logic must not run"))
        .build()
        .unwrap();
    engine.register(script).unwrap();

    let result = engine
        .run("mo-sum-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(
        result.verdict.explanation,
        "runtime-error: Missing required inputs: a, b"
    );
}

#[tokio::test]
async fn test_panicking_logic_is_contained() {
    let engine = CovenantEngine::new();
    let script = ScriptDefinition::builder("mo-panic-v1", "Panic", "onPanic")
        .sync_logic(|_| panic!("kaboom"))
        .build()
        .unwrap();
    engine.register(script).unwrap();

    let result = engine
        .run("mo-panic-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.explanation, "runtime-error: logic panicked: kaboom");
    assert_eq!(engine.get_audit_log().len(), 1);
}

#[tokio::test]
async fn test_slow_logic_times_out() {
    let engine = CovenantEngine::new().with_logic_timeout(Some(Duration::from_millis(20)));
    let script = ScriptDefinition::builder("mo-slow-v1", "Slow", "onSlow")
        .logic(|_inputs: ScriptInputs| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(Value::Null)
        })
        .build()
        .unwrap();
    engine.register(script).unwrap();

    let result = engine
        .run("mo-slow-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.explanation, "runtime-error: timed out after 20ms");
    assert!(result.output.is_none());
}

#[tokio::test]
async fn test_blocking_sync_logic_times_out() {
    let engine = CovenantEngine::new().with_logic_timeout(Some(Duration::from_millis(20)));
    let script = ScriptDefinition::builder("mo-sleepy-v1", "Sleepy", "onSlow")
        .sync_logic(|_| {
            std::thread::sleep(Duration::from_millis(400));
            Ok(json!("done"))
        })
        .build()
        .unwrap();
    engine.register(script).unwrap();

    let started = std::time::Instant::now();
    let result = engine
        .run("mo-sleepy-v1", ScriptInputs::new(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.explanation, "runtime-error: timed out after 20ms");
    assert!(result.output.is_none());
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn test_resonance_scorer_reads_script_source() {
    let engine = CovenantEngine::new().with_scorer(TrustScorer::resonance());
    let aligned = ScriptDefinition::builder("mo-aligned-v1", "Aligned", "onAlign")
        .strict_scan(true)
        .source("covenant covenant MoScript soulprint")
        .sync_logic(|_| Ok(json!("aligned")))
        .build()
        .unwrap();
    let risky = ScriptDefinition::builder("mo-risky-v1", "Risky", "onAlign")
        .strict_scan(true)
        .source("dangerously skip checks")
        .sync_logic(|_| Ok(json!("risky")))
        .build()
        .unwrap();
    engine.register(aligned).unwrap();
    engine.register(risky).unwrap();

    let ctx = ExecutionContext::default();
    let aligned = engine.run("mo-aligned-v1", ScriptInputs::new(), &ctx).await.unwrap();
    assert_eq!(aligned.verdict.status, VerdictStatus::Approved);
    assert_eq!(aligned.output, Some(json!("aligned")));

    let risky = engine.run("mo-risky-v1", ScriptInputs::new(), &ctx).await.unwrap();
    assert_eq!(risky.verdict.status, VerdictStatus::Denied);
    assert_eq!(risky.verdict.score, 0.0);
    assert_eq!(risky.message, MESSAGE_DENIED);
}

#[tokio::test]
async fn test_audit_grows_by_one_per_run() {
    let engine = tight_engine(2);
    engine.register(echo("mo-echo-v1", "onEcho", true)).unwrap();
    engine.register(failing("mo-fail-v1", "onFail", "nope")).unwrap();
    let ctx = ExecutionContext::default();

    let mut expected = 0;
    for id in ["mo-echo-v1", "mo-fail-v1", "mo-echo-v1", "mo-echo-v1"] {
        engine.run(id, ScriptInputs::new(), &ctx).await.unwrap();
        expected += 1;
        assert_eq!(engine.get_audit_log().len(), expected);
    }

    assert!(matches!(
        engine.run("mo-ghost-v1", ScriptInputs::new(), &ctx).await,
        Err(CovenantError::UnknownId { .. })
    ));
    assert_eq!(engine.get_audit_log().len(), expected);
    assert_eq!(engine.audit().for_script("mo-echo-v1").len(), 3);
    assert_eq!(engine.clear_audit_log(), expected);
}
