use moscript_covenant::cli::build_engine;
use moscript_covenant::config_loader::EngineConfig;
use moscript_covenant::logistics::{COST_SAVER_ID, FWD_EFFICIENCY_ID};
use moscript_covenant::provenance;
use moscript_covenant::trust_scorer::ScorerKind;
use moscript_covenant::{
    CovenantEngine, CovenantError, ExecutionContext, ScriptDefinition, ScriptInputs, VerdictStatus,
};
use serde_json::{json, Value};

fn inputs(value: Value) -> ScriptInputs {
    value.as_object().cloned().unwrap_or_default()
}

fn resonance_engine() -> CovenantEngine {
    let config = EngineConfig {
        scorer: ScorerKind::Resonance,
        ..EngineConfig::default()
    };
    build_engine(&config).unwrap()
}

fn forwarder_inputs() -> ScriptInputs {
    inputs(json!({
        "shipmentData": [
            { "forwarder": "Kestrel", "deliveryTime": 3.0, "cost": 120.0, "onTime": true, "route": "MBA-DXB" },
            { "forwarder": "Kestrel", "deliveryTime": 4.0, "cost": 110.0, "onTime": true, "route": "MBA-DXB" },
            { "forwarder": "Tortoise", "deliveryTime": 12.0, "cost": 300.0, "onTime": false, "route": "MBA-DXB" }
        ]
    }))
}

#[test]
fn rejects_malformed_ids() {
    let engine = CovenantEngine::new();
    let script = ScriptDefinition::builder("bad_id", "Bad", "onBad")
        .sync_logic(|_| Ok(Value::Null))
        .build()
        .unwrap();

    let err = engine.register(script).unwrap_err();
    assert!(err.is_validation());
    assert!(engine.list().unwrap().is_empty());
}

#[test]
fn rejects_duplicate_registration() {
    let engine = CovenantEngine::new();
    let make = || {
        ScriptDefinition::builder("mo-echo-v1", "Echo", "onEcho")
            .sync_logic(|inputs| Ok(Value::Object(inputs)))
            .build()
            .unwrap()
    };

    engine.register(make()).unwrap();
    let err = engine.register(make()).unwrap_err();
    assert!(matches!(err, CovenantError::DuplicateId { ref id } if id == "mo-echo-v1"));
    assert_eq!(engine.list().unwrap().len(), 1);
}

#[tokio::test]
async fn strict_builtin_is_denied_under_default_policy() {
    let engine = build_engine(&EngineConfig::default()).unwrap();

    let result = engine
        .run(FWD_EFFICIENCY_ID, forwarder_inputs(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Denied);
    assert_eq!(result.message, "Denied by covenant");
    assert!(result.output.is_none());
}

#[tokio::test]
async fn forwarder_ranking_runs_under_resonance() {
    let engine = resonance_engine();

    let result = engine
        .run(FWD_EFFICIENCY_ID, forwarder_inputs(), &ExecutionContext::default())
        .await
        .unwrap();

    assert_eq!(result.verdict.status, VerdictStatus::Approved);
    let output = result.output.unwrap();
    assert_eq!(output["top"]["name"], "Kestrel");
    assert_eq!(output["rankings"].as_array().unwrap().len(), 2);
    assert!(result.message.contains("Kestrel leads the pack"));
    assert!(result.message.contains("100.0% on-time"));
}

#[tokio::test]
async fn cost_saver_trigger_reports_savings() {
    let engine = resonance_engine();
    let data = inputs(json!({
        "shipmentData": [
            { "route": "SHA-MBA", "method": "air", "cost": 900.0, "weight": 40.0 },
            { "route": "SHA-MBA", "method": "air", "cost": 1100.0, "weight": 40.0 }
        ],
        "historical": [
            { "route": "SHA-MBA", "method": "sea", "cost": 250.0, "weight": 40.0 }
        ]
    }));

    let outcomes = engine.run_trigger("onMonthlyTrendUpdate", data).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].script_id, COST_SAVER_ID);

    let invocation = outcomes[0].invocation.as_ref().unwrap();
    let output = invocation.output.as_ref().unwrap();
    assert_eq!(output[0]["suggestedMethod"], "sea");
    assert_eq!(output[0]["potentialSavings"], 750.0);
    assert!(invocation.message.starts_with("Ka-ching! A 75% drop spotted on SHA-MBA"));
}

#[tokio::test]
async fn cost_saver_requires_historical_input() {
    let engine = resonance_engine();
    let data = inputs(json!({ "shipmentData": [] }));

    let outcomes = engine.run_trigger("onMonthlyTrendUpdate", data).await.unwrap();
    assert_eq!(
        outcomes[0].error.as_deref(),
        Some("Missing required inputs: historical")
    );
}

#[tokio::test]
async fn empty_forwarder_data_is_a_runtime_error() {
    let engine = resonance_engine();
    let result = engine
        .run(
            FWD_EFFICIENCY_ID,
            inputs(json!({ "shipmentData": [] })),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();

    assert!(result.verdict.is_runtime_error());
    assert_eq!(engine.get_audit_log().len(), 1);
}

#[tokio::test]
async fn signed_invocation_is_marked_verified_in_audit() {
    let engine = build_engine(&EngineConfig::default()).unwrap();
    let script = engine.get(COST_SAVER_ID).unwrap();
    let timestamp = "2026-06-30T08:00:00+00:00";
    let signature = provenance::sign(
        &provenance::signing_message(&provenance::claim_for(&script), timestamp),
        "grid-secret",
    );

    let ctx = ExecutionContext::new()
        .with_timestamp(timestamp)
        .with_signature(signature, "grid-secret");
    let result = engine
        .run(COST_SAVER_ID, inputs(json!({ "shipmentData": [], "historical": null })), &ctx)
        .await
        .unwrap();

    assert!(result.audit.provenance_verified);
    let exported = engine.audit().to_json_lines().unwrap();
    assert!(exported.contains("\"provenanceVerified\":true"));
}
