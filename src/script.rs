//! Script definitions: named, triggerable logic units gated by the covenant.
//!
//! A script's logic is a capability handed to the engine at registration
//! time. The engine only ever dispatches to handlers it has looked up by id;
//! it never evaluates injected code. Because a compiled closure carries no
//! source text, each definition declares the text of its logic body in
//! `source`, which the validator lints and the resonance scorer reads.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::{CovenantError, CovenantResult};

/// Named inputs handed to a script's logic.
pub type ScriptInputs = serde_json::Map<String, Value>;

/// Future returned by a script's logic.
pub type LogicFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Formats a logic result into a human-readable line.
pub type VoiceLine = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Executable body of a script.
pub trait ScriptLogic: Send + Sync {
    fn invoke(&self, inputs: ScriptInputs) -> LogicFuture;
}

impl<F, Fut> ScriptLogic for F
where
    F: Fn(ScriptInputs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn invoke(&self, inputs: ScriptInputs) -> LogicFuture {
        Box::pin(self(inputs))
    }
}

/// Adapter running a synchronous closure as script logic.
///
/// The closure runs on tokio's blocking pool once the returned future is
/// polled, so a slow body neither stalls sibling futures nor escapes a
/// timeout placed around the future. A panic in the body resumes on the
/// polling task.
struct SyncLogic<F>(Arc<F>);

impl<F> ScriptLogic for SyncLogic<F>
where
    F: Fn(ScriptInputs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn invoke(&self, inputs: ScriptInputs) -> LogicFuture {
        let logic = Arc::clone(&self.0);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || logic(inputs)).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(anyhow::anyhow!("logic task failed: {e}")),
            }
        })
    }
}

/// A registered (or registrable) script.
#[derive(Clone)]
pub struct ScriptDefinition {
    /// `mo-<kebab-name>-v<version>`
    pub id: String,
    pub name: String,
    pub trigger: String,
    /// Declared input names, in declaration order.
    pub inputs: Vec<String>,
    /// Declared text of the logic body.
    pub source: String,
    /// When set, a denied trust status blocks execution.
    pub strict_scan: bool,
    logic: Arc<dyn ScriptLogic>,
    voice_line: Option<VoiceLine>,
}

impl ScriptDefinition {
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger: impl Into<String>,
    ) -> ScriptBuilder {
        ScriptBuilder {
            id: id.into(),
            name: name.into(),
            trigger: trigger.into(),
            inputs: Vec::new(),
            source: String::new(),
            strict_scan: false,
            logic: None,
            voice_line: None,
        }
    }

    pub fn logic(&self) -> &Arc<dyn ScriptLogic> {
        &self.logic
    }

    pub fn has_voice_line(&self) -> bool {
        self.voice_line.is_some()
    }

    /// Render the display line for a logic result, if a formatter is present.
    pub fn voice(&self, result: &Value) -> Option<String> {
        self.voice_line.as_ref().map(|format| format(result))
    }

    /// Declared inputs absent from `provided`, in declaration order.
    pub fn missing_inputs(&self, provided: &ScriptInputs) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|name| !provided.contains_key(name.as_str()))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ScriptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("inputs", &self.inputs)
            .field("strict_scan", &self.strict_scan)
            .field("voice_line", &self.voice_line.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ScriptDefinition`].
pub struct ScriptBuilder {
    id: String,
    name: String,
    trigger: String,
    inputs: Vec<String>,
    source: String,
    strict_scan: bool,
    logic: Option<Arc<dyn ScriptLogic>>,
    voice_line: Option<VoiceLine>,
}

impl ScriptBuilder {
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn strict_scan(mut self, strict: bool) -> Self {
        self.strict_scan = strict;
        self
    }

    /// Asynchronous logic.
    pub fn logic<L>(mut self, logic: L) -> Self
    where
        L: ScriptLogic + 'static,
    {
        self.logic = Some(Arc::new(logic));
        self
    }

    /// Synchronous logic.
    pub fn sync_logic<F>(mut self, logic: F) -> Self
    where
        F: Fn(ScriptInputs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.logic = Some(Arc::new(SyncLogic(Arc::new(logic))));
        self
    }

    pub fn voice_line<F>(mut self, format: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.voice_line = Some(Arc::new(format));
        self
    }

    pub fn build(self) -> CovenantResult<ScriptDefinition> {
        let logic = self.logic.ok_or_else(|| {
            CovenantError::validation(
                "logic",
                format!("Invalid MoScript Logic for ID \"{}\". Must be provided.", self.id),
            )
        })?;

        Ok(ScriptDefinition {
            id: self.id,
            name: self.name,
            trigger: self.trigger,
            inputs: self.inputs,
            source: self.source,
            strict_scan: self.strict_scan,
            logic,
            voice_line: self.voice_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_async_and_sync_logic_dispatch() {
        let doubled = ScriptDefinition::builder("mo-double-v1", "Doubler", "onNumber")
            .inputs(["n"])
            .logic(|inputs: ScriptInputs| async move {
                let n = inputs.get("n").and_then(Value::as_i64).unwrap_or_default();
                Ok::<_, anyhow::Error>(json!(n * 2))
            })
            .build()
            .unwrap();
        let mut inputs = ScriptInputs::new();
        inputs.insert("n".into(), json!(21));
        assert_eq!(doubled.logic().invoke(inputs).await.unwrap(), json!(42));

        let echo = ScriptDefinition::builder("mo-echo-v1", "Echo", "onEcho")
            .sync_logic(|inputs| Ok(Value::Object(inputs)))
            .build()
            .unwrap();
        assert_eq!(echo.logic().invoke(ScriptInputs::new()).await.unwrap(), json!({}));
    }

    #[test]
    fn test_build_without_logic_fails() {
        let err = ScriptDefinition::builder("mo-empty-v1", "Empty", "onNothing")
            .build()
            .unwrap_err();
        assert!(matches!(err, CovenantError::Validation { ref field, .. } if field == "logic"));
    }

    #[test]
    fn test_missing_inputs_and_voice() {
        let script = ScriptDefinition::builder("mo-greet-v2", "Greeter", "onHello")
            .inputs(["who", "when"])
            .sync_logic(|_| Ok(json!("hi")))
            .voice_line(|result| format!("said {result}"))
            .build()
            .unwrap();

        let mut provided = ScriptInputs::new();
        provided.insert("when".into(), json!("now"));
        assert_eq!(script.missing_inputs(&provided), vec!["who".to_string()]);
        assert_eq!(script.voice(&json!("hi")).as_deref(), Some("said \"hi\""));
        assert!(script.has_voice_line());
    }
}
