// registry.rs - Append-only script registry indexed by id and by trigger

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{CovenantError, CovenantResult, SafeReadLock, SafeWriteLock};
use crate::script::ScriptDefinition;
use crate::validator::ScriptValidator;

#[derive(Default)]
struct RegistryIndex {
    by_id: HashMap<String, Arc<ScriptDefinition>>,
    /// Registration order, used for `list`.
    order: Vec<String>,
    /// trigger -> ids, in registration order.
    by_trigger: HashMap<String, Vec<String>>,
    trigger_order: Vec<String>,
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_scripts: usize,
    pub total_triggers: usize,
    pub strict_scripts: usize,
    pub voiced_scripts: usize,
}

/// Owns the validated scripts. Entries are never updated or removed.
#[derive(Default)]
pub struct ScriptRegistry {
    index: RwLock<RegistryIndex>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a script. Fails on a validation error or an id
    /// that is already registered.
    pub fn register(&self, script: ScriptDefinition) -> CovenantResult<()> {
        ScriptValidator::validate(&script)?;

        let mut index = self.index.safe_write("script_registry")?;
        if index.by_id.contains_key(&script.id) {
            return Err(CovenantError::duplicate_id(script.id));
        }

        let id = script.id.clone();
        let trigger = script.trigger.clone();
        let name = script.name.clone();

        index.by_id.insert(id.clone(), Arc::new(script));
        index.order.push(id.clone());
        if !index.by_trigger.contains_key(&trigger) {
            index.trigger_order.push(trigger.clone());
        }
        index.by_trigger.entry(trigger.clone()).or_default().push(id.clone());

        info!(script_id = %id, name = %name, trigger = %trigger, "Registered MoScript");
        Ok(())
    }

    /// Register every script of a batch, validating the whole batch first.
    pub fn register_all(&self, scripts: Vec<ScriptDefinition>) -> CovenantResult<()> {
        ScriptValidator::validate_all(&scripts)?;
        for script in scripts {
            self.register(script)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> CovenantResult<Arc<ScriptDefinition>> {
        let index = self.index.safe_read("script_registry")?;
        index
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| CovenantError::unknown_id(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index
            .safe_read("script_registry")
            .map(|index| index.by_id.contains_key(id))
            .unwrap_or(false)
    }

    /// Snapshot of every registered script, in registration order.
    pub fn list(&self) -> CovenantResult<Vec<Arc<ScriptDefinition>>> {
        let index = self.index.safe_read("script_registry")?;
        Ok(index
            .order
            .iter()
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect())
    }

    /// Scripts registered for `trigger`; empty when the trigger is unknown.
    pub fn by_trigger(&self, trigger: &str) -> CovenantResult<Vec<Arc<ScriptDefinition>>> {
        let index = self.index.safe_read("script_registry")?;
        let scripts = match index.by_trigger.get(trigger) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect(),
            None => {
                debug!(trigger = %trigger, "No scripts registered for trigger");
                Vec::new()
            }
        };
        Ok(scripts)
    }

    /// Known triggers, in the order they were first registered.
    pub fn triggers(&self) -> CovenantResult<Vec<String>> {
        let index = self.index.safe_read("script_registry")?;
        Ok(index.trigger_order.clone())
    }

    pub fn stats(&self) -> CovenantResult<RegistryStats> {
        let index = self.index.safe_read("script_registry")?;
        Ok(RegistryStats {
            total_scripts: index.by_id.len(),
            total_triggers: index.by_trigger.len(),
            strict_scripts: index.by_id.values().filter(|s| s.strict_scan).count(),
            voiced_scripts: index.by_id.values().filter(|s| s.has_voice_line()).count(),
        })
    }

    pub fn len(&self) -> usize {
        self.index
            .safe_read("script_registry")
            .map(|index| index.by_id.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
