//! Script execution for one rule evaluation.

use std::collections::BTreeMap;

use fhir_model::{Result, ScriptVariable, TransformerError};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::executor::ScriptExecutor;
use crate::value::ScriptValue;
use crate::variables::ScriptVariables;
use crate::writable::{ReadOnlyScriptedResource, WritableScriptedResource};

/// Holds the rule identity and the variables of one rule evaluation and
/// runs its lookup, filter and transform scripts.
///
/// Mutations a failing transform script has already applied to the output
/// are not rolled back. Callers only commit the output of a successful
/// transformation.
#[derive(Debug)]
pub struct ScriptExecutionContext<'e> {
    executor: &'e ScriptExecutor,
    rule: String,
    variables: ScriptVariables,
}

impl<'e> ScriptExecutionContext<'e> {
    pub fn new(executor: &'e ScriptExecutor, rule: impl Into<String>, variables: ScriptVariables) -> Self {
        Self {
            executor,
            rule: rule.into(),
            variables,
        }
    }

    pub fn executor(&self) -> &'e ScriptExecutor {
        self.executor
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn variables(&self) -> &ScriptVariables {
        &self.variables
    }

    pub fn set_variable(&mut self, variable: ScriptVariable, value: Value) {
        self.variables.set(variable, value);
    }

    pub fn set_serialized<T: Serialize>(&mut self, variable: ScriptVariable, value: &T) {
        self.variables.set_serialized(variable, value);
    }

    /// Runs a lookup script that evaluates a value from the variables.
    pub fn lookup(&self, executable_script_id: Uuid) -> Result<ScriptValue> {
        self.lookup_with_args(executable_script_id, &BTreeMap::new())
    }

    pub fn lookup_with_args(
        &self,
        executable_script_id: Uuid,
        arguments: &BTreeMap<String, ScriptValue>,
    ) -> Result<ScriptValue> {
        self.executor
            .execute(&self.rule, executable_script_id, &self.variables, None, arguments)
    }

    /// Runs an optional lookup script, null if there is none.
    pub fn lookup_optional(&self, executable_script_id: Option<Uuid>) -> Result<ScriptValue> {
        match executable_script_id {
            Some(id) => self.lookup(id),
            None => Ok(ScriptValue::Null),
        }
    }

    /// Runs the filter script of a rule. Without a filter script the rule
    /// applies; a null result does not. The filter sees the output but
    /// cannot change it.
    pub fn run_filter(
        &self,
        executable_script_id: Option<Uuid>,
        output: &dyn WritableScriptedResource,
    ) -> Result<bool> {
        let Some(id) = executable_script_id else {
            return Ok(true);
        };
        let mut view = ReadOnlyScriptedResource::new(output);
        let value =
            self.executor
                .execute(&self.rule, id, &self.variables, Some(&mut view), &BTreeMap::new())?;
        self.expect_boolean(id, "filter", value)
    }

    /// Runs the transform script of a rule. Returns whether the script
    /// accepted the transformation; without a transform script the output
    /// is accepted unchanged.
    pub fn run_transform(
        &self,
        executable_script_id: Option<Uuid>,
        output: &mut dyn WritableScriptedResource,
    ) -> Result<bool> {
        let Some(id) = executable_script_id else {
            return Ok(true);
        };
        let value =
            self.executor
                .execute(&self.rule, id, &self.variables, Some(output), &BTreeMap::new())?;
        self.expect_boolean(id, "transform", value)
    }

    fn expect_boolean(&self, id: Uuid, purpose: &str, value: ScriptValue) -> Result<bool> {
        match value {
            ScriptValue::Boolean(value) => Ok(value),
            ScriptValue::Null => Ok(false),
            other => {
                let script = self.executor.resolve(id)?;
                Err(TransformerError::script(
                    &self.rule,
                    &script.script().code,
                    format!("{purpose} script returned a {} instead of a boolean", other.kind()),
                ))
            }
        }
    }
}
