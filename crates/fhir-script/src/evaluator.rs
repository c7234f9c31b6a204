//! The injected script execution capability.
//!
//! The core never assumes a particular scripting runtime. An evaluator
//! receives the source text and a closed set of bindings and returns a
//! value or an error. Timeouts and cancellation are the evaluator's policy.
//!
//! # Example
//!
//! ```ignore
//! let evaluator = NativeScriptEvaluator::new()
//!     .with_function("is-adult", |bindings| {
//!         let age = bindings.arg("age").and_then(ScriptValue::as_i64).unwrap_or(0);
//!         Ok(ScriptValue::Boolean(age >= 18))
//!     });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fhir_model::{ScriptLanguage, ScriptSource, ScriptVariable};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::value::ScriptValue;
use crate::writable::WritableScriptedResource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptEvaluationError {
    #[error("{0}")]
    Failed(String),

    #[error("script execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("script language {0} is not supported")]
    Unsupported(ScriptLanguage),
}

impl ScriptEvaluationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Everything a script can see while it runs.
pub struct ScriptBindings<'a> {
    variables: BTreeMap<ScriptVariable, Value>,
    args: BTreeMap<String, ScriptValue>,
    output: Option<&'a mut dyn WritableScriptedResource>,
}

impl<'a> ScriptBindings<'a> {
    pub fn new(
        variables: BTreeMap<ScriptVariable, Value>,
        args: BTreeMap<String, ScriptValue>,
        output: Option<&'a mut dyn WritableScriptedResource>,
    ) -> Self {
        Self {
            variables,
            args,
            output,
        }
    }

    pub fn variable(&self, variable: ScriptVariable) -> Option<&Value> {
        self.variables.get(&variable)
    }

    pub fn is_bound(&self, variable: ScriptVariable) -> bool {
        match variable {
            ScriptVariable::Output => self.output.is_some(),
            ScriptVariable::Args => true,
            _ => self.variables.contains_key(&variable),
        }
    }

    pub fn arg(&self, name: &str) -> Option<&ScriptValue> {
        self.args.get(name)
    }

    pub fn args(&self) -> &BTreeMap<String, ScriptValue> {
        &self.args
    }

    pub fn output(&mut self) -> Option<&mut (dyn WritableScriptedResource + 'a)> {
        self.output.as_deref_mut()
    }

    /// Writes a property of the bound output.
    pub fn set_output(
        &mut self,
        property: &str,
        value: &ScriptValue,
    ) -> Result<bool, ScriptEvaluationError> {
        let output = self
            .output
            .as_deref_mut()
            .ok_or_else(|| ScriptEvaluationError::failed("no output has been bound"))?;
        output
            .set(property, value)
            .map_err(ScriptEvaluationError::Failed)
    }

    /// Global object for engines that work on JSON: every bound variable
    /// under its script name, `args` and the current state of `output`.
    pub fn globals(&self) -> Map<String, Value> {
        let mut globals: Map<String, Value> = self
            .variables
            .iter()
            .map(|(variable, value)| (variable.variable_name().to_string(), value.clone()))
            .collect();
        let args = self
            .args
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        globals.insert(
            ScriptVariable::Args.variable_name().to_string(),
            Value::Object(args),
        );
        if let Some(output) = self.output.as_deref() {
            globals.insert(
                ScriptVariable::Output.variable_name().to_string(),
                output.to_json(),
            );
        }
        globals
    }
}

impl fmt::Debug for ScriptBindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBindings")
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("args", &self.args)
            .field("output", &self.output.is_some())
            .finish()
    }
}

/// Executes script source texts.
///
/// Implementations must be `Send + Sync` to allow concurrent transformations.
pub trait ScriptEvaluator: Send + Sync {
    fn supports(&self, language: ScriptLanguage) -> bool;

    fn evaluate(
        &self,
        source: &ScriptSource,
        bindings: &mut ScriptBindings<'_>,
    ) -> Result<ScriptValue, ScriptEvaluationError>;
}

type NativeFunction =
    dyn Fn(&mut ScriptBindings<'_>) -> Result<ScriptValue, ScriptEvaluationError> + Send + Sync;

/// Evaluator for [`ScriptLanguage::Native`] sources.
///
/// The source text is the key of a registered Rust function.
#[derive(Clone, Default)]
pub struct NativeScriptEvaluator {
    functions: HashMap<String, Arc<NativeFunction>>,
}

impl NativeScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: impl Into<String>, function: F)
    where
        F: Fn(&mut ScriptBindings<'_>) -> Result<ScriptValue, ScriptEvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(key.into(), Arc::new(function));
    }

    #[must_use]
    pub fn with_function<F>(mut self, key: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut ScriptBindings<'_>) -> Result<ScriptValue, ScriptEvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.register(key, function);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.functions.contains_key(key)
    }
}

impl fmt::Debug for NativeScriptEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.functions.keys().collect();
        keys.sort();
        f.debug_struct("NativeScriptEvaluator")
            .field("functions", &keys)
            .finish()
    }
}

impl ScriptEvaluator for NativeScriptEvaluator {
    fn supports(&self, language: ScriptLanguage) -> bool {
        language == ScriptLanguage::Native
    }

    fn evaluate(
        &self,
        source: &ScriptSource,
        bindings: &mut ScriptBindings<'_>,
    ) -> Result<ScriptValue, ScriptEvaluationError> {
        if !self.supports(source.language) {
            return Err(ScriptEvaluationError::Unsupported(source.language));
        }
        let function = self
            .functions
            .get(source.source_text.trim())
            .ok_or_else(|| {
                ScriptEvaluationError::failed(format!(
                    "no native function registered for '{}'",
                    source.source_text.trim()
                ))
            })?;
        function(bindings)
    }
}
