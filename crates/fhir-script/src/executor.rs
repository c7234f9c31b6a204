//! Execution of executable scripts against a closed set of variables.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fhir_model::{DataType, FhirVersion, Result, ScriptVariable, TransformerError};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::binding::ExecutableScriptInfo;
use crate::convert::ConverterRegistry;
use crate::evaluator::{ScriptBindings, ScriptEvaluator};
use crate::value::ScriptValue;
use crate::variables::ScriptVariables;
use crate::writable::WritableScriptedResource;

/// Longest source text that is checked for a boolean literal.
const MAX_LITERAL_LENGTH: usize = 20;

/// Resolves executable scripts for execution.
pub trait ScriptRepository: Send + Sync {
    /// Returns the executable script with its chain and the source for the
    /// FHIR version, `None` if the executable script does not exist.
    fn resolve_script(
        &self,
        executable_script_id: Uuid,
        fhir_version: FhirVersion,
    ) -> Result<Option<Arc<ExecutableScriptInfo>>>;
}

/// Runs executable scripts with the injected evaluators.
#[derive(Clone)]
pub struct ScriptExecutor {
    scripts: Arc<dyn ScriptRepository>,
    evaluators: Vec<Arc<dyn ScriptEvaluator>>,
    converters: Arc<ConverterRegistry>,
    fhir_version: FhirVersion,
}

impl fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("evaluators", &self.evaluators.len())
            .field("fhir_version", &self.fhir_version)
            .finish_non_exhaustive()
    }
}

impl ScriptExecutor {
    pub fn new(scripts: Arc<dyn ScriptRepository>, fhir_version: FhirVersion) -> Self {
        Self {
            scripts,
            evaluators: Vec::new(),
            converters: ConverterRegistry::standard(),
            fhir_version,
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    #[must_use]
    pub fn with_converters(mut self, converters: Arc<ConverterRegistry>) -> Self {
        self.converters = converters;
        self
    }

    pub fn fhir_version(&self) -> FhirVersion {
        self.fhir_version
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn resolve(&self, executable_script_id: Uuid) -> Result<Arc<ExecutableScriptInfo>> {
        self.scripts
            .resolve_script(executable_script_id, self.fhir_version)?
            .ok_or_else(|| {
                TransformerError::configuration(format!(
                    "Executable script {executable_script_id} does not exist"
                ))
            })
    }

    /// Executes an executable script for a rule.
    ///
    /// Argument values are the script defaults, overridden by the executable
    /// script chain, overridden by `arguments`. Only the variables the script
    /// declares are bound. Errors of the evaluator are reported as script
    /// errors carrying the rule and the script code.
    pub fn execute(
        &self,
        rule: &str,
        executable_script_id: Uuid,
        variables: &ScriptVariables,
        output: Option<&mut dyn WritableScriptedResource>,
        arguments: &BTreeMap<String, ScriptValue>,
    ) -> Result<ScriptValue> {
        let info = self.resolve(executable_script_id)?;
        let script = info.script();
        let source = info.source().ok_or_else(|| {
            TransformerError::configuration(format!(
                "Script {} has no source for FHIR version {}",
                script.code, self.fhir_version
            ))
        })?;

        let literal = (script.return_type == DataType::Boolean)
            .then(|| boolean_literal(&source.source_text))
            .flatten();
        if let Some(value) = literal {
            trace!(script = %script.code, value, "boolean literal script");
            return Ok(ScriptValue::Boolean(value));
        }

        let missing: Vec<&str> = script
            .variables
            .iter()
            .filter(|variable| match variable {
                ScriptVariable::Args => false,
                ScriptVariable::Output => output.is_none(),
                _ => !variables.contains(**variable),
            })
            .map(ScriptVariable::variable_name)
            .collect();
        if !missing.is_empty() {
            return Err(TransformerError::configuration(format!(
                "Script {} requires variables that are not available: {}",
                script.code,
                missing.join(", ")
            )));
        }

        let resolved = info
            .resolved_arguments(&self.converters)?
            .with_explicit(arguments);
        resolved.check_mandatory()?;

        let evaluator = self
            .evaluators
            .iter()
            .find(|evaluator| evaluator.supports(source.language))
            .ok_or_else(|| {
                TransformerError::configuration(format!(
                    "No script evaluator supports language {} of script {}",
                    source.language, script.code
                ))
            })?;

        let bound: BTreeMap<ScriptVariable, serde_json::Value> = variables
            .iter()
            .filter(|(variable, _)| script.variables.contains(variable))
            .map(|(variable, value)| (variable, value.clone()))
            .collect();
        let output = if script.variables.contains(&ScriptVariable::Output) {
            output
        } else {
            None
        };
        let mut bindings = ScriptBindings::new(bound, resolved.values(), output);

        debug!(
            rule,
            script = %script.code,
            executable_script = %info.executable_script().code,
            "executing script"
        );
        let value = evaluator.evaluate(source, &mut bindings).map_err(|err| {
            TransformerError::script(
                rule,
                &script.code,
                format!(
                    "{err} (executable script {})",
                    info.executable_script().code
                ),
            )
        })?;

        self.converters
            .coerce(value, script.return_type)
            .map_err(|message| {
                TransformerError::script(
                    rule,
                    &script.code,
                    format!("returned an invalid value: {message}"),
                )
            })
    }
}

/// `true` or `false` written as the complete source text of a script.
fn boolean_literal(source_text: &str) -> Option<bool> {
    if source_text.len() > MAX_LITERAL_LENGTH {
        return None;
    }
    match source_text.replace(';', "").trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
