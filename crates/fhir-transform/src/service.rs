//! Sequential evaluation of the candidate rules of an inbound resource.
//!
//! A [`TransformerRequest`] holds the ordered candidate rules and the
//! evaluation state. Each call of [`TransformerService::transform`] resumes
//! after the last evaluated rule and returns the next outcome, so callers
//! that need every outcome call it until it returns `None`.

use std::sync::Arc;

use fhir_model::{FhirResource, Result, Rule, ScriptVariable, TransformerError};
use fhir_rules::{RuleCoverageGuard, RuleRepository};
use fhir_script::{ScriptExecutionContext, ScriptExecutor, ScriptVariables};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::TransformerContext;
use crate::transformer::{TransformOutcome, TransformerRegistry};

/// Evaluation state of one inbound resource.
#[derive(Debug)]
pub struct TransformerRequest {
    input: FhirResource,
    context: TransformerContext,
    rules: Vec<Arc<Rule>>,
    next: usize,
    guard: RuleCoverageGuard,
    stopped: bool,
    first: bool,
}

impl TransformerRequest {
    pub fn input(&self) -> &FhirResource {
        &self.input
    }

    pub fn context(&self) -> &TransformerContext {
        &self.context
    }

    /// Candidate rules in evaluation order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Rules that produced an outcome so far.
    pub fn executed_rules(&self) -> &[Arc<Rule>] {
        self.guard.executed()
    }

    /// No further outcome can be produced.
    pub fn is_completed(&self) -> bool {
        self.stopped || self.next >= self.rules.len()
    }
}

pub struct TransformerService {
    rules: Arc<dyn RuleRepository>,
    executor: Arc<ScriptExecutor>,
    registry: TransformerRegistry,
}

impl std::fmt::Debug for TransformerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerService")
            .field("executor", &self.executor)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl TransformerService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        executor: Arc<ScriptExecutor>,
        registry: TransformerRegistry,
    ) -> Self {
        Self {
            rules,
            executor,
            registry,
        }
    }

    pub fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    /// Looks up the candidate rules of the resource.
    ///
    /// Contained resources are only processed by rules that allow them.
    pub fn create_request(
        &self,
        input: FhirResource,
        context: TransformerContext,
    ) -> TransformerRequest {
        let contained = input.contained || context.options.contained;
        let rules: Vec<Arc<Rule>> = self
            .rules
            .find_applicable_rules(input.resource_type, context.direction(), Some(&input.codes))
            .into_iter()
            .filter(|rule| !contained || rule.contained_allowed)
            .collect();
        debug!(
            resource_type = %input.resource_type,
            resource = ?input.id,
            contained,
            rules = rules.len(),
            "created transformer request"
        );
        TransformerRequest {
            input,
            context,
            rules,
            next: 0,
            guard: RuleCoverageGuard::new(),
            stopped: false,
            first: true,
        }
    }

    /// Evaluates the remaining candidate rules until one produces an
    /// outcome.
    ///
    /// Rules covered by an already executed rule are skipped. A rule with
    /// the stop flag ends the evaluation after it has been evaluated.
    ///
    /// # Errors
    ///
    /// Mapping, data and conversion errors abort the failing rule only and
    /// evaluation continues with the next rule. Every other error is
    /// returned and ends the transformation of the resource.
    pub fn transform(&self, request: &mut TransformerRequest) -> Result<Option<TransformOutcome>> {
        let first = std::mem::replace(&mut request.first, false);
        while !request.stopped {
            let Some(rule) = request.rules.get(request.next).cloned() else {
                break;
            };
            request.next += 1;
            request.context.check_aborted()?;
            if request.guard.is_covered(&rule) {
                continue;
            }
            let transformer = self
                .registry
                .get(rule.dhis_resource_type())
                .ok_or_else(|| {
                    TransformerError::configuration(format!(
                        "No transformer has been registered for rule {rule} of type {}",
                        rule.dhis_resource_type()
                    ))
                })?;

            let mut scripts = ScriptExecutionContext::new(
                &self.executor,
                rule.to_string(),
                base_variables(request),
            );
            let result =
                transformer.transform(&request.context, &request.input, &rule, &mut scripts);
            if rule.stop {
                debug!(rule = %rule, "rule stops evaluation of further rules");
                request.stopped = true;
            }
            match result {
                Ok(Some(outcome)) => {
                    debug!(
                        rule = %rule,
                        resource_type = %outcome.resource.resource_type(),
                        new = outcome.is_new,
                        "rule produced outcome"
                    );
                    request.guard.record(rule);
                    return Ok(Some(outcome));
                }
                Ok(None) => {}
                Err(err) if err.aborts_rule_only() => {
                    info!(rule = %rule, error = %err, "rule has been aborted");
                }
                Err(err) => return Err(err),
            }
        }
        if first {
            info!(
                resource_type = %request.input.resource_type,
                resource = ?request.input.id,
                "no matching rule has been found"
            );
        }
        Ok(None)
    }

    /// Deletion outcome of the DHIS2 resource that has been created by the
    /// rule. `None` if the rule does not allow deletions.
    pub fn transform_deletion(
        &self,
        rule: &Arc<Rule>,
        external_id: &str,
    ) -> Result<Option<TransformOutcome>> {
        if !rule.delete_enabled {
            debug!(rule = %rule, "deletion is disabled");
            return Ok(None);
        }
        let transformer = self
            .registry
            .get(rule.dhis_resource_type())
            .ok_or_else(|| {
                TransformerError::configuration(format!(
                    "No transformer has been registered for rule {rule} of type {}",
                    rule.dhis_resource_type()
                ))
            })?;
        transformer.transform_deletion(rule, external_id).map(Some)
    }
}

/// Variables every script of the request can use.
fn base_variables(request: &TransformerRequest) -> ScriptVariables {
    ScriptVariables::new()
        .with(ScriptVariable::Context, request.context.script_value())
        .with(ScriptVariable::Input, request.input.body.clone())
        .with(
            ScriptVariable::Resource,
            request.input.id_element().map_or(Value::Null, Value::String),
        )
        .with(
            ScriptVariable::DateTime,
            Value::String(request.context.now.to_rfc3339()),
        )
}
