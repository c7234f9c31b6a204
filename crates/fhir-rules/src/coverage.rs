//! Suppression of rules made redundant by an already executed rule.

use std::sync::Arc;

use fhir_model::Rule;
use tracing::debug;

/// Records the rules executed for one inbound resource.
#[derive(Debug, Clone, Default)]
pub struct RuleCoverageGuard {
    executed: Vec<Arc<Rule>>,
}

impl RuleCoverageGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: Arc<Rule>) {
        self.executed.push(rule);
    }

    /// Returns true if the candidate must be skipped because an executed
    /// rule already covers it.
    pub fn is_covered(&self, candidate: &Rule) -> bool {
        match self
            .executed
            .iter()
            .find(|executed| candidate.covers_executed_rule(executed))
        {
            Some(executed) => {
                debug!(rule = %candidate, executed = %executed, "rule covered by executed rule");
                true
            }
            None => false,
        }
    }

    pub fn executed(&self) -> &[Arc<Rule>] {
        &self.executed
    }
}
