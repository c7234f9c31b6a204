//! The closed set of variables visible to scripts.

use std::collections::BTreeMap;

use fhir_model::ScriptVariable;
use serde::Serialize;
use serde_json::Value;

/// Variables of one rule evaluation, keyed by the closed variable set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptVariables {
    values: BTreeMap<ScriptVariable, Value>,
}

impl ScriptVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, variable: ScriptVariable, value: Value) {
        self.values.insert(variable, value);
    }

    /// Serializes a value and binds it. Values that cannot be represented
    /// as JSON are bound as null.
    pub fn set_serialized<T: Serialize>(&mut self, variable: ScriptVariable, value: &T) {
        self.set(variable, serde_json::to_value(value).unwrap_or(Value::Null));
    }

    #[must_use]
    pub fn with(mut self, variable: ScriptVariable, value: Value) -> Self {
        self.set(variable, value);
        self
    }

    pub fn get(&self, variable: ScriptVariable) -> Option<&Value> {
        self.values.get(&variable)
    }

    pub fn contains(&self, variable: ScriptVariable) -> bool {
        self.values.contains_key(&variable)
    }

    pub fn remove(&mut self, variable: ScriptVariable) -> Option<Value> {
        self.values.remove(&variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScriptVariable, &Value)> {
        self.values.iter().map(|(variable, value)| (*variable, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
