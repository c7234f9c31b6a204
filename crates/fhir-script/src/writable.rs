//! The writable output a transform script mutates.

use fhir_model::{DhisResourceType, TransformerError};
use serde_json::Value;

use crate::value::ScriptValue;

/// Scripted facade over the DHIS2 resource a transformation produces.
///
/// Scripts only write through this facade. It tracks whether anything has
/// been changed so that validation only runs for modified resources.
pub trait WritableScriptedResource {
    fn resource_type(&self) -> DhisResourceType;

    /// Reads a property, `None` if the property is unknown.
    fn get(&self, property: &str) -> Option<Value>;

    /// Writes a property. Returns whether the value has changed.
    ///
    /// An unknown property or a value of the wrong kind is an error message
    /// that the evaluator reports as script failure.
    fn set(&mut self, property: &str, value: &ScriptValue) -> Result<bool, String>;

    fn is_modified(&self) -> bool;

    /// Structural and referential validation of a modified resource.
    fn validate(&self) -> Result<(), TransformerError>;

    /// JSON view handed to script engines.
    fn to_json(&self) -> Value;
}

/// Output as seen by filter scripts: readable, every write is rejected.
pub struct ReadOnlyScriptedResource<'a> {
    inner: &'a dyn WritableScriptedResource,
}

impl<'a> ReadOnlyScriptedResource<'a> {
    pub fn new(inner: &'a dyn WritableScriptedResource) -> Self {
        Self { inner }
    }
}

impl WritableScriptedResource for ReadOnlyScriptedResource<'_> {
    fn resource_type(&self) -> DhisResourceType {
        self.inner.resource_type()
    }

    fn get(&self, property: &str) -> Option<Value> {
        self.inner.get(property)
    }

    fn set(&mut self, property: &str, _value: &ScriptValue) -> Result<bool, String> {
        Err(format!("property {property} of the output is read-only"))
    }

    fn is_modified(&self) -> bool {
        self.inner.is_modified()
    }

    fn validate(&self) -> Result<(), TransformerError> {
        self.inner.validate()
    }

    fn to_json(&self) -> Value {
        self.inner.to_json()
    }
}
