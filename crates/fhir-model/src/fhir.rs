//! Inbound FHIR resources, already parsed by the client layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::FhirResourceType;
use crate::reference::SystemCodeValue;

/// A FHIR resource handed to the transformation core.
///
/// The body is the JSON representation that scripts see as `input`. The
/// coded values used for rule applicability are extracted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirResource {
    pub resource_type: FhirResourceType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// `meta.lastUpdated` of the resource.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub codes: Vec<SystemCodeValue>,
    /// The resource is contained in another resource.
    #[serde(default)]
    pub contained: bool,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl FhirResource {
    pub fn new(resource_type: FhirResourceType) -> Self {
        Self {
            resource_type,
            id: None,
            version: None,
            last_updated: None,
            codes: Vec::new(),
            contained: false,
            body: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: SystemCodeValue) -> Self {
        self.codes.push(code);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// `Type/id` form of the resource identity, if it has an id.
    pub fn id_element(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{}/{}", self.resource_type.resource_name(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_element() {
        let resource = FhirResource::new(FhirResourceType::Patient).with_id("123");
        assert_eq!(resource.id_element().as_deref(), Some("Patient/123"));
        assert_eq!(FhirResource::new(FhirResourceType::Patient).id_element(), None);
    }
}
