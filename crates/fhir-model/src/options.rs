//! Options controlling transformations.

use serde::{Deserialize, Serialize};

use crate::enums::FhirVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TransformerOptions {
    /// Selects the script sources to execute.
    pub fhir_version: FhirVersion,

    /// Never create new DHIS2 resources, only update existing ones.
    pub creation_disabled: bool,

    /// Only rules that allow contained resources are considered.
    pub contained: bool,

    /// Permits re-reading DHIS2 resources without caches for rules that
    /// require synchronous reads.
    pub sync_enabled: bool,
}

impl Default for TransformerOptions {
    fn default() -> Self {
        Self {
            fhir_version: FhirVersion::R4,
            creation_disabled: false,
            contained: false,
            sync_enabled: true,
        }
    }
}

impl TransformerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fhir_version(mut self, fhir_version: FhirVersion) -> Self {
        self.fhir_version = fhir_version;
        self
    }

    #[must_use]
    pub fn with_creation_disabled(mut self, disabled: bool) -> Self {
        self.creation_disabled = disabled;
        self
    }

    #[must_use]
    pub fn with_contained(mut self, contained: bool) -> Self {
        self.contained = contained;
        self
    }

    #[must_use]
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }
}
