//! Read-only repositories the transformation core consumes.

use std::sync::Arc;

use fhir_model::{
    FhirResourceMapping, FhirResourceType, MappedTrackerProgramStage, Rule, SystemCodeValue,
    TransformDirection,
};
use uuid::Uuid;

/// Finds the rules that apply to an inbound resource.
///
/// Returned rules are enabled, enabled for the direction and have at least
/// one of create, update or delete enabled. They are ordered by evaluation
/// order descending with ties broken by rule id.
pub trait RuleRepository: Send + Sync {
    /// Rules of the resource type whose code set intersects the coded
    /// values of the resource. Rules without a code set always apply.
    /// `None` means the resource carries no codes: only rules without a
    /// code set apply.
    fn find_applicable_rules(
        &self,
        resource_type: FhirResourceType,
        direction: TransformDirection,
        codes: Option<&[SystemCodeValue]>,
    ) -> Vec<Arc<Rule>>;

    /// Rules whose code set contains one of the given codes (by code, not
    /// by coding system value), plus the rules without a code set.
    fn find_rules_by_code_set_codes(
        &self,
        resource_type: FhirResourceType,
        direction: TransformDirection,
        code_set_codes: &[String],
    ) -> Vec<Arc<Rule>>;

    fn find_rule(&self, id: Uuid) -> Option<Arc<Rule>>;
}

/// Resource mappings and mapped program stages.
pub trait MappingRepository: Send + Sync {
    fn find_resource_mapping(
        &self,
        resource_type: FhirResourceType,
    ) -> Option<Arc<FhirResourceMapping>>;

    fn find_mapped_program_stage(&self, id: Uuid) -> Option<Arc<MappedTrackerProgramStage>>;
}
