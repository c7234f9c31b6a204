//! Rules map one FHIR resource type to one DHIS2 resource family.
//!
//! The DHIS2 family is the discriminant of [`RuleKind`]; variant specific
//! settings travel with the variant and every dispatch point matches on it.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{DhisResourceType, EventPeriodDayType, FhirResourceType, TransformDirection};
use crate::period::{PeriodBound, ResolvedEventPeriod};
use crate::reference::Reference;
use crate::status::{ApplicableEnrollmentStatus, ApplicableEventStatus, EventStatusUpdate};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityRuleData {
    pub tracked_entity_reference: Reference,
    #[serde(default)]
    pub org_unit_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub location_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub tei_identifier_lookup_script_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRuleData {
    /// Evaluates the program of the enrollment from the input resource.
    #[serde(default)]
    pub program_ref_lookup_script_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationUnitRuleData {
    #[serde(default)]
    pub identifier_lookup_script_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSetRuleData {
    pub data_set_reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStageRuleData {
    /// Mapped program stage the rule is bound to. `None` is a wildcard.
    #[serde(default)]
    pub program_stage_id: Option<Uuid>,
    #[serde(default)]
    pub update_event_date: bool,
    #[serde(default = "default_true")]
    pub event_creation_enabled: bool,
    #[serde(default)]
    pub before_period_day_type: Option<EventPeriodDayType>,
    #[serde(default)]
    pub before_period_days: Option<i32>,
    #[serde(default)]
    pub after_period_day_type: Option<EventPeriodDayType>,
    #[serde(default)]
    pub after_period_days: Option<i32>,
    #[serde(default = "ApplicableEnrollmentStatus::active_only")]
    pub applicable_enrollment_status: ApplicableEnrollmentStatus,
    #[serde(default = "ApplicableEventStatus::open")]
    pub applicable_event_status: ApplicableEventStatus,
    #[serde(default)]
    pub event_status_update: EventStatusUpdate,
}

impl Default for ProgramStageRuleData {
    fn default() -> Self {
        Self {
            program_stage_id: None,
            update_event_date: false,
            event_creation_enabled: true,
            before_period_day_type: None,
            before_period_days: None,
            after_period_day_type: None,
            after_period_days: None,
            applicable_enrollment_status: ApplicableEnrollmentStatus::active_only(),
            applicable_event_status: ApplicableEventStatus::open(),
            event_status_update: EventStatusUpdate::default(),
        }
    }
}

impl ProgramStageRuleData {
    pub fn bound_to(program_stage_id: Uuid) -> Self {
        Self {
            program_stage_id: Some(program_stage_id),
            ..Self::default()
        }
    }

    pub fn resulting_before_period_day_type(
        &self,
        stage: &MappedTrackerProgramStage,
    ) -> Option<EventPeriodDayType> {
        self.before_period_day_type.or(stage.before_period_day_type)
    }

    pub fn resulting_before_period_days(&self, stage: &MappedTrackerProgramStage) -> i32 {
        self.before_period_days
            .or(stage.before_period_days)
            .unwrap_or(0)
    }

    pub fn resulting_after_period_day_type(
        &self,
        stage: &MappedTrackerProgramStage,
    ) -> Option<EventPeriodDayType> {
        self.after_period_day_type.or(stage.after_period_day_type)
    }

    pub fn resulting_after_period_days(&self, stage: &MappedTrackerProgramStage) -> i32 {
        self.after_period_days
            .or(stage.after_period_days)
            .unwrap_or(0)
    }

    /// Period of the rule; every unset value falls back to the stage default.
    pub fn resolved_period(&self, stage: &MappedTrackerProgramStage) -> ResolvedEventPeriod {
        ResolvedEventPeriod {
            before: self
                .resulting_before_period_day_type(stage)
                .map(|day_type| PeriodBound::new(day_type, self.resulting_before_period_days(stage))),
            after: self
                .resulting_after_period_day_type(stage)
                .map(|day_type| PeriodBound::new(day_type, self.resulting_after_period_days(stage))),
        }
    }
}

/// Variant specific part of a rule, tagged by DHIS2 resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dhisResourceType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    TrackedEntity(TrackedEntityRuleData),
    ProgramStageEvent(ProgramStageRuleData),
    OrganizationUnit(OrganizationUnitRuleData),
    Enrollment(EnrollmentRuleData),
    ProgramMetadata,
    ProgramStageMetadata,
    DataValueSet(DataValueSetRuleData),
}

impl RuleKind {
    pub fn dhis_resource_type(&self) -> DhisResourceType {
        match self {
            RuleKind::TrackedEntity(_) => DhisResourceType::TrackedEntity,
            RuleKind::ProgramStageEvent(_) => DhisResourceType::ProgramStageEvent,
            RuleKind::OrganizationUnit(_) => DhisResourceType::OrganizationUnit,
            RuleKind::Enrollment(_) => DhisResourceType::Enrollment,
            RuleKind::ProgramMetadata => DhisResourceType::ProgramMetadata,
            RuleKind::ProgramStageMetadata => DhisResourceType::ProgramStageMetadata,
            RuleKind::DataValueSet(_) => DhisResourceType::DataValueSet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Uuid,
    #[serde(default)]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Higher values are evaluated first.
    #[serde(default)]
    pub evaluation_order: i32,
    pub fhir_resource_type: FhirResourceType,
    #[serde(default = "default_true")]
    pub imp_enabled: bool,
    #[serde(default)]
    pub exp_enabled: bool,
    #[serde(default = "default_true")]
    pub create_enabled: bool,
    #[serde(default = "default_true")]
    pub update_enabled: bool,
    #[serde(default)]
    pub delete_enabled: bool,
    /// No further rule is evaluated after this one.
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub contained_allowed: bool,
    #[serde(default)]
    pub grouping: bool,
    #[serde(default)]
    pub applicable_code_set_id: Option<Uuid>,
    #[serde(default)]
    pub filter_imp_script_id: Option<Uuid>,
    #[serde(default)]
    pub filter_exp_script_id: Option<Uuid>,
    #[serde(default)]
    pub transform_imp_script_id: Option<Uuid>,
    #[serde(default)]
    pub transform_exp_script_id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(name: impl Into<String>, fhir_resource_type: FhirResourceType, kind: RuleKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 0,
            name: name.into(),
            description: None,
            enabled: true,
            evaluation_order: 0,
            fhir_resource_type,
            imp_enabled: true,
            exp_enabled: false,
            create_enabled: true,
            update_enabled: true,
            delete_enabled: false,
            stop: false,
            contained_allowed: false,
            grouping: false,
            applicable_code_set_id: None,
            filter_imp_script_id: None,
            filter_exp_script_id: None,
            transform_imp_script_id: None,
            transform_exp_script_id: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_evaluation_order(mut self, evaluation_order: i32) -> Self {
        self.evaluation_order = evaluation_order;
        self
    }

    #[must_use]
    pub fn with_applicable_code_set(mut self, code_set_id: Uuid) -> Self {
        self.applicable_code_set_id = Some(code_set_id);
        self
    }

    #[must_use]
    pub fn with_filter_imp_script(mut self, script_id: Uuid) -> Self {
        self.filter_imp_script_id = Some(script_id);
        self
    }

    #[must_use]
    pub fn with_transform_imp_script(mut self, script_id: Uuid) -> Self {
        self.transform_imp_script_id = Some(script_id);
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: bool) -> Self {
        self.stop = stop;
        self
    }

    pub fn dhis_resource_type(&self) -> DhisResourceType {
        self.kind.dhis_resource_type()
    }

    pub fn is_direction_enabled(&self, direction: TransformDirection) -> bool {
        match direction {
            TransformDirection::Import => self.imp_enabled,
            TransformDirection::Export => self.exp_enabled,
        }
    }

    pub fn is_any_operation_enabled(&self) -> bool {
        self.create_enabled || self.update_enabled || self.delete_enabled
    }

    /// Returns true if the rule takes part in lookups for the direction.
    pub fn is_applicable_for(&self, direction: TransformDirection) -> bool {
        self.enabled && self.is_direction_enabled(direction) && self.is_any_operation_enabled()
    }

    pub fn filter_script(&self, direction: TransformDirection) -> Option<Uuid> {
        match direction {
            TransformDirection::Import => self.filter_imp_script_id,
            TransformDirection::Export => self.filter_exp_script_id,
        }
    }

    pub fn transform_script(&self, direction: TransformDirection) -> Option<Uuid> {
        match direction {
            TransformDirection::Import => self.transform_imp_script_id,
            TransformDirection::Export => self.transform_exp_script_id,
        }
    }

    /// Returns true if an already executed rule makes this rule redundant
    /// for the same input: both are event rules of the same mapped stage
    /// (including both unbound).
    pub fn covers_executed_rule(&self, executed: &Rule) -> bool {
        match (&self.kind, &executed.kind) {
            (RuleKind::ProgramStageEvent(data), RuleKind::ProgramStageEvent(other)) => {
                data.program_stage_id == other.program_stage_id
            }
            _ => false,
        }
    }

    /// Evaluation order descending, then id ascending.
    pub fn evaluation_cmp(&self, other: &Rule) -> Ordering {
        other
            .evaluation_order
            .cmp(&self.evaluation_order)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[id={}, name={}]", self.id, self.name)
    }
}

/// Program stage mapped for event rules, with default event period settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedTrackerProgramStage {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub creation_enabled: bool,
    pub program_reference: Reference,
    pub program_stage_reference: Reference,
    #[serde(default)]
    pub before_period_day_type: Option<EventPeriodDayType>,
    #[serde(default)]
    pub before_period_days: Option<i32>,
    #[serde(default)]
    pub after_period_day_type: Option<EventPeriodDayType>,
    #[serde(default)]
    pub after_period_days: Option<i32>,
}

/// Lookup scripts used for all rules of one FHIR resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirResourceMapping {
    pub id: Uuid,
    pub fhir_resource_type: FhirResourceType,
    #[serde(default = "patient")]
    pub tracked_entity_fhir_resource_type: FhirResourceType,
    #[serde(default)]
    pub imp_tei_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_enrollment_org_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_enrollment_date_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_enrollment_geo_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_event_org_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_event_date_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_event_geo_lookup_script_id: Option<Uuid>,
    #[serde(default)]
    pub imp_effective_date_lookup_script_id: Option<Uuid>,
}

fn patient() -> FhirResourceType {
    FhirResourceType::Patient
}

impl FhirResourceMapping {
    pub fn new(fhir_resource_type: FhirResourceType) -> Self {
        Self {
            id: Uuid::new_v4(),
            fhir_resource_type,
            tracked_entity_fhir_resource_type: FhirResourceType::Patient,
            imp_tei_lookup_script_id: None,
            imp_enrollment_org_lookup_script_id: None,
            imp_enrollment_date_lookup_script_id: None,
            imp_enrollment_geo_lookup_script_id: None,
            imp_event_org_lookup_script_id: None,
            imp_event_date_lookup_script_id: None,
            imp_event_geo_lookup_script_id: None,
            imp_effective_date_lookup_script_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(before: Option<(EventPeriodDayType, i32)>) -> MappedTrackerProgramStage {
        MappedTrackerProgramStage {
            id: Uuid::from_u128(10),
            name: "Birth".into(),
            enabled: true,
            creation_enabled: true,
            program_reference: Reference::name("Child Programme"),
            program_stage_reference: Reference::name("Birth"),
            before_period_day_type: before.map(|(day_type, _)| day_type),
            before_period_days: before.map(|(_, days)| days),
            after_period_day_type: None,
            after_period_days: None,
        }
    }

    fn event_rule(stage_id: Option<Uuid>) -> Rule {
        Rule::new(
            "event",
            FhirResourceType::Observation,
            RuleKind::ProgramStageEvent(ProgramStageRuleData {
                program_stage_id: stage_id,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn period_inherits_stage_defaults() {
        let stage = stage(Some((EventPeriodDayType::EventDate, 3)));
        let data = ProgramStageRuleData::default();
        assert_eq!(
            data.resulting_before_period_day_type(&stage),
            Some(EventPeriodDayType::EventDate)
        );
        assert_eq!(data.resulting_before_period_days(&stage), 3);
        assert_eq!(
            data.resolved_period(&stage).before,
            Some(PeriodBound::new(EventPeriodDayType::EventDate, 3))
        );
        assert_eq!(data.resolved_period(&stage).after, None);
    }

    #[test]
    fn explicit_period_wins_over_stage_default() {
        let stage = stage(Some((EventPeriodDayType::EventDate, 3)));
        let data = ProgramStageRuleData {
            before_period_days: Some(10),
            ..Default::default()
        };
        assert_eq!(
            data.resolved_period(&stage).before,
            Some(PeriodBound::new(EventPeriodDayType::EventDate, 10))
        );

        let data = ProgramStageRuleData {
            before_period_day_type: Some(EventPeriodDayType::DueDate),
            ..Default::default()
        };
        assert_eq!(
            data.resolved_period(&stage).before,
            Some(PeriodBound::new(EventPeriodDayType::DueDate, 3))
        );
    }

    #[test]
    fn covers_executed_rule_of_same_stage() {
        let p = Uuid::from_u128(1);
        let q = Uuid::from_u128(2);
        assert!(event_rule(Some(p)).covers_executed_rule(&event_rule(Some(p))));
        assert!(!event_rule(Some(p)).covers_executed_rule(&event_rule(Some(q))));
        assert!(event_rule(None).covers_executed_rule(&event_rule(None)));
        assert!(!event_rule(None).covers_executed_rule(&event_rule(Some(p))));

        let enrollment = Rule::new(
            "enrollment",
            FhirResourceType::Observation,
            RuleKind::Enrollment(EnrollmentRuleData::default()),
        );
        assert!(!event_rule(None).covers_executed_rule(&enrollment));
        assert!(!enrollment.covers_executed_rule(&enrollment));
    }

    #[test]
    fn evaluation_order_then_id() {
        let a = event_rule(None).with_id(Uuid::from_u128(2)).with_evaluation_order(5);
        let b = event_rule(None).with_id(Uuid::from_u128(1)).with_evaluation_order(5);
        let c = event_rule(None).with_id(Uuid::from_u128(0)).with_evaluation_order(1);
        let mut rules = [c.clone(), a.clone(), b.clone()];
        rules.sort_by(Rule::evaluation_cmp);
        assert_eq!(rules.map(|rule| rule.id), [b.id, a.id, c.id]);
    }

    #[test]
    fn applicability_flags() {
        let mut rule = event_rule(None);
        assert!(rule.is_applicable_for(TransformDirection::Import));
        assert!(!rule.is_applicable_for(TransformDirection::Export));
        rule.create_enabled = false;
        rule.update_enabled = false;
        assert!(!rule.is_applicable_for(TransformDirection::Import));
        rule.delete_enabled = true;
        assert!(rule.is_applicable_for(TransformDirection::Import));
        rule.enabled = false;
        assert!(!rule.is_applicable_for(TransformDirection::Import));
    }

    #[test]
    fn rule_document_is_tagged_by_resource_type() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000007",
            "name": "Vital signs",
            "evaluationOrder": 10,
            "fhirResourceType": "OBSERVATION",
            "dhisResourceType": "PROGRAM_STAGE_EVENT",
            "programStageId": "00000000-0000-0000-0000-000000000001",
            "beforePeriodDays": 2
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.dhis_resource_type(), DhisResourceType::ProgramStageEvent);
        assert!(rule.enabled && rule.imp_enabled && rule.create_enabled);
        let RuleKind::ProgramStageEvent(data) = &rule.kind else {
            panic!("unexpected kind {:?}", rule.kind);
        };
        assert_eq!(data.program_stage_id, Some(Uuid::from_u128(1)));
        assert_eq!(data.before_period_days, Some(2));
        assert!(data.applicable_enrollment_status.active);
        assert_eq!(rule.to_string(), format!("[id={}, name=Vital signs]", rule.id));
    }
}
