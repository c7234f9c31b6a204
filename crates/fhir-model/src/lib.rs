//! Metadata and resource model of the FHIR to DHIS2 transformation core.
//!
//! This crate holds the rule, script and code-set metadata, the DHIS2
//! tracker resources that transformations produce, the status and period
//! logic used by event rules, and the shared error taxonomy.

#[macro_use]
mod macros;

pub mod code_set;
pub mod dhis;
pub mod enums;
pub mod error;
pub mod fhir;
pub mod options;
pub mod period;
pub mod reference;
pub mod rule;
pub mod script;
pub mod status;

pub use code_set::{Code, CodeSet, CodeSetValue, System, SystemCode};
pub use dhis::{
    DataValue, DhisMetadata, DhisMetadataKind, DhisResource, DhisResourceId, Enrollment, Event,
    Location, OrganizationUnit, Program, ProgramStage, TrackedEntityAttribute,
    TrackedEntityInstance, TrackedEntityType,
};
pub use enums::{
    DataType, DateUnit, DhisResourceType, EventDecisionType, EventPeriodDayType,
    FhirResourceType, FhirVersion, Gender, ScriptLanguage, ScriptType, TransformDirection,
    WeightUnit,
};
pub use error::{ConversionError, Result, TransformerError};
pub use fhir::FhirResource;
pub use options::TransformerOptions;
pub use period::{PeriodBound, PeriodCalculator, ResolvedEventPeriod, add_days};
pub use reference::{Reference, ReferenceType, SystemCodeValue};
pub use rule::{
    DataValueSetRuleData, EnrollmentRuleData, FhirResourceMapping, MappedTrackerProgramStage,
    OrganizationUnitRuleData, ProgramStageRuleData, Rule, RuleKind, TrackedEntityRuleData,
};
pub use script::{
    ExecutableScript, ExecutableScriptArg, Script, ScriptArg, ScriptSource, ScriptVariable,
};
pub use status::{
    ApplicableEnrollmentStatus, ApplicableEventStatus, EnrollmentStatus, EventStatus,
    EventStatusUpdate,
};
