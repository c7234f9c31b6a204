//! Type-safe enumerations for adapter metadata.
//!
//! Every enumeration has a canonical upper-case text form that is used in
//! metadata documents, for display and for parsing (case-insensitive).

text_enum! {
    /// FHIR resource types that rules can be defined for.
    pub enum FhirResourceType {
        Condition => "CONDITION",
        DiagnosticReport => "DIAGNOSTIC_REPORT",
        Encounter => "ENCOUNTER",
        Immunization => "IMMUNIZATION",
        Location => "LOCATION",
        MedicationRequest => "MEDICATION_REQUEST",
        Observation => "OBSERVATION",
        Organization => "ORGANIZATION",
        Patient => "PATIENT",
        RelatedPerson => "RELATED_PERSON",
        Practitioner => "PRACTITIONER",
        Measure => "MEASURE",
        MeasureReport => "MEASURE_REPORT",
        PlanDefinition => "PLAN_DEFINITION",
        Questionnaire => "QUESTIONNAIRE",
        CarePlan => "CARE_PLAN",
        QuestionnaireResponse => "QUESTIONNAIRE_RESPONSE",
    }
}

impl FhirResourceType {
    /// Returns the resource name as used by FHIR (`Patient`, `CarePlan`, ...).
    pub fn resource_name(&self) -> &'static str {
        match self {
            FhirResourceType::Condition => "Condition",
            FhirResourceType::DiagnosticReport => "DiagnosticReport",
            FhirResourceType::Encounter => "Encounter",
            FhirResourceType::Immunization => "Immunization",
            FhirResourceType::Location => "Location",
            FhirResourceType::MedicationRequest => "MedicationRequest",
            FhirResourceType::Observation => "Observation",
            FhirResourceType::Organization => "Organization",
            FhirResourceType::Patient => "Patient",
            FhirResourceType::RelatedPerson => "RelatedPerson",
            FhirResourceType::Practitioner => "Practitioner",
            FhirResourceType::Measure => "Measure",
            FhirResourceType::MeasureReport => "MeasureReport",
            FhirResourceType::PlanDefinition => "PlanDefinition",
            FhirResourceType::Questionnaire => "Questionnaire",
            FhirResourceType::CarePlan => "CarePlan",
            FhirResourceType::QuestionnaireResponse => "QuestionnaireResponse",
        }
    }

    /// Looks up a type by its FHIR resource name (exact match).
    pub fn from_resource_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|value| value.resource_name() == name)
    }
}

text_enum! {
    /// DHIS2 resource families. This is the discriminant of a rule.
    pub enum DhisResourceType {
        TrackedEntity => "TRACKED_ENTITY",
        ProgramStageEvent => "PROGRAM_STAGE_EVENT",
        OrganizationUnit => "ORGANIZATION_UNIT",
        Enrollment => "ENROLLMENT",
        ProgramMetadata => "PROGRAM_METADATA",
        ProgramStageMetadata => "PROGRAM_STAGE_METADATA",
        DataValueSet => "DATA_VALUE_SET",
    }
}

text_enum! {
    /// Direction of a transformation.
    pub enum TransformDirection {
        /// FHIR to DHIS2.
        Import => "IMPORT",
        /// DHIS2 to FHIR.
        Export => "EXPORT",
    }
}

text_enum! {
    pub enum FhirVersion {
        Dstu3 => "DSTU3",
        R4 => "R4",
    }
}

text_enum! {
    pub enum ScriptType {
        /// Modifies the bound output.
        Transform => "TRANSFORM",
        /// Computes and returns a value.
        Evaluate => "EVALUATE",
    }
}

text_enum! {
    /// Language of a script source text.
    pub enum ScriptLanguage {
        JavaScript => "JAVASCRIPT",
        /// Source text is the key of a function registered with a native evaluator.
        Native => "NATIVE",
    }
}

text_enum! {
    /// Declared type of a script argument, return value or input/output.
    ///
    /// This is a pure tag. Converting a string value into a typed value is
    /// done by the converter registry of the scripting layer.
    pub enum DataType {
        Boolean => "BOOLEAN",
        String => "STRING",
        Integer => "INTEGER",
        Double => "DOUBLE",
        DateTime => "DATE_TIME",
        DateUnit => "DATE_UNIT",
        WeightUnit => "WEIGHT_UNIT",
        Gender => "GENDER",
        Constant => "CONSTANT",
        Code => "CODE",
        Location => "LOCATION",
        Pattern => "PATTERN",
        OrgUnitRef => "ORG_UNIT_REF",
        TrackedEntityRef => "TRACKED_ENTITY_REF",
        TrackedEntityAttributeRef => "TRACKED_ENTITY_ATTRIBUTE_REF",
        DataElementRef => "DATA_ELEMENT_REF",
        ProgramRef => "PROGRAM_REF",
        ProgramStageRef => "PROGRAM_STAGE_REF",
        FhirResource => "FHIR_RESOURCE",
        FhirResourceList => "FHIR_RESOURCE_LIST",
        EventDecisionType => "EVENT_DECISION_TYPE",
    }
}

impl DataType {
    /// Returns true if values of this type are references to DHIS2 metadata.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            DataType::OrgUnitRef
                | DataType::TrackedEntityRef
                | DataType::TrackedEntityAttributeRef
                | DataType::DataElementRef
                | DataType::ProgramRef
                | DataType::ProgramStageRef
        )
    }

    /// Returns the permitted values if this type is an enumeration.
    pub fn enumeration_values(&self) -> Option<&'static [&'static str]> {
        match self {
            DataType::DateUnit => Some(DateUnit::NAMES),
            DataType::WeightUnit => Some(WeightUnit::NAMES),
            DataType::Gender => Some(Gender::NAMES),
            DataType::EventDecisionType => Some(EventDecisionType::NAMES),
            _ => None,
        }
    }
}

text_enum! {
    pub enum DateUnit {
        Days => "DAYS",
        Weeks => "WEEKS",
        Months => "MONTHS",
        Years => "YEARS",
    }
}

text_enum! {
    pub enum WeightUnit {
        Gram => "GRAM",
        KiloGram => "KILO_GRAM",
        Ounce => "OUNCE",
        Pound => "POUND",
    }
}

text_enum! {
    /// Administrative gender.
    pub enum Gender {
        Male => "MALE",
        Female => "FEMALE",
        Other => "OTHER",
        Unknown => "UNKNOWN",
    }
}

text_enum! {
    /// Decision of an event lookup script whether to reuse an existing event.
    pub enum EventDecisionType {
        Break => "BREAK",
        Continue => "CONTINUE",
        NewEvent => "NEW_EVENT",
    }
}

text_enum! {
    /// Anchor selector for computing the reference date of an event period.
    pub enum EventPeriodDayType {
        /// Date of the event.
        EventDate => "EVENT_DATE",
        /// Due date of the event.
        DueDate => "DUE_DATE",
        /// Incident date of the enrollment plus the minimum days from start of the stage.
        OrigDueDate => "ORIG_DUE_DATE",
        /// Last update of the event, current time if never updated.
        EventUpdatedDate => "EVENT_UPDATED_DATE",
        /// Latest update of any data value, current time if there is none.
        ValueUpdatedDate => "VALUE_UPDATED_DATE",
    }
}
