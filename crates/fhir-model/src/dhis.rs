//! DHIS2 metadata and tracker resources as seen by the transformation core.
//!
//! Metadata objects (programs, stages, tracked entity types, organisation
//! units) are looked up through external collaborators. Tracker resources
//! (enrollments, events) are the input and output of a transformation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DhisResourceType;
use crate::reference::{Reference, ReferenceType};
use crate::status::{EnrollmentStatus, EventStatus};

/// Geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.longitude, self.latitude)
    }
}

/// Returns true if the metadata object with the given identity is
/// identified by the reference.
fn matches_reference(reference: &Reference, id: &str, code: Option<&str>, name: &str) -> bool {
    match reference.reference_type {
        ReferenceType::Id => reference.value == id,
        ReferenceType::Code => code == Some(reference.value.as_str()),
        ReferenceType::Name => reference.value == name,
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub min_days_from_start: i32,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub generated_by_enrollment_date: bool,
}

impl ProgramStage {
    pub fn is_reference(&self, reference: &Reference) -> bool {
        matches_reference(reference, &self.id, self.code.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub tracked_entity_type_id: Option<String>,
    #[serde(default)]
    pub registration: bool,
    #[serde(default)]
    pub select_enrollment_dates_in_future: bool,
    #[serde(default)]
    pub select_incident_dates_in_future: bool,
    #[serde(default)]
    pub stages: Vec<ProgramStage>,
}

impl Program {
    pub fn is_reference(&self, reference: &Reference) -> bool {
        matches_reference(reference, &self.id, self.code.as_deref(), &self.name)
    }

    pub fn find_stage(&self, reference: &Reference) -> Option<&ProgramStage> {
        self.stages.iter().find(|stage| stage.is_reference(reference))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityAttribute {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub value_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationUnit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

text_enum! {
    /// Kinds of metadata the core looks up by reference.
    pub enum DhisMetadataKind {
        Program => "PROGRAM",
        ProgramStage => "PROGRAM_STAGE",
        TrackedEntityType => "TRACKED_ENTITY_TYPE",
        TrackedEntityAttribute => "TRACKED_ENTITY_ATTRIBUTE",
        OrganizationUnit => "ORGANIZATION_UNIT",
    }
}

/// Result of a metadata lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum DhisMetadata {
    Program(Program),
    ProgramStage(ProgramStage),
    TrackedEntityType(TrackedEntityType),
    TrackedEntityAttribute(TrackedEntityAttribute),
    OrganizationUnit(OrganizationUnit),
}

impl DhisMetadata {
    pub fn kind(&self) -> DhisMetadataKind {
        match self {
            DhisMetadata::Program(_) => DhisMetadataKind::Program,
            DhisMetadata::ProgramStage(_) => DhisMetadataKind::ProgramStage,
            DhisMetadata::TrackedEntityType(_) => DhisMetadataKind::TrackedEntityType,
            DhisMetadata::TrackedEntityAttribute(_) => DhisMetadataKind::TrackedEntityAttribute,
            DhisMetadata::OrganizationUnit(_) => DhisMetadataKind::OrganizationUnit,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DhisMetadata::Program(value) => &value.id,
            DhisMetadata::ProgramStage(value) => &value.id,
            DhisMetadata::TrackedEntityType(value) => &value.id,
            DhisMetadata::TrackedEntityAttribute(value) => &value.id,
            DhisMetadata::OrganizationUnit(value) => &value.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityInstance {
    pub id: String,
    pub tracked_entity_type_id: String,
    #[serde(default)]
    pub org_unit_id: Option<String>,
    /// Business identifier the FHIR resource is linked with.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Attribute values keyed by attribute id.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(default)]
    pub id: Option<String>,
    pub program_id: String,
    pub tracked_entity_instance_id: String,
    #[serde(default)]
    pub org_unit_id: Option<String>,
    #[serde(default)]
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub enrollment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub incident_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub coordinate: Option<Location>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub new_resource: bool,
    #[serde(skip)]
    pub modified: bool,
}

impl Enrollment {
    /// Creates a new active enrollment that has not been persisted yet.
    pub fn new_resource(
        program_id: impl Into<String>,
        tracked_entity_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            program_id: program_id.into(),
            tracked_entity_instance_id: tracked_entity_instance_id.into(),
            status: EnrollmentStatus::Active,
            new_resource: true,
            modified: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub data_element_id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub provided_elsewhere: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: Option<String>,
    pub program_id: String,
    pub program_stage_id: String,
    #[serde(default)]
    pub enrollment_id: Option<String>,
    #[serde(default)]
    pub tracked_entity_instance_id: Option<String>,
    #[serde(default)]
    pub org_unit_id: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub coordinate: Option<Location>,
    #[serde(default)]
    pub data_values: Vec<DataValue>,
    #[serde(skip)]
    pub new_resource: bool,
    #[serde(skip)]
    pub modified: bool,
}

impl Event {
    /// Creates a new event of an enrollment that has not been persisted yet.
    pub fn new_resource(program_id: impl Into<String>, program_stage_id: impl Into<String>) -> Self {
        Self {
            program_id: program_id.into(),
            program_stage_id: program_stage_id.into(),
            status: EventStatus::Active,
            new_resource: true,
            modified: true,
            ..Self::default()
        }
    }

    /// Latest update of any data value of the event.
    pub fn latest_value_update(&self) -> Option<DateTime<Utc>> {
        self.data_values
            .iter()
            .filter_map(|value| value.last_updated)
            .max()
    }

    pub fn data_value(&self, data_element_id: &str) -> Option<&DataValue> {
        self.data_values
            .iter()
            .find(|value| value.data_element_id == data_element_id)
    }
}

/// Identity of a DHIS2 resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhisResourceId {
    pub resource_type: DhisResourceType,
    pub id: String,
}

impl DhisResourceId {
    pub fn new(resource_type: DhisResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for DhisResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

impl FromStr for DhisResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Resource id must have the form TYPE:id: {s}"))?;
        if id.is_empty() {
            return Err(format!("Resource id has an empty id: {s}"));
        }
        Ok(Self::new(kind.parse()?, id))
    }
}

/// A DHIS2 resource produced by a transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum DhisResource {
    Enrollment(Enrollment),
    Event(Event),
    /// Identity-only payload, used for deletions.
    Identity(DhisResourceId),
}

impl DhisResource {
    pub fn resource_type(&self) -> DhisResourceType {
        match self {
            DhisResource::Enrollment(_) => DhisResourceType::Enrollment,
            DhisResource::Event(_) => DhisResourceType::ProgramStageEvent,
            DhisResource::Identity(id) => id.resource_type,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            DhisResource::Enrollment(enrollment) => enrollment.id.as_deref(),
            DhisResource::Event(event) => event.id.as_deref(),
            DhisResource::Identity(id) => Some(&id.id),
        }
    }

    pub fn is_new(&self) -> bool {
        match self {
            DhisResource::Enrollment(enrollment) => enrollment.new_resource,
            DhisResource::Event(event) => event.new_resource,
            DhisResource::Identity(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn find_stage_by_reference() {
        let program = Program {
            id: "IpHINAT79UW".into(),
            name: "Child Programme".into(),
            stages: vec![ProgramStage {
                id: "A03MvHHogjR".into(),
                name: "Birth".into(),
                code: Some("BIRTH".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(program.find_stage(&Reference::code("BIRTH")).is_some());
        assert!(program.find_stage(&Reference::name("Birth")).is_some());
        assert!(program.find_stage(&Reference::id("A03MvHHogjR")).is_some());
        assert!(program.find_stage(&Reference::code("Birth")).is_none());
    }

    #[test]
    fn latest_value_update() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let event = Event {
            data_values: vec![
                DataValue {
                    data_element_id: "a".into(),
                    last_updated: Some(t2),
                    ..Default::default()
                },
                DataValue {
                    data_element_id: "b".into(),
                    ..Default::default()
                },
                DataValue {
                    data_element_id: "c".into(),
                    last_updated: Some(t1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(event.latest_value_update(), Some(t2));
        assert_eq!(Event::default().latest_value_update(), None);
    }

    #[test]
    fn new_resources_are_active_and_modified() {
        let enrollment = Enrollment::new_resource("program", "tei");
        assert!(enrollment.new_resource && enrollment.modified);
        assert_eq!(enrollment.status, EnrollmentStatus::Active);

        let resource = DhisResource::Enrollment(enrollment);
        assert!(resource.is_new());
        assert_eq!(resource.resource_type(), DhisResourceType::Enrollment);
        assert_eq!(resource.id(), None);
    }

    #[test]
    fn resource_id_text_form() {
        let id: DhisResourceId = "enrollment:Ab12".parse().unwrap();
        assert_eq!(id, DhisResourceId::new(DhisResourceType::Enrollment, "Ab12"));
        assert_eq!(id.to_string(), "ENROLLMENT:Ab12");
    }
}
