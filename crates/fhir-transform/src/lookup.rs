//! External collaborators that resolve DHIS2 metadata and tracker resources.
//!
//! The transformation core never talks to DHIS2 itself. Embedders provide
//! these lookups, typically backed by a cached web API client.

use fhir_model::{
    DhisMetadata, DhisMetadataKind, Enrollment, Event, OrganizationUnit, Program, Reference,
    TrackedEntityAttribute, TrackedEntityInstance, TrackedEntityType,
};

/// Resolves DHIS2 metadata by reference.
pub trait MetadataLookup: Send + Sync {
    fn lookup_metadata(&self, kind: DhisMetadataKind, reference: &Reference)
    -> Option<DhisMetadata>;

    /// All tracked entity attributes scripts may address.
    fn tracked_entity_attributes(&self) -> Vec<TrackedEntityAttribute> {
        Vec::new()
    }

    fn program(&self, reference: &Reference) -> Option<Program> {
        match self.lookup_metadata(DhisMetadataKind::Program, reference)? {
            DhisMetadata::Program(program) => Some(program),
            _ => None,
        }
    }

    fn tracked_entity_type(&self, reference: &Reference) -> Option<TrackedEntityType> {
        match self.lookup_metadata(DhisMetadataKind::TrackedEntityType, reference)? {
            DhisMetadata::TrackedEntityType(value) => Some(value),
            _ => None,
        }
    }

    fn organization_unit(&self, reference: &Reference) -> Option<OrganizationUnit> {
        match self.lookup_metadata(DhisMetadataKind::OrganizationUnit, reference)? {
            DhisMetadata::OrganizationUnit(value) => Some(value),
            _ => None,
        }
    }
}

/// Resolves existing DHIS2 tracker resources.
///
/// `refreshed` requests a read that bypasses any cache. It is used when a
/// resource may have been created concurrently since the last read.
pub trait DhisResourceLookup: Send + Sync {
    fn find_tracked_entity_instance(
        &self,
        tracked_entity_type_id: &str,
        identifier: &str,
        refreshed: bool,
    ) -> Option<TrackedEntityInstance>;

    fn find_enrollment(&self, id: &str) -> Option<Enrollment>;

    fn find_latest_active_enrollment(
        &self,
        program_id: &str,
        tracked_entity_instance_id: &str,
        refreshed: bool,
    ) -> Option<Enrollment>;

    /// Events of one program stage of an enrollment, latest first.
    fn find_events(
        &self,
        program_stage_id: &str,
        enrollment_id: &str,
        refreshed: bool,
    ) -> Vec<Event>;
}
