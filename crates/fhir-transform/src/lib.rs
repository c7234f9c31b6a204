//! Transformation of FHIR resources into DHIS2 tracker resources.
//!
//! The [`TransformerService`] evaluates the candidate rules of an inbound
//! resource one after another. Each rule is processed by the transformer of
//! its DHIS2 resource type:
//!
//! - [`EnrollmentTransformer`]: enrollments of a tracked entity instance
//! - [`ProgramStageEventTransformer`]: events of a program stage
//!
//! DHIS2 metadata and existing tracker resources are read through the
//! [`MetadataLookup`] and [`DhisResourceLookup`] collaborators. Nothing is
//! written; outcomes are handed back to the caller.

pub mod context;
pub mod enrollment;
pub mod event;
pub mod lookup;
pub mod scripted;
pub mod service;
pub mod transformer;

pub use context::{AbortSignal, FhirRequest, TransformerContext};
pub use enrollment::EnrollmentTransformer;
pub use event::ProgramStageEventTransformer;
pub use lookup::{DhisResourceLookup, MetadataLookup};
pub use scripted::{DATA_VALUE_PREFIX, WritableScriptedEnrollment, WritableScriptedEvent};
pub use service::{TransformerRequest, TransformerService};
pub use transformer::{
    FhirToDhisTransformer, TrackerCollaborators, TransformOutcome, TransformerRegistry,
};
