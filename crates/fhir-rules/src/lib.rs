#![deny(unsafe_code)]

//! Rule catalog for the FHIR to DHIS2 transformation core.
//!
//! - [`snapshot`]: versioned metadata snapshots and their validation
//! - [`builder`]: assembling new snapshot versions
//! - [`catalog`]: rule, script and mapping lookups over a verified snapshot
//! - [`coverage`]: skipping rules already covered by an executed rule

pub mod builder;
pub mod catalog;
pub mod coverage;
pub mod error;
pub mod repository;
pub mod snapshot;

pub use builder::MetadataSnapshotBuilder;
pub use catalog::RuleCatalog;
pub use coverage::RuleCoverageGuard;
pub use error::{SnapshotError, SnapshotIssue};
pub use repository::{MappingRepository, RuleRepository};
pub use snapshot::{MetadataSnapshot, rule_script_references};
