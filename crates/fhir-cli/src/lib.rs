//! Operator tooling for FHIR to DHIS2 rule metadata.

pub mod config;
pub mod logging;
pub mod report;
