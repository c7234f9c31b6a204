//! Assembles a new snapshot version from an existing one.
//!
//! Entities are replaced by id. A replaced executable script keeps the ids
//! of the overrides it already had for the same arguments.

use std::sync::Arc;

use fhir_model::{
    Code, CodeSet, ExecutableScript, FhirResourceMapping, MappedTrackerProgramStage, Rule, Script,
    System,
};
use fhir_script::merge_overrides;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::RuleCatalog;
use crate::error::SnapshotError;
use crate::snapshot::MetadataSnapshot;

#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshotBuilder {
    snapshot: MetadataSnapshot,
}

fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> Uuid) {
    let item_id = id(&item);
    match items.iter_mut().find(|existing| id(existing) == item_id) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl MetadataSnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the next version of an existing snapshot.
    pub fn from_snapshot(snapshot: &MetadataSnapshot) -> Self {
        let mut snapshot = snapshot.clone();
        snapshot.version += 1;
        Self { snapshot }
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        upsert(&mut self.snapshot.rules, rule, |rule| rule.id);
        self
    }

    #[must_use]
    pub fn code_set(mut self, code_set: CodeSet) -> Self {
        upsert(&mut self.snapshot.code_sets, code_set, |code_set| code_set.id);
        self
    }

    #[must_use]
    pub fn code(mut self, code: Code) -> Self {
        upsert(&mut self.snapshot.codes, code, |code| code.id);
        self
    }

    #[must_use]
    pub fn system(mut self, system: System) -> Self {
        upsert(&mut self.snapshot.systems, system, |system| system.id);
        self
    }

    #[must_use]
    pub fn script(mut self, script: Script) -> Self {
        upsert(&mut self.snapshot.scripts, script, |script| script.id);
        self
    }

    #[must_use]
    pub fn executable_script(mut self, mut executable_script: ExecutableScript) -> Self {
        if let Some(existing) = self.snapshot.executable_script(executable_script.id) {
            executable_script.overrides =
                merge_overrides(&existing.overrides, &executable_script.overrides);
            debug!(
                executable_script = %executable_script.code,
                "replacing executable script"
            );
        }
        upsert(
            &mut self.snapshot.executable_scripts,
            executable_script,
            |executable_script| executable_script.id,
        );
        self
    }

    #[must_use]
    pub fn program_stage(mut self, stage: MappedTrackerProgramStage) -> Self {
        upsert(&mut self.snapshot.program_stages, stage, |stage| stage.id);
        self
    }

    /// Sets the mapping of a resource type, replacing any earlier one.
    #[must_use]
    pub fn resource_mapping(mut self, mapping: FhirResourceMapping) -> Self {
        self.snapshot
            .resource_mappings
            .retain(|existing| existing.fhir_resource_type != mapping.fhir_resource_type);
        self.snapshot.resource_mappings.push(mapping);
        self
    }

    /// Verifies and returns the snapshot.
    pub fn build(self) -> Result<MetadataSnapshot, SnapshotError> {
        self.snapshot.verify()?;
        Ok(self.snapshot)
    }

    pub fn build_catalog(self) -> Result<Arc<RuleCatalog>, SnapshotError> {
        RuleCatalog::new(self.build()?).map(Arc::new)
    }
}
