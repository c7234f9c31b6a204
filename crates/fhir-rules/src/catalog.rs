//! Rule catalog over an immutable metadata snapshot.
//!
//! The catalog indexes a verified snapshot once: rules are kept in
//! evaluation order, code sets are resolved to the coded values of their
//! enabled codes, and executable scripts are resolved per FHIR version.
//! It holds no mutable state and can be shared across threads.
//!
//! # Example
//!
//! ```ignore
//! let catalog = RuleCatalog::new(MetadataSnapshot::load(path)?)?;
//! let rules = catalog.find_applicable_rules(
//!     FhirResourceType::Observation,
//!     TransformDirection::Import,
//!     Some(&resource.codes),
//! );
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fhir_model::{
    CodeSet, FhirResourceMapping, FhirResourceType, FhirVersion, MappedTrackerProgramStage,
    Result, Rule, SystemCodeValue, TransformDirection,
};
use fhir_script::{ExecutableScriptInfo, ScriptRepository};
use tracing::debug;
use uuid::Uuid;

use crate::error::{SnapshotError, SnapshotIssue};
use crate::repository::{MappingRepository, RuleRepository};
use crate::snapshot::MetadataSnapshot;

#[derive(Debug)]
pub struct RuleCatalog {
    snapshot: Arc<MetadataSnapshot>,
    rules: Vec<Arc<Rule>>,
    code_sets: HashMap<Uuid, CodeSet>,
    /// Enabled coded values per enabled code.
    code_values: HashMap<Uuid, Vec<SystemCodeValue>>,
    /// Codes of enabled codes by id.
    code_names: HashMap<Uuid, String>,
    scripts: HashMap<(Uuid, FhirVersion), Arc<ExecutableScriptInfo>>,
    program_stages: HashMap<Uuid, Arc<MappedTrackerProgramStage>>,
    resource_mappings: HashMap<FhirResourceType, Arc<FhirResourceMapping>>,
}

impl RuleCatalog {
    /// Verifies and indexes a snapshot.
    pub fn new(snapshot: MetadataSnapshot) -> std::result::Result<Self, SnapshotError> {
        snapshot.verify()?;

        let mut rules: Vec<Arc<Rule>> = snapshot.rules.iter().cloned().map(Arc::new).collect();
        rules.sort_by(|a, b| a.evaluation_cmp(b));

        let systems: HashMap<Uuid, _> = snapshot
            .systems
            .iter()
            .filter(|system| system.enabled)
            .map(|system| (system.id, system))
            .collect();
        let mut code_values = HashMap::new();
        let mut code_names = HashMap::new();
        for code in snapshot.codes.iter().filter(|code| code.enabled) {
            let values: Vec<SystemCodeValue> = code
                .system_codes
                .iter()
                .filter(|system_code| system_code.enabled)
                .filter_map(|system_code| {
                    systems
                        .get(&system_code.system_id)
                        .map(|system| system_code.system_code_value(system))
                })
                .collect();
            code_values.insert(code.id, values);
            code_names.insert(code.id, code.code.clone());
        }

        let mut scripts = HashMap::new();
        let mut issues = Vec::new();
        for executable_script in &snapshot.executable_scripts {
            for version in FhirVersion::ALL {
                let info = snapshot
                    .executable_script_chain(executable_script.id)
                    .and_then(|chain| {
                        let source = chain
                            .first()
                            .and_then(|level| level.script.source_for(*version))
                            .cloned();
                        ExecutableScriptInfo::new(chain, source)
                    });
                match info {
                    Ok(info) => {
                        scripts.insert((executable_script.id, *version), Arc::new(info));
                    }
                    Err(err) => issues.push(SnapshotIssue::new(
                        "executable script",
                        executable_script.id,
                        err.to_string(),
                    )),
                }
            }
        }
        if !issues.is_empty() {
            return Err(SnapshotError::Invalid { issues });
        }

        debug!(
            version = snapshot.version,
            rules = rules.len(),
            executable_scripts = snapshot.executable_scripts.len(),
            "indexed metadata snapshot"
        );

        Ok(Self {
            rules,
            code_sets: snapshot
                .code_sets
                .iter()
                .cloned()
                .map(|code_set| (code_set.id, code_set))
                .collect(),
            code_values,
            code_names,
            scripts,
            program_stages: snapshot
                .program_stages
                .iter()
                .map(|stage| (stage.id, Arc::new(stage.clone())))
                .collect(),
            resource_mappings: snapshot
                .resource_mappings
                .iter()
                .map(|mapping| (mapping.fhir_resource_type, Arc::new(mapping.clone())))
                .collect(),
            snapshot: Arc::new(snapshot),
        })
    }

    pub fn version(&self) -> u32 {
        self.snapshot.version
    }

    /// The snapshot this catalog was built from.
    pub fn snapshot(&self) -> &MetadataSnapshot {
        &self.snapshot
    }

    /// All rules in evaluation order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Enabled coded values of the enabled codes of a code set.
    pub fn enabled_code_values(&self, code_set_id: Uuid) -> Vec<&SystemCodeValue> {
        self.code_sets
            .get(&code_set_id)
            .map(|code_set| {
                code_set
                    .enabled_code_ids()
                    .filter_map(|code_id| self.code_values.get(&code_id))
                    .flatten()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn code_set_matches(&self, code_set_id: Uuid, codes: &HashSet<&SystemCodeValue>) -> bool {
        self.enabled_code_values(code_set_id)
            .into_iter()
            .any(|value| codes.contains(value))
    }

    fn code_set_contains_code(&self, code_set_id: Uuid, code_set_codes: &[String]) -> bool {
        self.code_sets.get(&code_set_id).is_some_and(|code_set| {
            code_set.enabled_code_ids().any(|code_id| {
                self.code_names
                    .get(&code_id)
                    .is_some_and(|code| code_set_codes.contains(code))
            })
        })
    }

    fn candidates(
        &self,
        resource_type: FhirResourceType,
        direction: TransformDirection,
    ) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().filter(move |rule| {
            rule.fhir_resource_type == resource_type && rule.is_applicable_for(direction)
        })
    }
}

impl RuleRepository for RuleCatalog {
    fn find_applicable_rules(
        &self,
        resource_type: FhirResourceType,
        direction: TransformDirection,
        codes: Option<&[SystemCodeValue]>,
    ) -> Vec<Arc<Rule>> {
        let codes: Option<HashSet<&SystemCodeValue>> = codes.map(|codes| codes.iter().collect());
        self.candidates(resource_type, direction)
            .filter(|rule| match (rule.applicable_code_set_id, &codes) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(code_set_id), Some(codes)) => self.code_set_matches(code_set_id, codes),
            })
            .cloned()
            .collect()
    }

    fn find_rules_by_code_set_codes(
        &self,
        resource_type: FhirResourceType,
        direction: TransformDirection,
        code_set_codes: &[String],
    ) -> Vec<Arc<Rule>> {
        self.candidates(resource_type, direction)
            .filter(|rule| match rule.applicable_code_set_id {
                None => true,
                Some(code_set_id) => self.code_set_contains_code(code_set_id, code_set_codes),
            })
            .cloned()
            .collect()
    }

    fn find_rule(&self, id: Uuid) -> Option<Arc<Rule>> {
        self.rules.iter().find(|rule| rule.id == id).cloned()
    }
}

impl ScriptRepository for RuleCatalog {
    fn resolve_script(
        &self,
        executable_script_id: Uuid,
        fhir_version: FhirVersion,
    ) -> Result<Option<Arc<ExecutableScriptInfo>>> {
        Ok(self
            .scripts
            .get(&(executable_script_id, fhir_version))
            .cloned())
    }
}

impl MappingRepository for RuleCatalog {
    fn find_resource_mapping(
        &self,
        resource_type: FhirResourceType,
    ) -> Option<Arc<FhirResourceMapping>> {
        self.resource_mappings.get(&resource_type).cloned()
    }

    fn find_mapped_program_stage(&self, id: Uuid) -> Option<Arc<MappedTrackerProgramStage>> {
        self.program_stages.get(&id).cloned()
    }
}
