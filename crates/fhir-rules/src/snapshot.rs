#![deny(unsafe_code)]

//! Versioned, read-only metadata snapshots.
//!
//! A snapshot is the complete metadata used for transformations: rules,
//! code sets, scripts, executable scripts, mapped program stages and
//! resource mappings. It is authored elsewhere and loaded as JSON.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use fhir_model::{
    Code, CodeSet, ExecutableScript, FhirResourceMapping, MappedTrackerProgramStage, Result,
    Rule, RuleKind, Script, System, TransformerError,
};
use fhir_script::{ChainLevel, validate_executable_script};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SnapshotError, SnapshotIssue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub code_sets: Vec<CodeSet>,
    #[serde(default)]
    pub codes: Vec<Code>,
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub executable_scripts: Vec<ExecutableScript>,
    #[serde(default)]
    pub program_stages: Vec<MappedTrackerProgramStage>,
    #[serde(default)]
    pub resource_mappings: Vec<FhirResourceMapping>,
}

/// Executable scripts a rule refers to, with the purpose of each reference.
pub fn rule_script_references(rule: &Rule) -> Vec<(&'static str, Uuid)> {
    let mut references = vec![
        ("import filter script", rule.filter_imp_script_id),
        ("export filter script", rule.filter_exp_script_id),
        ("import transform script", rule.transform_imp_script_id),
        ("export transform script", rule.transform_exp_script_id),
    ];
    match &rule.kind {
        RuleKind::TrackedEntity(data) => {
            references.push(("org unit lookup script", data.org_unit_lookup_script_id));
            references.push(("location lookup script", data.location_lookup_script_id));
            references.push((
                "identifier lookup script",
                data.tei_identifier_lookup_script_id,
            ));
        }
        RuleKind::OrganizationUnit(data) => {
            references.push(("identifier lookup script", data.identifier_lookup_script_id));
        }
        RuleKind::Enrollment(data) => {
            references.push((
                "program reference lookup script",
                data.program_ref_lookup_script_id,
            ));
        }
        RuleKind::ProgramStageEvent(_)
        | RuleKind::ProgramMetadata
        | RuleKind::ProgramStageMetadata
        | RuleKind::DataValueSet(_) => {}
    }
    references
        .into_iter()
        .filter_map(|(purpose, id)| id.map(|id| (purpose, id)))
        .collect()
}

fn mapping_script_references(mapping: &FhirResourceMapping) -> Vec<(&'static str, Uuid)> {
    [
        ("tracked entity lookup script", mapping.imp_tei_lookup_script_id),
        ("enrollment org unit lookup script", mapping.imp_enrollment_org_lookup_script_id),
        ("enrollment date lookup script", mapping.imp_enrollment_date_lookup_script_id),
        ("enrollment location lookup script", mapping.imp_enrollment_geo_lookup_script_id),
        ("event org unit lookup script", mapping.imp_event_org_lookup_script_id),
        ("event date lookup script", mapping.imp_event_date_lookup_script_id),
        ("event location lookup script", mapping.imp_event_geo_lookup_script_id),
        ("effective date lookup script", mapping.imp_effective_date_lookup_script_id),
    ]
    .into_iter()
    .filter_map(|(purpose, id)| id.map(|id| (purpose, id)))
    .collect()
}

fn duplicate_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a Uuid>,
    issues: &mut Vec<SnapshotIssue>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(*id) {
            issues.push(SnapshotIssue::new(kind, *id, "duplicate id"));
        }
    }
}

impl MetadataSnapshot {
    pub fn load(path: &Path) -> std::result::Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        serde_json::from_str(&contents).map_err(|e| SnapshotError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn script(&self, id: Uuid) -> Option<&Script> {
        self.scripts.iter().find(|script| script.id == id)
    }

    pub fn executable_script(&self, id: Uuid) -> Option<&ExecutableScript> {
        self.executable_scripts
            .iter()
            .find(|executable_script| executable_script.id == id)
    }

    pub fn executable_script_by_code(&self, code: &str) -> Option<&ExecutableScript> {
        self.executable_scripts
            .iter()
            .find(|executable_script| executable_script.code == code)
    }

    /// Resolves the inheritance chain of an executable script, the
    /// executable script itself first.
    pub fn executable_script_chain(&self, id: Uuid) -> Result<Vec<ChainLevel>> {
        let mut chain: Vec<ChainLevel> = Vec::new();
        let mut visited = BTreeSet::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if !visited.insert(current) {
                return Err(TransformerError::configuration(format!(
                    "Executable script {id} has a cyclic base executable script chain"
                )));
            }
            let executable_script = self.executable_script(current).ok_or_else(|| {
                TransformerError::configuration(format!(
                    "Executable script {current} does not exist"
                ))
            })?;
            let script = self.script(executable_script.script_id).ok_or_else(|| {
                TransformerError::configuration(format!(
                    "Script {} of executable script {} does not exist",
                    executable_script.script_id, executable_script.code
                ))
            })?;
            chain.push(ChainLevel {
                executable_script: Arc::new(executable_script.clone()),
                script: Arc::new(script.clone()),
            });
            next = executable_script.base_executable_script_id;
        }
        Ok(chain)
    }

    /// Collects every violated invariant.
    pub fn validate(&self) -> Vec<SnapshotIssue> {
        let mut issues = Vec::new();
        duplicate_ids("rule", self.rules.iter().map(|rule| &rule.id), &mut issues);
        duplicate_ids("script", self.scripts.iter().map(|script| &script.id), &mut issues);
        duplicate_ids(
            "executable script",
            self.executable_scripts.iter().map(|value| &value.id),
            &mut issues,
        );
        duplicate_ids("code set", self.code_sets.iter().map(|value| &value.id), &mut issues);
        duplicate_ids("code", self.codes.iter().map(|value| &value.id), &mut issues);
        duplicate_ids("system", self.systems.iter().map(|value| &value.id), &mut issues);
        duplicate_ids(
            "program stage",
            self.program_stages.iter().map(|value| &value.id),
            &mut issues,
        );

        for script in &self.scripts {
            let mut names = HashSet::new();
            for arg in &script.args {
                if !names.insert(arg.name.as_str()) {
                    issues.push(SnapshotIssue::new(
                        "script",
                        script.id,
                        format!("argument {} is declared more than once", arg.name),
                    ));
                }
            }
        }

        for executable_script in &self.executable_scripts {
            if let Err(err) = self
                .executable_script_chain(executable_script.id)
                .and_then(|chain| validate_executable_script(&chain))
            {
                issues.push(SnapshotIssue::new(
                    "executable script",
                    executable_script.id,
                    err.to_string(),
                ));
            }
        }

        let executable_ids: HashSet<Uuid> =
            self.executable_scripts.iter().map(|value| value.id).collect();
        let code_set_ids: HashSet<Uuid> = self.code_sets.iter().map(|value| value.id).collect();
        let stage_ids: HashSet<Uuid> = self.program_stages.iter().map(|value| value.id).collect();

        for rule in &self.rules {
            if let Some(code_set_id) = rule.applicable_code_set_id
                && !code_set_ids.contains(&code_set_id)
            {
                issues.push(SnapshotIssue::new(
                    "rule",
                    rule.id,
                    format!("applicable code set {code_set_id} does not exist"),
                ));
            }
            for (purpose, id) in rule_script_references(rule) {
                if !executable_ids.contains(&id) {
                    issues.push(SnapshotIssue::new(
                        "rule",
                        rule.id,
                        format!("{purpose} {id} does not exist"),
                    ));
                }
            }
            if let RuleKind::ProgramStageEvent(data) = &rule.kind
                && let Some(stage_id) = data.program_stage_id
                && !stage_ids.contains(&stage_id)
            {
                issues.push(SnapshotIssue::new(
                    "rule",
                    rule.id,
                    format!("program stage {stage_id} does not exist"),
                ));
            }
        }

        let code_ids: HashSet<Uuid> = self.codes.iter().map(|value| value.id).collect();
        for code_set in &self.code_sets {
            for value in &code_set.values {
                if !code_ids.contains(&value.code_id) {
                    issues.push(SnapshotIssue::new(
                        "code set",
                        code_set.id,
                        format!("code {} does not exist", value.code_id),
                    ));
                }
            }
        }

        let system_ids: HashSet<Uuid> = self.systems.iter().map(|value| value.id).collect();
        for code in &self.codes {
            for system_code in &code.system_codes {
                if !system_ids.contains(&system_code.system_id) {
                    issues.push(SnapshotIssue::new(
                        "code",
                        code.id,
                        format!("system {} does not exist", system_code.system_id),
                    ));
                }
            }
        }

        let mut mapped_types = HashMap::new();
        for mapping in &self.resource_mappings {
            if let Some(other) = mapped_types.insert(mapping.fhir_resource_type, mapping.id) {
                issues.push(SnapshotIssue::new(
                    "resource mapping",
                    mapping.id,
                    format!(
                        "resource type {} is already mapped by {other}",
                        mapping.fhir_resource_type
                    ),
                ));
            }
            for (purpose, id) in mapping_script_references(mapping) {
                if !executable_ids.contains(&id) {
                    issues.push(SnapshotIssue::new(
                        "resource mapping",
                        mapping.id,
                        format!("{purpose} {id} does not exist"),
                    ));
                }
            }
        }

        issues
    }

    /// Fails with all issues if any invariant is violated.
    pub fn verify(&self) -> std::result::Result<(), SnapshotError> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SnapshotError::Invalid { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use fhir_model::{
        DataType, EnrollmentRuleData, ExecutableScriptArg, FhirResourceType, ScriptArg,
        ScriptType,
    };

    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn chain_resolution_detects_cycles() {
        let script = Script::new("S", ScriptType::Evaluate, DataType::Boolean).with_id(id(1));
        let snapshot = MetadataSnapshot {
            scripts: vec![script],
            executable_scripts: vec![
                ExecutableScript::new("A", id(1)).with_id(id(10)).with_base(id(11)),
                ExecutableScript::new("B", id(1)).with_id(id(11)).with_base(id(10)),
                ExecutableScript::new("C", id(1)).with_id(id(12)),
            ],
            ..Default::default()
        };
        assert!(snapshot.executable_script_chain(id(10)).is_err());
        assert_eq!(snapshot.executable_script_chain(id(12)).unwrap().len(), 1);
        let issues = snapshot.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|issue| issue.message.contains("cyclic")));
    }

    #[test]
    fn dangling_references_are_reported() {
        let script = Script::new("S", ScriptType::Evaluate, DataType::Boolean)
            .with_id(id(1))
            .with_arg(ScriptArg::new("a", DataType::String).with_id(id(2)));
        let rule = Rule::new(
            "R",
            FhirResourceType::Patient,
            RuleKind::Enrollment(EnrollmentRuleData {
                program_ref_lookup_script_id: Some(id(99)),
            }),
        )
        .with_id(id(5))
        .with_applicable_code_set(id(98));
        let snapshot = MetadataSnapshot {
            rules: vec![rule],
            scripts: vec![script],
            executable_scripts: vec![ExecutableScript::new("E", id(1))
                .with_id(id(10))
                .with_override(ExecutableScriptArg::new(id(3), None))],
            ..Default::default()
        };

        let messages: Vec<String> = snapshot
            .validate()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages[0].starts_with("executable script 00000000-0000-0000-0000-00000000000a"));
        assert!(messages[1].contains("applicable code set"));
        assert!(messages[2].contains("program reference lookup script"));
        assert!(snapshot.verify().is_err());
    }

    #[test]
    fn load_reports_path() {
        let err = MetadataSnapshot::load(Path::new("/nonexistent/metadata.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/metadata.json"));
    }
}
