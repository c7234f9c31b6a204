//! Operator tables and configuration.

use std::sync::Arc;

use comfy_table::Table;
use fhir_cli::config::CliConfig;
use fhir_cli::report::{
    arguments_table, find_executable_script, issues_table, parse_resource_type, rules_table,
};
use fhir_model::{
    CodeSet, DataType, ExecutableScript, ExecutableScriptArg, FhirResourceType, FhirVersion,
    ProgramStageRuleData, Rule, RuleKind, Script, ScriptArg, ScriptType,
};
use fhir_rules::{MetadataSnapshot, MetadataSnapshotBuilder};
use fhir_script::{ConverterRegistry, ScriptRepository};
use uuid::Uuid;

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn rows(table: &Table) -> Vec<Vec<String>> {
    table
        .row_iter()
        .map(|row| row.cell_iter().map(|cell| cell.content()).collect())
        .collect()
}

fn event_rule(n: u128, order: i32) -> Rule {
    Rule::new(
        format!("rule {n}"),
        FhirResourceType::Observation,
        RuleKind::ProgramStageEvent(ProgramStageRuleData::default()),
    )
    .with_id(id(n))
    .with_evaluation_order(order)
}

fn lookup_snapshot() -> MetadataSnapshot {
    let script = Script::new("ORG_LOOKUP", ScriptType::Evaluate, DataType::OrgUnitRef)
        .with_id(id(1))
        .with_arg(
            ScriptArg::new("code", DataType::String)
                .with_id(id(2))
                .mandatory(),
        )
        .with_arg(
            ScriptArg::new("type", DataType::String)
                .with_id(id(3))
                .with_default("CODE"),
        )
        .with_arg(
            ScriptArg::new("tags", DataType::String)
                .with_id(id(4))
                .array(),
        );
    MetadataSnapshotBuilder::new()
        .script(script)
        .executable_script(
            ExecutableScript::new("ORG_LOOKUP_BASE", id(1))
                .with_id(id(10))
                .with_override(ExecutableScriptArg::new(id(2), Some("DISTRICT".into()))),
        )
        .executable_script(
            ExecutableScript::new("ORG_LOOKUP_FACILITY", id(1))
                .with_id(id(11))
                .with_base(id(10)),
        )
        .build()
        .unwrap()
}

#[test]
fn rules_are_listed_in_evaluation_order() {
    let mut stopping = event_rule(2, 10);
    stopping.stop = true;
    stopping.delete_enabled = true;
    let catalog = MetadataSnapshotBuilder::new()
        .code_set(CodeSet {
            id: id(500),
            code: "VITALS".into(),
            name: "Vitals".into(),
            values: Vec::new(),
        })
        .rule(event_rule(1, 0).with_applicable_code_set(id(500)))
        .rule(stopping)
        .build_catalog()
        .unwrap();
    let rules: Vec<Arc<Rule>> = catalog.rules().to_vec();

    let table = rules_table(catalog.snapshot(), &rules);
    assert_eq!(
        rows(&table),
        vec![
            vec![
                "10",
                "rule 2",
                "PROGRAM_STAGE_EVENT",
                "-",
                "create, update, delete",
                "yes"
            ],
            vec![
                "0",
                "rule 1",
                "PROGRAM_STAGE_EVENT",
                "VITALS",
                "create, update",
                "no"
            ],
        ]
    );
}

#[test]
fn arguments_show_value_origin() {
    let catalog = MetadataSnapshotBuilder::from_snapshot(&lookup_snapshot())
        .build_catalog()
        .unwrap();
    let info = catalog
        .resolve_script(id(11), FhirVersion::R4)
        .unwrap()
        .unwrap();
    let arguments = info
        .resolved_arguments(&ConverterRegistry::standard())
        .unwrap();

    let table = arguments_table(catalog.snapshot(), arguments);
    assert_eq!(
        rows(&table),
        vec![
            vec!["code", "STRING", "DISTRICT", "override ORG_LOOKUP_BASE"],
            vec!["type", "STRING", "CODE", "default"],
            vec!["tags", "STRING[]", "-", "-"],
        ]
    );
}

#[test]
fn executable_scripts_are_found_by_id_or_code() {
    let snapshot = lookup_snapshot();
    let by_code = find_executable_script(&snapshot, "ORG_LOOKUP_FACILITY").unwrap();
    assert_eq!(by_code.id, id(11));
    let by_id = find_executable_script(&snapshot, &id(10).to_string()).unwrap();
    assert_eq!(by_id.code, "ORG_LOOKUP_BASE");
    assert!(find_executable_script(&snapshot, "MISSING").is_none());
}

#[test]
fn snapshot_issues_are_tabulated() {
    let snapshot = MetadataSnapshot {
        rules: vec![event_rule(1, 0).with_filter_imp_script(id(77))],
        ..Default::default()
    };
    let issues = snapshot.validate();
    assert_eq!(issues.len(), 1);

    let table = issues_table(&issues);
    let rows = rows(&table);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "rule");
    assert_eq!(rows[0][1], id(1).to_string());
    assert!(rows[0][2].contains("does not exist"));
}

#[test]
fn resource_types_accept_resource_and_canonical_names() {
    assert_eq!(
        parse_resource_type("Observation"),
        Ok(FhirResourceType::Observation)
    );
    assert_eq!(
        parse_resource_type("OBSERVATION"),
        Ok(FhirResourceType::Observation)
    );
    assert!(parse_resource_type("Spaceship").is_err());
}

#[test]
fn config_defaults_without_transformer_table() {
    let config = CliConfig::parse("").unwrap();
    assert_eq!(config, CliConfig::default());
    assert!(config.transformer.sync_enabled);
    assert_eq!(config.transformer.fhir_version, FhirVersion::R4);
}

#[test]
fn config_reads_transformer_options() {
    let config = CliConfig::parse(
        r#"
        [transformer]
        fhir_version = "DSTU3"
        creation_disabled = true
        "#,
    )
    .unwrap();
    assert_eq!(config.transformer.fhir_version, FhirVersion::Dstu3);
    assert!(config.transformer.creation_disabled);
    assert!(!config.transformer.contained);
    assert!(config.transformer.sync_enabled);
}

#[test]
fn config_rejects_unknown_tables() {
    assert!(CliConfig::parse("[server]\nport = 8080\n").is_err());
}
