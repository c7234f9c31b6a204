use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fhir_model::TransformerOptions;
use fhir_rules::{MetadataSnapshot, RuleCatalog, RuleRepository, SnapshotError, SnapshotIssue};
use fhir_script::{ConverterRegistry, ScriptRepository};
use tracing::{debug, info, info_span, warn};

use fhir_cli::logging::redact_value;
use fhir_cli::report::{arguments_table, find_executable_script, issues_table, rules_table};

use crate::cli::{ArgsArgs, CheckArgs, RulesArgs};

pub fn run_rules(args: &RulesArgs, options: &TransformerOptions) -> Result<()> {
    let catalog = load_catalog(&args.metadata)?;
    let contained = args.contained || options.contained;
    let rules: Vec<_> = catalog
        .find_applicable_rules(args.resource_type, args.direction, Some(&args.codes))
        .into_iter()
        .filter(|rule| !contained || rule.contained_allowed)
        .collect();
    info!(
        resource_type = %args.resource_type,
        direction = %args.direction,
        codes = args.codes.len(),
        contained,
        rules = rules.len(),
        "resolved applicable rules"
    );
    if rules.is_empty() {
        println!("No applicable rules for {}.", args.resource_type);
        return Ok(());
    }
    println!("{}", rules_table(catalog.snapshot(), &rules));
    Ok(())
}

pub fn run_args(args: &ArgsArgs, options: &TransformerOptions) -> Result<()> {
    let catalog = load_catalog(&args.metadata)?;
    let fhir_version = args.fhir_version.unwrap_or(options.fhir_version);
    let executable_script = find_executable_script(catalog.snapshot(), &args.executable_script)
        .ok_or_else(|| anyhow!("executable script {} not found", args.executable_script))?;
    let span = info_span!("executable_script", code = %executable_script.code);
    let _guard = span.enter();

    let info = catalog
        .resolve_script(executable_script.id, fhir_version)?
        .ok_or_else(|| anyhow!("executable script {} not found", executable_script.code))?;
    let arguments = info.resolved_arguments(&ConverterRegistry::standard())?;
    for argument in arguments.iter() {
        let value = argument.value.to_string();
        debug!(
            argument = %argument.arg.name,
            value = redact_value(&value),
            "resolved script argument"
        );
    }
    if let Err(error) = arguments.check_mandatory() {
        warn!(%error, "executable script is incomplete");
    }
    if info.source().is_none() {
        warn!(%fhir_version, "script has no source for FHIR version");
    }

    println!(
        "Executable script: {} (script {}, {})",
        executable_script.code,
        info.script().code,
        fhir_version
    );
    if arguments.is_empty() {
        println!("The script declares no arguments.");
    } else {
        println!("{}", arguments_table(catalog.snapshot(), arguments));
    }
    Ok(())
}

/// Returns whether the snapshot is valid.
pub fn run_check(args: &CheckArgs) -> Result<bool> {
    let snapshot = MetadataSnapshot::load(&args.metadata)?;
    let mut issues = snapshot.validate();
    if issues.is_empty() {
        // chain resolution per FHIR version happens when indexing
        match RuleCatalog::new(snapshot) {
            Ok(_) => {}
            Err(SnapshotError::Invalid { issues: found }) => issues = found,
            Err(error) => return Err(error.into()),
        }
    }
    report_issues(&issues);
    Ok(issues.is_empty())
}

fn report_issues(issues: &[SnapshotIssue]) {
    if issues.is_empty() {
        println!("Metadata snapshot is valid.");
        return;
    }
    for issue in issues {
        debug!(kind = issue.kind, id = %issue.id, "snapshot issue");
    }
    println!("{}", issues_table(issues));
    println!("{} issue(s) found.", issues.len());
}

fn load_catalog(path: &Path) -> Result<RuleCatalog> {
    let snapshot = MetadataSnapshot::load(path)?;
    RuleCatalog::new(snapshot).with_context(|| format!("index metadata {}", path.display()))
}
