//! Tables printed by the operator commands.

use std::sync::Arc;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use fhir_model::{ExecutableScript, FhirResourceType, Rule};
use fhir_rules::{MetadataSnapshot, SnapshotIssue};
use fhir_script::{ArgumentOrigin, ResolvedArguments};
use uuid::Uuid;

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

/// Applicable rules in evaluation order.
pub fn rules_table(snapshot: &MetadataSnapshot, rules: &[Arc<Rule>]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Order"),
        header_cell("Rule"),
        header_cell("DHIS2 type"),
        header_cell("Code set"),
        header_cell("Operations"),
        header_cell("Stop"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 5, CellAlignment::Center);
    for rule in rules {
        let code_set = rule.applicable_code_set_id.map(|id| code_set_label(snapshot, id));
        table.add_row(vec![
            Cell::new(rule.evaluation_order),
            Cell::new(&rule.name).add_attribute(Attribute::Bold),
            Cell::new(rule.dhis_resource_type()),
            code_set.map_or_else(|| dim_cell("-"), Cell::new),
            Cell::new(operations(rule)),
            if rule.stop {
                Cell::new("yes").fg(Color::Yellow)
            } else {
                dim_cell("no")
            },
        ]);
    }
    table
}

/// Resolved argument values of an executable script.
pub fn arguments_table(snapshot: &MetadataSnapshot, arguments: &ResolvedArguments) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Argument"),
        header_cell("Type"),
        header_cell("Value"),
        header_cell("Origin"),
    ]);
    apply_table_style(&mut table);
    for argument in arguments.iter() {
        let data_type = if argument.arg.array {
            format!("{}[]", argument.arg.data_type)
        } else {
            argument.arg.data_type.to_string()
        };
        let mut name = Cell::new(&argument.arg.name);
        if argument.arg.mandatory {
            name = name.add_attribute(Attribute::Bold);
        }
        let value = if argument.value.is_null() {
            dim_cell("-")
        } else {
            Cell::new(argument.value.to_string())
        };
        table.add_row(vec![
            name,
            Cell::new(data_type),
            value,
            Cell::new(origin_label(snapshot, argument.origin)),
        ]);
    }
    table
}

/// Violated snapshot invariants.
pub fn issues_table(issues: &[SnapshotIssue]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Kind"),
        header_cell("Id"),
        header_cell("Issue"),
    ]);
    apply_table_style(&mut table);
    for issue in issues {
        table.add_row(vec![
            Cell::new(issue.kind).fg(Color::Red),
            dim_cell(issue.id),
            Cell::new(&issue.message),
        ]);
    }
    table
}

/// Looks up an executable script by id, then by code.
pub fn find_executable_script<'a>(
    snapshot: &'a MetadataSnapshot,
    id_or_code: &str,
) -> Option<&'a ExecutableScript> {
    id_or_code
        .parse::<Uuid>()
        .ok()
        .and_then(|id| snapshot.executable_script(id))
        .or_else(|| snapshot.executable_script_by_code(id_or_code))
}

/// Accepts FHIR resource names (`Observation`) and canonical names
/// (`OBSERVATION`).
pub fn parse_resource_type(value: &str) -> Result<FhirResourceType, String> {
    FhirResourceType::from_resource_name(value).map_or_else(|| value.parse(), Ok)
}

fn operations(rule: &Rule) -> String {
    let operations: Vec<&str> = [
        (rule.create_enabled, "create"),
        (rule.update_enabled, "update"),
        (rule.delete_enabled, "delete"),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect();
    operations.join(", ")
}

fn code_set_label(snapshot: &MetadataSnapshot, id: Uuid) -> String {
    snapshot
        .code_sets
        .iter()
        .find(|code_set| code_set.id == id)
        .map_or_else(|| id.to_string(), |code_set| code_set.code.clone())
}

fn origin_label(snapshot: &MetadataSnapshot, origin: ArgumentOrigin) -> String {
    match origin {
        ArgumentOrigin::Override(id) => {
            let code = snapshot
                .executable_script(id)
                .map_or_else(|| id.to_string(), |script| script.code.clone());
            format!("override {code}")
        }
        ArgumentOrigin::Default => "default".to_string(),
        ArgumentOrigin::Explicit => "explicit".to_string(),
        ArgumentOrigin::Unset => "-".to_string(),
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
