//! Scripts, their declared arguments and argument-bound executable scripts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{DataType, FhirVersion, ScriptLanguage, ScriptType};

/// Closed set of variables a script may read. Scripts have no other globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptVariable {
    Context,
    Input,
    Output,
    Resource,
    Program,
    ProgramStage,
    Enrollment,
    Event,
    TrackedEntityType,
    TrackedEntityAttributes,
    TrackedEntityInstance,
    DateTime,
    OrganizationUnit,
    OrganizationUnitId,
    SearchFilter,
    ProgramStageEvents,
    Args,
}

impl ScriptVariable {
    pub const ALL: &'static [ScriptVariable] = &[
        ScriptVariable::Context,
        ScriptVariable::Input,
        ScriptVariable::Output,
        ScriptVariable::Resource,
        ScriptVariable::Program,
        ScriptVariable::ProgramStage,
        ScriptVariable::Enrollment,
        ScriptVariable::Event,
        ScriptVariable::TrackedEntityType,
        ScriptVariable::TrackedEntityAttributes,
        ScriptVariable::TrackedEntityInstance,
        ScriptVariable::DateTime,
        ScriptVariable::OrganizationUnit,
        ScriptVariable::OrganizationUnitId,
        ScriptVariable::SearchFilter,
        ScriptVariable::ProgramStageEvents,
        ScriptVariable::Args,
    ];

    /// Name under which the variable is visible to scripts.
    pub fn variable_name(&self) -> &'static str {
        match self {
            ScriptVariable::Context => "context",
            ScriptVariable::Input => "input",
            ScriptVariable::Output => "output",
            ScriptVariable::Resource => "resource",
            ScriptVariable::Program => "program",
            ScriptVariable::ProgramStage => "programStage",
            ScriptVariable::Enrollment => "enrollment",
            ScriptVariable::Event => "event",
            ScriptVariable::TrackedEntityType => "trackedEntityType",
            ScriptVariable::TrackedEntityAttributes => "trackedEntityAttributes",
            ScriptVariable::TrackedEntityInstance => "trackedEntityInstance",
            ScriptVariable::DateTime => "dateTime",
            ScriptVariable::OrganizationUnit => "organizationUnit",
            ScriptVariable::OrganizationUnitId => "organizationUnitId",
            ScriptVariable::SearchFilter => "searchFilter",
            ScriptVariable::ProgramStageEvents => "programStageEvents",
            ScriptVariable::Args => "args",
        }
    }
}

impl fmt::Display for ScriptVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variable_name())
    }
}

impl FromStr for ScriptVariable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|variable| variable.variable_name() == s.trim())
            .ok_or_else(|| format!("Unknown script variable: {s}"))
    }
}

/// Declared parameter of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptArg {
    pub id: Uuid,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub array: bool,
    /// Default value; array values are separated by `|`.
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScriptArg {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data_type,
            mandatory: false,
            array: false,
            default_value: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Source text of a script for one language and a set of FHIR versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSource {
    pub id: Uuid,
    pub language: ScriptLanguage,
    pub fhir_versions: BTreeSet<FhirVersion>,
    pub source_text: String,
}

impl ScriptSource {
    pub fn new(language: ScriptLanguage, source_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            language,
            fhir_versions: FhirVersion::ALL.iter().copied().collect(),
            source_text: source_text.into(),
        }
    }

    pub fn supports(&self, version: FhirVersion) -> bool {
        self.fhir_versions.contains(&version)
    }
}

/// A reusable parametrized script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub script_type: ScriptType,
    pub return_type: DataType,
    #[serde(default)]
    pub input_type: Option<DataType>,
    #[serde(default)]
    pub output_type: Option<DataType>,
    #[serde(default)]
    pub variables: BTreeSet<ScriptVariable>,
    #[serde(default)]
    pub args: Vec<ScriptArg>,
    #[serde(default)]
    pub sources: Vec<ScriptSource>,
}

impl Script {
    pub fn new(
        code: impl Into<String>,
        script_type: ScriptType,
        return_type: DataType,
    ) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            name: code.clone(),
            code,
            script_type,
            return_type,
            input_type: None,
            output_type: None,
            variables: BTreeSet::new(),
            args: Vec::new(),
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: impl IntoIterator<Item = ScriptVariable>) -> Self {
        self.variables.extend(variables);
        self
    }

    #[must_use]
    pub fn with_arg(mut self, arg: ScriptArg) -> Self {
        self.args.push(arg);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: ScriptSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn arg(&self, id: Uuid) -> Option<&ScriptArg> {
        self.args.iter().find(|arg| arg.id == id)
    }

    /// First source that supports the FHIR version.
    pub fn source_for(&self, version: FhirVersion) -> Option<&ScriptSource> {
        self.sources.iter().find(|source| source.supports(version))
    }
}

/// Per-use override of one script argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableScriptArg {
    pub id: Uuid,
    /// The overridden [`ScriptArg`].
    pub argument_id: Uuid,
    #[serde(default)]
    pub override_value: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl ExecutableScriptArg {
    pub fn new(argument_id: Uuid, override_value: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            argument_id,
            override_value,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A concrete, argument-bound instance of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableScript {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub script_id: Uuid,
    /// Executable script whose overrides are inherited.
    #[serde(default)]
    pub base_executable_script_id: Option<Uuid>,
    #[serde(default)]
    pub overrides: Vec<ExecutableScriptArg>,
}

impl ExecutableScript {
    pub fn new(code: impl Into<String>, script_id: Uuid) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            name: code.clone(),
            code,
            script_id,
            base_executable_script_id: None,
            overrides: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_base(mut self, base_id: Uuid) -> Self {
        self.base_executable_script_id = Some(base_id);
        self
    }

    #[must_use]
    pub fn with_override(mut self, value: ExecutableScriptArg) -> Self {
        self.overrides.push(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_round_trip() {
        for variable in ScriptVariable::ALL {
            assert_eq!(
                variable.variable_name().parse::<ScriptVariable>().unwrap(),
                *variable
            );
        }
        let json = serde_json::to_string(&ScriptVariable::TrackedEntityAttributes).unwrap();
        assert_eq!(json, "\"trackedEntityAttributes\"");
    }

    #[test]
    fn source_selection_by_version() {
        let mut r4_only = ScriptSource::new(ScriptLanguage::Native, "r4");
        r4_only.fhir_versions = [FhirVersion::R4].into_iter().collect();
        let script = Script::new("S", ScriptType::Evaluate, DataType::Boolean)
            .with_source(r4_only)
            .with_source(ScriptSource::new(ScriptLanguage::Native, "all"));

        assert_eq!(script.source_for(FhirVersion::R4).unwrap().source_text, "r4");
        assert_eq!(
            script.source_for(FhirVersion::Dstu3).unwrap().source_text,
            "all"
        );
    }

    #[test]
    fn overrides_are_enabled_by_default_in_documents() {
        let json = r#"{"id":"00000000-0000-0000-0000-000000000001","argumentId":"00000000-0000-0000-0000-000000000002","overrideValue":"x"}"#;
        let value: ExecutableScriptArg = serde_json::from_str(json).unwrap();
        assert!(value.enabled);
        assert_eq!(value.override_value.as_deref(), Some("x"));
    }
}
