//! References to DHIS2 metadata and coded values of FHIR resources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

text_enum! {
    /// How a reference identifies its target.
    pub enum ReferenceType {
        Id => "ID",
        Code => "CODE",
        Name => "NAME",
    }
}

/// Reference to a DHIS2 metadata object by id, code or name.
///
/// The textual form is `TYPE:value`, for example `CODE:OU_1234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub value: String,
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
}

impl Reference {
    pub fn new(value: impl Into<String>, reference_type: ReferenceType) -> Self {
        Self {
            value: value.into(),
            reference_type,
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(value, ReferenceType::Id)
    }

    pub fn code(value: impl Into<String>) -> Self {
        Self::new(value, ReferenceType::Code)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(value, ReferenceType::Name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reference_type, self.value)
    }
}

impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Reference must have the form TYPE:value: {s}"))?;
        let reference_type = kind.parse::<ReferenceType>()?;
        if value.is_empty() {
            return Err(format!("Reference has an empty value: {s}"));
        }
        Ok(Self::new(value, reference_type))
    }
}

/// A coded value of a FHIR resource: coding system URI plus code.
///
/// The textual form is `system|code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemCodeValue {
    pub system: String,
    pub code: String,
}

impl SystemCodeValue {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for SystemCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.system, self.code)
    }
}

impl FromStr for SystemCodeValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('|') {
            Some((system, code)) if !system.is_empty() && !code.is_empty() => {
                Ok(Self::new(system, code))
            }
            _ => Err(format!("Coded value must have the form system|code: {s}")),
        }
    }
}
