//! Code sets scoping the applicability of rules.
//!
//! A code set groups codes; a code is tied to external coding-system values
//! through its system codes. Everything is linked by id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reference::SystemCodeValue;

/// An external coding system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub id: Uuid,
    pub name: String,
    pub system_uri: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

/// Value of a [`Code`] in one external coding system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCode {
    pub id: Uuid,
    pub system_id: Uuid,
    pub system_code: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

impl SystemCode {
    /// Combined system URI and code value.
    pub fn system_code_value(&self, system: &System) -> SystemCodeValue {
        SystemCodeValue::new(system.system_uri.clone(), self.system_code.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub system_codes: Vec<SystemCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSetValue {
    pub code_id: Uuid,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSet {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub values: Vec<CodeSetValue>,
}

impl CodeSet {
    /// Ids of the codes whose membership in this set is enabled.
    pub fn enabled_code_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.values
            .iter()
            .filter(|value| value.enabled)
            .map(|value| value.code_id)
    }
}

fn enabled_default() -> bool {
    true
}
