//! Adapter configuration file.
//!
//! ```toml
//! [transformer]
//! fhir_version = "R4"
//! creation_disabled = false
//! contained = false
//! sync_enabled = true
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use fhir_model::TransformerOptions;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub transformer: TransformerOptions,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the file when one is given, defaults otherwise.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
