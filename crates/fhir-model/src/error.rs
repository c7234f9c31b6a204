//! Error taxonomy shared by rule resolution, script binding and transformation.
//!
//! The variants follow how far a failure reaches:
//!
//! - **Configuration**: malformed metadata or an unmapped enum arm. Aborts the
//!   processing of the current resource and needs operator attention.
//! - **Mapping**: a required lookup found no mapping. Aborts the current rule only.
//! - **Data** / **Conversion**: the input or a script produced an invalid value.
//!   Aborts the current rule only.
//! - **Script**: the injected evaluator failed. Carries rule and script identity.

use std::fmt;

use thiserror::Error;

/// Failure converting a string value into the typed value of a script argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    /// Name of the script argument.
    pub argument: String,
    /// Element index for array arguments.
    pub index: Option<usize>,
    /// The offending raw value.
    pub value: String,
    /// Converter message.
    pub message: String,
}

impl ConversionError {
    pub fn new(
        argument: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            argument: argument.into(),
            index: None,
            value: value.into(),
            message: message.into(),
        }
    }

    /// Attach the index of the failing array element.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not convert value \"{}\" of argument \"{}\"",
            self.value, self.argument
        )?;
        if let Some(index) = self.index {
            write!(f, " (element {index})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ConversionError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("data error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("script \"{script}\" of rule {rule} failed: {message}")]
    Script {
        rule: String,
        script: String,
        message: String,
    },

    #[error("invalid request: {0}")]
    Request(String),

    #[error("transformation has been aborted")]
    Aborted,
}

impl TransformerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    pub fn script(
        rule: impl Into<String>,
        script: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Script {
            rule: rule.into(),
            script: script.into(),
            message: message.into(),
        }
    }

    /// Returns true if processing of the whole resource must stop.
    pub fn is_fatal(&self) -> bool {
        !self.aborts_rule_only()
    }

    /// Returns true if only the current rule is abandoned and the next
    /// candidate rule may still be evaluated.
    pub fn aborts_rule_only(&self) -> bool {
        matches!(self, Self::Mapping(_) | Self::Data(_) | Self::Conversion(_))
    }

    /// Returns true for data errors, including conversion failures.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Data(_) | Self::Conversion(_))
    }
}

pub type Result<T> = std::result::Result<T, TransformerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_argument_and_index() {
        let err = ConversionError::new("codes", "x", "not a number").at_index(2);
        insta::assert_snapshot!(
            err.to_string(),
            @r#"could not convert value "x" of argument "codes" (element 2): not a number"#
        );
    }

    #[test]
    fn classification() {
        assert!(TransformerError::configuration("x").is_fatal());
        assert!(TransformerError::mapping("x").aborts_rule_only());
        assert!(TransformerError::data("x").aborts_rule_only());
        assert!(TransformerError::script("r", "s", "m").is_fatal());
        assert!(TransformerError::Aborted.is_fatal());

        let conversion: TransformerError = ConversionError::new("a", "b", "c").into();
        assert!(conversion.is_data_error());
        assert!(conversion.aborts_rule_only());
    }
}
