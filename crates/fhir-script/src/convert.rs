//! Conversion of textual argument values into typed script values.
//!
//! Every [`DataType`] has one converter function. The registry is an
//! explicit map from type tag to function, built once and shared.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use fhir_model::{ConversionError, DataType, Location, Reference};
use regex::Regex;

use crate::value::ScriptValue;

/// Delimiter between the elements of an array value.
pub const ARRAY_DELIMITER: char = '|';

/// Converts one textual value of the given type.
pub type Converter = fn(DataType, &str) -> Result<ScriptValue, String>;

#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<DataType, Converter>,
}

static STANDARD: OnceLock<Arc<ConverterRegistry>> = OnceLock::new();

impl ConverterRegistry {
    /// Registry without any converters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the converters of all data types.
    pub fn with_standard_converters() -> Self {
        let mut registry = Self::empty();
        registry.register(DataType::Boolean, convert_boolean);
        registry.register(DataType::String, convert_text);
        registry.register(DataType::Constant, convert_text);
        registry.register(DataType::Code, convert_code);
        registry.register(DataType::Integer, convert_integer);
        registry.register(DataType::Double, convert_double);
        registry.register(DataType::DateTime, convert_date_time);
        registry.register(DataType::DateUnit, convert_enumeration);
        registry.register(DataType::WeightUnit, convert_enumeration);
        registry.register(DataType::Gender, convert_enumeration);
        registry.register(DataType::EventDecisionType, convert_enumeration);
        registry.register(DataType::Location, convert_location);
        registry.register(DataType::Pattern, convert_pattern);
        for data_type in DataType::ALL.iter().filter(|data_type| data_type.is_reference()) {
            registry.register(*data_type, convert_reference);
        }
        registry.register(DataType::FhirResource, reject_text);
        registry.register(DataType::FhirResourceList, reject_text);
        registry
    }

    /// Shared registry with the standard converters.
    pub fn standard() -> Arc<ConverterRegistry> {
        Arc::clone(STANDARD.get_or_init(|| Arc::new(Self::with_standard_converters())))
    }

    pub fn register(&mut self, data_type: DataType, converter: Converter) {
        self.converters.insert(data_type, converter);
    }

    pub fn converter(&self, data_type: DataType) -> Option<Converter> {
        self.converters.get(&data_type).copied()
    }

    /// Converts a single value.
    pub fn convert_value(
        &self,
        argument: &str,
        data_type: DataType,
        raw: &str,
    ) -> Result<ScriptValue, ConversionError> {
        let converter = self.converter(data_type).ok_or_else(|| {
            ConversionError::new(
                argument,
                raw,
                format!("no converter registered for data type {data_type}"),
            )
        })?;
        converter(data_type, raw).map_err(|message| ConversionError::new(argument, raw, message))
    }

    /// Converts a value that is an array of `|` separated elements when
    /// `array` is set. The failing element index is reported.
    pub fn convert(
        &self,
        argument: &str,
        data_type: DataType,
        array: bool,
        raw: &str,
    ) -> Result<ScriptValue, ConversionError> {
        if !array {
            return self.convert_value(argument, data_type, raw);
        }
        split_array(raw)
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                self.convert_value(argument, data_type, element)
                    .map_err(|err| err.at_index(index))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ScriptValue::Array)
    }

    /// Coerces a value returned by a script to the declared type. Strings
    /// are converted with the registered converter; other values must
    /// already conform.
    pub fn coerce(&self, value: ScriptValue, data_type: DataType) -> Result<ScriptValue, String> {
        if value.conforms_to(data_type) {
            return Ok(value);
        }
        match value {
            ScriptValue::String(text) => self
                .converter(data_type)
                .ok_or_else(|| format!("no converter registered for data type {data_type}"))
                .and_then(|converter| converter(data_type, &text)),
            ScriptValue::Array(values) => values
                .into_iter()
                .map(|value| self.coerce(value, data_type))
                .collect::<Result<Vec<_>, _>>()
                .map(ScriptValue::Array),
            other => Err(format!(
                "value of kind {} is not a value of type {data_type}",
                other.kind()
            )),
        }
    }
}

/// Splits an array value. Trailing empty elements are dropped; an empty
/// value is an empty array.
pub fn split_array(raw: &str) -> Vec<&str> {
    let mut elements: Vec<&str> = raw.split(ARRAY_DELIMITER).collect();
    while elements.last().is_some_and(|element| element.is_empty()) {
        elements.pop();
    }
    elements
}

fn convert_boolean(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(ScriptValue::Boolean(true)),
        "false" | "no" | "off" | "0" => Ok(ScriptValue::Boolean(false)),
        _ => Err("not a boolean value".to_string()),
    }
}

fn convert_text(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    Ok(ScriptValue::String(raw.to_string()))
}

fn convert_code(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    let code = raw.trim();
    if code.is_empty() {
        return Err("code must not be empty".to_string());
    }
    Ok(ScriptValue::String(code.to_string()))
}

fn convert_integer(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    raw.trim()
        .parse::<i64>()
        .map(ScriptValue::Integer)
        .map_err(|err| format!("not an integer: {err}"))
}

fn convert_double(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("not a number: {err}"))?;
    if !value.is_finite() {
        return Err("number must be finite".to_string());
    }
    Ok(ScriptValue::Double(value))
}

/// Accepts RFC 3339 timestamps, local date-times (taken as UTC) and dates.
fn convert_date_time(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    let text = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Ok(ScriptValue::DateTime(value.with_timezone(&Utc)));
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ScriptValue::DateTime(value.and_utc()));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| ScriptValue::DateTime(value.and_utc()))
        .ok_or_else(|| "not a date or date-time".to_string())
}

fn convert_enumeration(data_type: DataType, raw: &str) -> Result<ScriptValue, String> {
    let values = data_type
        .enumeration_values()
        .ok_or_else(|| format!("{data_type} is not an enumeration"))?;
    let text = raw.trim();
    values
        .iter()
        .find(|value| value.eq_ignore_ascii_case(text))
        .map(|value| ScriptValue::Enumeration {
            data_type,
            value: (*value).to_string(),
        })
        .ok_or_else(|| format!("expected one of {}", values.join(", ")))
}

/// Accepts `longitude,latitude`, optionally enclosed in brackets.
fn convert_location(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    let text = raw.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .or_else(|| text.strip_prefix('(').and_then(|inner| inner.strip_suffix(')')))
        .unwrap_or(text);
    let (longitude, latitude) = text
        .split_once(',')
        .ok_or_else(|| "location must have the form longitude,latitude".to_string())?;
    let longitude = longitude
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid longitude: {err}"))?;
    let latitude = latitude
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid latitude: {err}"))?;
    if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
        return Err("coordinates are out of range".to_string());
    }
    Ok(ScriptValue::Location(Location::new(longitude, latitude)))
}

fn convert_pattern(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    Regex::new(raw)
        .map(|_| ScriptValue::Pattern(raw.to_string()))
        .map_err(|err| format!("invalid pattern: {err}"))
}

fn convert_reference(_: DataType, raw: &str) -> Result<ScriptValue, String> {
    raw.trim().parse::<Reference>().map(ScriptValue::Reference)
}

fn reject_text(data_type: DataType, _: &str) -> Result<ScriptValue, String> {
    Err(format!("values of type {data_type} cannot be given as text"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn convert(data_type: DataType, raw: &str) -> Result<ScriptValue, ConversionError> {
        ConverterRegistry::standard().convert("arg", data_type, false, raw)
    }

    #[test]
    fn standard_registry_covers_every_type() {
        let registry = ConverterRegistry::standard();
        for data_type in DataType::ALL {
            assert!(registry.converter(*data_type).is_some(), "{data_type}");
        }
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(convert(DataType::Boolean, "Yes").unwrap(), ScriptValue::Boolean(true));
        assert_eq!(convert(DataType::Integer, " 42 ").unwrap(), ScriptValue::Integer(42));
        assert_eq!(convert(DataType::Double, "2.5").unwrap(), ScriptValue::Double(2.5));
        assert_eq!(
            convert(DataType::DateTime, "2024-03-01").unwrap(),
            ScriptValue::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            convert(DataType::DateTime, "2024-03-01T10:00:00+02:00").unwrap(),
            ScriptValue::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(
            convert(DataType::DateUnit, "weeks").unwrap(),
            ScriptValue::Enumeration {
                data_type: DataType::DateUnit,
                value: "WEEKS".into()
            }
        );
        assert_eq!(
            convert(DataType::Location, "[12.5, -3]").unwrap(),
            ScriptValue::Location(Location::new(12.5, -3.0))
        );
        assert_eq!(
            convert(DataType::OrgUnitRef, "CODE:OU_1").unwrap(),
            ScriptValue::Reference(Reference::code("OU_1"))
        );
        assert_eq!(
            convert(DataType::Pattern, "^[0-9]+$").unwrap(),
            ScriptValue::Pattern("^[0-9]+$".into())
        );
    }

    #[test]
    fn conversion_failures() {
        for (data_type, raw) in [
            (DataType::Boolean, "maybe"),
            (DataType::Integer, "1.5"),
            (DataType::Double, "NaN"),
            (DataType::DateTime, "yesterday"),
            (DataType::Gender, "X"),
            (DataType::Location, "200,10"),
            (DataType::Pattern, "(["),
            (DataType::ProgramRef, "Child Programme"),
            (DataType::FhirResource, "{}"),
            (DataType::Code, " "),
        ] {
            let err = convert(data_type, raw).unwrap_err();
            assert_eq!(err.argument, "arg");
            assert_eq!(err.value, raw);
            assert_eq!(err.index, None);
        }
    }

    #[test]
    fn array_failure_reports_element_index() {
        let err = ConverterRegistry::standard()
            .convert("codes", DataType::Integer, true, "1|2|x")
            .unwrap_err();
        assert_eq!(err.index, Some(2));
        assert_eq!(err.value, "x");
        insta::assert_snapshot!(
            err.to_string(),
            @r#"could not convert value "x" of argument "codes" (element 2): not an integer: invalid digit found in string"#
        );
    }

    #[test]
    fn array_split_drops_trailing_empty_elements() {
        assert_eq!(split_array("a|b||"), vec!["a", "b"]);
        assert_eq!(split_array("|a"), vec!["", "a"]);
        assert_eq!(split_array(""), Vec::<&str>::new());
        assert_eq!(
            ConverterRegistry::standard()
                .convert("a", DataType::String, true, "x|y|")
                .unwrap(),
            ScriptValue::Array(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn missing_converter() {
        let err = ConverterRegistry::empty()
            .convert_value("a", DataType::String, "x")
            .unwrap_err();
        assert!(err.message.contains("no converter"));
    }

    #[test]
    fn coerce_returned_strings() {
        let registry = ConverterRegistry::standard();
        assert_eq!(
            registry
                .coerce(ScriptValue::from("NAME:Child Programme"), DataType::ProgramRef)
                .unwrap(),
            ScriptValue::Reference(Reference::name("Child Programme"))
        );
        assert!(registry
            .coerce(ScriptValue::Boolean(true), DataType::DateTime)
            .is_err());
        assert_eq!(
            registry.coerce(ScriptValue::Null, DataType::DateTime).unwrap(),
            ScriptValue::Null
        );
    }
}
