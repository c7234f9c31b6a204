//! Typed values exchanged with scripts.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use fhir_model::{DataType, Location, Reference};
use serde_json::{Value, json};

/// A typed script argument, variable or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    /// Canonical value of an enumerated data type.
    Enumeration { data_type: DataType, value: String },
    Location(Location),
    /// A validated regular expression.
    Pattern(String),
    Reference(Reference),
    Array(Vec<ScriptValue>),
    /// Structured value such as a FHIR resource.
    Json(Value),
}

impl ScriptValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(value) | ScriptValue::Pattern(value) => Some(value),
            ScriptValue::Enumeration { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            ScriptValue::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            ScriptValue::Reference(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<Location> {
        match self {
            ScriptValue::Location(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Boolean(_) => "boolean",
            ScriptValue::Integer(_) => "integer",
            ScriptValue::Double(_) => "double",
            ScriptValue::String(_) => "string",
            ScriptValue::DateTime(_) => "date-time",
            ScriptValue::Enumeration { .. } => "enumeration",
            ScriptValue::Location(_) => "location",
            ScriptValue::Pattern(_) => "pattern",
            ScriptValue::Reference(_) => "reference",
            ScriptValue::Array(_) => "array",
            ScriptValue::Json(_) => "structured value",
        }
    }

    /// Returns true if the value can be used where the data type is
    /// declared. Null conforms to every type.
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (ScriptValue::Null, _) => true,
            (ScriptValue::Array(values), DataType::FhirResourceList) => values
                .iter()
                .all(|value| value.conforms_to(DataType::FhirResource)),
            (ScriptValue::Array(values), _) => values.iter().all(|value| value.conforms_to(data_type)),
            (ScriptValue::Boolean(_), DataType::Boolean)
            | (ScriptValue::Integer(_), DataType::Integer | DataType::Double)
            | (ScriptValue::Double(_), DataType::Double)
            | (
                ScriptValue::String(_),
                DataType::String | DataType::Constant | DataType::Code | DataType::Pattern,
            )
            | (ScriptValue::DateTime(_), DataType::DateTime)
            | (ScriptValue::Location(_), DataType::Location)
            | (ScriptValue::Pattern(_), DataType::Pattern)
            | (ScriptValue::Json(_), DataType::FhirResource | DataType::FhirResourceList) => true,
            (ScriptValue::Enumeration { data_type: actual, .. }, expected) => *actual == expected,
            (ScriptValue::Reference(_), expected) => expected.is_reference(),
            _ => false,
        }
    }

    /// Converts an evaluator JSON result. Objects stay structured.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(value) => ScriptValue::Boolean(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => ScriptValue::Integer(value),
                None => number
                    .as_f64()
                    .map_or(ScriptValue::Null, ScriptValue::Double),
            },
            Value::String(value) => ScriptValue::String(value),
            Value::Array(values) => {
                ScriptValue::Array(values.into_iter().map(ScriptValue::from_json).collect())
            }
            object @ Value::Object(_) => ScriptValue::Json(object),
        }
    }

    /// JSON projection handed to script engines.
    pub fn to_json(&self) -> Value {
        match self {
            ScriptValue::Null => Value::Null,
            ScriptValue::Boolean(value) => Value::Bool(*value),
            ScriptValue::Integer(value) => json!(value),
            ScriptValue::Double(value) => serde_json::Number::from_f64(*value)
                .map_or(Value::Null, Value::Number),
            ScriptValue::String(value) | ScriptValue::Pattern(value) => Value::String(value.clone()),
            ScriptValue::DateTime(value) => {
                Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            ScriptValue::Enumeration { value, .. } => Value::String(value.clone()),
            ScriptValue::Location(location) => json!({
                "longitude": location.longitude,
                "latitude": location.latitude,
            }),
            ScriptValue::Reference(reference) => json!({
                "value": reference.value,
                "type": reference.reference_type.as_str(),
            }),
            ScriptValue::Array(values) => Value::Array(values.iter().map(ScriptValue::to_json).collect()),
            ScriptValue::Json(value) => value.clone(),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Null => f.write_str("null"),
            ScriptValue::Boolean(value) => write!(f, "{value}"),
            ScriptValue::Integer(value) => write!(f, "{value}"),
            ScriptValue::Double(value) => write!(f, "{value}"),
            ScriptValue::String(value) | ScriptValue::Pattern(value) => f.write_str(value),
            ScriptValue::DateTime(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            ScriptValue::Enumeration { value, .. } => f.write_str(value),
            ScriptValue::Location(location) => write!(f, "{location}"),
            ScriptValue::Reference(reference) => write!(f, "{reference}"),
            ScriptValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join("|"))
            }
            ScriptValue::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Boolean(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<Reference> for ScriptValue {
    fn from(value: Reference) -> Self {
        ScriptValue::Reference(value)
    }
}

impl From<DateTime<Utc>> for ScriptValue {
    fn from(value: DateTime<Utc>) -> Self {
        ScriptValue::DateTime(value)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ScriptValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conformance() {
        assert!(ScriptValue::Null.conforms_to(DataType::ProgramRef));
        assert!(ScriptValue::Integer(1).conforms_to(DataType::Double));
        assert!(!ScriptValue::Double(1.5).conforms_to(DataType::Integer));
        assert!(ScriptValue::Reference(Reference::code("P")).conforms_to(DataType::ProgramRef));
        assert!(!ScriptValue::Reference(Reference::code("P")).conforms_to(DataType::String));
        assert!(
            ScriptValue::Array(vec![ScriptValue::Boolean(true)]).conforms_to(DataType::Boolean)
        );
        let unit = ScriptValue::Enumeration {
            data_type: DataType::DateUnit,
            value: "DAYS".into(),
        };
        assert!(unit.conforms_to(DataType::DateUnit));
        assert!(!unit.conforms_to(DataType::WeightUnit));
    }

    #[test]
    fn json_projection() {
        let value = ScriptValue::Array(vec![
            ScriptValue::Reference(Reference::id("abc")),
            ScriptValue::Location(Location::new(1.5, -2.0)),
        ]);
        assert_eq!(
            value.to_json(),
            json!([{"value": "abc", "type": "ID"}, {"longitude": 1.5, "latitude": -2.0}])
        );
    }

    #[test]
    fn from_json_keeps_objects_structured() {
        assert_eq!(ScriptValue::from_json(json!(true)), ScriptValue::Boolean(true));
        assert_eq!(ScriptValue::from_json(json!(3)), ScriptValue::Integer(3));
        assert_eq!(ScriptValue::from_json(json!(2.5)), ScriptValue::Double(2.5));
        assert_eq!(
            ScriptValue::from_json(json!({"a": 1})),
            ScriptValue::Json(json!({"a": 1}))
        );
    }
}
