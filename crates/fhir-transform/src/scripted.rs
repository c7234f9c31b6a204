//! Writable scripted facades over the enrollments and events a
//! transformation produces.
//!
//! Transform scripts write through these facades only. Each write marks the
//! underlying resource as modified when the value changes, and a modified
//! resource is validated before it leaves the pipeline.

use chrono::{DateTime, Utc};
use fhir_model::{
    DataType, DataValue, DhisResourceType, Enrollment, EnrollmentStatus, Event, EventStatus,
    Location, Program, ProgramStage, ReferenceType, TransformerError,
};
use fhir_script::{ConverterRegistry, ScriptValue, WritableScriptedResource};
use serde_json::Value;

/// Prefix of the properties that address data values of an event.
pub const DATA_VALUE_PREFIX: &str = "dataValues.";

fn date_time(
    converters: &ConverterRegistry,
    property: &str,
    value: &ScriptValue,
) -> Result<Option<DateTime<Utc>>, String> {
    match converters.coerce(value.clone(), DataType::DateTime)? {
        ScriptValue::Null => Ok(None),
        ScriptValue::DateTime(value) => Ok(Some(value)),
        other => Err(format!(
            "property {property} requires a date-time, not a {}",
            other.kind()
        )),
    }
}

fn location(
    converters: &ConverterRegistry,
    property: &str,
    value: &ScriptValue,
) -> Result<Option<Location>, String> {
    match converters.coerce(value.clone(), DataType::Location)? {
        ScriptValue::Null => Ok(None),
        ScriptValue::Location(value) => Ok(Some(value)),
        other => Err(format!(
            "property {property} requires a location, not a {}",
            other.kind()
        )),
    }
}

fn org_unit_id(property: &str, value: &ScriptValue) -> Result<Option<String>, String> {
    match value {
        ScriptValue::Null => Ok(None),
        ScriptValue::String(id) => Ok(Some(id.clone())),
        ScriptValue::Reference(reference) if reference.reference_type == ReferenceType::Id => {
            Ok(Some(reference.value.clone()))
        }
        ScriptValue::Reference(reference) => Err(format!(
            "property {property} requires an id reference, not {reference}"
        )),
        other => Err(format!(
            "property {property} requires an organization unit id, not a {}",
            other.kind()
        )),
    }
}

fn status<T: serde::de::DeserializeOwned>(property: &str, value: &ScriptValue) -> Result<T, String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("property {property} requires a status, not a {}", value.kind()))?;
    serde_json::from_value(Value::String(text.trim().to_uppercase()))
        .map_err(|_| format!("unknown status {text}"))
}

fn read_only(property: &str) -> String {
    format!("property {property} cannot be written")
}

fn assign<T: PartialEq>(field: &mut T, value: T, modified: &mut bool) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    *modified = true;
    true
}

/// Enrollment as seen by scripts.
#[derive(Debug)]
pub struct WritableScriptedEnrollment<'a> {
    program: &'a Program,
    enrollment: Enrollment,
    converters: &'a ConverterRegistry,
    now: DateTime<Utc>,
}

impl<'a> WritableScriptedEnrollment<'a> {
    pub fn new(
        program: &'a Program,
        enrollment: Enrollment,
        converters: &'a ConverterRegistry,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            program,
            enrollment,
            converters,
            now,
        }
    }

    pub fn enrollment(&self) -> &Enrollment {
        &self.enrollment
    }

    pub fn set_coordinate(&mut self, coordinate: Location) -> bool {
        assign(
            &mut self.enrollment.coordinate,
            Some(coordinate),
            &mut self.enrollment.modified,
        )
    }

    pub fn into_inner(self) -> Enrollment {
        self.enrollment
    }
}

impl WritableScriptedResource for WritableScriptedEnrollment<'_> {
    fn resource_type(&self) -> DhisResourceType {
        DhisResourceType::Enrollment
    }

    fn get(&self, property: &str) -> Option<Value> {
        self.to_json().get(property).cloned()
    }

    fn set(&mut self, property: &str, value: &ScriptValue) -> Result<bool, String> {
        let enrollment = &mut self.enrollment;
        match property {
            "enrollmentDate" => {
                let value = date_time(self.converters, property, value)?;
                Ok(assign(&mut enrollment.enrollment_date, value, &mut enrollment.modified))
            }
            "incidentDate" => {
                let value = date_time(self.converters, property, value)?;
                Ok(assign(&mut enrollment.incident_date, value, &mut enrollment.modified))
            }
            "orgUnitId" => {
                let value = org_unit_id(property, value)?;
                Ok(assign(&mut enrollment.org_unit_id, value, &mut enrollment.modified))
            }
            "coordinate" => {
                let value = location(self.converters, property, value)?;
                Ok(assign(&mut enrollment.coordinate, value, &mut enrollment.modified))
            }
            "status" => {
                let value: EnrollmentStatus = status(property, value)?;
                if value == EnrollmentStatus::Unknown {
                    return Err(format!("property {property} cannot be set to UNKNOWN"));
                }
                Ok(assign(&mut enrollment.status, value, &mut enrollment.modified))
            }
            "id" | "programId" | "trackedEntityInstanceId" | "lastUpdated" => {
                Err(read_only(property))
            }
            _ => Err(format!("enrollment has no property {property}")),
        }
    }

    fn is_modified(&self) -> bool {
        self.enrollment.modified
    }

    fn validate(&self) -> Result<(), TransformerError> {
        let enrollment = &self.enrollment;
        if enrollment.org_unit_id.is_none() {
            return Err(TransformerError::data(
                "Organization unit of enrollment has not been specified.",
            ));
        }
        let Some(enrollment_date) = enrollment.enrollment_date else {
            return Err(TransformerError::data(
                "Enrollment date of enrollment has not been specified.",
            ));
        };
        if enrollment_date > self.now && !self.program.select_enrollment_dates_in_future {
            return Err(TransformerError::data(format!(
                "Enrollment date of program instance \"{}\" is in the future and program does not allow dates in the future.",
                self.program.name
            )));
        }
        if let Some(incident_date) = enrollment.incident_date
            && incident_date > self.now
            && !self.program.select_incident_dates_in_future
        {
            return Err(TransformerError::data(format!(
                "Incident date of program instance \"{}\" is in the future and program does not allow dates in the future.",
                self.program.name
            )));
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(&self.enrollment).unwrap_or_default()
    }
}

/// Program stage event as seen by scripts.
#[derive(Debug)]
pub struct WritableScriptedEvent<'a> {
    program_stage: &'a ProgramStage,
    event: Event,
    converters: &'a ConverterRegistry,
}

impl<'a> WritableScriptedEvent<'a> {
    pub fn new(
        program_stage: &'a ProgramStage,
        event: Event,
        converters: &'a ConverterRegistry,
    ) -> Self {
        Self {
            program_stage,
            event,
            converters,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn set_coordinate(&mut self, coordinate: Location) -> bool {
        assign(
            &mut self.event.coordinate,
            Some(coordinate),
            &mut self.event.modified,
        )
    }

    /// Sets the value of a data element. `None` clears the value.
    pub fn set_value(&mut self, data_element_id: &str, value: Option<String>) -> bool {
        let event = &mut self.event;
        let index = match event
            .data_values
            .iter()
            .position(|existing| existing.data_element_id == data_element_id)
        {
            Some(index) => index,
            None if value.is_none() => return false,
            None => {
                event.data_values.push(DataValue {
                    data_element_id: data_element_id.to_string(),
                    ..DataValue::default()
                });
                event.data_values.len() - 1
            }
        };
        let data_value = &mut event.data_values[index];
        if data_value.value == value {
            return false;
        }
        data_value.value = value;
        data_value.modified = true;
        event.modified = true;
        true
    }

    pub fn into_inner(self) -> Event {
        self.event
    }
}

impl WritableScriptedResource for WritableScriptedEvent<'_> {
    fn resource_type(&self) -> DhisResourceType {
        DhisResourceType::ProgramStageEvent
    }

    fn get(&self, property: &str) -> Option<Value> {
        if let Some(data_element_id) = property.strip_prefix(DATA_VALUE_PREFIX) {
            return Some(
                self.event
                    .data_value(data_element_id)
                    .and_then(|value| value.value.clone())
                    .map_or(Value::Null, Value::String),
            );
        }
        self.to_json().get(property).cloned()
    }

    fn set(&mut self, property: &str, value: &ScriptValue) -> Result<bool, String> {
        if let Some(data_element_id) = property.strip_prefix(DATA_VALUE_PREFIX) {
            let value = (!value.is_null()).then(|| value.to_string());
            return Ok(self.set_value(data_element_id, value));
        }
        let event = &mut self.event;
        match property {
            "eventDate" => {
                let value = date_time(self.converters, property, value)?;
                Ok(assign(&mut event.event_date, value, &mut event.modified))
            }
            "dueDate" => {
                let value = date_time(self.converters, property, value)?;
                Ok(assign(&mut event.due_date, value, &mut event.modified))
            }
            "orgUnitId" => {
                let value = org_unit_id(property, value)?;
                Ok(assign(&mut event.org_unit_id, value, &mut event.modified))
            }
            "coordinate" => {
                let value = location(self.converters, property, value)?;
                Ok(assign(&mut event.coordinate, value, &mut event.modified))
            }
            "status" => {
                let value: EventStatus = status(property, value)?;
                if value == EventStatus::Unknown {
                    return Err(format!("property {property} cannot be set to UNKNOWN"));
                }
                Ok(assign(&mut event.status, value, &mut event.modified))
            }
            "id" | "programId" | "programStageId" | "enrollmentId" | "trackedEntityInstanceId"
            | "lastUpdated" => Err(read_only(property)),
            _ => Err(format!("event has no property {property}")),
        }
    }

    fn is_modified(&self) -> bool {
        self.event.modified
    }

    fn validate(&self) -> Result<(), TransformerError> {
        let event = &self.event;
        if event.org_unit_id.is_none() {
            return Err(TransformerError::data(format!(
                "Organization unit of event of program stage \"{}\" has not been specified.",
                self.program_stage.name
            )));
        }
        let scheduled = matches!(
            event.status,
            EventStatus::Schedule | EventStatus::Overdue | EventStatus::Skipped
        );
        if scheduled && event.due_date.is_none() {
            return Err(TransformerError::data(format!(
                "Due date of scheduled event of program stage \"{}\" has not been specified.",
                self.program_stage.name
            )));
        }
        if !scheduled && event.event_date.is_none() {
            return Err(TransformerError::data(format!(
                "Event date of event of program stage \"{}\" has not been specified.",
                self.program_stage.name
            )));
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(&self.event).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 8, 30, 0).unwrap()
    }

    fn program() -> Program {
        Program {
            id: "IpHINAT79UW".into(),
            name: "Child Programme".into(),
            registration: true,
            ..Default::default()
        }
    }

    #[test]
    fn enrollment_writes_mark_modified_once() {
        let program = program();
        let converters = ConverterRegistry::standard();
        let mut enrollment = Enrollment::new_resource("IpHINAT79UW", "PQfMcpmXeFE");
        enrollment.modified = false;
        let mut scripted = WritableScriptedEnrollment::new(&program, enrollment, &converters, at(20));

        assert!(!scripted.is_modified());
        assert!(
            scripted
                .set("enrollmentDate", &ScriptValue::from("2024-05-01"))
                .unwrap()
        );
        assert!(scripted.is_modified());
        assert!(
            !scripted
                .set("enrollmentDate", &ScriptValue::DateTime(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()))
                .unwrap()
        );
        assert_eq!(
            scripted.get("enrollmentDate"),
            Some(Value::String("2024-05-01T00:00:00Z".into()))
        );
        assert_eq!(
            scripted.set("programId", &ScriptValue::from("x")).unwrap_err(),
            "property programId cannot be written"
        );
        assert!(scripted.set("status", &ScriptValue::from("completed")).unwrap());
        assert_eq!(scripted.enrollment().status, EnrollmentStatus::Completed);
    }

    #[test]
    fn enrollment_validation() {
        let program = program();
        let converters = ConverterRegistry::standard();
        let mut enrollment = Enrollment::new_resource("IpHINAT79UW", "PQfMcpmXeFE");
        enrollment.enrollment_date = Some(at(25));
        let mut scripted = WritableScriptedEnrollment::new(&program, enrollment, &converters, at(20));
        insta::assert_snapshot!(
            scripted.validate().unwrap_err(),
            @"data error: Organization unit of enrollment has not been specified."
        );
        scripted.set("orgUnitId", &ScriptValue::from("DiszpKrYNg8")).unwrap();
        insta::assert_snapshot!(
            scripted.validate().unwrap_err(),
            @r#"data error: Enrollment date of program instance "Child Programme" is in the future and program does not allow dates in the future."#
        );
        scripted.set("enrollmentDate", &ScriptValue::DateTime(at(19))).unwrap();
        assert!(scripted.validate().is_ok());
    }

    #[test]
    fn event_data_values() {
        let stage = ProgramStage {
            id: "A03MvHHogjR".into(),
            name: "Birth".into(),
            ..Default::default()
        };
        let converters = ConverterRegistry::standard();
        let mut event = Event::new_resource("IpHINAT79UW", "A03MvHHogjR");
        event.modified = false;
        let mut scripted = WritableScriptedEvent::new(&stage, event, &converters);

        assert_eq!(scripted.get("dataValues.UXz7xuGCEhU"), Some(Value::Null));
        assert!(
            scripted
                .set("dataValues.UXz7xuGCEhU", &ScriptValue::Integer(3200))
                .unwrap()
        );
        assert!(
            !scripted
                .set("dataValues.UXz7xuGCEhU", &ScriptValue::from("3200"))
                .unwrap()
        );
        assert_eq!(
            scripted.get("dataValues.UXz7xuGCEhU"),
            Some(Value::String("3200".into()))
        );
        assert!(scripted.is_modified());
        assert!(!scripted.set_value("GQY2lXrypjO", None));
        assert!(scripted.event().data_value("UXz7xuGCEhU").unwrap().modified);
    }

    #[test]
    fn event_validation_requires_dates_per_status() {
        let stage = ProgramStage {
            id: "A03MvHHogjR".into(),
            name: "Birth".into(),
            ..Default::default()
        };
        let converters = ConverterRegistry::standard();
        let mut event = Event::new_resource("IpHINAT79UW", "A03MvHHogjR");
        event.org_unit_id = Some("DiszpKrYNg8".into());
        let mut scripted = WritableScriptedEvent::new(&stage, event, &converters);
        assert!(scripted.validate().is_err());
        scripted.set("status", &ScriptValue::from("SCHEDULE")).unwrap();
        scripted.set("dueDate", &ScriptValue::DateTime(at(3))).unwrap();
        assert!(scripted.validate().is_ok());
        assert!(scripted.set("status", &ScriptValue::from("DONE")).is_err());
        assert!(scripted.set("coordinate", &ScriptValue::from("[10.5,59.9]")).unwrap());
        assert_eq!(scripted.event().coordinate, Some(Location::new(10.5, 59.9)));
    }
}
