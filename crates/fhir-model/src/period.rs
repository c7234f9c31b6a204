//! Reference dates and effective-date windows of program stage events.
//!
//! A rule selects an anchor ([`EventPeriodDayType`]) and a number of days
//! before and after the anchor. An effective date that lies more whole days
//! before (or after) the anchor than permitted is outside of the window.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::dhis::{Enrollment, Event, ProgramStage};
use crate::enums::EventPeriodDayType;
use crate::error::{Result, TransformerError};

impl EventPeriodDayType {
    /// Computes the reference date of an event for this anchor.
    ///
    /// `now` is used where the anchor falls back to the current time.
    pub fn reference_date(
        &self,
        stage: &ProgramStage,
        enrollment: Option<&Enrollment>,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        match self {
            EventPeriodDayType::EventDate => event
                .event_date
                .ok_or_else(|| TransformerError::data("Event does not include an event date.")),
            EventPeriodDayType::DueDate => event
                .due_date
                .ok_or_else(|| TransformerError::data("Event does not include a due date.")),
            EventPeriodDayType::OrigDueDate => {
                let incident_date = enrollment
                    .and_then(|enrollment| enrollment.incident_date)
                    .ok_or_else(|| {
                        TransformerError::data("Enrollment does not include an incident date.")
                    })?;
                add_days(incident_date, stage.min_days_from_start)
            }
            EventPeriodDayType::EventUpdatedDate => Ok(event.last_updated.unwrap_or(now)),
            EventPeriodDayType::ValueUpdatedDate => Ok(event.latest_value_update().unwrap_or(now)),
        }
    }
}

/// One side of an event period: anchor plus number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBound {
    pub day_type: EventPeriodDayType,
    pub days: i32,
}

impl PeriodBound {
    pub fn new(day_type: EventPeriodDayType, days: i32) -> Self {
        Self { day_type, days }
    }

    /// Earliest permitted date when used as the before bound.
    pub fn earliest(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        shift_days(reference, -i64::from(self.days))
    }

    /// Latest permitted date when used as the after bound.
    pub fn latest(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        shift_days(reference, i64::from(self.days))
    }
}

/// Shifts a date by whole days. A result outside of the representable
/// range is a configuration error of the stage or rule that supplied the
/// days.
pub fn add_days(date: DateTime<Utc>, days: i32) -> Result<DateTime<Utc>> {
    shift_days(date, i64::from(days))
}

fn shift_days(date: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| {
            TransformerError::configuration(format!(
                "Shifting {date} by {days} days exceeds the supported date range."
            ))
        })
}

/// Effective period of a rule after falling back to stage defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedEventPeriod {
    pub before: Option<PeriodBound>,
    pub after: Option<PeriodBound>,
}

/// Computes reference dates and windows for the events of one stage.
#[derive(Debug, Clone, Copy)]
pub struct PeriodCalculator<'a> {
    stage: &'a ProgramStage,
    enrollment: Option<&'a Enrollment>,
    now: DateTime<Utc>,
}

impl<'a> PeriodCalculator<'a> {
    pub fn new(
        stage: &'a ProgramStage,
        enrollment: Option<&'a Enrollment>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            enrollment,
            now,
        }
    }

    pub fn reference_date(
        &self,
        day_type: EventPeriodDayType,
        event: &Event,
    ) -> Result<DateTime<Utc>> {
        day_type.reference_date(self.stage, self.enrollment, event, self.now)
    }

    /// Returns `[reference - before days, reference + after days]`; an unset
    /// bound leaves its side of the window open.
    pub fn window(
        &self,
        period: &ResolvedEventPeriod,
        event: &Event,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let earliest = match period.before {
            Some(bound) => Some(bound.earliest(self.reference_date(bound.day_type, event)?)?),
            None => None,
        };
        let latest = match period.after {
            Some(bound) => Some(bound.latest(self.reference_date(bound.day_type, event)?)?),
            None => None,
        };
        Ok((earliest, latest))
    }

    /// Tests whether the effective date lies within the period of the event.
    /// Dates are compared by calendar day.
    pub fn is_effective_date_applicable(
        &self,
        period: &ResolvedEventPeriod,
        effective_date: DateTime<Utc>,
        event: &Event,
    ) -> Result<bool> {
        let effective_day = effective_date.date_naive();
        if let Some(bound) = period.before {
            let reference = self.reference_date(bound.day_type, event)?.date_naive();
            if (reference - effective_day).num_days() > i64::from(bound.days) {
                return Ok(false);
            }
        }
        if let Some(bound) = period.after {
            let reference = self.reference_date(bound.day_type, event)?.date_naive();
            if (effective_day - reference).num_days() > i64::from(bound.days) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::dhis::DataValue;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn stage() -> ProgramStage {
        ProgramStage {
            id: "stage".into(),
            name: "Stage".into(),
            min_days_from_start: 7,
            ..Default::default()
        }
    }

    #[test]
    fn reference_dates() {
        let stage = stage();
        let enrollment = Enrollment {
            incident_date: Some(at(1)),
            ..Default::default()
        };
        let event = Event {
            event_date: Some(at(10)),
            due_date: Some(at(12)),
            last_updated: Some(at(14)),
            data_values: vec![DataValue {
                data_element_id: "de".into(),
                last_updated: Some(at(15)),
                ..Default::default()
            }],
            ..Default::default()
        };
        let now = at(30);
        let calc = PeriodCalculator::new(&stage, Some(&enrollment), now);

        let expect = [
            (EventPeriodDayType::EventDate, at(10)),
            (EventPeriodDayType::DueDate, at(12)),
            (EventPeriodDayType::OrigDueDate, at(8)),
            (EventPeriodDayType::EventUpdatedDate, at(14)),
            (EventPeriodDayType::ValueUpdatedDate, at(15)),
        ];
        for (day_type, date) in expect {
            assert_eq!(calc.reference_date(day_type, &event).unwrap(), date, "{day_type}");
        }
    }

    #[test]
    fn update_anchors_fall_back_to_now() {
        let stage = stage();
        let now = at(30);
        let calc = PeriodCalculator::new(&stage, None, now);
        let event = Event::default();
        assert_eq!(
            calc.reference_date(EventPeriodDayType::EventUpdatedDate, &event).unwrap(),
            now
        );
        assert_eq!(
            calc.reference_date(EventPeriodDayType::ValueUpdatedDate, &event).unwrap(),
            now
        );
    }

    #[test]
    fn missing_anchor_is_data_error() {
        let stage = stage();
        let calc = PeriodCalculator::new(&stage, None, at(30));
        let err = calc
            .reference_date(EventPeriodDayType::OrigDueDate, &Event::default())
            .unwrap_err();
        assert!(err.is_data_error());
        assert!(calc
            .reference_date(EventPeriodDayType::DueDate, &Event::default())
            .is_err());
    }

    #[test]
    fn effective_date_window() {
        let stage = stage();
        let calc = PeriodCalculator::new(&stage, None, at(30));
        let event = Event {
            event_date: Some(at(10)),
            ..Default::default()
        };
        let period = ResolvedEventPeriod {
            before: Some(PeriodBound::new(EventPeriodDayType::EventDate, 3)),
            after: Some(PeriodBound::new(EventPeriodDayType::EventDate, 1)),
        };

        assert!(calc.is_effective_date_applicable(&period, at(7), &event).unwrap());
        assert!(!calc.is_effective_date_applicable(&period, at(6), &event).unwrap());
        assert!(calc.is_effective_date_applicable(&period, at(11), &event).unwrap());
        assert!(!calc.is_effective_date_applicable(&period, at(12), &event).unwrap());

        let (earliest, latest) = calc.window(&period, &event).unwrap();
        assert_eq!(earliest, Some(at(7)));
        assert_eq!(latest, Some(at(11)));
    }

    #[test]
    fn out_of_range_bounds_are_configuration_errors() {
        let bound = PeriodBound::new(EventPeriodDayType::EventDate, i32::MAX);
        let err = bound.earliest(at(10)).unwrap_err();
        assert!(matches!(err, TransformerError::Configuration(_)));
        assert!(err.is_fatal());
        assert!(bound.latest(at(10)).is_err());
        assert!(PeriodBound::new(EventPeriodDayType::EventDate, i32::MIN)
            .latest(at(10))
            .is_err());

        let stage = ProgramStage {
            min_days_from_start: i32::MAX,
            ..stage()
        };
        let enrollment = Enrollment {
            incident_date: Some(at(1)),
            ..Default::default()
        };
        let event = Event {
            event_date: Some(at(10)),
            ..Default::default()
        };
        let calc = PeriodCalculator::new(&stage, Some(&enrollment), at(30));
        assert!(calc
            .reference_date(EventPeriodDayType::OrigDueDate, &event)
            .is_err());
        let period = ResolvedEventPeriod {
            before: Some(bound),
            after: None,
        };
        assert!(calc.window(&period, &event).is_err());
    }

    #[test]
    fn open_period_accepts_everything() {
        let stage = stage();
        let calc = PeriodCalculator::new(&stage, None, at(30));
        let period = ResolvedEventPeriod::default();
        assert!(calc
            .is_effective_date_applicable(&period, at(1), &Event::default())
            .unwrap());
        assert_eq!(calc.window(&period, &Event::default()).unwrap(), (None, None));
    }
}
