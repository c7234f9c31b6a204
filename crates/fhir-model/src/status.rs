//! Status values of DHIS2 events and enrollments and the fixed flag sets
//! that rules use to decide whether they apply to a status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dhis::Event;
use crate::error::{Result, TransformerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    #[default]
    Active,
    Completed,
    Visited,
    Schedule,
    Overdue,
    Skipped,
    /// Any status value this version does not know.
    #[serde(other)]
    Unknown,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "ACTIVE",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Visited => "VISITED",
            EventStatus::Schedule => "SCHEDULE",
            EventStatus::Overdue => "OVERDUE",
            EventStatus::Skipped => "SKIPPED",
            EventStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
    /// Any status value this version does not know.
    #[serde(other)]
    Unknown,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "ACTIVE",
            EnrollmentStatus::Completed => "COMPLETED",
            EnrollmentStatus::Cancelled => "CANCELLED",
            EnrollmentStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flag per event status telling whether a rule applies to events in
/// that status. Unset flags are false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicableEventStatus {
    pub active: bool,
    pub completed: bool,
    pub visited: bool,
    pub schedule: bool,
    pub overdue: bool,
    pub skipped: bool,
}

impl ApplicableEventStatus {
    /// Applies to every event that has not been completed or skipped.
    pub fn open() -> Self {
        Self {
            active: true,
            visited: true,
            schedule: true,
            overdue: true,
            ..Self::default()
        }
    }

    pub fn is_applicable(&self, status: EventStatus) -> Result<bool> {
        match status {
            EventStatus::Active => Ok(self.active),
            EventStatus::Completed => Ok(self.completed),
            EventStatus::Visited => Ok(self.visited),
            EventStatus::Schedule => Ok(self.schedule),
            EventStatus::Overdue => Ok(self.overdue),
            EventStatus::Skipped => Ok(self.skipped),
            EventStatus::Unknown => Err(TransformerError::configuration(
                "Unhandled event status value",
            )),
        }
    }
}

/// One flag per enrollment status telling whether a rule applies to
/// enrollments in that status. Unset flags are false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicableEnrollmentStatus {
    pub active: bool,
    pub completed: bool,
    pub cancelled: bool,
}

impl ApplicableEnrollmentStatus {
    pub fn active_only() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub fn is_applicable(&self, status: EnrollmentStatus) -> Result<bool> {
        match status {
            EnrollmentStatus::Active => Ok(self.active),
            EnrollmentStatus::Completed => Ok(self.completed),
            EnrollmentStatus::Cancelled => Ok(self.cancelled),
            EnrollmentStatus::Unknown => Err(TransformerError::configuration(
                "Unhandled enrollment status value",
            )),
        }
    }
}

/// Status transitions applied to an existing event before a rule updates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventStatusUpdate {
    pub overdue_to_active: bool,
    pub schedule_to_active: bool,
    pub completed_to_active: bool,
}

impl EventStatusUpdate {
    /// Sets the event to active if its status has an enabled transition.
    ///
    /// Returns true if the status has been changed. The event is marked as
    /// modified only in that case, so applying the update again is a no-op.
    pub fn update(&self, event: &mut Event) -> bool {
        let transition = match event.status {
            EventStatus::Overdue => self.overdue_to_active,
            EventStatus::Schedule => self.schedule_to_active,
            EventStatus::Completed => self.completed_to_active,
            _ => false,
        };
        if transition {
            event.status = EventStatus::Active;
            event.modified = true;
        }
        transition
    }
}
