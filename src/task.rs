use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::conflict::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    NotDone,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::NotDone => "not_done",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "scheduled" => Ok(VisitStatus::Scheduled),
            "completed" => Ok(VisitStatus::Completed),
            "cancelled" | "canceled" => Ok(VisitStatus::Cancelled),
            "not_done" => Ok(VisitStatus::NotDone),
            other => Err(format!("unknown visit status '{other}'")),
        }
    }
}

/// A single care visit on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i32,
    /// Capability tag a caregiver must hold to perform the visit.
    pub service_type: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Pre-assigned or committed caregiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Second caregiver for two-person visits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<i64>,
    #[serde(default)]
    pub status: VisitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Task {
    pub fn new(
        id: i32,
        service_type: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            service_type: service_type.into(),
            start,
            end,
            resource_id: None,
            companion_id: None,
            route_id: None,
            status: VisitStatus::Scheduled,
            client_id: None,
            note: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == VisitStatus::Cancelled
    }

    pub fn is_unassigned(&self) -> bool {
        self.resource_id.is_none()
    }

    /// Open for automated scheduling: no caregiver yet and still planned.
    pub fn is_schedulable(&self) -> bool {
        self.is_unassigned() && self.status == VisitStatus::Scheduled
    }

    pub fn is_booked_on(&self, resource_id: &str) -> bool {
        !self.is_cancelled() && self.resource_id.as_deref() == Some(resource_id)
    }
}

/// Partial change to an existing visit. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub companion_id: Option<String>,
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<VisitStatus>,
    #[serde(default)]
    pub note: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: VisitStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &Task) -> Task {
        let mut updated = task.clone();
        if let Some(resource_id) = &self.resource_id {
            updated.resource_id = Some(resource_id.clone());
        }
        if let Some(companion_id) = &self.companion_id {
            updated.companion_id = Some(companion_id.clone());
        }
        if let Some(start) = self.start {
            updated.start = start;
        }
        if let Some(end) = self.end {
            updated.end = end;
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(note) = &self.note {
            updated.note = Some(note.clone());
        }
        updated
    }

    /// The caregiver this update moves the visit to, if it differs from the current one.
    pub fn reassigns<'a>(&'a self, task: &Task) -> Option<&'a str> {
        self.resource_id
            .as_deref()
            .filter(|id| task.resource_id.as_deref() != Some(*id))
    }

    pub fn reschedules(&self, task: &Task) -> bool {
        self.start.is_some_and(|start| start != task.start)
            || self.end.is_some_and(|end| end != task.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn update_only_touches_given_fields() {
        let mut task = Task::new(1, "care", at(9), at(10));
        task.resource_id = Some("r1".into());
        task.note = Some("ring twice".into());

        let update = TaskUpdate {
            end: Some(at(11)),
            status: Some(VisitStatus::Completed),
            ..TaskUpdate::default()
        };
        let updated = update.apply(&task);
        assert_eq!(updated.start, at(9));
        assert_eq!(updated.end, at(11));
        assert_eq!(updated.status, VisitStatus::Completed);
        assert_eq!(updated.resource_id.as_deref(), Some("r1"));
        assert_eq!(updated.note.as_deref(), Some("ring twice"));
        assert!(update.reschedules(&task));
        assert_eq!(update.reassigns(&task), None);
    }

    #[test]
    fn same_caregiver_is_not_a_reassignment() {
        let mut task = Task::new(1, "care", at(9), at(10));
        task.resource_id = Some("r1".into());
        let same = TaskUpdate {
            resource_id: Some("r1".into()),
            start: Some(at(9)),
            ..TaskUpdate::default()
        };
        assert_eq!(same.reassigns(&task), None);
        assert!(!same.reschedules(&task));

        let other = TaskUpdate {
            resource_id: Some("r2".into()),
            ..TaskUpdate::default()
        };
        assert_eq!(other.reassigns(&task), Some("r2"));
    }

    #[test]
    fn update_payload_parses_partial_json() {
        let update: TaskUpdate = serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
        assert_eq!(update, TaskUpdate::status(VisitStatus::Completed));
    }
}
