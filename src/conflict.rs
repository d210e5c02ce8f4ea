//! Overlap detection between visits booked on the same caregiver.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::Task;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Touching intervals (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

pub fn overlaps(a: &Task, b: &Task) -> bool {
    a.interval().overlaps(&b.interval())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error(
        "double booking: resource {resource_id} already has task {existing_task} from {start} to {end}"
    )]
    DoubleBooking {
        resource_id: String,
        existing_task: i32,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Returns the first live task of `resource_id` that overlaps `candidate`.
///
/// The candidate itself (same id) and cancelled tasks are skipped, so the
/// check can be run against a day that already contains the candidate.
pub fn find_conflict<'a, I>(candidate: &Task, resource_id: &str, existing: I) -> Option<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    existing.into_iter().find(|other| {
        other.id != candidate.id && other.is_booked_on(resource_id) && overlaps(candidate, other)
    })
}

/// Like [`find_conflict`], but as an error suitable for rejecting a mutation.
pub fn ensure_no_conflict<'a, I>(
    candidate: &Task,
    resource_id: &str,
    existing: I,
) -> Result<(), ConflictError>
where
    I: IntoIterator<Item = &'a Task>,
{
    match find_conflict(candidate, resource_id, existing) {
        Some(other) => Err(ConflictError::DoubleBooking {
            resource_id: resource_id.to_string(),
            existing_task: other.id,
            start: other.start,
            end: other.end,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let a = Interval::new(at(9, 0), at(10, 0));
        let b = Interval::new(at(10, 0), at(11, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn contained_interval_overlaps() {
        let outer = Interval::new(at(9, 0), at(12, 0));
        let inner = Interval::new(at(10, 0), at(10, 30));
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn conflict_ignores_cancelled_and_other_resources() {
        let mut cancelled = Task::new(1, "A", at(9, 0), at(10, 0));
        cancelled.resource_id = Some("r1".into());
        cancelled.status = crate::task::VisitStatus::Cancelled;
        let mut elsewhere = Task::new(2, "A", at(9, 0), at(10, 0));
        elsewhere.resource_id = Some("r2".into());
        let candidate = Task::new(3, "A", at(9, 30), at(10, 30));

        let day = [cancelled, elsewhere];
        assert!(find_conflict(&candidate, "r1", &day).is_none());
        assert_eq!(find_conflict(&candidate, "r2", &day).map(|t| t.id), Some(2));
    }
}
