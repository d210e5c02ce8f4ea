//! Completion figures for one day of visits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::Resource;
use crate::route::minutes_to_hours;
use crate::task::{Task, VisitStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProgress {
    pub resource_id: String,
    pub resource_name: String,
    pub total: usize,
    pub completed: usize,
    pub rate: f64,
    pub booked_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayProgress {
    pub date: NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub unassigned: usize,
    /// Completed share of all visits, in percent with one decimal.
    pub rate: f64,
    pub by_resource: Vec<ResourceProgress>,
}

/// Percentage rounded to one decimal; zero when `total` is zero.
pub fn completion_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 1000.0).round() / 10.0
}

#[derive(Default)]
struct Tally {
    total: usize,
    completed: usize,
    minutes: i64,
}

pub fn day_progress(date: NaiveDate, tasks: &[Task], resources: &[Resource]) -> DayProgress {
    let day: Vec<&Task> = tasks.iter().filter(|task| task.date() == date).collect();
    let completed = day
        .iter()
        .filter(|task| task.status == VisitStatus::Completed)
        .count();
    let cancelled = day.iter().filter(|task| task.is_cancelled()).count();
    let unassigned = day
        .iter()
        .filter(|task| task.is_unassigned() && !task.is_cancelled())
        .count();

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for task in &day {
        let Some(resource_id) = task.resource_id.as_deref() else {
            continue;
        };
        let tally = tallies.entry(resource_id).or_default();
        tally.total += 1;
        if task.status == VisitStatus::Completed {
            tally.completed += 1;
        }
        if !task.is_cancelled() {
            tally.minutes += task.duration_minutes();
        }
    }

    let by_resource = tallies
        .into_iter()
        .map(|(resource_id, tally)| ResourceProgress {
            resource_id: resource_id.to_string(),
            resource_name: resources
                .iter()
                .find(|resource| resource.id == resource_id)
                .map(|resource| resource.name.clone())
                .unwrap_or_default(),
            total: tally.total,
            completed: tally.completed,
            rate: completion_rate(tally.completed, tally.total),
            booked_hours: minutes_to_hours(tally.minutes),
        })
        .collect();

    DayProgress {
        date,
        total: day.len(),
        completed,
        cancelled,
        unassigned,
        rate: completion_rate(completed, day.len()),
        by_resource,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(completion_rate(1, 3), 33.3);
        assert_eq!(completion_rate(2, 3), 66.7);
        assert_eq!(completion_rate(0, 0), 0.0);
    }
}
