use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub resource_id: String,
    pub date: NaiveDate,
}

impl RouteKey {
    pub fn new(resource_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            resource_id: resource_id.into(),
            date,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource_id, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    #[default]
    Draft,
    Confirmed,
    Completed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Draft => "draft",
            RouteStatus::Confirmed => "confirmed",
            RouteStatus::Completed => "completed",
        }
    }
}

impl FromStr for RouteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(RouteStatus::Draft),
            "confirmed" => Ok(RouteStatus::Confirmed),
            "completed" => Ok(RouteStatus::Completed),
            other => Err(format!("unknown route status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedBy {
    #[default]
    Solver,
    Manual,
}

impl GeneratedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratedBy::Solver => "solver",
            GeneratedBy::Manual => "manual",
        }
    }
}

impl FromStr for GeneratedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solver" => Ok(GeneratedBy::Solver),
            "manual" => Ok(GeneratedBy::Manual),
            other => Err(format!("unknown route origin '{other}'")),
        }
    }
}

/// All visits of one caregiver on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContainer {
    pub id: i64,
    pub key: RouteKey,
    #[serde(default)]
    pub status: RouteStatus,
    #[serde(default)]
    pub generated_by: GeneratedBy,
    /// Sum of the durations of the non-cancelled member visits.
    #[serde(default)]
    pub total_minutes: i64,
    #[serde(default)]
    pub task_ids: Vec<i32>,
}

impl RoutingContainer {
    pub fn new(id: i64, key: RouteKey, generated_by: GeneratedBy) -> Self {
        Self {
            id,
            key,
            status: RouteStatus::Draft,
            generated_by,
            total_minutes: 0,
            task_ids: Vec::new(),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.key.resource_id
    }

    pub fn date(&self) -> NaiveDate {
        self.key.date
    }

    pub fn total_hours(&self) -> f64 {
        minutes_to_hours(self.total_minutes)
    }

    /// Re-derives the member list and the aggregate from the visits routed here.
    pub fn recompute<'a, I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let members = self.members(tasks);
        self.total_minutes = total_minutes(members.iter().copied());
        self.task_ids = members.iter().map(|task| task.id).collect();
    }

    fn members<'a, I>(&self, tasks: I) -> Vec<&'a Task>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut members: Vec<&Task> = tasks
            .into_iter()
            .filter(|task| task.route_id == Some(self.id))
            .collect();
        members.sort_by_key(|task| (task.start, task.id));
        members
    }
}

/// Minutes of the non-cancelled tasks in `tasks`.
pub fn total_minutes<'a, I>(tasks: I) -> i64
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks
        .into_iter()
        .filter(|task| !task.is_cancelled())
        .map(Task::duration_minutes)
        .sum()
}

/// Hours rounded to two decimal places.
pub fn minutes_to_hours(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

/// Keyed store of routing containers, at most one per (resource, date).
#[derive(Debug, Clone, Default)]
pub struct RouteArena {
    routes: BTreeMap<RouteKey, RoutingContainer>,
    next_id: i64,
}

impl RouteArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes<I>(routes: I) -> Self
    where
        I: IntoIterator<Item = RoutingContainer>,
    {
        let mut arena = Self::new();
        for route in routes {
            arena.next_id = arena.next_id.max(route.id);
            arena.routes.insert(route.key.clone(), route);
        }
        arena
    }

    /// Returns the container for `key`, creating it on first use.
    ///
    /// The boolean is `true` when the container was created by this call.
    pub fn get_or_create(
        &mut self,
        key: RouteKey,
        generated_by: GeneratedBy,
    ) -> (&mut RoutingContainer, bool) {
        let mut created = false;
        let next_id = &mut self.next_id;
        let route = self.routes.entry(key).or_insert_with_key(|key| {
            created = true;
            *next_id += 1;
            RoutingContainer::new(*next_id, key.clone(), generated_by)
        });
        (route, created)
    }

    pub fn get(&self, key: &RouteKey) -> Option<&RoutingContainer> {
        self.routes.get(key)
    }

    pub fn get_mut(&mut self, key: &RouteKey) -> Option<&mut RoutingContainer> {
        self.routes.get_mut(key)
    }

    pub fn find_by_id_mut(&mut self, id: i64) -> Option<&mut RoutingContainer> {
        self.routes.values_mut().find(|route| route.id == id)
    }

    pub fn for_date(&self, date: NaiveDate) -> Vec<RoutingContainer> {
        self.routes
            .values()
            .filter(|route| route.date() == date)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingContainer> {
        self.routes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn get_or_create_reuses_existing_container() {
        let mut arena = RouteArena::new();
        let key = RouteKey::new("r1", d(2025, 4, 1));
        let (first, created) = arena.get_or_create(key.clone(), GeneratedBy::Solver);
        let first_id = first.id;
        assert!(created);

        let (second, created) = arena.get_or_create(key, GeneratedBy::Manual);
        assert!(!created);
        assert_eq!(second.id, first_id);
        assert_eq!(second.generated_by, GeneratedBy::Solver);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn ids_continue_after_seeded_routes() {
        let seeded = RoutingContainer::new(
            41,
            RouteKey::new("r1", d(2025, 4, 1)),
            GeneratedBy::Manual,
        );
        let mut arena = RouteArena::from_routes([seeded]);
        let (route, _) = arena.get_or_create(RouteKey::new("r2", d(2025, 4, 1)), GeneratedBy::Solver);
        assert_eq!(route.id, 42);
    }

    #[test]
    fn hours_round_to_two_decimals() {
        assert_eq!(minutes_to_hours(120), 2.0);
        assert_eq!(minutes_to_hours(100), 1.67);
        assert_eq!(minutes_to_hours(0), 0.0);
    }
}
