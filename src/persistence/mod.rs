use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::resource::Resource;
use crate::route::{GeneratedBy, RouteStatus, RoutingContainer};
use crate::task::Task;
use crate::task_validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Point-in-time view of one date: every visit on it and every caregiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedAssignment {
    pub task_id: i32,
    pub resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTotal {
    pub resource_id: String,
    pub total_minutes: i64,
}

/// Everything one scheduling run writes, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub date: NaiveDate,
    pub generated_by: GeneratedBy,
    pub assignments: Vec<CommittedAssignment>,
    /// Aggregate per caregiver touched by the run, as planned. Stores derive
    /// the persisted figure from the route's members.
    pub totals: Vec<RouteTotal>,
}

impl CommitRequest {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn planned_total(&self, resource_id: &str) -> Option<i64> {
        self.totals
            .iter()
            .find(|total| total.resource_id == resource_id)
            .map(|total| total.total_minutes)
    }
}

/// Warns when a committed route's member total differs from the plan.
pub(crate) fn check_planned_total(request: &CommitRequest, route: &RoutingContainer) {
    match request.planned_total(route.resource_id()) {
        Some(planned) if planned != route.total_minutes => warn!(
            "route {} totals {} min from its members, plan said {} min",
            route.key, route.total_minutes, planned
        ),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub routes: Vec<RoutingContainer>,
    pub created: usize,
}

/// Storage collaborator for visits, caregivers and routes.
///
/// `commit` must either apply the whole request or nothing, and must reuse
/// the route of an existing (caregiver, date) pair instead of adding one.
/// Visits already carrying a touched caregiver but no route join that route
/// in the same commit, and route totals are recomputed from the members.
pub trait AssignmentStore: Send + Sync {
    fn snapshot(&self, date: NaiveDate) -> StoreResult<DaySnapshot>;
    fn routes_for(&self, date: NaiveDate) -> StoreResult<Vec<RoutingContainer>>;
    fn commit(&self, request: &CommitRequest) -> StoreResult<CommitReceipt>;
    fn upsert_task(&self, task: &Task) -> StoreResult<()>;
    fn upsert_resource(&self, resource: &Resource) -> StoreResult<()>;
    fn find_task(&self, id: i32) -> StoreResult<Option<Task>>;
    /// Removes a visit and refreshes the total of the route it belonged to.
    fn delete_task(&self, id: i32) -> StoreResult<Option<Task>>;
    /// Books one visit on a caregiver outside a scheduling run, moving it
    /// off any previous route and refreshing the totals of both routes.
    fn assign_task(&self, task_id: i32, resource_id: &str) -> StoreResult<RoutingContainer>;
    fn set_route_status(&self, route_id: i64, status: RouteStatus) -> StoreResult<RoutingContainer>;

    fn tasks_for(&self, date: NaiveDate) -> StoreResult<Vec<Task>> {
        Ok(self.snapshot(date)?.tasks)
    }
}

pub fn validate_tasks(tasks: &[Task]) -> StoreResult<()> {
    task_validation::validate_task_collection(tasks).map_err(StoreError::from)
}

pub fn validate_resources(resources: &[Resource]) -> StoreResult<()> {
    task_validation::validate_resource_collection(resources).map_err(StoreError::from)
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    StoreSnapshot, load_resources_from_csv, load_snapshot_from_json, load_tasks_from_csv,
    save_resources_to_csv, save_snapshot_to_json, save_tasks_to_csv,
};
pub use memory::MemoryStore;
