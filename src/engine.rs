//! Scheduling runs and single-visit bookings against an [`AssignmentStore`].

use chrono::NaiveDate;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::commit::{Committer, RejectedAssignment, ValidationPolicy};
use crate::conflict::{self, ConflictError};
use crate::model::{ModelBuilder, ModelError};
use crate::persistence::{AssignmentStore, StoreError};
use crate::progress::{self, DayProgress};
use crate::resource::Resource;
use crate::route::{RouteStatus, RoutingContainer};
use crate::solver::{CancelToken, SolveContext, SolveStatus, SolverConfig, StrategyKind};
use crate::task::{Task, TaskUpdate};
use crate::task_validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub date: NaiveDate,
    /// Restrict the run to these caregivers. `None` uses every active one.
    #[serde(default)]
    pub resource_ids: Option<Vec<String>>,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(skip, default)]
    pub solver: SolverConfig,
}

impl RunRequest {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            resource_ids: None,
            strategy: StrategyKind::default(),
            solver: SolverConfig::default(),
        }
    }

    pub fn with_resources<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resource_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }
}

/// Non-fatal outcomes attached to a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunNotice {
    /// No open visit or no eligible caregiver on the date.
    EmptyInput { tasks: usize, resources: usize },
    /// The model was built but no visit could be assigned.
    InfeasibleModel,
    /// The search budget ran out; the best assignment found was used.
    SolverTimeoutDegraded { nodes: u64 },
    /// Round-robin results were committed with capacity or overlap violations.
    HeuristicDegraded { violations: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub strategy: StrategyKind,
    /// `None` when the run stopped before solving.
    pub status: Option<SolveStatus>,
    pub considered: usize,
    pub assigned: usize,
    pub routes_touched: Vec<i64>,
    pub routes_created: usize,
    pub notices: Vec<RunNotice>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn empty(request: &RunRequest) -> Self {
        Self {
            date: request.date,
            strategy: request.strategy,
            status: None,
            considered: 0,
            assigned: 0,
            routes_touched: Vec::new(),
            routes_created: 0,
            notices: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.notices.iter().any(|notice| {
            matches!(
                notice,
                RunNotice::SolverTimeoutDegraded { .. } | RunNotice::HeuristicDegraded { .. }
            )
        })
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("solver produced an invalid assignment: {0}")]
    InvalidAssignment(RejectedAssignment),
    #[error("could not read the day snapshot: {0}")]
    Snapshot(StoreError),
    #[error("commit failed: {0}")]
    Commit(#[from] StoreError),
    #[error("run cancelled before commit")]
    Cancelled,
}

/// Errors of the single-visit paths outside a scheduling run.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Exists(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One mutex per date; runs and bookings on the same date take it in turn.
#[derive(Debug, Default)]
pub struct DateLocks {
    slots: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl DateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        self.slots.lock().entry(date).or_default().clone()
    }
}

pub struct Scheduler<S: ?Sized> {
    locks: DateLocks,
    /// Serializes id checks of newly created visits across dates.
    creating: Mutex<()>,
    store: Arc<S>,
}

impl<S: AssignmentStore> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_shared(Arc::new(store))
    }
}

impl<S: AssignmentStore + ?Sized> Scheduler<S> {
    pub fn with_shared(store: Arc<S>) -> Self {
        Self {
            locks: DateLocks::new(),
            creating: Mutex::new(()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Builds, solves and commits the open visits of `request.date`.
    ///
    /// Empty and infeasible days complete with a notice. Only invalid
    /// input, a rejected assignment, storage failures and cancellation are
    /// errors. Nothing is written unless the whole commit succeeds.
    pub fn run(&self, request: &RunRequest, cancel: &CancelToken) -> Result<RunReport, RunError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let slot = self.locks.slot(request.date);
        let _guard = slot.lock();
        info!(
            "scheduling run for {} with {} strategy",
            request.date, request.strategy
        );

        let snapshot = self.store.snapshot(request.date).map_err(RunError::Snapshot)?;
        task_validation::validate_task_collection(&snapshot.tasks)
            .and_then(|_| task_validation::validate_resource_collection(&snapshot.resources))
            .map_err(|err| RunError::InvalidInput(err.to_string()))?;

        let mut report = RunReport::empty(request);
        let model = match ModelBuilder::new(request.date)
            .with_resource_filter(request.resource_ids.as_deref())
            .build(&snapshot.tasks, &snapshot.resources)
        {
            Ok(model) => model,
            Err(err) => {
                info!("{err}");
                let ModelError::EmptyInput { tasks, resources, .. } = err;
                report.considered = tasks;
                report.notices.push(RunNotice::EmptyInput { tasks, resources });
                report.elapsed_ms = elapsed_ms(started);
                return Ok(report);
            }
        };
        report.considered = model.task_count();

        let strategy = request.strategy.strategy();
        let ctx = SolveContext::new(request.solver, cancel.clone());
        let solution = strategy.solve(&model, &ctx);
        debug!(
            "{} solve on {}: status={} objective={} nodes={} in {:?}",
            strategy.kind(),
            request.date,
            solution.status,
            solution.objective(),
            solution.nodes,
            ctx.elapsed()
        );
        if cancel.is_cancelled() {
            info!("run for {} cancelled after solving", request.date);
            return Err(RunError::Cancelled);
        }

        report.status = Some(solution.status);
        if solution.status == SolveStatus::NoSolution {
            report.notices.push(RunNotice::InfeasibleModel);
        }
        if solution.budget_exhausted {
            warn!(
                "solver budget exhausted on {} after {} nodes; using best assignment found",
                request.date, solution.nodes
            );
            report.notices.push(RunNotice::SolverTimeoutDegraded {
                nodes: solution.nodes,
            });
        }

        let committer = Committer::new(ValidationPolicy::for_strategy(request.strategy));
        let plan = committer
            .plan(&model, &solution, &snapshot.tasks)
            .map_err(RunError::InvalidAssignment)?;
        if !plan.tolerated.is_empty() {
            report.notices.push(RunNotice::HeuristicDegraded {
                violations: plan.tolerated.iter().map(|v| v.message.clone()).collect(),
            });
        }

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let receipt = committer.apply(self.store.as_ref(), &plan)?;

        report.assigned = plan.request.assignments.len();
        report.routes_touched = receipt.routes.iter().map(|route| route.id).collect();
        report.routes_created = receipt.created;
        report.elapsed_ms = elapsed_ms(started);
        info!(
            "run for {} assigned {}/{} visits over {} route(s), {} new",
            report.date,
            report.assigned,
            report.considered,
            report.routes_touched.len(),
            report.routes_created
        );
        Ok(report)
    }

    /// Books `task_id` on `resource_id` after checking for a double booking.
    pub fn assign_task(&self, task_id: i32, resource_id: &str) -> Result<RoutingContainer, BookingError> {
        self.with_task_locked(task_id, |task| {
            if task.is_cancelled() {
                return Err(BookingError::Invalid(format!("task {task_id} is cancelled")));
            }
            let day = self.store.snapshot(task.date())?;
            require_resource(&day.resources, resource_id)?;
            conflict::ensure_no_conflict(&task, resource_id, &day.tasks)?;
            let route = self.store.assign_task(task_id, resource_id)?;
            info!("task {task_id} booked on {resource_id} (route {})", route.id);
            Ok(route)
        })
    }

    /// Creates or replaces a visit. A pre-set caregiver is checked for
    /// double booking and the visit joins that caregiver's route.
    pub fn add_task(&self, task: Task) -> Result<Task, BookingError> {
        self.insert_task(task, false)
    }

    /// Like [`Scheduler::add_task`], but an existing id is an error.
    pub fn create_task(&self, task: Task) -> Result<Task, BookingError> {
        self.insert_task(task, true)
    }

    fn insert_task(&self, task: Task, create_only: bool) -> Result<Task, BookingError> {
        task_validation::validate_task(&task).map_err(|err| BookingError::Invalid(err.to_string()))?;

        let slot = self.locks.slot(task.date());
        let _guard = slot.lock();
        let _creating = create_only.then(|| self.creating.lock());
        if create_only && self.store.find_task(task.id)?.is_some() {
            return Err(BookingError::Exists(format!("visit {}", task.id)));
        }
        let day = self.store.snapshot(task.date())?;
        let mut record = task.clone();
        record.route_id = None;

        match task.resource_id.as_deref() {
            Some(resource_id) if !task.is_cancelled() => {
                require_resource(&day.resources, resource_id)?;
                conflict::ensure_no_conflict(&task, resource_id, &day.tasks)?;
                record.resource_id = None;
                self.store.upsert_task(&record)?;
                self.store.assign_task(task.id, resource_id)?;
            }
            _ => self.store.upsert_task(&record)?,
        }
        self.load_task(task.id)
    }

    /// Applies `update` to a visit on its own date.
    ///
    /// A new caregiver must exist, and a changed caregiver or time slot is
    /// checked for double booking. Totals of the old and new route follow.
    pub fn update_task(&self, task_id: i32, update: &TaskUpdate) -> Result<Task, BookingError> {
        self.with_task_locked(task_id, |current| {
            let updated = update.apply(&current);
            if updated.date() != current.date() {
                return Err(BookingError::Invalid(format!(
                    "task {task_id} cannot move from {} to {}",
                    current.date(),
                    updated.date()
                )));
            }
            task_validation::validate_task(&updated)
                .map_err(|err| BookingError::Invalid(err.to_string()))?;

            let day = self.store.snapshot(current.date())?;
            let reassigned = update.reassigns(&current);
            if let Some(resource_id) = updated.resource_id.as_deref() {
                if reassigned.is_some() {
                    require_resource(&day.resources, resource_id)?;
                }
                if !updated.is_cancelled() && (reassigned.is_some() || update.reschedules(&current)) {
                    conflict::ensure_no_conflict(&updated, resource_id, &day.tasks)?;
                }
            }

            match reassigned {
                Some(resource_id) => {
                    let mut record = updated.clone();
                    record.resource_id = current.resource_id.clone();
                    self.store.upsert_task(&record)?;
                    self.store.assign_task(task_id, resource_id)?;
                }
                None => self.store.upsert_task(&updated)?,
            }
            info!("task {task_id} updated (status {})", updated.status);
            self.load_task(task_id)
        })
    }

    pub fn delete_task(&self, task_id: i32) -> Result<Task, BookingError> {
        self.with_task_locked(task_id, |_| {
            let removed = self
                .store
                .delete_task(task_id)?
                .ok_or_else(|| BookingError::NotFound(format!("task {task_id}")))?;
            info!("task {task_id} deleted");
            Ok(removed)
        })
    }

    pub fn set_route_status(&self, route_id: i64, status: RouteStatus) -> Result<RoutingContainer, BookingError> {
        match self.store.set_route_status(route_id, status) {
            Err(StoreError::NotFound(what)) => Err(BookingError::NotFound(what)),
            other => Ok(other?),
        }
    }

    pub fn progress(&self, date: NaiveDate) -> Result<DayProgress, StoreError> {
        let snapshot = self.store.snapshot(date)?;
        Ok(progress::day_progress(date, &snapshot.tasks, &snapshot.resources))
    }
}

impl<S: AssignmentStore + ?Sized> Scheduler<S> {
    fn load_task(&self, task_id: i32) -> Result<Task, BookingError> {
        self.store
            .find_task(task_id)?
            .ok_or_else(|| BookingError::NotFound(format!("task {task_id}")))
    }

    /// Runs `f` on the visit as stored once its date lock is held.
    fn with_task_locked<T, F>(&self, task_id: i32, f: F) -> Result<T, BookingError>
    where
        F: FnOnce(Task) -> Result<T, BookingError>,
    {
        let mut date = self.load_task(task_id)?.date();
        loop {
            let slot = self.locks.slot(date);
            let _guard = slot.lock();
            let task = self.load_task(task_id)?;
            if task.date() == date {
                return f(task);
            }
            // Moved to another date while we waited.
            date = task.date();
        }
    }
}

fn require_resource(resources: &[Resource], resource_id: &str) -> Result<(), BookingError> {
    if resources.iter().any(|resource| resource.id == resource_id) {
        Ok(())
    } else {
        Err(BookingError::NotFound(format!("resource {resource_id}")))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
