use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{
    AssignmentStore, CommitReceipt, CommitRequest, DaySnapshot, StoreError, StoreResult,
};
use crate::resource::Resource;
use crate::route::{GeneratedBy, RouteArena, RouteKey, RouteStatus, RoutingContainer};
use crate::task::Task;
use crate::task_validation;

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, Resource>,
    tasks: BTreeMap<i32, Task>,
    routes: RouteArena,
}

impl MemoryState {
    fn tasks_on(&self, date: NaiveDate) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |task| task.date() == date)
    }

    fn recompute_route(&mut self, key: &RouteKey) {
        let tasks = &self.tasks;
        if let Some(route) = self.routes.get_mut(key) {
            route.recompute(tasks.values().filter(|task| task.date() == key.date));
        }
    }
}

/// Process-local store guarded by a single read/write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(resources: Vec<Resource>, tasks: Vec<Task>) -> StoreResult<Self> {
        Self::from_parts(resources, tasks, Vec::new())
    }

    pub fn from_parts(
        resources: Vec<Resource>,
        tasks: Vec<Task>,
        routes: Vec<RoutingContainer>,
    ) -> StoreResult<Self> {
        super::validate_resources(&resources)?;
        super::validate_tasks(&tasks)?;
        let state = MemoryState {
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
            routes: RouteArena::from_routes(routes),
        };
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.state.read().resources.values().cloned().collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.read().tasks.values().cloned().collect()
    }

    pub fn routes(&self) -> Vec<RoutingContainer> {
        self.state.read().routes.iter().cloned().collect()
    }

    pub fn route_count(&self) -> usize {
        self.state.read().routes.len()
    }
}

impl AssignmentStore for MemoryStore {
    fn snapshot(&self, date: NaiveDate) -> StoreResult<DaySnapshot> {
        let state = self.state.read();
        Ok(DaySnapshot {
            date,
            tasks: state.tasks_on(date).cloned().collect(),
            resources: state.resources.values().cloned().collect(),
        })
    }

    fn routes_for(&self, date: NaiveDate) -> StoreResult<Vec<RoutingContainer>> {
        Ok(self.state.read().routes.for_date(date))
    }

    fn commit(&self, request: &CommitRequest) -> StoreResult<CommitReceipt> {
        let mut state = self.state.write();

        // Validate everything before the first mutation.
        for assignment in &request.assignments {
            let task = state.tasks.get(&assignment.task_id).ok_or_else(|| {
                StoreError::NotFound(format!("task {}", assignment.task_id))
            })?;
            if let Some(current) = task.resource_id.as_deref() {
                return Err(StoreError::InvalidData(format!(
                    "task {} is already assigned to {}",
                    task.id, current
                )));
            }
            if task.date() != request.date {
                return Err(StoreError::InvalidData(format!(
                    "task {} is not on {}",
                    task.id, request.date
                )));
            }
            if !state.resources.contains_key(&assignment.resource_id) {
                return Err(StoreError::NotFound(format!(
                    "resource {}",
                    assignment.resource_id
                )));
            }
        }

        let mut receipt = CommitReceipt::default();
        let mut touched = Vec::new();
        for assignment in &request.assignments {
            let key = RouteKey::new(assignment.resource_id.clone(), request.date);
            let (route, created) = state.routes.get_or_create(key.clone(), request.generated_by);
            let route_id = route.id;
            if created {
                receipt.created += 1;
            }
            if let Some(task) = state.tasks.get_mut(&assignment.task_id) {
                task.resource_id = Some(assignment.resource_id.clone());
                task.route_id = Some(route_id);
            }
            if !touched.contains(&key) {
                touched.push(key);
            }
        }

        let MemoryState { tasks, routes, .. } = &mut *state;
        for key in &touched {
            let Some(route) = routes.get_mut(key) else {
                continue;
            };
            for task in tasks.values_mut() {
                if task.route_id.is_none()
                    && task.date() == key.date
                    && task.resource_id.as_deref() == Some(key.resource_id.as_str())
                {
                    task.route_id = Some(route.id);
                }
            }
            route.recompute(tasks.values().filter(|task| task.date() == key.date));
            super::check_planned_total(request, route);
            receipt.routes.push(route.clone());
        }
        Ok(receipt)
    }

    fn upsert_task(&self, task: &Task) -> StoreResult<()> {
        task_validation::validate_task(task)?;
        let mut state = self.state.write();
        if let Some(previous) = state.tasks.insert(task.id, task.clone()) {
            if let Some(resource_id) = previous.resource_id {
                state.recompute_route(&RouteKey::new(resource_id, previous.start.date()));
            }
        }
        if let Some(resource_id) = task.resource_id.clone() {
            state.recompute_route(&RouteKey::new(resource_id, task.date()));
        }
        Ok(())
    }

    fn upsert_resource(&self, resource: &Resource) -> StoreResult<()> {
        task_validation::validate_resource(resource)?;
        self.state
            .write()
            .resources
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    fn find_task(&self, id: i32) -> StoreResult<Option<Task>> {
        Ok(self.state.read().tasks.get(&id).cloned())
    }

    fn delete_task(&self, id: i32) -> StoreResult<Option<Task>> {
        let mut state = self.state.write();
        let removed = state.tasks.remove(&id);
        if let Some(task) = &removed {
            if let Some(resource_id) = task.resource_id.clone() {
                state.recompute_route(&RouteKey::new(resource_id, task.date()));
            }
        }
        Ok(removed)
    }

    fn assign_task(&self, task_id: i32, resource_id: &str) -> StoreResult<RoutingContainer> {
        let mut state = self.state.write();
        if !state.resources.contains_key(resource_id) {
            return Err(StoreError::NotFound(format!("resource {resource_id}")));
        }
        let (date, previous) = match state.tasks.get(&task_id) {
            Some(task) => (task.date(), task.resource_id.clone()),
            None => return Err(StoreError::NotFound(format!("task {task_id}"))),
        };

        let key = RouteKey::new(resource_id, date);
        let (route, _) = state.routes.get_or_create(key.clone(), GeneratedBy::Manual);
        let route_id = route.id;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.resource_id = Some(resource_id.to_string());
            task.route_id = Some(route_id);
        }

        if let Some(previous) = previous.filter(|p| p != resource_id) {
            state.recompute_route(&RouteKey::new(previous, date));
        }
        state.recompute_route(&key);
        state
            .routes
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("route {key}")))
    }

    fn set_route_status(&self, route_id: i64, status: RouteStatus) -> StoreResult<RoutingContainer> {
        let mut state = self.state.write();
        let route = state
            .routes
            .find_by_id_mut(route_id)
            .ok_or_else(|| StoreError::NotFound(format!("route {route_id}")))?;
        route.status = status;
        Ok(route.clone())
    }
}
