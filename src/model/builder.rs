use chrono::NaiveDate;
use log::debug;
use thiserror::Error;

use super::{AssignmentModel, Constraint, ModelResource, ModelTask};
use crate::conflict::Interval;
use crate::resource::Resource;
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("nothing to schedule on {date}: {tasks} open tasks, {resources} active resources")]
    EmptyInput {
        date: NaiveDate,
        tasks: usize,
        resources: usize,
    },
}

/// Translates a day's visits and caregivers into an [`AssignmentModel`].
#[derive(Debug, Clone)]
pub struct ModelBuilder<'a> {
    date: NaiveDate,
    resource_filter: Option<&'a [String]>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            resource_filter: None,
        }
    }

    /// Restricts the model to the given caregiver ids. `None` or an empty
    /// slice keeps every active caregiver.
    pub fn with_resource_filter(mut self, filter: Option<&'a [String]>) -> Self {
        self.resource_filter = filter.filter(|ids| !ids.is_empty());
        self
    }

    fn admits(&self, resource: &Resource) -> bool {
        resource.active
            && self
                .resource_filter
                .is_none_or(|ids| ids.iter().any(|id| *id == resource.id))
    }

    /// Builds the model from every task on the date.
    ///
    /// Open tasks become decision rows. Tasks already booked on a caregiver
    /// are kept out of the search but reduce that caregiver's remaining
    /// minutes and block overlapping choices.
    pub fn build(&self, tasks: &[Task], resources: &[Resource]) -> Result<AssignmentModel, ModelError> {
        let open: Vec<&Task> = tasks
            .iter()
            .filter(|task| task.date() == self.date && task.is_schedulable())
            .collect();
        let chosen: Vec<&Resource> = resources.iter().filter(|r| self.admits(r)).collect();

        if open.is_empty() || chosen.is_empty() {
            return Err(ModelError::EmptyInput {
                date: self.date,
                tasks: open.len(),
                resources: chosen.len(),
            });
        }

        let booked: Vec<&Task> = tasks
            .iter()
            .filter(|task| task.date() == self.date && !task.is_cancelled() && !task.is_unassigned())
            .collect();

        let model_tasks: Vec<ModelTask> = open
            .iter()
            .map(|task| ModelTask {
                id: task.id,
                service_type: task.service_type.clone(),
                interval: task.interval(),
                duration_minutes: task.duration_minutes(),
            })
            .collect();

        let model_resources: Vec<ModelResource> = chosen
            .iter()
            .map(|resource| ModelResource {
                id: resource.id.clone(),
                capabilities: resource.capabilities.clone(),
                max_minutes_per_day: resource.max_minutes_per_day,
                committed_minutes: booked
                    .iter()
                    .filter(|task| task.is_booked_on(&resource.id))
                    .map(|task| task.duration_minutes())
                    .sum(),
            })
            .collect();

        let mut model = AssignmentModel {
            date: self.date,
            tasks: model_tasks,
            resources: model_resources,
            constraints: Vec::new(),
        };

        let task_count = model.task_count();
        let resource_count = model.resource_count();
        let mut constraints = Vec::new();

        for task in 0..task_count {
            constraints.push(Constraint::AtMostOne {
                task,
                vars: (0..resource_count).map(|r| model.var(task, r)).collect(),
            });
        }

        for (task, model_task) in model.tasks.iter().enumerate() {
            for (r, resource) in model.resources.iter().enumerate() {
                let var = model.var(task, r);
                if !resource.can_perform(&model_task.service_type) {
                    constraints.push(Constraint::Capability { var });
                } else if let Some(blocking) =
                    first_booking_overlap(&booked, &resource.id, &model_task.interval)
                {
                    constraints.push(Constraint::Occupied {
                        var,
                        blocking_task: blocking,
                    });
                }
            }
        }

        for (r, resource) in model.resources.iter().enumerate() {
            constraints.push(Constraint::Capacity {
                resource: r,
                terms: model
                    .tasks
                    .iter()
                    .enumerate()
                    .map(|(task, t)| (model.var(task, r), t.duration_minutes))
                    .collect(),
                limit: resource.residual_minutes(),
            });
        }

        for first in 0..task_count {
            for second in (first + 1)..task_count {
                if !model.tasks[first]
                    .interval
                    .overlaps(&model.tasks[second].interval)
                {
                    continue;
                }
                for r in 0..resource_count {
                    constraints.push(Constraint::NoOverlap {
                        resource: r,
                        first: model.var(first, r),
                        second: model.var(second, r),
                    });
                }
            }
        }

        model.constraints = constraints;
        debug!(
            "model for {}: {} tasks, {} resources, {} constraints",
            self.date,
            task_count,
            resource_count,
            model.constraints.len()
        );
        Ok(model)
    }
}

fn first_booking_overlap(booked: &[&Task], resource_id: &str, interval: &Interval) -> Option<i32> {
    booked
        .iter()
        .find(|task| task.is_booked_on(resource_id) && task.interval().overlaps(interval))
        .map(|task| task.id)
}
