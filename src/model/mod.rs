//! Formal assignment problem for one day: a boolean variable per
//! (task, resource) pair plus explicit constraint records.
//!
//! Constraints are plain data so they can be inspected and tested without
//! running any search. Strategies in [`crate::solver`] compile them into
//! whatever structure suits their algorithm.

pub mod builder;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::conflict::Interval;

pub use builder::{ModelBuilder, ModelError};

/// Index of a decision variable; row-major over (task, resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTask {
    pub id: i32,
    pub service_type: String,
    pub interval: Interval,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResource {
    pub id: String,
    pub capabilities: BTreeSet<String>,
    pub max_minutes_per_day: i64,
    /// Minutes already committed on the date before this run.
    pub committed_minutes: i64,
}

impl ModelResource {
    pub fn can_perform(&self, service_type: &str) -> bool {
        self.capabilities.contains(service_type)
    }

    pub fn residual_minutes(&self) -> i64 {
        (self.max_minutes_per_day - self.committed_minutes).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFamily {
    SingleAssignment,
    Capability,
    Occupied,
    Capacity,
    NonOverlap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Sum of `vars` is at most one.
    AtMostOne { task: usize, vars: Vec<VarId> },
    /// `var` is fixed to false: the resource lacks the task's service type.
    Capability { var: VarId },
    /// `var` is fixed to false: the resource already has a committed visit
    /// overlapping the task.
    Occupied { var: VarId, blocking_task: i32 },
    /// Weighted sum of `terms` is at most `limit` minutes.
    Capacity {
        resource: usize,
        terms: Vec<(VarId, i64)>,
        limit: i64,
    },
    /// `first + second <= 1`.
    NoOverlap {
        resource: usize,
        first: VarId,
        second: VarId,
    },
}

impl Constraint {
    pub fn family(&self) -> ConstraintFamily {
        match self {
            Constraint::AtMostOne { .. } => ConstraintFamily::SingleAssignment,
            Constraint::Capability { .. } => ConstraintFamily::Capability,
            Constraint::Occupied { .. } => ConstraintFamily::Occupied,
            Constraint::Capacity { .. } => ConstraintFamily::Capacity,
            Constraint::NoOverlap { .. } => ConstraintFamily::NonOverlap,
        }
    }

    /// Variables this constraint forces to false, if any.
    pub fn fixed_false(&self) -> Option<VarId> {
        match self {
            Constraint::Capability { var } | Constraint::Occupied { var, .. } => Some(*var),
            _ => None,
        }
    }
}

/// One resource choice (or none) per model task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    choices: Vec<Option<usize>>,
}

impl Assignment {
    pub fn empty(task_count: usize) -> Self {
        Self {
            choices: vec![None; task_count],
        }
    }

    pub fn from_choices(choices: Vec<Option<usize>>) -> Self {
        Self { choices }
    }

    pub fn assign(&mut self, task: usize, resource: usize) {
        self.choices[task] = Some(resource);
    }

    pub fn clear(&mut self, task: usize) {
        self.choices[task] = None;
    }

    pub fn resource_of(&self, task: usize) -> Option<usize> {
        self.choices.get(task).copied().flatten()
    }

    pub fn assigned_count(&self) -> usize {
        self.choices.iter().filter(|choice| choice.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// `(task, resource)` index pairs in task order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.choices
            .iter()
            .enumerate()
            .filter_map(|(task, choice)| choice.map(|resource| (task, resource)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint: usize,
    pub family: ConstraintFamily,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint #{} ({:?}): {}", self.constraint, self.family, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentModel {
    pub date: NaiveDate,
    pub tasks: Vec<ModelTask>,
    pub resources: Vec<ModelResource>,
    pub constraints: Vec<Constraint>,
}

impl AssignmentModel {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn var_count(&self) -> usize {
        self.tasks.len() * self.resources.len()
    }

    pub fn var(&self, task: usize, resource: usize) -> VarId {
        VarId(task * self.resources.len() + resource)
    }

    pub fn var_parts(&self, var: VarId) -> (usize, usize) {
        let width = self.resources.len().max(1);
        (var.0 / width, var.0 % width)
    }

    pub fn constraints_of(&self, family: ConstraintFamily) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(move |constraint| constraint.family() == family)
    }

    /// Uniform-weight objective: number of tasks given a resource.
    pub fn objective(&self, assignment: &Assignment) -> usize {
        assignment.assigned_count()
    }

    fn is_active(&self, assignment: &Assignment, var: VarId) -> bool {
        let (task, resource) = self.var_parts(var);
        assignment.resource_of(task) == Some(resource)
    }

    /// Evaluates every constraint against `assignment`.
    pub fn violations(&self, assignment: &Assignment) -> Vec<Violation> {
        let mut found = Vec::new();
        for (idx, constraint) in self.constraints.iter().enumerate() {
            let message = match constraint {
                Constraint::AtMostOne { task, vars } => {
                    let active = vars
                        .iter()
                        .filter(|var| self.is_active(assignment, **var))
                        .count();
                    (active > 1).then(|| {
                        format!("task {} assigned {} times", self.tasks[*task].id, active)
                    })
                }
                Constraint::Capability { var } => self.is_active(assignment, *var).then(|| {
                    let (task, resource) = self.var_parts(*var);
                    format!(
                        "resource {} cannot perform '{}' for task {}",
                        self.resources[resource].id,
                        self.tasks[task].service_type,
                        self.tasks[task].id
                    )
                }),
                Constraint::Occupied { var, blocking_task } => {
                    self.is_active(assignment, *var).then(|| {
                        let (task, resource) = self.var_parts(*var);
                        format!(
                            "task {} overlaps committed task {} on resource {}",
                            self.tasks[task].id, blocking_task, self.resources[resource].id
                        )
                    })
                }
                Constraint::Capacity {
                    resource,
                    terms,
                    limit,
                } => {
                    let used: i64 = terms
                        .iter()
                        .filter(|(var, _)| self.is_active(assignment, *var))
                        .map(|(_, minutes)| minutes)
                        .sum();
                    (used > *limit).then(|| {
                        format!(
                            "resource {} needs {} minutes but only {} remain",
                            self.resources[*resource].id, used, limit
                        )
                    })
                }
                Constraint::NoOverlap {
                    resource,
                    first,
                    second,
                } => (self.is_active(assignment, *first) && self.is_active(assignment, *second))
                    .then(|| {
                        let (a, _) = self.var_parts(*first);
                        let (b, _) = self.var_parts(*second);
                        format!(
                            "tasks {} and {} overlap on resource {}",
                            self.tasks[a].id, self.tasks[b].id, self.resources[*resource].id
                        )
                    }),
            };
            if let Some(message) = message {
                found.push(Violation {
                    constraint: idx,
                    family: constraint.family(),
                    message,
                });
            }
        }
        found
    }
}
