//! Turns a solver [`Solution`] into a [`CommitRequest`] for the store.

use log::warn;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{AssignmentModel, ConstraintFamily, Violation};
use crate::persistence::{
    AssignmentStore, CommitReceipt, CommitRequest, CommittedAssignment, RouteTotal, StoreResult,
};
use crate::route::{self, GeneratedBy};
use crate::solver::{Solution, StrategyKind};
use crate::task::Task;

/// How constraint violations in a solution are treated before commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Every violation rejects the solution.
    Strict,
    /// Capability violations reject the solution; capacity and overlap
    /// violations are logged and committed. Matches what the round-robin
    /// strategy is able to guarantee.
    Degraded,
}

impl ValidationPolicy {
    pub fn for_strategy(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Exact => ValidationPolicy::Strict,
            StrategyKind::Heuristic => ValidationPolicy::Degraded,
        }
    }

    fn tolerates(&self, family: ConstraintFamily) -> bool {
        match self {
            ValidationPolicy::Strict => false,
            ValidationPolicy::Degraded => matches!(
                family,
                ConstraintFamily::Capacity | ConstraintFamily::NonOverlap | ConstraintFamily::Occupied
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assignment rejected with {} violation(s): {}", .violations.len(), summarize(.violations))]
pub struct RejectedAssignment {
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| violation.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validated request plus the violations the policy let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    pub request: CommitRequest,
    pub tolerated: Vec<Violation>,
}

#[derive(Debug, Clone, Copy)]
pub struct Committer {
    policy: ValidationPolicy,
}

impl Committer {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Checks `solution` against `model` and groups it per caregiver.
    ///
    /// `day_tasks` is the snapshot the model was built from. Route totals
    /// include the visits each caregiver already had on the date.
    pub fn plan(
        &self,
        model: &AssignmentModel,
        solution: &Solution,
        day_tasks: &[Task],
    ) -> Result<CommitPlan, RejectedAssignment> {
        let (tolerated, rejected): (Vec<Violation>, Vec<Violation>) = model
            .violations(&solution.assignment)
            .into_iter()
            .partition(|violation| self.policy.tolerates(violation.family));
        if !rejected.is_empty() {
            return Err(RejectedAssignment {
                violations: rejected,
            });
        }
        for violation in &tolerated {
            warn!("committing degraded assignment on {}: {}", model.date, violation);
        }

        let mut per_resource: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (task, resource) in solution.assignment.pairs() {
            per_resource
                .entry(model.resources[resource].id.as_str())
                .or_default()
                .push(task);
        }

        let mut assignments = Vec::with_capacity(solution.objective());
        let mut totals = Vec::with_capacity(per_resource.len());
        for (resource_id, tasks) in per_resource {
            let existing = route::total_minutes(
                day_tasks
                    .iter()
                    .filter(|task| task.date() == model.date && task.is_booked_on(resource_id)),
            );
            let added: i64 = tasks
                .iter()
                .map(|task| model.tasks[*task].duration_minutes)
                .sum();
            for task in tasks {
                assignments.push(CommittedAssignment {
                    task_id: model.tasks[task].id,
                    resource_id: resource_id.to_string(),
                });
            }
            totals.push(RouteTotal {
                resource_id: resource_id.to_string(),
                total_minutes: existing + added,
            });
        }

        Ok(CommitPlan {
            request: CommitRequest {
                date: model.date,
                generated_by: GeneratedBy::Solver,
                assignments,
                totals,
            },
            tolerated,
        })
    }

    pub fn apply<S>(&self, store: &S, plan: &CommitPlan) -> StoreResult<CommitReceipt>
    where
        S: AssignmentStore + ?Sized,
    {
        if plan.request.is_empty() {
            return Ok(CommitReceipt::default());
        }
        store.commit(&plan.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::resource::Resource;
    use crate::solver::{AssignmentStrategy, RoundRobin, SolveContext};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn overlapping_day() -> (Vec<Task>, Vec<Resource>) {
        let tasks = vec![
            Task::new(1, "A", at(9), at(11)),
            Task::new(2, "A", at(10), at(12)),
        ];
        let resources = vec![Resource::new("r1", 480).with_capabilities(["A"])];
        (tasks, resources)
    }

    #[test]
    fn strict_policy_rejects_overlap() {
        let (tasks, resources) = overlapping_day();
        let model = ModelBuilder::new(at(9).date()).build(&tasks, &resources).unwrap();
        let solution = RoundRobin.solve(&model, &SolveContext::default());
        assert_eq!(solution.objective(), 2);

        let err = Committer::new(ValidationPolicy::Strict)
            .plan(&model, &solution, &tasks)
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].family, ConstraintFamily::NonOverlap);
    }

    #[test]
    fn degraded_policy_keeps_overlap_and_reports_it() {
        let (tasks, resources) = overlapping_day();
        let model = ModelBuilder::new(at(9).date()).build(&tasks, &resources).unwrap();
        let solution = RoundRobin.solve(&model, &SolveContext::default());

        let plan = Committer::new(ValidationPolicy::Degraded)
            .plan(&model, &solution, &tasks)
            .unwrap();
        assert_eq!(plan.request.assignments.len(), 2);
        assert_eq!(plan.tolerated.len(), 1);
        assert_eq!(
            plan.request.totals,
            vec![RouteTotal {
                resource_id: "r1".to_string(),
                total_minutes: 240,
            }]
        );
    }

    #[test]
    fn totals_include_existing_bookings() {
        let mut booked = Task::new(9, "A", at(7), at(8));
        booked.resource_id = Some("r1".to_string());
        let tasks = vec![booked, Task::new(1, "A", at(9), at(10))];
        let resources = vec![Resource::new("r1", 480).with_capabilities(["A"])];
        let model = ModelBuilder::new(at(9).date()).build(&tasks, &resources).unwrap();
        let solution = RoundRobin.solve(&model, &SolveContext::default());

        let plan = Committer::new(ValidationPolicy::Strict)
            .plan(&model, &solution, &tasks)
            .unwrap();
        assert_eq!(plan.request.totals[0].total_minutes, 120);
    }
}
