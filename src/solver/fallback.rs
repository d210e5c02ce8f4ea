//! Round-robin assignment for environments where the exact search is not
//! wanted or not available.
//!
//! Only the capability rule is honoured. Capacity and overlap are not
//! checked before a match is accepted; the committer reports such breaches
//! as degraded results instead of rejecting them.

use log::debug;

use super::{AssignmentStrategy, SolveContext, SolveStatus, Solution, StrategyKind};
use crate::model::{Assignment, AssignmentModel};

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl AssignmentStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    fn solve(&self, model: &AssignmentModel, _ctx: &SolveContext) -> Solution {
        let mut order: Vec<usize> = (0..model.task_count()).collect();
        order.sort_by_key(|&task| (model.tasks[task].interval.start, task));

        let resource_count = model.resource_count();
        let mut assignment = Assignment::empty(model.task_count());
        let mut cursor = 0usize;

        for task in order {
            let service_type = &model.tasks[task].service_type;
            for _ in 0..resource_count {
                let resource = cursor % resource_count;
                cursor += 1;
                if model.resources[resource].can_perform(service_type) {
                    assignment.assign(task, resource);
                    break;
                }
            }
        }

        let status = if assignment.assigned_count() == 0 {
            SolveStatus::NoSolution
        } else {
            SolveStatus::Feasible
        };
        debug!(
            "round-robin on {}: {} of {} assigned",
            model.date,
            assignment.assigned_count(),
            model.task_count()
        );

        Solution {
            status,
            assignment,
            nodes: 0,
            budget_exhausted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::resource::Resource;
    use crate::task::Task;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn cursor_resumes_after_last_match() {
        let tasks = vec![
            Task::new(1, "A", at(9), at(10)),
            Task::new(2, "A", at(10), at(11)),
            Task::new(3, "A", at(11), at(12)),
        ];
        let resources = vec![
            Resource::new("r1", 480).with_capabilities(["A"]),
            Resource::new("r2", 480).with_capabilities(["A"]),
        ];
        let model = ModelBuilder::new(at(0).date()).build(&tasks, &resources).unwrap();
        let solution = RoundRobin.solve(&model, &SolveContext::default());
        let pairs: Vec<_> = solution.pairs(&model).collect();
        assert_eq!(pairs, vec![(1, "r1"), (2, "r2"), (3, "r1")]);
    }
}
