//! Exact branch-and-bound search over an [`AssignmentModel`].
//!
//! The model is split into independent components first: two open tasks
//! belong to the same component only when some capacity row or overlap
//! pair links their candidate variables. Components are searched in
//! parallel, each by a deterministic depth-first branch-and-bound, and
//! their best assignments are merged in component order.

use log::debug;
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

use super::{AssignmentStrategy, CancelToken, SolveContext, SolveStatus, Solution, StrategyKind};
use crate::model::{Assignment, AssignmentModel, Constraint};

/// How often (in nodes) the wall clock and cancel flag are consulted.
const CLOCK_STRIDE: u64 = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBound;

impl AssignmentStrategy for BranchAndBound {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Exact
    }

    fn solve(&self, model: &AssignmentModel, ctx: &SolveContext) -> Solution {
        let compiled = Compiled::from_model(model);
        let components = compiled.components(model);
        let deadline = ctx.deadline();

        let outcomes: Vec<ComponentOutcome> = components
            .par_iter()
            .map(|tasks| {
                Search::new(&compiled, model, tasks, deadline, ctx.config.node_limit, &ctx.cancel)
                    .run()
            })
            .collect();

        let mut assignment = Assignment::empty(model.task_count());
        let mut nodes = 0;
        let mut complete = true;
        for outcome in &outcomes {
            nodes += outcome.nodes;
            complete &= outcome.complete;
            for &(task, resource) in &outcome.best {
                assignment.assign(task, resource);
            }
        }

        let status = if assignment.assigned_count() == 0 {
            SolveStatus::NoSolution
        } else if complete {
            SolveStatus::Optimal
        } else {
            SolveStatus::Feasible
        };

        debug!(
            "branch-and-bound on {}: {} components, {} nodes, {} of {} assigned ({})",
            model.date,
            outcomes.len(),
            nodes,
            assignment.assigned_count(),
            model.task_count(),
            status
        );

        Solution {
            status,
            assignment,
            nodes,
            budget_exhausted: !complete,
        }
    }
}

/// Constraint records flattened into per-variable lookups.
#[derive(Debug)]
struct Compiled {
    resource_count: usize,
    /// Per task: resources whose variable is not fixed to false.
    candidates: Vec<Vec<usize>>,
    /// Per variable: variables it may not be active together with.
    clashes: Vec<Vec<usize>>,
    /// Per variable: `(row, weight)` for every capacity row it appears in.
    rows: Vec<Vec<(usize, i64)>>,
    limits: Vec<i64>,
}

impl Compiled {
    fn from_model(model: &AssignmentModel) -> Self {
        let var_count = model.var_count();
        let resource_count = model.resource_count();
        let mut forbidden = vec![false; var_count];
        let mut clashes = vec![Vec::new(); var_count];
        let mut rows = vec![Vec::new(); var_count];
        let mut limits = Vec::new();

        for constraint in &model.constraints {
            match constraint {
                Constraint::Capability { var } | Constraint::Occupied { var, .. } => {
                    forbidden[var.0] = true;
                }
                Constraint::Capacity { terms, limit, .. } => {
                    let row = limits.len();
                    limits.push(*limit);
                    for (var, minutes) in terms {
                        rows[var.0].push((row, *minutes));
                    }
                }
                Constraint::NoOverlap { first, second, .. } => {
                    clashes[first.0].push(second.0);
                    clashes[second.0].push(first.0);
                }
                // At most one resource per task is structural in `Assignment`.
                Constraint::AtMostOne { .. } => {}
            }
        }

        let candidates = (0..model.task_count())
            .map(|task| {
                (0..resource_count)
                    .filter(|&r| !forbidden[model.var(task, r).0])
                    .collect()
            })
            .collect();

        Self {
            resource_count,
            candidates,
            clashes,
            rows,
            limits,
        }
    }

    fn var(&self, task: usize, resource: usize) -> usize {
        task * self.resource_count + resource
    }

    fn task_of(&self, var: usize) -> usize {
        var / self.resource_count.max(1)
    }

    fn is_candidate(&self, var: usize) -> bool {
        let task = self.task_of(var);
        let resource = var % self.resource_count.max(1);
        self.candidates[task].contains(&resource)
    }

    /// Groups tasks that share a capacity row or an overlap pair between
    /// candidate variables. Tasks without candidates are left out.
    fn components(&self, model: &AssignmentModel) -> Vec<Vec<usize>> {
        let task_count = model.task_count();
        let mut links = UnionFind::<usize>::new(task_count);

        let mut row_members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (var, memberships) in self.rows.iter().enumerate() {
            if memberships.is_empty() || !self.is_candidate(var) {
                continue;
            }
            for &(row, _) in memberships {
                row_members.entry(row).or_default().push(self.task_of(var));
            }
        }
        for members in row_members.values() {
            for pair in members.windows(2) {
                links.union(pair[0], pair[1]);
            }
        }

        for (var, others) in self.clashes.iter().enumerate() {
            if !self.is_candidate(var) {
                continue;
            }
            for &other in others {
                if self.is_candidate(other) {
                    links.union(self.task_of(var), self.task_of(other));
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for task in 0..task_count {
            if self.candidates[task].is_empty() {
                continue;
            }
            groups.entry(links.find(task)).or_default().push(task);
        }
        let mut components: Vec<Vec<usize>> = groups.into_values().collect();
        components.sort_by_key(|tasks| tasks[0]);
        components
    }
}

#[derive(Debug)]
struct ComponentOutcome {
    best: Vec<(usize, usize)>,
    nodes: u64,
    complete: bool,
}

struct Search<'a> {
    compiled: &'a Compiled,
    order: Vec<usize>,
    active: Vec<bool>,
    used: Vec<i64>,
    current: Vec<Option<usize>>,
    assigned: usize,
    best: Vec<(usize, usize)>,
    best_count: usize,
    deadline: Instant,
    node_limit: Option<u64>,
    cancel: &'a CancelToken,
    nodes: u64,
    stopped: bool,
}

impl<'a> Search<'a> {
    fn new(
        compiled: &'a Compiled,
        model: &AssignmentModel,
        tasks: &[usize],
        deadline: Instant,
        node_limit: Option<u64>,
        cancel: &'a CancelToken,
    ) -> Self {
        // Fail-first: fewest candidates, then earliest start, then input order.
        let mut order = tasks.to_vec();
        order.sort_by_key(|&task| {
            (
                compiled.candidates[task].len(),
                model.tasks[task].interval.start,
                task,
            )
        });

        Self {
            compiled,
            order,
            active: vec![false; compiled.clashes.len()],
            used: vec![0; compiled.limits.len()],
            current: vec![None; compiled.candidates.len()],
            assigned: 0,
            best: Vec::new(),
            best_count: 0,
            deadline,
            node_limit,
            cancel,
            nodes: 0,
            stopped: false,
        }
    }

    fn run(mut self) -> ComponentOutcome {
        self.first_fit();
        if self.best_count < self.order.len() {
            self.branch(0);
        }
        ComponentOutcome {
            best: self.best,
            nodes: self.nodes,
            complete: !self.stopped,
        }
    }

    fn feasible(&self, task: usize, resource: usize) -> bool {
        let var = self.compiled.var(task, resource);
        if self.compiled.clashes[var].iter().any(|&other| self.active[other]) {
            return false;
        }
        self.compiled.rows[var]
            .iter()
            .all(|&(row, minutes)| self.used[row] + minutes <= self.compiled.limits[row])
    }

    fn place(&mut self, task: usize, resource: usize) {
        let var = self.compiled.var(task, resource);
        self.active[var] = true;
        for &(row, minutes) in &self.compiled.rows[var] {
            self.used[row] += minutes;
        }
        self.current[task] = Some(resource);
        self.assigned += 1;
    }

    fn lift(&mut self, task: usize, resource: usize) {
        let var = self.compiled.var(task, resource);
        self.active[var] = false;
        for &(row, minutes) in &self.compiled.rows[var] {
            self.used[row] -= minutes;
        }
        self.current[task] = None;
        self.assigned -= 1;
    }

    fn record(&mut self) {
        self.best_count = self.assigned;
        self.best = self
            .order
            .iter()
            .filter_map(|&task| self.current[task].map(|resource| (task, resource)))
            .collect();
        self.best.sort_unstable();
    }

    /// Seeds the incumbent with the first feasible resource per task, so a
    /// budget that expires immediately still yields a valid assignment.
    fn first_fit(&mut self) {
        let mut placed = Vec::new();
        for idx in 0..self.order.len() {
            let task = self.order[idx];
            let choice = self.compiled.candidates[task]
                .iter()
                .copied()
                .find(|&resource| self.feasible(task, resource));
            if let Some(resource) = choice {
                self.place(task, resource);
                placed.push((task, resource));
            }
        }
        self.record();
        for (task, resource) in placed.into_iter().rev() {
            self.lift(task, resource);
        }
    }

    fn out_of_budget(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.node_limit.is_some_and(|limit| self.nodes > limit) {
            self.stopped = true;
        } else if self.nodes % CLOCK_STRIDE == 1
            && (self.cancel.is_cancelled() || Instant::now() >= self.deadline)
        {
            self.stopped = true;
        }
        self.stopped
    }

    /// Tasks from `depth` onwards that could still take some resource.
    fn optimistic_remaining(&self, depth: usize) -> usize {
        self.order[depth..]
            .iter()
            .filter(|&&task| {
                self.compiled.candidates[task]
                    .iter()
                    .any(|&resource| self.feasible(task, resource))
            })
            .count()
    }

    fn branch(&mut self, depth: usize) {
        self.nodes += 1;
        if self.out_of_budget() {
            return;
        }

        if depth == self.order.len() {
            if self.assigned > self.best_count {
                self.record();
            }
            return;
        }

        if self.assigned + self.optimistic_remaining(depth) <= self.best_count {
            return;
        }

        let task = self.order[depth];
        for idx in 0..self.compiled.candidates[task].len() {
            let resource = self.compiled.candidates[task][idx];
            if !self.feasible(task, resource) {
                continue;
            }
            self.place(task, resource);
            self.branch(depth + 1);
            self.lift(task, resource);
            if self.stopped || self.best_count == self.order.len() {
                return;
            }
        }

        self.branch(depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::resource::Resource;
    use crate::task::Task;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn independent_resources_split_into_components() {
        let tasks = vec![
            Task::new(1, "A", at(9, 0), at(10, 0)),
            Task::new(2, "B", at(9, 0), at(10, 0)),
            Task::new(3, "A", at(11, 0), at(12, 0)),
        ];
        let resources = vec![
            Resource::new("a", 480).with_capabilities(["A"]),
            Resource::new("b", 480).with_capabilities(["B"]),
        ];
        let model = ModelBuilder::new(at(0, 0).date())
            .build(&tasks, &resources)
            .unwrap();
        let compiled = Compiled::from_model(&model);
        let components = compiled.components(&model);
        assert_eq!(components, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn tasks_without_candidates_form_no_component() {
        let tasks = vec![Task::new(1, "Z", at(9, 0), at(10, 0))];
        let resources = vec![Resource::new("a", 480).with_capabilities(["A"])];
        let model = ModelBuilder::new(at(0, 0).date())
            .build(&tasks, &resources)
            .unwrap();
        let compiled = Compiled::from_model(&model);
        assert!(compiled.components(&model).is_empty());
    }
}
