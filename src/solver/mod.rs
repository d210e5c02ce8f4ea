pub mod exact;
pub mod fallback;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::model::{Assignment, AssignmentModel};

pub use exact::BranchAndBound;
pub use fallback::RoundRobin;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The objective is provably maximal.
    Optimal,
    /// Best assignment found before the budget ran out.
    Feasible,
    /// No task could be given a resource.
    NoSolution,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::NoSolution => "no_solution",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Exact,
    Heuristic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Exact => "exact",
            StrategyKind::Heuristic => "heuristic",
        }
    }

    pub fn strategy(&self) -> Box<dyn AssignmentStrategy> {
        match self {
            StrategyKind::Exact => Box::new(BranchAndBound),
            StrategyKind::Heuristic => Box::new(RoundRobin),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(StrategyKind::Exact),
            "heuristic" | "greedy" | "round_robin" => Ok(StrategyKind::Heuristic),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub time_limit: Duration,
    /// Search-node cap per independent component. Gives reproducible
    /// budgets where wall-clock limits would not.
    pub node_limit: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            node_limit: None,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_node_limit(mut self, node_limit: u64) -> Self {
        self.node_limit = Some(node_limit);
        self
    }
}

/// Shared flag for abandoning a run before it commits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SolveContext {
    pub config: SolverConfig,
    pub cancel: CancelToken,
    started: Instant,
}

impl SolveContext {
    pub fn new(config: SolverConfig, cancel: CancelToken) -> Self {
        Self {
            config,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.config.time_limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SolveContext {
    fn default() -> Self {
        Self::new(SolverConfig::default(), CancelToken::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub assignment: Assignment,
    /// Search nodes visited; zero for strategies that do not search.
    pub nodes: u64,
    /// Set when the search stopped on the time or node budget.
    pub budget_exhausted: bool,
}

impl Solution {
    pub fn objective(&self) -> usize {
        self.assignment.assigned_count()
    }

    /// `(task id, resource id)` pairs in model task order.
    pub fn pairs<'m>(&'m self, model: &'m AssignmentModel) -> impl Iterator<Item = (i32, &'m str)> + 'm {
        self.assignment
            .pairs()
            .map(|(task, resource)| (model.tasks[task].id, model.resources[resource].id.as_str()))
    }
}

/// A way of choosing resources for the open tasks of a model.
pub trait AssignmentStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn solve(&self, model: &AssignmentModel, ctx: &SolveContext) -> Solution;
}
