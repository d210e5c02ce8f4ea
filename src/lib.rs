pub mod commit;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod model;
pub mod persistence;
pub mod progress;
pub mod resource;
pub mod route;
pub mod runs;
pub mod solver;
pub mod task;
pub mod task_validation;

#[cfg(feature = "http_api")]
pub mod http_api;

pub use commit::{CommitPlan, Committer, ValidationPolicy};
pub use config::EngineConfig;
pub use conflict::{ConflictError, Interval};
pub use engine::{BookingError, DateLocks, RunError, RunNotice, RunReport, RunRequest, Scheduler};
pub use model::{AssignmentModel, Constraint, ConstraintFamily, ModelBuilder, ModelError};
pub use persistence::{AssignmentStore, MemoryStore, StoreError, StoreResult};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteStore;
pub use progress::DayProgress;
pub use resource::Resource;
pub use route::{GeneratedBy, RouteArena, RouteKey, RouteStatus, RoutingContainer};
pub use runs::{RunHandle, RunId, RunManager, RunStatus};
pub use solver::{
    AssignmentStrategy, BranchAndBound, CancelToken, RoundRobin, SolveStatus, Solution,
    SolverConfig, StrategyKind,
};
pub use task::{Task, TaskUpdate, VisitStatus};
