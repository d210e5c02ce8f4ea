//! Asynchronous run surface: submit a run, poll or await its status.

use log::{debug, error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::engine::{RunError, RunReport, RunRequest, Scheduler};
use crate::persistence::AssignmentStore;
use crate::solver::CancelToken;

pub type RunId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed(RunReport),
    Failed(String),
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed(_) | RunStatus::Failed(_) | RunStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed(_) => "completed",
            RunStatus::Failed(_) => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

struct RunEntry {
    request: RunRequest,
    cancel: CancelToken,
    status: Arc<watch::Sender<RunStatus>>,
}

/// Handle returned by [`RunManager::submit`].
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: RunId,
    receiver: watch::Receiver<RunStatus>,
}

impl RunHandle {
    pub fn status(&self) -> RunStatus {
        self.receiver.borrow().clone()
    }

    /// Resolves once the run completes, fails or is cancelled.
    pub async fn wait(mut self) -> RunStatus {
        loop {
            {
                let current = self.receiver.borrow_and_update();
                if current.is_terminal() {
                    return current.clone();
                }
            }
            if self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }
}

/// Finished runs kept for status queries before the oldest are dropped.
pub const DEFAULT_RUN_RETENTION: usize = 256;

/// Runs scheduling jobs on the tokio blocking pool and tracks their status.
pub struct RunManager<S: AssignmentStore + ?Sized + 'static> {
    scheduler: Arc<Scheduler<S>>,
    runs: RwLock<HashMap<RunId, RunEntry>>,
    next_id: AtomicU64,
    retention: usize,
}

impl<S: AssignmentStore + ?Sized + 'static> RunManager<S> {
    pub fn new(scheduler: Arc<Scheduler<S>>) -> Self {
        Self {
            scheduler,
            runs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            retention: DEFAULT_RUN_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<S>> {
        &self.scheduler
    }

    /// Queues `request` and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: RunRequest) -> RunHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = watch::channel(RunStatus::Pending);
        let sender = Arc::new(sender);
        let cancel = CancelToken::new();
        {
            let mut runs = self.runs.write();
            prune_finished(&mut runs, self.retention);
            runs.insert(
                id,
                RunEntry {
                    request: request.clone(),
                    cancel: cancel.clone(),
                    status: sender.clone(),
                },
            );
        }

        let scheduler = self.scheduler.clone();
        tokio::task::spawn_blocking(move || {
            if cancel.is_cancelled() {
                sender.send_replace(RunStatus::Cancelled);
                return;
            }
            sender.send_replace(RunStatus::Running);
            let status = match scheduler.run(&request, &cancel) {
                Ok(report) => RunStatus::Completed(report),
                Err(RunError::Cancelled) => {
                    info!("run {id} for {} cancelled", request.date);
                    RunStatus::Cancelled
                }
                Err(err) => {
                    error!("run {id} for {} failed: {err}", request.date);
                    RunStatus::Failed(err.to_string())
                }
            };
            sender.send_replace(status);
        });

        RunHandle { id, receiver }
    }

    pub fn status(&self, id: RunId) -> Option<RunStatus> {
        self.runs
            .read()
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
    }

    pub fn request(&self, id: RunId) -> Option<RunRequest> {
        self.runs.read().get(&id).map(|entry| entry.request.clone())
    }

    pub fn subscribe(&self, id: RunId) -> Option<RunHandle> {
        self.runs.read().get(&id).map(|entry| RunHandle {
            id,
            receiver: entry.status.subscribe(),
        })
    }

    /// Asks a pending or running job to stop before it commits.
    ///
    /// Returns `false` for unknown ids and for runs that already finished.
    pub fn cancel(&self, id: RunId) -> bool {
        let runs = self.runs.read();
        let Some(entry) = runs.get(&id) else {
            return false;
        };
        if entry.status.borrow().is_terminal() {
            return false;
        }
        entry.cancel.cancel();
        true
    }
}

/// Drops the oldest finished runs beyond `retention`. Live runs are kept.
fn prune_finished(runs: &mut HashMap<RunId, RunEntry>, retention: usize) {
    let mut finished: Vec<RunId> = runs
        .iter()
        .filter(|(_, entry)| entry.status.borrow().is_terminal())
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= retention {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - retention;
    for id in &finished[..excess] {
        runs.remove(id);
    }
    debug!("dropped {excess} finished run(s)");
}
