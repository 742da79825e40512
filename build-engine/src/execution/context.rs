// Build Runtime State
// Per-build mutable execution state shared across scheduler units

use crate::artifacts::ArtifactRegistry;
use crate::execution::cancel::{cancel_scope, CancelSignal, CancelSource};
use crate::execution::events::{BuildEvent, EventSender, ProgressSender};
use crate::plan::{Plan, PlanId};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

/// Status of a single step, and of the build as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Errored,
    Aborted,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }

    /// Combine sibling outcomes, keeping the worse of the two by priority
    /// aborted > errored > failed > succeeded.
    pub fn worst(self, other: StepStatus) -> StepStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    fn severity(self) -> u8 {
        match self {
            StepStatus::Aborted => 3,
            StepStatus::Errored => 2,
            StepStatus::Failed => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Errored => "errored",
            StepStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Configuration for build execution
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum leaf steps in flight at once (0 = unlimited)
    pub max_in_flight: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_in_flight: 0 }
    }
}

/// Mutable state of one executing build: the plan, per-step statuses, the
/// cancellation scope, artifact streams, and the terminal-outcome signal.
pub struct BuildRuntime {
    build_id: String,
    plan: Plan,
    statuses: DashMap<PlanId, StepStatus>,
    /// Steps a prior process left running; re-run with the interrupted
    /// marker so kind-specific reconciliation can decide what is safe.
    interrupted: HashSet<PlanId>,
    artifacts: Arc<ArtifactRegistry>,
    events: Option<ProgressSender>,
    limiter: Option<Arc<Semaphore>>,
    abort: CancelSource,
    outcome: watch::Sender<Option<StepStatus>>,
}

impl BuildRuntime {
    /// Fresh runtime for a newly created build, all steps pending.
    pub fn new(
        build_id: impl Into<String>,
        plan: Plan,
        config: &SchedulerConfig,
        events: Option<ProgressSender>,
    ) -> Self {
        Self::assemble(build_id.into(), plan, Vec::new(), HashSet::new(), None, config, events)
    }

    /// Runtime reconstructed from persisted metadata.
    pub fn rehydrated(
        build_id: impl Into<String>,
        plan: Plan,
        statuses: impl IntoIterator<Item = (PlanId, StepStatus)>,
        interrupted: impl IntoIterator<Item = PlanId>,
        outcome: Option<StepStatus>,
        config: &SchedulerConfig,
        events: Option<ProgressSender>,
    ) -> Self {
        Self::assemble(
            build_id.into(),
            plan,
            statuses.into_iter().collect(),
            interrupted.into_iter().collect(),
            outcome,
            config,
            events,
        )
    }

    fn assemble(
        build_id: String,
        plan: Plan,
        statuses: Vec<(PlanId, StepStatus)>,
        interrupted: HashSet<PlanId>,
        outcome: Option<StepStatus>,
        config: &SchedulerConfig,
        events: Option<ProgressSender>,
    ) -> Self {
        let (abort, _) = cancel_scope();
        let limiter = match config.max_in_flight {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let map = DashMap::new();
        for (id, status) in statuses {
            map.insert(id, status);
        }
        Self {
            build_id,
            plan,
            statuses: map,
            interrupted,
            artifacts: Arc::new(ArtifactRegistry::new()),
            events,
            limiter,
            abort,
            outcome: watch::channel(outcome).0,
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn artifacts(&self) -> &Arc<ArtifactRegistry> {
        &self.artifacts
    }

    /// Recorded status for a step; pending when nothing was recorded yet.
    pub fn status(&self, id: &PlanId) -> StepStatus {
        self.statuses
            .get(id)
            .map(|entry| *entry.value())
            .unwrap_or(StepStatus::Pending)
    }

    pub fn set_status(&self, id: &PlanId, status: StepStatus) {
        self.statuses.insert(id.clone(), status);
    }

    /// Forget recorded statuses for a whole subtree, re-arming it for a
    /// fresh retry attempt.
    pub fn clear_subtree(&self, plan: &Plan) {
        plan.visit(&mut |node| {
            self.statuses.remove(&node.id);
        });
    }

    /// Point-in-time copy of every recorded status.
    pub fn statuses_snapshot(&self) -> Vec<(PlanId, StepStatus)> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn interrupted_steps(&self) -> &HashSet<PlanId> {
        &self.interrupted
    }

    pub fn was_interrupted(&self, id: &PlanId) -> bool {
        self.interrupted.contains(id)
    }

    /// Signal cancellation. Safe before and during execution.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn abort_signal(&self) -> CancelSignal {
        self.abort.signal()
    }

    /// Hold a leaf-execution slot while the permit lives. `None` when no
    /// limit is configured.
    pub async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    pub fn send_event(&self, event: BuildEvent) {
        self.events.send_event(event);
    }

    /// Record the overall terminal status, waking artifact waiters. Takes
    /// effect even with no subscriber alive at the time.
    pub fn finish(&self, status: StepStatus) {
        self.outcome.send_replace(Some(status));
    }

    /// Overall terminal status, if the build already finished.
    pub fn outcome(&self) -> Option<StepStatus> {
        *self.outcome.borrow()
    }

    /// Completes once the build records its terminal status.
    pub async fn finished(&self) {
        let mut rx = self.outcome.subscribe();
        if rx.borrow().is_some() {
            return;
        }
        while rx.changed().await.is_ok() {
            if rx.borrow().is_some() {
                return;
            }
        }
    }
}
