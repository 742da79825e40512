// Step Runners
// Adapter boundary for the leaf step kinds executed on behalf of the
// scheduler

use crate::artifacts::{ArtifactRegistry, StreamDirection, StreamEnd};
use crate::error::EngineResult;
use crate::execution::cancel::CancelSignal;
use crate::plan::{GetPlan, PlanId, PutPlan, TaskPlan};

use std::sync::Arc;
use thiserror::Error;
use tokio::io::DuplexStream;

/// Domain-level outcome a runner reports for a completed step. Everything
/// unexpected goes through `StepError` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// Infrastructure fault around a step, as opposed to the step's own failure
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StepError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Handle a leaf runner receives for one invocation: identity, artifact
/// streams, cancellation, and the interrupted-resume marker.
pub struct StepContext {
    build_id: String,
    plan_id: PlanId,
    artifacts: Arc<ArtifactRegistry>,
    cancel: CancelSignal,
    interrupted: bool,
}

impl StepContext {
    pub(crate) fn new(
        build_id: impl Into<String>,
        plan_id: PlanId,
        artifacts: Arc<ArtifactRegistry>,
        cancel: CancelSignal,
        interrupted: bool,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            plan_id,
            artifacts,
            cancel,
            interrupted,
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn plan_id(&self) -> &PlanId {
        &self.plan_id
    }

    /// True when a prior process recorded this step as running and went away
    /// before it finished. The runner decides whether its side effects
    /// already committed and re-execution is safe.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the build (or an enclosing timeout) asks this step to
    /// unwind.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The byte stream feeding this step's input. Claimable once.
    pub fn input(&self) -> EngineResult<DuplexStream> {
        self.artifacts
            .claim(&self.plan_id, StreamDirection::Input, StreamEnd::Engine)
    }

    /// The byte stream carrying this step's output. Claimable once.
    pub fn output(&self) -> EngineResult<DuplexStream> {
        self.artifacts
            .claim(&self.plan_id, StreamDirection::Output, StreamEnd::Engine)
    }
}

/// Executes the leaf step kinds. The scheduler guarantees a given step is
/// never invoked twice concurrently and that `running` was recorded before
/// the call.
#[async_trait::async_trait]
pub trait StepRunner: Send + Sync {
    /// Fetch a resource version into the build.
    async fn get(&self, plan: &GetPlan, ctx: StepContext) -> Result<StepOutcome, StepError>;

    /// Publish build output to a resource.
    async fn put(&self, plan: &PutPlan, ctx: StepContext) -> Result<StepOutcome, StepError>;

    /// Run a user-defined task.
    async fn task(&self, plan: &TaskPlan, ctx: StepContext) -> Result<StepOutcome, StepError>;
}
