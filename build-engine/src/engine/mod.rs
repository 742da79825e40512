// Engine Module
// Engine and build abstractions plus the registry the orchestrator uses to
// route builds

pub mod exec;
pub mod metadata;
pub mod registry;

// Re-export key types
pub use exec::{ExecEngine, EXEC_ENGINE_NAME};
pub use metadata::{BuildToken, TOKEN_VERSION};
pub use registry::Engines;

use crate::error::EngineResult;
use crate::execution::context::StepStatus;
use crate::plan::{Plan, PlanId};

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// The persisted build record as the orchestrator hands it back for
/// resumption: an opaque id, the name of the engine that created the build,
/// and the engine metadata written after the last state-relevant transition.
#[derive(Debug, Clone)]
pub struct StoredBuild {
    pub id: String,
    pub engine: String,
    pub metadata: String,
}

/// A named factory for builds. Registered once at process start and outlives
/// every build it creates.
pub trait Engine: Send + Sync {
    /// Stable identifier persisted with every build this engine creates.
    /// Changing it orphans in-flight builds.
    fn name(&self) -> &str;

    /// Validate `plan` and bind a fresh pending build to it.
    fn create_build(&self, build_id: &str, plan: Plan) -> EngineResult<Arc<dyn Build>>;

    /// Reconstruct a build from a previously stored record. Absent, corrupt,
    /// or incompatible metadata is an explicit error, never a silent fresh
    /// run.
    fn lookup_build(&self, stored: &StoredBuild) -> EngineResult<Arc<dyn Build>>;

    /// Best-effort release of per-build bookkeeping during orchestrator
    /// shutdown. Must not abort or corrupt in-flight builds; they stay
    /// resumable from a new process.
    fn release_all(&self);
}

/// One execution instance of a plan.
#[async_trait::async_trait]
pub trait Build: Send + Sync {
    /// Serialized resume token reflecting the last completed status
    /// transition. Idempotent.
    fn metadata(&self) -> String;

    /// Drive the build to its terminal status and return it. At most one
    /// resume may run at a time per build; exclusivity is the caller's
    /// responsibility.
    async fn resume(&self) -> StepStatus;

    /// Signal cancellation. Safe before and during `resume`; once it
    /// returns, no new step starts.
    fn abort(&self);

    /// Feed `input` into the artifact stream of the given step, returning
    /// once the input is exhausted, the counterpart closes, or the build
    /// finishes.
    async fn receive_input(
        &self,
        id: &PlanId,
        input: Box<dyn AsyncRead + Send + Unpin>,
    ) -> EngineResult<()>;

    /// Pump the given step's output stream into `output`, returning once the
    /// stream closes or the build finishes.
    async fn send_output(
        &self,
        id: &PlanId,
        output: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> EngineResult<()>;
}

impl std::fmt::Debug for dyn Build {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Build")
    }
}
