// Build Engine Library
// Execution core for a CI orchestrator: engines, resumable builds, the
// step-graph scheduler, and artifact streams

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod execution;
pub mod plan;
pub mod runners;

// Re-export commonly used types
pub use error::{EngineError, EngineResult};

// Re-export plan types
pub use plan::{
    GetPlan, Plan, PlanId, PlanValidator, PutPlan, Step, TaskPlan, ValidationError,
    ValidationErrorKind,
};

// Re-export engine types
pub use engine::{
    Build, BuildToken, Engine, Engines, ExecEngine, StoredBuild, EXEC_ENGINE_NAME, TOKEN_VERSION,
};

// Re-export execution types
pub use execution::{
    progress_channel, BuildEvent, BuildRuntime, CancelSignal, CancelSource, EventSender,
    ProgressReceiver, ProgressSender, Scheduler, SchedulerConfig, StepStatus,
};

// Re-export runner types
pub use runners::{StepContext, StepError, StepOutcome, StepRunner};

// Re-export artifact types
pub use artifacts::{ArtifactRegistry, StreamDirection, StreamEnd};
