// Execution Module
// Step scheduling, runtime state, cancellation, and progress events

pub mod cancel;
pub mod context;
pub mod events;
pub mod scheduler;

// Re-export key types
pub use cancel::{cancel_scope, CancelSignal, CancelSource};
pub use context::{BuildRuntime, SchedulerConfig, StepStatus};
pub use events::{
    progress_channel, BuildEvent, EventSender, ProgressReceiver, ProgressSender,
};
pub use scheduler::Scheduler;
