// Build Events
// Progress reporting emitted while a build executes

use crate::execution::context::StepStatus;
use crate::plan::PlanId;

use tokio::sync::mpsc;

/// Sender for build progress events
pub type ProgressSender = mpsc::UnboundedSender<BuildEvent>;

/// Receiver for build progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<BuildEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during build execution
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// Build execution started
    BuildStarted { build_id: String },

    /// Build reached its terminal status
    BuildCompleted {
        build_id: String,
        status: StepStatus,
    },

    /// Step execution started
    StepStarted { id: PlanId, kind: String },

    /// Step reached a terminal status
    StepCompleted { id: PlanId, status: StepStatus },

    /// Step was not run (already completed in a prior run, or its guard did
    /// not match)
    StepSkipped { id: PlanId, reason: String },

    /// Execution error detail (step error, timeout expiry)
    Error {
        id: Option<PlanId>,
        message: String,
    },
}

impl BuildEvent {
    /// Create a build started event
    pub fn build_started(build_id: impl Into<String>) -> Self {
        Self::BuildStarted {
            build_id: build_id.into(),
        }
    }

    /// Create a build completed event
    pub fn build_completed(build_id: impl Into<String>, status: StepStatus) -> Self {
        Self::BuildCompleted {
            build_id: build_id.into(),
            status,
        }
    }

    /// Create a step started event
    pub fn step_started(id: PlanId, kind: impl Into<String>) -> Self {
        Self::StepStarted {
            id,
            kind: kind.into(),
        }
    }

    /// Create a step completed event
    pub fn step_completed(id: PlanId, status: StepStatus) -> Self {
        Self::StepCompleted { id, status }
    }

    /// Create a step skipped event
    pub fn step_skipped(id: PlanId, reason: impl Into<String>) -> Self {
        Self::StepSkipped {
            id,
            reason: reason.into(),
        }
    }

    /// Create an error event
    pub fn error(id: Option<PlanId>, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: BuildEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: BuildEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: BuildEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
