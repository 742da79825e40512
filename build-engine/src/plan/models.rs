// Build Plan Data Models
// Step nodes forming the immutable plan tree handed to an engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier of a step within a plan. Keys the step's status record
/// and its artifact streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A node in the plan tree: a unique identifier plus the step to run there.
///
/// The tree is an owned value, so it is acyclic by construction and never
/// mutated once handed to an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub step: Step,
}

impl Plan {
    pub fn new(id: impl Into<PlanId>, step: Step) -> Self {
        Self {
            id: id.into(),
            step,
        }
    }

    /// Visit this node and every descendant, parents first.
    pub fn visit(&self, f: &mut dyn FnMut(&Plan)) {
        f(self);
        match &self.step {
            Step::Get(_) | Step::Put(_) | Step::Task(_) => {}
            Step::Sequence(children) | Step::Do(children) | Step::Aggregate(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            Step::Try(child) => child.visit(f),
            Step::Retry { step, .. } => step.visit(f),
            Step::Timeout { step, .. } => step.visit(f),
            Step::OnSuccess { step, on_success } => {
                step.visit(f);
                on_success.visit(f);
            }
            Step::OnFailure { step, on_failure } => {
                step.visit(f);
                on_failure.visit(f);
            }
            Step::Ensure { step, ensure } => {
                step.visit(f);
                ensure.visit(f);
            }
        }
    }
}

/// The step kinds understood by the scheduler. A closed set: adding a kind is
/// a compile-time-checked change to every dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Fetch a resource version into the build.
    Get(GetPlan),
    /// Publish build output to a resource.
    Put(PutPlan),
    /// Run a user-defined task.
    Task(TaskPlan),
    /// Run children strictly in order, stopping at the first non-success.
    Sequence(Vec<Plan>),
    /// Run children strictly in order regardless of earlier outcomes.
    Do(Vec<Plan>),
    /// Run children concurrently and join before reporting.
    Aggregate(Vec<Plan>),
    /// Run the child but report success even if it failed.
    Try(Box<Plan>),
    /// Re-run the child while it fails, up to `attempts` total attempts.
    Retry { attempts: u32, step: Box<Plan> },
    /// Race the child against a deadline; an expired child is cancelled and
    /// reported as errored.
    Timeout { duration: Duration, step: Box<Plan> },
    /// Follow-up that only runs when the anchor step succeeded.
    OnSuccess { step: Box<Plan>, on_success: Box<Plan> },
    /// Follow-up that only runs when the anchor step failed.
    OnFailure { step: Box<Plan>, on_failure: Box<Plan> },
    /// Follow-up that runs whatever the anchor step's outcome was.
    Ensure { step: Box<Plan>, ensure: Box<Plan> },
}

impl Step {
    /// Wire/display name of the step kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Get(_) => "get",
            Step::Put(_) => "put",
            Step::Task(_) => "task",
            Step::Sequence(_) => "sequence",
            Step::Do(_) => "do",
            Step::Aggregate(_) => "aggregate",
            Step::Try(_) => "try",
            Step::Retry { .. } => "retry",
            Step::Timeout { .. } => "timeout",
            Step::OnSuccess { .. } => "on_success",
            Step::OnFailure { .. } => "on_failure",
            Step::Ensure { .. } => "ensure",
        }
    }

    /// True for the executor kinds dispatched to a step runner.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Step::Get(_) | Step::Put(_) | Step::Task(_))
    }
}

/// Configuration of a resource fetch. Opaque to the scheduler beyond its
/// position in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPlan {
    pub name: String,
    pub resource: String,
    #[serde(default)]
    pub version: Option<serde_json::Value>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Configuration of a resource publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutPlan {
    pub name: String,
    pub resource: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Configuration of a task run. The task config itself is the runner's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}
