// Build Plan Module
// The typed step tree consumed by the execution engine

pub mod models;
pub mod validate;

// Re-export key types
pub use models::{GetPlan, Plan, PlanId, PutPlan, Step, TaskPlan};
pub use validate::{PlanValidator, ValidationError, ValidationErrorKind};
