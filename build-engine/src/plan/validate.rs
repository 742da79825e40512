// Plan Validation
// Structural checks performed before a build is created

use crate::plan::models::{Plan, PlanId, Step};

use std::collections::HashSet;
use std::fmt;

/// Error type for plan validation
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two nodes share a step identifier
    DuplicateStepId,
    /// A retry node with zero attempts
    ZeroAttempts,
    /// A timeout node with a zero deadline
    ZeroTimeout,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn duplicate_step_id(id: &PlanId) -> Self {
        Self {
            message: format!("step identifier '{}' is used more than once", id),
            kind: ValidationErrorKind::DuplicateStepId,
        }
    }

    pub fn zero_attempts(id: &PlanId) -> Self {
        Self {
            message: format!("retry step '{}' is configured with zero attempts", id),
            kind: ValidationErrorKind::ZeroAttempts,
        }
    }

    pub fn zero_timeout(id: &PlanId) -> Self {
        Self {
            message: format!("timeout step '{}' is configured with a zero deadline", id),
            kind: ValidationErrorKind::ZeroTimeout,
        }
    }
}

/// Validates plans before execution. Unknown step kinds and cycles cannot be
/// expressed in the tree type, so the checks left are identifier uniqueness
/// and degenerate combinator configs.
pub struct PlanValidator;

impl PlanValidator {
    pub fn validate(plan: &Plan) -> Result<(), ValidationError> {
        let mut seen: HashSet<PlanId> = HashSet::new();
        let mut error: Option<ValidationError> = None;

        plan.visit(&mut |node| {
            if error.is_some() {
                return;
            }
            if !seen.insert(node.id.clone()) {
                error = Some(ValidationError::duplicate_step_id(&node.id));
                return;
            }
            match &node.step {
                Step::Retry { attempts: 0, .. } => {
                    error = Some(ValidationError::zero_attempts(&node.id));
                }
                Step::Timeout { duration, .. } if duration.is_zero() => {
                    error = Some(ValidationError::zero_timeout(&node.id));
                }
                _ => {}
            }
        });

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
