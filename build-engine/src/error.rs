// Engine Error Types
// Shared error taxonomy and result alias for the build engine library

use crate::plan::{PlanId, ValidationError};

use thiserror::Error;

/// Result alias used across the crate
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced at the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    /// The submitted plan failed validation; fatal to that create call.
    #[error("invalid build plan: {0}")]
    InvalidPlan(#[from] ValidationError),

    /// Two engines with the same name were handed to the registry.
    #[error("duplicate engine name '{0}' in registry")]
    DuplicateEngineName(String),

    /// A build was looked up with no metadata recorded for it.
    #[error("no engine metadata recorded for build '{build_id}'")]
    MissingMetadata { build_id: String },

    /// Recorded metadata could not be decoded.
    #[error("corrupt engine metadata for build '{build_id}'")]
    CorruptMetadata {
        build_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Recorded metadata was written by an incompatible engine version.
    #[error("engine metadata version {found} is not supported (expected {expected})")]
    IncompatibleMetadata { found: u32, expected: u32 },

    /// A build was routed to an engine that did not create it.
    #[error("build '{build_id}' was created by engine '{engine}'")]
    WrongEngine { build_id: String, engine: String },

    /// Both attempts to claim the same end of an artifact stream.
    #[error("artifact stream already attached for step '{plan_id}'")]
    StreamClaimed { plan_id: PlanId },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
