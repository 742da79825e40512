// Build Metadata Token
// Serialized resume state persisted alongside every build

use crate::error::{EngineError, EngineResult};
use crate::execution::context::{BuildRuntime, StepStatus};
use crate::plan::{Plan, PlanId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Schema version checked on decode. Bump on incompatible token changes.
pub const TOKEN_VERSION: u32 = 1;

/// Everything needed to resume a build in a fresh process: the owning
/// engine, the plan, terminal step statuses, the steps a dead process left
/// running, and the overall outcome once the build finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildToken {
    pub version: u32,
    pub engine: String,
    pub plan: Plan,
    #[serde(default)]
    pub statuses: BTreeMap<PlanId, StepStatus>,
    #[serde(default)]
    pub interrupted: Vec<PlanId>,
    #[serde(default)]
    pub outcome: Option<StepStatus>,
}

impl BuildToken {
    /// Snapshot the runtime as of its last completed status transition.
    /// Steps still running are recorded as interrupted, not as a status.
    pub fn snapshot(engine: &str, runtime: &BuildRuntime) -> Self {
        let mut statuses = BTreeMap::new();
        let mut interrupted: BTreeSet<PlanId> =
            runtime.interrupted_steps().iter().cloned().collect();

        for (id, status) in runtime.statuses_snapshot() {
            if status.is_terminal() {
                statuses.insert(id, status);
            } else if status == StepStatus::Running {
                interrupted.insert(id);
            }
        }
        // A step that ran to terminal since rehydration is reconciled.
        interrupted.retain(|id| !statuses.contains_key(id));

        Self {
            version: TOKEN_VERSION,
            engine: engine.to_string(),
            plan: runtime.plan().clone(),
            statuses,
            interrupted: interrupted.into_iter().collect(),
            outcome: runtime.outcome(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str, build_id: &str) -> EngineResult<Self> {
        if raw.trim().is_empty() {
            return Err(EngineError::MissingMetadata {
                build_id: build_id.to_string(),
            });
        }
        let token: BuildToken =
            serde_json::from_str(raw).map_err(|source| EngineError::CorruptMetadata {
                build_id: build_id.to_string(),
                source,
            })?;
        if token.version != TOKEN_VERSION {
            return Err(EngineError::IncompatibleMetadata {
                found: token.version,
                expected: TOKEN_VERSION,
            });
        }
        Ok(token)
    }
}
