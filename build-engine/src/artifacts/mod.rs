// Artifact Streams
// Per-step byte-stream registry connecting step execution with external
// adapters

use crate::error::{EngineError, EngineResult};
use crate::plan::PlanId;

use dashmap::DashMap;
use tokio::io::{duplex, DuplexStream};

/// In-memory buffer of a single artifact stream.
const STREAM_BUFFER: usize = 64 * 1024;

/// Which way bytes flow relative to the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Bytes fed into the step from outside.
    Input,
    /// Bytes produced by the step for outside consumption.
    Output,
}

/// The two parties of an artifact stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEnd {
    /// The step executing inside the build.
    Engine,
    /// The orchestrator-side caller attaching through the build handle.
    External,
}

/// Registry of artifact streams keyed by step identifier and direction.
///
/// The first claim for a key creates the stream, whichever side it comes
/// from; the counterpart finds its end already waiting. Each end can be
/// claimed exactly once, and the slot is dropped as soon as both ends are
/// handed out.
#[derive(Default)]
pub struct ArtifactRegistry {
    slots: DashMap<(PlanId, StreamDirection), Slot>,
}

struct Slot {
    engine: Option<DuplexStream>,
    external: Option<DuplexStream>,
}

impl Slot {
    fn new_pair() -> Self {
        let (engine, external) = duplex(STREAM_BUFFER);
        Self {
            engine: Some(engine),
            external: Some(external),
        }
    }

    fn take(&mut self, end: StreamEnd) -> Option<DuplexStream> {
        match end {
            StreamEnd::Engine => self.engine.take(),
            StreamEnd::External => self.external.take(),
        }
    }

    fn exhausted(&self) -> bool {
        self.engine.is_none() && self.external.is_none()
    }
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim one end of the stream for `id` flowing in `direction`.
    pub fn claim(
        &self,
        id: &PlanId,
        direction: StreamDirection,
        end: StreamEnd,
    ) -> EngineResult<DuplexStream> {
        let key = (id.clone(), direction);
        let taken = self
            .slots
            .entry(key.clone())
            .or_insert_with(Slot::new_pair)
            .take(end);
        self.slots.remove_if(&key, |_, slot| slot.exhausted());
        taken.ok_or(EngineError::StreamClaimed {
            plan_id: id.clone(),
        })
    }
}
