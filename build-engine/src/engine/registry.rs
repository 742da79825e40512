// Engine Registry
// Fixed, name-keyed list of engines built once at startup

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

use std::collections::HashSet;
use std::sync::Arc;

/// Immutable registry of engines, resolved by name. Safe to share across
/// concurrent lookups; never mutated after construction.
pub struct Engines {
    engines: Vec<Arc<dyn Engine>>,
}

impl Engines {
    /// Build the registry, rejecting duplicate names up front so a name can
    /// never silently shadow another engine.
    pub fn new(engines: Vec<Arc<dyn Engine>>) -> EngineResult<Self> {
        let mut seen = HashSet::new();
        for engine in &engines {
            if !seen.insert(engine.name().to_string()) {
                return Err(EngineError::DuplicateEngineName(engine.name().to_string()));
            }
        }
        Ok(Self { engines })
    }

    /// First engine whose name matches, or not-found.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .iter()
            .find(|engine| engine.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Engine>> {
        self.engines.iter()
    }
}
