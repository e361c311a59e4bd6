//! Unit registry: maps kind ids to constructors.
//!
//! Plays the role of the plugin/driver collaborator. The chain never
//! consults it; only description loading and the host do.

use crate::pipeline::error::{UnitError, UnitResult};
use crate::pipeline::unit::{EventMethod, Unit, UnitInfo};
use crate::pipeline::units::{self, FrameLogger, LogReplaySource, PassthroughFilter, TestPatternSource};
use std::collections::BTreeMap;

/// What the registry knows about a unit kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescription {
    pub kind: String,
    pub name: String,
    pub event_method: EventMethod,
}

type Constructor = Box<dyn Fn() -> UnitResult<Unit>>;

struct Entry {
    description: UnitDescription,
    constructor: Constructor,
}

#[derive(Default)]
pub struct UnitRegistry {
    entries: BTreeMap<String, Entry>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in stage that needs no arguments.
    pub fn with_builtin_units() -> Self {
        let mut registry = Self::new();
        registry.register(units::test_pattern::info().into(), || {
            Unit::new(units::test_pattern::info(), TestPatternSource::new())
        });
        registry.register(units::passthrough::info().into(), || {
            Unit::new(units::passthrough::info(), PassthroughFilter::new())
        });
        registry.register(units::logger::info().into(), || {
            Unit::new(units::logger::info(), FrameLogger::new())
        });
        registry.register(units::log_replay::info().into(), || {
            Unit::new(units::log_replay::info(), LogReplaySource::new())
        });
        registry
    }

    /// Add or replace a kind.
    pub fn register<F>(&mut self, description: UnitDescription, constructor: F)
    where
        F: Fn() -> UnitResult<Unit> + 'static,
    {
        if self.entries.contains_key(&description.kind) {
            tracing::warn!("Replacing registered unit kind '{}'", description.kind);
        }
        self.entries.insert(
            description.kind.clone(),
            Entry {
                description,
                constructor: Box::new(constructor),
            },
        );
    }

    pub fn create_unit(&self, kind: &str) -> UnitResult<Unit> {
        let entry = self
            .entries
            .get(kind)
            .ok_or_else(|| UnitError::UnknownKind(kind.to_string()))?;
        (entry.constructor)()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Known kinds, sorted by id.
    pub fn descriptions(&self) -> impl Iterator<Item = &UnitDescription> {
        self.entries.values().map(|e| &e.description)
    }
}

impl From<UnitInfo> for UnitDescription {
    fn from(info: UnitInfo) -> Self {
        Self {
            kind: info.kind,
            name: info.name,
            event_method: info.event_method,
        }
    }
}
