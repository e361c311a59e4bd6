//! Ordered pipeline of units.
//!
//! The chain owns the links between its members: after every mutation,
//! each unit's upstream is the unit before it. Frames never pass through
//! the chain; units hand them to their successor directly. The chain only
//! mediates topology, drives members toward a desired status and
//! aggregates dispatcher hooks for the host event loop.

use crate::pipeline::error::{ChainError, ChainResult};
use crate::pipeline::event::{EventBus, PipelineEvent};
use crate::pipeline::format::UnitFormat;
use crate::pipeline::id::{SubscriberId, UnitId};
use crate::pipeline::unit::{EventMethod, Unit, UnitStatus};
use crossbeam_channel::Receiver;
use std::os::fd::RawFd;

/// What the host event loop should wait on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSources {
    /// Readiness descriptors of streaming descriptor-driven units.
    pub descriptors: Vec<(UnitId, RawFd)>,
    /// Earliest wake time (microseconds since the Unix epoch) of streaming
    /// timer-driven units.
    pub next_wake: Option<i64>,
}

impl PollSources {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty() && self.next_wake.is_none()
    }
}

pub struct Chain {
    units: Vec<Unit>,
    desired: UnitStatus,
    bus: EventBus,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            desired: UnitStatus::Idle,
            bus: EventBus::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Members in pipeline order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    pub fn find(&self, id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id() == id)
    }

    pub fn index_of(&self, id: UnitId) -> Option<usize> {
        self.units.iter().position(|u| u.id() == id)
    }

    pub fn desired_status(&self) -> UnitStatus {
        self.desired
    }

    /// Subscribe to chain events plus the events of every member unit.
    pub fn subscribe(&mut self, capacity: usize) -> (SubscriberId, Receiver<PipelineEvent>) {
        let (id, rx) = self.bus.subscribe(capacity);
        for unit in &self.units {
            self.attach_subscribers(unit);
        }
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.bus.detach(id);
        for unit in &self.units {
            unit.unsubscribe(id);
        }
    }

    fn attach_subscribers(&self, unit: &Unit) {
        for (id, sender) in self.bus.senders() {
            unit.attach_subscriber(id, sender.clone());
        }
    }

    fn detach_subscribers(&self, unit: &Unit) {
        for (id, _) in self.bus.senders() {
            unit.unsubscribe(id);
        }
    }

    /// Rewire every member to its neighbours.
    fn relink(&self) {
        for (i, unit) in self.units.iter().enumerate() {
            let upstream = i.checked_sub(1).and_then(|p| self.units.get(p));
            unit.link(upstream, self.units.get(i + 1));
        }
    }

    fn upstream_format(&self, index: usize) -> Option<UnitFormat> {
        index
            .checked_sub(1)
            .and_then(|p| self.units.get(p))
            .and_then(Unit::active_format)
    }

    pub fn add_unit(&mut self, unit: Unit) -> ChainResult<()> {
        let index = self.units.len();
        self.insert_unit(unit, index)
    }

    /// Insert `unit` at `index`, link it and let negotiation cascade from it.
    pub fn insert_unit(&mut self, unit: Unit, index: usize) -> ChainResult<()> {
        if unit.in_chain() {
            return Err(ChainError::AlreadyMember(unit.id()));
        }
        if index > self.units.len() {
            return Err(ChainError::IndexOutOfRange {
                index,
                len: self.units.len(),
            });
        }
        tracing::info!("Adding {} '{}' at position {}", unit.id(), unit.name(), index);
        unit.set_in_chain(true);
        self.attach_subscribers(&unit);
        self.units.insert(index, unit.clone());
        self.relink();
        self.bus.publish(PipelineEvent::UnitAdded {
            unit: unit.id(),
            index,
        });

        unit.notify_input_format_changed(self.upstream_format(index));
        self.drive_after_change();
        Ok(())
    }

    /// Detach `unit`, shutting it down, and join its neighbours.
    pub fn remove_unit(&mut self, unit: &Unit) -> ChainResult<()> {
        let id = unit.id();
        let index = self.index_of(id).ok_or(ChainError::NotMember(id))?;
        tracing::info!("Removing {} '{}' from position {}", id, unit.name(), index);

        let removed = self.units.remove(index);
        // Cut the downstream link first so the shutdown does not reach the old successor.
        removed.link(removed.upstream().as_ref(), None);
        removed.stream_shutdown();
        self.detach_subscribers(&removed);
        removed.link(None, None);
        removed.set_in_chain(false);
        removed.notify_input_format_changed(None);

        self.relink();
        self.bus.publish(PipelineEvent::UnitRemoved { unit: id });
        if let Some(next) = self.units.get(index) {
            next.notify_input_format_changed(self.upstream_format(index));
        }
        self.drive_after_change();
        Ok(())
    }

    /// Move `unit` to `new_index`.
    ///
    /// All links are rewired at once; the first unit whose upstream changed
    /// is notified and the cascade reaches each later unit exactly once.
    pub fn reorder_unit(&mut self, unit: &Unit, new_index: usize) -> ChainResult<()> {
        let id = unit.id();
        let from = self.index_of(id).ok_or(ChainError::NotMember(id))?;
        if new_index >= self.units.len() {
            return Err(ChainError::IndexOutOfRange {
                index: new_index,
                len: self.units.len(),
            });
        }
        if from == new_index {
            return Ok(());
        }
        tracing::info!("Moving {} '{}' from {} to {}", id, unit.name(), from, new_index);

        let moved = self.units.remove(from);
        self.units.insert(new_index, moved);

        // Compare against the links still in place before rewiring.
        let first_changed = (0..self.units.len()).find(|&i| {
            let upstream = i.checked_sub(1).and_then(|p| self.units.get(p));
            !self.units[i].upstream_is(upstream)
        });
        self.relink();
        self.bus.publish(PipelineEvent::UnitReordered {
            unit: id,
            from,
            to: new_index,
        });
        if let Some(k) = first_changed {
            self.units[k].notify_input_format_changed(self.upstream_format(k));
        }
        self.drive_after_change();
        Ok(())
    }

    /// Drive every member toward `status`, in pipeline order.
    ///
    /// Stops at the first unit that fails and reports it as faulty. The
    /// caller is expected to tear the chain down (see [`Chain::shutdown_all`]).
    pub fn set_desired_status(&mut self, status: UnitStatus) -> ChainResult<()> {
        tracing::info!("Desired chain status: {:?}", status);
        self.desired = status;
        self.drive()
    }

    fn drive(&mut self) -> ChainResult<()> {
        if self.desired == UnitStatus::Idle {
            // Downstream first, so upstream shutdowns only reach idle units.
            for unit in self.units.iter().rev() {
                unit.stream_shutdown();
            }
            return Ok(());
        }
        for unit in &self.units {
            let result = match (self.desired, unit.status()) {
                (UnitStatus::Ready, UnitStatus::Idle) => unit.stream_init(None),
                (UnitStatus::Ready, UnitStatus::Streaming) => {
                    unit.stream_off();
                    Ok(())
                }
                (UnitStatus::Streaming, UnitStatus::Idle) => {
                    unit.stream_init(None).and_then(|()| unit.stream_on())
                }
                (UnitStatus::Streaming, UnitStatus::Ready) => unit.stream_on(),
                _ => Ok(()),
            };
            if let Err(source) = result {
                let id = unit.id();
                tracing::warn!("{} '{}' failed to reach {:?}: {}", id, unit.name(), self.desired, source);
                self.bus.publish(PipelineEvent::UnitFaulted {
                    unit: id,
                    reason: source.to_string(),
                });
                return Err(ChainError::FaultyUnit { unit: id, source });
            }
        }
        Ok(())
    }

    fn drive_after_change(&mut self) {
        if let Err(e) = self.drive() {
            tracing::warn!("Chain did not reach {:?} after topology change: {}", self.desired, e);
        }
    }

    /// First member below the desired status.
    pub fn faulty_unit(&self) -> Option<UnitId> {
        self.units
            .iter()
            .find(|u| u.status() < self.desired)
            .map(Unit::id)
    }

    /// Return every member to IDLE and make IDLE the desired status.
    pub fn shutdown_all(&mut self) {
        self.desired = UnitStatus::Idle;
        for unit in self.units.iter().rev() {
            unit.stream_shutdown();
        }
    }

    /// Descriptors and wake time the host should wait on.
    pub fn poll_sources(&self) -> PollSources {
        let mut sources = PollSources::default();
        for unit in &self.units {
            if unit.status() != UnitStatus::Streaming {
                continue;
            }
            match unit.event_method() {
                EventMethod::Descriptor => {
                    if let Some(fd) = unit.fileno() {
                        sources.descriptors.push((unit.id(), fd));
                    }
                }
                EventMethod::Timer => {
                    if let Some(t) = unit.next_event_time() {
                        sources.next_wake = Some(sources.next_wake.map_or(t, |w| w.min(t)));
                    }
                }
                EventMethod::None => {}
            }
        }
        sources
    }

    /// Let ready descriptor units and due timer units produce.
    /// Returns how many of them produced.
    pub fn dispatch(&self, ready: &[RawFd], now: i64) -> usize {
        let mut produced = 0;
        for unit in &self.units {
            if unit.status() != UnitStatus::Streaming {
                continue;
            }
            let due = match unit.event_method() {
                EventMethod::Descriptor => unit.fileno().is_some_and(|fd| ready.contains(&fd)),
                EventMethod::Timer => unit.next_event_time().is_some_and(|t| t <= now),
                EventMethod::None => false,
            };
            if due && unit.try_produce_frame() {
                produced += 1;
            }
        }
        produced
    }

    /// Remove every unit, shutting each down.
    pub fn clear(&mut self) {
        self.shutdown_all();
        for unit in std::mem::take(&mut self.units) {
            self.detach_subscribers(&unit);
            unit.link(None, None);
            unit.set_in_chain(false);
            self.bus
                .publish(PipelineEvent::UnitRemoved { unit: unit.id() });
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.clear();
    }
}
