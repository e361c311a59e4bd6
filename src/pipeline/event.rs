//! Observer notifications for units and chains.
//!
//! Delivery is synchronous on the dispatch thread: events are pushed into
//! bounded channels with `try_send`, so a slow observer loses events
//! instead of stalling the pipeline.

use crate::pipeline::control::ControlValue;
use crate::pipeline::format::UnitFormat;
use crate::pipeline::id::{SubscriberId, UnitId};
use crate::pipeline::unit::UnitStatus;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Default capacity of a subscriber's channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A unit joined a chain at `index`.
    UnitAdded { unit: UnitId, index: usize },
    UnitRemoved { unit: UnitId },
    UnitReordered {
        unit: UnitId,
        from: usize,
        to: usize,
    },
    StatusChanged {
        unit: UnitId,
        old: UnitStatus,
        new: UnitStatus,
    },
    /// The unit's advertised format set was rewritten.
    OutputFormatsChanged { unit: UnitId },
    InputFormatChanged {
        unit: UnitId,
        format: Option<UnitFormat>,
    },
    ControlChanged {
        unit: UnitId,
        control: String,
        value: ControlValue,
    },
    /// Bounds, entries or enabled state of a control changed.
    ControlParametersChanged { unit: UnitId, control: String },
    FrameReady {
        unit: UnitId,
        timestamp: i64,
        bytes_used: usize,
    },
    /// A unit dropped out of its expected state and needs attention.
    UnitFaulted { unit: UnitId, reason: String },
}

/// Fan-out list of subscriber channels.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriberId, Sender<PipelineEvent>)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription.
    pub fn subscribe(&mut self, capacity: usize) -> (SubscriberId, Receiver<PipelineEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let id = SubscriberId::next();
        self.subscribers.push((id, tx));
        (id, rx)
    }

    /// Register an existing sender under `id`.
    pub fn attach(&mut self, id: SubscriberId, sender: Sender<PipelineEvent>) {
        if !self.subscribers.iter().any(|(s, _)| *s == id) {
            self.subscribers.push((id, sender));
        }
    }

    pub fn detach(&mut self, id: SubscriberId) -> Option<Sender<PipelineEvent>> {
        let pos = self.subscribers.iter().position(|(s, _)| *s == id)?;
        Some(self.subscribers.remove(pos).1)
    }

    pub fn senders(&self) -> impl Iterator<Item = (SubscriberId, &Sender<PipelineEvent>)> {
        self.subscribers.iter().map(|(id, tx)| (*id, tx))
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&mut self, event: PipelineEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event queue of {:?} is full, dropping {:?}", id, event);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Subscriber {:?} went away", id);
                false
            }
        });
    }
}
