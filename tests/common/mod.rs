//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use framechain::pipeline::{PipelineEvent, UnitId};

/// Drain everything currently queued on an event receiver
pub fn drain_events(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    rx.try_iter().collect()
}

/// Count `UnitFaulted` events raised by `unit`
pub fn fault_count(events: &[PipelineEvent], unit: UnitId) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::UnitFaulted { unit: u, .. } if *u == unit))
        .count()
}
