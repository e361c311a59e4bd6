//! QueueSource: descriptor-driven source fed from other threads.
//!
//! A [`FrameInjector`] can be moved to any thread (a network client, a
//! capture callback) and pushes finished frames into a bounded hand-off
//! queue. The dispatch thread sees the queue's eventfd become readable and
//! calls `try_produce_frame`, which drains the queue downstream.

use crate::pipeline::error::{UnitError, UnitResult};
use crate::pipeline::format::UnitFormat;
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::handoff::{HandOff, HandOffSender, DEFAULT_HANDOFF_CAPACITY};
use crate::pipeline::unit::{EventMethod, Stage, Unit, UnitContext, UnitInfo};
use std::os::fd::RawFd;

pub const KIND: &str = "input.queue";

pub fn info() -> UnitInfo {
    UnitInfo::new(KIND, "Frame Queue", EventMethod::Descriptor)
}

/// Thread-safe handle for feeding a [`QueueSource`].
#[derive(Clone)]
pub struct FrameInjector {
    sender: HandOffSender<FrameBuffer>,
}

impl FrameInjector {
    /// Queue a frame. Returns `false` if the queue was full and the frame dropped.
    pub fn push(&self, frame: FrameBuffer) -> bool {
        self.sender.push(frame)
    }

    /// Frames dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.sender.dropped()
    }
}

pub struct QueueSource {
    format: UnitFormat,
    queue: HandOff<FrameBuffer>,
}

impl QueueSource {
    /// Source advertising `format`, with room for `capacity` pending frames.
    pub fn new(format: UnitFormat, capacity: usize) -> UnitResult<(Self, FrameInjector)> {
        let queue = HandOff::new(capacity)?;
        let injector = FrameInjector {
            sender: queue.sender(),
        };
        Ok((Self { format, queue }, injector))
    }

    /// Build the source and wrap it in a unit.
    pub fn unit(format: UnitFormat, capacity: usize) -> UnitResult<(Unit, FrameInjector)> {
        let (stage, injector) = Self::new(format, capacity)?;
        Ok((Unit::new(info(), stage)?, injector))
    }

    pub fn with_default_capacity(format: UnitFormat) -> UnitResult<(Unit, FrameInjector)> {
        Self::unit(format, DEFAULT_HANDOFF_CAPACITY)
    }
}

impl Stage for QueueSource {
    fn setup(&mut self, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        ctx.formats.add(self.format.clone());
        Ok(())
    }

    fn on_input_format_changed(&mut self, _input: Option<&UnitFormat>, _ctx: &mut UnitContext<'_>) {}

    fn stream_init(&mut self, format: &UnitFormat, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        if format.max_data_size == 0 {
            return Err(UnitError::resource(ctx.unit, "format has no payload"));
        }
        // Anything queued while idle belongs to an older stream.
        let stale = self.queue.drain().len();
        if stale > 0 {
            tracing::debug!("{}: discarded {} stale frames", ctx.unit, stale);
        }
        Ok(())
    }

    fn try_produce_frame(&mut self, ctx: &mut UnitContext<'_>) -> bool {
        let frames = self.queue.drain();
        let produced = !frames.is_empty();
        for frame in frames {
            ctx.emit(frame);
        }
        produced
    }

    fn fileno(&self) -> Option<RawFd> {
        Some(self.queue.fileno())
    }
}
