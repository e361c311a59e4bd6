//! PassthroughFilter: forwards every frame unchanged.
//!
//! Its only output format is a copy of its input format, so it is also the
//! reference implementation of downstream negotiation.

use crate::pipeline::format::UnitFormat;
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::unit::{EventMethod, Stage, UnitContext, UnitInfo};

pub const KIND: &str = "filter.passthrough";

pub fn info() -> UnitInfo {
    UnitInfo::new(KIND, "Passthrough", EventMethod::None)
}

#[derive(Debug, Default)]
pub struct PassthroughFilter {
    forwarded: u64,
}

impl PassthroughFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for PassthroughFilter {
    fn on_input_format_changed(&mut self, input: Option<&UnitFormat>, ctx: &mut UnitContext<'_>) {
        ctx.formats.clear();
        if let Some(format) = input {
            ctx.formats.add(format.clone());
        }
    }

    fn on_input_frame_ready(
        &mut self,
        frame: &FrameBuffer,
        _format: &UnitFormat,
        ctx: &mut UnitContext<'_>,
    ) {
        self.forwarded += 1;
        ctx.emit(frame.clone());
    }

    fn stream_shutdown(&mut self, ctx: &mut UnitContext<'_>) {
        tracing::debug!("{}: forwarded {} frames", ctx.unit, self.forwarded);
        self.forwarded = 0;
    }
}
