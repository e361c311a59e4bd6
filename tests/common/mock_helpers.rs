//! Stage doubles that record what the engine asks of them

use framechain::pipeline::{
    EventMethod, FrameBuffer, Stage, Unit, UnitContext, UnitError, UnitFormat, UnitInfo,
    UnitResult,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct LogInner {
    notifications: Vec<Option<UnitFormat>>,
    frames: Vec<FrameBuffer>,
    inits: Vec<UnitFormat>,
    shutdowns: usize,
}

/// Shared view of what a [`RecordingFilter`] saw
#[derive(Debug, Clone, Default)]
pub struct StageLog {
    inner: Rc<RefCell<LogInner>>,
}

impl StageLog {
    /// Input formats received through `on_input_format_changed`, in order.
    pub fn notifications(&self) -> Vec<Option<UnitFormat>> {
        self.inner.borrow().notifications.clone()
    }

    pub fn notification_count(&self) -> usize {
        self.inner.borrow().notifications.len()
    }

    pub fn last_notification(&self) -> Option<Option<UnitFormat>> {
        self.inner.borrow().notifications.last().cloned()
    }

    /// Frames received, still referenced by the log.
    pub fn frames(&self) -> Vec<FrameBuffer> {
        self.inner.borrow().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn inits(&self) -> Vec<UnitFormat> {
        self.inner.borrow().inits.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.borrow().shutdowns
    }

    /// Forget everything, releasing held frames.
    pub fn reset(&self) {
        *self.inner.borrow_mut() = LogInner::default();
    }
}

/// Filter that mirrors its input format and records every call
pub struct RecordingFilter {
    log: StageLog,
    output: Option<UnitFormat>,
    fail_init: bool,
    keep_frames: bool,
}

impl RecordingFilter {
    pub fn new(log: StageLog) -> Self {
        Self {
            log,
            output: None,
            fail_init: false,
            keep_frames: true,
        }
    }

    /// Advertise `format` whenever an input is present instead of mirroring.
    pub fn with_output(mut self, format: UnitFormat) -> Self {
        self.output = Some(format);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Forward frames without holding on to them.
    pub fn without_frame_log(mut self) -> Self {
        self.keep_frames = false;
        self
    }

    pub fn info(name: &str) -> UnitInfo {
        UnitInfo::new("test.recording", name, EventMethod::None)
    }

    /// Mirroring recording filter wrapped in a unit.
    pub fn unit(name: &str) -> (Unit, StageLog) {
        let log = StageLog::default();
        let unit = Unit::new(Self::info(name), RecordingFilter::new(log.clone()))
            .expect("recording filter setup cannot fail");
        (unit, log)
    }

    pub fn into_unit(self, name: &str) -> Unit {
        Unit::new(Self::info(name), self).expect("recording filter setup cannot fail")
    }
}

impl Stage for RecordingFilter {
    fn on_input_format_changed(&mut self, input: Option<&UnitFormat>, ctx: &mut UnitContext<'_>) {
        self.log.inner.borrow_mut().notifications.push(input.cloned());
        ctx.formats.clear();
        if let Some(input) = input {
            ctx.formats.add(self.output.clone().unwrap_or_else(|| input.clone()));
        }
    }

    fn stream_init(&mut self, format: &UnitFormat, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        if self.fail_init {
            return Err(UnitError::resource(ctx.unit, "refusing to initialise"));
        }
        self.log.inner.borrow_mut().inits.push(format.clone());
        Ok(())
    }

    fn stream_shutdown(&mut self, _ctx: &mut UnitContext<'_>) {
        self.log.inner.borrow_mut().shutdowns += 1;
    }

    fn on_input_frame_ready(&mut self, frame: &FrameBuffer, _format: &UnitFormat, ctx: &mut UnitContext<'_>) {
        if self.keep_frames {
            self.log.inner.borrow_mut().frames.push(frame.clone());
        }
        ctx.emit(frame.clone());
    }
}

/// Timer source offering a fixed list of formats, always due
pub struct FixedSource {
    formats: Vec<UnitFormat>,
    next_timestamp: i64,
}

impl FixedSource {
    pub const FIRST_TIMESTAMP: i64 = 1_000;

    pub fn new(formats: Vec<UnitFormat>) -> Self {
        Self {
            formats,
            next_timestamp: Self::FIRST_TIMESTAMP,
        }
    }

    pub fn unit(name: &str, formats: Vec<UnitFormat>) -> Unit {
        Unit::new(
            UnitInfo::new("test.fixed_source", name, EventMethod::Timer),
            FixedSource::new(formats),
        )
        .expect("fixed source setup cannot fail")
    }
}

impl Stage for FixedSource {
    fn setup(&mut self, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        for format in &self.formats {
            ctx.formats.add(format.clone());
        }
        Ok(())
    }

    fn on_input_format_changed(&mut self, _input: Option<&UnitFormat>, _ctx: &mut UnitContext<'_>) {}

    fn try_produce_frame(&mut self, ctx: &mut UnitContext<'_>) -> bool {
        let Some(format) = ctx.selected_format else {
            return false;
        };
        let frame = FrameBuffer::from_vec(vec![0x5a; format.frame_size()], self.next_timestamp);
        self.next_timestamp += 1_000;
        ctx.emit(frame);
        true
    }

    fn next_event_time(&self) -> Option<i64> {
        Some(0)
    }
}
