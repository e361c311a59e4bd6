//! TestPatternSource: timer-driven synthetic frame source.
//!
//! Emits a moving diagonal gradient at a fixed rate. Size and encoding are
//! controls; changing them republishes the output format and restarts the
//! stream.

use crate::pipeline::clock::{Clock, SystemClock};
use crate::pipeline::control::{Control, ControlValue, EnumEntry, UiHints};
use crate::pipeline::error::UnitResult;
use crate::pipeline::format::{PixelFormat, UnitFormat};
use crate::pipeline::frame::FramePool;
use crate::pipeline::unit::{EventMethod, Stage, UnitContext, UnitInfo};

pub const KIND: &str = "input.test_pattern";

pub const CONTROL_FPS: &str = "fps";
pub const CONTROL_WIDTH: &str = "width";
pub const CONTROL_HEIGHT: &str = "height";
pub const CONTROL_PIXEL_FORMAT: &str = "pixel-format";
pub const CONTROL_PAUSED: &str = "paused";

/// Metadata key carrying the little-endian frame counter.
pub const META_FRAME_INDEX: &str = "frame-index";

const FPS_CHOICES: [i64; 4] = [1, 5, 15, 30];
const DEFAULT_FPS: i64 = 30;
const PIXEL_FORMATS: [PixelFormat; 3] = [PixelFormat::Gray8, PixelFormat::Rgb8, PixelFormat::Bgr8];

pub fn info() -> UnitInfo {
    UnitInfo::new(KIND, "Test Pattern", EventMethod::Timer)
}

pub struct TestPatternSource {
    clock: Box<dyn Clock>,
    pool: FramePool,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    interval_us: i64,
    paused: bool,
    next_frame_at: Option<i64>,
    frame_index: u64,
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPatternSource {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            pool: FramePool::default(),
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Gray8,
            interval_us: 1_000_000 / DEFAULT_FPS,
            paused: false,
            next_frame_at: None,
            frame_index: 0,
        }
    }

    fn publish_format(&self, ctx: &mut UnitContext<'_>) -> Result<(), String> {
        let format = UnitFormat::new(self.pixel_format, self.width, self.height)
            .map_err(|e| e.to_string())?;
        ctx.formats.clear();
        ctx.formats.add(format);
        Ok(())
    }

    fn render(&mut self, format: &UnitFormat, now: i64, ctx: &mut UnitContext<'_>) -> bool {
        let stride = format.row_stride as usize;
        let used = stride * format.height as usize;
        let mut builder = self.pool.acquire(format.max_data_size);
        let shift = self.frame_index as usize;
        for (y, row) in builder.data_mut()[..used].chunks_mut(stride).enumerate() {
            for (x, byte) in row.iter_mut().enumerate() {
                *byte = (x + y + shift) as u8;
            }
        }
        let frame = builder
            .bytes_used(used)
            .timestamp(now)
            .source_uid(ctx.unit.as_u64())
            .metadata(META_FRAME_INDEX, self.frame_index.to_le_bytes().to_vec())
            .freeze();
        match frame {
            Ok(frame) => {
                self.frame_index += 1;
                ctx.emit(frame);
                true
            }
            Err(e) => {
                tracing::warn!("{}: could not build frame: {}", ctx.unit, e);
                false
            }
        }
    }
}

impl Stage for TestPatternSource {
    fn setup(&mut self, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        let fps = FPS_CHOICES
            .iter()
            .map(|&v| EnumEntry::new(v, format!("{} fps", v)))
            .collect();
        ctx.controls
            .add(Control::enumeration(CONTROL_FPS, "Frame rate", fps, DEFAULT_FPS)?)?;
        ctx.controls.add(
            Control::int(CONTROL_WIDTH, "Width", 16, 4096, 2, i64::from(self.width))?
                .with_hints(UiHints::SPIN),
        )?;
        ctx.controls.add(
            Control::int(CONTROL_HEIGHT, "Height", 16, 4096, 2, i64::from(self.height))?
                .with_hints(UiHints::SPIN),
        )?;
        let formats = PIXEL_FORMATS
            .iter()
            .enumerate()
            .map(|(i, pf)| EnumEntry::new(i as i64, pf.nickname()))
            .collect();
        ctx.controls
            .add(Control::enumeration(CONTROL_PIXEL_FORMAT, "Pixel format", formats, 0)?)?;
        ctx.controls
            .add(Control::boolean(CONTROL_PAUSED, "Paused", self.paused))?;
        ctx.formats.add(UnitFormat::new(self.pixel_format, self.width, self.height)?);
        Ok(())
    }

    fn on_input_format_changed(&mut self, _input: Option<&UnitFormat>, _ctx: &mut UnitContext<'_>) {
        // Sources ignore upstream.
    }

    fn stream_init(&mut self, format: &UnitFormat, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        self.width = format.width;
        self.height = format.height;
        self.pixel_format = format.pixel_format;
        self.frame_index = 0;
        Ok(())
    }

    fn stream_on(&mut self, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        self.next_frame_at = Some(self.clock.now_micros());
        Ok(())
    }

    fn stream_off(&mut self, _ctx: &mut UnitContext<'_>) {
        self.next_frame_at = None;
    }

    fn try_produce_frame(&mut self, ctx: &mut UnitContext<'_>) -> bool {
        let now = self.clock.now_micros();
        let Some(due) = self.next_frame_at else {
            return false;
        };
        if now < due {
            return false;
        }
        // Skip missed ticks instead of bursting to catch up.
        let mut next = due + self.interval_us;
        if next <= now {
            next = now + self.interval_us;
        }
        self.next_frame_at = Some(next);

        if self.paused {
            return false;
        }
        let Some(format) = ctx.selected_format.cloned() else {
            return false;
        };
        self.render(&format, now, ctx)
    }

    fn try_set_control(
        &mut self,
        control: &Control,
        proposed: ControlValue,
        ctx: &mut UnitContext<'_>,
    ) -> Result<ControlValue, String> {
        match control.id.as_str() {
            CONTROL_FPS => {
                let fps = proposed.as_enum().unwrap_or(DEFAULT_FPS).max(1);
                self.interval_us = 1_000_000 / fps;
                if self.next_frame_at.is_some() {
                    self.next_frame_at = Some(self.clock.now_micros() + self.interval_us);
                }
            }
            CONTROL_WIDTH | CONTROL_HEIGHT | CONTROL_PIXEL_FORMAT => {
                let (width, height, pixel_format) = (self.width, self.height, self.pixel_format);
                match (control.id.as_str(), &proposed) {
                    (CONTROL_WIDTH, ControlValue::Int(v)) => self.width = *v as u32,
                    (CONTROL_HEIGHT, ControlValue::Int(v)) => self.height = *v as u32,
                    (_, ControlValue::Enum(v)) => {
                        self.pixel_format = PIXEL_FORMATS
                            .get(*v as usize)
                            .copied()
                            .ok_or_else(|| format!("unknown pixel format {}", v))?;
                    }
                    _ => return Err("unexpected value".into()),
                }
                if let Err(e) = self.publish_format(ctx) {
                    self.width = width;
                    self.height = height;
                    self.pixel_format = pixel_format;
                    return Err(e);
                }
                ctx.request_restart();
            }
            CONTROL_PAUSED => self.paused = proposed.as_bool().unwrap_or(false),
            _ => {}
        }
        Ok(proposed)
    }

    fn next_event_time(&self) -> Option<i64> {
        self.next_frame_at
    }
}
