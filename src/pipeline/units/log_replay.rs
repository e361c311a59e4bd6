//! LogReplaySource: timer-driven source playing back a frame log.
//!
//! Reads a file written by [`FrameLogger`](super::FrameLogger) and emits its
//! records with the original spacing between timestamps, scaled by the
//! `speed` control. The output format comes from the first record.

use crate::pipeline::clock::{Clock, SystemClock};
use crate::pipeline::control::{Control, ControlKind, ControlValue, UiHints};
use crate::pipeline::error::UnitResult;
use crate::pipeline::format::{PixelFormat, UnitFormat};
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::unit::{EventMethod, Stage, UnitContext, UnitInfo, UnitStatus};
use crate::pipeline::units::logger::{read_records, LogRecord};
use std::path::Path;

pub const KIND: &str = "input.log";

pub const CONTROL_PATH: &str = "path";
pub const CONTROL_FRAME: &str = "frame";
pub const CONTROL_PAUSED: &str = "paused";
pub const CONTROL_SPEED: &str = "speed";
pub const CONTROL_LOOP: &str = "loop";

/// Re-check interval while paused.
const PAUSED_POLL_US: i64 = 300_000;
/// Re-check interval after the last record.
const END_POLL_US: i64 = 300_000;
/// Gap inserted when playback wraps around.
const LOOP_GAP_US: i64 = 30_000;

pub fn info() -> UnitInfo {
    UnitInfo::new(KIND, "Log Replay", EventMethod::Timer)
}

pub struct LogReplaySource {
    clock: Box<dyn Clock>,
    records: Vec<LogRecord>,
    cursor: usize,
    next_frame_at: Option<i64>,
    paused: bool,
    speed: f64,
    looping: bool,
    /// Emit one frame even while paused (set by seeking).
    step_once: bool,
}

impl Default for LogReplaySource {
    fn default() -> Self {
        Self::new()
    }
}

impl LogReplaySource {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            records: Vec::new(),
            cursor: 0,
            next_frame_at: None,
            paused: false,
            speed: 1.0,
            looping: false,
            step_once: false,
        }
    }

    fn load(&mut self, path: &Path, ctx: &mut UnitContext<'_>) -> Result<(), String> {
        let records = read_records(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let first = records
            .first()
            .ok_or_else(|| format!("{} holds no frames", path.display()))?;
        let largest = records.iter().map(|r| r.payload.len()).max().unwrap_or(0);
        let format = record_format(first, largest)?;
        let last = records.len() as i64 - 1;
        ctx.controls
            .set_kind(CONTROL_FRAME, ControlKind::Int { min: 0, max: last, step: 1 })
            .map_err(|e| e.to_string())?;
        ctx.controls
            .force_set(CONTROL_FRAME, ControlValue::Int(0))
            .map_err(|e| e.to_string())?;
        ctx.formats.clear();
        ctx.formats.add(format);
        tracing::info!("{}: loaded {} frames from {}", ctx.unit, records.len(), path.display());
        self.records = records;
        self.cursor = 0;
        Ok(())
    }

    fn build_frame(record: &LogRecord) -> Option<FrameBuffer> {
        let mut builder = FrameBuffer::builder(record.payload.len());
        builder.data_mut().copy_from_slice(&record.payload);
        let mut builder = builder
            .timestamp(record.timestamp)
            .source_uid(record.source_uid);
        for (key, value) in &record.metadata {
            builder = builder.metadata(key.clone(), value.clone());
        }
        builder.freeze().ok()
    }
}

fn record_format(record: &LogRecord, largest_payload: usize) -> Result<UnitFormat, String> {
    let pixel_format = PixelFormat::from_tag(record.pixel_format)
        .ok_or_else(|| format!("unknown pixel format tag {}", record.pixel_format))?;
    let packed = record.row_stride as usize * record.height as usize;
    UnitFormat::with_layout(
        pixel_format,
        None,
        record.width,
        record.height,
        record.row_stride,
        packed.max(largest_payload),
    )
    .map_err(|e| e.to_string())
}

impl Stage for LogReplaySource {
    fn setup(&mut self, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        ctx.controls
            .add(Control::string(CONTROL_PATH, "Log file", "").with_hints(UiHints::FILE_PATH))?;
        ctx.controls
            .add(Control::int(CONTROL_FRAME, "Frame", 0, 0, 1, 0)?.with_hints(UiHints::SLIDER))?;
        ctx.controls
            .add(Control::boolean(CONTROL_PAUSED, "Paused", self.paused))?;
        ctx.controls.add(
            Control::float(CONTROL_SPEED, "Playback speed", 0.125, 16.0, 0.125, self.speed)?
                .with_hints(UiHints::SPIN),
        )?;
        ctx.controls
            .add(Control::boolean(CONTROL_LOOP, "Loop", self.looping))?;
        Ok(())
    }

    fn on_input_format_changed(&mut self, _input: Option<&UnitFormat>, _ctx: &mut UnitContext<'_>) {}

    fn stream_on(&mut self, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        self.next_frame_at = Some(self.clock.now_micros());
        Ok(())
    }

    fn stream_off(&mut self, _ctx: &mut UnitContext<'_>) {
        self.next_frame_at = None;
    }

    fn try_produce_frame(&mut self, ctx: &mut UnitContext<'_>) -> bool {
        let now = self.clock.now_micros();
        match self.next_frame_at {
            Some(due) if now >= due => {}
            _ => return false,
        }
        if self.paused && !self.step_once {
            self.next_frame_at = Some(now + PAUSED_POLL_US);
            return false;
        }
        if self.cursor >= self.records.len() {
            if self.looping && !self.records.is_empty() {
                self.cursor = 0;
            } else {
                self.next_frame_at = Some(now + END_POLL_US);
                return false;
            }
        }

        let index = self.cursor;
        let record = &self.records[index];
        let Some(frame) = Self::build_frame(record) else {
            tracing::warn!("{}: could not rebuild frame {}", ctx.unit, index);
            self.cursor += 1;
            return false;
        };

        self.cursor += 1;
        let wrapped = self.looping && self.cursor >= self.records.len();
        if wrapped {
            self.cursor = 0;
        }
        let delay = match self.records.get(self.cursor) {
            _ if wrapped => LOOP_GAP_US,
            Some(next) => ((next.timestamp - record.timestamp).max(0) as f64 / self.speed) as i64,
            None => END_POLL_US,
        };
        self.next_frame_at = Some(now + delay);
        self.step_once = false;

        if let Err(e) = ctx.controls.force_set(CONTROL_FRAME, ControlValue::Int(index as i64)) {
            tracing::warn!("{}: {}", ctx.unit, e);
        }
        tracing::trace!("{}: replaying frame {}", ctx.unit, index);
        ctx.emit(frame);
        true
    }

    fn try_set_control(
        &mut self,
        control: &Control,
        proposed: ControlValue,
        ctx: &mut UnitContext<'_>,
    ) -> Result<ControlValue, String> {
        match control.id.as_str() {
            CONTROL_PATH => {
                let path = proposed.as_str().unwrap_or_default().to_string();
                if path.is_empty() {
                    return Err("path must not be empty".into());
                }
                self.load(Path::new(&path), ctx)?;
                if ctx.status != UnitStatus::Idle {
                    ctx.request_restart();
                }
            }
            CONTROL_FRAME => {
                if self.records.is_empty() {
                    return Err("no log loaded".into());
                }
                self.cursor = proposed.as_int().unwrap_or(0).max(0) as usize;
                self.step_once = true;
                if self.next_frame_at.is_some() {
                    self.next_frame_at = Some(self.clock.now_micros());
                }
            }
            CONTROL_PAUSED => {
                self.paused = proposed.as_bool().unwrap_or(false);
                if !self.paused && self.next_frame_at.is_some() {
                    self.next_frame_at = Some(self.clock.now_micros());
                }
            }
            CONTROL_SPEED => self.speed = proposed.as_float().unwrap_or(1.0),
            CONTROL_LOOP => self.looping = proposed.as_bool().unwrap_or(false),
            _ => {}
        }
        Ok(proposed)
    }

    fn next_event_time(&self) -> Option<i64> {
        self.next_frame_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::MockClock;
    use crate::pipeline::units::logger::write_record;
    use crate::pipeline::unit::Unit;
    use std::fs::File;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn write_log(path: &Path, stamps: &[i64]) -> UnitFormat {
        let format = UnitFormat::new(PixelFormat::Gray8, 4, 2).unwrap();
        let mut out = File::create(path).unwrap();
        for (i, &ts) in stamps.iter().enumerate() {
            let frame = FrameBuffer::builder(8)
                .timestamp(ts)
                .source_uid(7)
                .metadata("n", vec![i as u8])
                .freeze()
                .unwrap();
            write_record(&mut out, &frame, &format).unwrap();
        }
        format
    }

    fn replay_at(time: &Arc<AtomicI64>) -> Unit {
        let mut clock = MockClock::new();
        let handle = Arc::clone(time);
        clock
            .expect_now_micros()
            .returning(move || handle.load(Ordering::SeqCst));
        Unit::new(info(), LogReplaySource::with_clock(Box::new(clock))).unwrap()
    }

    #[test]
    fn test_no_log_no_formats() {
        let time = Arc::new(AtomicI64::new(0));
        let unit = replay_at(&time);
        assert!(unit.formats().is_empty());
        assert!(unit.stream_init(None).is_err());
        assert!(unit.set_control_int(CONTROL_FRAME, 1).is_err());
    }

    #[test]
    fn test_load_publishes_recorded_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.fclg");
        let format = write_log(&path, &[0, 100, 200]);

        let time = Arc::new(AtomicI64::new(0));
        let unit = replay_at(&time);
        unit.set_control_string(CONTROL_PATH, path.to_string_lossy()).unwrap();
        assert_eq!(unit.formats(), vec![format]);
        assert!(unit
            .set_control_string(CONTROL_PATH, dir.path().join("missing").to_string_lossy())
            .is_err());
        assert_eq!(unit.formats().len(), 1);
    }

    #[test]
    fn test_replays_with_recorded_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.fclg");
        write_log(&path, &[5_000, 5_400, 6_400]);

        let time = Arc::new(AtomicI64::new(1_000));
        let unit = replay_at(&time);
        unit.set_control_string(CONTROL_PATH, path.to_string_lossy()).unwrap();
        unit.set_control_float(CONTROL_SPEED, 2.0).unwrap();
        unit.stream_init(None).unwrap();
        unit.stream_on().unwrap();

        assert!(unit.try_produce_frame());
        assert_eq!(unit.next_event_time(), Some(1_200));
        assert_eq!(unit.control_value(CONTROL_FRAME), Some(ControlValue::Int(0)));
        assert!(!unit.try_produce_frame());

        time.store(1_200, Ordering::SeqCst);
        assert!(unit.try_produce_frame());
        assert_eq!(unit.next_event_time(), Some(1_700));

        time.store(1_700, Ordering::SeqCst);
        assert!(unit.try_produce_frame());
        time.store(10_000_000, Ordering::SeqCst);
        assert!(!unit.try_produce_frame());
        assert_eq!(unit.frames_emitted(), 3);
    }

    #[test]
    fn test_loop_and_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.fclg");
        write_log(&path, &[0, 10]);

        let time = Arc::new(AtomicI64::new(0));
        let unit = replay_at(&time);
        unit.set_control_string(CONTROL_PATH, path.to_string_lossy()).unwrap();
        unit.set_control_bool(CONTROL_LOOP, true).unwrap();
        unit.stream_init(None).unwrap();
        unit.stream_on().unwrap();

        assert!(unit.try_produce_frame());
        time.store(10, Ordering::SeqCst);
        assert!(unit.try_produce_frame());
        assert_eq!(unit.next_event_time(), Some(10 + LOOP_GAP_US));

        // Seeking while paused shows exactly one frame.
        unit.set_control_bool(CONTROL_PAUSED, true).unwrap();
        unit.set_control_int(CONTROL_FRAME, 0).unwrap();
        assert_eq!(unit.next_event_time(), Some(10));
        assert!(unit.try_produce_frame());
        assert_eq!(unit.control_value(CONTROL_FRAME), Some(ControlValue::Int(0)));
        assert_eq!(unit.frames_emitted(), 3);

        time.store(1_000_000, Ordering::SeqCst);
        assert!(!unit.try_produce_frame());
    }
}
