//! FrameLogger: forwards frames and records them to disk.
//!
//! Writing happens on a background thread fed through a bounded queue, so
//! a slow disk never stalls the dispatch thread: when the queue is full the
//! newest frame is not recorded (it is still forwarded downstream).
//! `stream_shutdown` closes the queue, lets the writer flush what is left
//! and joins it.
//!
//! # Record layout
//!
//! Every record is `FCLG` followed by little-endian fields:
//!
//! ```text
//! timestamp i64 | source_uid u64 | width u32 | height u32 | row_stride u32
//! pixel_format u32 | metadata_count u32 | payload_len u32
//! metadata_count x (key_len u32, key, value_len u32, value)
//! payload
//! ```

use crate::pipeline::control::{Control, ControlValue, UiHints};
use crate::pipeline::error::{UnitError, UnitResult};
use crate::pipeline::format::UnitFormat;
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::unit::{EventMethod, Stage, UnitContext, UnitInfo, UnitStatus};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

pub const KIND: &str = "output.logger";

pub const CONTROL_PATH: &str = "path";
pub const CONTROL_RECORDING: &str = "recording";

pub const RECORD_MAGIC: &[u8; 4] = b"FCLG";
pub const DEFAULT_QUEUE_DEPTH: usize = 32;
const DEFAULT_PATH: &str = "frames.fclg";

pub fn info() -> UnitInfo {
    UnitInfo::new(KIND, "Frame Logger", EventMethod::None)
}

struct Writer {
    queue: Sender<(FrameBuffer, UnitFormat)>,
    handle: JoinHandle<io::Result<u64>>,
}

pub struct FrameLogger {
    queue_depth: usize,
    path: PathBuf,
    recording: bool,
    writer: Option<Writer>,
    dropped: u64,
}

impl Default for FrameLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLogger {
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
            path: PathBuf::from(DEFAULT_PATH),
            recording: true,
            writer: None,
            dropped: 0,
        }
    }

    fn start_writer(&mut self, ctx: &UnitContext<'_>) -> UnitResult<()> {
        let file = File::create(&self.path).map_err(|e| {
            UnitError::resource(ctx.unit, format!("cannot create {}: {}", self.path.display(), e))
        })?;
        let (tx, rx) = bounded(self.queue_depth);
        let handle = std::thread::Builder::new()
            .name(format!("framechain-logger-{}", ctx.unit.0))
            .spawn(move || write_records(rx, BufWriter::new(file)))?;
        tracing::info!("{}: recording to {}", ctx.unit, self.path.display());
        self.writer = Some(Writer { queue: tx, handle });
        Ok(())
    }

    fn stop_writer(&mut self, ctx: &UnitContext<'_>) {
        let Some(Writer { queue, handle }) = self.writer.take() else {
            return;
        };
        drop(queue);
        match handle.join() {
            Ok(Ok(written)) => tracing::info!(
                "{}: wrote {} frames to {} ({} dropped)",
                ctx.unit,
                written,
                self.path.display(),
                self.dropped
            ),
            Ok(Err(e)) => tracing::error!("{}: writing {} failed: {}", ctx.unit, self.path.display(), e),
            Err(_) => tracing::error!("{}: writer thread panicked", ctx.unit),
        }
    }
}

impl Stage for FrameLogger {
    fn setup(&mut self, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        ctx.controls.add(
            Control::string(CONTROL_PATH, "Output file", DEFAULT_PATH).with_hints(UiHints::FILE_PATH),
        )?;
        ctx.controls
            .add(Control::boolean(CONTROL_RECORDING, "Recording", self.recording))?;
        Ok(())
    }

    fn on_input_format_changed(&mut self, input: Option<&UnitFormat>, ctx: &mut UnitContext<'_>) {
        ctx.formats.clear();
        if let Some(format) = input {
            ctx.formats.add(format.clone());
        }
    }

    fn stream_init(&mut self, _format: &UnitFormat, ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        self.dropped = 0;
        if self.recording {
            self.start_writer(ctx)?;
        }
        Ok(())
    }

    fn stream_shutdown(&mut self, ctx: &mut UnitContext<'_>) {
        self.stop_writer(ctx);
    }

    fn on_input_frame_ready(
        &mut self,
        frame: &FrameBuffer,
        format: &UnitFormat,
        ctx: &mut UnitContext<'_>,
    ) {
        let sent = self
            .writer
            .as_ref()
            .map(|writer| writer.queue.try_send((frame.clone(), format.clone())));
        match sent {
            None | Some(Ok(())) => {}
            Some(Err(TrySendError::Full(_))) => {
                self.dropped += 1;
                tracing::warn!("{}: disk too slow, dropping frame ({} so far)", ctx.unit, self.dropped);
            }
            Some(Err(TrySendError::Disconnected(_))) => {
                // The writer died on an I/O error; report it once and stop recording.
                self.stop_writer(ctx);
                self.recording = false;
                if let Err(e) = ctx.controls.force_set(CONTROL_RECORDING, ControlValue::Bool(false)) {
                    tracing::warn!("{}: {}", ctx.unit, e);
                }
                tracing::error!("{}: writer stopped, frames are no longer recorded", ctx.unit);
            }
        }
        ctx.emit(frame.clone());
    }

    fn try_set_control(
        &mut self,
        control: &Control,
        proposed: ControlValue,
        ctx: &mut UnitContext<'_>,
    ) -> Result<ControlValue, String> {
        match control.id.as_str() {
            CONTROL_PATH => {
                let path = proposed.as_str().unwrap_or_default();
                if path.is_empty() {
                    return Err("path must not be empty".into());
                }
                self.path = PathBuf::from(path);
            }
            CONTROL_RECORDING => self.recording = proposed.as_bool().unwrap_or(false),
            _ => return Ok(proposed),
        }
        if ctx.status != UnitStatus::Idle {
            ctx.request_restart();
        }
        Ok(proposed)
    }
}

fn write_records<W: Write>(rx: Receiver<(FrameBuffer, UnitFormat)>, mut out: W) -> io::Result<u64> {
    let mut written = 0;
    for (frame, format) in rx.iter() {
        write_record(&mut out, &frame, &format)?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

fn write_len<W: Write>(out: &mut W, len: usize) -> io::Result<()> {
    let len = u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "field too large"))?;
    out.write_all(&len.to_le_bytes())
}

/// Append one frame record to `out`.
pub fn write_record<W: Write>(out: &mut W, frame: &FrameBuffer, format: &UnitFormat) -> io::Result<()> {
    out.write_all(RECORD_MAGIC)?;
    out.write_all(&frame.timestamp().to_le_bytes())?;
    out.write_all(&frame.source_uid().to_le_bytes())?;
    out.write_all(&format.width.to_le_bytes())?;
    out.write_all(&format.height.to_le_bytes())?;
    out.write_all(&format.row_stride.to_le_bytes())?;
    out.write_all(&format.pixel_format.tag().to_le_bytes())?;
    write_len(out, frame.metadata().len())?;
    write_len(out, frame.bytes_used())?;
    for (key, value) in frame.metadata() {
        write_len(out, key.len())?;
        out.write_all(key.as_bytes())?;
        write_len(out, value.len())?;
        out.write_all(value)?;
    }
    out.write_all(frame.data())
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: i64,
    pub source_uid: u64,
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub pixel_format: u32,
    pub metadata: Vec<(String, Vec<u8>)>,
    pub payload: Vec<u8>,
}

fn read_array<const N: usize, R: Read>(input: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    read_array::<4, _>(input).map(u32::from_le_bytes)
}

fn read_bytes<R: Read>(input: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len as usize];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_record<R: Read>(input: &mut R) -> io::Result<Option<LogRecord>> {
    let mut magic = [0u8; 4];
    match input.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    if &magic != RECORD_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad record magic"));
    }
    let timestamp = i64::from_le_bytes(read_array(input)?);
    let source_uid = u64::from_le_bytes(read_array(input)?);
    let width = read_u32(input)?;
    let height = read_u32(input)?;
    let row_stride = read_u32(input)?;
    let pixel_format = read_u32(input)?;
    let metadata_count = read_u32(input)?;
    let payload_len = read_u32(input)?;
    let mut metadata = Vec::with_capacity(metadata_count as usize);
    for _ in 0..metadata_count {
        let key_len = read_u32(input)?;
        let key = String::from_utf8(read_bytes(input, key_len)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let value_len = read_u32(input)?;
        metadata.push((key, read_bytes(input, value_len)?));
    }
    let payload = read_bytes(input, payload_len)?;
    Ok(Some(LogRecord {
        timestamp,
        source_uid,
        width,
        height,
        row_stride,
        pixel_format,
        metadata,
        payload,
    }))
}

/// Read every record of a log file.
pub fn read_records(path: impl AsRef<Path>) -> io::Result<Vec<LogRecord>> {
    let mut input = io::BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    while let Some(record) = read_record(&mut input)? {
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::PipelineEvent;
    use crate::pipeline::format::PixelFormat;
    use crate::pipeline::unit::Unit;

    fn logger_at(path: &Path) -> Unit {
        let unit = Unit::new(info(), FrameLogger::new()).unwrap();
        unit.set_control_string(CONTROL_PATH, path.to_string_lossy()).unwrap();
        unit
    }

    #[test]
    fn test_record_layout() {
        let frame = FrameBuffer::builder(4)
            .timestamp(-3)
            .source_uid(9)
            .metadata("k", vec![1u8, 2])
            .freeze()
            .unwrap();
        let format = UnitFormat::new(PixelFormat::Gray8, 2, 2).unwrap();
        let mut out = Vec::new();
        write_record(&mut out, &frame, &format).unwrap();
        assert_eq!(&out[..4], RECORD_MAGIC);
        assert_eq!(out.len(), 4 + 8 + 8 + 6 * 4 + (4 + 1 + 4 + 2) + 4);

        let record = read_record(&mut out.as_slice()).unwrap().unwrap();
        assert_eq!(record.timestamp, -3);
        assert_eq!(record.source_uid, 9);
        assert_eq!(record.metadata, vec![("k".to_string(), vec![1, 2])]);
        assert_eq!(record.payload, vec![0; 4]);
    }

    #[test]
    fn test_logs_and_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fclg");
        let unit = logger_at(&path);
        let format = UnitFormat::new(PixelFormat::Gray8, 4, 4).unwrap();
        unit.notify_input_format_changed(Some(format.clone()));
        unit.stream_init(None).unwrap();
        unit.stream_on().unwrap();

        for ts in 0..3 {
            unit.on_input_frame_ready(FrameBuffer::from_vec(vec![ts as u8; 16], ts), format.clone());
        }
        assert_eq!(unit.frames_emitted(), 3);
        unit.stream_shutdown();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].timestamp, 2);
        assert_eq!(records[2].payload, vec![2; 16]);
        assert_eq!(records[0].width, 4);
    }

    #[test]
    fn test_not_recording_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.fclg");
        let unit = logger_at(&path);
        unit.set_control_bool(CONTROL_RECORDING, false).unwrap();
        unit.notify_input_format_changed(Some(UnitFormat::new(PixelFormat::Gray8, 2, 2).unwrap()));
        unit.stream_init(None).unwrap();
        unit.stream_shutdown();
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_path_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.fclg");
        let unit = logger_at(&path);
        unit.notify_input_format_changed(Some(UnitFormat::new(PixelFormat::Gray8, 2, 2).unwrap()));
        assert!(matches!(unit.stream_init(None), Err(UnitError::Resource { .. })));
        assert_eq!(unit.status(), UnitStatus::Idle);
    }

    #[test]
    fn test_write_failure_turns_recording_off() {
        let unit = logger_at(Path::new("/dev/full"));
        let format = UnitFormat::new(PixelFormat::Gray8, 128, 128).unwrap();
        unit.notify_input_format_changed(Some(format.clone()));
        unit.stream_init(None).unwrap();
        unit.stream_on().unwrap();
        let (_, rx) = unit.subscribe(64);

        let mut sent = 0;
        while unit.control_value(CONTROL_RECORDING) == Some(ControlValue::Bool(true)) && sent < 200 {
            let frame = FrameBuffer::from_vec(vec![0; format.frame_size()], sent);
            unit.on_input_frame_ready(frame, format.clone());
            sent += 1;
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(unit.control_value(CONTROL_RECORDING), Some(ControlValue::Bool(false)));
        assert_eq!(unit.status(), UnitStatus::Streaming);
        assert_eq!(unit.frames_emitted(), sent as u64);

        unit.on_input_frame_ready(FrameBuffer::from_vec(vec![0; 16], sent), format.clone());
        let turned_off = rx
            .try_iter()
            .filter(|e| {
                matches!(e, PipelineEvent::ControlChanged { control, .. } if control == CONTROL_RECORDING)
            })
            .count();
        assert_eq!(turned_off, 1);
        unit.stream_shutdown();
    }

    #[test]
    fn test_empty_path_rejected() {
        let unit = Unit::new(info(), FrameLogger::new()).unwrap();
        assert!(unit.set_control_string(CONTROL_PATH, "").is_err());
    }
}
