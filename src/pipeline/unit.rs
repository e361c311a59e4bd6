//! Unit abstraction: one processing stage and its streaming state machine.
//!
//! Two layers:
//! - **`Stage` trait**: the stage-specific behaviour (negotiation, frame
//!   production and consumption, control validation).
//! - **`Unit` handle**: owns a stage plus everything the engine tracks
//!   around it: status, advertised formats, controls, links and observers.
//!
//! All calls happen on the dispatch thread. A unit never holds its own
//! borrow while calling into its neighbour: work destined downstream
//! (frames and format notifications) is queued while the stage runs and
//! delivered once the unit is released.

use crate::pipeline::control::{Control, ControlChange, ControlSet, ControlValue};
use crate::pipeline::error::{ControlError, UnitError, UnitResult};
use crate::pipeline::event::{EventBus, PipelineEvent};
use crate::pipeline::format::{FormatPreference, FormatSet, UnitFormat};
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::id::{SubscriberId, UnitId};
use crossbeam_channel::{Receiver, Sender};
use std::cell::RefCell;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

/// Streaming state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitStatus {
    Idle,
    Ready,
    Streaming,
}

/// How the host event loop learns that a unit has work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventMethod {
    /// Driven only by frames arriving from upstream.
    None,
    /// Readable descriptor from [`Stage::fileno`].
    Descriptor,
    /// Wake time from [`Stage::next_event_time`].
    Timer,
}

/// Static description of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    /// Registry id, e.g. `"filter.passthrough"`.
    pub kind: String,
    pub name: String,
    pub event_method: EventMethod,
    /// Whether the unit can draw its frames.
    pub renders: bool,
}

impl UnitInfo {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, event_method: EventMethod) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            event_method,
            renders: false,
        }
    }

    pub fn with_renders(mut self, renders: bool) -> Self {
        self.renders = renders;
        self
    }
}

/// Context passed to every stage hook.
pub struct UnitContext<'a> {
    pub unit: UnitId,
    pub status: UnitStatus,
    /// Active format of the upstream unit, if any.
    pub input_format: Option<&'a UnitFormat>,
    /// Format chosen by the last successful `stream_init`.
    pub selected_format: Option<&'a UnitFormat>,
    /// Formats this unit advertises. Negotiation rewrites them.
    pub formats: &'a mut FormatSet,
    pub controls: &'a mut ControlSet,
    emitted: &'a mut Vec<FrameBuffer>,
    restart: &'a mut bool,
}

impl UnitContext<'_> {
    /// Send a frame downstream once the hook returns.
    pub fn emit(&mut self, frame: FrameBuffer) {
        self.emitted.push(frame);
    }

    /// Ask for shutdown, re-init and (if streaming) stream-on after the hook.
    pub fn request_restart(&mut self) {
        *self.restart = true;
    }
}

/// Stage-specific behaviour of a unit.
pub trait Stage {
    /// Declare controls and initial formats. Called once at construction.
    fn setup(&mut self, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        Ok(())
    }

    /// The upstream active format changed. Recompute `ctx.formats`.
    fn on_input_format_changed(&mut self, input: Option<&UnitFormat>, ctx: &mut UnitContext<'_>);

    /// Allocate per-stream resources for `format`.
    fn stream_init(&mut self, _format: &UnitFormat, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        Ok(())
    }

    fn stream_on(&mut self, _ctx: &mut UnitContext<'_>) -> UnitResult<()> {
        Ok(())
    }

    fn stream_off(&mut self, _ctx: &mut UnitContext<'_>) {}

    /// Release per-stream resources. Background workers must be joined here.
    fn stream_shutdown(&mut self, _ctx: &mut UnitContext<'_>) {}

    /// Produce at most a burst of frames without blocking.
    fn try_produce_frame(&mut self, _ctx: &mut UnitContext<'_>) -> bool {
        false
    }

    fn on_input_frame_ready(
        &mut self,
        _frame: &FrameBuffer,
        _format: &UnitFormat,
        _ctx: &mut UnitContext<'_>,
    ) {
    }

    /// Accept, coerce or reject an already validated value.
    fn try_set_control(
        &mut self,
        _control: &Control,
        proposed: ControlValue,
        _ctx: &mut UnitContext<'_>,
    ) -> Result<ControlValue, String> {
        Ok(proposed)
    }

    fn fileno(&self) -> Option<RawFd> {
        None
    }

    /// Next wake time in microseconds since the Unix epoch.
    fn next_event_time(&self) -> Option<i64> {
        None
    }
}

/// Work queued for the downstream unit.
enum Delivery {
    Frame(FrameBuffer, UnitFormat),
    Notify(Option<UnitFormat>),
}

#[derive(Default)]
struct Scratch {
    emitted: Vec<FrameBuffer>,
    restart: bool,
}

impl Scratch {
    fn discard(&mut self) {
        self.emitted.clear();
        self.restart = false;
    }
}

type CoreRef = Rc<RefCell<UnitCore>>;

struct UnitCore {
    id: UnitId,
    info: UnitInfo,
    status: UnitStatus,
    stage: Box<dyn Stage>,
    formats: FormatSet,
    controls: ControlSet,
    selected: Option<UnitFormat>,
    input_format: Option<UnitFormat>,
    preference: FormatPreference,
    upstream: Option<Weak<RefCell<UnitCore>>>,
    downstream: Option<Weak<RefCell<UnitCore>>>,
    in_chain: bool,
    bus: EventBus,
    scratch: Scratch,
    frames_emitted: u64,
    frames_dropped: u64,
}

impl UnitCore {
    fn with_stage<R>(&mut self, f: impl FnOnce(&mut dyn Stage, &mut UnitContext<'_>) -> R) -> R {
        let UnitCore {
            id,
            status,
            stage,
            formats,
            controls,
            selected,
            input_format,
            scratch,
            ..
        } = self;
        let mut ctx = UnitContext {
            unit: *id,
            status: *status,
            input_format: input_format.as_ref(),
            selected_format: selected.as_ref(),
            formats,
            controls,
            emitted: &mut scratch.emitted,
            restart: &mut scratch.restart,
        };
        f(stage.as_mut(), &mut ctx)
    }

    fn active_format(&self) -> Option<UnitFormat> {
        match self.status {
            UnitStatus::Idle => None,
            _ => self.selected.clone(),
        }
    }

    fn has_upstream(&self) -> bool {
        self.upstream.is_some()
    }

    fn set_status(&mut self, new: UnitStatus) {
        let old = self.status;
        if old != new {
            self.status = new;
            tracing::debug!("{} '{}': {:?} -> {:?}", self.id, self.info.name, old, new);
            self.bus.publish(PipelineEvent::StatusChanged {
                unit: self.id,
                old,
                new,
            });
        }
    }

    fn fault(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("{} '{}' faulted: {}", self.id, self.info.name, reason);
        self.bus.publish(PipelineEvent::UnitFaulted {
            unit: self.id,
            reason,
        });
    }

    /// Turn format and control bookkeeping into events.
    fn publish_pending(&mut self) {
        if self.formats.take_changed() {
            self.bus
                .publish(PipelineEvent::OutputFormatsChanged { unit: self.id });
        }
        for change in self.controls.take_changes() {
            let event = match change {
                ControlChange::Value(control) => {
                    let value = match self.controls.value(&control) {
                        Some(value) => value.clone(),
                        None => continue,
                    };
                    PipelineEvent::ControlChanged {
                        unit: self.id,
                        control,
                        value,
                    }
                }
                ControlChange::Parameters(control) => PipelineEvent::ControlParametersChanged {
                    unit: self.id,
                    control,
                },
            };
            self.bus.publish(event);
        }
    }

    fn init(&mut self, requested: Option<&UnitFormat>) -> UnitResult<()> {
        if self.status != UnitStatus::Idle {
            return Err(UnitError::InvalidTransition {
                unit: self.id,
                from: self.status,
                to: UnitStatus::Ready,
            });
        }
        if self.has_upstream() && self.input_format.is_none() {
            return Err(UnitError::UpstreamNotReady(self.id));
        }
        if self.formats.is_empty() {
            return Err(UnitError::NoFormats(self.id));
        }
        let format = match requested {
            Some(wanted) => self
                .formats
                .iter()
                .find(|f| *f == wanted)
                .cloned()
                .ok_or_else(|| UnitError::FormatNotAdvertised {
                    unit: self.id,
                    format: wanted.name.clone(),
                })?,
            None => self
                .formats
                .best_match(&self.preference)
                .cloned()
                .ok_or(UnitError::NoFormats(self.id))?,
        };

        let result = self.with_stage(|stage, ctx| stage.stream_init(&format, ctx));
        self.scratch.discard();
        self.publish_pending();
        if let Err(e) = result {
            tracing::error!("{} '{}': stream_init failed: {}", self.id, self.info.name, e);
            return Err(e);
        }

        tracing::debug!("{} '{}': selected format {}", self.id, self.info.name, format);
        self.selected = Some(format);
        self.set_status(UnitStatus::Ready);
        Ok(())
    }

    fn on(&mut self) -> UnitResult<()> {
        match self.status {
            UnitStatus::Streaming => return Ok(()),
            UnitStatus::Idle => {
                return Err(UnitError::InvalidTransition {
                    unit: self.id,
                    from: UnitStatus::Idle,
                    to: UnitStatus::Streaming,
                })
            }
            UnitStatus::Ready => {}
        }
        if self.has_upstream() && self.input_format.is_none() {
            return Err(UnitError::UpstreamNotReady(self.id));
        }
        let result = self.with_stage(|stage, ctx| stage.stream_on(ctx));
        self.scratch.discard();
        self.publish_pending();
        if let Err(e) = result {
            tracing::error!("{} '{}': stream_on failed: {}", self.id, self.info.name, e);
            return Err(e);
        }
        self.set_status(UnitStatus::Streaming);
        Ok(())
    }

    fn off(&mut self) {
        if self.status == UnitStatus::Streaming {
            self.with_stage(|stage, ctx| stage.stream_off(ctx));
            self.scratch.discard();
            self.set_status(UnitStatus::Ready);
            self.publish_pending();
        }
    }

    /// Returns whether the unit left READY or STREAMING.
    fn shutdown(&mut self) -> bool {
        if self.status == UnitStatus::Idle {
            return false;
        }
        self.off();
        self.with_stage(|stage, ctx| stage.stream_shutdown(ctx));
        self.scratch.discard();
        self.selected = None;
        self.set_status(UnitStatus::Idle);
        self.publish_pending();
        true
    }

    fn restart(&mut self) {
        let was_streaming = self.status == UnitStatus::Streaming;
        tracing::debug!("{} '{}': restarting stream", self.id, self.info.name);
        self.shutdown();
        if let Err(e) = self.init(None) {
            self.fault(format!("restart failed: {}", e));
            return;
        }
        if was_streaming {
            if let Err(e) = self.on() {
                self.fault(format!("restart failed: {}", e));
            }
        }
    }

    /// Gather what a hook left behind: emitted frames, restart requests and
    /// a selected format that is no longer advertised.
    fn collect(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        let emitted = std::mem::take(&mut self.scratch.emitted);
        match (self.status, &self.selected) {
            (UnitStatus::Streaming, Some(format)) => {
                for frame in emitted {
                    self.frames_emitted += 1;
                    tracing::trace!(
                        "{}: frame ts={} bytes={}",
                        self.id,
                        frame.timestamp(),
                        frame.bytes_used()
                    );
                    self.bus.publish(PipelineEvent::FrameReady {
                        unit: self.id,
                        timestamp: frame.timestamp(),
                        bytes_used: frame.bytes_used(),
                    });
                    out.push(Delivery::Frame(frame, format.clone()));
                }
            }
            _ => self.drop_frames(emitted.len(), "emitted while not streaming"),
        }

        if std::mem::take(&mut self.scratch.restart) && self.status != UnitStatus::Idle {
            self.restart();
            out.push(Delivery::Notify(self.active_format()));
        } else if self.status != UnitStatus::Idle {
            let vanished = match &self.selected {
                Some(format) => !self.formats.contains(format),
                None => true,
            };
            if vanished {
                self.fault("selected format is no longer advertised");
                self.shutdown();
                out.push(Delivery::Notify(None));
            }
        }
        self.publish_pending();
        out
    }

    fn negotiate(&mut self, input: Option<UnitFormat>) -> Vec<Delivery> {
        tracing::debug!(
            "{} '{}': input format -> {}",
            self.id,
            self.info.name,
            input.as_ref().map_or("none".to_string(), |f| f.to_string())
        );
        self.input_format = input.clone();
        self.bus.publish(PipelineEvent::InputFormatChanged {
            unit: self.id,
            format: input.clone(),
        });
        self.with_stage(|stage, ctx| stage.on_input_format_changed(input.as_ref(), ctx));

        // A lost stream stops before anything the hook emitted can leave.
        if let Some(reason) = self.stream_lost() {
            let emitted = std::mem::take(&mut self.scratch.emitted);
            self.drop_frames(emitted.len(), "emitted after the stream was lost");
            self.fault(reason);
            self.shutdown();
        }

        // The single forward below replaces any notification raised here.
        let mut out = self.collect();
        out.retain(|d| matches!(d, Delivery::Frame(..)));
        out.push(Delivery::Notify(self.active_format()));
        out
    }

    /// Why a running unit can no longer stream on its current input.
    fn stream_lost(&self) -> Option<&'static str> {
        if self.status == UnitStatus::Idle {
            return None;
        }
        if self.has_upstream() && self.input_format.is_none() {
            return Some("upstream stopped producing");
        }
        match &self.selected {
            Some(format) if self.formats.contains(format) => None,
            // A requested restart picks a new format instead.
            _ if self.scratch.restart => None,
            _ => Some("selected format is no longer advertised"),
        }
    }

    fn drop_frames(&mut self, count: usize, why: &str) {
        if count > 0 {
            self.frames_dropped += count as u64;
            tracing::trace!("{}: dropping {} frames {}", self.id, count, why);
        }
    }
}

/// Shared handle to a unit.
///
/// Clones refer to the same unit. Units are single-threaded and must only
/// be touched from the dispatch thread.
#[derive(Clone)]
pub struct Unit {
    core: CoreRef,
}

impl Unit {
    /// Wrap `stage` and run its `setup` hook.
    pub fn new(info: UnitInfo, stage: impl Stage + 'static) -> UnitResult<Unit> {
        Self::from_boxed(info, Box::new(stage))
    }

    pub fn from_boxed(info: UnitInfo, stage: Box<dyn Stage>) -> UnitResult<Unit> {
        let mut core = UnitCore {
            id: UnitId::next(),
            info,
            status: UnitStatus::Idle,
            stage,
            formats: FormatSet::new(),
            controls: ControlSet::new(),
            selected: None,
            input_format: None,
            preference: FormatPreference::default(),
            upstream: None,
            downstream: None,
            in_chain: false,
            bus: EventBus::new(),
            scratch: Scratch::default(),
            frames_emitted: 0,
            frames_dropped: 0,
        };
        core.with_stage(|stage, ctx| stage.setup(ctx))?;
        core.scratch.discard();
        core.formats.take_changed();
        core.controls.take_changes();
        tracing::trace!("Created {} '{}' ({})", core.id, core.info.name, core.info.kind);
        Ok(Unit {
            core: Rc::new(RefCell::new(core)),
        })
    }

    fn from_core(core: CoreRef) -> Unit {
        Unit { core }
    }

    pub fn id(&self) -> UnitId {
        self.core.borrow().id
    }

    pub fn info(&self) -> UnitInfo {
        self.core.borrow().info.clone()
    }

    pub fn name(&self) -> String {
        self.core.borrow().info.name.clone()
    }

    pub fn kind(&self) -> String {
        self.core.borrow().info.kind.clone()
    }

    pub fn event_method(&self) -> EventMethod {
        self.core.borrow().info.event_method
    }

    pub fn status(&self) -> UnitStatus {
        self.core.borrow().status
    }

    /// Currently advertised output formats, in order.
    pub fn formats(&self) -> Vec<UnitFormat> {
        self.core.borrow().formats.to_vec()
    }

    pub fn selected_format(&self) -> Option<UnitFormat> {
        self.core.borrow().selected.clone()
    }

    /// Format offered downstream: the selected format while READY or STREAMING.
    pub fn active_format(&self) -> Option<UnitFormat> {
        self.core.borrow().active_format()
    }

    /// Last input format received from upstream.
    pub fn input_format(&self) -> Option<UnitFormat> {
        self.core.borrow().input_format.clone()
    }

    pub fn upstream(&self) -> Option<Unit> {
        let core = self.core.borrow();
        core.upstream.as_ref().and_then(Weak::upgrade).map(Unit::from_core)
    }

    pub fn downstream(&self) -> Option<Unit> {
        let core = self.core.borrow();
        core.downstream.as_ref().and_then(Weak::upgrade).map(Unit::from_core)
    }

    pub fn controls(&self) -> Vec<Control> {
        self.core.borrow().controls.iter().cloned().collect()
    }

    pub fn control(&self, id: &str) -> Option<Control> {
        self.core.borrow().controls.get(id).cloned()
    }

    pub fn control_value(&self, id: &str) -> Option<ControlValue> {
        self.core.borrow().controls.value(id).cloned()
    }

    pub fn preferred_format(&self) -> FormatPreference {
        self.core.borrow().preference.clone()
    }

    /// Bias the automatic format choice of `stream_init(None)`.
    pub fn set_preferred_format(&self, preference: FormatPreference) {
        self.core.borrow_mut().preference = preference;
    }

    /// Frames this unit has sent downstream.
    pub fn frames_emitted(&self) -> u64 {
        self.core.borrow().frames_emitted
    }

    /// Frames discarded because the unit was not streaming.
    pub fn frames_dropped(&self) -> u64 {
        self.core.borrow().frames_dropped
    }

    pub fn fileno(&self) -> Option<RawFd> {
        self.core.borrow().stage.fileno()
    }

    pub fn next_event_time(&self) -> Option<i64> {
        self.core.borrow().stage.next_event_time()
    }

    pub fn ptr_eq(&self, other: &Unit) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// IDLE -> READY with `format`, or the best advertised format if `None`.
    ///
    /// On failure the unit stays IDLE. On success the downstream unit is
    /// told about the new active format.
    pub fn stream_init(&self, format: Option<&UnitFormat>) -> UnitResult<()> {
        let out = {
            let mut core = self.core.borrow_mut();
            core.init(format)?;
            vec![Delivery::Notify(core.active_format())]
        };
        self.flush(out);
        Ok(())
    }

    /// READY -> STREAMING. A no-op when already streaming.
    pub fn stream_on(&self) -> UnitResult<()> {
        self.core.borrow_mut().on()
    }

    /// STREAMING -> READY, keeping stream resources.
    pub fn stream_off(&self) {
        self.core.borrow_mut().off();
    }

    /// Any state -> IDLE. Idempotent.
    pub fn stream_shutdown(&self) {
        let changed = self.core.borrow_mut().shutdown();
        if changed {
            self.flush(vec![Delivery::Notify(None)]);
        }
    }

    /// Give the stage a chance to produce. Returns whether it did.
    pub fn try_produce_frame(&self) -> bool {
        let (produced, out) = {
            let mut core = self.core.borrow_mut();
            if core.status != UnitStatus::Streaming {
                return false;
            }
            let produced = core.with_stage(|stage, ctx| stage.try_produce_frame(ctx));
            (produced, core.collect())
        };
        self.flush(out);
        produced
    }

    /// Consumption entry point for frames from the upstream unit.
    pub fn on_input_frame_ready(&self, frame: FrameBuffer, format: UnitFormat) {
        let out = {
            let mut core = self.core.borrow_mut();
            if core.status != UnitStatus::Streaming {
                core.frames_dropped += 1;
                tracing::trace!("{}: not streaming, dropping frame", core.id);
                return;
            }
            core.with_stage(|stage, ctx| stage.on_input_frame_ready(&frame, &format, ctx));
            core.collect()
        };
        self.flush(out);
    }

    /// Validate `proposed`, let the stage accept or coerce it, and store the
    /// result. The returned value is the one actually applied.
    pub fn set_control(&self, id: &str, proposed: ControlValue) -> Result<ControlValue, ControlError> {
        let (result, out) = {
            let mut core = self.core.borrow_mut();
            let control = core
                .controls
                .get(id)
                .cloned()
                .ok_or_else(|| ControlError::Unknown(id.to_string()))?;
            let validated = control.validate(proposed).map_err(|e| {
                tracing::warn!("{} '{}': {}", core.id, core.info.name, e);
                e
            })?;
            if validated == control.value {
                return Ok(validated);
            }

            let verdict = core.with_stage(|stage, ctx| stage.try_set_control(&control, validated, ctx));
            let result = match verdict {
                Ok(actual) => core.controls.force_set(id, actual.clone()).map(|()| actual),
                Err(reason) => Err(ControlError::Rejected {
                    id: id.to_string(),
                    reason,
                }),
            };
            if let Err(e) = &result {
                tracing::warn!("{} '{}': {}", core.id, core.info.name, e);
                core.scratch.restart = false;
            }
            (result, core.collect())
        };
        self.flush(out);
        result
    }

    pub fn set_control_int(&self, id: &str, value: i64) -> Result<ControlValue, ControlError> {
        self.set_control(id, ControlValue::Int(value))
    }

    pub fn set_control_float(&self, id: &str, value: f64) -> Result<ControlValue, ControlError> {
        self.set_control(id, ControlValue::Float(value))
    }

    pub fn set_control_bool(&self, id: &str, value: bool) -> Result<ControlValue, ControlError> {
        self.set_control(id, ControlValue::Bool(value))
    }

    pub fn set_control_enum(&self, id: &str, value: i64) -> Result<ControlValue, ControlError> {
        self.set_control(id, ControlValue::Enum(value))
    }

    pub fn set_control_string(
        &self,
        id: &str,
        value: impl Into<String>,
    ) -> Result<ControlValue, ControlError> {
        self.set_control(id, ControlValue::String(value.into()))
    }

    /// Subscribe to this unit's events.
    pub fn subscribe(&self, capacity: usize) -> (SubscriberId, Receiver<PipelineEvent>) {
        self.core.borrow_mut().bus.subscribe(capacity)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.core.borrow_mut().bus.detach(id);
    }

    pub(crate) fn attach_subscriber(&self, id: SubscriberId, sender: Sender<PipelineEvent>) {
        self.core.borrow_mut().bus.attach(id, sender);
    }

    pub(crate) fn publish(&self, event: PipelineEvent) {
        self.core.borrow_mut().bus.publish(event);
    }

    pub(crate) fn in_chain(&self) -> bool {
        self.core.borrow().in_chain
    }

    pub(crate) fn set_in_chain(&self, in_chain: bool) {
        self.core.borrow_mut().in_chain = in_chain;
    }

    /// Rewire both links. Does not notify anyone.
    pub(crate) fn link(&self, upstream: Option<&Unit>, downstream: Option<&Unit>) {
        let mut core = self.core.borrow_mut();
        core.upstream = upstream.map(|u| Rc::downgrade(&u.core));
        core.downstream = downstream.map(|u| Rc::downgrade(&u.core));
    }

    pub(crate) fn upstream_is(&self, other: Option<&Unit>) -> bool {
        let core = self.core.borrow();
        match (&core.upstream, other) {
            (None, None) => true,
            (Some(weak), Some(unit)) => Weak::ptr_eq(weak, &Rc::downgrade(&unit.core)),
            _ => false,
        }
    }

    /// Tell this unit its input changed. It renegotiates and forwards
    /// exactly one notification downstream.
    pub(crate) fn notify_input_format_changed(&self, format: Option<UnitFormat>) {
        let out = self.core.borrow_mut().negotiate(format);
        self.flush(out);
    }

    fn flush(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        let Some(next) = self.downstream() else {
            return;
        };
        for delivery in deliveries {
            match delivery {
                Delivery::Frame(frame, format) => next.on_input_frame_ready(frame, format),
                Delivery::Notify(format) => next.notify_input_format_changed(format),
            }
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Unit")
                .field("id", &core.id)
                .field("name", &core.info.name)
                .field("status", &core.status)
                .finish(),
            Err(_) => f.write_str("Unit(<busy>)"),
        }
    }
}
