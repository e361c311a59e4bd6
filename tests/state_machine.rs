//! Integration tests for the unit state machine and chain status driving

mod common;

use common::builders::{gray_vga, FormatBuilder, TestChain};
use common::mock_helpers::{FixedSource, RecordingFilter};
use common::{drain_events, fault_count};
use framechain::pipeline::{
    Chain, ChainError, EventMethod, FrameBuffer, PixelFormat, Stage, Unit, UnitContext,
    UnitError, UnitFormat, UnitInfo, UnitStatus,
};
use proptest::prelude::*;

fn two_format_source() -> Unit {
    FixedSource::unit(
        "A",
        vec![
            gray_vga(),
            FormatBuilder::new().pixel_format(PixelFormat::Rgb8).size(320, 240).build(),
        ],
    )
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Init,
    On,
    Off,
    Shutdown,
    Produce,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Init),
        Just(Op::On),
        Just(Op::Off),
        Just(Op::Shutdown),
        Just(Op::Produce),
    ]
}

fn apply(unit: &Unit, op: Op) {
    match op {
        Op::Init => {
            let _ = unit.stream_init(None);
        }
        Op::On => {
            let _ = unit.stream_on();
        }
        Op::Off => unit.stream_off(),
        Op::Shutdown => unit.stream_shutdown(),
        Op::Produce => {
            unit.try_produce_frame();
        }
    }
}

#[test]
fn test_unadvertised_format_fails_and_stays_idle() {
    let unit = two_format_source();
    unit.stream_init(Some(&gray_vga())).unwrap();
    unit.stream_on().unwrap();
    assert!(unit.try_produce_frame());
    unit.stream_shutdown();

    let f3 = FormatBuilder::new().pixel_format(PixelFormat::Yuyv).size(800, 600).build();
    let err = unit.stream_init(Some(&f3)).unwrap_err();
    assert!(matches!(err, UnitError::FormatNotAdvertised { .. }));
    assert_eq!(unit.status(), UnitStatus::Idle);
    assert!(unit.selected_format().is_none());
}

#[test]
fn test_init_while_streaming_is_refused() {
    let unit = two_format_source();
    unit.stream_init(None).unwrap();
    unit.stream_on().unwrap();
    let err = unit.stream_init(Some(&gray_vga())).unwrap_err();
    assert!(matches!(
        err,
        UnitError::InvalidTransition {
            from: UnitStatus::Streaming,
            ..
        }
    ));
    assert_eq!(unit.status(), UnitStatus::Streaming);
}

#[test]
fn test_off_keeps_selection_for_resume() {
    let unit = two_format_source();
    let rgb = FormatBuilder::new().pixel_format(PixelFormat::Rgb8).size(320, 240).build();
    unit.stream_init(Some(&rgb)).unwrap();
    unit.stream_on().unwrap();
    unit.stream_off();
    assert_eq!(unit.status(), UnitStatus::Ready);
    assert!(!unit.try_produce_frame());
    unit.stream_on().unwrap();
    assert_eq!(unit.selected_format(), Some(rgb));
    assert!(unit.try_produce_frame());
}

#[test]
fn test_filter_needs_ready_upstream() {
    let mut t = TestChain::new(vec![gray_vga()], 1);
    let err = t.filter(0).stream_init(None).unwrap_err();
    assert!(matches!(err, UnitError::UpstreamNotReady(_)));

    t.source.stream_init(None).unwrap();
    t.filter(0).stream_init(None).unwrap();
    assert_eq!(t.filter(0).selected_format(), Some(gray_vga()));
    t.chain.shutdown_all();
}

#[test]
fn test_lone_filter_has_no_formats() {
    let (filter, _) = RecordingFilter::unit("Lonely");
    assert!(matches!(filter.stream_init(None), Err(UnitError::NoFormats(_))));
}

#[test]
fn test_upstream_stop_is_immediate() {
    let mut t = TestChain::new(vec![gray_vga()], 1);
    t.chain.set_desired_status(UnitStatus::Streaming).unwrap();
    let filter = t.filter(0).clone();

    t.source.stream_shutdown();
    assert_eq!(filter.status(), UnitStatus::Idle);

    // Nothing is drained after the stop; late frames are discarded.
    filter.on_input_frame_ready(FrameBuffer::from_vec(vec![0; 16], 1), gray_vga());
    assert_eq!(filter.frames_dropped(), 1);
    assert_eq!(filter.frames_emitted(), 0);
    assert_eq!(t.log(0).frame_count(), 0);
}

/// Filter that holds the latest frame and releases it when its input goes away.
#[derive(Default)]
struct HoldLast {
    held: Option<FrameBuffer>,
}

impl Stage for HoldLast {
    fn on_input_format_changed(&mut self, input: Option<&UnitFormat>, ctx: &mut UnitContext<'_>) {
        ctx.formats.clear();
        match input {
            Some(format) => ctx.formats.add(format.clone()),
            None => {
                if let Some(frame) = self.held.take() {
                    ctx.emit(frame);
                }
            }
        }
    }

    fn on_input_frame_ready(
        &mut self,
        frame: &FrameBuffer,
        _format: &UnitFormat,
        _ctx: &mut UnitContext<'_>,
    ) {
        self.held = Some(frame.clone());
    }
}

#[test]
fn test_held_frames_are_not_flushed_on_stop() {
    let mut chain = Chain::new();
    let source = FixedSource::unit("A", vec![gray_vga()]);
    let holder = Unit::new(
        UnitInfo::new("test.hold_last", "Hold", EventMethod::None),
        HoldLast::default(),
    )
    .unwrap();
    let (sink, sink_log) = RecordingFilter::unit("Sink");
    for unit in [&source, &holder, &sink] {
        chain.add_unit(unit.clone()).unwrap();
    }
    chain.set_desired_status(UnitStatus::Streaming).unwrap();
    let (_, rx) = chain.subscribe(256);

    assert!(source.try_produce_frame());
    assert_eq!(sink_log.frame_count(), 0);

    source.stream_shutdown();
    assert_eq!(holder.status(), UnitStatus::Idle);
    assert_eq!(holder.frames_dropped(), 1);
    assert_eq!(holder.frames_emitted(), 0);
    assert_eq!(sink_log.frame_count(), 0);
    assert_eq!(sink.status(), UnitStatus::Idle);
    assert_eq!(fault_count(&drain_events(&rx), holder.id()), 1);
}

#[test]
fn test_faulty_unit_halts_and_chain_tears_down() {
    let mut chain = Chain::new();
    let a = FixedSource::unit("A", vec![gray_vga()]);
    let b = RecordingFilter::new(Default::default())
        .failing_init()
        .into_unit("B");
    let (c, c_log) = RecordingFilter::unit("C");
    for unit in [&a, &b, &c] {
        chain.add_unit(unit.clone()).unwrap();
    }
    let (_, rx) = chain.subscribe(256);

    let err = chain.set_desired_status(UnitStatus::Streaming).unwrap_err();
    match err {
        ChainError::FaultyUnit { unit, source } => {
            assert_eq!(unit, b.id());
            assert!(matches!(source, UnitError::Resource { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(a.status(), UnitStatus::Streaming);
    assert_eq!(b.status(), UnitStatus::Idle);
    assert_eq!(c.status(), UnitStatus::Idle);
    assert!(c_log.inits().is_empty());
    assert_eq!(chain.faulty_unit(), Some(b.id()));
    assert_eq!(fault_count(&drain_events(&rx), b.id()), 1);

    chain.shutdown_all();
    assert!(chain.units().iter().all(|u| u.status() == UnitStatus::Idle));
    assert_eq!(chain.desired_status(), UnitStatus::Idle);
    assert_eq!(chain.faulty_unit(), None);
}

#[test]
fn test_desired_status_steps() {
    let mut t = TestChain::new(vec![gray_vga()], 2);
    t.chain.set_desired_status(UnitStatus::Ready).unwrap();
    assert!(t.chain.units().iter().all(|u| u.status() == UnitStatus::Ready));

    t.chain.set_desired_status(UnitStatus::Streaming).unwrap();
    assert!(t.chain.units().iter().all(|u| u.status() == UnitStatus::Streaming));

    t.chain.set_desired_status(UnitStatus::Ready).unwrap();
    assert!(t.chain.units().iter().all(|u| u.status() == UnitStatus::Ready));
    // Pausing keeps stream resources, so nobody was re-initialised.
    assert_eq!(t.log(1).inits().len(), 1);

    t.chain.set_desired_status(UnitStatus::Idle).unwrap();
    assert!(t.chain.units().iter().all(|u| u.status() == UnitStatus::Idle));
    assert_eq!(t.chain.faulty_unit(), None);
}

#[test]
fn test_idle_teardown_raises_no_faults() {
    let mut t = TestChain::new(vec![gray_vga()], 3);
    t.chain.set_desired_status(UnitStatus::Streaming).unwrap();
    let (_, rx) = t.chain.subscribe(256);
    t.chain.set_desired_status(UnitStatus::Idle).unwrap();
    let events = drain_events(&rx);
    for (unit, _) in &t.filters {
        assert_eq!(fault_count(&events, unit.id()), 0);
    }
}

proptest! {
    #[test]
    fn prop_shutdown_always_reaches_idle(
        ops in proptest::collection::vec(op_strategy(), 0..12),
        repeats in 1usize..4,
    ) {
        let unit = two_format_source();
        for op in ops {
            apply(&unit, op);
        }
        for _ in 0..repeats {
            unit.stream_shutdown();
            prop_assert_eq!(unit.status(), UnitStatus::Idle);
            prop_assert!(unit.active_format().is_none());
            prop_assert!(unit.selected_format().is_none());
        }
    }
}
