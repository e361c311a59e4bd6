//! Integration tests for control validation and its side effects

mod common;

use common::drain_events;
use common::mock_helpers::RecordingFilter;
use framechain::pipeline::units::test_pattern::{
    self, CONTROL_FPS, CONTROL_HEIGHT, CONTROL_PAUSED, CONTROL_PIXEL_FORMAT, CONTROL_WIDTH,
};
use framechain::pipeline::{
    Chain, ControlError, ControlValue, PipelineEvent, PixelFormat, Unit, UnitRegistry, UnitStatus,
};
use proptest::prelude::*;

fn pattern() -> Unit {
    UnitRegistry::with_builtin_units()
        .create_unit(test_pattern::KIND)
        .unwrap()
}

fn streaming_chain() -> (Chain, Unit, Unit, common::mock_helpers::StageLog) {
    let mut chain = Chain::new();
    let source = pattern();
    let (sink, log) = RecordingFilter::unit("Sink");
    chain.add_unit(source.clone()).unwrap();
    chain.add_unit(sink.clone()).unwrap();
    chain.set_desired_status(UnitStatus::Streaming).unwrap();
    (chain, source, sink, log)
}

#[test]
fn test_same_value_changes_nothing() {
    let (mut chain, source, sink, log) = streaming_chain();
    let (_, rx) = chain.subscribe(256);
    let selected = source.selected_format();
    log.reset();

    assert_eq!(source.set_control_enum(CONTROL_FPS, 30), Ok(ControlValue::Enum(30)));
    assert_eq!(source.set_control_int(CONTROL_WIDTH, 640), Ok(ControlValue::Int(640)));
    assert_eq!(source.set_control_bool(CONTROL_PAUSED, false), Ok(ControlValue::Bool(false)));

    assert!(drain_events(&rx).is_empty());
    assert_eq!(source.status(), UnitStatus::Streaming);
    assert_eq!(source.selected_format(), selected);
    assert_eq!(log.notification_count(), 0);
    assert!(log.inits().is_empty());
    assert_eq!(sink.status(), UnitStatus::Streaming);
}

#[test]
fn test_value_is_snapped_and_reported() {
    let source = pattern();
    let (_, rx) = source.subscribe(64);
    assert_eq!(source.set_control_int(CONTROL_WIDTH, 333), Ok(ControlValue::Int(334)));
    assert_eq!(source.control_value(CONTROL_WIDTH), Some(ControlValue::Int(334)));

    let changes: Vec<_> = drain_events(&rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::ControlChanged { control, value, .. } => Some((control, value)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(CONTROL_WIDTH.to_string(), ControlValue::Int(334))]);
    // Idle units republish formats without restarting.
    assert_eq!(source.status(), UnitStatus::Idle);
    assert_eq!(source.formats()[0].width, 334);
}

#[test]
fn test_invalid_values_are_rejected_whole() {
    let source = pattern();
    assert!(matches!(
        source.set_control_int(CONTROL_WIDTH, 5_000),
        Err(ControlError::OutOfRange { .. })
    ));
    assert!(matches!(
        source.set_control_bool(CONTROL_WIDTH, true),
        Err(ControlError::TypeMismatch { .. })
    ));
    assert!(matches!(
        source.set_control_enum(CONTROL_FPS, 7),
        Err(ControlError::InvalidEntry { value: 7, .. })
    ));
    assert!(matches!(
        source.set_control_int("gain", 1),
        Err(ControlError::Unknown(_))
    ));
    assert_eq!(source.control_value(CONTROL_WIDTH), Some(ControlValue::Int(640)));
    assert_eq!(source.control_value(CONTROL_FPS), Some(ControlValue::Enum(30)));
    assert_eq!(source.formats()[0].width, 640);
}

#[test]
fn test_resize_breaks_link_until_restarted() {
    let (mut chain, source, sink, log) = streaming_chain();
    log.reset();

    source.set_control_int(CONTROL_HEIGHT, 240).unwrap();
    let resized = source.selected_format().unwrap();
    assert_eq!((resized.width, resized.height), (640, 240));
    assert_eq!(source.status(), UnitStatus::Streaming);

    // The sink's old selection vanished, so it stopped and waits for the caller.
    assert_eq!(log.notifications(), vec![Some(resized.clone())]);
    assert_eq!(sink.status(), UnitStatus::Idle);
    assert_eq!(chain.faulty_unit(), Some(sink.id()));

    chain.set_desired_status(UnitStatus::Streaming).unwrap();
    assert_eq!(sink.status(), UnitStatus::Streaming);
    assert_eq!(sink.selected_format(), Some(resized));
}

#[test]
fn test_pixel_format_switch() {
    let (_chain, source, _sink, _log) = streaming_chain();
    source.set_control_enum(CONTROL_PIXEL_FORMAT, 2).unwrap();
    let selected = source.selected_format().unwrap();
    assert_eq!(selected.pixel_format, PixelFormat::Bgr8);
    assert_eq!(selected.row_stride, 640 * 3);
}

proptest! {
    #[test]
    fn prop_second_set_is_silent(width in 16i64..=4096) {
        let source = pattern();
        source.stream_init(None).unwrap();
        source.stream_on().unwrap();
        let applied = source.set_control_int(CONTROL_WIDTH, width).unwrap();

        let (_, rx) = source.subscribe(64);
        prop_assert_eq!(source.set_control(CONTROL_WIDTH, applied.clone()), Ok(applied));
        prop_assert!(rx.try_recv().is_err());
        prop_assert_eq!(source.status(), UnitStatus::Streaming);
    }
}
