//! Sessions driven the way a host drives them, against real shared memory
//! and a synthetic capture device

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hdmisupply_capture::{InjectedFailure, Role, SyntheticProvider};
use hdmisupply_convert::{
    solid_frame, ycbcr_to_rgb, FrameGeometry, HalfEncoder, HalfPreference, LumaRange, SoftwareHalf,
    YCbCr,
};
use hdmisupply_host::{
    HostInfo, HostPixelFormat, MemorySlots, ProcessOutcome, RecordingNotifier, SkipReason,
    SlotUnavailable, SupplyConfig, SupplyError, SupplySession, OUTPUT_SLOT,
};

const Y: u16 = 502;
const CB: u16 = 480;
const CR: u16 = 560;

fn config(tag: &str) -> SupplyConfig {
    SupplyConfig::builder()
        .lineage_key(format!("e2e-{}-{}", tag, std::process::id()))
        .half_backend(HalfPreference::Software)
        .thread_count(4)
        .build()
}

fn host() -> HostInfo {
    HostInfo::hd1080(23.976, 4)
}

fn slots() -> MemorySlots {
    MemorySlots::new(2, 1920, 1080)
}

fn start(
    tag: &str,
    provider: &Arc<SyntheticProvider>,
    notifier: &Arc<RecordingNotifier>,
) -> SupplySession {
    SupplySession::initialize(config(tag), &host(), provider.clone(), notifier.clone())
        .expect("initialize")
}

fn expected_pixel(range: LumaRange) -> [u16; 3] {
    let px = YCbCr {
        y: f32::from(Y),
        cb: f32::from(CB),
        cr: f32::from(CR),
    };
    let rgb = ycbcr_to_rgb(px, range);
    let mut out = [0u16; 3];
    SoftwareHalf.encode(&rgb, &mut out);
    out
}

fn assert_uniform(slots: &MemorySlots, expected: [u16; 3]) {
    let components = slots.components(OUTPUT_SLOT);
    assert_eq!(components.len(), 1920 * 1080 * 3);
    for (i, pixel) in components.chunks_exact(3).enumerate() {
        assert_eq!(pixel, expected, "pixel {} ({}, {})", i, i % 1920, i / 1920);
    }
}

fn converted(outcome: ProcessOutcome) -> hdmisupply_host::FrameReport {
    match outcome {
        ProcessOutcome::Converted(report) => report,
        ProcessOutcome::Skipped(reason) => panic!("frame skipped: {reason:?}"),
    }
}

#[test]
fn test_solid_color_frame_end_to_end() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("solid", &provider, &notifier);
    assert_eq!(session.role(), Role::Owner);
    assert!(provider.is_streaming());

    assert!(provider.push_frame(&solid_frame(FrameGeometry::HD1080, Y, CB, CR)));

    let mut slots = slots();
    let report = converted(session.process(&host(), &mut slots).expect("process"));
    assert_eq!(report.generation, 1);
    assert!(!report.torn);
    assert_eq!(report.range, LumaRange::Limited);
    assert_eq!(report.role, Role::Owner);

    assert_uniform(&slots, expected_pixel(LumaRange::Limited));
    assert!(slots.components(0).iter().all(|&c| c == 0));
    assert!(notifier.errors().is_empty());

    session.shutdown().expect("shutdown");
    assert!(!provider.is_open());
}

#[test]
fn test_unusable_output_slot_skips_call() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("skip", &provider, &notifier);
    assert!(provider.push_frame(&solid_frame(FrameGeometry::HD1080, Y, CB, CR)));

    let mut slots = slots();
    slots.set_lockable(OUTPUT_SLOT, false);
    assert_eq!(
        session.process(&host(), &mut slots).expect("process"),
        ProcessOutcome::Skipped(SkipReason::OutputUnavailable(SlotUnavailable::NotLocked))
    );

    slots.set_lockable(OUTPUT_SLOT, true);
    slots.set_allocated(OUTPUT_SLOT, false);
    assert_eq!(
        session.process(&host(), &mut slots).expect("process"),
        ProcessOutcome::Skipped(SkipReason::OutputUnavailable(SlotUnavailable::NotAllocated))
    );
    assert!(slots.components(OUTPUT_SLOT).iter().all(|&c| c == 0));

    // Next call tries fresh
    slots.set_allocated(OUTPUT_SLOT, true);
    assert!(session.process(&host(), &mut slots).expect("process").is_converted());
    assert!(notifier.errors().is_empty());

    session.shutdown().expect("shutdown");
}

#[test]
fn test_headroom_toggle_requests_reprocess_and_changes_range() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("headroom", &provider, &notifier);
    assert!(provider.push_frame(&solid_frame(FrameGeometry::HD1080, Y, CB, CR)));

    session.set_headroom(true);
    assert_eq!(notifier.reprocess_requests(), 1);
    assert!(session.headroom().is_enabled());

    let mut slots = slots();
    let report = converted(session.process(&host(), &mut slots).expect("process"));
    assert_eq!(report.range, LumaRange::Full);

    let full = expected_pixel(LumaRange::Full);
    assert_ne!(full, expected_pixel(LumaRange::Limited));
    assert_uniform(&slots, full);

    session.shutdown().expect("shutdown");
}

#[test]
fn test_unsupported_resolution_reported_once() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("res", &provider, &notifier);

    let uhd = HostInfo {
        frame_width: 3840,
        frame_height: 2160,
        ..host()
    };
    let mut slots = slots();
    for _ in 0..3 {
        let err = session.process(&uhd, &mut slots).expect_err("unsupported");
        assert!(matches!(err, SupplyError::UnsupportedResolution { width: 3840, height: 2160 }));
    }
    assert_eq!(
        notifier.errors(),
        vec!["Resolution is 3840x2160, only 1920x1080 can be processed".to_string()]
    );
    assert!(slots.components(OUTPUT_SLOT).iter().all(|&c| c == 0));

    session.shutdown().expect("shutdown");
}

#[test]
fn test_wrong_output_format_is_rejected() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("format", &provider, &notifier);

    let mut slots = slots();
    slots.set_format(OUTPUT_SLOT, HostPixelFormat::Rgb48);
    let err = session.process(&host(), &mut slots).expect_err("format");
    assert!(err.is_unsupported());
    assert_eq!(notifier.errors().len(), 1);

    session.shutdown().expect("shutdown");
}

#[test]
fn test_failed_start_heals_on_next_call() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    provider.fail_next(InjectedFailure::StartStreams);

    let mut session = start("heal", &provider, &notifier);
    assert_eq!(session.role(), Role::Detached);
    assert!(!provider.is_open());
    assert_eq!(notifier.errors().len(), 1);

    let mut slots = slots();
    let report = converted(session.process(&host(), &mut slots).expect("process"));
    assert_eq!(report.role, Role::Owner);
    assert_eq!(report.generation, 0);
    assert!(provider.is_streaming());
    assert_eq!(notifier.errors().len(), 1);

    session.shutdown().expect("shutdown");
}

#[test]
fn test_missing_device_reported_once_until_it_appears() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    provider.fail_always(InjectedFailure::NotFound);

    let mut session = start("missing", &provider, &notifier);
    let mut slots = slots();
    for _ in 0..3 {
        let err = session.process(&host(), &mut slots).expect_err("no device");
        assert!(!err.is_transient());
    }
    assert_eq!(notifier.errors().len(), 1);

    provider.clear_failures();
    assert!(session.process(&host(), &mut slots).expect("process").is_converted());

    session.shutdown().expect("shutdown");
}

#[test]
fn test_second_instance_joins_and_takes_over() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let owner = start("pair", &provider, &notifier);
    let mut joiner = start("pair", &provider, &notifier);
    assert_eq!(owner.role(), Role::Owner);
    assert_eq!(joiner.role(), Role::Joiner);
    assert_eq!(provider.open_count(), 1);

    assert!(provider.push_frame(&solid_frame(FrameGeometry::HD1080, Y, CB, CR)));
    let mut slots = slots();
    let report = converted(joiner.process(&host(), &mut slots).expect("joiner process"));
    assert_eq!(report.role, Role::Joiner);
    assert_uniform(&slots, expected_pixel(LumaRange::Limited));

    // The owner goes away; the joiner restarts the stream on its next call
    owner.shutdown().expect("owner shutdown");
    assert!(!provider.is_open());

    let report = converted(joiner.process(&host(), &mut slots).expect("takeover"));
    assert_eq!(report.role, Role::Owner);
    assert_eq!(provider.open_count(), 2);
    assert!(provider.is_streaming());
    assert!(notifier.errors().is_empty());

    joiner.shutdown().expect("joiner shutdown");
}

#[test]
fn test_frame_rate_reported_to_host() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let config = SupplyConfig {
        telemetry_window_ms: 100,
        ..config("fps")
    };
    let mut session =
        SupplySession::initialize(config, &host(), provider.clone(), notifier.clone()).expect("initialize");

    let mut slots = slots();
    for _ in 0..5 {
        assert!(session.process(&host(), &mut slots).expect("process").is_converted());
        thread::sleep(Duration::from_millis(30));
    }

    let messages = notifier.messages();
    assert!(!messages.is_empty());
    assert!(messages.iter().all(|m| m.starts_with("averaging ") && m.ends_with(" fps")));

    session.shutdown().expect("shutdown");
}

#[test]
fn test_uninitialize_keeps_stream() {
    let provider = Arc::new(SyntheticProvider::manual());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = start("uninit", &provider, &notifier);

    session.uninitialize();
    assert!(provider.is_streaming());
    assert_eq!(session.role(), Role::Owner);

    session.shutdown().expect("shutdown");
    assert!(!provider.is_open());
}
