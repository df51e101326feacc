//! Multi-instance coordination against real POSIX shared memory
//!
//! Several coordinators in one test process stand in for several plugin
//! instances in one host process. Each test uses its own lineage key so
//! tests can run in parallel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hdmisupply_capture::{
    shm, Access, CaptureError, ControlBlock, CoordinatorConfig, DisplayMode, InjectedFailure,
    InstanceCoordinator, Role, StreamState, SyntheticProvider,
};
use hdmisupply_convert::{solid_frame, FrameGeometry};

fn config(tag: &str) -> CoordinatorConfig {
    CoordinatorConfig::new(format!("t{}-{}", tag, std::process::id()))
        .with_geometry(FrameGeometry::new(48, 8).expect("geometry"))
        .with_mode(DisplayMode::Hd1080p6000)
}

fn coordinator(config: &CoordinatorConfig, provider: &Arc<SyntheticProvider>) -> InstanceCoordinator {
    InstanceCoordinator::new(config.clone(), provider.clone()).expect("coordinator")
}

#[test]
fn test_single_owner_among_many_instances() {
    let config = config("single");
    let provider = Arc::new(SyntheticProvider::manual());

    let mut instances: Vec<_> = (0..5).map(|_| coordinator(&config, &provider)).collect();
    let handles: Vec<_> = instances
        .iter_mut()
        .map(|c| c.ensure_streaming().expect("streaming"))
        .collect();

    let owners = instances.iter().filter(|c| c.role() == Role::Owner).count();
    assert_eq!(owners, 1);
    assert_eq!(instances[0].role(), Role::Owner);
    assert!(instances[1..].iter().all(|c| c.role() == Role::Joiner));
    assert_eq!(provider.open_count(), 1);
    assert_eq!(provider.start_count(), 1);
    assert!(handles.iter().all(|h| h.is_streaming()));

    // Every instance resolves the same published stream
    let token = handles[0].owner_token();
    assert!(handles.iter().all(|h| h.owner_token() == token));

    let frame = solid_frame(config.geometry, 700, 300, 600);
    assert!(provider.push_frame(&frame));
    for handle in &handles {
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.buffer().snapshot(), frame);
    }

    for instance in instances.iter_mut().rev() {
        instance.release().expect("release");
    }
    assert!(!provider.is_open());
}

#[test]
fn test_joiner_release_is_not_destructive() {
    let config = config("joinrel");
    let provider = Arc::new(SyntheticProvider::manual());

    let mut owner = coordinator(&config, &provider);
    let mut joiner = coordinator(&config, &provider);
    let owner_handle = owner.ensure_streaming().expect("owner");
    joiner.ensure_streaming().expect("joiner");

    joiner.release().expect("joiner release");
    assert_eq!(joiner.role(), Role::Detached);
    assert!(owner_handle.is_streaming());
    assert!(provider.is_streaming());

    // The stream is still published for new instances
    let mut late = coordinator(&config, &provider);
    assert_eq!(late.ensure_streaming().expect("late").role(), Role::Joiner);

    owner.release().expect("owner release");
}

#[test]
fn test_ownership_migrates_after_release() {
    let config = config("migrate");
    let provider = Arc::new(SyntheticProvider::manual());

    let mut a = coordinator(&config, &provider);
    let mut b = coordinator(&config, &provider);
    let mut c = coordinator(&config, &provider);
    let first = a.ensure_streaming().expect("a");
    b.ensure_streaming().expect("b");
    let stale = c.ensure_streaming().expect("c");

    a.release().expect("release");
    assert_eq!(first.state(), StreamState::Stopped);
    assert!(!stale.is_streaming());

    // First to notice takes over
    let migrated = b.ensure_streaming().expect("b takes over");
    assert_eq!(b.role(), Role::Owner);
    assert!(migrated.is_streaming());
    assert_ne!(migrated.owner_token(), first.owner_token());
    assert_eq!(stale.state(), StreamState::Migrating);

    // The loser backs off once, then joins the new stream
    assert!(matches!(c.ensure_streaming(), Err(CaptureError::OwnershipContended)));
    let rejoined = c.ensure_streaming().expect("c rejoins");
    assert_eq!(c.role(), Role::Joiner);
    assert_eq!(rejoined.owner_token(), migrated.owner_token());

    assert_eq!(provider.open_count(), 2);
    let frame = solid_frame(config.geometry, 64, 512, 512);
    assert!(provider.push_frame(&frame));
    assert_eq!(rejoined.buffer().snapshot(), frame);

    b.release().expect("release b");
}

#[test]
fn test_failed_acquisition_unwinds() {
    let config = config("unwind");
    let provider = Arc::new(SyntheticProvider::manual());

    for failure in [
        InjectedFailure::NotFound,
        InjectedFailure::EnableInput,
        InjectedFailure::StartStreams,
    ] {
        let mut instance = coordinator(&config, &provider);
        provider.fail_next(failure);

        let err = instance.ensure_streaming().expect_err("injected failure");
        assert!(err.is_device_failure(), "{failure:?}: {err}");
        assert_eq!(instance.role(), Role::Detached);
        assert!(instance.handle().is_none());
        assert!(!provider.is_open(), "{failure:?} left the device open");

        // Nothing stays published, so the next attempt starts cleanly
        let retry = instance.ensure_streaming().expect("retry");
        assert_eq!(instance.role(), Role::Owner);
        assert!(retry.is_streaming());
        instance.release().expect("release");
    }
}

#[test]
fn test_joiner_waiting_on_failed_owner_takes_over() {
    let config = config("takeover");
    let provider = Arc::new(SyntheticProvider::manual());

    let mut owner = coordinator(&config, &provider);
    let mut joiner = coordinator(&config, &provider);
    owner.ensure_streaming().expect("owner");
    joiner.ensure_streaming().expect("joiner");

    owner.release().expect("release");
    provider.fail_next(InjectedFailure::StartStreams);

    // Joiner wins the claim but cannot start the device
    assert!(joiner.ensure_streaming().is_err());
    assert_eq!(joiner.role(), Role::Detached);

    // Self-heals on the next call
    joiner.ensure_streaming().expect("recovered");
    assert_eq!(joiner.role(), Role::Owner);
    joiner.release().expect("release");
}

#[test]
fn test_owner_stuck_starting_is_replaced() {
    let config = config("stalled").with_start_grace_calls(2);
    let provider = Arc::new(SyntheticProvider::manual());

    // Publish a stream the way an owner that died before opening the device would leave it
    let stale_token = 0xdead_0001;
    let stale_frame = config.frame_segment(stale_token);
    let control: &'static ControlBlock = shm::create_exclusive(&config.control_segment(), 4096)
        .expect("create control")
        .expect("fresh control name")
        .into_ref()
        .expect("control block");
    shm::create_exclusive(&stale_frame, config.geometry.frame_bytes())
        .expect("create frame")
        .expect("fresh frame name");
    control
        .publish(config.geometry, stale_token, &stale_frame)
        .expect("publish");

    let mut joiner = coordinator(&config, &provider);
    let joined = joiner.ensure_streaming().expect("join");
    assert_eq!(joiner.role(), Role::Joiner);
    assert_eq!(joined.state(), StreamState::Starting);

    // Waits out the grace period without touching the device
    for _ in 0..2 {
        assert!(matches!(joiner.ensure_streaming(), Err(CaptureError::OwnershipContended)));
    }
    assert_eq!(provider.open_count(), 0);

    let restarted = joiner.ensure_streaming().expect("takes over");
    assert_eq!(joiner.role(), Role::Owner);
    assert!(restarted.is_streaming());
    assert_ne!(restarted.owner_token(), stale_token);
    assert_eq!(control.state(), StreamState::Migrating);
    assert_eq!(provider.open_count(), 1);

    // The dead owner's frame segment is gone
    let stale = shm::open_existing(&stale_frame, 1, Access::ReadOnly).expect("open");
    assert!(stale.is_none());

    // Later instances join the new stream
    let mut late = coordinator(&config, &provider);
    assert_eq!(late.ensure_streaming().expect("late").owner_token(), restarted.owner_token());

    joiner.release().expect("release");
}

#[test]
fn test_dropped_owner_keeps_device_running() {
    let config = config("leak");
    let provider = Arc::new(SyntheticProvider::manual());

    let mut owner = coordinator(&config, &provider);
    let mut joiner = coordinator(&config, &provider);
    let token = owner.ensure_streaming().expect("owner").owner_token();
    let handle = joiner.ensure_streaming().expect("joiner");

    drop(owner);
    assert!(provider.is_open());
    assert!(handle.is_streaming());

    let frame = solid_frame(config.geometry, 400, 500, 600);
    assert!(provider.push_frame(&frame));
    assert_eq!(handle.buffer().snapshot(), frame);

    shm::unlink(&config.frame_segment(token)).expect("unlink frame");
    shm::unlink(&config.control_segment()).expect("unlink control");
}

#[test]
fn test_geometry_mismatch_is_rejected() {
    let config = config("geom");
    let provider = Arc::new(SyntheticProvider::manual());
    let mut owner = coordinator(&config, &provider);
    owner.ensure_streaming().expect("owner");

    let other = config
        .clone()
        .with_geometry(FrameGeometry::new(96, 8).expect("geometry"));
    let mut mismatched = coordinator(&other, &provider);
    assert!(matches!(
        mismatched.ensure_streaming(),
        Err(CaptureError::InvalidDescriptor(_))
    ));
    assert_eq!(provider.open_count(), 1);

    owner.release().expect("release");
}

#[test]
fn test_pattern_frames_reach_joiners() {
    let config = config("pattern");
    let provider = Arc::new(SyntheticProvider::pattern(502, 480, 560));

    let mut owner = coordinator(&config, &provider);
    let mut joiner = coordinator(&config, &provider);
    owner.ensure_streaming().expect("owner");
    let handle = joiner.ensure_streaming().expect("joiner");

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.generation() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(handle.generation() >= 2);
    assert_eq!(
        handle.buffer().snapshot(),
        solid_frame(config.geometry, 502, 480, 560)
    );

    owner.release().expect("release");
    let settled = handle.generation();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.generation(), settled);
}
