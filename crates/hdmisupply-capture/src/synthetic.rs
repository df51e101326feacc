//! Synthetic capture device
//!
//! Stands in for real capture hardware in tests and demos. It behaves like
//! a single physical device: only one handle can be open at a time, and a
//! leaked handle keeps streaming.
//!
//! Two feeds are available. [`SyntheticProvider::pattern`] spawns a thread
//! that delivers a solid-colour v210 frame every frame interval.
//! [`SyntheticProvider::manual`] delivers nothing on its own; frames are
//! pushed with [`SyntheticProvider::push_frame`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hdmisupply_convert::{solid_frame, FrameGeometry};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::device::{CaptureDevice, DeviceProvider, FrameHandler};
use crate::error::{CaptureError, Result};
use crate::mode::DisplayMode;

/// Acquisition step to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// `open_first` reports no device
    NotFound,
    /// `enable_video_input` rejects the mode
    EnableInput,
    /// `start_streams` fails
    StartStreams,
}

/// Frame source of a synthetic device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Solid colour at the mode's frame interval, from code values
    Pattern { y: u16, cb: u16, cr: u16 },
    /// Only frames passed to `push_frame`
    Manual,
}

#[derive(Debug, Clone, Copy)]
struct Injection {
    failure: InjectedFailure,
    persistent: bool,
}

struct DeviceState {
    feed: Feed,
    injection: Mutex<Option<Injection>>,
    open: AtomicBool,
    opened: AtomicUsize,
    started: AtomicUsize,
    delivered: AtomicU64,
    active: Mutex<Option<Arc<dyn FrameHandler>>>,
}

impl DeviceState {
    fn should_fail(&self, step: InjectedFailure) -> bool {
        let mut injection = self.injection.lock();
        match *injection {
            Some(i) if i.failure == step => {
                if !i.persistent {
                    *injection = None;
                }
                true
            }
            _ => false,
        }
    }
}

/// Provider for one shared synthetic device
#[derive(Clone)]
pub struct SyntheticProvider {
    state: Arc<DeviceState>,
}

impl std::fmt::Debug for SyntheticProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticProvider")
            .field("feed", &self.state.feed)
            .field("open", &self.is_open())
            .field("opened", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl SyntheticProvider {
    /// Device that generates a solid colour on its own thread
    pub fn pattern(y: u16, cb: u16, cr: u16) -> Self {
        Self::with_feed(Feed::Pattern { y, cb, cr })
    }

    /// Device that only delivers pushed frames
    pub fn manual() -> Self {
        Self::with_feed(Feed::Manual)
    }

    pub fn with_feed(feed: Feed) -> Self {
        Self {
            state: Arc::new(DeviceState {
                feed,
                injection: Mutex::new(None),
                open: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
                delivered: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    /// Fail the next attempt at `step`
    pub fn fail_next(&self, step: InjectedFailure) {
        *self.state.injection.lock() = Some(Injection {
            failure: step,
            persistent: false,
        });
    }

    /// Fail every attempt at `step` until cleared
    pub fn fail_always(&self, step: InjectedFailure) {
        *self.state.injection.lock() = Some(Injection {
            failure: step,
            persistent: true,
        });
    }

    pub fn clear_failures(&self) {
        *self.state.injection.lock() = None;
    }

    /// Handles opened so far
    pub fn open_count(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Successful `start_streams` calls so far
    pub fn start_count(&self) -> usize {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Whether a handle is currently open
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Whether a started stream is delivering frames
    pub fn is_streaming(&self) -> bool {
        self.state.active.lock().is_some()
    }

    /// Frames handed to a frame handler so far
    pub fn frames_delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::SeqCst)
    }

    /// Deliver `frame` to the streaming device's handler
    ///
    /// Runs the handler on the calling thread. Returns `false` when no
    /// stream is running.
    pub fn push_frame(&self, frame: &[u8]) -> bool {
        let handler = self.state.active.lock().clone();
        match handler {
            Some(handler) => {
                handler.on_frame_arrived(frame);
                self.state.delivered.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl DeviceProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_first(&self) -> Result<Box<dyn CaptureDevice>> {
        if self.state.should_fail(InjectedFailure::NotFound) {
            return Err(CaptureError::DeviceNotFound("no synthetic device (injected)".to_string()));
        }
        if self
            .state
            .open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CaptureError::DeviceNotFound(
                "synthetic device is already open".to_string(),
            ));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened synthetic device");
        Ok(Box::new(SyntheticDevice {
            state: Arc::clone(&self.state),
            input: None,
            handler: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

/// One open handle on the synthetic device
pub struct SyntheticDevice {
    state: Arc<DeviceState>,
    input: Option<(DisplayMode, FrameGeometry)>,
    handler: Option<Arc<dyn FrameHandler>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticDevice {
    fn spawn_pattern(&mut self, handler: Arc<dyn FrameHandler>, y: u16, cb: u16, cr: u16) -> Result<()> {
        let Some((mode, geometry)) = self.input else {
            return Err(CaptureError::StartStreams("video input not enabled".to_string()));
        };

        let frame = solid_frame(geometry, y, cb, cr);
        let interval = mode.frame_interval();
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        running.store(true, Ordering::SeqCst);

        let worker = thread::Builder::new()
            .name("hdmisupply-synthetic".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    handler.on_frame_arrived(&frame);
                    state.delivered.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(interval);
                }
            })
            .map_err(|e| CaptureError::StartStreams(format!("failed to spawn pattern thread: {e}")))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Synthetic pattern thread panicked");
            }
        }
        *self.state.active.lock() = None;
    }
}

impl CaptureDevice for SyntheticDevice {
    fn name(&self) -> &str {
        "Synthetic v210 source"
    }

    fn enable_video_input(&mut self, mode: DisplayMode, geometry: FrameGeometry) -> Result<()> {
        if self.state.should_fail(InjectedFailure::EnableInput) {
            return Err(CaptureError::EnableInput(format!("{mode} rejected (injected)")));
        }
        self.input = Some((mode, geometry));
        Ok(())
    }

    fn set_frame_handler(&mut self, handler: Arc<dyn FrameHandler>) -> Result<()> {
        self.handler = Some(handler);
        Ok(())
    }

    fn start_streams(&mut self) -> Result<()> {
        if self.state.should_fail(InjectedFailure::StartStreams) {
            return Err(CaptureError::StartStreams("stream refused to start (injected)".to_string()));
        }
        let Some(handler) = self.handler.clone() else {
            return Err(CaptureError::StartStreams("no frame handler registered".to_string()));
        };
        if self.input.is_none() {
            return Err(CaptureError::StartStreams("video input not enabled".to_string()));
        }

        if let Feed::Pattern { y, cb, cr } = self.state.feed {
            self.spawn_pattern(Arc::clone(&handler), y, cb, cr)?;
        }
        *self.state.active.lock() = Some(handler);
        self.state.started.fetch_add(1, Ordering::SeqCst);
        info!("Synthetic streams started ({:?})", self.state.feed);
        Ok(())
    }

    fn stop_streams(&mut self) -> Result<()> {
        self.halt();
        debug!("Synthetic streams stopped");
        Ok(())
    }

    fn disable_video_input(&mut self) -> Result<()> {
        self.input = None;
        Ok(())
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.halt();
        self.state.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Counter {
        frames: AtomicUsize,
        last_len: AtomicUsize,
    }

    impl FrameHandler for Counter {
        fn on_frame_arrived(&self, frame: &[u8]) {
            self.last_len.store(frame.len(), Ordering::SeqCst);
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn small() -> FrameGeometry {
        FrameGeometry::new(12, 2).expect("geometry")
    }

    #[test]
    fn test_single_open_handle() {
        let provider = SyntheticProvider::manual();
        let device = provider.open_first().expect("first open");
        assert!(provider.open_first().is_err());
        drop(device);
        assert!(!provider.is_open());
        assert!(provider.open_first().is_ok());
        assert_eq!(provider.open_count(), 2);
    }

    #[test]
    fn test_manual_push() {
        let provider = SyntheticProvider::manual();
        let counter = Arc::new(Counter::default());
        assert!(!provider.push_frame(&[0; 4]));

        let mut device = provider.open_first().expect("open");
        device.enable_video_input(DisplayMode::Hd1080p30, small()).expect("enable");
        device.set_frame_handler(counter.clone()).expect("handler");
        device.start_streams().expect("start");

        assert!(provider.push_frame(&[1; 256]));
        assert_eq!(counter.frames.load(Ordering::SeqCst), 1);
        assert_eq!(counter.last_len.load(Ordering::SeqCst), 256);

        device.stop_streams().expect("stop");
        assert!(!provider.push_frame(&[1; 256]));
    }

    #[test]
    fn test_pattern_thread_delivers_frames() {
        let provider = SyntheticProvider::pattern(64, 512, 512);
        let counter = Arc::new(Counter::default());

        let mut device = provider.open_first().expect("open");
        device.enable_video_input(DisplayMode::Hd1080p6000, small()).expect("enable");
        device.set_frame_handler(counter.clone()).expect("handler");
        device.start_streams().expect("start");

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.frames.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        device.stop_streams().expect("stop");

        assert!(counter.frames.load(Ordering::SeqCst) >= 3);
        assert_eq!(counter.last_len.load(Ordering::SeqCst), small().frame_bytes());

        // Nothing arrives after stop_streams returns
        let after_stop = counter.frames.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(counter.frames.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_injected_failures() {
        let provider = SyntheticProvider::manual();

        provider.fail_next(InjectedFailure::NotFound);
        assert!(matches!(provider.open_first(), Err(CaptureError::DeviceNotFound(_))));
        // One-shot
        let mut device = provider.open_first().expect("open");

        provider.fail_always(InjectedFailure::EnableInput);
        for _ in 0..2 {
            assert!(matches!(
                device.enable_video_input(DisplayMode::default(), small()),
                Err(CaptureError::EnableInput(_))
            ));
        }
        provider.clear_failures();
        device.enable_video_input(DisplayMode::default(), small()).expect("enable");

        provider.fail_next(InjectedFailure::StartStreams);
        device.set_frame_handler(Arc::new(Counter::default())).expect("handler");
        assert!(matches!(device.start_streams(), Err(CaptureError::StartStreams(_))));
        assert_eq!(provider.start_count(), 0);
        device.start_streams().expect("second start");
        assert_eq!(provider.start_count(), 1);
    }

    #[test]
    fn test_start_requires_setup() {
        let provider = SyntheticProvider::manual();
        let mut device = provider.open_first().expect("open");
        assert!(device.start_streams().is_err());
        device.set_frame_handler(Arc::new(Counter::default())).expect("handler");
        assert!(device.start_streams().is_err());
    }
}
