//! Per-instance plugin session
//!
//! One [`SupplySession`] backs one plugin instance in the host. It owns the
//! instance's coordinator, conversion kernel and worker pool; nothing is
//! held in process globals apart from the shared-memory segments the
//! coordinator publishes.
//!
//! ```text
//! initialize ──► acquire_or_join (errors reported, not fatal)
//!
//! process ──► resolution check
//!         ──► ensure_streaming (self-heals a stopped stream)
//!         ──► lock output slot 1 (skip call if unavailable)
//!         ──► convert latest frame, flipped, into the slot
//!         ──► telemetry
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use hdmisupply_capture::{DeviceProvider, DisplayMode, InstanceCoordinator, Role};
use hdmisupply_convert::{
    ConversionKernel, FrameGeometry, HalfBackend, HalfEncoder, LumaRange, OutputBuffer,
    RayonDistributor, SerialDistributor, WorkDistributor,
};
use tracing::{debug, error, info, warn};

use crate::config::SupplyConfig;
use crate::error::{Result, SupplyError};
use crate::format::{is_output_format_supported, OUTPUT_SLOT};
use crate::headroom::HeadroomToggle;
use crate::host::{HostInfo, HostNotifier, OutputSlots, SlotUnavailable};
use crate::logging::init_logging;
use crate::telemetry::{fps_message, CallTiming, FrameTimer};

/// Result of one process call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    /// A frame was written to the output slot
    Converted(FrameReport),
    /// Nothing was written; the next call tries again
    Skipped(SkipReason),
}

impl ProcessOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted(_))
    }
}

/// Details of a converted frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Capture generation when conversion started
    pub generation: u64,
    /// A new frame landed during conversion, so the output may mix two frames
    pub torn: bool,
    pub range: LumaRange,
    /// Whether this instance owns the device or reads another's stream
    pub role: Role,
    pub timing: CallTiming,
}

/// Why a process call produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The output slot could not be used
    OutputUnavailable(SlotUnavailable),
    /// Another instance is starting or taking over the stream
    StreamContended,
}

/// One plugin instance
pub struct SupplySession {
    config: SupplyConfig,
    geometry: FrameGeometry,
    mode: DisplayMode,
    coordinator: InstanceCoordinator,
    kernel: ConversionKernel,
    distributor: Box<dyn WorkDistributor + Send>,
    headroom: HeadroomToggle,
    notifier: Arc<dyn HostNotifier>,
    timer: FrameTimer,
    last_reported: Option<String>,
}

impl fmt::Debug for SupplySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplySession")
            .field("geometry", &self.geometry)
            .field("mode", &self.mode)
            .field("role", &self.coordinator.role())
            .field("backend", &self.kernel.backend().name())
            .field("workers", &self.distributor.workers())
            .field("headroom", &self.headroom.is_enabled())
            .finish()
    }
}

impl SupplySession {
    /// Initialization entry point
    ///
    /// Unsupported configurations fail here and are reported to the host.
    /// Failing to start or join the capture stream is reported but not
    /// fatal: the first process call tries again.
    pub fn initialize(
        config: SupplyConfig,
        host: &HostInfo,
        provider: Arc<dyn DeviceProvider>,
        notifier: Arc<dyn HostNotifier>,
    ) -> Result<Self> {
        init_logging(config.debug_log);

        let prepared = config
            .check()
            .and_then(|()| check_resolution(host))
            .and_then(|()| Ok((config.geometry()?, HalfBackend::select(config.half_backend)?)));
        let (geometry, backend) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Initialization failed: {}", e);
                notifier.error(&e.to_string());
                return Err(e);
            }
        };

        let mode = DisplayMode::from_frame_rate(host.frame_rate);
        let workers = config.worker_count(host.processor_count);
        let distributor = build_distributor(workers);
        info!(
            "Initializing {} at {} ({} fps host), {} workers, {} half-float",
            geometry,
            mode,
            host.frame_rate,
            workers,
            backend.name()
        );

        let coordinator = InstanceCoordinator::new(config.coordinator_config(mode), provider)?;
        let mut session = Self {
            timer: FrameTimer::new(config.telemetry_window()),
            config,
            geometry,
            mode,
            coordinator,
            kernel: ConversionKernel::new(geometry, backend),
            distributor,
            headroom: HeadroomToggle::default(),
            notifier,
            last_reported: None,
        };

        match session.coordinator.acquire_or_join() {
            Ok(handle) => info!("Capture stream ready as {:?}", handle.role()),
            Err(e) => {
                let e = SupplyError::from(e);
                if e.is_transient() {
                    debug!("Stream not ready yet: {}", e);
                } else {
                    session.report(&e);
                }
            }
        }

        Ok(session)
    }

    /// Per-frame processing entry point
    ///
    /// Writes the most recent captured frame into output slot 1, flipped
    /// vertically. Transient problems return [`ProcessOutcome::Skipped`];
    /// anything else is reported to the host once and returned as an error.
    pub fn process(&mut self, host: &HostInfo, slots: &mut dyn OutputSlots) -> Result<ProcessOutcome> {
        let start = Instant::now();

        if let Err(e) = check_resolution(host) {
            self.report(&e);
            return Err(e);
        }

        let handle = match self.coordinator.ensure_streaming() {
            Ok(handle) => handle,
            Err(e) => {
                let e = SupplyError::from(e);
                if e.is_transient() {
                    debug!("Skipping frame: {}", e);
                    return Ok(ProcessOutcome::Skipped(SkipReason::StreamContended));
                }
                self.report(&e);
                return Err(e);
            }
        };

        let slot = match slots.lock(OUTPUT_SLOT) {
            Ok(slot) => slot,
            Err(reason) => {
                let e = SupplyError::buffer_unavailable(format!("slot {OUTPUT_SLOT} {reason}"));
                debug!("Skipping frame: {}", e);
                return Ok(ProcessOutcome::Skipped(SkipReason::OutputUnavailable(reason)));
            }
        };
        if !is_output_format_supported(slot.format) {
            let e = SupplyError::UnsupportedPixelFormat(slot.format.to_string());
            self.report(&e);
            return Err(e);
        }

        let range = self.headroom.luma_range();
        let generation = handle.generation();
        let converted = OutputBuffer::from_bytes(slot.data, slot.stride_bytes).and_then(|dest| {
            self.kernel
                .convert(handle.buffer(), dest, range, self.distributor.as_ref())
        });
        if let Err(e) = converted {
            let e = SupplyError::from(e);
            self.report(&e);
            return Err(e);
        }
        let end = Instant::now();

        let torn = handle.generation() != generation;
        if torn {
            debug!("Frame {} was overwritten during conversion", generation);
        }

        let timing = self.timer.record(start, end);
        if let Some(fps) = timing.average_fps {
            self.notifier.message(&fps_message(fps));
        }
        self.last_reported = None;

        Ok(ProcessOutcome::Converted(FrameReport {
            generation,
            torn,
            range,
            role: handle.role(),
            timing,
        }))
    }

    /// Uninitialization entry point
    ///
    /// Does nothing: shared state outlives any one instance, and the stream
    /// is only stopped by [`SupplySession::shutdown`].
    pub fn uninitialize(&mut self) {
        debug!("Uninitialize requested, keeping capture state");
    }

    /// Stop the capture stream if this instance owns it
    pub fn shutdown(mut self) -> Result<()> {
        info!("Shutting down {:?} session", self.coordinator.role());
        self.coordinator.release()?;
        Ok(())
    }

    /// Change callback for the "YUV headroom" control
    pub fn set_headroom(&self, enabled: bool) {
        self.headroom.set(enabled, self.notifier.as_ref());
    }

    /// The toggle itself, for a UI to hold on to
    pub fn headroom(&self) -> &HeadroomToggle {
        &self.headroom
    }

    pub fn config(&self) -> &SupplyConfig {
        &self.config
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn role(&self) -> Role {
        self.coordinator.role()
    }

    /// Whether conversion uses the F16C backend
    pub fn is_hardware_half(&self) -> bool {
        self.kernel.backend().is_hardware()
    }

    pub fn worker_count(&self) -> usize {
        self.distributor.workers()
    }

    /// Send an error to the host unless it was the last one sent
    fn report(&mut self, err: &SupplyError) {
        let message = err.to_string();
        if self.last_reported.as_deref() == Some(message.as_str()) {
            debug!("Suppressing repeated error: {}", message);
            return;
        }
        error!("{}", message);
        self.notifier.error(&message);
        self.last_reported = Some(message);
    }
}

fn check_resolution(host: &HostInfo) -> Result<()> {
    if host.frame_width != FrameGeometry::HD1080.width()
        || host.frame_height != FrameGeometry::HD1080.height()
    {
        return Err(SupplyError::UnsupportedResolution {
            width: host.frame_width,
            height: host.frame_height,
        });
    }
    Ok(())
}

fn build_distributor(workers: usize) -> Box<dyn WorkDistributor + Send> {
    match RayonDistributor::new(workers) {
        Ok(pool) => Box::new(pool),
        Err(e) => {
            warn!("Worker pool unavailable ({}), converting on the calling thread", e);
            Box::new(SerialDistributor::new(workers))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingNotifier;
    use hdmisupply_capture::SyntheticProvider;
    use hdmisupply_convert::{cpu_supports_f16c, ConversionError, HalfPreference};

    #[test]
    fn test_check_resolution() {
        assert!(check_resolution(&HostInfo::hd1080(24.0, 4)).is_ok());
        let err = check_resolution(&HostInfo {
            frame_width: 3840,
            frame_height: 2160,
            frame_rate: 24.0,
            processor_count: 4,
        })
        .expect_err("4K");
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_initialize_rejects_resolution_before_touching_device() {
        let provider = Arc::new(SyntheticProvider::manual());
        let notifier = Arc::new(RecordingNotifier::new());
        let host = HostInfo {
            frame_width: 1280,
            frame_height: 720,
            frame_rate: 50.0,
            processor_count: 2,
        };
        let config = SupplyConfig::builder()
            .lineage_key(format!("unit-res-{}", std::process::id()))
            .build();

        let result = SupplySession::initialize(config, &host, provider.clone(), notifier.clone());
        assert!(matches!(result, Err(SupplyError::UnsupportedResolution { .. })));
        assert_eq!(provider.open_count(), 0);
        assert_eq!(
            notifier.errors(),
            vec!["Resolution is 1280x720, only 1920x1080 can be processed".to_string()]
        );
    }

    #[test]
    fn test_hardware_half_request_follows_cpu() {
        let provider = Arc::new(SyntheticProvider::manual());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = SupplyConfig::builder()
            .lineage_key(format!("unit-f16c-{}", std::process::id()))
            .half_backend(HalfPreference::Hardware)
            .build();

        let host = HostInfo::hd1080(24.0, 2);
        match SupplySession::initialize(config, &host, provider.clone(), notifier.clone()) {
            Ok(session) => {
                assert!(cpu_supports_f16c());
                assert!(session.is_hardware_half());
                assert!(notifier.errors().is_empty());
                session.shutdown().expect("shutdown");
            }
            Err(e) => {
                assert!(!cpu_supports_f16c());
                assert!(matches!(e, SupplyError::Conversion(ConversionError::BackendUnavailable(_))));
                assert_eq!(notifier.errors(), vec![e.to_string()]);
                assert_eq!(provider.open_count(), 0);
            }
        }
    }

    #[test]
    fn test_distributor_uses_worker_count() {
        let distributor = build_distributor(3);
        assert_eq!(distributor.workers(), 3);
    }
}
