//! Single-owner stream coordination across plugin instances
//!
//! A host may load several instances of the plugin in one process, but the
//! capture device accepts only one open handle. The first instance in a
//! lineage creates the control segment and becomes the owner: it opens the
//! device and writes frames. Every later instance finds the segment, maps
//! the published frame buffer and reads from it without touching the device.
//!
//! # Ownership rules
//!
//! - Creation of the control segment uses `O_EXCL`, so at most one instance
//!   can become owner of a given name.
//! - Only the owner unlinks segment names, in [`InstanceCoordinator::release`]
//!   or when its own acquisition fails. Names are unlinked before the state
//!   flips to `Stopped`, so nobody can join a block that is going away.
//! - When a joiner sees a stopped stream it claims migration with a
//!   compare-and-set on the old block. Only the winner starts a new stream;
//!   the others rejoin on their next call.
//! - A stream stuck in `Starting` for more than
//!   [`CoordinatorConfig::start_grace_calls`] calls is treated as stopped.
//!   Its creator died mid-acquisition and never withdrew the names, so the
//!   claimer unlinks them before starting over.
//! - Mappings are never unmapped (see [`crate::shm`]). An owner dropped
//!   without `release()` leaves its device running so siblings keep getting
//!   frames.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hdmisupply_convert::FrameGeometry;
use tracing::{debug, error, info, warn};

use crate::buffer::CaptureBuffer;
use crate::control::{ControlBlock, StreamState, MAX_SEGMENT_NAME};
use crate::device::{CaptureDevice, DeviceProvider};
use crate::error::{CaptureError, Result};
use crate::mode::DisplayMode;
use crate::shm::{self, Access};

/// Control segments are one page
const CONTROL_SEGMENT_BYTES: usize = 4096;

/// How long a joiner waits for a creator to finish publishing
const PUBLISH_POLLS: u32 = 100;
const PUBLISH_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Join-or-create rounds before giving up on a contended name
const ACQUIRE_ROUNDS: u32 = 3;

/// About five seconds of host calls at 60 fps
const DEFAULT_START_GRACE_CALLS: u32 = 300;

/// Where and how an instance coordinates
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Scopes which instances share a device; defaults to the process id
    pub lineage_key: String,

    /// First component of every segment name
    pub segment_prefix: String,

    /// Frame size published to joiners
    pub geometry: FrameGeometry,

    /// Input timing mode the owner enables
    pub mode: DisplayMode,

    /// Consecutive calls a joiner waits on a `Starting` stream before
    /// treating its owner as dead
    pub start_grace_calls: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lineage_key: std::process::id().to_string(),
            segment_prefix: "hdmisupply".to_string(),
            geometry: FrameGeometry::HD1080,
            mode: DisplayMode::default(),
            start_grace_calls: DEFAULT_START_GRACE_CALLS,
        }
    }
}

impl CoordinatorConfig {
    /// Configuration for an explicit lineage
    pub fn new(lineage_key: impl Into<String>) -> Self {
        Self {
            lineage_key: lineage_key.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_prefix = prefix.into();
        self
    }

    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_start_grace_calls(mut self, calls: u32) -> Self {
        self.start_grace_calls = calls;
        self
    }

    /// Name of the control segment for this lineage
    pub fn control_segment(&self) -> String {
        format!("/{}-{}", self.segment_prefix, self.lineage_key)
    }

    /// Name of the frame segment published by owner `token`
    pub fn frame_segment(&self, token: u64) -> String {
        format!("/{}-{}-frame-{:x}", self.segment_prefix, self.lineage_key, token)
    }

    /// Validate the configuration
    ///
    /// Returns a list of validation issues, or `Ok(())` if valid.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.lineage_key.is_empty() {
            issues.push("lineage_key cannot be empty".to_string());
        }
        if self.segment_prefix.is_empty() {
            issues.push("segment_prefix cannot be empty".to_string());
        }
        if self.lineage_key.contains('/') || self.segment_prefix.contains('/') {
            issues.push("lineage_key and segment_prefix cannot contain '/'".to_string());
        }

        let longest = self.frame_segment(u64::MAX).len();
        if longest > MAX_SEGMENT_NAME {
            issues.push(format!(
                "segment names would be {longest} bytes, limit is {MAX_SEGMENT_NAME}"
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// This instance's part in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the device and writes frames
    Owner,
    /// Reads frames published by another instance
    Joiner,
    /// Neither; the next `ensure_streaming` call will try again
    Detached,
}

/// Locally resolved view of the shared stream
#[derive(Debug, Clone, Copy)]
pub struct ControlHandle {
    control: &'static ControlBlock,
    buffer: CaptureBuffer,
    role: Role,
}

impl ControlHandle {
    /// Whether frames are still arriving
    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    pub fn state(&self) -> StreamState {
        self.control.state()
    }

    /// Latest-frame buffer to convert from
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Complete frames written so far
    pub fn generation(&self) -> u64 {
        self.control.generation()
    }

    /// Role of the instance that resolved this handle
    pub fn role(&self) -> Role {
        self.role
    }

    /// Token of the owner that published the stream
    pub fn owner_token(&self) -> u64 {
        self.control.owner_token()
    }
}

/// Acquires, joins and releases the shared capture stream for one instance
pub struct InstanceCoordinator {
    config: CoordinatorConfig,
    provider: Arc<dyn DeviceProvider>,
    role: Role,
    handle: Option<ControlHandle>,
    device: Option<Box<dyn CaptureDevice>>,
    frame_segment: Option<String>,
    /// Consecutive calls that found the stream still `Starting`
    starting_calls: u32,
}

impl std::fmt::Debug for InstanceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCoordinator")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .field("role", &self.role)
            .field("handle", &self.handle)
            .field("has_device", &self.device.is_some())
            .finish()
    }
}

impl InstanceCoordinator {
    /// Create a detached coordinator; nothing is opened until the first call
    pub fn new(config: CoordinatorConfig, provider: Arc<dyn DeviceProvider>) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| CaptureError::unsupported(issues.join("; ")))?;

        Ok(Self {
            config,
            provider,
            role: Role::Detached,
            handle: None,
            device: None,
            frame_segment: None,
            starting_calls: 0,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Handle resolved by the last successful call, if any
    pub fn handle(&self) -> Option<ControlHandle> {
        self.handle
    }

    /// Join the lineage's stream, or start it if nobody has
    pub fn acquire_or_join(&mut self) -> Result<ControlHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        let control_name = self.config.control_segment();
        for _ in 0..ACQUIRE_ROUNDS {
            match self.join(&control_name) {
                Ok(Some(handle)) => return Ok(handle),
                Ok(None) => debug!("No stream published at {}", control_name),
                Err(e @ CaptureError::SharedMemory { .. }) => {
                    warn!("Could not join {}: {}; trying to start the stream here", control_name, e);
                }
                Err(e) => return Err(e),
            }

            match self.become_owner(&control_name)? {
                Some(handle) => return Ok(handle),
                None => debug!("Another instance created {} first, joining it", control_name),
            }
        }

        Err(CaptureError::OwnershipContended)
    }

    /// Return a streaming handle, restarting the stream if it has stopped
    ///
    /// Called at the start of every process call, so a stopped owner is
    /// replaced by whichever instance notices first.
    pub fn ensure_streaming(&mut self) -> Result<ControlHandle> {
        let Some(handle) = self.handle else {
            return self.acquire_or_join();
        };
        let state = handle.state();
        if state == StreamState::Streaming {
            self.starting_calls = 0;
            return Ok(handle);
        }

        match self.role {
            Role::Owner => {
                warn!("Streams have stopped ({:?}), restarting", state);
                if let Err(e) = self.release() {
                    warn!("Error releasing stopped stream: {}", e);
                }
            }
            Role::Joiner | Role::Detached => {
                // An owner still acquiring the device will flip to Streaming shortly
                let stalled = state == StreamState::Starting;
                if stalled {
                    self.starting_calls = self.starting_calls.saturating_add(1);
                    if self.starting_calls <= self.config.start_grace_calls {
                        debug!("Owner {:x} still starting", handle.owner_token());
                        return Err(CaptureError::OwnershipContended);
                    }
                    warn!(
                        "Owner {:x} has been starting for {} calls, treating the stream as stopped",
                        handle.owner_token(),
                        self.starting_calls
                    );
                } else {
                    warn!("Streams have stopped ({:?}), restarting", state);
                }

                self.handle = None;
                self.role = Role::Detached;
                self.starting_calls = 0;
                let claimed = if stalled {
                    handle.control.claim_stalled_start()
                } else {
                    handle.control.claim_migration()
                };
                if !claimed {
                    debug!("Another instance claimed the stopped stream");
                    return Err(CaptureError::OwnershipContended);
                }
                if stalled {
                    self.withdraw_stalled(handle.control);
                }
                info!("Claimed stopped stream from owner {:x}", handle.owner_token());
            }
        }

        self.acquire_or_join()
    }

    /// Stop the device and withdraw the published stream (owner only)
    ///
    /// Non-owners only forget their handle: the mappings stay valid and the
    /// segments stay published for the instances still using them.
    pub fn release(&mut self) -> Result<()> {
        if self.role != Role::Owner {
            debug!("Not the stream owner, leaving shared state alone");
            self.handle = None;
            self.role = Role::Detached;
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_streams() {
                warn!("Failed to stop streams on {}: {}", device.name(), e);
                result = Err(e);
            }
            if let Err(e) = device.disable_video_input() {
                warn!("Failed to disable input on {}: {}", device.name(), e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
            info!("Released capture device {}", device.name());
        }

        self.withdraw_segments();
        if let Some(handle) = self.handle.take() {
            handle.control.set_state(StreamState::Stopped);
        }
        self.role = Role::Detached;
        result
    }

    /// Resolve an already published stream
    fn join(&mut self, control_name: &str) -> Result<Option<ControlHandle>> {
        let Some(control) = open_published(control_name)? else {
            return Ok(None);
        };

        let geometry = self.config.geometry;
        control.validate(geometry)?;
        let frame_name = control.frame_segment()?;
        let words = shm::open_existing(&frame_name, geometry.frame_bytes(), Access::ReadOnly)?
            .ok_or_else(|| CaptureError::DescriptorNotReady(frame_name.clone()))?
            .into_slice();

        let handle = ControlHandle {
            control,
            buffer: CaptureBuffer::new(words, geometry, control, false),
            role: Role::Joiner,
        };
        info!(
            "Joined capture stream {} from owner {:x} ({:?})",
            control_name,
            control.owner_token(),
            control.state()
        );

        self.role = Role::Joiner;
        self.handle = Some(handle);
        Ok(Some(handle))
    }

    /// Create and publish a new stream, then acquire the device
    ///
    /// Returns `None` if another instance created the control segment first.
    fn become_owner(&mut self, control_name: &str) -> Result<Option<ControlHandle>> {
        let Some(mapping) = shm::create_exclusive(control_name, CONTROL_SEGMENT_BYTES)? else {
            return Ok(None);
        };
        let control: &'static ControlBlock = match mapping.into_ref() {
            Ok(control) => control,
            Err(e) => {
                discard(control_name);
                return Err(e);
            }
        };

        let geometry = self.config.geometry;
        let token = next_owner_token();
        let frame_name = self.config.frame_segment(token);
        let words = match shm::create_exclusive(&frame_name, geometry.frame_bytes()) {
            Ok(Some(mapping)) => mapping.into_slice(),
            Ok(None) => {
                discard(control_name);
                return Err(CaptureError::invalid_descriptor(format!(
                    "frame segment {frame_name} already exists"
                )));
            }
            Err(e) => {
                discard(control_name);
                return Err(e);
            }
        };

        if let Err(e) = control.publish(geometry, token, &frame_name) {
            discard(&frame_name);
            discard(control_name);
            return Err(e);
        }
        info!("Published capture stream {} as owner {:x}", control_name, token);

        let buffer = CaptureBuffer::new(words, geometry, control, true);
        let device = match self.acquire_device(buffer) {
            Ok(device) => device,
            Err(e) => {
                error!("Capture device acquisition failed: {}", e);
                discard(&frame_name);
                discard(control_name);
                control.set_state(StreamState::Stopped);
                self.role = Role::Detached;
                self.handle = None;
                return Err(e);
            }
        };

        control.set_state(StreamState::Streaming);
        info!(
            "Input started at {} ({:.3} fps)",
            self.config.mode,
            self.config.mode.frame_rate()
        );

        let handle = ControlHandle {
            control,
            buffer,
            role: Role::Owner,
        };
        self.device = Some(device);
        self.frame_segment = Some(frame_name);
        self.role = Role::Owner;
        self.handle = Some(handle);
        Ok(Some(handle))
    }

    /// Open, configure and start the device, unwinding on failure
    fn acquire_device(&self, buffer: CaptureBuffer) -> Result<Box<dyn CaptureDevice>> {
        let mut device = self.provider.open_first()?;
        info!("Opened capture device {} via {}", device.name(), self.provider.name());

        device.enable_video_input(self.config.mode, self.config.geometry)?;

        let started = device
            .set_frame_handler(Arc::new(buffer))
            .and_then(|()| device.start_streams());
        if let Err(e) = started {
            if let Err(disable) = device.disable_video_input() {
                warn!("Failed to disable input while unwinding: {}", disable);
            }
            return Err(e);
        }

        Ok(device)
    }

    /// Unlink the names a dead owner left behind
    ///
    /// The control name is only removed while it still refers to the stalled
    /// owner's block.
    fn withdraw_stalled(&self, control: &ControlBlock) {
        match control.frame_segment() {
            Ok(frame_name) => discard(&frame_name),
            Err(e) => warn!("Stalled stream has no usable frame segment name: {}", e),
        }

        let control_name = self.config.control_segment();
        match shm::open_existing(&control_name, size_of::<ControlBlock>(), Access::ReadOnly) {
            Ok(Some(mapping)) => match mapping.into_ref::<ControlBlock>() {
                Ok(current) if current.owner_token() == control.owner_token() => discard(&control_name),
                Ok(_) => debug!("{} was already republished", control_name),
                Err(e) => warn!("Could not inspect {}: {}", control_name, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Could not inspect {}: {}", control_name, e),
        }
    }

    fn withdraw_segments(&mut self) {
        if let Some(frame_name) = self.frame_segment.take() {
            discard(&frame_name);
        }
        discard(&self.config.control_segment());
    }
}

impl Drop for InstanceCoordinator {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            warn!(
                "Stream owner dropped without release, leaving {} running for other instances",
                device.name()
            );
            std::mem::forget(device);
        }
    }
}

/// Open a control segment and wait for its creator to finish publishing
fn open_published(control_name: &str) -> Result<Option<&'static ControlBlock>> {
    let mut polls = 0;
    let control: &'static ControlBlock = loop {
        match shm::open_existing(control_name, size_of::<ControlBlock>(), Access::ReadWrite) {
            Ok(Some(mapping)) => break mapping.into_ref()?,
            Ok(None) => return Ok(None),
            Err(CaptureError::DescriptorNotReady(_)) if polls < PUBLISH_POLLS => {}
            Err(e) => return Err(e),
        }
        polls += 1;
        thread::sleep(PUBLISH_POLL_INTERVAL);
    };

    while !control.is_published() {
        if polls >= PUBLISH_POLLS {
            return Err(CaptureError::DescriptorNotReady(control_name.to_string()));
        }
        polls += 1;
        thread::sleep(PUBLISH_POLL_INTERVAL);
    }
    Ok(Some(control))
}

/// Unlink a segment name, logging failures
fn discard(name: &str) {
    if let Err(e) = shm::unlink(name) {
        warn!("Failed to unlink {}: {}", name, e);
    }
}

/// Process-unique, non-zero owner token
fn next_owner_token() -> u64 {
    static NEXT: AtomicU32 = AtomicU32::new(1);
    (u64::from(std::process::id()) << 32) | u64::from(NEXT.fetch_add(1, Ordering::Relaxed))
}
