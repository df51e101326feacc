//! Capture device abstraction
//!
//! Mirrors the shape of a hardware capture SDK: enable an input at a timing
//! mode, register a callback, start streams. The device invokes the
//! callback on its own thread once per frame interval.

use std::sync::Arc;

use hdmisupply_convert::FrameGeometry;

use crate::error::Result;
use crate::mode::DisplayMode;

/// Receives packed frames from the device's notification thread
///
/// Implementations must not block for longer than one frame interval and
/// must not panic: the device has no way to report a failed callback.
pub trait FrameHandler: Send + Sync {
    /// Called with the full packed payload of each new frame
    fn on_frame_arrived(&self, frame: &[u8]);
}

/// One opened capture device
pub trait CaptureDevice: Send {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Configure the input for `mode` at `geometry`
    fn enable_video_input(&mut self, mode: DisplayMode, geometry: FrameGeometry) -> Result<()>;

    /// Register the handler that receives every frame
    fn set_frame_handler(&mut self, handler: Arc<dyn FrameHandler>) -> Result<()>;

    /// Begin delivering frames to the handler
    fn start_streams(&mut self) -> Result<()>;

    /// Stop delivering frames; the handler is not called after this returns
    fn stop_streams(&mut self) -> Result<()>;

    /// Release the input configuration
    fn disable_video_input(&mut self) -> Result<()>;
}

/// Discovers and opens capture devices
pub trait DeviceProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Open the first available device
    fn open_first(&self) -> Result<Box<dyn CaptureDevice>>;
}
