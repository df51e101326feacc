//! Error types for capture and coordination
//!
//! Device errors come from acquisition (open, enable, start). Shared-memory
//! errors come from publishing or resolving the control descriptor. Neither
//! kind ever escapes the hardware notification thread: frame copy failures
//! are logged there and dropped.

use thiserror::Error;

/// Errors that can occur while acquiring, joining or releasing a capture stream
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No capture device could be opened
    ///
    /// Either no hardware is present or the device is already held by
    /// another instance outside this lineage.
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// Device refused the requested input timing mode
    #[error("Failed to enable video input: {0}")]
    EnableInput(String),

    /// Device accepted the input mode but would not start streaming
    #[error("Failed to start capture streams: {0}")]
    StartStreams(String),

    /// Device failed while stopping or disabling
    #[error("Failed to stop capture device: {0}")]
    StopDevice(String),

    /// A shared-memory call failed
    #[error("Shared memory {context} failed: {source}")]
    SharedMemory {
        context: String,
        #[source]
        source: nix::Error,
    },

    /// Published descriptor exists but is not fully written yet
    #[error("Control descriptor {0} is still being published")]
    DescriptorNotReady(String),

    /// Published descriptor is corrupt or from an incompatible build
    #[error("Invalid control descriptor: {0}")]
    InvalidDescriptor(String),

    /// Another instance is starting or migrating the stream
    #[error("Stream ownership is held by another instance")]
    OwnershipContended,

    /// Requested capture configuration is not supported
    #[error("Unsupported capture configuration: {0}")]
    Unsupported(String),

    /// Frame geometry could not be built
    #[error("Invalid frame geometry: {0}")]
    Geometry(#[from] hdmisupply_convert::ConversionError),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Wrap a shared-memory error with what was being attempted
    pub(crate) fn shared_memory(context: impl Into<String>, source: nix::Error) -> Self {
        Self::SharedMemory {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid descriptor error
    pub(crate) fn invalid_descriptor(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Create an unsupported configuration error
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether this came from opening or starting the device
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_) | Self::EnableInput(_) | Self::StartStreams(_) | Self::StopDevice(_)
        )
    }

    /// Whether retrying on a later call may succeed without intervention
    ///
    /// Another instance holding or publishing the stream resolves itself
    /// within a frame or two.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OwnershipContended | Self::DescriptorNotReady(_))
    }
}
