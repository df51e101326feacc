//! Session configuration
//!
//! Struct literal, builder, or environment:
//!
//! ```
//! # use hdmisupply_host::SupplyConfig;
//! # use hdmisupply_convert::HalfPreference;
//! let config = SupplyConfig::builder()
//!     .half_backend(HalfPreference::Software)
//!     .thread_count(4)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use hdmisupply_capture::{CoordinatorConfig, DisplayMode};
use hdmisupply_convert::{FrameGeometry, HalfPreference};

use crate::error::{Result, SupplyError};
use crate::logging::DEBUG_ENV;

/// Configuration for a [`crate::SupplySession`]
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyConfig {
    /// Frame width; only 1920 is supported
    pub frame_width: u32,

    /// Frame height; only 1080 is supported
    pub frame_height: u32,

    /// Coordination scope; `None` uses the process id
    pub lineage_key: Option<String>,

    /// Prefix for shared-memory segment names
    pub segment_prefix: String,

    /// Half-float backend selection
    pub half_backend: HalfPreference,

    /// Conversion worker count; `None` uses the host's processor count
    pub thread_count: Option<usize>,

    /// Interval between frame-rate reports to the host
    pub telemetry_window_ms: u64,

    /// Log at debug level
    pub debug_log: bool,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            lineage_key: None,
            segment_prefix: "hdmisupply".to_string(),
            half_backend: HalfPreference::Auto,
            thread_count: None,
            telemetry_window_ms: 2000,
            debug_log: false,
        }
    }
}

impl SupplyConfig {
    /// Create a new builder
    pub fn builder() -> SupplyConfigBuilder {
        SupplyConfigBuilder::default()
    }

    /// Defaults with environment overrides applied
    ///
    /// `HDMISUPPLY_DEBUG` (any value) turns on debug logging.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(mut self) -> Self {
        if std::env::var_os(DEBUG_ENV).is_some() {
            self.debug_log = true;
        }
        self
    }

    /// Validate the configuration
    ///
    /// Returns a list of validation issues, or `Ok(())` if valid.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.frame_width != 1920 || self.frame_height != 1080 {
            issues.push(format!(
                "frame size must be 1920x1080, got {}x{}",
                self.frame_width, self.frame_height
            ));
        }

        if self.thread_count == Some(0) {
            issues.push("thread_count must be at least 1".to_string());
        }

        if self.telemetry_window_ms < 100 {
            issues.push("telemetry_window_ms should be at least 100ms".to_string());
        }

        if let Err(coordinator_issues) = self.coordinator_config(DisplayMode::default()).validate() {
            issues.extend(coordinator_issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Frame geometry for the configured size
    pub fn geometry(&self) -> Result<FrameGeometry> {
        Ok(FrameGeometry::new(self.frame_width, self.frame_height)?)
    }

    /// Coordinator settings for a host running at `mode`
    pub fn coordinator_config(&self, mode: DisplayMode) -> CoordinatorConfig {
        let mut config = match &self.lineage_key {
            Some(key) => CoordinatorConfig::new(key.clone()),
            None => CoordinatorConfig::default(),
        }
        .with_segment_prefix(self.segment_prefix.clone())
        .with_mode(mode);

        if let Ok(geometry) = FrameGeometry::new(self.frame_width, self.frame_height) {
            config = config.with_geometry(geometry);
        }
        config
    }

    /// Conversion workers to run given the host's processor count
    pub fn worker_count(&self, host_processors: usize) -> usize {
        self.thread_count.unwrap_or(host_processors).max(1)
    }

    pub fn telemetry_window(&self) -> Duration {
        Duration::from_millis(self.telemetry_window_ms)
    }

    /// Validate, turning issues into one error
    pub(crate) fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|issues| SupplyError::invalid_config(issues.join("; ")))
    }
}

/// Builder for [`SupplyConfig`]
#[derive(Debug, Clone, Default)]
pub struct SupplyConfigBuilder {
    lineage_key: Option<String>,
    segment_prefix: Option<String>,
    half_backend: Option<HalfPreference>,
    thread_count: Option<usize>,
    telemetry_window_ms: Option<u64>,
    debug_log: Option<bool>,
}

impl SupplyConfigBuilder {
    /// Coordinate with other instances under `key`
    pub fn lineage_key(mut self, key: impl Into<String>) -> Self {
        self.lineage_key = Some(key.into());
        self
    }

    pub fn segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_prefix = Some(prefix.into());
        self
    }

    pub fn half_backend(mut self, preference: HalfPreference) -> Self {
        self.half_backend = Some(preference);
        self
    }

    /// Override the host's processor count
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    pub fn telemetry_window_ms(mut self, window: u64) -> Self {
        self.telemetry_window_ms = Some(window);
        self
    }

    pub fn debug_log(mut self, enable: bool) -> Self {
        self.debug_log = Some(enable);
        self
    }

    /// Build the configuration
    pub fn build(self) -> SupplyConfig {
        let default = SupplyConfig::default();
        SupplyConfig {
            frame_width: default.frame_width,
            frame_height: default.frame_height,
            lineage_key: self.lineage_key.or(default.lineage_key),
            segment_prefix: self.segment_prefix.unwrap_or(default.segment_prefix),
            half_backend: self.half_backend.unwrap_or(default.half_backend),
            thread_count: self.thread_count.or(default.thread_count),
            telemetry_window_ms: self.telemetry_window_ms.unwrap_or(default.telemetry_window_ms),
            debug_log: self.debug_log.unwrap_or(default.debug_log),
        }
    }
}
