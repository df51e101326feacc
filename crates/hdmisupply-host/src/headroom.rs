//! "YUV headroom" UI toggle
//!
//! Off means the signal uses video levels (black at 64); on means it uses
//! the full code range. The value is read at the start of every process
//! call, so a change applies to the next conversion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hdmisupply_convert::LumaRange;
use tracing::info;

use crate::host::HostNotifier;

/// Label shown next to the toggle in the host UI
pub const HEADROOM_LABEL: &str = "YUV headroom";

/// Shared boolean behind the UI control
///
/// Clones share the same value, so the UI can hold one while the session
/// holds another.
#[derive(Debug, Clone, Default)]
pub struct HeadroomToggle {
    enabled: Arc<AtomicBool>,
}

impl HeadroomToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Luma range the next conversion will use
    pub fn luma_range(&self) -> LumaRange {
        LumaRange::from_headroom(self.is_enabled())
    }

    /// Change callback: store the value and ask the host to redraw
    ///
    /// Returns the previous value. No buffer is touched here.
    pub fn set(&self, enabled: bool, notifier: &dyn HostNotifier) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::Relaxed);
        info!("{} {}", HEADROOM_LABEL, if enabled { "on" } else { "off" });
        notifier.request_reprocess();
        previous
    }
}
