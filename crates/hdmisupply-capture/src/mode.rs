//! 1080-line input timing modes
//!
//! The host reports a project frame rate. The capture device needs one of a
//! fixed set of timing modes, all at 1920×1080.

use std::fmt;
use std::time::Duration;

/// Hardware input timing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    /// 1080p at 23.976 fps, the fallback for unrecognised rates
    #[default]
    Hd1080p2398,
    Hd1080p24,
    /// 1080i at 50 fields per second, which carries 25 fps material
    Hd1080i50,
    Hd1080p2997,
    Hd1080p30,
    Hd1080p50,
    Hd1080p5994,
    Hd1080p6000,
}

impl DisplayMode {
    /// Every supported mode
    pub const ALL: [Self; 8] = [
        Self::Hd1080p2398,
        Self::Hd1080p24,
        Self::Hd1080i50,
        Self::Hd1080p2997,
        Self::Hd1080p30,
        Self::Hd1080p50,
        Self::Hd1080p5994,
        Self::Hd1080p6000,
    ];

    /// Map a host frame rate to a timing mode
    ///
    /// Integer rates must match exactly. The NTSC rates allow ±0.01.
    /// 25 fps maps to 50i since cameras send 25 fps over SDI that way.
    pub fn from_frame_rate(fps: f64) -> Self {
        #[allow(clippy::float_cmp)]
        let exact = |rate: f64| fps == rate;
        let near = |rate: f64| (fps - rate).abs() < 0.01;

        if exact(24.0) {
            Self::Hd1080p24
        } else if exact(25.0) {
            Self::Hd1080i50
        } else if near(29.97) {
            Self::Hd1080p2997
        } else if exact(30.0) {
            Self::Hd1080p30
        } else if exact(50.0) {
            Self::Hd1080p50
        } else if near(59.94) {
            Self::Hd1080p5994
        } else if exact(60.0) {
            Self::Hd1080p6000
        } else {
            Self::Hd1080p2398
        }
    }

    /// Frames delivered per second
    pub fn frame_rate(self) -> f64 {
        match self {
            Self::Hd1080p2398 => 24000.0 / 1001.0,
            Self::Hd1080p24 => 24.0,
            Self::Hd1080i50 => 25.0,
            Self::Hd1080p2997 => 30000.0 / 1001.0,
            Self::Hd1080p30 => 30.0,
            Self::Hd1080p50 => 50.0,
            Self::Hd1080p5994 => 60000.0 / 1001.0,
            Self::Hd1080p6000 => 60.0,
        }
    }

    /// Time between frame notifications
    pub fn frame_interval(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate())
    }

    /// Whether the mode is interlaced
    pub fn is_interlaced(self) -> bool {
        matches!(self, Self::Hd1080i50)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hd1080p2398 => "1080p23.98",
            Self::Hd1080p24 => "1080p24",
            Self::Hd1080i50 => "1080i50",
            Self::Hd1080p2997 => "1080p29.97",
            Self::Hd1080p30 => "1080p30",
            Self::Hd1080p50 => "1080p50",
            Self::Hd1080p5994 => "1080p59.94",
            Self::Hd1080p6000 => "1080p60",
        };
        f.write_str(name)
    }
}
