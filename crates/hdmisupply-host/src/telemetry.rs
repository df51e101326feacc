//! Process-call timing and frame-rate reporting

use std::time::{Duration, Instant};

use tracing::debug;

/// Timing of one process call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallTiming {
    /// Time since the previous call started; zero on the first call
    pub since_last: Duration,
    /// Time spent converting
    pub convert: Duration,
    /// Average call rate, once per window
    pub average_fps: Option<f64>,
}

/// Averages the host's call rate over a fixed window
#[derive(Debug, Clone)]
pub struct FrameTimer {
    window: Duration,
    last_start: Option<Instant>,
    frames: u32,
    accumulated: Duration,
}

impl FrameTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_start: None,
            frames: 0,
            accumulated: Duration::ZERO,
        }
    }

    /// Record a call that started at `start` and finished converting at `end`
    ///
    /// Once more than a window's worth of call intervals has accumulated,
    /// returns the average rate and starts a new window.
    pub fn record(&mut self, start: Instant, end: Instant) -> CallTiming {
        let since_last = self
            .last_start
            .map_or(Duration::ZERO, |last| start.saturating_duration_since(last));
        let convert = end.saturating_duration_since(start);
        self.last_start = Some(start);

        debug!(
            "{:.3}ms since last call, {:.3}ms to convert buffer",
            since_last.as_secs_f64() * 1000.0,
            convert.as_secs_f64() * 1000.0
        );

        self.frames = self.frames.saturating_add(1);
        self.accumulated += since_last;

        let mut average_fps = None;
        if self.accumulated > self.window {
            average_fps = Some(f64::from(self.frames) / self.accumulated.as_secs_f64());
            self.frames = 0;
            self.accumulated = Duration::ZERO;
        }

        CallTiming {
            since_last,
            convert,
            average_fps,
        }
    }
}

/// Status line sent to the host for an average rate
pub fn fps_message(fps: f64) -> String {
    format!("averaging {fps:.2} fps")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once_per_window() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        let base = Instant::now();
        let frame = Duration::from_millis(20);

        let mut reports = Vec::new();
        for i in 0..=12u32 {
            let start = base + frame * i;
            let timing = timer.record(start, start + Duration::from_millis(3));
            assert_eq!(timing.convert, Duration::from_millis(3));
            if let Some(fps) = timing.average_fps {
                reports.push((i, fps));
            }
        }

        // Intervals accumulate 0, 20, 40 ... and first exceed 100ms at call 6
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].0, 6);
        assert!((reports[0].1 - 7.0 / 0.12).abs() < 1e-6);
        assert_eq!(reports[1].0, 12);
        assert!((reports[1].1 - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_call_has_no_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(2));
        let now = Instant::now();
        let timing = timer.record(now, now);
        assert_eq!(timing.since_last, Duration::ZERO);
        assert_eq!(timing.average_fps, None);
    }

    #[test]
    fn test_fps_message() {
        assert_eq!(fps_message(59.94), "averaging 59.94 fps");
    }
}
