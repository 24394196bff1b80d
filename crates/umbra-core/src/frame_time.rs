// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Slowest frame of a completed window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorstFrame {
    pub frame_time: Duration,
    pub window: u32,
}

impl WorstFrame {
    pub fn millis(&self) -> f64 {
        self.frame_time.as_secs_f64() * 1000.0
    }

    pub fn fps(&self) -> f64 {
        let secs = self.frame_time.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            f64::INFINITY
        }
    }
}

/// Tracks the slowest frame over fixed windows of frames and logs it once per window.
pub struct FrameTimeMonitor {
    window: u32,
    frames: u32,
    worst: Duration,
    last: Option<Instant>,
}

impl FrameTimeMonitor {
    pub const DEFAULT_WINDOW: u32 = 100;

    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            worst: Duration::ZERO,
            last: None,
        }
    }

    /// Marks the end of a frame at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<WorstFrame> {
        let Some(last) = self.last.replace(now) else {
            return None;
        };
        self.record(now.saturating_duration_since(last))
    }

    /// Folds one frame time into the current window. Returns the window's worst
    /// frame once `window` frames have been seen, then starts a new window.
    pub fn record(&mut self, frame_time: Duration) -> Option<WorstFrame> {
        self.worst = self.worst.max(frame_time);
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }
        let worst = WorstFrame {
            frame_time: self.worst,
            window: self.window,
        };
        self.frames = 0;
        self.worst = Duration::ZERO;
        tracing::info!(
            "Worst frame out of {}: {:.2} ms ({:.1} fps)",
            worst.window,
            worst.millis(),
            worst.fps()
        );
        Some(worst)
    }
}

impl Default for FrameTimeMonitor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_worst_frame_once_per_window() {
        let mut monitor = FrameTimeMonitor::new(3);
        assert_eq!(monitor.record(Duration::from_millis(10)), None);
        assert_eq!(monitor.record(Duration::from_millis(25)), None);
        let worst = monitor.record(Duration::from_millis(12)).unwrap();
        assert_eq!(worst.frame_time, Duration::from_millis(25));
        assert_eq!(worst.window, 3);
        assert!((worst.fps() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn window_resets_after_report() {
        let mut monitor = FrameTimeMonitor::new(2);
        monitor.record(Duration::from_millis(50));
        assert!(monitor.record(Duration::from_millis(5)).is_some());
        monitor.record(Duration::from_millis(7));
        let worst = monitor.record(Duration::from_millis(6)).unwrap();
        assert_eq!(worst.frame_time, Duration::from_millis(7));
    }

    #[test]
    fn first_tick_only_starts_the_clock() {
        let mut monitor = FrameTimeMonitor::new(1);
        let start = Instant::now();
        assert_eq!(monitor.tick(start), None);
        let worst = monitor.tick(start + Duration::from_millis(16)).unwrap();
        assert_eq!(worst.frame_time, Duration::from_millis(16));
    }
}
