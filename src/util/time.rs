//! Time utilities

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Frame period for a target frame rate. Zero is treated as one frame per second.
pub fn frame_period(frames_per_second: u32) -> Duration {
    Duration::from_secs(1) / frames_per_second.max(1)
}

/// Measures elapsed time between frames, in seconds
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: tokio::time::Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: tokio::time::Instant::now(),
        }
    }

    /// Seconds since the previous tick (or construction)
    pub fn tick(&mut self, now: tokio::time::Instant) -> f64 {
        let delta = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        delta
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_period_for_sixty_hz() {
        assert_eq!(frame_period(60), Duration::from_nanos(16_666_666));
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn frame_clock_reports_seconds() {
        let mut clock = FrameClock::new();
        tokio::time::advance(Duration::from_millis(250)).await;
        let dt = clock.tick(tokio::time::Instant::now());
        assert!((dt - 0.25).abs() < 1e-6);
        assert_eq!(clock.tick(tokio::time::Instant::now()), 0.0);
    }
}
