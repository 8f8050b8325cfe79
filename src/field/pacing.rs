use instant::{Duration, Instant};

/// Caps how often the field is stepped and redrawn. Repaint callbacks can
/// arrive faster than the target rate (high-refresh displays); anything under
/// the interval is skipped without touching state.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// ~60 Hz.
    pub fn target_60hz() -> Self {
        Self::new(Duration::from_micros(16_667))
    }

    /// Returns true when this timestamp should be processed, and records it
    /// as the new baseline. The first observed frame always processes.
    pub fn should_step(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now - last < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_always_processes() {
        let mut pacer = FramePacer::target_60hz();
        assert!(pacer.should_step(Instant::now()));
    }

    #[test]
    fn frames_under_the_interval_are_skipped() {
        let mut pacer = FramePacer::new(Duration::from_millis(16));
        let t0 = Instant::now();
        assert!(pacer.should_step(t0));
        assert!(!pacer.should_step(t0 + Duration::from_millis(5)));
        assert!(!pacer.should_step(t0 + Duration::from_millis(15)));
        assert!(pacer.should_step(t0 + Duration::from_millis(17)));
    }

    #[test]
    fn baseline_moves_only_on_processed_frames() {
        let mut pacer = FramePacer::new(Duration::from_millis(16));
        let t0 = Instant::now();
        assert!(pacer.should_step(t0));
        // A skipped frame must not reset the baseline...
        assert!(!pacer.should_step(t0 + Duration::from_millis(10)));
        // ...so this one is 17ms past t0 and processes.
        assert!(pacer.should_step(t0 + Duration::from_millis(17)));
        // One step per elapsed interval.
        assert!(!pacer.should_step(t0 + Duration::from_millis(18)));
    }
}
