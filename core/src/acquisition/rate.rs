use std::time::Instant;

/// Packet production cadence measured between consecutive cycles.
#[derive(Debug, Clone, Default)]
pub struct RateMeter {
    baseline: Option<Instant>,
    rate: Option<f32>,
}

impl RateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed cycle at `now` and returns the current rate.
    ///
    /// The first call only seeds the baseline. A zero or negative delta
    /// keeps both the previous rate and the baseline.
    pub fn observe(&mut self, now: Instant) -> Option<f32> {
        let Some(baseline) = self.baseline else {
            self.baseline = Some(now);
            return self.rate;
        };

        match now.checked_duration_since(baseline) {
            Some(elapsed) if !elapsed.is_zero() => {
                self.rate = Some(1.0 / elapsed.as_secs_f32());
                self.baseline = Some(now);
            }
            _ => {}
        }
        self.rate
    }

    pub fn rate(&self) -> Option<f32> {
        self.rate
    }
}
