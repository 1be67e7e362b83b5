//! Running average of completion latency at the current pool size.

/// Mean latency of the current measurement window.
///
/// A negative `count` is a warm-up: that many samples are discarded
/// before averaging starts, so transition noise after a resize does not
/// pollute the statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningAverage {
    value: f64,
    count: i64,
}

impl RunningAverage {
    /// A fresh window that discards the first `warmup` samples.
    pub fn collecting(warmup: usize) -> Self {
        let mut average = Self {
            value: 0.0,
            count: 0,
        };
        average.reset(warmup);
        average
    }

    pub fn reset(&mut self, warmup: usize) {
        self.value = 0.0;
        self.count = -(warmup as i64);
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn is_collecting(&self) -> bool {
        self.count < 0
    }

    /// Fold in one sample.
    ///
    /// Returns the average to commit once more than `window` samples have
    /// been averaged; the window then restarts.
    pub fn record(&mut self, ms: f64, window: u32) -> Option<f64> {
        let mut committed = None;
        if self.count < 0 {
            self.value = 0.0;
        } else if self.count == 0 {
            self.value = ms;
        } else {
            let n = self.count as f64;
            self.value = (self.value * n + ms) / (n + 1.0);
            if self.count > i64::from(window) {
                committed = Some(self.value);
                self.reset(1);
            }
        }
        self.count += 1;
        committed
    }
}
