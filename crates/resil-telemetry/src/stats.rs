//! EWMA and slope over a latency window

use crate::ring::LatencyRing;
use serde::Serialize;

/// Latency statistics over a bounded sample window.
///
/// The EWMA is seeded from the first sample rather than blended with
/// zero, so a cold window converges immediately. The slope is an
/// ordinary-least-squares fit of latency against sample position in the
/// window; its nominal unit is ms/s under the assumption of roughly one
/// batch per second.
#[derive(Debug, Clone)]
pub struct LatencyStats {
    ring: LatencyRing,
    alpha: f64,
    ewma: Option<f64>,
}

/// Snapshot of a window's derived statistics
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsView {
    pub ewma: f64,
    pub slope: f64,
    pub samples: usize,
    pub window_size: usize,
}

impl LatencyStats {
    /// Create statistics over a window of `window` samples with EWMA
    /// smoothing factor `alpha`
    pub fn new(window: usize, alpha: f64) -> Self {
        Self {
            ring: LatencyRing::new(window),
            alpha,
            ewma: None,
        }
    }

    /// Record one batch latency
    pub fn record(&mut self, latency_ms: f64) {
        self.ring.push(latency_ms);
        self.ewma = Some(match self.ewma {
            None => latency_ms,
            Some(previous) => self.alpha * latency_ms + (1.0 - self.alpha) * previous,
        });
    }

    /// Current EWMA; `None` before the first sample
    pub fn ewma(&self) -> Option<f64> {
        self.ewma
    }

    /// Least-squares slope of latency against window position.
    ///
    /// Zero when the window holds fewer than two samples or the fit is
    /// degenerate.
    pub fn slope(&self) -> f64 {
        let n = self.ring.len();
        if n < 2 {
            return 0.0;
        }

        let nf = n as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        for (i, y) in self.ring.latencies().enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
        }

        let denominator = nf * sum_x2 - sum_x * sum_x;
        if denominator == 0.0 {
            return 0.0;
        }
        (nf * sum_xy - sum_x * sum_y) / denominator
    }

    /// Number of samples currently in the window
    pub fn samples(&self) -> usize {
        self.ring.len()
    }

    /// Window capacity
    pub fn window_size(&self) -> usize {
        self.ring.capacity()
    }

    /// Access the underlying ring
    pub fn ring(&self) -> &LatencyRing {
        &self.ring
    }

    /// Forget all history; the next sample re-seeds the EWMA
    pub fn reset(&mut self) {
        self.ring.clear();
        self.ewma = None;
    }

    /// Snapshot for read endpoints; EWMA reads as 0 before any sample
    pub fn view(&self) -> StatsView {
        StatsView {
            ewma: self.ewma.unwrap_or(0.0),
            slope: self.slope(),
            samples: self.ring.len(),
            window_size: self.ring.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ewma_seeds_from_first_sample() {
        let mut stats = LatencyStats::new(10, 0.3);
        assert!(stats.ewma().is_none());

        stats.record(50.0);
        assert_eq!(stats.ewma(), Some(50.0));

        stats.record(100.0);
        let expected = 0.3 * 100.0 + 0.7 * 50.0;
        assert!((stats.ewma().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ewma_series_matches_recurrence() {
        let inputs = [40.0, 55.0, 62.0, 48.0, 90.0];
        let alpha = 0.3;
        let mut stats = LatencyStats::new(10, alpha);

        let mut expected = inputs[0];
        stats.record(inputs[0]);
        for &x in &inputs[1..] {
            stats.record(x);
            expected = alpha * x + (1.0 - alpha) * expected;
            assert!((stats.ewma().unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_slope_of_linear_ramp_is_one() {
        let mut stats = LatencyStats::new(10, 0.3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.record(v);
        }
        assert!((stats.slope() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_slope_of_constant_sequence_is_zero() {
        let mut stats = LatencyStats::new(10, 0.3);
        for _ in 0..6 {
            stats.record(42.0);
        }
        assert!(stats.slope().abs() < 1e-9);
    }

    #[test]
    fn test_slope_degenerate_cases() {
        let mut stats = LatencyStats::new(10, 0.3);
        assert_eq!(stats.slope(), 0.0);
        stats.record(17.0);
        assert_eq!(stats.slope(), 0.0);
    }

    #[test]
    fn test_slope_honours_window_bound() {
        // After overflow only the last 3 samples matter; they are flat.
        let mut stats = LatencyStats::new(3, 0.3);
        for v in [1.0, 2.0, 3.0, 50.0, 50.0, 50.0] {
            stats.record(v);
        }
        assert_eq!(stats.samples(), 3);
        assert!(stats.slope().abs() < 1e-9);
    }

    #[test]
    fn test_reset_reseeds() {
        let mut stats = LatencyStats::new(5, 0.3);
        stats.record(80.0);
        stats.record(90.0);
        stats.reset();
        assert!(stats.ewma().is_none());
        assert_eq!(stats.samples(), 0);

        stats.record(10.0);
        assert_eq!(stats.ewma(), Some(10.0));
    }

    #[test]
    fn test_view_defaults() {
        let stats = LatencyStats::new(5, 0.3);
        let view = stats.view();
        assert_eq!(view.ewma, 0.0);
        assert_eq!(view.slope, 0.0);
        assert_eq!(view.window_size, 5);
    }
}
