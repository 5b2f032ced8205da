//! Rolling latency window.
//!
//! Keeps the most recent one-way latency samples (camera send time to
//! server receive time) and derives a running average for display.

use std::collections::VecDeque;

/// Number of samples kept by [`LatencyHistory::new`].
pub const LATENCY_WINDOW: usize = 100;

/// Fixed-capacity FIFO of latency samples in milliseconds.
///
/// Pushing into a full window evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct LatencyHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyHistory {
    /// Create a history holding [`LATENCY_WINDOW`] samples.
    pub fn new() -> Self {
        Self::with_capacity(LATENCY_WINDOW)
    }

    /// Create a history with a custom capacity (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one sample.
    pub fn push(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Mean of the samples in the window, or `0.0` when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LatencyHistory {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_averages_zero() {
        let h = LatencyHistory::new();
        assert_eq!(h.average(), 0.0);
        assert!(h.is_empty());
    }

    #[test]
    fn average_of_three() {
        let mut h = LatencyHistory::new();
        for ms in [10.0, 20.0, 30.0] {
            h.push(ms);
        }
        assert_eq!(h.average(), 20.0);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut h = LatencyHistory::new();
        h.push(1000.0);
        for _ in 0..LATENCY_WINDOW {
            h.push(5.0);
        }
        assert_eq!(h.len(), LATENCY_WINDOW);
        // The 1000 ms outlier was the oldest and must be gone.
        assert_eq!(h.average(), 5.0);
    }

    #[test]
    fn custom_capacity() {
        let mut h = LatencyHistory::with_capacity(2);
        h.push(1.0);
        h.push(2.0);
        h.push(3.0);
        assert_eq!(h.len(), 2);
        assert_eq!(h.average(), 2.5);

        let mut one = LatencyHistory::with_capacity(0);
        one.push(4.0);
        one.push(6.0);
        assert_eq!(one.len(), 1);
        assert_eq!(one.average(), 6.0);
    }
}
