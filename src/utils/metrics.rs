//! Running metrics accumulated over batches
//!
//! Losses are weighted by batch size so that a short final batch counts
//! in proportion to the samples it holds.

use serde::{Deserialize, Serialize};

/// Sample-weighted running mean of a per-batch value
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `samples` items
    pub fn add(&mut self, value: f64, samples: usize) {
        self.sum += value * samples as f64;
        self.count += samples;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

/// Accuracy tracker for training and evaluation
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the outcome of one batch
    pub fn add(&mut self, correct: usize, total: usize) {
        self.correct += correct.min(total);
        self.total += total;
    }

    pub fn accuracy(&self) -> f64 {
        if self.total > 0 {
            self.correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn count(&self) -> usize {
        self.total
    }

    pub fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}

/// Loss and accuracy of one pass over a data feeder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

impl PassMetrics {
    pub fn from_trackers(loss: &RunningAverage, accuracy: &AccuracyTracker) -> Self {
        Self {
            loss: loss.average(),
            accuracy: accuracy.accuracy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average_is_sample_weighted() {
        let mut avg = RunningAverage::new();
        avg.add(1.0, 2);
        avg.add(4.0, 1);

        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 1e-9);

        avg.reset();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);
    }

    #[test]
    fn test_accuracy_tracker() {
        let mut tracker = AccuracyTracker::new();
        tracker.add(2, 3);

        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.correct(), 2);
        assert!((tracker.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pass_metrics_from_empty_trackers() {
        let metrics = PassMetrics::from_trackers(&RunningAverage::new(), &AccuracyTracker::new());
        assert_eq!(metrics, PassMetrics { loss: 0.0, accuracy: 0.0 });
    }
}
