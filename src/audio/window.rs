//! Fixed-capacity history of recent volume samples.

use std::collections::VecDeque;

/// Sliding window over the most recent `capacity` volume samples.
///
/// The mean is only reported once the window is full, which gives the
/// energy-gated trigger its cold-start period.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Mean of the window, or `None` while it is still filling.
    pub fn mean(&self) -> Option<f32> {
        if !self.is_full() || self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_requires_full_window() {
        let mut window = SlidingWindow::new(3);
        window.push(0.3);
        window.push(0.3);
        assert_eq!(window.mean(), None);

        window.push(0.6);
        let mean = window.mean().unwrap();
        assert!((mean - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_oldest_sample_is_evicted() {
        let mut window = SlidingWindow::new(2);
        window.push(1.0);
        window.push(0.0);
        window.push(0.0);

        assert_eq!(window.len(), 2);
        assert_eq!(window.mean(), Some(0.0));
    }
}
