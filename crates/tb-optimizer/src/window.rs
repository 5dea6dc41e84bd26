//! Fixed-size window of a trajectory's most recent scores.

use serde::Serialize;
use std::collections::VecDeque;

/// Newest-first, truncated at `capacity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreWindow {
    scores: VecDeque<f64>,
    capacity: usize,
}

impl ScoreWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            scores: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, score: f64) {
        self.scores.push_front(score);
        self.scores.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.scores.len() == self.capacity
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().copied()
    }

    /// Oldest first.
    pub fn chronological(&self) -> Vec<f64> {
        self.scores.iter().rev().copied().collect()
    }

    /// Least-squares slope of the scores against their arrival order.
    /// `None` with fewer than three scores.
    pub fn slope(&self) -> Option<f64> {
        let n = self.scores.len();
        if n < 3 {
            return None;
        }
        let ys = self.chronological();
        let mean_x = (n - 1) as f64 / 2.0;
        let mean_y = ys.iter().sum::<f64>() / n as f64;
        let (num, den) = ys
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(num, den), (x, y)| {
                let dx = x as f64 - mean_x;
                (num + dx * (y - mean_y), den + dx * dx)
            });
        Some(num / den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_first_and_truncates() {
        let mut window = ScoreWindow::new(3);
        for score in [1.0, 2.0, 3.0, 4.0] {
            window.push(score);
        }
        assert!(window.is_full());
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![4.0, 3.0, 2.0]);
        assert_eq!(window.chronological(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn slope_follows_the_trend() {
        let mut window = ScoreWindow::new(10);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.slope(), None);

        window.push(3.0);
        assert!((window.slope().unwrap() - 1.0).abs() < 1e-12);

        let mut falling = ScoreWindow::new(10);
        for score in [5.0, 4.0, 4.5, 1.0] {
            falling.push(score);
        }
        assert!(falling.slope().unwrap() < 0.0);

        let mut flat = ScoreWindow::new(10);
        for _ in 0..4 {
            flat.push(2.0);
        }
        assert_eq!(flat.slope(), Some(0.0));
    }

    #[test]
    fn zero_capacity_is_never_full() {
        let mut window = ScoreWindow::new(0);
        window.push(1.0);
        assert!(window.is_empty());
        assert!(!window.is_full());
    }
}
