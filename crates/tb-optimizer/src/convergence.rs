//! Statistical convergence across trajectories.
//!
//! Every pair of trajectories is compared on its recent-score window with a
//! location test and a spread test. The tests are strategies behind
//! [`SampleComparison`] so that either can be swapped without touching the
//! orchestrator.

use serde::Serialize;
use std::fmt;

use crate::stats;

/// Compare two score samples and return a significance level.
pub trait SampleComparison: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn p_value(&self, a: &[f64], b: &[f64]) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MannWhitneyU;

impl SampleComparison for MannWhitneyU {
    fn name(&self) -> &str {
        "mann-whitney-u"
    }

    fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
        stats::mann_whitney_u(a, b).p_value
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Levene;

impl SampleComparison for Levene {
    fn name(&self) -> &str {
        "levene"
    }

    fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
        stats::levene(a, b).p_value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairOutcome {
    pub first: usize,
    pub second: usize,
    pub location_p: f64,
    pub spread_p: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    /// Bonferroni-adjusted level for the location test.
    pub location_level: f64,
    pub spread_level: f64,
    pub pairs: Vec<PairOutcome>,
    pub converged_pairs: usize,
    pub converged: bool,
}

#[derive(Debug)]
pub struct ConvergenceTest {
    alpha: f64,
    location: Box<dyn SampleComparison>,
    spread: Box<dyn SampleComparison>,
}

impl ConvergenceTest {
    /// Mann-Whitney U for location, Levene for spread.
    pub fn new(alpha: f64) -> Self {
        Self::with_tests(alpha, Box::new(MannWhitneyU), Box::new(Levene))
    }

    pub fn with_tests(
        alpha: f64,
        location: Box<dyn SampleComparison>,
        spread: Box<dyn SampleComparison>,
    ) -> Self {
        Self {
            alpha,
            location,
            spread,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn location_test(&self) -> &dyn SampleComparison {
        self.location.as_ref()
    }

    pub fn spread_test(&self) -> &dyn SampleComparison {
        self.spread.as_ref()
    }

    /// Compare every pair of samples. A pair converges when the location
    /// p-value is at or below `alpha / samples.len()` and the spread p-value
    /// at or below `alpha`. The whole set converges when at least half of
    /// the pairs do; fewer than two samples never converge here.
    pub fn evaluate(&self, samples: &[Vec<f64>]) -> ConvergenceReport {
        let location_level = self.alpha / samples.len().max(1) as f64;
        let spread_level = self.alpha;

        let mut pairs = Vec::new();
        for (i, a) in samples.iter().enumerate() {
            for (j, b) in samples.iter().enumerate().skip(i + 1) {
                let location_p = self.location.p_value(a, b);
                let spread_p = self.spread.p_value(a, b);
                pairs.push(PairOutcome {
                    first: i,
                    second: j,
                    location_p,
                    spread_p,
                    converged: location_p <= location_level && spread_p <= spread_level,
                });
            }
        }

        let converged_pairs = pairs.iter().filter(|p| p.converged).count();
        let converged = !pairs.is_empty() && converged_pairs * 2 >= pairs.len();
        ConvergenceReport {
            location_level,
            spread_level,
            pairs,
            converged_pairs,
            converged,
        }
    }
}

impl Default for ConvergenceTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Converged only when both samples start with the same value.
    #[derive(Debug)]
    struct SameHead;

    impl SampleComparison for SameHead {
        fn name(&self) -> &str {
            "same-head"
        }

        fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
            if a.first() == b.first() {
                0.0
            } else {
                1.0
            }
        }
    }

    fn with_stub() -> ConvergenceTest {
        ConvergenceTest::with_tests(0.05, Box::new(SameHead), Box::new(SameHead))
    }

    #[test]
    fn levels_are_bonferroni_adjusted() {
        let test = ConvergenceTest::new(0.06);
        let report = test.evaluate(&[vec![1.0], vec![2.0], vec![3.0]]);
        assert!((report.location_level - 0.02).abs() < 1e-12);
        assert_eq!(report.spread_level, 0.06);
        assert_eq!(report.pairs.len(), 3);
        assert_eq!(test.location_test().name(), "mann-whitney-u");
        assert_eq!(test.spread_test().name(), "levene");
    }

    #[test]
    fn half_of_the_pairs_is_enough() {
        // pairs: (0,1) yes, (0,2) no, (1,2) no
        let report = with_stub().evaluate(&[vec![1.0], vec![1.0], vec![2.0]]);
        assert_eq!(report.converged_pairs, 1);
        assert!(!report.converged);

        // 6 pairs, the three among samples 0..=2 converge
        let report = with_stub().evaluate(&[vec![1.0], vec![1.0], vec![1.0], vec![2.0]]);
        assert_eq!(report.converged_pairs, 3);
        assert!(report.converged);
    }

    #[test]
    fn fewer_than_two_samples_never_converge() {
        assert!(!with_stub().evaluate(&[vec![1.0]]).converged);
        assert!(!with_stub().evaluate(&[]).converged);
    }

    #[test]
    fn both_tests_must_pass() {
        let samples = vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
            vec![101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0],
        ];
        let report = ConvergenceTest::new(0.05).evaluate(&samples);
        let pair = &report.pairs[0];
        assert!(pair.location_p <= report.location_level);
        // identical spread
        assert!(pair.spread_p > report.spread_level);
        assert!(!report.converged);
    }
}
