//! Tabu search configuration.

use serde::{Deserialize, Serialize};

use tb_types::{config_error, TbResult};

use crate::hood::HoodSettings;

/// How trajectories pick the centre of their next neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Recentre on the trajectory's best point whenever it beats the current
    /// centre. Finished once every trajectory reports the same best point
    /// with the same score and has stopped improving.
    Independent,
    /// Continue from the round's best neighbour, backtrack to the best point
    /// after long stretches without improvement, and adjust sampling spread
    /// from the recent score trend. Finished by statistical convergence.
    Adaptive,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Independent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabuConfig {
    /// Number of concurrent trajectories.
    pub threads: usize,
    pub mode: SearchMode,
    /// Neighbours generated per round.
    pub hood_size: usize,
    /// Starting sd of every sampling distribution, in index units.
    pub initial_sd: f64,
    /// Loosen/tighten step as a proportion of a range's size.
    pub sd_increment_proportion: f64,
    /// Tabu draws tolerated before distributions are loosened.
    pub give_up: usize,
    /// Uniform random draws tried once loosening is maxed out, before the
    /// space is scanned for an unvisited point.
    pub fallback_attempts: usize,
    /// Backtrack when `iterations_since_best / backtracks` reaches
    /// `backtrack_cutoff * hood_size`.
    pub backtrack_cutoff: f64,
    /// Length of each trajectory's recent-score window.
    pub recent_window: usize,
    /// Independent mode: results each trajectory must go without improving
    /// before agreement on a best point counts as finished.
    pub agreement_patience: usize,
    /// Base significance level for convergence testing.
    pub convergence_alpha: f64,
    /// Fixed RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for TabuConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            mode: SearchMode::Independent,
            hood_size: 5,
            initial_sd: 0.5,
            sd_increment_proportion: 0.05,
            give_up: 10,
            fallback_attempts: 100,
            backtrack_cutoff: 2.0,
            recent_window: 20,
            agreement_patience: 100,
            convergence_alpha: 0.05,
            seed: None,
        }
    }
}

impl TabuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hood_size(mut self, n: usize) -> Self {
        self.hood_size = n;
        self
    }

    pub fn with_initial_sd(mut self, sd: f64) -> Self {
        self.initial_sd = sd;
        self
    }

    pub fn with_sd_increment(mut self, proportion: f64) -> Self {
        self.sd_increment_proportion = proportion;
        self
    }

    pub fn with_give_up(mut self, attempts: usize) -> Self {
        self.give_up = attempts;
        self
    }

    pub fn with_fallback_attempts(mut self, attempts: usize) -> Self {
        self.fallback_attempts = attempts;
        self
    }

    pub fn with_backtrack_cutoff(mut self, cutoff: f64) -> Self {
        self.backtrack_cutoff = cutoff;
        self
    }

    pub fn with_recent_window(mut self, n: usize) -> Self {
        self.recent_window = n;
        self
    }

    pub fn with_agreement_patience(mut self, n: usize) -> Self {
        self.agreement_patience = n;
        self
    }

    pub fn with_convergence_alpha(mut self, alpha: f64) -> Self {
        self.convergence_alpha = alpha;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn hood_settings(&self) -> HoodSettings {
        HoodSettings {
            size: self.hood_size,
            sd: self.initial_sd,
            increment: self.sd_increment_proportion,
            give_up: self.give_up,
            fallback_attempts: self.fallback_attempts,
        }
    }

    pub fn validate(&self) -> TbResult<()> {
        if self.threads == 0 {
            return Err(config_error!("threads must be at least 1"));
        }
        if self.hood_size == 0 {
            return Err(config_error!("hood_size must be at least 1"));
        }
        if self.give_up == 0 {
            return Err(config_error!("give_up must be at least 1"));
        }
        if !self.initial_sd.is_finite() || self.initial_sd <= 0.0 {
            return Err(config_error!(
                "initial_sd must be positive, got {}",
                self.initial_sd
            ));
        }
        if !self.sd_increment_proportion.is_finite() || self.sd_increment_proportion <= 0.0 {
            return Err(config_error!(
                "sd_increment_proportion must be positive, got {}",
                self.sd_increment_proportion
            ));
        }
        if !self.backtrack_cutoff.is_finite() || self.backtrack_cutoff < 0.0 {
            return Err(config_error!(
                "backtrack_cutoff must be non-negative, got {}",
                self.backtrack_cutoff
            ));
        }
        if self.mode == SearchMode::Adaptive && self.recent_window < 3 {
            return Err(config_error!(
                "recent_window must hold at least 3 scores in adaptive mode"
            ));
        }
        if !(self.convergence_alpha > 0.0 && self.convergence_alpha < 1.0) {
            return Err(config_error!(
                "convergence_alpha must lie in (0, 1), got {}",
                self.convergence_alpha
            ));
        }
        Ok(())
    }
}
