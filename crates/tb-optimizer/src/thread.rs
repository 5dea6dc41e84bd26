//! One search trajectory.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tb_types::{invalid_argument, ParameterPoint, ParameterSpace, ScoredPoint, SearchError};

use crate::config::{SearchMode, TabuConfig};
use crate::hood::Hood;
use crate::memory::TabuSet;
use crate::window::ScoreWindow;

/// Where a trajectory is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// A candidate has been handed out and its score is outstanding.
    AwaitingScore,
    /// The last candidate has been scored; the next call draws a new one.
    ReadyForNext,
    /// No fresh point could be generated. Terminal.
    Exhausted,
}

/// A trajectory owns its hood, the tabu memory that hood draws against,
/// and its own RNG. Nothing here is shared between trajectories.
#[derive(Debug)]
pub struct SearchThread {
    id: usize,
    mode: SearchMode,
    backtrack_cutoff: f64,
    hood: Hood,
    tabu: TabuSet,
    rng: StdRng,
    current: ScoredPoint,
    state: ThreadState,
    best: Option<ScoredPoint>,
    best_history: Vec<ScoredPoint>,
    recent_scores: ScoreWindow,
    iterations_since_best: usize,
    backtrack_count: usize,
    evaluations: usize,
}

impl SearchThread {
    /// Start a trajectory at `start`. The start point itself is the first
    /// candidate in flight.
    pub fn new(
        id: usize,
        start: ParameterPoint,
        space: Arc<ParameterSpace>,
        config: &TabuConfig,
        mut rng: StdRng,
    ) -> Result<Self, SearchError> {
        let mut tabu = TabuSet::new();
        let hood = Hood::new(
            ScoredPoint::unscored(start.clone()),
            space,
            config.hood_settings(),
            &mut tabu,
            &mut rng,
        )?;
        debug!("Search thread {} starting at {}", id, start);
        Ok(Self {
            id,
            mode: config.mode,
            backtrack_cutoff: config.backtrack_cutoff,
            hood,
            tabu,
            rng,
            current: ScoredPoint::unscored(start),
            state: ThreadState::AwaitingScore,
            best: None,
            best_history: Vec::new(),
            recent_scores: ScoreWindow::new(config.recent_window),
            iterations_since_best: 0,
            backtrack_count: 1,
            evaluations: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == ThreadState::Exhausted
    }

    /// The candidate in flight, if any.
    pub fn pending(&self) -> Option<&ParameterPoint> {
        match self.state {
            ThreadState::AwaitingScore => Some(&self.current.parameters),
            _ => None,
        }
    }

    pub fn current(&self) -> &ScoredPoint {
        &self.current
    }

    pub fn best(&self) -> Option<&ScoredPoint> {
        self.best.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().and_then(|b| b.score)
    }

    /// Every improvement, oldest first.
    pub fn best_history(&self) -> &[ScoredPoint] {
        &self.best_history
    }

    pub fn recent_scores(&self) -> &ScoreWindow {
        &self.recent_scores
    }

    pub fn iterations_since_best(&self) -> usize {
        self.iterations_since_best
    }

    pub fn backtrack_count(&self) -> usize {
        self.backtrack_count
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn tabu_len(&self) -> usize {
        self.tabu.len()
    }

    pub fn hood(&self) -> &Hood {
        &self.hood
    }

    /// Hand out the next candidate, regenerating the hood first if it has
    /// run dry. Returns `None` once the trajectory is exhausted.
    ///
    /// `global_best` is the best point of the whole search. In adaptive mode
    /// a stalled trajectory backtracks to it when it beats the trajectory's
    /// own best.
    pub fn next_candidate(
        &mut self,
        global_best: Option<&ScoredPoint>,
    ) -> Result<Option<ParameterPoint>, SearchError> {
        match self.state {
            ThreadState::Exhausted => return Ok(None),
            ThreadState::AwaitingScore => warn!(
                "Search thread {} replacing unscored candidate {}",
                self.id, self.current.parameters
            ),
            ThreadState::ReadyForNext => {}
        }

        if self.hood.is_last() {
            self.prepare_round(global_best)?;
        }

        match self.hood.next() {
            Some(point) => {
                self.current = ScoredPoint::unscored(point.clone());
                self.state = ThreadState::AwaitingScore;
                Ok(Some(point))
            }
            None => {
                self.state = ThreadState::Exhausted;
                info!(
                    "Search thread {} exhausted after {} evaluations ({} points visited)",
                    self.id,
                    self.evaluations,
                    self.tabu.len()
                );
                Ok(None)
            }
        }
    }

    fn prepare_round(&mut self, global_best: Option<&ScoredPoint>) -> Result<(), SearchError> {
        match self.mode {
            SearchMode::Independent => {
                if let Some(best) = &self.best {
                    if best.beats(self.hood.centre().score) {
                        self.hood.set_new_centre(best.clone())?;
                    }
                }
            }
            SearchMode::Adaptive => self.adapt(global_best)?,
        }
        self.hood.populate(&mut self.tabu, &mut self.rng);
        Ok(())
    }

    fn adapt(&mut self, global_best: Option<&ScoredPoint>) -> Result<(), SearchError> {
        let threshold = self.backtrack_cutoff * self.hood.settings().size as f64;
        let stalled = self.iterations_since_best as f64 / self.backtrack_count as f64 >= threshold;

        if stalled {
            let target = match global_best {
                Some(global) if global.beats(self.best_score()) => Some(global.clone()),
                _ => self.best.clone(),
            };
            if let Some(best) = target {
                debug!(
                    "Search thread {} backtracking to {} after {} iterations without improvement",
                    self.id, best.parameters, self.iterations_since_best
                );
                self.hood.set_new_centre(best)?;
                self.hood.tighten_all(1.0);
                self.backtrack_count += 1;
                return Ok(());
            }
        }

        if let Some(local) = self.hood.round_best().cloned() {
            self.hood.set_new_centre(local)?;
        }
        match self.recent_scores.slope() {
            Some(slope) if slope > 0.0 => {
                self.hood.tighten_all(1.0);
            }
            Some(slope) if slope < 0.0 => {
                self.hood.loosen_all(1.0);
            }
            _ => {}
        }
        Ok(())
    }

    /// Record the score of the candidate in flight. Returns whether it
    /// became the trajectory's new best.
    pub fn add_result(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> Result<bool, SearchError> {
        if !score.is_finite() {
            return Err(invalid_argument!("score for {params} is not finite: {score}"));
        }
        if self.state != ThreadState::AwaitingScore {
            return Err(SearchError::MismatchedParameters {
                expected: "no candidate in flight".to_string(),
                received: params.to_string(),
            });
        }
        if *params != self.current.parameters {
            return Err(SearchError::MismatchedParameters {
                expected: self.current.parameters.to_string(),
                received: params.to_string(),
            });
        }

        self.current.score = Some(score);
        self.state = ThreadState::ReadyForNext;
        self.evaluations += 1;
        self.recent_scores.push(score);

        let improved = self.hood.update_best(&self.current)?;
        if improved {
            self.best = Some(self.current.clone());
            self.best_history.push(self.current.clone());
            self.iterations_since_best = 0;
        } else {
            self.iterations_since_best += 1;
        }
        Ok(improved)
    }
}
