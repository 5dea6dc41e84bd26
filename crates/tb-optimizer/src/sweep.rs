//! Exhaustive parameter sweep.

use std::sync::Arc;
use tracing::info;

use tb_types::{
    config_error, invalid_argument, ParameterPoint, ParameterSpace, ScoredPoint, SearchError,
    TbResult,
};

use crate::optimiser::Optimiser;

/// Visits every combination of the space exactly once. The first parameter
/// (by name) varies slowest, the last fastest.
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    space: Arc<ParameterSpace>,
    total: usize,
    cursor: usize,
    pending: Option<ParameterPoint>,
    best: Option<ScoredPoint>,
    started: bool,
    finished: bool,
}

impl ParameterSweep {
    pub fn new(space: ParameterSpace) -> TbResult<Self> {
        space.validate_ranges()?;
        let total = space
            .combinations()
            .ok_or_else(|| config_error!("parameter space is too large to sweep"))?;
        Ok(Self {
            space: Arc::new(space),
            total,
            cursor: 0,
            pending: None,
            best: None,
            started: false,
            finished: false,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Total number of combinations.
    pub fn combinations(&self) -> usize {
        self.total
    }

    /// Combinations scored so far.
    pub fn evaluated(&self) -> usize {
        self.cursor
    }

    /// The `n`th combination in enumeration order.
    pub fn combination(&self, n: usize) -> Option<ParameterPoint> {
        self.space.point_at(n)
    }

    /// Restart the sweep and return the first combination.
    pub fn setup(&mut self) -> Option<ParameterPoint> {
        self.cursor = 0;
        self.best = None;
        self.started = true;
        self.pending = self.combination(0);
        self.finished = self.pending.is_none();
        info!("Parameter sweep over {} combinations", self.total);
        self.pending.clone()
    }

    pub fn run_one_iteration(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> TbResult<Option<ParameterPoint>> {
        if !self.started {
            return Err(SearchError::NotSetUp.into());
        }
        if !score.is_finite() {
            return Err(invalid_argument!("score for {params} is not finite: {score}").into());
        }
        let Some(pending) = self.pending.take() else {
            return Err(SearchError::MismatchedParameters {
                expected: "no candidate in flight".to_string(),
                received: params.to_string(),
            }
            .into());
        };
        if *params != pending {
            let err = SearchError::MismatchedParameters {
                expected: pending.to_string(),
                received: params.to_string(),
            };
            self.pending = Some(pending);
            return Err(err.into());
        }

        let scored = ScoredPoint::scored(pending, score);
        if scored.beats(self.best.as_ref().and_then(|b| b.score)) {
            self.best = Some(scored);
        }

        self.cursor += 1;
        self.pending = self.combination(self.cursor);
        if self.pending.is_none() {
            self.finished = true;
            info!(
                "Parameter sweep complete after {} combinations, best {:?}",
                self.cursor,
                self.best.as_ref().and_then(|b| b.score)
            );
        }
        Ok(self.pending.clone())
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn best(&self) -> Option<&ScoredPoint> {
        self.best.as_ref()
    }
}

impl Optimiser for ParameterSweep {
    fn name(&self) -> &str {
        "sweep"
    }

    fn pending(&mut self) -> TbResult<Vec<ParameterPoint>> {
        Ok(self.pending.iter().cloned().collect())
    }

    fn run_one_iteration(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> TbResult<Option<ParameterPoint>> {
        ParameterSweep::run_one_iteration(self, params, score)
    }

    fn finished(&self) -> bool {
        ParameterSweep::finished(self)
    }

    fn best(&self) -> Option<&ScoredPoint> {
        ParameterSweep::best(self)
    }
}
