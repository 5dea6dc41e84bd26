//! Multi-trajectory tabu search.
//!
//! [`TabuSearch`] drives a fixed pool of [`SearchThread`]s in strict
//! round-robin turns. Each call to [`run_one_iteration`] delivers one score
//! to the active trajectory, advances the cursor to the next live trajectory
//! and returns that trajectory's candidate. The orchestrator never blocks on
//! evaluation: scoring happens entirely on the caller's side.
//!
//! Termination depends on [`SearchMode`]:
//!
//! - `Independent`: finished once every trajectory has a best point, all of
//!   them are the same point with exactly the same score, and each
//!   trajectory has since gone `agreement_patience` results without
//!   improving (or is exhausted).
//! - `Adaptive`: finished once the recent-score windows of the trajectories
//!   pass the pairwise [`ConvergenceTest`]. A lone trajectory is finished
//!   when its window is full and it has gone a full window without
//!   improving.
//!
//! [`run_one_iteration`]: TabuSearch::run_one_iteration

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use tb_types::{ParameterPoint, ParameterSpace, ScoredPoint, SearchError, TbResult};

use crate::config::{SearchMode, TabuConfig};
use crate::convergence::{ConvergenceReport, ConvergenceTest};
use crate::optimiser::Optimiser;
use crate::thread::{SearchThread, ThreadState};

/// Where the trajectories start.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPoints {
    /// Every trajectory starts at a uniformly random point.
    Random,
    /// The first trajectory starts here, the rest at random points.
    Single(ParameterPoint),
    /// Trajectory `i` starts at point `i`; any surplus trajectories start
    /// at random points.
    Many(Vec<ParameterPoint>),
}

impl From<ParameterPoint> for StartPoints {
    fn from(point: ParameterPoint) -> Self {
        Self::Single(point)
    }
}

impl From<Vec<ParameterPoint>> for StartPoints {
    fn from(points: Vec<ParameterPoint>) -> Self {
        Self::Many(points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadReport {
    pub id: usize,
    pub state: ThreadState,
    pub best: Option<ScoredPoint>,
    pub improvements: usize,
    pub evaluations: usize,
    pub iterations_since_best: usize,
    pub backtracks: usize,
    pub tabu_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub mode: SearchMode,
    pub iterations: usize,
    pub finished: bool,
    pub exhausted: bool,
    pub best: Option<ScoredPoint>,
    pub threads: Vec<ThreadReport>,
}

#[derive(Debug)]
pub struct TabuSearch {
    space: Arc<ParameterSpace>,
    config: TabuConfig,
    convergence: ConvergenceTest,
    threads: Vec<SearchThread>,
    cursor: usize,
    best: Option<ScoredPoint>,
    iterations: usize,
    rng: StdRng,
}

impl TabuSearch {
    pub fn new(space: ParameterSpace, config: TabuConfig) -> TbResult<Self> {
        config.validate()?;
        space.validate_ranges()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            space: Arc::new(space),
            convergence: ConvergenceTest::new(config.convergence_alpha),
            config,
            threads: Vec::new(),
            cursor: 0,
            best: None,
            iterations: 0,
            rng,
        })
    }

    /// Replace the pairwise convergence test used in adaptive mode.
    pub fn with_convergence_test(mut self, test: ConvergenceTest) -> Self {
        self.convergence = test;
        self
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &TabuConfig {
        &self.config
    }

    pub fn threads(&self) -> &[SearchThread] {
        &self.threads
    }

    /// Scores delivered since the last `setup`.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Index of the trajectory whose score is expected next.
    pub fn active_thread(&self) -> usize {
        self.cursor
    }

    /// A uniformly random point of the space.
    pub fn random_start_point(&mut self) -> TbResult<ParameterPoint> {
        Ok(self.space.random_point(&mut self.rng)?)
    }

    fn thread_rng(&mut self, index: usize) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::seed_from_u64(self.rng.random()),
        }
    }

    /// Create the trajectories and return the first candidate to score.
    /// Any previous search state is discarded.
    pub fn setup(&mut self, start: impl Into<StartPoints>) -> TbResult<ParameterPoint> {
        let mut starts = match start.into() {
            StartPoints::Random => Vec::new(),
            StartPoints::Single(point) => vec![point],
            StartPoints::Many(points) => points,
        };
        if starts.len() > self.config.threads {
            warn!(
                "Ignoring {} start points beyond the {} configured threads",
                starts.len() - self.config.threads,
                self.config.threads
            );
            starts.truncate(self.config.threads);
        }

        let mut threads = Vec::with_capacity(self.config.threads);
        let mut starts = starts.into_iter();
        for index in 0..self.config.threads {
            let start = match starts.next() {
                Some(point) => point,
                None => self.random_start_point()?,
            };
            let rng = self.thread_rng(index);
            threads.push(SearchThread::new(
                index,
                start,
                self.space.clone(),
                &self.config,
                rng,
            )?);
        }

        self.threads = threads;
        self.cursor = 0;
        self.best = None;
        self.iterations = 0;
        info!(
            "Tabu search set up with {} threads in {:?} mode over {} parameters",
            self.threads.len(),
            self.config.mode,
            self.space.len()
        );

        self.threads[0]
            .pending()
            .cloned()
            .ok_or_else(|| SearchError::NotSetUp.into())
    }

    /// Deliver the score of the active trajectory's candidate and return the
    /// next candidate to score. `None` means every trajectory is exhausted.
    pub fn run_one_iteration(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> TbResult<Option<ParameterPoint>> {
        if self.threads.is_empty() {
            return Err(SearchError::NotSetUp.into());
        }

        let active = self.cursor;
        let improved = self.threads[active].add_result(params, score)?;
        self.iterations += 1;
        if improved {
            self.update_global_best(active);
        }

        let count = self.threads.len();
        for step in 1..=count {
            let index = (active + step) % count;
            let thread = &mut self.threads[index];
            let candidate = match thread.pending() {
                Some(point) => Some(point.clone()),
                None => thread.next_candidate(self.best.as_ref())?,
            };
            if let Some(point) = candidate {
                self.cursor = index;
                return Ok(Some(point));
            }
        }

        info!(
            "Every search thread is exhausted after {} iterations",
            self.iterations
        );
        Ok(None)
    }

    fn update_global_best(&mut self, index: usize) {
        let Some(candidate) = self.threads[index].best() else {
            return;
        };
        if candidate.beats(self.best.as_ref().and_then(|b| b.score)) {
            debug!(
                "New global best {:?} at {} from thread {}",
                candidate.score, candidate.parameters, index
            );
            self.best = Some(candidate.clone());
        }
    }

    /// One candidate per live trajectory, starting with the active one.
    /// Trajectories whose last candidate has been scored draw their next one
    /// first. Reporting the batch in this order with consecutive
    /// `run_one_iteration` calls keeps the round-robin contract.
    pub fn pending_batch(&mut self) -> TbResult<Vec<ParameterPoint>> {
        let count = self.threads.len();
        let mut batch = Vec::with_capacity(count);
        for step in 0..count {
            let thread = &mut self.threads[(self.cursor + step) % count];
            if thread.state() == ThreadState::ReadyForNext {
                thread.next_candidate(self.best.as_ref())?;
            }
            if let Some(point) = thread.pending() {
                batch.push(point.clone());
            }
        }
        Ok(batch)
    }

    /// Best point seen by any trajectory.
    pub fn best(&self) -> Option<&ScoredPoint> {
        self.best.as_ref()
    }

    /// True once every trajectory has run out of fresh points.
    pub fn is_exhausted(&self) -> bool {
        !self.threads.is_empty() && self.threads.iter().all(SearchThread::is_exhausted)
    }

    pub fn finished(&self) -> bool {
        if self.threads.is_empty() {
            return false;
        }
        match self.config.mode {
            SearchMode::Independent => self.bests_agree() && self.bests_settled(),
            SearchMode::Adaptive if self.threads.len() < 2 => {
                let thread = &self.threads[0];
                thread.recent_scores().is_full()
                    && thread.iterations_since_best() >= self.config.recent_window
            }
            SearchMode::Adaptive => self
                .convergence_report()
                .is_some_and(|report| report.converged),
        }
    }

    fn bests_agree(&self) -> bool {
        let mut bests = self.threads.iter().map(SearchThread::best);
        let Some(Some(first)) = bests.next() else {
            return false;
        };
        first.score.is_some()
            && bests.all(|best| {
                best.is_some_and(|b| b.score == first.score && b.parameters == first.parameters)
            })
    }

    fn bests_settled(&self) -> bool {
        self.threads.iter().all(|t| {
            t.is_exhausted() || t.iterations_since_best() >= self.config.agreement_patience
        })
    }

    /// Pairwise convergence of the recent-score windows, or `None` while any
    /// window is still filling.
    pub fn convergence_report(&self) -> Option<ConvergenceReport> {
        if self.threads.is_empty() || !self.threads.iter().all(|t| t.recent_scores().is_full()) {
            return None;
        }
        let samples: Vec<Vec<f64>> = self
            .threads
            .iter()
            .map(|t| t.recent_scores().chronological())
            .collect();
        Some(self.convergence.evaluate(&samples))
    }

    pub fn report(&self) -> SearchReport {
        SearchReport {
            mode: self.config.mode,
            iterations: self.iterations,
            finished: self.finished(),
            exhausted: self.is_exhausted(),
            best: self.best.clone(),
            threads: self
                .threads
                .iter()
                .map(|t| ThreadReport {
                    id: t.id(),
                    state: t.state(),
                    best: t.best().cloned(),
                    improvements: t.best_history().len(),
                    evaluations: t.evaluations(),
                    iterations_since_best: t.iterations_since_best(),
                    backtracks: t.backtrack_count() - 1,
                    tabu_size: t.tabu_len(),
                })
                .collect(),
        }
    }
}

impl Optimiser for TabuSearch {
    fn name(&self) -> &str {
        "tabu"
    }

    fn pending(&mut self) -> TbResult<Vec<ParameterPoint>> {
        self.pending_batch()
    }

    fn run_one_iteration(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> TbResult<Option<ParameterPoint>> {
        TabuSearch::run_one_iteration(self, params, score)
    }

    fn finished(&self) -> bool {
        TabuSearch::finished(self)
    }

    fn best(&self) -> Option<&ScoredPoint> {
        TabuSearch::best(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_types::TbError;

    fn wide_space(names: &[&str]) -> ParameterSpace {
        names
            .iter()
            .fold(ParameterSpace::new(), |space, name| space.add_int(*name, -10, 20))
    }

    fn value(space: &ParameterSpace, point: &ParameterPoint, name: &str) -> f64 {
        let index = point.get(name).unwrap();
        space.get(name).unwrap().value(index).unwrap().as_f64().unwrap()
    }

    fn quadratic(space: &ParameterSpace, point: &ParameterPoint) -> f64 {
        -["a", "b", "c"]
            .iter()
            .map(|name| (value(space, point, name) - 14.0).powi(2))
            .sum::<f64>()
    }

    fn sinusoidal(space: &ParameterSpace, point: &ParameterPoint) -> f64 {
        ["a", "b"]
            .iter()
            .map(|name| {
                let x = value(space, point, name);
                x.cos() - (x / 10.0).powi(2)
            })
            .sum()
    }

    fn lowest_corner(names: &[&str]) -> ParameterPoint {
        names.iter().map(|name| (*name, 0)).collect()
    }

    #[test]
    fn iterating_before_setup_fails() {
        let mut search = TabuSearch::new(wide_space(&["a"]), TabuConfig::default()).unwrap();
        let err = search.run_one_iteration(&lowest_corner(&["a"]), 1.0).unwrap_err();
        assert!(matches!(err, TbError::Search(SearchError::NotSetUp)));
        assert!(!search.finished());
        assert!(search.pending_batch().unwrap().is_empty());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let err = TabuSearch::new(wide_space(&["a"]), TabuConfig::default().with_threads(0))
            .unwrap_err();
        assert!(matches!(err, TbError::Config(_)));
        let err = TabuSearch::new(ParameterSpace::new(), TabuConfig::default()).unwrap_err();
        assert!(matches!(err, TbError::Search(SearchError::InvalidArgument { .. })));
    }

    #[test]
    fn single_start_seeds_the_first_thread() {
        let config = TabuConfig::default().with_threads(3).with_seed(1);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let start = ParameterPoint::new().with("a", 4).with("b", 9);
        let first = search.setup(start.clone()).unwrap();
        assert_eq!(first, start);
        assert_eq!(search.threads().len(), 3);

        let batch = search.pending_batch().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], start);
        for point in &batch[1..] {
            assert!(search.space().validate(point).is_ok());
        }
    }

    #[test]
    fn many_starts_seed_threads_pairwise() {
        let config = TabuConfig::default().with_threads(3).with_seed(2);
        let mut search = TabuSearch::new(wide_space(&["a"]), config).unwrap();
        let starts = vec![
            ParameterPoint::new().with("a", 1),
            ParameterPoint::new().with("a", 2),
        ];
        search.setup(starts.clone()).unwrap();
        let batch = search.pending_batch().unwrap();
        assert_eq!(&batch[..2], &starts[..]);
        assert!(search.space().validate(&batch[2]).is_ok());

        let out_of_range = vec![ParameterPoint::new().with("a", 99)];
        assert!(matches!(
            search.setup(out_of_range),
            Err(TbError::Search(SearchError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn results_are_delivered_round_robin() {
        let config = TabuConfig::default().with_threads(2).with_seed(3);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let first = search.setup(StartPoints::Random).unwrap();
        let second = search.pending_batch().unwrap()[1].clone();

        let wrong = search.run_one_iteration(&second, 1.0).unwrap_err();
        assert!(matches!(
            wrong,
            TbError::Search(SearchError::MismatchedParameters { .. })
        ));

        let next = search.run_one_iteration(&first, 1.0).unwrap();
        assert_eq!(next, Some(second.clone()));
        assert_eq!(search.active_thread(), 1);

        let next = search.run_one_iteration(&second, 2.0).unwrap().unwrap();
        assert_eq!(search.active_thread(), 0);
        assert_ne!(next, first);
        assert_eq!(search.best().and_then(|b| b.score), Some(2.0));
        assert_eq!(search.iterations(), 2);
    }

    #[test]
    fn independent_mode_finishes_once_agreement_settles() {
        let config = TabuConfig::default()
            .with_threads(2)
            .with_agreement_patience(3)
            .with_seed(4);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let start = ParameterPoint::new().with("a", 5).with("b", 5);
        let mut point = search.setup(vec![start.clone(), start]).unwrap();
        assert!(!search.finished());

        point = search.run_one_iteration(&point, 5.0).unwrap().unwrap();
        assert!(!search.finished());
        point = search.run_one_iteration(&point, 5.0).unwrap().unwrap();
        assert!(!search.finished());

        for _ in 0..5 {
            point = search.run_one_iteration(&point, 1.0).unwrap().unwrap();
            assert!(!search.finished());
        }
        search.run_one_iteration(&point, 1.0).unwrap();
        assert!(search.finished());
    }

    #[test]
    fn zero_patience_finishes_on_first_agreement() {
        let config = TabuConfig::default()
            .with_threads(2)
            .with_agreement_patience(0)
            .with_seed(5);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let start = ParameterPoint::new().with("a", 5).with("b", 5);
        let first = search.setup(vec![start.clone(), start]).unwrap();
        let second = search.run_one_iteration(&first, 5.0).unwrap().unwrap();
        assert!(!search.finished());
        search.run_one_iteration(&second, 5.0).unwrap();
        assert!(search.finished());
    }

    #[test]
    fn equal_scores_at_different_points_do_not_agree() {
        let config = TabuConfig::default()
            .with_threads(2)
            .with_agreement_patience(0)
            .with_seed(5);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let starts = vec![
            ParameterPoint::new().with("a", 4).with("b", 10),
            ParameterPoint::new().with("a", 10).with("b", 4),
        ];
        let first = search.setup(starts).unwrap();
        let second = search.run_one_iteration(&first, 5.0).unwrap().unwrap();
        search.run_one_iteration(&second, 5.0).unwrap();
        assert!(!search.finished());

        let config = TabuConfig::default()
            .with_threads(2)
            .with_agreement_patience(0)
            .with_seed(6);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let first = search.setup(StartPoints::Random).unwrap();
        let second = search.run_one_iteration(&first, 5.0).unwrap().unwrap();
        search.run_one_iteration(&second, 5.5).unwrap();
        assert!(!search.finished());
    }

    #[test]
    fn batches_keep_the_round_robin_contract() {
        let config = TabuConfig::default().with_threads(3).with_seed(6);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        search.setup(StartPoints::Random).unwrap();
        for round in 0..4 {
            let batch = search.pending_batch().unwrap();
            assert_eq!(batch.len(), 3);
            for (i, point) in batch.iter().enumerate() {
                let score = (round * 3 + i) as f64;
                search.run_one_iteration(point, score).unwrap();
            }
        }
        assert_eq!(search.iterations(), 12);
        assert_eq!(search.best().and_then(|b| b.score), Some(11.0));
    }

    #[test]
    fn tiny_space_is_exhausted() {
        let space = ParameterSpace::new().add_int("only", 0, 2);
        let config = TabuConfig::default()
            .with_mode(SearchMode::Adaptive)
            .with_seed(7);
        let mut search = TabuSearch::new(space, config).unwrap();
        let mut next = Some(search.setup(StartPoints::Random).unwrap());
        let mut evaluated = 0;
        while let Some(point) = next {
            evaluated += 1;
            next = search.run_one_iteration(&point, 1.0).unwrap();
        }
        assert_eq!(evaluated, 3);
        assert!(search.is_exhausted());
        assert!(search.pending_batch().unwrap().is_empty());
    }

    #[test]
    fn adaptive_mode_waits_for_full_windows() {
        let config = TabuConfig::default()
            .with_threads(2)
            .with_mode(SearchMode::Adaptive)
            .with_recent_window(5)
            .with_seed(8);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let mut next = search.setup(StartPoints::Random).ok();
        for _ in 0..10 {
            let point = next.unwrap();
            assert!(search.convergence_report().is_none());
            assert!(!search.finished());
            next = search.run_one_iteration(&point, 1.0).unwrap();
        }
        let report = search.convergence_report().unwrap();
        assert_eq!(report.pairs.len(), 1);
    }

    #[test]
    fn adaptive_single_thread_stops_after_a_stale_window() {
        let config = TabuConfig::default()
            .with_mode(SearchMode::Adaptive)
            .with_recent_window(4)
            .with_seed(9);
        let mut search = TabuSearch::new(wide_space(&["a", "b"]), config).unwrap();
        let mut next = search.setup(StartPoints::Random).ok();
        let mut iterations = 0;
        while !search.finished() {
            let point = next.unwrap();
            next = search.run_one_iteration(&point, 0.0).unwrap();
            iterations += 1;
        }
        // one improving result, then a full window without improvement
        assert_eq!(iterations, 5);
    }

    #[test]
    fn single_thread_converges_on_quadratic_optimum() {
        let space = wide_space(&["a", "b", "c"]);
        let config = TabuConfig::default()
            .with_mode(SearchMode::Adaptive)
            .with_seed(42);
        let mut search = TabuSearch::new(space.clone(), config).unwrap();
        let start = ParameterPoint::new().with("a", 10).with("b", 10).with("c", 10);
        let mut next = Some(search.setup(start).unwrap());

        for _ in 0..2000 {
            let Some(point) = next else { break };
            next = search
                .run_one_iteration(&point, quadratic(&space, &point))
                .unwrap();
            if search.best().and_then(|b| b.score) == Some(0.0) {
                break;
            }
        }

        let best = search.best().unwrap();
        assert_eq!(best.score, Some(0.0));
        for name in ["a", "b", "c"] {
            assert_eq!(value(&space, &best.parameters, name), 14.0);
        }
    }

    #[test]
    fn independent_threads_agree_on_global_optimum() {
        let space = wide_space(&["a", "b"]);
        for seed in 0..10 {
            let config = TabuConfig::default().with_threads(3).with_seed(seed);
            let mut search = TabuSearch::new(space.clone(), config).unwrap();
            let mut next = Some(search.setup(lowest_corner(&["a", "b"])).unwrap());

            let mut iterations = 0;
            while !search.finished() && iterations < 10_000 {
                let Some(point) = next else { break };
                next = search
                    .run_one_iteration(&point, sinusoidal(&space, &point))
                    .unwrap();
                iterations += 1;
            }

            assert!(search.finished(), "seed {seed} did not finish");
            for thread in search.threads() {
                assert_eq!(thread.best_score(), Some(2.0), "seed {seed}");
            }
            assert_eq!(search.best().and_then(|b| b.score), Some(2.0));
        }
    }

    #[test]
    fn exhausted_threads_cover_the_whole_space() {
        let space = wide_space(&["a"]).add_int("b", 0, 3);
        let config = TabuConfig::default().with_threads(2).with_seed(11);
        let mut search = TabuSearch::new(space, config).unwrap();
        let mut next = Some(search.setup(StartPoints::Random).unwrap());
        let mut evaluated = 0;
        while let Some(point) = next {
            next = search.run_one_iteration(&point, 0.0).unwrap();
            evaluated += 1;
        }
        assert!(search.is_exhausted());
        assert_eq!(evaluated, 2 * 31 * 4);
        for thread in search.threads() {
            assert_eq!(thread.tabu_len(), 31 * 4);
        }
    }

    #[test]
    fn report_serialises() {
        let config = TabuConfig::default().with_threads(2).with_seed(10);
        let mut search = TabuSearch::new(wide_space(&["a"]), config).unwrap();
        let first = search.setup(StartPoints::Random).unwrap();
        search.run_one_iteration(&first, 3.0).unwrap();

        let report = search.report();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.threads.len(), 2);
        assert_eq!(report.threads[0].improvements, 1);
        assert_eq!(report.threads[0].state, ThreadState::ReadyForNext);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "independent");
        assert_eq!(json["best"]["score"], 3.0);
    }
}
