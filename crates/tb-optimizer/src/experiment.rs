//! Experiment tracking: drive an optimiser against an objective.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use tb_types::{invalid_argument, ParameterPoint, ParameterSpace, TbResult};

use crate::objective::{Objective, ResolvedParameters};
use crate::optimiser::Optimiser;

/// Unique experiment identifier.
pub type ExperimentId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// Optimisers always maximise; minimising negates the objective.
    pub fn to_search_score(self, objective: f64) -> f64 {
        match self {
            Self::Maximize => objective,
            Self::Minimize => -objective,
        }
    }

    pub fn improves(self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Maximize => candidate > current,
            Self::Minimize => candidate < current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub id: ExperimentId,
    pub name: String,
    pub description: String,

    /// Maximum number of objective evaluations.
    pub max_iterations: usize,

    pub direction: ObjectiveDirection,

    pub created_at: DateTime<Utc>,
}

impl ExperimentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            max_iterations: 1000,
            direction: ObjectiveDirection::Maximize,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The optimiser reported itself finished.
    Finished,
    /// The optimiser ran out of candidates.
    Exhausted,
    /// `max_iterations` evaluations were spent.
    IterationLimit,
}

/// One scored evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    pub experiment_id: ExperimentId,
    pub number: usize,
    pub parameters: ParameterPoint,
    pub values: ResolvedParameters,
    /// Raw objective value, before any direction adjustment.
    pub objective: f64,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    pub id: ExperimentId,
    pub config: ExperimentConfig,
    pub state: ExperimentState,
    pub trials_completed: usize,
    pub best_trial: Option<TrialRecord>,
    pub stop_reason: Option<StopReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExperimentStatus {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            id: config.id,
            config,
            state: ExperimentState::Pending,
            trials_completed: 0,
            best_trial: None,
            stop_reason: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = ExperimentState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, reason: StopReason) {
        self.state = ExperimentState::Completed;
        self.stop_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = ExperimentState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Update the best trial if `trial` improves on it. Returns whether it did.
    pub fn update_best(&mut self, trial: &TrialRecord) -> bool {
        let improves = match &self.best_trial {
            None => true,
            Some(best) => self
                .config
                .direction
                .improves(trial.objective, best.objective),
        };
        if improves {
            self.best_trial = Some(trial.clone());
        }
        improves
    }
}

/// Runs an optimiser to completion against one objective, keeping a record
/// of every evaluation.
///
/// The optimiser must already be set up: the first candidates are taken
/// from [`Optimiser::pending`].
#[derive(Debug)]
pub struct Experiment {
    space: Arc<ParameterSpace>,
    status: ExperimentStatus,
    trials: Vec<TrialRecord>,
}

impl Experiment {
    pub fn new(config: ExperimentConfig, space: Arc<ParameterSpace>) -> Self {
        Self {
            space,
            status: ExperimentStatus::new(config),
            trials: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.status.config
    }

    pub fn status(&self) -> &ExperimentStatus {
        &self.status
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Score candidates one at a time.
    pub fn run<O>(
        &mut self,
        optimiser: &mut O,
        objective: &dyn Objective,
    ) -> TbResult<&ExperimentStatus>
    where
        O: Optimiser + ?Sized,
    {
        self.start(optimiser.name(), objective.name());
        let outcome = self.drive_sequential(optimiser, objective);
        self.finish(outcome)
    }

    /// Score each pending batch concurrently, then report the scores back in
    /// batch order.
    pub fn run_parallel<O>(
        &mut self,
        optimiser: &mut O,
        objective: &dyn Objective,
    ) -> TbResult<&ExperimentStatus>
    where
        O: Optimiser + ?Sized,
    {
        self.start(optimiser.name(), objective.name());
        let outcome = self.drive_parallel(optimiser, objective);
        self.finish(outcome)
    }

    fn start(&mut self, optimiser: &str, objective: &str) {
        self.status.mark_running();
        info!(
            "Starting experiment {} ({}): {} optimiser on {} objective, up to {} evaluations",
            self.status.config.name,
            self.status.id,
            optimiser,
            objective,
            self.status.config.max_iterations
        );
    }

    fn finish(&mut self, outcome: TbResult<StopReason>) -> TbResult<&ExperimentStatus> {
        match outcome {
            Ok(reason) => {
                self.status.mark_completed(reason);
                info!(
                    "Experiment {} stopped ({:?}) after {} evaluations, best objective {:?}",
                    self.status.config.name,
                    reason,
                    self.trials.len(),
                    self.status.best_trial.as_ref().map(|t| t.objective)
                );
                Ok(&self.status)
            }
            Err(e) => {
                error!("Experiment {} failed: {}", self.status.config.name, e);
                self.status.mark_failed(e.to_string());
                Err(e)
            }
        }
    }

    fn budget_left(&self) -> usize {
        self.status
            .config
            .max_iterations
            .saturating_sub(self.trials.len())
    }

    fn drive_sequential<O>(
        &mut self,
        optimiser: &mut O,
        objective: &dyn Objective,
    ) -> TbResult<StopReason>
    where
        O: Optimiser + ?Sized,
    {
        let mut next = optimiser.pending()?.into_iter().next();
        loop {
            if optimiser.finished() {
                return Ok(StopReason::Finished);
            }
            if self.budget_left() == 0 {
                return Ok(StopReason::IterationLimit);
            }
            let Some(point) = next else {
                return Ok(StopReason::Exhausted);
            };
            let values = self.space.resolve(&point)?;
            let value = objective.evaluate(&values)?;
            let score = self.record(point.clone(), values, value)?;
            next = optimiser.run_one_iteration(&point, score)?;
        }
    }

    fn drive_parallel<O>(
        &mut self,
        optimiser: &mut O,
        objective: &dyn Objective,
    ) -> TbResult<StopReason>
    where
        O: Optimiser + ?Sized,
    {
        loop {
            if optimiser.finished() {
                return Ok(StopReason::Finished);
            }
            let budget = self.budget_left();
            if budget == 0 {
                return Ok(StopReason::IterationLimit);
            }
            let mut batch = optimiser.pending()?;
            if batch.is_empty() {
                return Ok(StopReason::Exhausted);
            }
            batch.truncate(budget);

            let resolved = batch
                .iter()
                .map(|point| self.space.resolve(point))
                .collect::<Result<Vec<_>, _>>()?;
            let scores: Vec<TbResult<f64>> = resolved
                .par_iter()
                .map(|values| objective.evaluate(values))
                .collect();

            for ((point, values), value) in batch.into_iter().zip(resolved).zip(scores) {
                let score = self.record(point.clone(), values, value?)?;
                optimiser.run_one_iteration(&point, score)?;
            }
        }
    }

    /// Store a trial and return the score to hand to the optimiser.
    fn record(
        &mut self,
        parameters: ParameterPoint,
        values: ResolvedParameters,
        objective: f64,
    ) -> TbResult<f64> {
        if !objective.is_finite() {
            return Err(invalid_argument!(
                "objective returned {objective} for {parameters}"
            )
            .into());
        }
        let trial = TrialRecord {
            id: Uuid::new_v4(),
            experiment_id: self.status.id,
            number: self.trials.len(),
            parameters,
            values,
            objective,
            evaluated_at: Utc::now(),
        };
        if self.status.update_best(&trial) {
            info!(
                "Trial {} improved the best objective to {} at {}",
                trial.number, trial.objective, trial.parameters
            );
        }
        self.trials.push(trial);
        self.status.trials_completed = self.trials.len();
        Ok(self.status.config.direction.to_search_score(objective))
    }
}
