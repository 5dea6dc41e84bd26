//! # tb-optimizer
//!
//! Parameter search orchestration for Tunebox.
//!
//! The centrepiece is [`TabuSearch`], an adaptive tabu search over discrete
//! parameter spaces: each trajectory samples neighbourhoods from per-parameter
//! normal distributions, remembers every point it has visited, and widens or
//! narrows its sampling as the search crowds or stalls. Several trajectories
//! run in round-robin turns and the search stops when they agree, either on
//! the same optimum or by a pairwise statistical test.
//!
//! [`ParameterSweep`] provides exhaustive enumeration behind the same
//! [`Optimiser`] contract, and [`Experiment`] drives either one against an
//! [`Objective`].

mod config;
mod convergence;
mod distribution;
mod experiment;
mod hood;
mod memory;
mod objective;
mod optimiser;
pub mod stats;
mod sweep;
mod tabu;
mod thread;
mod window;

pub use config::{SearchMode, TabuConfig};
pub use convergence::{
    ConvergenceReport, ConvergenceTest, Levene, MannWhitneyU, PairOutcome, SampleComparison,
};
pub use distribution::{Distribution, MAX_SD_PROPORTION, MIN_SD};
pub use experiment::{
    Experiment, ExperimentConfig, ExperimentId, ExperimentState, ExperimentStatus,
    ObjectiveDirection, StopReason, TrialRecord,
};
pub use hood::{Hood, HoodSettings};
pub use memory::TabuSet;
pub use objective::{Benchmark, FnObjective, Objective, ResolvedParameters};
pub use optimiser::Optimiser;
pub use sweep::ParameterSweep;
pub use tabu::{SearchReport, StartPoints, TabuSearch, ThreadReport};
pub use thread::{SearchThread, ThreadState};
pub use window::ScoreWindow;
