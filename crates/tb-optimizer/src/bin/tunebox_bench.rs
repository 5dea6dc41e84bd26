//! Run an optimiser against a built-in benchmark objective.
//!
//! Usage: `tunebox-bench [run.json]`
//!
//! Without a run file, three independent tabu trajectories search a 2-D
//! damped sinusoid.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tb_optimizer::{
    Benchmark, Experiment, ExperimentConfig, ExperimentStatus, ObjectiveDirection,
    ParameterSweep, StartPoints, TabuConfig, TabuSearch,
};
use tb_types::{RangeSpec, TargetDefinition};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Strategy {
    #[default]
    Tabu,
    Sweep,
}

#[derive(Debug, Deserialize)]
struct RunFile {
    target: TargetDefinition,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    tabu: TabuConfig,
    #[serde(default)]
    benchmark: Benchmark,
    #[serde(default)]
    direction: ObjectiveDirection,
    #[serde(default = "default_max_iterations")]
    max_iterations: usize,
    #[serde(default)]
    parallel: bool,
}

fn default_max_iterations() -> usize {
    10_000
}

impl RunFile {
    fn demo() -> Self {
        let axis = RangeSpec::Stepped {
            min: -10.0,
            max: 20.0,
            step: 1.0,
        };
        let parameter_ranges: BTreeMap<String, RangeSpec> = ["a", "b"]
            .iter()
            .map(|name| (name.to_string(), axis.clone()))
            .collect();
        Self {
            target: TargetDefinition {
                name: "sinusoidal-demo".to_string(),
                description: "damped cosine surface, maximum 2.0 at the origin".to_string(),
                parameter_ranges,
            },
            strategy: Strategy::Tabu,
            tabu: TabuConfig::default().with_threads(3),
            benchmark: Benchmark::Sinusoidal,
            direction: ObjectiveDirection::Maximize,
            max_iterations: default_max_iterations(),
            parallel: true,
        }
    }

    fn load(path: &str) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading run file {path}"))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing run file {path}"))
    }
}

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn execute(run: RunFile) -> Result<ExperimentStatus> {
    let space = run.target.to_space()?;
    let config = ExperimentConfig::new(run.target.name.clone())
        .with_description(run.target.description.clone())
        .with_max_iterations(run.max_iterations)
        .with_direction(run.direction);
    let mut experiment = Experiment::new(config, Arc::new(space.clone()));

    match run.strategy {
        Strategy::Tabu => {
            let mut search = TabuSearch::new(space, run.tabu)?;
            search.setup(StartPoints::Random)?;
            let status = if run.parallel {
                experiment.run_parallel(&mut search, &run.benchmark)?
            } else {
                experiment.run(&mut search, &run.benchmark)?
            };
            let status = status.clone();
            info!("Search report: {}", serde_json::to_string(&search.report())?);
            Ok(status)
        }
        Strategy::Sweep => {
            let mut sweep = ParameterSweep::new(space)?;
            sweep.setup();
            Ok(experiment.run(&mut sweep, &run.benchmark)?.clone())
        }
    }
}

fn main() -> Result<()> {
    enable_tracing();

    let run_file = match std::env::args().nth(1) {
        Some(path) => RunFile::load(&path)?,
        None => RunFile::demo(),
    };
    info!(
        "Running {:?} on target {} with {:?} benchmark",
        run_file.strategy, run_file.target.name, run_file.benchmark
    );

    let status = execute(run_file)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
