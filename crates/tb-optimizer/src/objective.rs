//! Scoring functions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tb_types::{invalid_argument, ParameterValue, TbResult};

/// Parameter values as the scoring function sees them.
pub type ResolvedParameters = BTreeMap<String, ParameterValue>;

/// Scores one resolved parameter set. Implementations must be callable
/// from several threads at once.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, parameters: &ResolvedParameters) -> TbResult<f64>;
}

/// Adapts a closure into an [`Objective`].
pub struct FnObjective<F> {
    name: String,
    f: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&ResolvedParameters) -> TbResult<f64> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&ResolvedParameters) -> TbResult<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, parameters: &ResolvedParameters) -> TbResult<f64> {
        (self.f)(parameters)
    }
}

/// Built-in test functions over numeric parameters. Both are maximised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Benchmark {
    /// `-Σ (x - optimum)²`, peaking at zero with every parameter at `optimum`.
    Quadratic { optimum: f64 },
    /// `Σ cos(x) - (x / 10)²`: a damped multimodal surface whose global
    /// maximum sits at the origin.
    Sinusoidal,
}

impl Default for Benchmark {
    fn default() -> Self {
        Self::Sinusoidal
    }
}

fn numeric(name: &str, value: &ParameterValue) -> TbResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| invalid_argument!("parameter {name} has non-numeric value {value}").into())
}

impl Objective for Benchmark {
    fn name(&self) -> &str {
        match self {
            Self::Quadratic { .. } => "quadratic",
            Self::Sinusoidal => "sinusoidal",
        }
    }

    fn evaluate(&self, parameters: &ResolvedParameters) -> TbResult<f64> {
        let mut total = 0.0;
        for (name, value) in parameters {
            let x = numeric(name, value)?;
            total += match self {
                Self::Quadratic { optimum } => -(x - optimum).powi(2),
                Self::Sinusoidal => x.cos() - (x / 10.0).powi(2),
            };
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_types::TbError;

    fn params(values: &[(&str, i64)]) -> ResolvedParameters {
        values
            .iter()
            .map(|(name, v)| (name.to_string(), ParameterValue::Int(*v)))
            .collect()
    }

    #[test]
    fn quadratic_peaks_at_the_optimum() {
        let quad = Benchmark::Quadratic { optimum: 14.0 };
        assert_eq!(quad.evaluate(&params(&[("a", 14), ("b", 14)])).unwrap(), 0.0);
        assert_eq!(quad.evaluate(&params(&[("a", 12), ("b", 15)])).unwrap(), -5.0);
    }

    #[test]
    fn sinusoidal_peaks_at_the_origin() {
        let sin = Benchmark::Sinusoidal;
        let peak = sin.evaluate(&params(&[("a", 0), ("b", 0)])).unwrap();
        assert_eq!(peak, 2.0);
        for a in -10..=20 {
            for b in -10..=20 {
                assert!(sin.evaluate(&params(&[("a", a), ("b", b)])).unwrap() <= peak);
            }
        }
    }

    #[test]
    fn categorical_values_are_rejected() {
        let mut values = params(&[("a", 1)]);
        values.insert("mode".into(), ParameterValue::Json(serde_json::json!("fast")));
        let err = Benchmark::Sinusoidal.evaluate(&values).unwrap_err();
        assert!(matches!(err, TbError::Search(_)));
    }

    #[test]
    fn closures_become_objectives() {
        let objective = FnObjective::new("sum", |p: &ResolvedParameters| {
            Ok(p.values().filter_map(ParameterValue::as_f64).sum())
        });
        assert_eq!(objective.name(), "sum");
        assert_eq!(objective.evaluate(&params(&[("a", 2), ("b", 3)])).unwrap(), 5.0);
    }

    #[test]
    fn benchmark_from_json() {
        let quad: Benchmark =
            serde_json::from_str(r#"{"kind": "quadratic", "optimum": 3.5}"#).unwrap();
        assert_eq!(quad, Benchmark::Quadratic { optimum: 3.5 });
        let sin: Benchmark = serde_json::from_str(r#"{"kind": "sinusoidal"}"#).unwrap();
        assert_eq!(sin, Benchmark::Sinusoidal);
    }
}
