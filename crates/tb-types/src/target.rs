//! Target definitions: the parameter ranges of the pipeline being tuned.
//!
//! A definition is a small JSON document:
//!
//! ```json
//! {
//!   "name": "assembler",
//!   "parameter_ranges": {
//!     "kmer": { "min": 21, "max": 61, "step": 10 },
//!     "mode": ["fast", "careful"]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{TargetError, TbResult};
use crate::space::{ParameterRange, ParameterSpace, ParameterValue};

/// How one parameter's legal values are written down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeSpec {
    /// An explicit list of values. Listed first so that a JSON array is
    /// never read positionally as `Stepped`.
    Values(Vec<ParameterValue>),
    /// Evenly stepped numeric range, both ends inclusive.
    Stepped {
        min: f64,
        max: f64,
        #[serde(default = "default_step")]
        step: f64,
    },
}

/// Largest number of values a stepped range may expand to.
pub const MAX_STEPPED_VALUES: usize = 1_000_000;

fn default_step() -> f64 {
    1.0
}

impl RangeSpec {
    fn to_range(&self, name: &str) -> Result<ParameterRange, TargetError> {
        let values = match self {
            Self::Values(values) => values.clone(),
            Self::Stepped { min, max, step } => {
                if !step.is_finite() || *step <= 0.0 {
                    return Err(TargetError::InvalidStep {
                        parameter: name.to_string(),
                        step: *step,
                    });
                }
                let integral = min.fract() == 0.0 && step.fract() == 0.0;
                let last = ((max - min) / step + 1e-9).floor();
                if last.is_finite() && last + 1.0 > MAX_STEPPED_VALUES as f64 {
                    return Err(TargetError::TooManyValues {
                        parameter: name.to_string(),
                        count: last + 1.0,
                        limit: MAX_STEPPED_VALUES,
                    });
                }
                if !last.is_finite() || last < 0.0 {
                    Vec::new()
                } else {
                    (0..=last as usize)
                        .map(|i| {
                            let value = min + i as f64 * step;
                            if integral {
                                ParameterValue::Int(value as i64)
                            } else {
                                ParameterValue::Float(value)
                            }
                        })
                        .collect()
                }
            }
        };
        if values.is_empty() {
            return Err(TargetError::EmptyRange {
                parameter: name.to_string(),
            });
        }
        Ok(ParameterRange::new(name, values))
    }
}

/// A named target and the ranges of every parameter it accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameter_ranges: BTreeMap<String, RangeSpec>,
}

impl TargetDefinition {
    pub fn from_json_str(json: &str) -> TbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> TbResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Expand every range spec into a [`ParameterSpace`].
    pub fn to_space(&self) -> TbResult<ParameterSpace> {
        if self.parameter_ranges.is_empty() {
            return Err(TargetError::NoParameters {
                name: self.name.clone(),
            }
            .into());
        }
        let mut space = ParameterSpace::new();
        for (name, spec) in &self.parameter_ranges {
            space = space.add_range(spec.to_range(name)?);
        }
        Ok(space)
    }
}
