//! Discretised parameter spaces and the points that index into them.
//!
//! Search state never stores parameter values directly. A [`ParameterPoint`]
//! holds one index per parameter into that parameter's [`ParameterRange`], and
//! the [`ParameterSpace`] resolves indices back to concrete values only at the
//! boundary where a candidate is handed to the scoring function.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::SearchError;
use crate::invalid_argument;

/// A concrete parameter value stored in a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// The ordered, immutable list of legal values for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    /// Parameter name (e.g. "kmer_size").
    pub name: String,
    /// Legal values, addressed by index.
    pub values: Vec<ParameterValue>,
}

impl ParameterRange {
    pub fn new(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Integer range [low, high] inclusive.
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self::int_step(name, low, high, 1)
    }

    /// Integer range [low, high] inclusive, every `step`-th value.
    pub fn int_step(name: impl Into<String>, low: i64, high: i64, step: usize) -> Self {
        let values = (low..=high)
            .step_by(step.max(1))
            .map(ParameterValue::Int)
            .collect();
        Self::new(name, values)
    }

    /// `steps` evenly spaced floats covering [low, high].
    pub fn float_steps(name: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        let values = match steps {
            0 => Vec::new(),
            1 => vec![ParameterValue::Float(low)],
            _ => (0..steps)
                .map(|i| {
                    let t = i as f64 / (steps - 1) as f64;
                    ParameterValue::Float(low + t * (high - low))
                })
                .collect(),
        };
        Self::new(name, values)
    }

    /// Categorical choices.
    pub fn choice(name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::new(name, values.into_iter().map(ParameterValue::Json).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&ParameterValue> {
        self.values.get(index)
    }

    pub fn index_of(&self, value: &ParameterValue) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// One index per parameter name. Used as the tabu-set key, so equality and
/// hashing are structural.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPoint(BTreeMap<String, usize>);

impl ParameterPoint {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, index: usize) -> Self {
        self.0.insert(name.into(), index);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, index: usize) -> Option<usize> {
        self.0.insert(name.into(), index)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, usize)> for ParameterPoint {
    fn from_iter<I: IntoIterator<Item = (K, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, index)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {index}")?;
        }
        write!(f, "}}")
    }
}

/// A point plus its score. `score == None` means "not yet evaluated".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub parameters: ParameterPoint,
    pub score: Option<f64>,
}

impl ScoredPoint {
    pub fn unscored(parameters: ParameterPoint) -> Self {
        Self {
            parameters,
            score: None,
        }
    }

    pub fn scored(parameters: ParameterPoint, score: f64) -> Self {
        Self {
            parameters,
            score: Some(score),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    /// True when this point has a score strictly greater than `other`'s, or
    /// `other` has none.
    pub fn beats(&self, other: Option<f64>) -> bool {
        match (self.score, other) {
            (Some(mine), Some(theirs)) => mine > theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// The full search space: every parameter's range, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    ranges: BTreeMap<String, ParameterRange>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    pub fn add_range(mut self, range: ParameterRange) -> Self {
        self.ranges.insert(range.name.clone(), range);
        self
    }

    pub fn add_values(self, name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        self.add_range(ParameterRange::new(name, values))
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add_range(ParameterRange::int(name, low, high))
    }

    pub fn add_int_step(self, name: impl Into<String>, low: i64, high: i64, step: usize) -> Self {
        self.add_range(ParameterRange::int_step(name, low, high, step))
    }

    pub fn add_float_steps(
        self,
        name: impl Into<String>,
        low: f64,
        high: f64,
        steps: usize,
    ) -> Self {
        self.add_range(ParameterRange::float_steps(name, low, high, steps))
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.add_range(ParameterRange::choice(name, values))
    }

    pub fn get(&self, name: &str) -> Option<&ParameterRange> {
        self.ranges.get(name)
    }

    pub fn ranges(&self) -> impl Iterator<Item = &ParameterRange> {
        self.ranges.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of distinct points (`None` on overflow).
    pub fn combinations(&self) -> Option<usize> {
        self.ranges
            .values()
            .try_fold(1usize, |total, range| total.checked_mul(range.len()))
    }

    /// The `n`th point in enumeration order, with the first parameter (by
    /// name) varying slowest. `None` once `n` passes the last point.
    pub fn point_at(&self, n: usize) -> Option<ParameterPoint> {
        if n >= self.combinations()? {
            return None;
        }
        let mut remainder = n;
        let mut point = ParameterPoint::new();
        for range in self.ranges.values().rev() {
            point.insert(range.name.clone(), remainder % range.len());
            remainder /= range.len();
        }
        Some(point)
    }

    /// Every space must have at least one parameter and no empty range.
    pub fn validate_ranges(&self) -> Result<(), SearchError> {
        if self.ranges.is_empty() {
            return Err(invalid_argument!("parameter space has no parameters"));
        }
        if let Some(range) = self.ranges.values().find(|r| r.is_empty()) {
            return Err(invalid_argument!("parameter range {} has no values", range.name));
        }
        Ok(())
    }

    /// Check a single index against its range, returning the range size.
    pub fn check_index(&self, name: &str, index: usize) -> Result<usize, SearchError> {
        let range = self.ranges.get(name).ok_or_else(|| SearchError::UnknownParameter {
            parameter: name.to_string(),
        })?;
        if index >= range.len() {
            return Err(SearchError::OutOfRange {
                parameter: name.to_string(),
                index,
                size: range.len(),
            });
        }
        Ok(range.len())
    }

    /// Every index must be in range and every parameter must be present.
    pub fn validate(&self, point: &ParameterPoint) -> Result<(), SearchError> {
        for (name, index) in point.iter() {
            self.check_index(name, index)?;
        }
        if let Some(missing) = self.names().find(|name| point.get(name).is_none()) {
            return Err(invalid_argument!("point {point} has no index for parameter {missing}"));
        }
        Ok(())
    }

    /// Uniformly random index for every parameter.
    pub fn random_point<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<ParameterPoint, SearchError> {
        self.validate_ranges()?;
        Ok(self
            .ranges
            .iter()
            .map(|(name, range)| (name.clone(), rng.random_range(0..range.len())))
            .collect())
    }

    /// Translate indices into the concrete values the scoring function sees.
    pub fn resolve(
        &self,
        point: &ParameterPoint,
    ) -> Result<BTreeMap<String, ParameterValue>, SearchError> {
        self.validate(point)?;
        let mut values = BTreeMap::new();
        for (name, index) in point.iter() {
            if let Some(value) = self.ranges.get(name).and_then(|r| r.value(index)) {
                values.insert(name.to_string(), value.clone());
            }
        }
        Ok(values)
    }

    /// Reverse of [`resolve`](Self::resolve): locate each value in its range.
    pub fn locate(
        &self,
        values: &BTreeMap<String, ParameterValue>,
    ) -> Result<ParameterPoint, SearchError> {
        let mut point = ParameterPoint::new();
        for (name, value) in values {
            let range = self.ranges.get(name).ok_or_else(|| SearchError::UnknownParameter {
                parameter: name.clone(),
            })?;
            let index = range
                .index_of(value)
                .ok_or_else(|| invalid_argument!("value {value} is not in range {name}"))?;
            point.insert(name.clone(), index);
        }
        self.validate(&point)?;
        Ok(point)
    }
}
