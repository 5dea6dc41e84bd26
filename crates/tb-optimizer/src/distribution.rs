//! Per-parameter sampling model.
//!
//! A [`Distribution`] is a normal distribution over the *indices* of one
//! parameter range. The set of distributions owned by a hood together form
//! its probabilistic neighbourhood structure: loosening widens the region
//! that neighbours are drawn from, tightening narrows it.

use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::Serialize;

use tb_types::{invalid_argument, SearchError};

/// Upper bound on sd as a fraction of the range size.
pub const MAX_SD_PROPORTION: f64 = 0.66;
/// Lower bound on sd, in index units.
pub const MIN_SD: f64 = 0.5;
/// Tightening is skipped once sd is this small.
const TIGHTEN_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    mean: f64,
    sd: f64,
    maxsd: f64,
    minsd: f64,
    increment: f64,
    size: usize,
    #[serde(skip)]
    normal: Normal<f64>,
}

impl Distribution {
    /// Create a distribution centred on index `mean` of a range with `size`
    /// values. `increment` is the loosen/tighten step as a proportion of
    /// `size`. `sd` is clamped into `[MIN_SD, size * MAX_SD_PROPORTION]`.
    pub fn new(mean: f64, size: usize, increment: f64, sd: f64) -> Result<Self, SearchError> {
        if size == 0 {
            return Err(invalid_argument!("distribution range must not be empty"));
        }
        if !increment.is_finite() || increment <= 0.0 {
            return Err(invalid_argument!(
                "sd increment proportion must be positive, got {increment}"
            ));
        }
        let maxsd = size as f64 * MAX_SD_PROPORTION;
        let sd = Self::checked(mean, sd)?.clamp(MIN_SD, maxsd);
        Ok(Self {
            mean,
            sd,
            maxsd,
            minsd: MIN_SD,
            increment,
            size,
            normal: Self::generate(mean, sd)?,
        })
    }

    fn checked(mean: f64, sd: f64) -> Result<f64, SearchError> {
        if !mean.is_finite() || !sd.is_finite() {
            return Err(invalid_argument!(
                "generation of distribution with mean: {mean}, sd: {sd} failed"
            ));
        }
        Ok(sd)
    }

    fn generate(mean: f64, sd: f64) -> Result<Normal<f64>, SearchError> {
        Normal::new(mean, sd).map_err(|e| {
            invalid_argument!("generation of distribution with mean: {mean}, sd: {sd} failed: {e}")
        })
    }

    fn limit_sd(&mut self) {
        self.sd = self.sd.clamp(self.minsd, self.maxsd);
    }

    fn regenerate(&mut self) {
        // mean is finite and sd sits in [minsd, maxsd], both checked on entry
        if let Ok(normal) = Self::generate(self.mean, self.sd) {
            self.normal = normal;
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sd(&self) -> f64 {
        self.sd
    }

    pub fn maxsd(&self) -> f64 {
        self.maxsd
    }

    pub fn minsd(&self) -> f64 {
        self.minsd
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Replace mean and sd.
    pub fn update(&mut self, mean: f64, sd: f64) -> Result<(), SearchError> {
        let sd = Self::checked(mean, sd)?;
        self.mean = mean;
        self.sd = sd;
        self.limit_sd();
        self.regenerate();
        Ok(())
    }

    /// Move the mean, keeping the current sd.
    pub fn recentre(&mut self, mean: f64) -> Result<(), SearchError> {
        self.update(mean, self.sd)
    }

    /// Widen the distribution by `factor` increments. Returns whether sd was
    /// below its maximum beforehand; `false` means it was already as loose as
    /// it can get.
    pub fn loosen(&mut self, factor: f64) -> bool {
        let can_loosen = self.sd < self.maxsd;
        self.sd += self.increment * factor * self.size as f64;
        self.limit_sd();
        self.regenerate();
        can_loosen
    }

    /// Narrow the distribution by `factor` increments. Returns whether sd is
    /// now at its minimum.
    pub fn tighten(&mut self, factor: f64) -> bool {
        if self.sd > TIGHTEN_FLOOR {
            self.sd -= self.increment * factor * self.size as f64;
        }
        self.limit_sd();
        self.regenerate();
        self.sd == self.minsd
    }

    pub fn set_sd_to_min(&mut self) {
        self.sd = self.minsd;
        self.regenerate();
    }

    pub fn set_sd_to_max(&mut self) {
        self.sd = self.maxsd;
        self.regenerate();
    }

    /// Draw an index. The rounded sample is folded back into `[0, size)` by
    /// reflecting off both edges: below zero about 0, above the top about
    /// `size - 0.5`. Composing the two reflections is a translation by
    /// `2 * size - 1`, so the fold is a single modulo.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r = self.normal.sample(rng).round() as i64;
        fold_into_range(r, self.size)
    }
}

/// Closed-form reflection of `r` into `[0, size)`.
pub(crate) fn fold_into_range(r: i64, size: usize) -> usize {
    let size = size as i64;
    let period = 2 * size - 1;
    let m = r.rem_euclid(period);
    if m < size {
        m as usize
    } else {
        (period - m) as usize
    }
}
