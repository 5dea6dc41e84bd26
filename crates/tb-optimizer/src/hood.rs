//! Neighbourhood generation.
//!
//! A [`Hood`] is the bounded set of candidate points generated around a
//! centre for one exploration round. Neighbours are drawn from one
//! [`Distribution`] per parameter and must not already be in the owning
//! trajectory's [`TabuSet`]. The tabu set is passed in on every call that
//! generates points; the hood never holds on to it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use tb_types::{invalid_argument, ParameterPoint, ParameterSpace, ScoredPoint, SearchError};

use crate::distribution::Distribution;
use crate::memory::TabuSet;

/// Size and sampling parameters of a hood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoodSettings {
    /// Number of neighbours generated per round.
    pub size: usize,
    /// Initial sd of every distribution, in index units.
    pub sd: f64,
    /// Loosen/tighten step as a proportion of each range's size.
    pub increment: f64,
    /// Tabu draws tolerated before the distributions are loosened.
    pub give_up: usize,
    /// Uniform random draws tried once loosening can go no further, before
    /// the space is scanned for an unvisited point. Zero disables both.
    pub fallback_attempts: usize,
}

impl Default for HoodSettings {
    fn default() -> Self {
        Self {
            size: 5,
            sd: 0.5,
            increment: 0.05,
            give_up: 10,
            fallback_attempts: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hood {
    space: Arc<ParameterSpace>,
    settings: HoodSettings,
    centre: ScoredPoint,
    /// Stack: the most recently generated neighbour is handed out first.
    neighbours: Vec<ParameterPoint>,
    best: Option<ScoredPoint>,
    round_best: Option<ScoredPoint>,
    distributions: BTreeMap<String, Distribution>,
    last_failures: usize,
}

impl Hood {
    /// Build a hood around `centre` and populate it.
    ///
    /// An unscored centre is recorded as tabu so that it is never generated
    /// again as a "new" neighbour.
    pub fn new<R: Rng + ?Sized>(
        centre: ScoredPoint,
        space: Arc<ParameterSpace>,
        settings: HoodSettings,
        tabu: &mut TabuSet,
        rng: &mut R,
    ) -> Result<Self, SearchError> {
        space.validate(&centre.parameters)?;
        if settings.give_up == 0 {
            return Err(invalid_argument!("give-up threshold must be at least 1"));
        }

        let mut distributions = BTreeMap::new();
        for range in space.ranges() {
            let index = centre_index(&centre, &range.name)?;
            let distribution =
                Distribution::new(index as f64, range.len(), settings.increment, settings.sd)?;
            distributions.insert(range.name.clone(), distribution);
        }

        if centre.score.is_none() {
            tabu.insert(centre.parameters.clone());
        }

        let mut hood = Self {
            space,
            settings,
            centre,
            neighbours: Vec::with_capacity(settings.size),
            best: None,
            round_best: None,
            distributions,
            last_failures: 0,
        };
        hood.populate(tabu, rng);
        Ok(hood)
    }

    pub fn centre(&self) -> &ScoredPoint {
        &self.centre
    }

    /// Best point accepted by [`update_best`](Self::update_best).
    pub fn best(&self) -> Option<&ScoredPoint> {
        self.best.as_ref()
    }

    /// Best-scoring neighbour (centre excluded) since the last `populate`,
    /// whether or not it beats the centre.
    pub fn round_best(&self) -> Option<&ScoredPoint> {
        self.round_best.as_ref()
    }

    pub fn neighbours(&self) -> &[ParameterPoint] {
        &self.neighbours
    }

    pub fn distributions(&self) -> &BTreeMap<String, Distribution> {
        &self.distributions
    }

    pub fn distribution(&self, name: &str) -> Option<&Distribution> {
        self.distributions.get(name)
    }

    pub fn settings(&self) -> &HoodSettings {
        &self.settings
    }

    /// Failed slots reported by the most recent `populate`.
    pub fn last_failures(&self) -> usize {
        self.last_failures
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterPoint {
        self.distributions
            .iter()
            .map(|(name, dist)| (name.clone(), dist.draw(rng)))
            .collect()
    }

    fn accept(&mut self, candidate: ParameterPoint, tabu: &mut TabuSet) -> bool {
        if tabu.contains(&candidate) {
            return false;
        }
        tabu.insert(candidate.clone());
        self.neighbours.push(candidate);
        true
    }

    /// Try to add one fresh, non-tabu neighbour.
    ///
    /// After `give_up` tabu draws every distribution is loosened before each
    /// further draw. Once none of them can loosen any more the slot is
    /// abandoned and `false` is returned.
    pub fn generate_neighbour<R: Rng + ?Sized>(
        &mut self,
        tabu: &mut TabuSet,
        rng: &mut R,
    ) -> bool {
        let mut attempts = 0;
        let mut can_loosen = true;
        loop {
            if attempts >= self.settings.give_up {
                can_loosen = self.loosen_all(1.0);
            }
            let candidate = self.draw(rng);
            attempts += 1;
            if self.accept(candidate, tabu) {
                return true;
            }
            if !can_loosen {
                debug!(
                    "Giving up on a neighbour of {} after {} tabu draws",
                    self.centre.parameters, attempts
                );
                return false;
            }
        }
    }

    /// Uniform random draws first, then a walk over the whole space from a
    /// random offset. A slot only fails here once every point of the space
    /// is tabu.
    fn fill_from_space<R: Rng + ?Sized>(&mut self, tabu: &mut TabuSet, rng: &mut R) -> bool {
        if self.settings.fallback_attempts == 0 {
            return false;
        }
        for _ in 0..self.settings.fallback_attempts {
            let Ok(candidate) = self.space.random_point(rng) else {
                return false;
            };
            if self.accept(candidate, tabu) {
                return true;
            }
        }
        self.scan_space(tabu, rng)
    }

    fn scan_space<R: Rng + ?Sized>(&mut self, tabu: &mut TabuSet, rng: &mut R) -> bool {
        let Some(total) = self.space.combinations() else {
            return false;
        };
        if total == 0 || tabu.len() >= total {
            return false;
        }
        let offset = rng.random_range(0..total);
        for n in (offset..total).chain(0..offset) {
            let Some(candidate) = self.space.point_at(n) else {
                return false;
            };
            if self.accept(candidate, tabu) {
                return true;
            }
        }
        false
    }

    /// Fill the hood up to its size and start a new round. Returns the
    /// number of slots that could not be filled; zero means a full hood.
    pub fn populate<R: Rng + ?Sized>(&mut self, tabu: &mut TabuSet, rng: &mut R) -> usize {
        self.round_best = None;
        let wanted = self.settings.size.saturating_sub(self.neighbours.len());
        let mut failures = 0;
        for _ in 0..wanted {
            if !self.generate_neighbour(tabu, rng) && !self.fill_from_space(tabu, rng) {
                failures += 1;
            }
        }
        if failures > 0 {
            debug!(
                "Hood around {} is short of {} of {} neighbours",
                self.centre.parameters, failures, self.settings.size
            );
        }
        self.last_failures = failures;
        failures
    }

    /// Offer a scored point. Returns whether it became the new best.
    ///
    /// The first scoring of an unscored centre always counts as an
    /// improvement and also gives the centre its score. Any other point has
    /// to beat both the centre and the current best.
    pub fn update_best(&mut self, candidate: &ScoredPoint) -> Result<bool, SearchError> {
        self.space.validate(&candidate.parameters)?;
        let Some(score) = candidate.score else {
            return Err(invalid_argument!(
                "candidate {} has no score",
                candidate.parameters
            ));
        };

        let is_centre = candidate.parameters == self.centre.parameters;
        if !is_centre && candidate.beats(self.round_best.as_ref().and_then(|b| b.score)) {
            self.round_best = Some(candidate.clone());
        }

        if is_centre && self.centre.score.is_none() {
            self.best = Some(candidate.clone());
            self.centre.score = Some(score);
            return Ok(true);
        }

        let best_score = self.best.as_ref().and_then(|b| b.score);
        if candidate.beats(self.centre.score) && candidate.beats(best_score) {
            self.best = Some(candidate.clone());
            return Ok(true);
        }
        Ok(false)
    }

    /// Move the hood to a scored centre. Distribution means follow the new
    /// centre; their sds are left alone.
    pub fn set_new_centre(&mut self, centre: ScoredPoint) -> Result<(), SearchError> {
        if centre.score.is_none() {
            return Err(invalid_argument!(
                "centre {} has no score",
                centre.parameters
            ));
        }
        self.space.validate(&centre.parameters)?;
        for (name, dist) in self.distributions.iter_mut() {
            dist.recentre(centre_index(&centre, name)? as f64)?;
        }
        debug!("Hood recentred on {}", centre.parameters);
        self.centre = centre;
        Ok(())
    }

    /// Loosen every distribution. Returns whether any of them could.
    pub fn loosen_all(&mut self, factor: f64) -> bool {
        let mut loosened = false;
        for dist in self.distributions.values_mut() {
            loosened |= dist.loosen(factor);
        }
        loosened
    }

    /// Tighten every distribution. Returns whether all are now at minimum.
    pub fn tighten_all(&mut self, factor: f64) -> bool {
        let mut at_minimum = true;
        for dist in self.distributions.values_mut() {
            at_minimum &= dist.tighten(factor);
        }
        at_minimum
    }

    /// Pop the most recently generated neighbour.
    pub fn next(&mut self) -> Option<ParameterPoint> {
        self.neighbours.pop()
    }

    /// True when no neighbours are left.
    pub fn is_last(&self) -> bool {
        self.neighbours.is_empty()
    }
}

fn centre_index(centre: &ScoredPoint, name: &str) -> Result<usize, SearchError> {
    centre
        .parameters
        .get(name)
        .ok_or_else(|| invalid_argument!("centre {} has no index for {name}", centre.parameters))
}
