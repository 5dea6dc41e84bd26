//! The request/response contract shared by every optimiser.

use tb_types::{ParameterPoint, ScoredPoint, TbResult};

/// An optimiser hands out candidates and learns from their scores.
///
/// Optimisers are set up through their own inherent methods; this trait
/// covers the loop that follows. Scores are always maximised.
pub trait Optimiser: Send + Sync {
    /// Human-readable optimiser name.
    fn name(&self) -> &str;

    /// Candidates awaiting a score, in the order their scores must be
    /// reported. Empty once nothing is left to evaluate.
    fn pending(&mut self) -> TbResult<Vec<ParameterPoint>>;

    /// Report the score of the next pending candidate and receive the one
    /// after it, or `None` when the optimiser has nothing left to offer.
    fn run_one_iteration(
        &mut self,
        params: &ParameterPoint,
        score: f64,
    ) -> TbResult<Option<ParameterPoint>>;

    fn finished(&self) -> bool;

    /// Best scored point so far.
    fn best(&self) -> Option<&ScoredPoint>;
}
