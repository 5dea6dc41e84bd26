//! Tabu memory for one trajectory.

use std::collections::HashSet;

use tb_types::ParameterPoint;

/// Every point a trajectory has generated or scored. Grows monotonically;
/// nothing is ever forgotten.
#[derive(Debug, Clone, Default)]
pub struct TabuSet {
    visited: HashSet<ParameterPoint>,
}

impl TabuSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a point. Returns `false` if it was already tabu.
    pub fn insert(&mut self, point: ParameterPoint) -> bool {
        self.visited.insert(point)
    }

    pub fn contains(&self, point: &ParameterPoint) -> bool {
        self.visited.contains(point)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_membership() {
        let mut tabu = TabuSet::new();
        assert!(tabu.is_empty());

        let point = ParameterPoint::new().with("a", 1).with("b", 2);
        assert!(tabu.insert(point.clone()));
        assert!(!tabu.insert(ParameterPoint::new().with("b", 2).with("a", 1)));
        assert!(tabu.contains(&point));
        assert!(!tabu.contains(&ParameterPoint::new().with("a", 2).with("b", 1)));
        assert_eq!(tabu.len(), 1);
    }
}
