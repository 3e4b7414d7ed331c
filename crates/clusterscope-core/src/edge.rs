//! Aggregated edges between clusters.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Upper bound for derived edge weights; reached as confidence approaches 1.
pub const MAX_EDGE_COUNT: u64 = 1_000_000;

/// Observed weight of a statement: `round(1 / (2 * (1 - confidence)))`.
///
/// Confidence is clamped to `[0, 1]` (NaN counts as 0). Ties round to even,
/// so confidence 0 gives 0 and 0.5 gives 1. The result saturates at
/// [`MAX_EDGE_COUNT`].
pub fn count_from_confidence(confidence: f64) -> u64 {
    let confidence = if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    };
    let denominator = 2.0 * (1.0 - confidence);
    if denominator <= 0.0 {
        return MAX_EDGE_COUNT;
    }
    let weight = (1.0 / denominator).round_ties_even();
    if !weight.is_finite() || weight >= MAX_EDGE_COUNT as f64 {
        MAX_EDGE_COUNT
    } else {
        weight as u64
    }
}

/// Directed, weighted edge between two clusters.
///
/// Identity is `(subject, predicate, object)`; `count` takes no part in
/// equality or hashing, so a set keeps whichever duplicate was inserted
/// first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperEdge {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub count: u64,
}

impl SuperEdge {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        count: u64,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            count,
        }
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.subject, &self.predicate, &self.object)
    }

    /// Ordering by identity, for stable output.
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialEq for SuperEdge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SuperEdge {}

impl Hash for SuperEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn count_transform_anchor_points() {
        assert_eq!(count_from_confidence(0.5), 1);
        assert_eq!(count_from_confidence(0.9), 5);
        assert_eq!(count_from_confidence(0.75), 2);
        assert_eq!(count_from_confidence(0.0), 0);
        assert_eq!(count_from_confidence(1.0), MAX_EDGE_COUNT);
        assert_eq!(count_from_confidence(f64::NAN), 0);
        assert_eq!(count_from_confidence(-3.0), 0);
        assert_eq!(count_from_confidence(7.0), MAX_EDGE_COUNT);
    }

    #[test]
    fn duplicate_edges_keep_the_first_weight() {
        let mut set = HashSet::new();
        assert!(set.insert(SuperEdge::new("s", "p", "o", 5)));
        assert!(!set.insert(SuperEdge::new("s", "p", "o", 9)));
        assert!(set.insert(SuperEdge::new("s", "q", "o", 9)));
        assert_eq!(set.len(), 2);
        let kept = set.get(&SuperEdge::new("s", "p", "o", 0)).unwrap();
        assert_eq!(kept.count, 5);
    }
}
