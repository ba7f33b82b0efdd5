//! Nearest-neighbour matching of a probe embedding against the roster.

use crate::roster::RosterIndex;
use crate::types::{Embedding, Identity};
use std::sync::Arc;

/// Default maximum Euclidean distance for a positive match.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Euclidean distance between two unit embeddings whose cosine similarity is
/// `similarity`: `sqrt(2 - 2cos)`.
pub fn unit_distance(similarity: f32) -> f32 {
    (2.0 - 2.0 * similarity).max(0.0).sqrt()
}

/// Smallest cosine similarity a unit embedding needs to fall within `tolerance`.
pub fn unit_similarity(tolerance: f32) -> f32 {
    1.0 - tolerance * tolerance / 2.0
}

/// Distances from one probe embedding to every identity, in roster order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub distances: Vec<f32>,
}

impl MatchCandidate {
    /// Compute the distance to every roster identity. A probe whose dimension
    /// differs from the roster gets no distances at all.
    pub fn score(roster: &RosterIndex, probe: &Embedding) -> Self {
        if roster.dimension() != Some(probe.dimension()) {
            return Self { distances: Vec::new() };
        }
        Self {
            distances: roster
                .identities()
                .iter()
                .map(|identity| probe.distance(&identity.embedding))
                .collect(),
        }
    }

    /// Index and distance of the closest identity. Ties go to the earliest
    /// roster entry; NaN never wins.
    pub fn best(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        // Full traversal, no early exit.
        for (i, &d) in self.distances.iter().enumerate() {
            let better = match best {
                None => !d.is_nan(),
                Some((_, best_d)) => d < best_d,
            };
            if better {
                best = Some((i, d));
            }
        }
        best
    }

    /// Per-identity "within tolerance" flags, computed independently of the argmin.
    pub fn within(&self, tolerance: f32) -> Vec<bool> {
        self.distances.iter().map(|&d| d <= tolerance).collect()
    }
}

/// Match `probe` against `roster`.
///
/// Only the single closest identity is ever considered: if it fails the
/// tolerance test the result is `None`, even when a farther identity would
/// have passed.
pub fn best_match<'r>(
    roster: &'r RosterIndex,
    probe: &Embedding,
    tolerance: f32,
) -> Option<&'r Identity> {
    let candidate = MatchCandidate::score(roster, probe);
    let (best_idx, distance) = candidate.best()?;
    let within = candidate.within(tolerance);

    tracing::debug!(
        best_idx,
        distance,
        tolerance,
        distances = ?candidate.distances,
        "best roster candidate"
    );

    if within[best_idx] {
        roster.identities().get(best_idx)
    } else {
        None
    }
}

/// Roster plus tolerance, shareable across frame workers.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    roster: Arc<RosterIndex>,
    tolerance: f32,
}

impl FaceMatcher {
    pub fn new(roster: Arc<RosterIndex>, tolerance: f32) -> Self {
        Self { roster, tolerance }
    }

    pub fn find(&self, probe: &Embedding) -> Option<&Identity> {
        best_match(&self.roster, probe, self.tolerance)
    }

    pub fn roster(&self) -> &RosterIndex {
        &self.roster
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, values: Vec<f32>) -> Identity {
        Identity {
            id: id.into(),
            name: format!("student {id}"),
            group: "CSE".into(),
            embedding: Embedding::new(values),
        }
    }

    fn roster(ids: Vec<Identity>) -> RosterIndex {
        RosterIndex::from_identities(ids)
    }

    #[test]
    fn test_empty_roster_never_matches() {
        let empty = RosterIndex::empty();
        for values in [vec![0.0, 0.0], vec![1.0, -1.0], vec![]] {
            assert!(best_match(&empty, &Embedding::new(values), 10.0).is_none());
        }
    }

    #[test]
    fn test_match_within_tolerance() {
        let r = roster(vec![identity("R1", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.3, 0.0]);
        assert_eq!(best_match(&r, &probe, 0.5).map(|i| i.id.as_str()), Some("R1"));
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let r = roster(vec![identity("R1", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5, 0.0]);
        assert!(best_match(&r, &probe, 0.5).is_some());
    }

    #[test]
    fn test_best_outside_tolerance_is_no_match() {
        let r = roster(vec![
            identity("R1", vec![0.0, 0.0]),
            identity("R2", vec![0.0, 3.0]),
        ]);
        let probe = Embedding::new(vec![0.6, 0.0]);
        assert!(best_match(&r, &probe, 0.5).is_none());
    }

    #[test]
    fn test_only_argmin_is_tested_against_tolerance() {
        // Best candidate R1 at 0.6 fails a 0.5 tolerance; R2 is never consulted.
        let r = roster(vec![
            identity("R1", vec![0.0, 0.0]),
            identity("R2", vec![0.0, 1.3]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.6]);
        let candidate = MatchCandidate::score(&r, &probe);
        assert_eq!(candidate.best().map(|(i, _)| i), Some(0));
        assert!(best_match(&r, &probe, 0.5).is_none());
        assert!(best_match(&r, &probe, 0.7).is_some_and(|i| i.id == "R1"));
    }

    #[test]
    fn test_closer_runner_up_becomes_argmin() {
        // Distances 0.6 to R1 and 0.4 to R2: R2 is the argmin and passes.
        let r = roster(vec![
            identity("R1", vec![0.0, 0.0]),
            identity("R2", vec![1.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.6, 0.0]);
        let candidate = MatchCandidate::score(&r, &probe);
        assert!((candidate.distances[0] - 0.6).abs() < 1e-6);
        assert!((candidate.distances[1] - 0.4).abs() < 1e-6);
        assert_eq!(best_match(&r, &probe, 0.5).map(|i| i.id.as_str()), Some("R2"));
    }

    #[test]
    fn test_tie_goes_to_earlier_roster_entry() {
        let r = roster(vec![
            identity("R1", vec![1.0, 0.0]),
            identity("R2", vec![-1.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        assert_eq!(best_match(&r, &probe, 1.0).map(|i| i.id.as_str()), Some("R1"));
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let r = roster(vec![identity("R1", vec![0.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        assert!(best_match(&r, &probe, 5.0).is_none());
    }

    #[test]
    fn test_nan_distance_never_wins() {
        let candidate = MatchCandidate {
            distances: vec![f32::NAN, 0.9, 0.2],
        };
        assert_eq!(candidate.best(), Some((2, 0.2)));
    }

    #[test]
    fn test_face_matcher_uses_configured_tolerance() {
        let r = Arc::new(roster(vec![identity("R1", vec![0.0])]));
        let strict = FaceMatcher::new(Arc::clone(&r), 0.1);
        let loose = FaceMatcher::new(r, 0.5);
        let probe = Embedding::new(vec![0.3]);
        assert!(strict.find(&probe).is_none());
        assert!(loose.find(&probe).is_some());
        assert_eq!(loose.roster().len(), 1);
    }

    /// Unit vector in `dim` dimensions at cosine `similarity` to the first axis.
    fn unit_at(dim: usize, similarity: f32) -> Embedding {
        let mut values = vec![0.0; dim];
        values[0] = similarity;
        values[1] = (1.0 - similarity * similarity).sqrt();
        Embedding::new(values)
    }

    #[test]
    fn test_unit_distance_follows_cosine() {
        let mut axis = vec![0.0; 512];
        axis[0] = 1.0;
        let reference = Embedding::new(axis);
        for similarity in [0.9_f32, 0.7, 0.4, 0.0, -0.5] {
            let d = reference.distance(&unit_at(512, similarity));
            assert!((d - unit_distance(similarity)).abs() < 1e-5, "cos {similarity}: {d}");
            assert!((unit_similarity(d) - similarity).abs() < 1e-5);
        }
        assert!((unit_similarity(DEFAULT_TOLERANCE) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn test_default_tolerance_rejects_typical_arcface_pair() {
        let mut axis = vec![0.0; 512];
        axis[0] = 1.0;
        let r = roster(vec![identity("R1", axis)]);
        let live = unit_at(512, 0.7);
        assert!(best_match(&r, &live, DEFAULT_TOLERANCE).is_none());
        assert!(best_match(&r, &live, unit_distance(0.4)).is_some_and(|i| i.id == "R1"));
    }
}
