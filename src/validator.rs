//! C9 — Segment validator (spec §4.9). Pre-commit checks are hard failures;
//! post-commit checks run against the same in-memory set before the
//! transaction commits, since this crate validates in-process rather than
//! against a live PostGIS server.

use std::collections::{HashMap, HashSet};

use geo::{Area, Intersects};

use crate::error::ValidationError;
use crate::segment_builder::BuiltSegment;
use crate::types::FamilyId;

/// No segment has zero voters (spec §4.9 pre-commit, bullet 1).
pub fn check_no_empty_segments(segments: &[BuiltSegment]) -> Result<(), ValidationError> {
    for s in segments {
        if s.total_voters == 0 {
            return Err(ValidationError::EmptySegment(s.segment_code.clone()));
        }
    }
    Ok(())
}

/// `Σ segment.total_voters == total in-scope voters` (bullet 2).
pub fn check_voter_count_conservation(
    segments: &[BuiltSegment],
    expected_total_voters: i64,
) -> Result<(), ValidationError> {
    let actual: i64 = segments.iter().map(|s| s.total_voters).sum();
    if actual != expected_total_voters {
        return Err(ValidationError::VoterCountMismatch { expected: expected_total_voters, actual });
    }
    Ok(())
}

/// No family id appears in more than one segment (bullet 3).
pub fn check_no_duplicate_families(segments: &[BuiltSegment]) -> Result<(), ValidationError> {
    let mut seen: HashSet<FamilyId> = HashSet::new();
    for s in segments {
        for &fid in &s.family_ids {
            if !seen.insert(fid) {
                return Err(ValidationError::DuplicateVoter(fid));
            }
        }
    }
    Ok(())
}

/// Every in-scope family with a positive member count is attached to some
/// segment of this (node, draft) set (post-commit bullet 1).
pub fn check_every_family_attached(
    segments: &[BuiltSegment],
    in_scope_families: &[FamilyId],
) -> Result<(), ValidationError> {
    let attached: HashSet<FamilyId> = segments.iter().flat_map(|s| s.family_ids.iter().copied()).collect();
    for &fid in in_scope_families {
        if !attached.contains(&fid) {
            return Err(ValidationError::UnassignedFamily(fid));
        }
    }
    Ok(())
}

/// All geometries are valid (non-degenerate ring) and non-empty (post-commit
/// bullet 3, plus invariant B).
pub fn check_geometries_valid_and_nonempty(segments: &[BuiltSegment]) -> Result<(), ValidationError> {
    for s in segments {
        if s.geometry.exterior().0.len() < 4 {
            return Err(ValidationError::InvalidGeometry(s.segment_code.clone()));
        }
        if s.geometry.unsigned_area() <= 0.0 {
            return Err(ValidationError::EmptyGeometry(s.segment_code.clone()));
        }
    }
    Ok(())
}

/// No two segments have interior-overlapping geometries — boundary touching
/// is allowed (invariant A / post-commit bullet 2). Checked with an
/// `AABB`-prefiltered pairwise scan; `geo`'s `Intersects` on polygons already
/// returns true for boundary-only touches, so we additionally require a
/// nonzero-area intersection before flagging an overlap.
pub fn check_no_interior_overlap(segments: &[BuiltSegment]) -> Result<(), ValidationError> {
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let a = &segments[i];
            let b = &segments[j];
            if !a.geometry.intersects(&b.geometry) {
                continue;
            }
            if interiors_overlap(a, b) {
                return Err(ValidationError::InteriorOverlap(a.segment_code.clone(), b.segment_code.clone()));
            }
        }
    }
    Ok(())
}

fn interiors_overlap(a: &BuiltSegment, b: &BuiltSegment) -> bool {
    use geo::BooleanOps;
    use geo::MultiPolygon;
    let ma = MultiPolygon(vec![a.geometry.clone()]);
    let mb = MultiPolygon(vec![b.geometry.clone()]);
    let inter = ma.intersection(&mb);
    inter.0.iter().any(|p| p.unsigned_area() > 1e-12)
}

/// Run every pre-commit check, bailing on the first failure.
pub fn validate_pre_commit(segments: &[BuiltSegment], expected_total_voters: i64) -> Result<(), ValidationError> {
    check_no_empty_segments(segments)?;
    check_voter_count_conservation(segments, expected_total_voters)?;
    check_no_duplicate_families(segments)?;
    Ok(())
}

/// Run every post-commit check, bailing on the first failure.
pub fn validate_post_commit(
    segments: &[BuiltSegment],
    in_scope_families: &[FamilyId],
) -> Result<(), ValidationError> {
    check_every_family_attached(segments, in_scope_families)?;
    check_geometries_valid_and_nonempty(segments)?;
    check_no_interior_overlap(segments)?;
    Ok(())
}

/// Annotate oversized/undersized segments with `metadata.exception = true`
/// (spec §4.9 bullet 4: warning only, never a hard failure).
pub fn exception_flags(segments: &[BuiltSegment]) -> HashMap<String, &'static str> {
    use crate::region::{ABSOLUTE_MAX, ABSOLUTE_MIN};
    let mut flags = HashMap::new();
    for s in segments {
        if s.oversized || s.total_voters > ABSOLUTE_MAX {
            flags.insert(s.segment_code.clone(), "oversized");
        } else if s.total_voters < ABSOLUTE_MIN {
            flags.insert(s.segment_code.clone(), "undersized");
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point, Polygon};
    use uuid::Uuid;

    fn segment(code: &str, voters: i64, families: Vec<FamilyId>, poly: Polygon<f64>) -> BuiltSegment {
        BuiltSegment {
            segment_code: code.into(),
            geometry: poly.clone(),
            centroid: poly.exterior().points().next().unwrap_or(Point::new(0.0, 0.0)),
            family_ids: families,
            total_voters: voters,
            oversized: false,
        }
    }

    fn square(x: f64, y: f64, edge: f64) -> Polygon<f64> {
        polygon![(x: x, y: y), (x: x + edge, y: y), (x: x + edge, y: y + edge), (x: x, y: y + edge), (x: x, y: y)]
    }

    #[test]
    fn rejects_an_empty_segment() {
        let segments = vec![segment("SEG-000", 0, vec![], square(0.0, 0.0, 1.0))];
        assert!(matches!(check_no_empty_segments(&segments), Err(ValidationError::EmptySegment(_))));
    }

    #[test]
    fn rejects_voter_count_mismatch() {
        let segments = vec![segment("SEG-000", 50, vec![], square(0.0, 0.0, 1.0))];
        assert!(matches!(
            check_voter_count_conservation(&segments, 100),
            Err(ValidationError::VoterCountMismatch { expected: 100, actual: 50 })
        ));
    }

    #[test]
    fn rejects_a_family_in_two_segments() {
        let fid = Uuid::new_v4();
        let segments = vec![
            segment("SEG-000", 10, vec![fid], square(0.0, 0.0, 1.0)),
            segment("SEG-001", 10, vec![fid], square(5.0, 5.0, 1.0)),
        ];
        assert!(matches!(check_no_duplicate_families(&segments), Err(ValidationError::DuplicateVoter(_))));
    }

    #[test]
    fn rejects_an_unassigned_family() {
        let segments = vec![segment("SEG-000", 10, vec![], square(0.0, 0.0, 1.0))];
        let missing = Uuid::new_v4();
        assert!(matches!(
            check_every_family_attached(&segments, &[missing]),
            Err(ValidationError::UnassignedFamily(_))
        ));
    }

    #[test]
    fn touching_but_non_overlapping_segments_pass() {
        let segments = vec![
            segment("SEG-000", 10, vec![], square(0.0, 0.0, 1.0)),
            segment("SEG-001", 10, vec![], square(1.0, 0.0, 1.0)),
        ];
        assert!(check_no_interior_overlap(&segments).is_ok());
    }

    #[test]
    fn genuinely_overlapping_segments_fail() {
        let segments = vec![
            segment("SEG-000", 10, vec![], square(0.0, 0.0, 2.0)),
            segment("SEG-001", 10, vec![], square(1.0, 0.0, 2.0)),
        ];
        assert!(matches!(check_no_interior_overlap(&segments), Err(ValidationError::InteriorOverlap(_, _))));
    }
}
