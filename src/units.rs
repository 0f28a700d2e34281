//! C2 — Atomic-unit builder (spec §4.2).
//!
//! A family is the indivisible unit of movement. Its centroid is taken from
//! the family row when present (the loader's precomputed centroid — spec
//! §3: "Its coordinates are the centroid used for spatial grouping"),
//! falling back to the mean of its voters' non-null coordinates when the
//! family itself carries no coordinate. A family with no coordinate anywhere
//! still counts toward totals but contributes no centroid, so it cannot be
//! placed by the grid/geohash strategies (spec §4.1: "the engine filters
//! them upstream when computing geometry").

use std::collections::BTreeMap;

use geo::Point;

use crate::db::models::{FamilyRow, VoterRow};
use crate::error::InputError;
use crate::types::{FamilyId, VoterId};

#[derive(Debug, Clone)]
pub struct AtomicUnit {
    pub id: FamilyId,
    pub voter_count: i64,
    pub voter_ids: Vec<VoterId>,
    pub centroid: Option<Point<f64>>,
}

pub fn build_atomic_units(
    families: &[FamilyRow],
    voters: &[VoterRow],
) -> Result<Vec<AtomicUnit>, InputError> {
    let mut voters_by_family: BTreeMap<FamilyId, Vec<&VoterRow>> = BTreeMap::new();
    for v in voters {
        voters_by_family.entry(v.family_id).or_default().push(v);
    }

    let mut units: Vec<AtomicUnit> = families
        .iter()
        .filter(|f| f.member_count > 0)
        .map(|f| {
            let mut voter_ids: Vec<VoterId> = voters_by_family
                .get(&f.id)
                .map(|vs| vs.iter().map(|v| v.id).collect())
                .unwrap_or_default();
            voter_ids.sort();

            let centroid = match (f.longitude, f.latitude) {
                (Some(lng), Some(lat)) => Some(Point::new(lng, lat)),
                _ => voters_by_family.get(&f.id).and_then(|vs| mean_voter_point(vs)),
            };

            AtomicUnit { id: f.id, voter_count: f.member_count as i64, voter_ids, centroid }
        })
        .collect();

    if units.is_empty() {
        return Err(InputError::NoUnits);
    }

    units.sort_by_key(|u| u.id);
    Ok(units)
}

fn mean_voter_point(voters: &[&VoterRow]) -> Option<Point<f64>> {
    let coords: Vec<(f64, f64)> = voters
        .iter()
        .filter_map(|v| match (v.longitude, v.latitude) {
            (Some(lng), Some(lat)) => Some((lng, lat)),
            _ => None,
        })
        .collect();
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sx, sy) = coords.iter().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    Some(Point::new(sx / n, sy / n))
}
