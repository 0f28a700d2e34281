//! C8 — Geohash engine (spec §4.8), the alternative strategy.

use std::collections::BTreeMap;

use geo::{BooleanOps, Centroid, MultiPolygon, Polygon};
use geohash::{encode, Coord};

use crate::error::AlgorithmError;
use crate::region::{ABSOLUTE_MAX, TARGET_IDEAL, TARGET_MAX};
use crate::segment_builder::BuiltSegment;
use crate::types::FamilyId;
use crate::units::AtomicUnit;

const GEOHASH_PRECISION: usize = 7;

#[derive(Debug, Clone)]
struct Tile {
    family_ids: Vec<FamilyId>,
    voters: i64,
    bbox: rect::Rect,
}

mod rect {
    #[derive(Debug, Clone, Copy)]
    pub struct Rect {
        pub min_lng: f64,
        pub min_lat: f64,
        pub max_lng: f64,
        pub max_lat: f64,
    }
}

fn tile_polygon(r: &rect::Rect) -> Polygon<f64> {
    geo::Polygon::new(
        geo::LineString::from(vec![
            (r.min_lng, r.min_lat),
            (r.max_lng, r.min_lat),
            (r.max_lng, r.max_lat),
            (r.min_lng, r.max_lat),
            (r.min_lng, r.min_lat),
        ]),
        vec![],
    )
}

/// Group families by 7-char geohash of their centroid, sorted lexicographically.
fn build_tiles(units: &[AtomicUnit]) -> Result<Vec<Tile>, AlgorithmError> {
    let mut by_hash: BTreeMap<String, (Vec<FamilyId>, i64)> = BTreeMap::new();

    for unit in units {
        let Some(centroid) = unit.centroid else {
            return Err(AlgorithmError::AssignmentFailed(1));
        };
        let hash = encode(Coord { x: centroid.x(), y: centroid.y() }, GEOHASH_PRECISION)
            .map_err(|e| AlgorithmError::GeometryBuildFailed(e.to_string()))?;
        let entry = by_hash.entry(hash).or_insert_with(|| (Vec::new(), 0));
        entry.0.push(unit.id);
        entry.1 += unit.voter_count;
    }

    let mut tiles = Vec::with_capacity(by_hash.len());
    for (hash, (mut family_ids, voters)) in by_hash {
        family_ids.sort();
        let bbox = geohash::decode_bbox(hash.as_str())
            .map(|r| rect::Rect { min_lng: r.min().x, min_lat: r.min().y, max_lng: r.max().x, max_lat: r.max().y })
            .map_err(|e| AlgorithmError::GeometryBuildFailed(e.to_string()))?;
        tiles.push(Tile { family_ids, voters, bbox });
    }
    Ok(tiles)
}

fn union_tiles(tiles: &[&Tile]) -> Result<Polygon<f64>, AlgorithmError> {
    let mut acc = MultiPolygon::<f64>(vec![]);
    for t in tiles {
        let poly = tile_polygon(&t.bbox);
        acc = acc.union(&MultiPolygon(vec![poly]));
    }
    acc.0
        .into_iter()
        .max_by(|a, b| {
            use geo::Area;
            a.unsigned_area().partial_cmp(&b.unsigned_area()).unwrap()
        })
        .ok_or_else(|| AlgorithmError::GeometryBuildFailed("tile union produced no polygons".into()))
}

/// Greedy lexicographic packing of tiles into size-bounded segments (spec §4.8 step 3).
pub fn build_geohash_segments(units: &[AtomicUnit]) -> Result<Vec<BuiltSegment>, AlgorithmError> {
    let tiles = build_tiles(units)?;

    let mut segments: Vec<BuiltSegment> = Vec::new();
    let mut current: Vec<&Tile> = Vec::new();
    let mut current_voters: i64 = 0;

    let flush = |current: &mut Vec<&Tile>,
                 current_voters: &mut i64,
                 segments: &mut Vec<BuiltSegment>|
     -> Result<(), AlgorithmError> {
        if current.is_empty() {
            return Ok(());
        }
        let geometry = union_tiles(current)?;
        let centroid = geometry
            .centroid()
            .ok_or_else(|| AlgorithmError::GeometryBuildFailed("tile union has no centroid".into()))?;
        let mut family_ids: Vec<FamilyId> = current.iter().flat_map(|t| t.family_ids.iter().copied()).collect();
        family_ids.sort();
        let oversized = *current_voters > ABSOLUTE_MAX;
        segments.push(BuiltSegment {
            segment_code: format!("SEG-{:03}", segments.len()),
            geometry,
            centroid,
            family_ids,
            total_voters: *current_voters,
            oversized,
        });
        current.clear();
        *current_voters = 0;
        Ok(())
    };

    for tile in &tiles {
        if current.is_empty() && tile.voters > TARGET_MAX {
            // A lone tile already over cap is emitted as its own forced-oversized segment.
            let family_ids = tile.family_ids.clone();
            let geometry = tile_polygon(&tile.bbox);
            let centroid = geometry
                .centroid()
                .ok_or_else(|| AlgorithmError::GeometryBuildFailed("tile has no centroid".into()))?;
            segments.push(BuiltSegment {
                segment_code: format!("SEG-{:03}", segments.len()),
                geometry,
                centroid,
                family_ids,
                total_voters: tile.voters,
                oversized: true,
            });
            continue;
        }

        if current_voters + tile.voters > TARGET_MAX && !current.is_empty() {
            flush(&mut current, &mut current_voters, &mut segments)?;
        }

        current.push(tile);
        current_voters += tile.voters;

        if current_voters >= TARGET_IDEAL {
            flush(&mut current, &mut current_voters, &mut segments)?;
        }
    }
    flush(&mut current, &mut current_voters, &mut segments)?;

    if segments.is_empty() {
        return Err(AlgorithmError::GeometryBuildFailed("no geohash tiles produced".into()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use uuid::Uuid;

    fn unit_at(lng: f64, lat: f64, voters: i64) -> AtomicUnit {
        AtomicUnit { id: Uuid::new_v4(), voter_count: voters, voter_ids: vec![], centroid: Some(Point::new(lng, lat)) }
    }

    #[test]
    fn tiles_are_grouped_by_geohash_and_segments_cover_all_voters() {
        let units = vec![
            unit_at(78.401, 17.301, 20),
            unit_at(78.4011, 17.3011, 30),
            unit_at(78.501, 17.401, 40),
        ];
        let segments = build_geohash_segments(&units).unwrap();
        let total: i64 = segments.iter().map(|s| s.total_voters).sum();
        assert_eq!(total, 90);
    }

    #[test]
    fn a_lone_oversized_tile_becomes_its_own_forced_segment() {
        let mut units = Vec::new();
        for i in 0..200 {
            let jitter = i as f64 * 0.0000001;
            units.push(unit_at(78.4010 + jitter, 17.3010 + jitter, 1));
        }
        let segments = build_geohash_segments(&units).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].oversized);
        assert_eq!(segments[0].total_voters, 200);
    }

    #[test]
    fn fails_when_a_unit_has_no_centroid() {
        let mut units = vec![unit_at(78.4, 17.3, 5)];
        units.push(AtomicUnit { id: Uuid::new_v4(), voter_count: 1, voter_ids: vec![], centroid: None });
        assert!(build_geohash_segments(&units).is_err());
    }
}
