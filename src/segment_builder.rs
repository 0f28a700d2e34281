//! C7 — Segment builder (spec §4.7).

use std::collections::HashMap;

use geo::{Area, BooleanOps, Centroid, MultiPolygon, Point, Polygon};

use crate::assign::CellAssignment;
use crate::error::AlgorithmError;
use crate::grid::Cell;
use crate::region::Region;
use crate::types::FamilyId;

pub struct BuiltSegment {
    pub segment_code: String,
    pub geometry: Polygon<f64>,
    pub centroid: Point<f64>,
    pub family_ids: Vec<FamilyId>,
    pub total_voters: i64,
    pub oversized: bool,
}

/// Union a set of (congruent, axis-aligned) cell polygons into one piece,
/// keeping the largest part if the union fragments.
fn union_cells(polys: &[&Polygon<f64>]) -> Result<Polygon<f64>, AlgorithmError> {
    let mut acc = MultiPolygon::<f64>(vec![]);
    for p in polys {
        let single = MultiPolygon(vec![(*p).clone()]);
        acc = acc.union(&single);
    }

    acc.0
        .into_iter()
        .max_by(|a, b| a.unsigned_area().partial_cmp(&b.unsigned_area()).unwrap())
        .ok_or_else(|| AlgorithmError::GeometryBuildFailed("union produced no polygons".into()))
}

pub fn build_segments(
    regions: &[Region],
    cells_by_id: &HashMap<u32, &Cell>,
    assignments: &HashMap<u32, CellAssignment>,
) -> Result<Vec<BuiltSegment>, AlgorithmError> {
    let mut out = Vec::with_capacity(regions.len());

    for (index, region) in regions.iter().enumerate() {
        let polys: Vec<&Polygon<f64>> = region
            .cells
            .iter()
            .filter_map(|id| cells_by_id.get(id).map(|c| &c.polygon))
            .collect();
        if polys.is_empty() {
            return Err(AlgorithmError::GeometryBuildFailed(format!(
                "region {} has no cell geometry",
                region.label
            )));
        }

        let geometry = union_cells(&polys)?;
        let centroid = geometry
            .centroid()
            .ok_or_else(|| AlgorithmError::GeometryBuildFailed("union has no centroid".into()))?;

        let mut family_ids: Vec<FamilyId> = region
            .cells
            .iter()
            .filter_map(|id| assignments.get(id))
            .flat_map(|a| a.unit_ids.iter().copied())
            .collect();
        family_ids.sort();
        family_ids.dedup();

        out.push(BuiltSegment {
            segment_code: format!("SEG-{:03}", index),
            geometry,
            centroid,
            family_ids,
            total_voters: region.voters,
            oversized: region.oversized,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x: f64, y: f64, edge: f64) -> Polygon<f64> {
        polygon![(x: x, y: y), (x: x + edge, y: y), (x: x + edge, y: y + edge), (x: x, y: y + edge), (x: x, y: y)]
    }

    #[test]
    fn unions_adjacent_squares_into_one_polygon() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(1.0, 0.0, 1.0);
        let merged = union_cells(&[&a, &b]).unwrap();
        assert!(merged.unsigned_area() > 1.9);
    }

    #[test]
    fn segment_code_is_zero_padded_by_region_order() {
        let cell_a = Cell { id: 0, polygon: square(0.0, 0.0, 1.0), centroid: Point::new(0.5, 0.5) };
        let cell_b = Cell { id: 1, polygon: square(5.0, 5.0, 1.0), centroid: Point::new(5.5, 5.5) };
        let cells_by_id: HashMap<u32, &Cell> = HashMap::from([(0, &cell_a), (1, &cell_b)]);
        let regions = vec![
            Region { label: "region-000000".into(), cells: vec![0], voters: 100, seed_cell: 0, oversized: false },
            Region { label: "region-000001".into(), cells: vec![1], voters: 110, seed_cell: 1, oversized: false },
        ];
        let assignments = HashMap::new();
        let segments = build_segments(&regions, &cells_by_id, &assignments).unwrap();
        assert_eq!(segments[0].segment_code, "SEG-000");
        assert_eq!(segments[1].segment_code, "SEG-001");
    }
}
