//! C5 — Cell assigner (spec §4.5).

use std::collections::HashMap;

use geo::{EuclideanDistance, Point};

use crate::error::AlgorithmError;
use crate::grid::{AdaptiveGrid, Cell};
use crate::types::FamilyId;
use crate::units::AtomicUnit;

#[derive(Debug, Clone)]
pub struct CellAssignment {
    pub unit_ids: Vec<FamilyId>,
    pub voter_count: i64,
    pub cell_centroid: Point<f64>,
}

/// Number of nearest-by-centroid candidates to refine against the true
/// point-to-polygon distance. The RTree prunes by centroid distance; this
/// widens the search enough that the true nearest cell is always among the
/// candidates for grids built by `build_adaptive_grid`.
const CANDIDATE_WINDOW: usize = 12;

fn nearest_cell<'a>(point: Point<f64>, grid: &'a AdaptiveGrid) -> Option<&'a Cell> {
    grid.index
        .nearest_neighbor_iter(&[point.x(), point.y()])
        .take(CANDIDATE_WINDOW)
        .min_by(|a, b| {
            let da = point.euclidean_distance(&a.polygon);
            let db = point.euclidean_distance(&b.polygon);
            da.partial_cmp(&db).unwrap()
        })
}

pub fn assign_units_to_cells(
    units: &[AtomicUnit],
    grid: &AdaptiveGrid,
) -> Result<HashMap<u32, CellAssignment>, AlgorithmError> {
    let mut by_cell: HashMap<u32, CellAssignment> = HashMap::new();
    let mut unassigned = 0usize;

    for unit in units {
        let Some(centroid) = unit.centroid else {
            unassigned += 1;
            continue;
        };
        let Some(cell) = nearest_cell(centroid, grid) else {
            unassigned += 1;
            continue;
        };

        let entry = by_cell.entry(cell.id).or_insert_with(|| CellAssignment {
            unit_ids: Vec::new(),
            voter_count: 0,
            cell_centroid: cell.centroid,
        });
        entry.unit_ids.push(unit.id);
        entry.voter_count += unit.voter_count;
    }

    if unassigned > 0 {
        return Err(AlgorithmError::AssignmentFailed(unassigned));
    }

    for assignment in by_cell.values_mut() {
        assignment.unit_ids.sort();
    }

    Ok(by_cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::build_adaptive_grid;
    use geo::polygon;
    use uuid::Uuid;

    fn unit_at(lng: f64, lat: f64) -> AtomicUnit {
        AtomicUnit { id: Uuid::new_v4(), voter_count: 5, voter_ids: vec![], centroid: Some(Point::new(lng, lat)) }
    }

    #[test]
    fn assigns_every_unit_and_groups_by_cell() {
        let boundary = polygon![
            (x: 78.40, y: 17.30), (x: 78.44, y: 17.30),
            (x: 78.44, y: 17.34), (x: 78.40, y: 17.34),
            (x: 78.40, y: 17.30),
        ];
        let grid = build_adaptive_grid(&boundary, 400, 16_000_000.0);
        let units = vec![unit_at(78.405, 17.305), unit_at(78.406, 17.306), unit_at(78.435, 17.335)];
        let assignments = assign_units_to_cells(&units, &grid).unwrap();
        let total: i64 = assignments.values().map(|a| a.voter_count).sum();
        assert_eq!(total, 15);
    }

    #[test]
    fn fails_when_a_unit_has_no_centroid() {
        let boundary = polygon![
            (x: 78.40, y: 17.30), (x: 78.44, y: 17.30),
            (x: 78.44, y: 17.34), (x: 78.40, y: 17.34),
            (x: 78.40, y: 17.30),
        ];
        let grid = build_adaptive_grid(&boundary, 400, 16_000_000.0);
        let mut units = vec![unit_at(78.405, 17.305)];
        units.push(AtomicUnit { id: Uuid::new_v4(), voter_count: 1, voter_ids: vec![], centroid: None });
        assert!(matches!(assign_units_to_cells(&units, &grid), Err(AlgorithmError::AssignmentFailed(1))));
    }
}
