//! C3 — Parent boundary (spec §4.3).

use geo::{ConcaveHull, GeodesicArea, MultiPoint, Point, Polygon};

use crate::error::InputError;
use crate::units::AtomicUnit;

/// Tightness target passed to `geo`'s k-nearest-neighbour concave hull.
/// Lower values hug the point set more tightly; spec calls for 0.98.
pub const CONCAVITY: f64 = 0.98;

pub struct ParentBoundary {
    pub polygon: Polygon<f64>,
    pub area_m2: f64,
}

pub fn compute_parent_boundary(units: &[AtomicUnit]) -> Result<ParentBoundary, InputError> {
    let points: Vec<Point<f64>> = units.iter().filter_map(|u| u.centroid).collect();
    if points.is_empty() {
        return Err(InputError::NoBoundary);
    }

    let multipoint = MultiPoint::from(points);
    let polygon = multipoint.concave_hull(CONCAVITY);
    let area_m2 = polygon.geodesic_area_unsigned();

    Ok(ParentBoundary { polygon, area_m2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use uuid::Uuid;

    fn unit_at(lng: f64, lat: f64) -> AtomicUnit {
        AtomicUnit { id: Uuid::new_v4(), voter_count: 1, voter_ids: vec![], centroid: Some(Point::new(lng, lat)) }
    }

    #[test]
    fn fails_on_empty_units() {
        assert!(matches!(compute_parent_boundary(&[]), Err(InputError::NoBoundary)));
    }

    #[test]
    fn computes_a_nonzero_area_hull_for_a_scattered_cluster() {
        let units = vec![
            unit_at(78.40, 17.30),
            unit_at(78.41, 17.30),
            unit_at(78.41, 17.31),
            unit_at(78.40, 17.31),
            unit_at(78.405, 17.305),
        ];
        let boundary = compute_parent_boundary(&units).unwrap();
        assert!(boundary.area_m2 > 0.0);
        assert!(boundary.polygon.exterior().0.len() >= 4);
    }

    #[test]
    fn ignores_units_without_a_centroid() {
        let mut units = vec![unit_at(78.40, 17.30), unit_at(78.41, 17.31)];
        units.push(AtomicUnit { id: Uuid::new_v4(), voter_count: 1, voter_ids: vec![], centroid: None });
        let boundary = compute_parent_boundary(&units);
        assert!(boundary.is_ok());
    }
}
