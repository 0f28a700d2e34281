//! C4 — Adaptive grid (spec §4.4).

use geo::{BoundingRect, Centroid, Intersects, Polygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Clone, Debug)]
pub struct Cell {
    /// Stable id assigned in row-major creation order; never reassigned
    /// once the cell is retained.
    pub id: u32,
    pub polygon: Polygon<f64>,
    pub centroid: geo::Point<f64>,
}

impl RTreeObject for Cell {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let c = self.centroid;
        AABB::from_point([c.x(), c.y()])
    }
}

pub struct AdaptiveGrid {
    /// Cells ordered for downstream determinism: centroid latitude
    /// descending, then centroid longitude ascending.
    pub cells: Vec<Cell>,
    pub index: RTree<Cell>,
    /// Lattice spacing used to build this grid, in degrees. Exposed so
    /// neighbor-map construction (C6) can bound its adjacency search.
    pub edge_deg_lat: f64,
    pub edge_deg_lng: f64,
}

/// Edge length in meters, before degree conversion (spec §4.4 formula).
pub fn edge_length_m(unit_count: usize, area_m2: f64) -> f64 {
    let estimated_segments = ((unit_count as f64 * 2.65 / 115.0).round() as i64).max(1) as f64;
    let target_cells = estimated_segments * 6.0;
    let denom = target_cells.max(unit_count as f64 * 0.5).max(1.0);
    let raw_edge_m = (area_m2 / denom).sqrt();
    raw_edge_m.clamp(50.0, 2000.0)
}

pub fn build_adaptive_grid(boundary: &Polygon<f64>, unit_count: usize, area_m2: f64) -> AdaptiveGrid {
    let edge_m = edge_length_m(unit_count, area_m2);

    let centroid = boundary.centroid().unwrap_or_else(|| geo::Point::new(0.0, 0.0));
    let lat_rad = centroid.y().to_radians();
    let edge_deg_lat = edge_m / METERS_PER_DEGREE;
    let edge_deg_lng = edge_m / (METERS_PER_DEGREE * lat_rad.cos().max(1e-9));

    let bounds: Rect<f64> = boundary
        .bounding_rect()
        .unwrap_or_else(|| Rect::new((0.0, 0.0), (0.0, 0.0)));

    let mut cells = Vec::new();
    let mut next_id: u32 = 0;

    if bounds.max().x <= bounds.min().x || bounds.max().y <= bounds.min().y {
        // A single (or perfectly colocated) centroid gives a zero-area
        // boundary the lattice loop below would never step into. Synthesize
        // one cell around it so the unit still lands somewhere.
        let cell_poly = geo::Polygon::new(
            geo::LineString::from(vec![
                (centroid.x() - edge_deg_lng / 2.0, centroid.y() - edge_deg_lat / 2.0),
                (centroid.x() + edge_deg_lng / 2.0, centroid.y() - edge_deg_lat / 2.0),
                (centroid.x() + edge_deg_lng / 2.0, centroid.y() + edge_deg_lat / 2.0),
                (centroid.x() - edge_deg_lng / 2.0, centroid.y() + edge_deg_lat / 2.0),
                (centroid.x() - edge_deg_lng / 2.0, centroid.y() - edge_deg_lat / 2.0),
            ]),
            vec![],
        );
        cells.push(Cell { id: next_id, polygon: cell_poly, centroid });
        next_id += 1;
    } else {
        let mut y = bounds.min().y;
        while y < bounds.max().y {
            let mut x = bounds.min().x;
            while x < bounds.max().x {
                let cell_poly = geo::Polygon::new(
                    geo::LineString::from(vec![
                        (x, y),
                        (x + edge_deg_lng, y),
                        (x + edge_deg_lng, y + edge_deg_lat),
                        (x, y + edge_deg_lat),
                        (x, y),
                    ]),
                    vec![],
                );

                if cell_poly.intersects(boundary) {
                    let c = cell_poly.centroid().unwrap_or_else(|| geo::Point::new(x, y));
                    cells.push(Cell { id: next_id, polygon: cell_poly, centroid: c });
                    next_id += 1;
                }

                x += edge_deg_lng;
            }
            y += edge_deg_lat;
        }
    }

    cells.sort_by(|a, b| {
        b.centroid
            .y()
            .partial_cmp(&a.centroid.y())
            .unwrap()
            .then_with(|| a.centroid.x().partial_cmp(&b.centroid.x()).unwrap())
    });

    let index = RTree::bulk_load(cells.clone());
    AdaptiveGrid { cells, index, edge_deg_lat, edge_deg_lng }
}
