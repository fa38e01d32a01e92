//! Spatial grid partitioner
//!
//! Splits the area around the device into a `d × d` grid sized so that each
//! cell holds roughly `target_cell_population` worksites, then orders the
//! cells from the center outwards. Cells whose center falls outside the
//! circle inscribed in the area are dropped, so a spatial sync covers a disc
//! rather than a square.
//!
//! ```text
//!  d = 4          kept cells, by ring
//!  ┌──┬──┬──┬──┐   . 1 1 .
//!  ├──┼──┼──┼──┤   1 0 0 1
//!  ├──┼──┼──┼──┤   1 0 0 1
//!  ├──┼──┼──┼──┤   . 1 1 .
//!  └──┴──┴──┴──┘
//! ```

use std::cmp::Ordering;

use reliefsync_core::domain::BoundingBox;

/// Grid cell with its ordering keys
#[derive(Debug, Clone, Copy)]
struct RankedCell {
    row: usize,
    col: usize,
    dx: f64,
    dy: f64,
    r2: f64,
}

impl RankedCell {
    fn new(row: usize, col: usize, dimension: usize) -> Self {
        let half = dimension as f64 / 2.0;
        let dx = col as f64 + 0.5 - half;
        let dy = row as f64 + 0.5 - half;
        Self {
            row,
            col,
            dx,
            dy,
            r2: dx * dx + dy * dy,
        }
    }

    fn is_positive(&self) -> bool {
        self.dy > 0.0 || (self.dy == 0.0 && self.dx > 0.0)
    }

    fn angle(&self) -> f64 {
        self.dy.atan2(self.dx)
    }

    /// Radius first, then the positive half-plane, then angle, then position
    fn order(&self, other: &Self) -> Ordering {
        self.r2
            .total_cmp(&other.r2)
            .then_with(|| other.is_positive().cmp(&self.is_positive()))
            .then_with(|| self.angle().total_cmp(&other.angle()))
            .then_with(|| self.row.cmp(&other.row))
            .then_with(|| self.col.cmp(&other.col))
    }
}

/// Partitions a bounding box into cells for spatial-bounded pulls
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    area: BoundingBox,
    dimension: usize,
}

impl SpatialGrid {
    /// A 1 × 1 grid over `area`; call [`initialize_grid`](Self::initialize_grid)
    /// to size it
    pub fn new(area: BoundingBox) -> Self {
        Self { area, dimension: 1 }
    }

    /// Size the grid for `total_count` worksites
    ///
    /// `dimension = max(1, ceil(sqrt(total_count / target_cell_population)))`
    pub fn initialize_grid(&mut self, total_count: u64, target_cell_population: u32) {
        let population = f64::from(target_cell_population.max(1));
        let dimension = (total_count as f64 / population).sqrt().ceil();
        self.dimension = if dimension.is_finite() && dimension >= 1.0 {
            dimension as usize
        } else {
            1
        };
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn area(&self) -> &BoundingBox {
        &self.area
    }

    /// Bounds of the cell at `(row, col)`; row 0 is the southern edge
    pub fn cell(&self, row: usize, col: usize) -> BoundingBox {
        let d = self.dimension as f64;
        let lat_step = self.area.lat_span() / d;
        let lon_step = self.area.lon_span() / d;
        let south = self.area.south + row as f64 * lat_step;
        let west = self.area.west + col as f64 * lon_step;
        let north = if row + 1 == self.dimension {
            self.area.north
        } else {
            self.area.south + (row + 1) as f64 * lat_step
        };
        let east = if col + 1 == self.dimension {
            self.area.east
        } else {
            self.area.west + (col + 1) as f64 * lon_step
        };
        BoundingBox {
            south,
            north,
            west,
            east,
        }
    }

    /// Every cell of the grid in row-major order
    pub fn all_cells(&self) -> Vec<BoundingBox> {
        let d = self.dimension;
        (0..d)
            .flat_map(|row| (0..d).map(move |col| (row, col)))
            .map(|(row, col)| self.cell(row, col))
            .collect()
    }

    /// Cells inside the inscribed circle, nearest to the center first
    pub fn grid_cells(&self) -> Vec<BoundingBox> {
        let d = self.dimension;
        let mut ranked: Vec<RankedCell> = (0..d)
            .flat_map(|row| (0..d).map(move |col| RankedCell::new(row, col, d)))
            .collect();

        if d > 2 {
            let half = d as f64 / 2.0;
            let limit = half * half;
            let innermost = ranked
                .iter()
                .map(|cell| cell.r2)
                .fold(f64::INFINITY, f64::min);
            ranked.retain(|cell| cell.r2 <= limit || cell.r2 == innermost);
        }

        ranked.sort_by(RankedCell::order);
        ranked
            .into_iter()
            .map(|cell| self.cell(cell.row, cell.col))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliefsync_core::domain::Coordinates;

    fn area() -> BoundingBox {
        BoundingBox::new(29.0, 31.0, -91.0, -89.0).unwrap()
    }

    fn grid(total: u64, population: u32) -> SpatialGrid {
        let mut grid = SpatialGrid::new(area());
        grid.initialize_grid(total, population);
        grid
    }

    #[test]
    fn test_dimension_formula() {
        assert_eq!(grid(0, 40).dimension(), 1);
        assert_eq!(grid(40, 40).dimension(), 1);
        assert_eq!(grid(41, 40).dimension(), 2);
        assert_eq!(grid(1000, 40).dimension(), 5);
        assert_eq!(grid(1000, 0).dimension(), 32);
    }

    #[test]
    fn test_small_grids_keep_every_cell() {
        assert_eq!(grid(10, 40).grid_cells().len(), 1);
        assert_eq!(grid(100, 40).grid_cells().len(), 4);
    }

    #[test]
    fn test_corners_are_dropped_outside_inscribed_circle() {
        let g = grid(16 * 40, 40);
        assert_eq!(g.dimension(), 4);
        let cells = g.grid_cells();
        assert_eq!(cells.len(), 12);
        let corner = g.cell(0, 0);
        assert!(!cells.contains(&corner));
    }

    #[test]
    fn test_cells_are_ordered_by_distance_from_center() {
        let g = grid(1000, 40);
        let center = g.area().center();
        let distances: Vec<f64> = g
            .grid_cells()
            .iter()
            .map(|cell| {
                let c = cell.center();
                let dlat = (c.latitude - center.latitude) / g.area().lat_span();
                let dlon = (c.longitude - center.longitude) / g.area().lon_span();
                dlat * dlat + dlon * dlon
            })
            .collect();
        for pair in distances.windows(2) {
            assert!(pair[0] <= pair[1] + 1e-12);
        }
        assert!(distances[0] < 1e-12, "odd grids start at the center cell");
    }

    #[test]
    fn test_ties_are_broken_deterministically() {
        let first = grid(16 * 40, 40).grid_cells();
        let second = grid(16 * 40, 40).grid_cells();
        assert_eq!(first, second);

        // Innermost ring of an even grid: positive half-plane first
        let g = grid(16 * 40, 40);
        assert_eq!(first[0], g.cell(2, 2));
        assert_eq!(first[1], g.cell(2, 1));
    }

    #[test]
    fn test_all_cells_tile_the_area() {
        let g = grid(1000, 40);
        let cells = g.all_cells();
        assert_eq!(cells.len(), 25);

        let total_area: f64 = cells.iter().map(|c| c.lat_span() * c.lon_span()).sum();
        let expected = area().lat_span() * area().lon_span();
        assert!((total_area - expected).abs() < 1e-9);

        // Every interior point belongs to exactly one cell
        for i in 0..20 {
            for j in 0..20 {
                let point = Coordinates {
                    latitude: 29.0 + 0.05 + f64::from(i) * 0.1,
                    longitude: -91.0 + 0.05 + f64::from(j) * 0.1,
                };
                let owners = cells.iter().filter(|c| c.contains(&point)).count();
                assert_eq!(owners, 1);
            }
        }
    }
}
