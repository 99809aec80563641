//! Analysis grid definition

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// A north-up grid of square cells anchored at its top-left corner.
///
/// Built from a requested extent with [`GridSpec::from_extent`]; the grid is
/// grown right and down to a whole number of cells, never shrunk, so the
/// requested extent is always fully covered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Left edge of the grid
    pub min_x: f64,
    /// Top edge of the grid
    pub max_y: f64,
    /// Cell size in map units
    pub cell: f64,
    /// Number of columns
    pub cols: usize,
    /// Number of rows
    pub rows: usize,
}

impl GridSpec {
    /// Derive a grid covering `(min_x, min_y, max_x, max_y)`.
    ///
    /// `cols = ceil(width / cell)` and `rows = ceil(height / cell)`, with at
    /// least one of each. The expanded right edge is `min_x + cols * cell` and
    /// the expanded bottom edge is `max_y - rows * cell`.
    pub fn from_extent(min_x: f64, min_y: f64, max_x: f64, max_y: f64, cell: f64) -> Result<Self> {
        if !(cell.is_finite() && cell > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cell",
                value: cell.to_string(),
                reason: "cell size must be > 0".into(),
            });
        }
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) || max_x < min_x || max_y < min_y {
            return Err(Error::InvalidParameter {
                name: "extent",
                value: format!("({min_x}, {min_y}, {max_x}, {max_y})"),
                reason: "extent must be finite with min <= max".into(),
            });
        }

        let cols = (((max_x - min_x) / cell).ceil() as usize).max(1);
        let rows = (((max_y - min_y) / cell).ceil() as usize).max(1);

        Ok(Self {
            min_x,
            max_y,
            cell,
            cols,
            rows,
        })
    }

    /// Grid from an existing raster's transform and shape.
    pub fn from_transform(transform: &GeoTransform, rows: usize, cols: usize) -> Self {
        Self {
            min_x: transform.origin_x,
            max_y: transform.origin_y,
            cell: transform.cell_size(),
            cols,
            rows,
        }
    }

    /// Expanded right edge
    pub fn max_x(&self) -> f64 {
        self.min_x + self.cols as f64 * self.cell
    }

    /// Expanded bottom edge
    pub fn min_y(&self) -> f64 {
        self.max_y - self.rows as f64 * self.cell
    }

    /// `(min_x, min_y, max_x, max_y)` of the expanded grid
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y(), self.max_x(), self.max_y)
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_origin(self.min_x, self.max_y, self.cell)
    }

    /// Center of cell `(row, col)`
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + (col as f64 + 0.5) * self.cell,
            self.max_y - (row as f64 + 0.5) * self.cell,
        )
    }

    /// The `(row, col)` of the cell containing `(x, y)`, if inside the grid.
    ///
    /// Cells are half-open: left and top edges belong to the cell.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.min_x) / self.cell).floor();
        let row = ((self.max_y - y) / self.cell).floor();
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Split the rows into consecutive `[start, end)` blocks of at most `block_rows`.
    pub fn row_blocks(&self, block_rows: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let step = block_rows.max(1);
        (0..self.rows)
            .step_by(step)
            .map(move |start| (start, (start + step).min(self.rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_expands_never_shrinks() {
        let g = GridSpec::from_extent(0.0, 0.0, 1030.0, 480.0, 100.0).unwrap();
        assert_eq!(g.cols, 11);
        assert_eq!(g.rows, 5);
        assert_relative_eq!(g.max_x(), 1100.0);
        assert_relative_eq!(g.min_y(), -20.0);
        assert!(g.max_x() >= 1030.0 && g.max_x() - 1030.0 < g.cell);
        assert!(g.min_y() <= 0.0 && 0.0 - g.min_y() < g.cell);
    }

    #[test]
    fn test_exact_multiple_is_not_padded() {
        let g = GridSpec::from_extent(10.0, 20.0, 110.0, 70.0, 50.0).unwrap();
        assert_eq!((g.rows, g.cols), (1, 2));
        assert_eq!(g.bounds(), (10.0, 20.0, 110.0, 70.0));
    }

    #[test]
    fn test_degenerate_extent_has_one_cell() {
        let g = GridSpec::from_extent(5.0, 5.0, 5.0, 5.0, 1.0).unwrap();
        assert_eq!((g.rows, g.cols), (1, 1));
    }

    #[test]
    fn test_rejects_bad_cell() {
        assert!(GridSpec::from_extent(0.0, 0.0, 1.0, 1.0, 0.0).is_err());
        assert!(GridSpec::from_extent(0.0, 0.0, 1.0, 1.0, -5.0).is_err());
        assert!(GridSpec::from_extent(0.0, 0.0, 1.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_cell_center_roundtrip() {
        let g = GridSpec::from_extent(-25.0, -25.0, 125.0, 125.0, 50.0).unwrap();
        for row in 0..g.rows {
            for col in 0..g.cols {
                let (x, y) = g.cell_center(row, col);
                assert_eq!(g.cell_of(x, y), Some((row, col)));
            }
        }
        assert_eq!(g.cell_center(0, 0), (0.0, 100.0));
        assert_eq!(g.cell_of(-30.0, 0.0), None);
        assert_eq!(g.cell_of(0.0, 130.0), None);
    }

    #[test]
    fn test_row_blocks_cover_all_rows() {
        let g = GridSpec::from_extent(0.0, 0.0, 10.0, 10.0, 1.0).unwrap();
        let blocks: Vec<_> = g.row_blocks(4).collect();
        assert_eq!(blocks, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_transform_matches_centers() {
        let g = GridSpec::from_extent(100.0, 0.0, 400.0, 300.0, 30.0).unwrap();
        let t = g.transform();
        assert_eq!(t.pixel_to_geo(3, 4), g.cell_center(4, 3));
    }
}
