//! Polygon rasterization onto an analysis grid
//!
//! Cells whose center falls inside a polygon (even-odd over all rings) are
//! burned, and so is every cell touched by a ring edge. A point on a grid
//! line belongs to the cell to its right and below, matching
//! [`GridSpec::cell_of`]. Regions burn in input order, so where polygons
//! overlap the later region wins.

use geo::{coord, Area, Intersects, Line, LineString, Polygon, Rect};
use idwkit_core::raster::{GridSpec, Raster};
use idwkit_core::vector::Region;

/// Zone id of cells covered by no region
pub const UNASSIGNED: i32 = 0;

/// Burn regions onto `grid`.
///
/// Region `i` (0-based, input order) gets zone id `i + 1`. The returned
/// raster shares the grid's transform and uses [`UNASSIGNED`] as no-data.
pub fn rasterize_regions(regions: &[Region], grid: &GridSpec) -> Raster<i32> {
    let mut zones = Raster::from_grid(grid, UNASSIGNED);
    zones.set_nodata(Some(UNASSIGNED));

    for (i, region) in regions.iter().enumerate() {
        let zone = i as i32 + 1;
        for polygon in region.geometry.iter() {
            burn_polygon(&mut zones, grid, polygon, zone);
        }
    }
    zones
}

fn burn_polygon(zones: &mut Raster<i32>, grid: &GridSpec, polygon: &Polygon<f64>, zone: i32) {
    if polygon.unsigned_area() == 0.0 {
        return;
    }
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect();

    let Some((min_x, min_y, max_x, max_y)) = ring_bounds(polygon.exterior()) else {
        return;
    };
    let Some((row0, row1, col0, col1)) = cell_window(grid, min_x, min_y, max_x, max_y) else {
        return;
    };

    let data = zones.data_mut();

    // Interior: cell centers by scanline
    let mut crossings = Vec::new();
    for row in row0..=row1 {
        let (_, y) = grid.cell_center(row, 0);
        crossings.clear();
        for ring in &rings {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if (a.y <= y) != (b.y <= y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let start = center_col_at_or_after(grid, span[0]).max(col0);
            let end = center_col_at_or_after(grid, span[1]).min(col1 + 1);
            for col in start..end {
                data[[row, col]] = zone;
            }
        }
    }

    // Boundary: every cell an edge passes through
    for ring in &rings {
        for line in ring.lines() {
            burn_line(data, grid, &line, zone);
        }
    }
}

fn burn_line(data: &mut ndarray::Array2<i32>, grid: &GridSpec, line: &Line<f64>, zone: i32) {
    let (a, b) = (line.start, line.end);
    let Some((row0, row1, col0, col1)) = cell_window(grid, a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    else {
        return;
    };
    for row in row0..=row1 {
        for col in col0..=col1 {
            let x0 = grid.min_x + col as f64 * grid.cell;
            let y1 = grid.max_y - row as f64 * grid.cell;
            let cell = Rect::new(
                coord! { x: x0, y: y1 - grid.cell },
                coord! { x: x0 + grid.cell, y: y1 },
            );
            if cell.intersects(line) {
                data[[row, col]] = zone;
            }
        }
    }
}

/// First column whose center x is >= `x`
fn center_col_at_or_after(grid: &GridSpec, x: f64) -> usize {
    let c = ((x - grid.min_x) / grid.cell - 0.5).ceil();
    if c <= 0.0 {
        0
    } else {
        (c as usize).min(grid.cols)
    }
}

fn ring_bounds(ring: &LineString<f64>) -> Option<(f64, f64, f64, f64)> {
    ring.coords().fold(None, |acc, c| {
        Some(match acc {
            None => (c.x, c.y, c.x, c.y),
            Some((x0, y0, x1, y1)) => (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
        })
    })
}

/// Inclusive `(row0, row1, col0, col1)` of cells overlapping a bounding box,
/// clipped to the grid; `None` when the box misses the grid.
fn cell_window(grid: &GridSpec, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<(usize, usize, usize, usize)> {
    let (gx0, gy0, gx1, gy1) = grid.bounds();
    if !(max_x >= gx0 && min_x <= gx1 && max_y >= gy0 && min_y <= gy1) {
        return None;
    }
    let clamp = |v: f64, n: usize| -> usize {
        if v <= 0.0 { 0 } else { (v as usize).min(n - 1) }
    };
    let col0 = clamp(((min_x - grid.min_x) / grid.cell).floor(), grid.cols);
    let col1 = clamp(((max_x - grid.min_x) / grid.cell).floor(), grid.cols);
    let row0 = clamp(((grid.max_y - max_y) / grid.cell).floor(), grid.rows);
    let row1 = clamp(((grid.max_y - min_y) / grid.cell).floor(), grid.rows);
    Some((row0, row1, col0, col1))
}
