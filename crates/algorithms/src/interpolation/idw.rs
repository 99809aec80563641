//! Inverse Distance Weighting (IDW) interpolation
//!
//! Estimates values at grid cell centers as a weighted average of the k
//! nearest sample points, where weights are inversely proportional to
//! distance raised to a power parameter. The grid is produced in row blocks
//! so the working set is bounded by `block_rows * cols * knn` regardless of
//! the grid size.
//!
//! Reference:
//! Shepard, D. (1968). A two-dimensional interpolation function for
//! irregularly-spaced data. ACM National Conference.

use idwkit_core::raster::{GridSpec, Raster, RasterStatistics};
use idwkit_core::{Algorithm, Error, Result};
use tracing::debug;

use super::kdtree::KdTree;
use super::SamplePoint;
use crate::maybe_rayon::*;

/// Sentinel written to cells whose estimate is not a finite number
pub const NODATA: f32 = -9999.0;

/// Parameters for IDW interpolation
#[derive(Debug, Clone, PartialEq)]
pub struct IdwParams {
    /// Power parameter (default: 2.0). Must be > 1.
    /// Higher values give more weight to nearby points.
    pub power: f64,
    /// Number of nearest samples per cell (default: 32).
    /// Clamped to the sample count.
    pub knn: usize,
    /// Grid rows computed per block (default: 128)
    pub block_rows: usize,
    /// Produce an all-nodata grid instead of failing when there are no samples
    pub allow_empty: bool,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self {
            power: 2.0,
            knn: 32,
            block_rows: 128,
            allow_empty: false,
        }
    }
}

impl IdwParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.power.is_finite() && self.power > 1.0) {
            return Err(Error::InvalidParameter {
                name: "k",
                value: self.power.to_string(),
                reason: "power must be > 1".into(),
            });
        }
        if self.knn < 1 {
            return Err(Error::InvalidParameter {
                name: "knn",
                value: self.knn.to_string(),
                reason: "at least one neighbor is required".into(),
            });
        }
        if self.block_rows < 1 {
            return Err(Error::InvalidParameter {
                name: "block_rows",
                value: self.block_rows.to_string(),
                reason: "blocks must hold at least one row".into(),
            });
        }
        Ok(())
    }
}

/// A run of consecutive grid rows, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    pub start_row: usize,
    pub rows: usize,
    pub values: Vec<f32>,
}

/// What an interpolation run produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdwSummary {
    /// Statistics over valid (non-sentinel) cells
    pub stats: RasterStatistics,
    /// Neighbors actually used per cell
    pub effective_knn: usize,
    /// Number of samples in the index
    pub samples: usize,
}

/// Interpolate values at `queries` from the samples in `index`.
///
/// `values[i]` is the value of sample `i`. A query that coincides exactly
/// with its nearest sample takes that sample's value unchanged. Any
/// non-finite estimate becomes [`NODATA`], as does every query when the
/// index is empty.
pub fn idw_block(queries: &[[f64; 2]], index: &KdTree, values: &[f64], power: f64, knn: usize) -> Vec<f32> {
    let knn_result = index.query_bulk(queries, knn);
    if knn_result.k == 0 {
        return vec![NODATA; queries.len()];
    }

    (0..queries.len())
        .into_par_iter()
        .map(|i| {
            let (distances, indices) = knn_result.row(i);
            if distances[0] == 0.0 {
                return values[indices[0]] as f32;
            }

            let mut sum_w = 0.0;
            let mut sum_wz = 0.0;
            for (&d, &idx) in distances.iter().zip(indices) {
                let w = 1.0 / d.powf(power);
                sum_w += w;
                sum_wz += w * values[idx];
            }

            let z = (sum_wz / sum_w) as f32;
            if z.is_finite() { z } else { NODATA }
        })
        .collect()
}

/// Row-block producer over a grid.
///
/// Yields blocks top to bottom and accumulates statistics as it goes; call
/// [`IdwBlocks::summary`] once the iterator is exhausted.
pub struct IdwBlocks<'a> {
    grid: &'a GridSpec,
    index: &'a KdTree,
    values: &'a [f64],
    params: IdwParams,
    next_row: usize,
    stats: RasterStatistics,
}

/// Start a blocked interpolation of `grid`.
///
/// Fails on invalid parameters, on a value/index length mismatch, and on an
/// empty index unless `params.allow_empty` is set.
pub fn idw_blocks<'a>(
    grid: &'a GridSpec,
    index: &'a KdTree,
    values: &'a [f64],
    params: &IdwParams,
) -> Result<IdwBlocks<'a>> {
    params.validate()?;
    if values.len() != index.len() {
        return Err(Error::Algorithm(format!(
            "{} values for {} indexed samples",
            values.len(),
            index.len()
        )));
    }
    if index.is_empty() && !params.allow_empty {
        return Err(Error::Algorithm("No sample points provided".into()));
    }

    debug!(
        rows = grid.rows,
        cols = grid.cols,
        samples = index.len(),
        knn = params.knn.min(index.len()),
        "idw grid"
    );

    Ok(IdwBlocks {
        grid,
        index,
        values,
        params: params.clone(),
        next_row: 0,
        stats: RasterStatistics::default(),
    })
}

impl IdwBlocks<'_> {
    /// Statistics and neighbor count for the blocks produced so far
    pub fn summary(&self) -> IdwSummary {
        IdwSummary {
            stats: self.stats,
            effective_knn: self.params.knn.min(self.index.len()),
            samples: self.index.len(),
        }
    }
}

impl Iterator for IdwBlocks<'_> {
    type Item = RowBlock;

    fn next(&mut self) -> Option<RowBlock> {
        if self.next_row >= self.grid.rows {
            return None;
        }
        let start_row = self.next_row;
        let end_row = (start_row + self.params.block_rows).min(self.grid.rows);
        self.next_row = end_row;

        let grid = self.grid;
        let queries: Vec<[f64; 2]> = (start_row..end_row)
            .flat_map(|row| {
                (0..grid.cols).map(move |col| {
                    let (x, y) = grid.cell_center(row, col);
                    [x, y]
                })
            })
            .collect();

        let values = idw_block(&queries, self.index, self.values, self.params.power, self.params.knn);
        for &v in &values {
            if v == NODATA {
                self.stats.nodata_count += 1;
            } else {
                self.stats.push(v as f64);
            }
        }

        Some(RowBlock {
            start_row,
            rows: end_row - start_row,
            values,
        })
    }
}

/// Interpolate a whole grid into memory.
///
/// The raster carries the grid's transform and the [`NODATA`] sentinel.
pub fn idw(grid: &GridSpec, index: &KdTree, values: &[f64], params: &IdwParams) -> Result<(Raster<f32>, IdwSummary)> {
    let mut blocks = idw_blocks(grid, index, values, params)?;
    let mut output = Raster::from_grid(grid, NODATA);
    output.set_nodata(Some(NODATA));

    for block in blocks.by_ref() {
        output.write_rows(block.start_row, &block.values)?;
    }

    Ok((output, blocks.summary()))
}

/// IDW as an [`Algorithm`] over a grid and raw sample points
#[derive(Debug, Clone, Copy, Default)]
pub struct Idw;

impl Algorithm for Idw {
    type Input = (GridSpec, Vec<SamplePoint>);
    type Output = (Raster<f32>, IdwSummary);
    type Params = IdwParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "IDW"
    }

    fn description(&self) -> &'static str {
        "Inverse distance weighted interpolation over the k nearest samples"
    }

    fn execute(&self, input: Self::Input, params: IdwParams) -> Result<Self::Output> {
        let (grid, points) = input;
        let positions: Vec<[f64; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let index = KdTree::build(&positions);
        idw(&grid, &index, &values, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_points() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(0.0, 0.0, 10.0),
            SamplePoint::new(100.0, 0.0, 20.0),
            SamplePoint::new(0.0, 100.0, 30.0),
        ]
    }

    /// 3x3 grid whose cell centers sit at x, y in {0, 50, 100}
    fn grid() -> GridSpec {
        GridSpec::from_extent(-25.0, -25.0, 125.0, 125.0, 50.0).unwrap()
    }

    fn params(knn: usize) -> IdwParams {
        IdwParams {
            knn,
            ..IdwParams::default()
        }
    }

    #[test]
    fn test_idw_at_sample_points() {
        let (raster, _) = Idw.execute((grid(), sample_points()), params(3)).unwrap();
        assert_eq!(raster.shape(), (3, 3));
        // Row 2 is y = 0, row 0 is y = 100
        assert_eq!(raster.get(2, 0).unwrap(), 10.0);
        assert_eq!(raster.get(2, 2).unwrap(), 20.0);
        assert_eq!(raster.get(0, 0).unwrap(), 30.0);
    }

    #[test]
    fn test_idw_weighted_blend() {
        let (raster, _) = Idw.execute((grid(), sample_points()), params(3)).unwrap();
        // (50, 0): d = 50, 50, sqrt(12500)
        let w = [1.0 / 2500.0, 1.0 / 2500.0, 1.0 / 12500.0];
        let expected = (w[0] * 10.0 + w[1] * 20.0 + w[2] * 30.0) / (w[0] + w[1] + w[2]);
        assert_relative_eq!(raster.get(2, 1).unwrap() as f64, expected, max_relative = 1e-5);
    }

    #[test]
    fn test_idw_knn_clamped_to_sample_count() {
        let (small, s1) = Idw.execute((grid(), sample_points()), params(3)).unwrap();
        let (large, s2) = Idw.execute((grid(), sample_points()), params(32)).unwrap();
        assert_eq!(small.data(), large.data());
        assert_eq!(s1.effective_knn, 3);
        assert_eq!(s2.effective_knn, 3);
    }

    #[test]
    fn test_idw_block_size_does_not_change_output() {
        let grid = GridSpec::from_extent(0.0, 0.0, 1000.0, 700.0, 37.0).unwrap();
        let pts: Vec<SamplePoint> = (0..40)
            .map(|i| {
                let t = i as f64;
                SamplePoint::new((t * 97.0) % 1000.0, (t * 53.0) % 700.0, t * 0.25)
            })
            .collect();

        let whole = IdwParams {
            block_rows: 1024,
            ..params(8)
        };
        let sliced = IdwParams {
            block_rows: 3,
            ..params(8)
        };
        let (a, sa) = Idw.execute((grid, pts.clone()), whole).unwrap();
        let (b, sb) = Idw.execute((grid, pts), sliced).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(sa.stats.valid_count, sb.stats.valid_count);
        assert_eq!(sa.stats.valid_count, grid.len());
    }

    #[test]
    fn test_idw_stats_match_raster() {
        let (raster, summary) = Idw.execute((grid(), sample_points()), params(3)).unwrap();
        let stats = raster.statistics();
        assert_eq!(summary.stats.valid_count, stats.valid_count);
        assert_eq!(summary.stats.min, Some(10.0));
        assert_eq!(summary.stats.max, Some(30.0));
        assert_relative_eq!(summary.stats.sum, stats.sum, max_relative = 1e-9);
    }

    #[test]
    fn test_idw_empty_points() {
        let err = Idw.execute((grid(), vec![]), IdwParams::default()).unwrap_err();
        assert!(matches!(err, Error::Algorithm(_)));
    }

    #[test]
    fn test_idw_empty_points_allowed() {
        let p = IdwParams {
            allow_empty: true,
            ..IdwParams::default()
        };
        let (raster, summary) = Idw.execute((grid(), vec![]), p).unwrap();
        assert!(raster.data().iter().all(|&v| v == NODATA));
        assert_eq!(summary.stats.valid_count, 0);
        assert_eq!(summary.stats.nodata_count, 9);
    }

    #[test]
    fn test_idw_rejects_low_power() {
        for power in [1.0, 0.5, f64::NAN] {
            let p = IdwParams {
                power,
                ..IdwParams::default()
            };
            assert!(p.validate().unwrap_err().is_invalid_parameter());
        }
        let p = IdwParams {
            power: 1.1,
            ..IdwParams::default()
        };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_idw_rejects_zero_knn() {
        let err = Idw.execute((grid(), sample_points()), params(0)).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_idw_single_point() {
        let pts = vec![SamplePoint::new(3.0, 3.0, 42.0)];
        let (raster, _) = Idw.execute((grid(), pts), IdwParams::default()).unwrap();
        assert!(raster.data().iter().all(|&v| v == 42.0));
    }

    #[test]
    fn test_idw_power_effect() {
        let (low, _) = Idw
            .execute(
                (grid(), sample_points()),
                IdwParams {
                    power: 1.5,
                    ..params(3)
                },
            )
            .unwrap();
        let (high, _) = Idw
            .execute(
                (grid(), sample_points()),
                IdwParams {
                    power: 6.0,
                    ..params(3)
                },
            )
            .unwrap();
        // At (50, 0) the far sample (30) matters less with a higher power
        assert!(high.get(2, 1).unwrap() < low.get(2, 1).unwrap());
    }
}
