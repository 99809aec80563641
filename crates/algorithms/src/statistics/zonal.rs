//! Zonal mean of a raster over region polygons
//!
//! Regions are burned onto the raster's own grid, then one pass over the
//! cells accumulates a count and sum per zone id. Regions with no valid
//! cell get an absent mean, never zero.

use idwkit_core::raster::{Raster, RasterElement};
use idwkit_core::vector::{Region, RegionRow, RegionTable};
use idwkit_core::{Error, Result, CRS};
use tracing::info;

use crate::vector::rasterize_regions;

/// Coverage figures from one aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZonalSummary {
    /// Valid cells assigned to some region
    pub cells_used: usize,
    /// Regions with at least one valid cell
    pub covered: usize,
    /// Regions in the table
    pub regions: usize,
}

/// Mean of valid `values` cells per zone.
///
/// `zones` must share the shape of `values`; zone `i + 1` belongs to
/// `regions[i]` and zone 0 is ignored.
pub fn zonal_mean<T: RasterElement>(
    values: &Raster<T>,
    zones: &Raster<i32>,
    regions: &[Region],
) -> Result<(RegionTable, ZonalSummary)> {
    let (rows_v, cols_v) = values.shape();
    let (rows_z, cols_z) = zones.shape();

    if rows_v != rows_z || cols_v != cols_z {
        return Err(Error::SizeMismatch {
            er: rows_v,
            ec: cols_v,
            ar: rows_z,
            ac: cols_z,
        });
    }

    let n = regions.len();
    let mut counts = vec![0usize; n + 1];
    let mut sums = vec![0.0f64; n + 1];

    for (&zone, &value) in zones.data().iter().zip(values.data().iter()) {
        if zone <= 0 || zone as usize > n || values.is_nodata(value) {
            continue;
        }
        if let Some(v) = value.to_f64() {
            counts[zone as usize] += 1;
            sums[zone as usize] += v;
        }
    }

    let rows = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let zone = i + 1;
            RegionRow {
                region_id: region.id.clone(),
                attribute: region.attribute,
                mean_value: (counts[zone] > 0).then(|| sums[zone] / counts[zone] as f64),
            }
        })
        .collect();

    let table = RegionTable { rows };
    let summary = ZonalSummary {
        cells_used: counts[1..].iter().sum(),
        covered: table.covered(),
        regions: n,
    };
    Ok((table, summary))
}

/// Aggregate `raster` over `regions`.
///
/// When both the raster and the regions carry a CRS they must be
/// equivalent; regions are expected to be reprojected beforehand.
pub fn aggregate_regions<T: RasterElement>(
    raster: &Raster<T>,
    regions: &[Region],
    regions_crs: Option<&CRS>,
) -> Result<(RegionTable, ZonalSummary)> {
    if let (Some(a), Some(b)) = (raster.crs(), regions_crs) {
        if !a.is_equivalent(b) {
            return Err(Error::CrsMismatch(a.to_string(), b.to_string()));
        }
    }

    let zones = rasterize_regions(regions, &raster.grid());
    let (table, summary) = zonal_mean(raster, &zones, regions)?;

    info!(
        "Cells used (non-zero zone and valid): {} | regions with >=1 valid cell: {} / {}",
        summary.cells_used, summary.covered, summary.regions
    );
    Ok((table, summary))
}
