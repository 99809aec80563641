//! Statistical reductions of interpolated rasters
//!
//! - **zonal**: Mean per region polygon
//! - **regression**: OLS of a region attribute on its zonal mean

pub mod regression;
pub mod zonal;

pub use regression::{ols, regress_table, OlsFit, OlsParams, RegressionSummary, ResidualRow};
pub use zonal::{aggregate_regions, zonal_mean, ZonalSummary};
