//! # idwkit Algorithms
//!
//! Analysis algorithms for idwkit.
//!
//! ## Available Algorithm Categories
//!
//! - **interpolation**: k-d tree spatial index, blocked IDW
//! - **vector**: Region polygon rasterization
//! - **statistics**: Zonal mean, bivariate OLS regression

pub mod interpolation;
pub(crate) mod maybe_rayon;
pub mod statistics;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::interpolation::{
        idw, idw_blocks, Idw, IdwBlocks, IdwParams, IdwSummary, KdTree, SamplePoint, SampleSet, NODATA,
    };
    pub use crate::statistics::{aggregate_regions, regress_table, RegressionSummary, ResidualRow, ZonalSummary};
    pub use crate::vector::rasterize_regions;
    pub use idwkit_core::prelude::*;
}
