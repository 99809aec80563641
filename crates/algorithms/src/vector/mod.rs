//! Vector operations on region polygons

mod rasterize;

pub use rasterize::{rasterize_regions, UNASSIGNED};
