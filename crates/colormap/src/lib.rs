//! # idwkit Colormap
//!
//! Color mapping, downsampling and PNG previews for idwkit rasters.
//!
//! The main entry point is [`render_preview`], which shrinks a raster to a
//! maximum dimension with bilinear resampling, colors it with a
//! [`ColorRamp`] and encodes the result as PNG.
//!
//! ## Usage
//!
//! ```ignore
//! use idwkit_colormap::{render_preview, ColormapParams, DEFAULT_MAX_DIM};
//!
//! let png = render_preview(&raster, DEFAULT_MAX_DIM, &ColormapParams::default())?;
//! ```

mod preview;
mod render;
mod resample;
mod scheme;

pub use preview::{encode_png, render_preview, DEFAULT_MAX_DIM};
pub use render::{raster_to_rgba, ColormapParams};
pub use resample::{downsample_bilinear, preview_shape};
pub use scheme::{ColorRamp, ColorStop, Rgb};
