//! Raster-to-RGBA rendering using color ramps.

use crate::scheme::{ColorRamp, Rgb};
use idwkit_core::raster::{Raster, RasterElement};

/// Parameters for colormap rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ColormapParams {
    pub ramp: ColorRamp,
    /// Minimum value for normalization. Values below this are clamped.
    pub min: f64,
    /// Maximum value for normalization. Values above this are clamped.
    pub max: f64,
    /// Alpha of every valid pixel
    pub alpha: u8,
    /// Color for nodata pixels (RGBA). Default: fully transparent.
    pub nodata_color: [u8; 4],
}

impl Default for ColormapParams {
    /// Concentration ramp over 0..16, alpha 160
    fn default() -> Self {
        Self {
            ramp: ColorRamp::CONCENTRATION,
            min: 0.0,
            max: 16.0,
            alpha: 160,
            nodata_color: [0, 0, 0, 0],
        }
    }
}

impl ColormapParams {
    /// Create params with explicit min/max range.
    pub fn with_range(ramp: ColorRamp, min: f64, max: f64) -> Self {
        Self {
            ramp,
            min,
            max,
            ..Self::default()
        }
    }
}

/// Convert a raster to an RGBA pixel buffer.
///
/// Returns a `Vec<u8>` of length `rows * cols * 4` in row-major order.
/// Nodata and non-finite pixels are rendered with `params.nodata_color`.
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let nodata = raster.nodata();
    let span = params.max - params.min + 1e-9;

    let mut rgba = Vec::with_capacity(raster.len() * 4);
    for val in raster.data().iter() {
        match val.to_f64() {
            Some(v) if !val.is_nodata(nodata) => {
                let t = (v.clamp(params.min, params.max) - params.min) / span;
                let Rgb { r, g, b } = params.ramp.evaluate(t);
                rgba.extend_from_slice(&[r, g, b, params.alpha]);
            }
            _ => rgba.extend_from_slice(&params.nodata_color),
        }
    }
    rgba
}
