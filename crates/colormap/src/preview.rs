//! PNG previews of a raster.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use idwkit_core::raster::Raster;
use idwkit_core::{Error, Result};

use crate::render::{raster_to_rgba, ColormapParams};
use crate::resample::downsample_bilinear;

/// Default longest side of a preview, in pixels
pub const DEFAULT_MAX_DIM: usize = 1400;

/// Encode a row-major RGBA buffer as PNG.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| Error::Other(format!("PNG encoding failed: {e}")))?;
    Ok(out)
}

/// Downsample to `max_dim`, color, and encode as PNG.
pub fn render_preview(raster: &Raster<f32>, max_dim: usize, params: &ColormapParams) -> Result<Vec<u8>> {
    if max_dim == 0 {
        return Err(Error::InvalidParameter {
            name: "max_dim",
            value: max_dim.to_string(),
            reason: "preview must be at least one pixel".into(),
        });
    }
    let small = downsample_bilinear(raster, max_dim);
    let rgba = raster_to_rgba(&small, params);
    encode_png(&rgba, small.cols() as u32, small.rows() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded_png() {
        let mut r = Raster::filled(300, 120, 8.0f32);
        r.set_nodata(Some(-9999.0));
        r.set(0, 0, -9999.0).unwrap();

        let png = render_preview(&r, 100, &ColormapParams::default()).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (40, 100));
        // Mid-range value, translucent
        assert_eq!(img.get_pixel(20, 50).0[3], 160);
    }

    #[test]
    fn small_raster_keeps_size() {
        let r = Raster::filled(3, 5, 1.0f32);
        let png = render_preview(&r, DEFAULT_MAX_DIM, &ColormapParams::default()).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (5, 3));
    }

    #[test]
    fn zero_max_dim_is_rejected() {
        let r = Raster::filled(3, 5, 1.0f32);
        let err = render_preview(&r, 0, &ColormapParams::default()).unwrap_err();
        assert!(err.is_invalid_parameter());
    }
}
