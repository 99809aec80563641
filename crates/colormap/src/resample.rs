//! Bilinear downsampling for previews.

use idwkit_core::raster::{GeoTransform, Raster};

/// Output shape `(rows, cols)` so the longer side is at most `max_dim`.
///
/// Never upscales; each side keeps at least one pixel.
pub fn preview_shape(rows: usize, cols: usize, max_dim: usize) -> (usize, usize) {
    let longest = rows.max(cols);
    if longest == 0 || longest <= max_dim {
        return (rows, cols);
    }
    let scale = max_dim as f64 / longest as f64;
    (
        ((rows as f64 * scale) as usize).max(1),
        ((cols as f64 * scale) as usize).max(1),
    )
}

/// Shrink `raster` so neither side exceeds `max_dim`, using bilinear weights.
///
/// Nodata neighbours are left out of the weighted mean; an output pixel
/// whose neighbours are all nodata stays nodata. The transform is rescaled
/// so the output covers the same extent.
pub fn downsample_bilinear(raster: &Raster<f32>, max_dim: usize) -> Raster<f32> {
    let (rows, cols) = raster.shape();
    let (out_rows, out_cols) = preview_shape(rows, cols, max_dim);
    if (out_rows, out_cols) == (rows, cols) {
        return raster.clone();
    }

    let nodata = raster.nodata().unwrap_or(f32::NAN);
    let src = raster.view();
    let sy = rows as f64 / out_rows as f64;
    let sx = cols as f64 / out_cols as f64;

    let mut data = Vec::with_capacity(out_rows * out_cols);
    for orow in 0..out_rows {
        let fy = ((orow as f64 + 0.5) * sy - 0.5).clamp(0.0, (rows - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(rows - 1);
        let wy = fy - y0 as f64;

        for ocol in 0..out_cols {
            let fx = ((ocol as f64 + 0.5) * sx - 0.5).clamp(0.0, (cols - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(cols - 1);
            let wx = fx - x0 as f64;

            let taps = [
                (y0, x0, (1.0 - wy) * (1.0 - wx)),
                (y0, x1, (1.0 - wy) * wx),
                (y1, x0, wy * (1.0 - wx)),
                (y1, x1, wy * wx),
            ];
            let mut sum = 0.0;
            let mut weight = 0.0;
            for (r, c, w) in taps {
                let v = src[[r, c]];
                if w > 0.0 && !raster.is_nodata(v) {
                    sum += w * v as f64;
                    weight += w;
                }
            }
            data.push(if weight > 0.0 { (sum / weight) as f32 } else { nodata });
        }
    }

    // Shape always matches `data`
    let mut out = Raster::from_vec(data, out_rows, out_cols).unwrap_or_else(|_| Raster::filled(out_rows, out_cols, nodata));
    let gt = raster.transform();
    out.set_transform(GeoTransform::new(
        gt.origin_x,
        gt.origin_y,
        gt.pixel_width * sx,
        gt.pixel_height * sy,
    ));
    out.set_crs(raster.crs().cloned());
    out.set_nodata(raster.nodata());
    out
}
