//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Rasters are written as single-band float32,
//! uncompressed strips, with the georeferencing tags needed to read them
//! back without GDAL: ModelPixelScale, ModelTiepoint, GeoKeyDirectory and
//! GDAL_NODATA.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Resolve a GeoTIFF tag code to the variant the decoder keys its directory by.
fn geotag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Rows per strip; also the block height streamed writers must supply
    pub rows_per_strip: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self { rows_per_strip: 128 }
    }
}

/// Everything about a raster except its cell values
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f32>,
}

impl RasterHeader {
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            rows: raster.rows(),
            cols: raster.cols(),
            transform: *raster.transform(),
            crs: raster.crs().cloned(),
            nodata: raster.nodata().and_then(|v| num_traits::cast(v)),
        }
    }
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    let nodata = decoder
        .get_tag_ascii_string(geotag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
        .and_then(num_traits::cast);
    raster.set_nodata(nodata);

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geotag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geotag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(geotag(GEO_KEY_DIRECTORY)).ok()?;
    let mut geographic = None;
    for entry in keys.get(4..)?.chunks_exact(4) {
        // [key, location, count, value]; location 0 means the value is inline
        if entry[1] != 0 || entry[3] == 32767 {
            continue;
        }
        match entry[0] {
            PROJECTED_CS_TYPE_KEY => return Some(CRS::from_epsg(entry[3] as u32)),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(CRS::from_epsg(entry[3] as u32)),
            _ => {}
        }
    }
    geographic
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut file = File::create(path.as_ref())?;
    encode_raster(raster, &mut file, &options.unwrap_or_default())?;
    file.sync_all()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Cursor::new(Vec::new());
    encode_raster(raster, &mut buf, &options.unwrap_or_default())?;
    Ok(buf.into_inner())
}

fn encode_raster<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let header = RasterHeader::of(raster);
    let strip = options.rows_per_strip.max(1);
    let cols = raster.cols();
    let view = raster.view();
    let blocks = (0..raster.rows()).step_by(strip).map(|start| {
        let end = (start + strip).min(view.nrows());
        let block: Vec<f32> = (start..end)
            .flat_map(|r| view.row(r).to_vec())
            .map(|v| num_traits::cast(v).unwrap_or(f32::NAN))
            .collect();
        debug_assert_eq!(block.len(), (end - start) * cols);
        Ok(block)
    });
    write_geotiff_blocks(writer, &header, options, blocks)
}

/// Stream row blocks into a GeoTIFF.
///
/// Each block is row-major float32 and must hold exactly
/// `options.rows_per_strip` rows, except the last which holds the
/// remainder. Only one block is resident at a time.
pub fn write_geotiff_blocks<W, I>(
    writer: W,
    header: &RasterHeader,
    options: &GeoTiffOptions,
    blocks: I,
) -> Result<()>
where
    W: Write + Seek,
    I: IntoIterator<Item = Result<Vec<f32>>>,
{
    if header.rows == 0 || header.cols == 0 {
        return Err(Error::InvalidDimensions {
            width: header.cols,
            height: header.rows,
        });
    }
    let mut encoder = TiffEncoder::new(writer)?;
    let strip = options.rows_per_strip.max(1);
    let mut image = encoder.new_image::<Gray32Float>(header.cols as u32, header.rows as u32)?;
    image.rows_per_strip(strip as u32)?;

    let gt = &header.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image.encoder().write_tag(geotag(MODEL_PIXEL_SCALE), &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image.encoder().write_tag(geotag(MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(geotag(GEO_KEY_DIRECTORY), &geokeys(header.crs.as_ref())[..])?;
    if let Some(nd) = header.nodata {
        image.encoder().write_tag(geotag(GDAL_NODATA), nd.to_string().as_str())?;
    }

    let mut written_rows = 0;
    for block in blocks {
        let block = block?;
        let expected_rows = strip.min(header.rows - written_rows);
        if expected_rows == 0 || block.len() != expected_rows * header.cols {
            return Err(Error::SizeMismatch {
                er: expected_rows,
                ec: header.cols,
                ar: block.len() / header.cols,
                ac: header.cols,
            });
        }
        image.write_strip(&block)?;
        written_rows += expected_rows;
    }
    if written_rows != header.rows {
        return Err(Error::SizeMismatch {
            er: header.rows,
            ec: header.cols,
            ar: written_rows,
            ac: header.cols,
        });
    }
    image.finish()?;
    Ok(())
}

/// GeoKeyDirectory: version 1.1.0, model type, pixel-is-area, and the EPSG
/// code when known.
fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).and_then(|c| u16::try_from(c).ok());
    let geographic = crs.is_some_and(|c| c.is_geographic());
    let model_type = if geographic { 2 } else { 1 };

    let mut keys = vec![
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1,
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    let n = (keys.len() / 4) as u16;
    let mut dir = vec![1, 1, 0, n];
    dir.extend(keys);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster<f32> {
        let data: Vec<f32> = (0..7 * 5).map(|i| i as f32 * 0.1 + 1.0 / 3.0).collect();
        let mut r = Raster::from_vec(data, 7, 5).unwrap();
        r.set(3, 2, -9999.0).unwrap();
        r.set_transform(GeoTransform::from_origin(520_000.0, 480_250.0, 250.0));
        r.set_crs(Some(CRS::from_epsg(3071)));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let r = sample_raster();
        // one strip, then strips with a short remainder
        for rows_per_strip in [7, 3] {
            let opts = GeoTiffOptions { rows_per_strip };
            let buf = write_geotiff_to_buffer(&r, Some(opts)).unwrap();
            let back: Raster<f32> = read_geotiff_from_buffer(&buf).unwrap();

            assert_eq!(back.shape(), (7, 5));
            assert_eq!(back.transform(), r.transform());
            assert_eq!(back.nodata(), Some(-9999.0));
            assert_eq!(back.crs(), Some(&CRS::from_epsg(3071)));
            for (a, b) in r.data().iter().zip(back.data().iter()) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }

    #[test]
    fn test_geographic_crs_roundtrip() {
        let mut r = sample_raster();
        r.set_crs(Some(CRS::wgs84()));
        let buf = write_geotiff_to_buffer(&r, None).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.crs(), Some(&CRS::wgs84()));
    }

    #[test]
    fn test_blocks_must_match_strips() {
        let header = RasterHeader {
            rows: 4,
            cols: 2,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        };
        let opts = GeoTiffOptions { rows_per_strip: 2 };

        let ok = vec![Ok(vec![0.0; 4]), Ok(vec![1.0; 4])];
        assert!(write_geotiff_blocks(Cursor::new(Vec::new()), &header, &opts, ok).is_ok());

        let short = vec![Ok(vec![0.0; 4])];
        assert!(write_geotiff_blocks(Cursor::new(Vec::new()), &header, &opts, short).is_err());

        let ragged = vec![Ok(vec![0.0; 3]), Ok(vec![1.0; 5])];
        assert!(write_geotiff_blocks(Cursor::new(Vec::new()), &header, &opts, ragged).is_err());
    }

    #[test]
    fn test_streamed_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idw.tif");
        let r = sample_raster();
        let header = RasterHeader::of(&r);
        let opts = GeoTiffOptions { rows_per_strip: 2 };
        let view = r.view();
        let blocks = (0..r.rows()).step_by(2).map(|start| {
            let end = (start + 2).min(r.rows());
            Ok((start..end).flat_map(|row| view.row(row).to_vec()).collect::<Vec<f32>>())
        });
        write_geotiff_blocks(File::create(&path).unwrap(), &header, &opts, blocks).unwrap();

        let back: Raster<f32> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), r.shape());
        assert_eq!(back.get(3, 2).unwrap(), -9999.0);
        assert_eq!(back.get(6, 4).unwrap().to_bits(), r.get(6, 4).unwrap().to_bits());
    }

    #[test]
    fn test_missing_file() {
        let err = read_geotiff::<f32, _>("/nonexistent/idw.tif").unwrap_err();
        assert!(err.is_missing_input());
    }
}
