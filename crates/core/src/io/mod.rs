//! I/O operations for reading and writing geospatial data
//!
//! - GeoTIFF rasters (native, via the `tiff` crate), written strip by strip
//! - Region tables as CSV
//! - Vector datasets as GeoJSON feature collections, read and written

mod geojson;
mod native;
mod table;

pub use geojson::{read_geojson, read_geojson_str, write_geojson};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_blocks,
    write_geotiff_to_buffer, GeoTiffOptions, RasterHeader,
};
pub use table::{read_csv_rows, read_region_table, write_csv_rows, write_region_table};
