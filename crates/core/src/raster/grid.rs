//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, GridSpec, RasterElement};
use ndarray::{Array2, ArrayView2, s};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in row-major order with the
/// transform, CRS and no-data sentinel needed to interpret them.
///
/// # Example
///
/// ```ignore
/// use idwkit_core::Raster;
///
/// let mut raster: Raster<f32> = Raster::new(100, 100);
/// raster.set(10, 20, 42.0)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster covering `grid`, filled with `value`
    pub fn from_grid(grid: &GridSpec, value: T) -> Self {
        let mut raster = Self::filled(grid.rows, grid.cols, value);
        raster.transform = grid.transform();
        raster
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            }),
        }
    }

    /// Overwrite whole rows starting at `start_row` with row-major `values`.
    pub fn write_rows(&mut self, start_row: usize, values: &[T]) -> Result<()> {
        let cols = self.cols();
        if cols == 0 || values.len() % cols != 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: values.len().checked_div(cols).unwrap_or(0),
            });
        }
        let n_rows = values.len() / cols;
        let end_row = start_row + n_rows;
        if end_row > self.rows() {
            return Err(Error::IndexOutOfBounds {
                row: end_row - 1,
                col: 0,
                rows: self.rows(),
                cols,
            });
        }
        let block = ArrayView2::from_shape((n_rows, cols), values)
            .map_err(|e| Error::Other(e.to_string()))?;
        self.data.slice_mut(s![start_row..end_row, ..]).assign(&block);
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// The grid this raster is laid out on
    pub fn grid(&self) -> GridSpec {
        GridSpec::from_transform(&self.transform, self.rows(), self.cols())
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Calculate min, max, mean and counts over valid cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut stats = RasterStatistics::default();
        for &value in self.data.iter() {
            match value.to_f64() {
                Some(v) if !self.is_nodata(value) => stats.push(v),
                _ => stats.nodata_count += 1,
            }
        }
        stats
    }
}

/// Running statistics over valid raster cells.
///
/// Accumulates incrementally so a raster computed block by block can be
/// summarised without a second pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub valid_count: usize,
    pub nodata_count: usize,
}

impl Default for RasterStatistics {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            sum: 0.0,
            valid_count: 0,
            nodata_count: 0,
        }
    }
}

impl RasterStatistics {
    /// Add one valid value
    #[inline]
    pub fn push(&mut self, v: f64) {
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.sum += v;
        self.valid_count += 1;
    }

    /// Mean of valid cells, `None` if there are none
    pub fn mean(&self) -> Option<f64> {
        (self.valid_count > 0).then(|| self.sum / self.valid_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
        assert!(raster.set(0, 10, 1.0).is_err());
    }

    #[test]
    fn test_write_rows() {
        let mut raster: Raster<f32> = Raster::new(4, 3);
        raster.write_rows(1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(raster.get(0, 0).unwrap(), 0.0);
        assert_eq!(raster.get(1, 2).unwrap(), 3.0);
        assert_eq!(raster.get(2, 0).unwrap(), 4.0);
        assert_eq!(raster.get(3, 0).unwrap(), 0.0);

        assert!(raster.write_rows(3, &[1.0; 6]).is_err());
        assert!(raster.write_rows(0, &[1.0; 4]).is_err());
    }

    #[test]
    fn test_raster_statistics_skip_sentinel() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }
        raster.set(0, 0, -9999.0).unwrap();
        raster.set_nodata(Some(-9999.0));

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut a = RasterStatistics::default();
        a.push(2.0);
        a.push(4.0);
        a.push(-1.0);
        assert_eq!(a.min, Some(-1.0));
        assert_eq!(a.max, Some(4.0));
        assert_eq!(a.valid_count, 3);
        assert_eq!(a.nodata_count, 0);
        assert_eq!(a.mean(), Some(5.0 / 3.0));
        assert_eq!(RasterStatistics::default().mean(), None);
    }
}
