//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data.
    ///
    /// Sentinels compare exactly; floats additionally treat every
    /// non-finite value as no-data.
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.is_some_and(|nd| *self == nd)
            }

            fn is_float() -> bool {
                false
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                -9999.0
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                !self.is_finite() || nodata.is_some_and(|nd| *self == nd)
            }

            fn is_float() -> bool {
                true
            }
        }
    };
}

impl_raster_element_int!(u8);
impl_raster_element_int!(i32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_sentinel_is_exact() {
        let nd = Some(-9999.0_f32);
        assert!((-9999.0_f32).is_nodata(nd));
        assert!(!(-9998.999_f32).is_nodata(nd));
        assert!(f32::NAN.is_nodata(nd));
        assert!(f32::INFINITY.is_nodata(None));
        assert!(!0.0_f32.is_nodata(nd));
    }

    #[test]
    fn int_without_sentinel_is_always_valid() {
        assert!(!0_i32.is_nodata(None));
        assert!(0_i32.is_nodata(Some(0)));
    }
}
