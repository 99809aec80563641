//! Mapping grid coordinates into a display coordinate system

use idwkit_core::Result;

/// Transforms analysis-grid coordinates for display (e.g. to WGS84 for a web map).
///
/// Real reprojection is supplied by the embedding application.
pub trait DisplayProjection: Send + Sync {
    /// Identifier of the target coordinate system
    fn target(&self) -> String;

    fn project(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// Leaves coordinates in the analysis CRS
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjection;

impl DisplayProjection for IdentityProjection {
    fn target(&self) -> String {
        "analysis".into()
    }

    fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}
