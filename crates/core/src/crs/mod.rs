//! Coordinate Reference System identity
//!
//! idwkit never reprojects. A CRS is carried along with rasters and vector
//! datasets so that stages can refuse to mix coordinate systems.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// Parse an authority string such as `EPSG:3071` or
    /// `urn:ogc:def:crs:EPSG::3071`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let upper = s.to_ascii_uppercase();
        let idx = upper.rfind("EPSG")?;
        let code = upper[idx + 4..]
            .trim_start_matches(|c: char| c == ':' || c == '/')
            .parse::<u32>()
            .ok()?;
        Some(Self::from_epsg(code))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether the EPSG code belongs to a geographic (lat/lon) system.
    ///
    /// Only the common geographic codes are recognised; everything else is
    /// treated as projected, which is what analysis grids in meters need.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326 | 4269 | 4258 | 4283 | 4167))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt.char_indices().nth(50).map_or(wkt.len(), |(i, _)| i);
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(3071);
        assert_eq!(crs.epsg(), Some(3071));
        assert_eq!(crs.identifier(), "EPSG:3071");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn test_crs_parse() {
        assert_eq!(CRS::parse("EPSG:3071"), Some(CRS::from_epsg(3071)));
        assert_eq!(
            CRS::parse("urn:ogc:def:crs:EPSG::4326"),
            Some(CRS::wgs84())
        );
        assert_eq!(CRS::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), None);
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326);
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::from_epsg(3071)));
        assert!(!a.is_equivalent(&CRS::from_wkt("LOCAL_CS[]")));
    }
}
