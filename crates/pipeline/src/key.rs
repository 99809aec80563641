//! Cache keys and artifact file naming
//!
//! Every component that reads or writes the cache derives file names here,
//! so a parameter tuple always maps to the same set of paths.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Interpolation parameters as requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationParams {
    /// Distance decay exponent, > 1
    pub k: f64,
    /// Cell size in meters; truncated to whole meters
    pub cell: f64,
    /// Neighbors per cell, >= 1
    pub knn: usize,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            k: 2.0,
            cell: 500.0,
            knn: 32,
        }
    }
}

impl InterpolationParams {
    pub fn new(k: f64, cell: f64, knn: usize) -> Self {
        Self { k, cell, knn }
    }

    /// Validate and derive the cache key. Performs no I/O.
    pub fn key(&self) -> Result<CacheKey> {
        if !(self.k.is_finite() && self.k > 1.0) {
            return Err(PipelineError::Precondition {
                name: "k",
                value: self.k.to_string(),
                reason: "k must be > 1".into(),
            });
        }
        if !(self.cell.is_finite() && self.cell >= 1.0 && self.cell <= u32::MAX as f64) {
            return Err(PipelineError::Precondition {
                name: "cell",
                value: self.cell.to_string(),
                reason: "cell must be at least 1 meter".into(),
            });
        }
        if self.knn < 1 {
            return Err(PipelineError::Precondition {
                name: "knn",
                value: self.knn.to_string(),
                reason: "knn must be >= 1".into(),
            });
        }
        Ok(CacheKey {
            k: self.k,
            cell_m: self.cell.trunc() as u32,
            knn: self.knn,
        })
    }
}

/// Validated identity of one disjoint set of artifacts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheKey {
    k: f64,
    cell_m: u32,
    knn: usize,
}

impl CacheKey {
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Cell size used for computation, in whole meters
    pub fn cell_m(&self) -> u32 {
        self.cell_m
    }

    pub fn knn(&self) -> usize {
        self.knn
    }

    /// `k{tag}_cs{cell}m_knn{knn}`, e.g. `k2p5_cs500m_knn32`
    pub fn encode(&self) -> String {
        format!("k{}_cs{}m_knn{}", k_tag(self.k), self.cell_m, self.knn)
    }

    /// Path of `artifact` relative to the cache root
    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        let key = self.encode();
        match artifact {
            Artifact::Raster => PathBuf::from("idw").join(format!("idw_{key}.tif")),
            Artifact::Metadata => PathBuf::from("idw").join(format!("idw_{key}.meta.json")),
            Artifact::Table => PathBuf::from("tables").join(format!("region_mean_{key}.csv")),
            Artifact::Summary => PathBuf::from("results").join(format!("regression_{key}.json")),
            Artifact::Residuals => PathBuf::from("results").join(format!("residuals_{key}.csv")),
            Artifact::Regions => PathBuf::from("vector").join(format!("regions_{key}.geojson")),
            Artifact::Preview { max_dim } => PathBuf::from("web").join(format!("idw_{key}_max{max_dim}.png")),
        }
    }

    /// Path of the key's lock file relative to the cache root
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from("locks").join(format!("{}.lock", self.encode()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Shortest round-trip decimal of `k` with '.' replaced by 'p'
fn k_tag(k: f64) -> String {
    format!("{k:?}").replace('.', "p")
}

/// One derived artifact under a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {
    Raster,
    Metadata,
    Table,
    Summary,
    Residuals,
    /// Region polygons with their mean, prediction and residual
    Regions,
    Preview { max_dim: usize },
}

impl Artifact {
    /// Artifacts that must be published before this one can be generated
    pub fn upstream(&self) -> &'static [Artifact] {
        match self {
            Artifact::Raster => &[],
            Artifact::Metadata | Artifact::Table | Artifact::Preview { .. } => &[Artifact::Raster],
            Artifact::Summary | Artifact::Residuals => &[Artifact::Table],
            Artifact::Regions => &[Artifact::Table, Artifact::Residuals],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Raster => "raster",
            Artifact::Metadata => "metadata",
            Artifact::Table => "table",
            Artifact::Summary => "summary",
            Artifact::Residuals => "residuals",
            Artifact::Regions => "regions",
            Artifact::Preview { .. } => "preview",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
