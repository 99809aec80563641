//! Ensure-outputs orchestration
//!
//! Per cache key: fast path without locking when every requested artifact
//! is published; otherwise take the key's lock, re-check, and generate the
//! missing artifacts and their missing upstreams in dependency order.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use idwkit_algorithms::interpolation::{idw_blocks, IdwParams, NODATA};
use idwkit_algorithms::statistics::{aggregate_regions, regress_table, ResidualRow};
use idwkit_colormap::{render_preview, ColorRamp, ColormapParams};
use idwkit_core::io::{
    read_csv_rows, read_geotiff, read_region_table, write_csv_rows, write_geojson, write_geotiff_blocks,
    write_region_table, GeoTiffOptions, RasterHeader,
};
use idwkit_core::vector::{AttributeValue, Feature, FeatureCollection};
use idwkit_core::{GridSpec, Raster};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::config::PipelineConfig;
use crate::datasets::Datasets;
use crate::error::{PipelineError, Result};
use crate::key::{Artifact, CacheKey, InterpolationParams};
use crate::projection::{DisplayProjection, IdentityProjection};
use crate::store::{ArtifactStore, FsArtifactStore};

/// Which artifacts a caller needs. The raster is always implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputRequest {
    pub metadata: bool,
    pub table: bool,
    pub summary: bool,
    pub residuals: bool,
    /// Region polygons joined with mean, prediction and residual (GeoJSON)
    pub regions: bool,
    /// Preview with this longest side, in pixels
    pub preview: Option<usize>,
}

impl OutputRequest {
    /// Just the raster
    pub fn raster() -> Self {
        Self::default()
    }

    /// Every artifact kind, preview at `max_dim`
    pub fn all(max_dim: usize) -> Self {
        Self {
            metadata: true,
            table: true,
            summary: true,
            residuals: true,
            regions: true,
            preview: Some(max_dim),
        }
    }

    pub fn with_metadata(mut self) -> Self {
        self.metadata = true;
        self
    }

    pub fn with_table(mut self) -> Self {
        self.table = true;
        self
    }

    pub fn with_summary(mut self) -> Self {
        self.summary = true;
        self
    }

    pub fn with_residuals(mut self) -> Self {
        self.residuals = true;
        self
    }

    pub fn with_regions(mut self) -> Self {
        self.regions = true;
        self
    }

    pub fn with_preview(mut self, max_dim: usize) -> Self {
        self.preview = Some(max_dim);
        self
    }

    /// Requested artifacts, raster first
    pub fn artifacts(&self) -> Vec<Artifact> {
        let mut out = vec![Artifact::Raster];
        if self.metadata {
            out.push(Artifact::Metadata);
        }
        if self.table {
            out.push(Artifact::Table);
        }
        if self.summary {
            out.push(Artifact::Summary);
        }
        if self.residuals {
            out.push(Artifact::Residuals);
        }
        if self.regions {
            out.push(Artifact::Regions);
        }
        if let Some(max_dim) = self.preview {
            out.push(Artifact::Preview { max_dim });
        }
        out
    }
}

/// Published locations of the requested artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub key: String,
    pub raster: PathBuf,
    pub metadata: Option<PathBuf>,
    pub table: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub residuals: Option<PathBuf>,
    pub regions: Option<PathBuf>,
    pub preview: Option<PathBuf>,
}

/// Counts of stage executions
#[derive(Debug, Default)]
pub struct GenerationCounters {
    passes: AtomicUsize,
    raster: AtomicUsize,
    metadata: AtomicUsize,
    table: AtomicUsize,
    summary: AtomicUsize,
    regions: AtomicUsize,
    preview: AtomicUsize,
}

/// Point-in-time copy of [`GenerationCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Lock-held passes that generated at least one artifact
    pub passes: usize,
    pub raster: usize,
    pub metadata: usize,
    pub table: usize,
    /// Summary and residuals are produced by one stage
    pub summary: usize,
    pub regions: usize,
    pub preview: usize,
}

impl GenerationCounters {
    fn record(&self, stage: Artifact) {
        let counter = match stage {
            Artifact::Raster => &self.raster,
            Artifact::Metadata => &self.metadata,
            Artifact::Table => &self.table,
            Artifact::Summary | Artifact::Residuals => &self.summary,
            Artifact::Regions => &self.regions,
            Artifact::Preview { .. } => &self.preview,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            passes: self.passes.load(Ordering::SeqCst),
            raster: self.raster.load(Ordering::SeqCst),
            metadata: self.metadata.load(Ordering::SeqCst),
            table: self.table.load(Ordering::SeqCst),
            summary: self.summary.load(Ordering::SeqCst),
            regions: self.regions.load(Ordering::SeqCst),
            preview: self.preview.load(Ordering::SeqCst),
        }
    }
}

/// Valid-cell statistics as published in metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub max: Option<f64>,
    pub valid_count: usize,
}

/// Metadata document published next to each raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub key: String,
    pub k: f64,
    pub cell: u32,
    pub knn: usize,
    pub raster: String,
    pub rows: usize,
    pub cols: usize,
    /// `[min_x, min_y, max_x, max_y]` in the analysis CRS
    pub bounds: [f64; 4],
    pub crs: Option<String>,
    pub nodata: Option<f32>,
    pub stats: ValueStats,
    pub display_crs: String,
    /// Corners tl, tr, br, bl in the display CRS
    pub coordinates: [[f64; 2]; 4],
}

/// k values warmed by default: 1.1, 1.2, ..., 6.0
pub fn default_warm_ks() -> Vec<f64> {
    (11..=60).map(|x| x as f64 / 10.0).collect()
}

/// Cache orchestrator over an [`ArtifactStore`]
pub struct Pipeline<S: ArtifactStore = FsArtifactStore> {
    store: S,
    config: PipelineConfig,
    datasets: Mutex<Option<Arc<Datasets>>>,
    projection: Box<dyn DisplayProjection>,
    counters: GenerationCounters,
}

impl Pipeline<FsArtifactStore> {
    /// Filesystem cache at `config.cache_dir`
    pub fn new(config: PipelineConfig) -> Self {
        let store = FsArtifactStore::new(config.cache_dir.clone());
        Self::with_store(store, config)
    }
}

impl<S: ArtifactStore> Pipeline<S> {
    pub fn with_store(store: S, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            datasets: Mutex::new(None),
            projection: Box::new(IdentityProjection),
            counters: GenerationCounters::default(),
        }
    }

    /// Use already loaded datasets instead of reading `config.samples`/`config.regions`
    pub fn with_datasets(self, datasets: Datasets) -> Self {
        Self {
            datasets: Mutex::new(Some(Arc::new(datasets))),
            ..self
        }
    }

    pub fn with_projection(self, projection: impl DisplayProjection + 'static) -> Self {
        Self {
            projection: Box::new(projection),
            ..self
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn counters(&self) -> &GenerationCounters {
        &self.counters
    }

    /// Make every artifact in `request` present for `params` and return its paths.
    ///
    /// Parameters are validated before any I/O. Concurrent calls for one key
    /// generate at most once; a failed stage publishes nothing and is
    /// retried by the next call.
    pub fn ensure_outputs(&self, params: &InterpolationParams, request: &OutputRequest) -> Result<OutputPaths> {
        let key = params.key()?;
        if request.preview == Some(0) {
            return Err(PipelineError::Precondition {
                name: "max_dim",
                value: "0".into(),
                reason: "preview must be at least one pixel".into(),
            });
        }

        let span = info_span!("ensure_outputs", key = %key);
        let _enter = span.enter();

        if let Ok(paths) = self.collect(&key, request) {
            debug!("all requested artifacts already published");
            return Ok(paths);
        }

        let lock = self.store.begin_generate(&key)?;
        let todo = self.plan(&key, &request.artifacts());
        if todo.is_empty() {
            debug!("published by another holder while waiting");
        } else {
            self.counters.passes.fetch_add(1, Ordering::SeqCst);
            let stages: Vec<&str> = todo.iter().map(Artifact::name).collect();
            info!(?stages, "generating");
            for &artifact in &todo {
                match artifact {
                    Artifact::Raster => self.stage_raster(&lock, &key)?,
                    Artifact::Metadata => self.stage_metadata(&lock, &key)?,
                    Artifact::Table => self.stage_table(&lock, &key)?,
                    Artifact::Summary => {
                        self.stage_summary(&lock, &key, true, todo.contains(&Artifact::Residuals))?
                    }
                    Artifact::Residuals if !todo.contains(&Artifact::Summary) => {
                        self.stage_summary(&lock, &key, false, true)?
                    }
                    Artifact::Residuals => {}
                    Artifact::Regions => self.stage_regions(&lock, &key)?,
                    Artifact::Preview { max_dim } => self.stage_preview(&lock, &key, max_dim)?,
                }
            }
        }
        drop(lock);

        self.collect(&key, request).map_err(|missing| PipelineError::Consistency {
            key: key.to_string(),
            stage: missing,
            missing: key.artifact_path(missing),
        })
    }

    /// Ensure `request` for each k in `ks` at a fixed cell size and knn.
    pub fn warm(&self, ks: &[f64], cell: f64, knn: usize, request: &OutputRequest) -> Result<Vec<OutputPaths>> {
        info!("Warming cache for {} k values", ks.len());
        let paths = ks
            .iter()
            .map(|&k| {
                info!(k, "warming");
                self.ensure_outputs(&InterpolationParams::new(k, cell, knn), request)
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Cache warm complete");
        Ok(paths)
    }

    /// Published paths for `request`, or the first artifact that is missing
    fn collect(&self, key: &CacheKey, request: &OutputRequest) -> std::result::Result<OutputPaths, Artifact> {
        let get = |a: Artifact| self.store.try_get(key, a).ok_or(a);
        let optional = |wanted: bool, a: Artifact| -> std::result::Result<Option<PathBuf>, Artifact> {
            if wanted { get(a).map(Some) } else { Ok(None) }
        };
        Ok(OutputPaths {
            key: key.encode(),
            raster: get(Artifact::Raster)?,
            metadata: optional(request.metadata, Artifact::Metadata)?,
            table: optional(request.table, Artifact::Table)?,
            summary: optional(request.summary, Artifact::Summary)?,
            residuals: optional(request.residuals, Artifact::Residuals)?,
            regions: optional(request.regions, Artifact::Regions)?,
            preview: match request.preview {
                Some(max_dim) => Some(get(Artifact::Preview { max_dim })?),
                None => None,
            },
        })
    }

    /// Missing artifacts among `wanted` plus their missing upstreams, in dependency order
    fn plan(&self, key: &CacheKey, wanted: &[Artifact]) -> BTreeSet<Artifact> {
        let mut todo = BTreeSet::new();
        let mut stack = wanted.to_vec();
        while let Some(artifact) = stack.pop() {
            if todo.contains(&artifact) || self.store.try_get(key, artifact).is_some() {
                continue;
            }
            todo.insert(artifact);
            stack.extend_from_slice(artifact.upstream());
        }
        todo
    }

    /// Path of a published upstream, or a consistency error
    fn upstream(&self, key: &CacheKey, stage: Artifact, upstream: Artifact) -> Result<PathBuf> {
        self.store.try_get(key, upstream).ok_or_else(|| PipelineError::Consistency {
            key: key.to_string(),
            stage,
            missing: key.artifact_path(upstream),
        })
    }

    fn datasets(&self, key: &CacheKey, stage: Artifact) -> Result<Arc<Datasets>> {
        let mut slot = self.datasets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(datasets) = slot.as_ref() {
            return Ok(Arc::clone(datasets));
        }
        let loaded = Arc::new(
            Datasets::load(&self.config).map_err(|e| PipelineError::from_stage(key, stage, e))?,
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn read_raster(&self, key: &CacheKey, stage: Artifact) -> Result<Raster<f32>> {
        let path = self.upstream(key, stage, Artifact::Raster)?;
        read_geotiff(&path).map_err(|e| PipelineError::from_stage(key, stage, e))
    }

    fn stage_raster(&self, lock: &S::Lock, key: &CacheKey) -> Result<()> {
        let stage = Artifact::Raster;
        let fail = |e: idwkit_core::Error| PipelineError::from_stage(key, stage, e);
        let started = Instant::now();

        let data = self.datasets(key, stage)?;
        let (min_x, min_y, max_x, max_y) = data.extent;
        let grid = GridSpec::from_extent(min_x, min_y, max_x, max_y, key.cell_m() as f64).map_err(fail)?;
        let params = IdwParams {
            power: key.k(),
            knn: key.knn(),
            block_rows: self.config.block_rows,
            allow_empty: self.config.allow_empty_samples,
        };

        info!(
            k = key.k(),
            cell = key.cell_m(),
            knn = key.knn(),
            cols = grid.cols,
            rows = grid.rows,
            "IDW raster: {} cells over extent ({:.3}, {:.3}, {:.3}, {:.3})",
            grid.len(),
            min_x,
            min_y,
            max_x,
            max_y
        );

        let mut blocks = idw_blocks(&grid, &data.index, &data.values, &params).map_err(fail)?;
        let header = RasterHeader {
            rows: grid.rows,
            cols: grid.cols,
            transform: grid.transform(),
            crs: data.crs.clone(),
            nodata: Some(NODATA),
        };
        let options = GeoTiffOptions {
            rows_per_strip: params.block_rows,
        };
        let loaded = started.elapsed();

        self.store.publish(lock, stage, |file| {
            write_geotiff_blocks(file, &header, &options, blocks.by_ref().map(|b| Ok(b.values)))
        })?;

        let summary = blocks.summary();
        let stats = summary.stats;
        info!(
            effective_knn = summary.effective_knn,
            "Valid cell stats: min={:.4}, mean={:.4}, max={:.4} (n={})",
            stats.min.unwrap_or(f64::NAN),
            stats.mean().unwrap_or(f64::NAN),
            stats.max.unwrap_or(f64::NAN),
            stats.valid_count
        );
        info!(
            "Timing: load+prep={:.2}s, compute+write={:.2}s",
            loaded.as_secs_f64(),
            (started.elapsed() - loaded).as_secs_f64()
        );
        self.counters.record(stage);
        Ok(())
    }

    fn stage_metadata(&self, lock: &S::Lock, key: &CacheKey) -> Result<()> {
        let stage = Artifact::Metadata;
        let fail = |e: idwkit_core::Error| PipelineError::from_stage(key, stage, e);

        let raster = self.read_raster(key, stage)?;
        let stats = raster.statistics();
        let (x0, y0, x1, y1) = raster.bounds();
        let mut coordinates = [[0.0; 2]; 4];
        for (slot, (x, y)) in coordinates.iter_mut().zip([(x0, y1), (x1, y1), (x1, y0), (x0, y0)]) {
            let (px, py) = self.projection.project(x, y).map_err(fail)?;
            *slot = [px, py];
        }

        let raster_name = key
            .artifact_path(Artifact::Raster)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = RasterMetadata {
            key: key.encode(),
            k: key.k(),
            cell: key.cell_m(),
            knn: key.knn(),
            raster: raster_name,
            rows: raster.rows(),
            cols: raster.cols(),
            bounds: [x0, y0, x1, y1],
            crs: raster.crs().map(|c| c.identifier()),
            nodata: raster.nodata(),
            stats: ValueStats {
                min: stats.min,
                mean: stats.mean(),
                max: stats.max,
                valid_count: stats.valid_count,
            },
            display_crs: self.projection.target(),
            coordinates,
        };

        self.store.publish(lock, stage, |file| {
            serde_json::to_writer_pretty(file, &meta)?;
            Ok(())
        })?;
        self.counters.record(stage);
        Ok(())
    }

    fn stage_table(&self, lock: &S::Lock, key: &CacheKey) -> Result<()> {
        let stage = Artifact::Table;
        let raster = self.read_raster(key, stage)?;
        let data = self.datasets(key, stage)?;

        let (table, summary) = aggregate_regions(&raster, &data.regions, data.crs.as_ref())
            .map_err(|e| PipelineError::from_stage(key, stage, e))?;
        info!(
            regions = summary.regions,
            cells_used = summary.cells_used,
            covered = summary.covered,
            "region table"
        );

        self.store.publish(lock, stage, |file| write_region_table(file, &table))?;
        self.counters.record(stage);
        Ok(())
    }

    fn stage_summary(&self, lock: &S::Lock, key: &CacheKey, summary: bool, residuals: bool) -> Result<()> {
        let stage = if summary { Artifact::Summary } else { Artifact::Residuals };
        let fail = |e: idwkit_core::Error| PipelineError::from_stage(key, stage, e);

        let table_path = self.upstream(key, stage, Artifact::Table)?;
        let file = File::open(&table_path).map_err(|e| fail(e.into()))?;
        let table = read_region_table(file).map_err(fail)?;
        let (reg, rows) = regress_table(&table).map_err(fail)?;

        info!(
            rows_used = reg.rows_used,
            rows_before = reg.rows_before,
            "Regression {}: intercept={:.6}, slope={:.6}, r2={:.6}, p={:.6}",
            reg.formula,
            reg.params.intercept,
            reg.params.slope,
            reg.r2,
            reg.p_value_slope
        );

        if summary {
            self.store.publish(lock, Artifact::Summary, |file| {
                serde_json::to_writer_pretty(file, &reg)?;
                Ok(())
            })?;
        }
        // A failed residuals write leaves the summary published; the next request retries residuals.
        if residuals {
            self.store
                .publish(lock, Artifact::Residuals, |file| write_csv_rows(file, &rows))?;
        }
        self.counters.record(stage);
        Ok(())
    }

    fn stage_regions(&self, lock: &S::Lock, key: &CacheKey) -> Result<()> {
        let stage = Artifact::Regions;
        let fail = |e: idwkit_core::Error| PipelineError::from_stage(key, stage, e);

        let table_path = self.upstream(key, stage, Artifact::Table)?;
        let table = read_region_table(File::open(&table_path).map_err(|e| fail(e.into()))?).map_err(fail)?;
        let residuals_path = self.upstream(key, stage, Artifact::Residuals)?;
        let residuals: Vec<ResidualRow> =
            read_csv_rows(File::open(&residuals_path).map_err(|e| fail(e.into()))?).map_err(fail)?;
        let fitted: HashMap<&str, &ResidualRow> = residuals.iter().map(|r| (r.region_id.as_str(), r)).collect();
        let data = self.datasets(key, stage)?;

        let fields = &self.config.fields;
        let float = |v: Option<f64>| v.map_or(AttributeValue::Null, AttributeValue::Float);
        let mut layer = FeatureCollection::new();
        layer.crs = data.crs.clone();
        for region in &data.regions {
            let fit = fitted.get(region.id.as_str());
            let mean = table.get(&region.id).and_then(|row| row.mean_value);
            let mut feature = Feature::new(region.geometry.clone().into())
                .with_property(fields.region_id.clone(), AttributeValue::String(region.id.clone()))
                .with_property(fields.region_attribute.clone(), float(Some(region.attribute)))
                .with_property("mean_value", float(mean))
                .with_property("predicted", float(fit.map(|r| r.predicted)))
                .with_property("residual", float(fit.map(|r| r.residual)));
            feature.id = Some(region.id.clone());
            layer.push(feature);
        }
        info!(regions = layer.len(), fitted = fitted.len(), "region layer");

        self.store.publish(lock, stage, |file| write_geojson(file, &layer))?;
        self.counters.record(stage);
        Ok(())
    }

    fn stage_preview(&self, lock: &S::Lock, key: &CacheKey, max_dim: usize) -> Result<()> {
        let stage = Artifact::Preview { max_dim };
        let raster = self.read_raster(key, stage)?;
        let params = ColormapParams::with_range(
            ColorRamp::CONCENTRATION,
            self.config.preview_min,
            self.config.preview_max,
        );
        let png = render_preview(&raster, max_dim, &params).map_err(|e| PipelineError::from_stage(key, stage, e))?;

        self.store.publish(lock, stage, |file| {
            file.write_all(&png)?;
            Ok(())
        })?;
        self.counters.record(stage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_artifacts() {
        assert_eq!(OutputRequest::raster().artifacts(), vec![Artifact::Raster]);
        let req = OutputRequest::raster().with_summary().with_preview(800);
        assert_eq!(
            req.artifacts(),
            vec![Artifact::Raster, Artifact::Summary, Artifact::Preview { max_dim: 800 }]
        );
        assert_eq!(OutputRequest::all(1400).artifacts().len(), 7);
        assert_eq!(
            OutputRequest::raster().with_regions().artifacts(),
            vec![Artifact::Raster, Artifact::Regions]
        );
    }

    #[test]
    fn test_default_warm_range() {
        let ks = default_warm_ks();
        assert_eq!(ks.len(), 50);
        assert_eq!(ks[0], 1.1);
        assert_eq!(ks[49], 6.0);
    }

    #[test]
    fn test_counters() {
        let c = GenerationCounters::default();
        c.record(Artifact::Raster);
        c.record(Artifact::Residuals);
        c.record(Artifact::Regions);
        c.record(Artifact::Preview { max_dim: 10 });
        let snap = c.snapshot();
        assert_eq!(snap.regions, 1);
        assert_eq!(snap.raster, 1);
        assert_eq!(snap.summary, 1);
        assert_eq!(snap.preview, 1);
        assert_eq!(snap.table, 0);
    }
}
