//! Concurrent callers share one generation per key

mod common;

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Barrier;
use std::thread;

use common::{config_in, fixture, params, REGIONS, SAMPLES};
use idwkit_core::io::read_geojson_str;
use idwkit_pipeline::{
    Artifact, ArtifactStore, CacheKey, Datasets, FsArtifactStore, HeldLock, KeyLock, OutputRequest, Pipeline,
    PipelineError, Result,
};

#[test]
fn test_threads_generate_once() {
    let (_dir, config) = fixture();
    let pipeline = Pipeline::new(config);
    let request = OutputRequest::all(8);
    let threads = 8;
    let barrier = Barrier::new(threads);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    let paths = pipeline.ensure_outputs(&params(), &request).unwrap();
                    let raster = fs::read(&paths.raster).unwrap();
                    let table = fs::read(paths.table.as_ref().unwrap()).unwrap();
                    (paths, raster, table)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let (first_paths, first_raster, first_table) = &results[0];
    assert!(!first_raster.is_empty());
    for (paths, raster, table) in &results[1..] {
        assert_eq!(paths, first_paths);
        assert_eq!(raster, first_raster);
        assert_eq!(table, first_table);
    }
    assert_eq!(&fs::read(&first_paths.raster).unwrap(), first_raster);
    let counts = pipeline.counters().snapshot();
    assert_eq!(counts.passes, 1);
    assert_eq!(
        (counts.raster, counts.metadata, counts.table, counts.summary, counts.regions, counts.preview),
        (1, 1, 1, 1, 1, 1)
    );
}

#[test]
fn test_independent_pipelines_share_one_cache() {
    // Two orchestrators over one directory stand in for two processes.
    let (_dir, config) = fixture();
    let a = Pipeline::new(config.clone());
    let b = Pipeline::new(config.clone());
    let barrier = Barrier::new(2);
    let request = OutputRequest::raster().with_table();

    let (pa, pb) = thread::scope(|s| {
        let ha = s.spawn(|| {
            barrier.wait();
            let paths = a.ensure_outputs(&params(), &request).unwrap();
            let bytes = fs::read(&paths.raster).unwrap();
            (paths, bytes)
        });
        let hb = s.spawn(|| {
            barrier.wait();
            let paths = b.ensure_outputs(&params(), &request).unwrap();
            let bytes = fs::read(&paths.raster).unwrap();
            (paths, bytes)
        });
        (ha.join().unwrap(), hb.join().unwrap())
    });

    assert_eq!(pa.0, pb.0);
    assert_eq!(pa.1, pb.1);
    let (ca, cb) = (a.counters().snapshot(), b.counters().snapshot());
    assert_eq!(ca.raster + cb.raster, 1);
    assert_eq!(ca.table + cb.table, 1);
    assert_eq!(ca.passes + cb.passes, 1);

    let leftovers: Vec<_> = fs::read_dir(config.cache_dir.join("idw"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

/// Runs the writer for one artifact kind but never publishes it
struct LosingStore {
    inner: FsArtifactStore,
    lose: Artifact,
}

impl ArtifactStore for LosingStore {
    type Lock = KeyLock;

    fn try_get(&self, key: &CacheKey, artifact: Artifact) -> Option<PathBuf> {
        self.inner.try_get(key, artifact)
    }

    fn begin_generate(&self, key: &CacheKey) -> Result<KeyLock> {
        self.inner.begin_generate(key)
    }

    fn publish<F>(&self, lock: &KeyLock, artifact: Artifact, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> idwkit_core::Result<()>,
    {
        if artifact != self.lose {
            return self.inner.publish(lock, artifact, write);
        }
        let mut sink = tempfile::tempfile()?;
        write(&mut sink)?;
        Ok(self.inner.path_of(lock.key(), artifact))
    }
}

fn losing_pipeline(lose: Artifact) -> (tempfile::TempDir, Pipeline<LosingStore>) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let datasets = Datasets::from_collections(
        &read_geojson_str(SAMPLES).unwrap(),
        &read_geojson_str(REGIONS).unwrap(),
        &config.fields,
        false,
    )
    .unwrap();
    let store = LosingStore {
        inner: FsArtifactStore::new(config.cache_dir.clone()),
        lose,
    };
    (dir, Pipeline::with_store(store, config).with_datasets(datasets))
}

#[test]
fn test_missing_upstream_is_a_consistency_error() {
    let (_dir, pipeline) = losing_pipeline(Artifact::Table);

    let err = pipeline
        .ensure_outputs(&params(), &OutputRequest::raster().with_summary())
        .unwrap_err();
    match err {
        PipelineError::Consistency { key, stage, missing } => {
            assert_eq!(key, "k2p0_cs100m_knn4");
            assert_eq!(stage, Artifact::Summary);
            assert_eq!(missing, PathBuf::from("tables/region_mean_k2p0_cs100m_knn4.csv"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pipeline.store().try_get(&params().key().unwrap(), Artifact::Summary).is_none());
}

#[test]
fn test_unpublished_request_is_a_consistency_error() {
    let (_dir, pipeline) = losing_pipeline(Artifact::Metadata);

    let err = pipeline
        .ensure_outputs(&params(), &OutputRequest::raster().with_metadata())
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Consistency { stage: Artifact::Metadata, .. }),
        "{err}"
    );
    // the raster made it and is not regenerated on retry
    assert!(pipeline.ensure_outputs(&params(), &OutputRequest::raster()).is_ok());
    assert_eq!(pipeline.counters().snapshot().raster, 1);
}

#[test]
fn test_summary_without_residuals_is_completed_next_request() {
    let (dir, pipeline) = losing_pipeline(Artifact::Residuals);
    let key = params().key().unwrap();
    let request = OutputRequest::raster().with_summary().with_residuals();

    let err = pipeline.ensure_outputs(&params(), &request).unwrap_err();
    assert!(
        matches!(err, PipelineError::Consistency { stage: Artifact::Residuals, .. }),
        "{err}"
    );
    let summary = pipeline.store().try_get(&key, Artifact::Summary).unwrap();
    assert!(pipeline.store().try_get(&key, Artifact::Residuals).is_none());
    let summary_time = fs::metadata(&summary).unwrap().modified().unwrap();

    let config = config_in(dir.path());
    fs::write(&config.samples, SAMPLES).unwrap();
    fs::write(&config.regions, REGIONS).unwrap();
    let retry = Pipeline::new(config);
    let paths = retry.ensure_outputs(&params(), &request).unwrap();

    assert_eq!(paths.summary.as_ref(), Some(&summary));
    assert_eq!(fs::metadata(&summary).unwrap().modified().unwrap(), summary_time);
    assert!(paths.residuals.unwrap().exists());
    let counts = retry.counters().snapshot();
    assert_eq!((counts.raster, counts.table, counts.summary), (0, 0, 1));
}
