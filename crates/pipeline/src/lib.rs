//! # idwkit Pipeline
//!
//! Parameter-keyed artifact cache over the interpolation, aggregation and
//! regression stages.
//!
//! - `InterpolationParams` / `CacheKey`: validated parameters and their
//!   canonical key
//! - `ArtifactStore`: lock-free lookup, per-key locking, atomic publish
//! - `Pipeline::ensure_outputs`: generate only what is missing, once per key
//!   across threads and processes

pub mod config;
pub mod datasets;
pub mod error;
pub mod key;
pub mod orchestrator;
pub mod projection;
pub mod store;

pub use config::{DatasetFields, PipelineConfig};
pub use datasets::Datasets;
pub use error::{PipelineError, Result};
pub use key::{Artifact, CacheKey, InterpolationParams};
pub use orchestrator::{
    default_warm_ks, CounterSnapshot, GenerationCounters, OutputPaths, OutputRequest, Pipeline, RasterMetadata,
    ValueStats,
};
pub use projection::{DisplayProjection, IdentityProjection};
pub use store::{ArtifactStore, FsArtifactStore, HeldLock, KeyLock};
