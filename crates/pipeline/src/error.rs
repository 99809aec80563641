//! Error taxonomy for cache orchestration

use std::path::PathBuf;

use thiserror::Error;

use crate::key::Artifact;

/// Errors surfaced by [`crate::Pipeline`] and artifact stores
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected parameter; raised before any I/O
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    Precondition {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Dataset file or required field absent
    #[error("Missing input: {0}")]
    MissingInput(#[source] idwkit_core::Error),

    /// A stage failed; nothing was published for it
    #[error("Generation failed for {key} at stage {stage}: {source}")]
    Generation {
        key: String,
        stage: Artifact,
        #[source]
        source: idwkit_core::Error,
    },

    /// A stage ran without its upstream artifact in place
    #[error("Consistency violation for {key}: stage {stage} requires {}", .missing.display())]
    Consistency {
        key: String,
        stage: Artifact,
        missing: PathBuf,
    },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] idwkit_core::Error),
}

impl PipelineError {
    /// Whether the caller sent a bad request (maps to a 4xx response).
    pub fn is_precondition(&self) -> bool {
        matches!(self, PipelineError::Precondition { .. })
    }

    /// Classify a failure raised while producing `stage` for `key`.
    pub fn from_stage(key: impl ToString, stage: Artifact, err: idwkit_core::Error) -> Self {
        match err {
            idwkit_core::Error::InvalidParameter { name, value, reason } => {
                PipelineError::Precondition { name, value, reason }
            }
            e if e.is_missing_input() => PipelineError::MissingInput(e),
            source => PipelineError::Generation {
                key: key.to_string(),
                stage,
                source,
            },
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_errors_are_classified() {
        let e = PipelineError::from_stage(
            "k2p0_cs500m_knn32",
            Artifact::Raster,
            idwkit_core::Error::MissingInput(PathBuf::from("wells.geojson")),
        );
        assert!(matches!(e, PipelineError::MissingInput(_)));

        let e = PipelineError::from_stage(
            "k2p0_cs500m_knn32",
            Artifact::Table,
            idwkit_core::Error::Algorithm("boom".into()),
        );
        assert_eq!(
            e.to_string(),
            "Generation failed for k2p0_cs500m_knn32 at stage table: Algorithm error: boom"
        );
        assert!(!e.is_precondition());
    }
}
