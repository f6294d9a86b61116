use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a single job. Rejected records and unmatched join
/// keys are never errors; they are tallied in the [`crate::report::JobResult`].
#[derive(Debug, Error)]
pub enum JobError {
    /// A shard hit unreadable input it could not skip past. Aborts the job
    /// before the sort barrier; no partial output is published.
    #[error("shard {shard} failed on {path}: {source}")]
    ShardFailure {
        shard: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("intermediate record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    #[error("job setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A phase failed; downstream phases are not run on its stale inputs.
    #[error("phase {phase} failed: {source}")]
    PhaseFailed {
        phase: &'static str,
        #[source]
        source: JobError,
    },

    #[error("could not write execution report: {0}")]
    Report(#[from] std::io::Error),
}
