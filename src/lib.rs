//! Single-machine MapReduce engine for batch activity-log analytics: a
//! mapper→combiner→shuffle→sort→reduce executor with skew-aware
//! partitioning, a reducer-side join, and a five-phase pipeline
//! orchestrator over flat-file inputs.

pub mod api;
pub mod constants;
pub mod engine;
pub mod error;
pub mod io;
pub mod join;
pub mod partition;
pub mod phases;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod skew;
pub mod writer;

pub use api::{
    Combiner, JobOptions, MapKey, MapOutcome, MapValue, Mapper, PartitionCount, Reducer,
    ResourceGauge, ValueCmp,
};
pub use engine::run_job;
pub use error::{JobError, PipelineError};
pub use join::{run_join, JoinReducer, Tagged};
pub use pipeline::{run_phase, run_pipeline, Phase, PipelineConfig};
pub use record::Record;
pub use report::{ExecutionReport, JobResult};
