use crate::api::{JobOptions, PartitionCount};
use crate::engine::run_job;
use crate::error::{JobError, PipelineError};
use crate::join::run_join;
use crate::phases::activity::{ActivityCombiner, ActivityMapper, ActivityReducer};
use crate::phases::join::{ActivityProfileJoin, ActivitySideMapper, ProfileMapper};
use crate::phases::rank::{RankMapper, RankReducer};
use crate::phases::trending;
use crate::phases::validate::{PassThroughReducer, ValidateMapper};
use crate::report::{ExecutionReport, FailedPhase, JobResult};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

/// The five pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Activity,
    Rank,
    Trending,
    Join,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Validate,
        Phase::Activity,
        Phase::Rank,
        Phase::Trending,
        Phase::Join,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Validate => "validate",
            Phase::Activity => "activity",
            Phase::Rank => "rank",
            Phase::Trending => "trending",
            Phase::Join => "join",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.name() == s)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directory wiring for one pipeline run: raw logs and profiles come from
/// outside; every phase writes under `work_dir`, and each phase's output
/// directory is the next consumer's input.
#[derive(Clone)]
pub struct PipelineConfig {
    pub logs_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub work_dir: PathBuf,
    pub opts: JobOptions,
}

impl PipelineConfig {
    pub fn new(logs_dir: PathBuf, profiles_dir: PathBuf, work_dir: PathBuf) -> Self {
        let opts = JobOptions {
            scratch_root: work_dir.join(".scratch"),
            ..JobOptions::default()
        };
        Self {
            logs_dir,
            profiles_dir,
            work_dir,
            opts,
        }
    }

    pub fn phase_output(&self, phase: Phase) -> PathBuf {
        let dir = match phase {
            Phase::Validate => "01_validated",
            Phase::Activity => "02_activity",
            Phase::Rank => "03_ranked",
            Phase::Trending => "04_trending",
            Phase::Join => "05_joined",
        };
        self.work_dir.join(dir)
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join("report.json")
    }

    fn job_opts(&self, phase: Phase) -> JobOptions {
        let mut opts = self.opts.clone();
        opts.skew_report_path = Some(
            self.work_dir
                .join("reports")
                .join(format!("{phase}_skew.json")),
        );
        if phase == Phase::Rank {
            // Global ordering needs exactly one partition; hot-key routing
            // would scatter the sorted key space.
            opts.partitions = PartitionCount::Fixed(1);
            opts.skew_mitigation = false;
            opts.skew_report_path = None;
        }
        opts
    }
}

/// Runs one phase in isolation; the CLI's single-phase entry point.
pub fn run_phase(cfg: &PipelineConfig, phase: Phase) -> Result<JobResult, JobError> {
    let output = cfg.phase_output(phase);
    let opts = cfg.job_opts(phase);
    match phase {
        Phase::Validate => run_job(
            phase.name(),
            &[cfg.logs_dir.clone()],
            &ValidateMapper::new(),
            None,
            None,
            &PassThroughReducer,
            &output,
            &opts,
        ),
        Phase::Activity => run_job(
            phase.name(),
            &[cfg.phase_output(Phase::Validate)],
            &ActivityMapper,
            Some(&ActivityCombiner),
            None,
            &ActivityReducer,
            &output,
            &opts,
        ),
        Phase::Rank => run_job(
            phase.name(),
            &[cfg.phase_output(Phase::Activity)],
            &RankMapper,
            None,
            None,
            &RankReducer,
            &output,
            &opts,
        ),
        Phase::Trending => trending::run(
            phase.name(),
            &[cfg.phase_output(Phase::Validate)],
            &cfg.opts.scratch_root.join("trending_totals"),
            &output,
            &opts,
        ),
        Phase::Join => run_join(
            phase.name(),
            &[cfg.phase_output(Phase::Rank)],
            &[cfg.profiles_dir.clone()],
            &ActivitySideMapper,
            &ProfileMapper,
            &ActivityProfileJoin,
            &output,
            &opts,
        ),
    }
}

/// Runs all phases in order, halting on the first failure rather than
/// feeding stale inputs downstream. The execution report is written either
/// way; a failed run also names the failing phase and cause.
pub fn run_pipeline(cfg: &PipelineConfig) -> Result<ExecutionReport, PipelineError> {
    let start = Instant::now();
    let mut report = ExecutionReport::default();
    for phase in Phase::ALL {
        info!(phase = phase.name(), "pipeline phase starting");
        match run_phase(cfg, phase) {
            Ok(result) => report.phases.push(result),
            Err(e) => {
                error!(phase = phase.name(), cause = %e, "pipeline phase failed; halting");
                report.failed = Some(FailedPhase {
                    phase: phase.name().to_string(),
                    cause: e.to_string(),
                });
                report.total_elapsed_ms = start.elapsed().as_millis() as u64;
                report.write_json(&cfg.report_path())?;
                return Err(PipelineError::PhaseFailed {
                    phase: phase.name(),
                    source: e,
                });
            }
        }
    }
    report.total_elapsed_ms = start.elapsed().as_millis() as u64;
    report.write_json(&cfg.report_path())?;
    info!(
        phases = report.phases.len(),
        total_elapsed_ms = report.total_elapsed_ms,
        report = %cfg.report_path().display(),
        "pipeline complete"
    );
    Ok(report)
}
