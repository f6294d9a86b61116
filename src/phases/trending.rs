use crate::api::{Combiner, JobOptions, MapOutcome, Mapper, Reducer};
use crate::engine::run_job;
use crate::error::JobError;
use crate::io::{list_files_recursive, open_writer, read_lines, write_line};
use crate::record::{Action, Record};
use crate::report::JobResult;
use crate::skew::percentile;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Engagement cutoff convention: ids at or above the 90th percentile of the
/// per-id engagement distribution, recomputed from the data every run.
pub const TRENDING_PERCENTILE: f64 = 0.90;

/// Cleansed record → (content id, 1) for engagement actions (likes and
/// shares). Posts and comments carry no engagement and emit nothing.
pub struct EngagementMapper;

impl Mapper for EngagementMapper {
    type Key = String;
    type Value = u64;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        let (Some(action), Some(content)) = (record.field(1), record.field(2)) else {
            return MapOutcome::Rejected;
        };
        match Action::parse(action) {
            Some(Action::Like) | Some(Action::Share) => {
                emit(content.to_string(), 1);
                MapOutcome::Mapped
            }
            Some(_) => MapOutcome::Mapped,
            None => MapOutcome::Rejected,
        }
    }
}

pub struct EngagementCombiner;

impl Combiner<String, u64> for EngagementCombiner {
    fn combine(&self, acc: &mut u64, value: u64) {
        *acc += value;
    }
}

pub struct EngagementReducer;

impl Reducer for EngagementReducer {
    type Key = String;
    type ValueIn = u64;

    fn do_reduce<F>(&self, key: &Self::Key, values: &[Self::ValueIn], emit: &mut F)
    where
        F: FnMut(String),
    {
        let total: u64 = values.iter().sum();
        emit(format!("{key}\t{total}"));
    }
}

/// Two-pass trending job: pass 1 reduces total engagement per content id
/// into `totals_dir`; pass 2 computes the percentile threshold over the full
/// distribution and emits only the ids at or above it, engagement
/// descending, id ascending.
pub fn run(
    name: &str,
    inputs: &[PathBuf],
    totals_dir: &Path,
    output_dir: &Path,
    opts: &JobOptions,
) -> Result<JobResult, JobError> {
    let mut result = run_job(
        name,
        inputs,
        &EngagementMapper,
        Some(&EngagementCombiner),
        None,
        &EngagementReducer,
        totals_dir,
        opts,
    )?;

    let mut totals: Vec<(String, u64)> = Vec::new();
    for file in list_files_recursive(totals_dir).map_err(|e| JobError::Setup(e.to_string()))? {
        for line in read_lines(&file)? {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record = Record::from_line(&line);
            match (record.field(0), record.field(1).and_then(|n| n.parse::<u64>().ok())) {
                (Some(id), Some(n)) if record.len() == 2 => totals.push((id.to_string(), n)),
                _ => warn!(job = name, line = %line, "skipping unparseable engagement row"),
            }
        }
    }

    let mut dist: Vec<u64> = totals.iter().map(|t| t.1).collect();
    let threshold = percentile(&mut dist, TRENDING_PERCENTILE);
    totals.retain(|t| t.1 >= threshold);
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let _ = std::fs::remove_dir_all(output_dir);
    let mut writer = open_writer(output_dir.join("part-00000.tsv"))?;
    for (id, engagement) in &totals {
        write_line(&mut writer, &format!("{id}\t{engagement}"))?;
    }
    writer.flush()?;

    if !opts.keep_intermediates {
        let _ = std::fs::remove_dir_all(totals_dir);
    }

    info!(
        job = name,
        threshold,
        trending_ids = totals.len(),
        "Trending threshold applied"
    );
    result.records_out = totals.len() as u64;
    result.threshold = Some(threshold);
    Ok(result)
}
