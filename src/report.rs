use serde::Serialize;
use std::path::Path;

/// Summary counters for one job/phase run.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub phase: String,
    pub records_in: u64,
    pub records_out: u64,
    pub rejected: u64,
    /// Join keys present on only one side; always zero for non-join jobs.
    pub unmatched: u64,
    pub partitions: usize,
    pub hot_keys: usize,
    /// Trending engagement cutoff; set by the trending phase only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    pub elapsed_ms: u64,
}

impl JobResult {
    pub fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            records_in: 0,
            records_out: 0,
            rejected: 0,
            unmatched: 0,
            partitions: 0,
            hot_keys: 0,
            threshold: None,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPhase {
    pub phase: String,
    pub cause: String,
}

/// One artifact per full pipeline run; the contract the CLI driver and
/// visualization tooling read.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ExecutionReport {
    pub phases: Vec<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedPhase>,
    pub total_elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
    }
}
