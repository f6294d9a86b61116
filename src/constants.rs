//! Centralized environment variable names and default values for runtime tuning.

// Environment variable names
pub const ENV_KEEP_INTERMEDIATES: &str = "LOAM_KEEP_INTERMEDIATES";
pub const ENV_WORKERS: &str = "LOAM_WORKERS";
pub const ENV_KEYS_PER_PARTITION: &str = "LOAM_KEYS_PER_PARTITION";
pub const ENV_SKEW_PERCENTILE: &str = "LOAM_SKEW_PERCENTILE";
pub const ENV_COMBINER_FLUSH_LIMIT: &str = "LOAM_COMBINER_FLUSH_LIMIT";
pub const ENV_FLUSH_BYTES: &str = "LOAM_FLUSH_BYTES";
pub const ENV_FLUSH_INTERVAL_MS: &str = "LOAM_FLUSH_INTERVAL_MS";
pub const ENV_WRITER_QUEUE_CAP: &str = "LOAM_WRITER_QUEUE_CAP";
pub const ENV_LOCAL_BATCH_BYTES: &str = "LOAM_LOCAL_BATCH_BYTES";

// Defaults
// Distinct keys routed to one reduce partition before another is opened.
pub const DEFAULT_KEYS_PER_PARTITION: usize = 10_000;
// Percentile of the per-key count distribution above which a key is hot.
pub const DEFAULT_SKEW_PERCENTILE: f64 = 0.90;
// Combiner accumulator entries held per shard before a forced flush.
pub const DEFAULT_COMBINER_FLUSH_LIMIT: usize = 100_000;
// Per-thread local batch before handing a chunk to the writer pool.
pub const DEFAULT_LOCAL_BATCH_BYTES: usize = 256 * 1024;
// Writer pool queue capacity per partition.
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 1024;
// Bytes buffered by a writer thread before a forced flush.
pub const DEFAULT_FLUSH_BYTES: usize = 16 * 1024 * 1024;
// Writer flush interval when traffic is slow.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;

pub fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

pub fn env_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}
