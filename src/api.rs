use crate::constants::*;
use crate::record::Record;
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Ordering;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

// ========== Core MapReduce traits ==========

/// Bounds every intermediate key must satisfy: hashable for partitioning,
/// totally ordered for the sort stage, serde for the spill files.
pub trait MapKey:
    Send + Sync + Serialize + DeserializeOwned + Hash + Eq + Ord + Clone + 'static
{
}
impl<T> MapKey for T where
    T: Send + Sync + Serialize + DeserializeOwned + Hash + Eq + Ord + Clone + 'static
{
}

pub trait MapValue: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {}
impl<T> MapValue for T where T: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {}

/// What the mapper decided about one input record. A mapped record may still
/// emit zero pairs (filtering); a rejected record is a data-quality signal
/// tallied in the job result, never a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOutcome {
    Mapped,
    Rejected,
}

/// Pure function from one record to zero or more key/value pairs. Mappers
/// hold no state across records; pre-aggregation happens in the engine's
/// combiner buffer, not in the mapper.
pub trait Mapper: Send + Sync {
    type Key: MapKey;
    type Value: MapValue;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value);
}

/// Local, associative, commutative pre-aggregation applied to one shard's
/// map output before shuffle. Must carry the same semantics as the eventual
/// reducer; correctness never depends on whether it ran.
pub trait Combiner<K, V>: Send + Sync {
    fn combine(&self, acc: &mut V, value: V);
}

/// Invoked once per key with all values for that key within a partition,
/// in sorted order. Emits final output rows.
pub trait Reducer: Send + Sync {
    type Key: MapKey;
    type ValueIn: MapValue;

    fn do_reduce<F>(&self, key: &Self::Key, values: &[Self::ValueIn], emit: &mut F)
    where
        F: FnMut(String);
}

/// Secondary comparator applied within equal-key groups after the primary
/// key sort. Equal pairs keep shard emission order as the final tie-break.
pub type ValueCmp<V> = fn(&V, &V) -> Ordering;

/// Current-usage query consumed by the combiner flush policy. The actual
/// telemetry source is external; the engine only asks whether the budget
/// is exceeded.
pub trait ResourceGauge: Send + Sync {
    fn over_budget(&self) -> bool;
}

// ========== Job options ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionCount {
    /// One partition per `keys_per_partition` distinct keys, clamped to the
    /// worker count. Recomputed per job from the key profile.
    Auto,
    Fixed(usize),
}

#[derive(Clone)]
pub struct JobOptions {
    pub partitions: PartitionCount,
    pub skew_mitigation: bool,
    /// Bounded worker pool size for shard-level map and partition-level
    /// reduce tasks.
    pub workers: usize,
    pub keys_per_partition: usize,
    /// Percentile of the per-key count distribution; keys strictly above it
    /// are hot.
    pub skew_percentile: f64,
    /// Combiner accumulator entries held per shard before a forced flush.
    pub combiner_flush_limit: usize,
    pub keep_intermediates: bool,
    /// Root for per-job scratch directories (map spills, shuffled partitions).
    pub scratch_root: PathBuf,
    /// Where to write the skew report artifact, when mitigation is enabled.
    pub skew_report_path: Option<PathBuf>,
    pub gauge: Option<Arc<dyn ResourceGauge>>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            partitions: PartitionCount::Auto,
            skew_mitigation: true,
            workers: env_usize(ENV_WORKERS, num_cpus::get()).max(1),
            keys_per_partition: env_usize(ENV_KEYS_PER_PARTITION, DEFAULT_KEYS_PER_PARTITION)
                .max(1),
            skew_percentile: env_f64(ENV_SKEW_PERCENTILE, DEFAULT_SKEW_PERCENTILE),
            combiner_flush_limit: env_usize(
                ENV_COMBINER_FLUSH_LIMIT,
                DEFAULT_COMBINER_FLUSH_LIMIT,
            )
            .max(1),
            keep_intermediates: env_truthy(ENV_KEEP_INTERMEDIATES),
            scratch_root: PathBuf::from(".loam_runs"),
            skew_report_path: None,
            gauge: None,
        }
    }
}
