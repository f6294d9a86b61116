use crate::io::hash_key_bytes;
use std::collections::HashMap;

/// Partition assignment for one job run, built once at the shuffle barrier
/// and read-only afterwards. Cold keys hash into `[0, base)`; each hot key
/// owns a dedicated partition at `base + i`, so an overloaded key can never
/// collide with the hash range or with another hot key.
///
/// The plan operates on serialized key bytes: serialization is
/// deterministic, so the same key always lands in the same partition within
/// a run.
pub struct PartitionPlan {
    base: usize,
    hot: HashMap<Vec<u8>, usize>,
}

impl PartitionPlan {
    pub fn hash_only(base: usize) -> Self {
        Self {
            base: base.max(1),
            hot: HashMap::new(),
        }
    }

    pub fn with_hot_keys(base: usize, hot_keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let base = base.max(1);
        let hot = hot_keys
            .into_iter()
            .enumerate()
            .map(|(i, k)| (k, base + i))
            .collect();
        Self { base, hot }
    }

    pub fn num_partitions(&self) -> usize {
        self.base + self.hot.len()
    }

    pub fn hot_key_count(&self) -> usize {
        self.hot.len()
    }

    pub fn partition_of(&self, key_bytes: &[u8]) -> usize {
        if let Some(&p) = self.hot.get(key_bytes) {
            return p;
        }
        (hash_key_bytes(key_bytes) as usize) % self.base
    }
}

/// Adaptive base partition count: one partition per `keys_per_partition`
/// distinct keys, bounded by worker concurrency, never zero.
pub fn adaptive_base(distinct_keys: usize, keys_per_partition: usize, workers: usize) -> usize {
    let per = keys_per_partition.max(1);
    distinct_keys.div_ceil(per).clamp(1, workers.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_idempotent() {
        let plan = PartitionPlan::hash_only(7);
        for key in [b"u1".as_slice(), b"u2", b"long-key-material"] {
            let first = plan.partition_of(key);
            assert_eq!(plan.partition_of(key), first);
            assert!(first < 7);
        }
    }

    #[test]
    fn hot_keys_get_dedicated_partitions_outside_hash_range() {
        let plan = PartitionPlan::with_hot_keys(4, vec![b"hot-a".to_vec(), b"hot-b".to_vec()]);
        assert_eq!(plan.num_partitions(), 6);
        let a = plan.partition_of(b"hot-a");
        let b = plan.partition_of(b"hot-b");
        assert!(a >= 4 && b >= 4);
        assert_ne!(a, b);
        // cold keys never land on a hot partition
        for i in 0..100u32 {
            let key = format!("cold-{i}");
            assert!(plan.partition_of(key.as_bytes()) < 4);
        }
    }

    #[test]
    fn zero_base_is_clamped() {
        let plan = PartitionPlan::hash_only(0);
        assert_eq!(plan.num_partitions(), 1);
        assert_eq!(plan.partition_of(b"anything"), 0);
    }

    #[test]
    fn adaptive_base_scales_with_cardinality() {
        assert_eq!(adaptive_base(0, 1000, 8), 1);
        assert_eq!(adaptive_base(999, 1000, 8), 1);
        assert_eq!(adaptive_base(3500, 1000, 8), 4);
        // bounded by workers
        assert_eq!(adaptive_base(1_000_000, 1000, 8), 8);
    }
}
