use crate::api::MapKey;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Per-key record counts accumulated across all shard outputs during the
/// map stage and merged at the shuffle barrier. Read-only once published.
pub struct KeyProfile<K> {
    counts: HashMap<K, u64>,
}

impl<K: MapKey> KeyProfile<K> {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    pub fn bump(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: HashMap<K, u64>) {
        for (k, n) in other {
            *self.counts.entry(k).or_insert(0) += n;
        }
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &HashMap<K, u64> {
        &self.counts
    }
}

impl<K: MapKey> Default for KeyProfile<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile of a distribution: the value at index
/// `ceil(p * n) - 1` of the ascending-sorted values. Deterministic for
/// identical input. `p` is clamped to (0, 1].
pub fn percentile(values: &mut Vec<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let p = p.clamp(f64::MIN_POSITIVE, 1.0);
    let rank = (p * values.len() as f64).ceil() as usize;
    values[rank.saturating_sub(1).min(values.len() - 1)]
}

/// Keys whose count strictly exceeds the `p`-percentile of the per-key
/// count distribution. Returns the threshold and the hot keys in
/// deterministic (descending count, then key) order.
pub fn detect_hot_keys<K: MapKey>(profile: &KeyProfile<K>, p: f64) -> (u64, Vec<K>) {
    let mut dist: Vec<u64> = profile.counts().values().copied().collect();
    let threshold = percentile(&mut dist, p);
    let mut hot: Vec<(u64, K)> = profile
        .counts()
        .iter()
        .filter(|(_, &n)| n > threshold)
        .map(|(k, &n)| (n, k.clone()))
        .collect();
    hot.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    (threshold, hot.into_iter().map(|(_, k)| k).collect())
}

/// Structured per-job skew artifact consumed by operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SkewReport {
    pub key_counts: BTreeMap<String, u64>,
    pub hot_keys: Vec<String>,
    pub threshold: u64,
    pub percentile: f64,
}

impl SkewReport {
    pub fn build<K: MapKey>(profile: &KeyProfile<K>, hot: &[K], threshold: u64, p: f64) -> Self {
        let render = |k: &K| serde_json::to_string(k).unwrap_or_else(|_| "<unrenderable>".into());
        Self {
            key_counts: profile
                .counts()
                .iter()
                .map(|(k, &n)| (render(k), n))
                .collect(),
            hot_keys: hot.iter().map(render).collect(),
            threshold,
            percentile: p,
        }
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let mut v: Vec<u64> = (1..=10).collect();
        assert_eq!(percentile(&mut v, 0.90), 9);
        let mut v: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&mut v, 0.90), 90);
        let mut single = vec![42];
        assert_eq!(percentile(&mut single, 0.90), 42);
        let mut empty: Vec<u64> = vec![];
        assert_eq!(percentile(&mut empty, 0.90), 0);
    }

    #[test]
    fn dominant_key_is_flagged_hot() {
        let mut profile: KeyProfile<String> = KeyProfile::new();
        for _ in 0..95 {
            profile.bump("whale".to_string());
        }
        for i in 0..10 {
            profile.bump(format!("u{i}"));
        }
        let (threshold, hot) = detect_hot_keys(&profile, 0.90);
        assert!(threshold < 95);
        assert_eq!(hot, vec!["whale".to_string()]);
    }

    #[test]
    fn uniform_distribution_has_no_hot_keys() {
        let mut profile: KeyProfile<String> = KeyProfile::new();
        for i in 0..50 {
            profile.bump(format!("u{i}"));
        }
        let (threshold, hot) = detect_hot_keys(&profile, 0.90);
        assert_eq!(threshold, 1);
        assert!(hot.is_empty());
    }

    #[test]
    fn single_key_is_never_hot() {
        let mut profile: KeyProfile<String> = KeyProfile::new();
        for _ in 0..1000 {
            profile.bump("only".to_string());
        }
        let (_, hot) = detect_hot_keys(&profile, 0.90);
        assert!(hot.is_empty());
    }

    #[test]
    fn report_renders_keys_deterministically() {
        let mut profile: KeyProfile<String> = KeyProfile::new();
        profile.bump("a".to_string());
        profile.bump("b".to_string());
        let report = SkewReport::build(&profile, &["a".to_string()], 1, 0.9);
        assert_eq!(report.hot_keys, vec!["\"a\""]);
        assert!(report.key_counts.contains_key("\"b\""));
    }
}
