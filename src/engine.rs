use crate::api::{
    Combiner, JobOptions, MapKey, MapOutcome, MapValue, Mapper, PartitionCount, Reducer, ValueCmp,
};
use crate::constants::*;
use crate::error::JobError;
use crate::io::{ensure_dir, list_files_recursive, open_writer, read_lines, read_rec, write_line, write_rec};
use crate::partition::{adaptive_base, PartitionPlan};
use crate::record::Record;
use crate::report::JobResult;
use crate::skew::{detect_hot_keys, KeyProfile, SkewReport};
use crate::writer::{partition_file_name, WriterPool};
use memmap2::Mmap;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Per-shard mapping function: one input line in, zero or more pairs out.
/// The shard index lets callers with multiple tagged sources dispatch.
pub(crate) type MapFn<'a, K, V> =
    &'a (dyn Fn(usize, &str, &mut dyn FnMut(K, V)) -> MapOutcome + Sync);

/// Consumes one contiguous equal-key group. Returns false when the group is
/// dropped as unmatched (join semantics); plain jobs always return true.
pub(crate) type GroupFn<'a, K, V> =
    &'a (dyn Fn(&K, &[V], &mut dyn FnMut(String)) -> bool + Sync);

/// Runs one map→combine→shuffle→sort→reduce job over all files in the input
/// directories, writing one `part-NNNNN.tsv` per reduce partition.
pub fn run_job<M, R>(
    name: &str,
    inputs: &[PathBuf],
    mapper: &M,
    combiner: Option<&dyn Combiner<M::Key, M::Value>>,
    secondary: Option<ValueCmp<M::Value>>,
    reducer: &R,
    output_dir: &Path,
    opts: &JobOptions,
) -> Result<JobResult, JobError>
where
    M: Mapper,
    R: Reducer<Key = M::Key, ValueIn = M::Value>,
{
    let mut files = Vec::new();
    for dir in inputs {
        files.extend(
            list_files_recursive(dir).map_err(|e| JobError::Setup(e.to_string()))?,
        );
    }
    let map_fn = |_shard: usize, line: &str, mut emit: &mut dyn FnMut(M::Key, M::Value)| {
        let record = Record::from_line(line);
        mapper.do_map(&record, &mut emit)
    };
    let group_fn = |key: &M::Key, values: &[M::Value], mut emit: &mut dyn FnMut(String)| {
        reducer.do_reduce(key, values, &mut emit);
        true
    };
    execute(name, files, &map_fn, combiner, secondary, &group_fn, output_dir, opts)
}

/// Engine core shared by [`run_job`] and [`crate::join::run_join`].
#[allow(clippy::too_many_arguments)]
pub(crate) fn execute<K: MapKey, V: MapValue>(
    name: &str,
    files: Vec<PathBuf>,
    map_fn: MapFn<'_, K, V>,
    combiner: Option<&dyn Combiner<K, V>>,
    secondary: Option<ValueCmp<V>>,
    group_fn: GroupFn<'_, K, V>,
    output_dir: &Path,
    opts: &JobOptions,
) -> Result<JobResult, JobError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()
        .map_err(|e| JobError::Setup(e.to_string()))?;
    pool.install(|| execute_inner(name, files, map_fn, combiner, secondary, group_fn, output_dir, opts))
}

#[allow(clippy::too_many_arguments)]
fn execute_inner<K: MapKey, V: MapValue>(
    name: &str,
    files: Vec<PathBuf>,
    map_fn: MapFn<'_, K, V>,
    combiner: Option<&dyn Combiner<K, V>>,
    secondary: Option<ValueCmp<V>>,
    group_fn: GroupFn<'_, K, V>,
    output_dir: &Path,
    opts: &JobOptions,
) -> Result<JobResult, JobError> {
    let job_start = Instant::now();
    let scratch = scratch_dir(&opts.scratch_root, name);
    let map_dir = scratch.join("map_out");
    let shuffle_dir = scratch.join("shuffle");
    ensure_dir(&map_dir)?;
    ensure_dir(&shuffle_dir)?;

    info!(job = name, shards = files.len(), workers = opts.workers, "job starting");

    // ---- Map stage: shards are independent; a failed shard aborts the job.
    let map_start = Instant::now();
    let shard_outs: Vec<ShardOut<K>> = files
        .par_iter()
        .enumerate()
        .map(|(shard, path)| run_shard(shard, path, &map_dir, map_fn, combiner, opts))
        .collect::<Result<Vec<_>, JobError>>()?;

    let records_in: u64 = shard_outs.iter().map(|s| s.records_in).sum();
    let rejected: u64 = shard_outs.iter().map(|s| s.rejected).sum();
    let total_emits: u64 = shard_outs.iter().map(|s| s.emitted).sum();

    // ---- Barrier: publish the key profile, then build the partition plan.
    // Nothing downstream may run before every shard has finished mapping.
    let mut profile: KeyProfile<K> = KeyProfile::new();
    let mut spills = Vec::with_capacity(shard_outs.len());
    for s in shard_outs {
        profile.merge(s.counts);
        spills.push(s.spill);
    }
    info!(
        phase = "map",
        job = name,
        tasks = spills.len(),
        records_in,
        rejected,
        total_emits,
        distinct_keys = profile.distinct(),
        wall_ms = map_start.elapsed().as_millis() as u64,
        "Map phase complete"
    );

    let base = match opts.partitions {
        PartitionCount::Fixed(0) => {
            return Err(JobError::InvalidConfig("partition count must be >= 1".into()))
        }
        PartitionCount::Fixed(n) => n,
        PartitionCount::Auto => {
            adaptive_base(profile.distinct(), opts.keys_per_partition, opts.workers)
        }
    };

    let (plan, skew_report) = if opts.skew_mitigation {
        let (threshold, hot) = detect_hot_keys(&profile, opts.skew_percentile);
        if !hot.is_empty() {
            warn!(
                job = name,
                hot_keys = hot.len(),
                threshold,
                "partition skew detected; routing hot keys to dedicated partitions"
            );
        }
        let report = SkewReport::build(&profile, &hot, threshold, opts.skew_percentile);
        let mut hot_bytes = Vec::with_capacity(hot.len());
        for k in &hot {
            hot_bytes.push(bincode::serialize(k)?);
        }
        (PartitionPlan::with_hot_keys(base, hot_bytes), Some(report))
    } else {
        (PartitionPlan::hash_only(base), None)
    };
    if let (Some(report), Some(path)) = (&skew_report, &opts.skew_report_path) {
        report.write_json(path)?;
    }
    let parts = plan.num_partitions();

    // ---- Shuffle: route every spilled record to its partition file.
    let shuffle_start = Instant::now();
    let flush_bytes = env_usize(ENV_FLUSH_BYTES, DEFAULT_FLUSH_BYTES);
    let flush_interval = Duration::from_millis(env_u64(ENV_FLUSH_INTERVAL_MS, DEFAULT_FLUSH_INTERVAL_MS));
    let queue_cap = env_usize(ENV_WRITER_QUEUE_CAP, DEFAULT_WRITER_QUEUE_CAP);
    let local_batch = env_usize(ENV_LOCAL_BATCH_BYTES, DEFAULT_LOCAL_BATCH_BYTES);
    let (wpool, mut joiner) =
        WriterPool::new(&shuffle_dir, parts, flush_bytes, flush_interval, queue_cap)
            .map_err(|e| JobError::Setup(e.to_string()))?;
    let routed_res: Result<Vec<(u64, u64)>, JobError> = spills
        .par_iter()
        .map(|spill| -> Result<(u64, u64), JobError> {
            let file = File::open(spill)?;
            if file.metadata()?.len() == 0 {
                return Ok((0, 0));
            }
            let map = unsafe { Mmap::map(&file) }?;
            let mut tw = wpool.make_thread_writer(parts, local_batch);
            let mut routed = 0u64;
            let mut off = 0usize;
            while let Some((rec, next)) = read_rec(&map, off) {
                let p = plan.partition_of(rec.key);
                tw.emit_record(p, &map[off..next]);
                routed += 1;
                off = next;
            }
            let bytes = tw.flush_all();
            Ok((routed, bytes))
        })
        .collect();
    // Writers must drain and close even when routing failed.
    wpool.close_all();
    joiner.join_all();
    let routed = routed_res?;
    info!(
        phase = "shuffle",
        job = name,
        partitions = parts,
        hot_keys = plan.hot_key_count(),
        records = routed.iter().map(|r| r.0).sum::<u64>(),
        bytes = routed.iter().map(|r| r.1).sum::<u64>(),
        wall_ms = shuffle_start.elapsed().as_millis() as u64,
        "Shuffle phase complete"
    );

    // ---- Sort + reduce: partitions in parallel, keys within a partition
    // strictly sequential.
    let reduce_start = Instant::now();
    // Partition files land in a staging directory beside the output and are
    // published by rename only once every partition has succeeded, so a
    // failed reduce never leaves partial output where a consumer can see it.
    let staging = staging_dir(output_dir);
    let _ = fs::remove_dir_all(&staging);
    ensure_dir(&staging)?;
    let part_res: Result<Vec<PartOut>, JobError> = (0..parts)
        .into_par_iter()
        .map(|p| reduce_partition(p, &shuffle_dir, &staging, secondary, group_fn))
        .collect();
    let part_outs = match part_res {
        Ok(outs) => outs,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };
    let _ = fs::remove_dir_all(output_dir);
    ensure_dir(output_dir)?;
    for p in 0..parts {
        let file = format!("part-{p:05}.tsv");
        fs::rename(staging.join(&file), output_dir.join(&file))?;
    }
    let _ = fs::remove_dir_all(&staging);

    let records_out: u64 = part_outs.iter().map(|p| p.out_rows).sum();
    let unmatched: u64 = part_outs.iter().map(|p| p.unmatched).sum();
    let min_wall = part_outs.iter().map(|p| p.wall_ms).min().unwrap_or(0);
    let max_wall = part_outs.iter().map(|p| p.wall_ms).max().unwrap_or(0);
    info!(
        phase = "reduce",
        job = name,
        reducers = parts,
        total_lines = part_outs.iter().map(|p| p.lines_in).sum::<u64>(),
        total_groups = part_outs.iter().map(|p| p.groups).sum::<u64>(),
        unmatched,
        min_reducer_ms = min_wall,
        max_reducer_ms = max_wall,
        wall_ms = reduce_start.elapsed().as_millis() as u64,
        "Reduce phase complete"
    );

    if !opts.keep_intermediates {
        let _ = fs::remove_dir_all(&scratch);
    }

    let mut result = JobResult::new(name);
    result.records_in = records_in;
    result.records_out = records_out;
    result.rejected = rejected;
    result.unmatched = unmatched;
    result.partitions = parts;
    result.hot_keys = plan.hot_key_count();
    result.elapsed_ms = job_start.elapsed().as_millis() as u64;
    Ok(result)
}

fn staging_dir(output_dir: &Path) -> PathBuf {
    let name = output_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    // Same parent as the output so the publish rename stays on one filesystem.
    output_dir.with_file_name(format!(".{name}-staging-{}", std::process::id()))
}

fn scratch_dir(root: &Path, name: &str) -> PathBuf {
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    root.join(format!("{name}-{pid}-{ts}"))
}

struct ShardOut<K> {
    records_in: u64,
    rejected: u64,
    emitted: u64,
    counts: HashMap<K, u64>,
    spill: PathBuf,
}

struct PartOut {
    lines_in: u64,
    groups: u64,
    out_rows: u64,
    unmatched: u64,
    wall_ms: u64,
}

/// Buffered spill file of framed intermediate records for one shard.
struct Spill {
    writer: BufWriter<File>,
    buf: Vec<u8>,
    batch: usize,
    shard: u32,
    seq: u32,
}

impl Spill {
    fn push(&mut self, key: &[u8], value: &[u8]) -> std::io::Result<()> {
        write_rec(&mut self.buf, self.shard, self.seq, key, value);
        self.seq = self.seq.wrapping_add(1);
        if self.buf.len() >= self.batch {
            self.writer.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> std::io::Result<()> {
        if !self.buf.is_empty() {
            self.writer.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.writer.flush()
    }
}

fn push_pair<K: MapKey, V: MapValue>(k: &K, v: &V, spill: &mut Spill) -> Result<(), JobError> {
    let kb = bincode::serialize(k)?;
    let vb = bincode::serialize(v)?;
    spill.push(&kb, &vb).map_err(JobError::Io)
}

/// Drains the combiner accumulator in sorted key order so spill contents do
/// not depend on hash-map iteration order.
fn flush_acc<K: MapKey, V: MapValue>(
    acc: &mut HashMap<K, V>,
    spill: &mut Spill,
) -> Result<(), JobError> {
    if acc.is_empty() {
        return Ok(());
    }
    let mut entries: Vec<(K, V)> = acc.drain().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in entries {
        push_pair(&k, &v, spill)?;
    }
    Ok(())
}

fn run_shard<K: MapKey, V: MapValue>(
    shard: usize,
    path: &PathBuf,
    map_dir: &Path,
    map_fn: MapFn<'_, K, V>,
    combiner: Option<&dyn Combiner<K, V>>,
    opts: &JobOptions,
) -> Result<ShardOut<K>, JobError> {
    let shard_fail = |e: std::io::Error| JobError::ShardFailure {
        shard,
        path: path.clone(),
        source: e,
    };
    let batch = env_usize(ENV_LOCAL_BATCH_BYTES, DEFAULT_LOCAL_BATCH_BYTES);
    let spill_path = map_dir.join(format!("shard{shard:05}.bin"));
    let mut spill = Spill {
        writer: open_writer(&spill_path)?,
        buf: Vec::with_capacity(batch),
        batch,
        shard: shard as u32,
        seq: 0,
    };
    let mut counts: HashMap<K, u64> = HashMap::new();
    let mut acc: HashMap<K, V> = HashMap::new();
    let mut records_in = 0u64;
    let mut rejected = 0u64;
    let mut emitted = 0u64;

    let lines = read_lines(path).map_err(shard_fail)?;
    for line in lines {
        let line = line.map_err(shard_fail)?;
        if line.is_empty() {
            continue;
        }
        records_in += 1;
        let mut fail: Option<JobError> = None;
        let outcome = map_fn(shard, &line, &mut |k: K, v: V| {
            if fail.is_some() {
                return;
            }
            emitted += 1;
            *counts.entry(k.clone()).or_insert(0) += 1;
            match combiner {
                Some(c) => {
                    match acc.entry(k) {
                        Entry::Occupied(mut slot) => c.combine(slot.get_mut(), v),
                        Entry::Vacant(slot) => {
                            slot.insert(v);
                        }
                    }
                    let over = opts.gauge.as_ref().map(|g| g.over_budget()).unwrap_or(false);
                    if acc.len() >= opts.combiner_flush_limit || over {
                        if let Err(e) = flush_acc(&mut acc, &mut spill) {
                            fail = Some(e);
                        }
                    }
                }
                None => {
                    if let Err(e) = push_pair(&k, &v, &mut spill) {
                        fail = Some(e);
                    }
                }
            }
        });
        if let Some(e) = fail {
            return Err(e);
        }
        if outcome == MapOutcome::Rejected {
            rejected += 1;
        }
    }
    flush_acc(&mut acc, &mut spill)?;
    spill.finish()?;
    Ok(ShardOut {
        records_in,
        rejected,
        emitted,
        counts,
        spill: spill_path,
    })
}

fn reduce_partition<K: MapKey, V: MapValue>(
    p: usize,
    shuffle_dir: &Path,
    output_dir: &Path,
    secondary: Option<ValueCmp<V>>,
    group_fn: GroupFn<'_, K, V>,
) -> Result<PartOut, JobError> {
    let part_start = Instant::now();
    let in_path = shuffle_dir.join(partition_file_name(p));
    let mut writer = open_writer(output_dir.join(format!("part-{p:05}.tsv")))?;

    // (key, value, shard, seq); (shard, seq) is the stable final tie-break.
    let mut rows: Vec<(K, V, u32, u32)> = Vec::new();
    if let Ok(file) = File::open(&in_path) {
        if file.metadata()?.len() > 0 {
            let map = unsafe { Mmap::map(&file) }?;
            let mut off = 0usize;
            while let Some((rec, next)) = read_rec(&map, off) {
                let k: K = bincode::deserialize(rec.key)?;
                let v: V = bincode::deserialize(rec.value)?;
                rows.push((k, v, rec.shard, rec.seq));
                off = next;
            }
        }
    }

    rows.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| match secondary {
                Some(cmp) => cmp(&a.1, &b.1),
                None => Ordering::Equal,
            })
            .then_with(|| (a.2, a.3).cmp(&(b.2, b.3)))
    });

    let lines_in = rows.len() as u64;
    let mut groups = 0u64;
    let mut out_rows = 0u64;
    let mut unmatched = 0u64;
    let mut i = 0usize;
    while i < rows.len() {
        let mut j = i + 1;
        while j < rows.len() && rows[j].0 == rows[i].0 {
            j += 1;
        }
        let values: Vec<V> = rows[i..j].iter().map(|t| t.1.clone()).collect();
        let mut io_err: Option<std::io::Error> = None;
        let mut emit = |line: String| {
            if io_err.is_some() {
                return;
            }
            match write_line(&mut writer, &line) {
                Ok(()) => out_rows += 1,
                Err(e) => io_err = Some(e),
            }
        };
        let matched = group_fn(&rows[i].0, &values, &mut emit);
        if let Some(e) = io_err {
            return Err(JobError::Io(e));
        }
        groups += 1;
        if !matched {
            unmatched += 1;
        }
        i = j;
    }
    writer.flush()?;
    Ok(PartOut {
        lines_in,
        groups,
        out_rows,
        unmatched,
        wall_ms: part_start.elapsed().as_millis() as u64,
    })
}
