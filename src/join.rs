use crate::api::{JobOptions, MapKey, MapValue, Mapper};
use crate::engine::execute;
use crate::error::JobError;
use crate::io::list_files_recursive;
use crate::record::Record;
use crate::report::JobResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source tag wrapper carrying a pair through the shared shuffle: both join
/// inputs map to the same key space, values keep their origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Tagged<L, R> {
    Left(L),
    Right(R),
}

/// Reducer-side join: invoked once per key present on both sides with the
/// full ordered value sequences of each. One-sided keys never reach it;
/// the engine drops and counts them.
pub trait JoinReducer: Send + Sync {
    type Key: MapKey;
    type Left: MapValue;
    type Right: MapValue;

    fn do_join<F>(&self, key: &Self::Key, left: &[Self::Left], right: &[Self::Right], emit: &mut F)
    where
        F: FnMut(String);
}

/// Specialization of the job executor that co-groups two tagged input
/// streams by key, reusing the same map/shuffle/sort machinery.
#[allow(clippy::too_many_arguments)]
pub fn run_join<ML, MR, J>(
    name: &str,
    left_inputs: &[PathBuf],
    right_inputs: &[PathBuf],
    left_mapper: &ML,
    right_mapper: &MR,
    reducer: &J,
    output_dir: &Path,
    opts: &JobOptions,
) -> Result<JobResult, JobError>
where
    J: JoinReducer,
    ML: Mapper<Key = J::Key, Value = J::Left>,
    MR: Mapper<Key = J::Key, Value = J::Right>,
{
    let mut files = Vec::new();
    for dir in left_inputs {
        files.extend(list_files_recursive(dir).map_err(|e| JobError::Setup(e.to_string()))?);
    }
    let left_shards = files.len();
    for dir in right_inputs {
        files.extend(list_files_recursive(dir).map_err(|e| JobError::Setup(e.to_string()))?);
    }

    let map_fn = |shard: usize,
                  line: &str,
                  emit: &mut dyn FnMut(J::Key, Tagged<J::Left, J::Right>)| {
        let record = Record::from_line(line);
        if shard < left_shards {
            left_mapper.do_map(&record, &mut |k, v| emit(k, Tagged::Left(v)))
        } else {
            right_mapper.do_map(&record, &mut |k, v| emit(k, Tagged::Right(v)))
        }
    };

    let group_fn = |key: &J::Key,
                    values: &[Tagged<J::Left, J::Right>],
                    mut emit: &mut dyn FnMut(String)| {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for v in values {
            match v {
                Tagged::Left(l) => left.push(l.clone()),
                Tagged::Right(r) => right.push(r.clone()),
            }
        }
        if left.is_empty() || right.is_empty() {
            // Inner-join semantics: one-sided keys are dropped, not emitted.
            return false;
        }
        reducer.do_join(key, &left, &right, &mut emit);
        true
    };

    execute(name, files, &map_fn, None, None, &group_fn, output_dir, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MapOutcome, PartitionCount};
    use std::fs;
    use tempfile::tempdir;

    struct KvMapper;

    impl Mapper for KvMapper {
        type Key = String;
        type Value = String;

        fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
        where
            F: FnMut(Self::Key, Self::Value),
        {
            let (Some(k), Some(v)) = (record.field(0), record.field(1)) else {
                return MapOutcome::Rejected;
            };
            emit(k.to_string(), v.to_string());
            MapOutcome::Mapped
        }
    }

    struct PairJoin;

    impl JoinReducer for PairJoin {
        type Key = String;
        type Left = String;
        type Right = String;

        fn do_join<F>(&self, key: &String, left: &[String], right: &[String], emit: &mut F)
        where
            F: FnMut(String),
        {
            for l in left {
                for r in right {
                    emit(format!("{key}\t{l}\t{r}"));
                }
            }
        }
    }

    #[test]
    fn inner_join_drops_and_counts_one_sided_keys() {
        let tmp = tempdir().unwrap();
        let left = tmp.path().join("left");
        let right = tmp.path().join("right");
        fs::create_dir_all(&left).unwrap();
        fs::create_dir_all(&right).unwrap();
        fs::write(left.join("l.tsv"), "u1\ta\nu2\tb\nu3\tc\n").unwrap();
        fs::write(right.join("r.tsv"), "u1\tx\nu4\ty\n").unwrap();

        let opts = JobOptions {
            partitions: PartitionCount::Fixed(2),
            scratch_root: tmp.path().join("scratch"),
            workers: 2,
            ..JobOptions::default()
        };
        let out = tmp.path().join("out");
        let result = run_join(
            "join_test",
            &[left],
            &[right],
            &KvMapper,
            &KvMapper,
            &PairJoin,
            &out,
            &opts,
        )
        .unwrap();

        // u2, u3 have no profile side; u4 has no activity side.
        assert_eq!(result.unmatched, 3);
        assert_eq!(result.records_out, 1);

        let mut rows = Vec::new();
        for f in list_files_recursive(&out).unwrap() {
            rows.extend(fs::read_to_string(f).unwrap().lines().map(str::to_string));
        }
        assert_eq!(rows, vec!["u1\ta\tx"]);
    }
}
