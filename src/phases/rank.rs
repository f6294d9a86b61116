use crate::api::{MapOutcome, Mapper, Reducer};
use crate::phases::activity::ActionCounts;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Composite sort key for the global activity ordering: post count
/// descending, then user id ascending as the deterministic tie-break. The
/// rank job runs with a single partition, so ascending key order in the
/// sort stage is the final output order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankKey {
    pub posts: u64,
    pub user: String,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .posts
            .cmp(&self.posts)
            .then_with(|| self.user.cmp(&other.user))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Activity row → (rank key, row).
pub struct RankMapper;

impl Mapper for RankMapper {
    type Key = RankKey;
    type Value = String;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        let Some((user, counts)) = ActionCounts::parse_row(record) else {
            return MapOutcome::Rejected;
        };
        emit(
            RankKey {
                posts: counts.posts,
                user,
            },
            record.to_line(),
        );
        MapOutcome::Mapped
    }
}

pub struct RankReducer;

impl Reducer for RankReducer {
    type Key = RankKey;
    type ValueIn = String;

    fn do_reduce<F>(&self, _key: &Self::Key, values: &[Self::ValueIn], emit: &mut F)
    where
        F: FnMut(String),
    {
        for v in values {
            emit(v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_posts_descending_then_user_ascending() {
        let mut keys = vec![
            RankKey { posts: 1, user: "u2".into() },
            RankKey { posts: 9, user: "u5".into() },
            RankKey { posts: 1, user: "u1".into() },
            RankKey { posts: 9, user: "u0".into() },
        ];
        keys.sort();
        let order: Vec<(u64, &str)> = keys.iter().map(|k| (k.posts, k.user.as_str())).collect();
        assert_eq!(order, vec![(9, "u0"), (9, "u5"), (1, "u1"), (1, "u2")]);
    }

    #[test]
    fn malformed_activity_row_is_rejected() {
        let mut out = Vec::new();
        let outcome = RankMapper.do_map(&Record::from_line("u1\tfive\t0\t0\t0"), &mut |k, v| {
            out.push((k, v))
        });
        assert_eq!(outcome, MapOutcome::Rejected);
        assert!(out.is_empty());
    }
}
