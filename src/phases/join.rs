use crate::api::{MapOutcome, Mapper};
use crate::join::JoinReducer;
use crate::phases::activity::ActionCounts;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `user_id \t age \t city`, supplied by the external profiles directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub age: u32,
    pub city: String,
}

/// Ranked activity row → (user, counts); the left side of the join.
pub struct ActivitySideMapper;

impl Mapper for ActivitySideMapper {
    type Key = String;
    type Value = ActionCounts;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        let Some((user, counts)) = ActionCounts::parse_row(record) else {
            return MapOutcome::Rejected;
        };
        emit(user, counts);
        MapOutcome::Mapped
    }
}

/// Profile row → (user, profile); the right side of the join.
pub struct ProfileMapper;

impl Mapper for ProfileMapper {
    type Key = String;
    type Value = Profile;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        if record.len() != 3 {
            return MapOutcome::Rejected;
        }
        let user = record.field(0).unwrap_or("");
        if user.is_empty() {
            return MapOutcome::Rejected;
        }
        let Some(age) = record.field(1).and_then(|a| a.parse::<u32>().ok()) else {
            return MapOutcome::Rejected;
        };
        let city = record.field(2).unwrap_or("");
        if city.is_empty() {
            return MapOutcome::Rejected;
        }
        emit(
            user.to_string(),
            Profile {
                age,
                city: city.to_string(),
            },
        );
        MapOutcome::Mapped
    }
}

/// Inner merge: each activity record for a user pairs with that user's (at
/// most one) profile record into one combined row.
pub struct ActivityProfileJoin;

impl JoinReducer for ActivityProfileJoin {
    type Key = String;
    type Left = ActionCounts;
    type Right = Profile;

    fn do_join<F>(&self, key: &String, left: &[ActionCounts], right: &[Profile], emit: &mut F)
    where
        F: FnMut(String),
    {
        if right.len() > 1 {
            warn!(user = %key, profiles = right.len(), "duplicate profile rows; using the first");
        }
        let profile = &right[0];
        for counts in left {
            emit(format!(
                "{}\t{}\t{}",
                counts.to_row(key),
                profile.age,
                profile.city
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_row_carries_counts_and_profile() {
        let counts = ActionCounts { posts: 5, likes: 1, shares: 0, comments: 0 };
        let profile = Profile { age: 30, city: "X".into() };
        let mut out = Vec::new();
        ActivityProfileJoin.do_join(
            &"u1".to_string(),
            std::slice::from_ref(&counts),
            std::slice::from_ref(&profile),
            &mut |l| out.push(l),
        );
        assert_eq!(out, vec!["u1\t5\t1\t0\t0\t30\tX"]);
    }

    #[test]
    fn profile_rows_validate_shape() {
        let mut out = Vec::new();
        for bad in ["u1\t30", "u1\tthirty\tX", "\t30\tX", "u1\t30\t"] {
            let outcome = ProfileMapper.do_map(&Record::from_line(bad), &mut |k, v| {
                out.push((k, v))
            });
            assert_eq!(outcome, MapOutcome::Rejected, "line: {bad}");
        }
        assert!(out.is_empty());

        let outcome = ProfileMapper.do_map(&Record::from_line("u1\t30\tX"), &mut |k, v| {
            out.push((k, v))
        });
        assert_eq!(outcome, MapOutcome::Mapped);
        assert_eq!(out, vec![("u1".to_string(), Profile { age: 30, city: "X".into() })]);
    }
}
