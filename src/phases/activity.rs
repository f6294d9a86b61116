use crate::api::{Combiner, MapOutcome, Mapper, Reducer};
use crate::record::{Action, Record};
use serde::{Deserialize, Serialize};

/// Per-user action tallies; the value type of the activity job and the row
/// schema of its output (`user \t posts \t likes \t shares \t comments`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub posts: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
}

impl ActionCounts {
    pub fn for_action(action: Action) -> Self {
        let mut c = Self::default();
        match action {
            Action::Post => c.posts = 1,
            Action::Like => c.likes = 1,
            Action::Share => c.shares = 1,
            Action::Comment => c.comments = 1,
        }
        c
    }

    pub fn merge(&mut self, other: &ActionCounts) {
        self.posts += other.posts;
        self.likes += other.likes;
        self.shares += other.shares;
        self.comments += other.comments;
    }

    pub fn to_row(&self, user: &str) -> String {
        format!(
            "{user}\t{}\t{}\t{}\t{}",
            self.posts, self.likes, self.shares, self.comments
        )
    }

    /// Parses an activity output row back into (user, counts).
    pub fn parse_row(record: &Record) -> Option<(String, ActionCounts)> {
        if record.len() != 5 {
            return None;
        }
        let user = record.field(0)?.to_string();
        if user.is_empty() {
            return None;
        }
        Some((
            user,
            ActionCounts {
                posts: record.field(1)?.parse().ok()?,
                likes: record.field(2)?.parse().ok()?,
                shares: record.field(3)?.parse().ok()?,
                comments: record.field(4)?.parse().ok()?,
            },
        ))
    }
}

/// Cleansed record → one single-action tally keyed by user.
pub struct ActivityMapper;

impl Mapper for ActivityMapper {
    type Key = String;
    type Value = ActionCounts;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        let (Some(user), Some(action)) = (record.field(0), record.field(1)) else {
            return MapOutcome::Rejected;
        };
        let Some(action) = Action::parse(action) else {
            return MapOutcome::Rejected;
        };
        emit(user.to_string(), ActionCounts::for_action(action));
        MapOutcome::Mapped
    }
}

pub struct ActivityCombiner;

impl Combiner<String, ActionCounts> for ActivityCombiner {
    fn combine(&self, acc: &mut ActionCounts, value: ActionCounts) {
        acc.merge(&value);
    }
}

pub struct ActivityReducer;

impl Reducer for ActivityReducer {
    type Key = String;
    type ValueIn = ActionCounts;

    fn do_reduce<F>(&self, key: &Self::Key, values: &[Self::ValueIn], emit: &mut F)
    where
        F: FnMut(String),
    {
        let mut total = ActionCounts::default();
        for v in values {
            total.merge(v);
        }
        emit(total.to_row(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_aggregate_per_action_type() {
        let reducer = ActivityReducer;
        let values = vec![
            ActionCounts::for_action(Action::Post),
            ActionCounts::for_action(Action::Post),
            ActionCounts::for_action(Action::Like),
            ActionCounts::for_action(Action::Share),
        ];
        let mut out = Vec::new();
        reducer.do_reduce(&"u1".to_string(), &values, &mut |l| out.push(l));
        assert_eq!(out, vec!["u1\t2\t1\t1\t0"]);
    }

    #[test]
    fn combiner_matches_reducer_semantics() {
        let combiner = ActivityCombiner;
        let mut acc = ActionCounts::for_action(Action::Like);
        combiner.combine(&mut acc, ActionCounts::for_action(Action::Like));
        combiner.combine(&mut acc, ActionCounts::for_action(Action::Post));
        assert_eq!(acc, ActionCounts { posts: 1, likes: 2, shares: 0, comments: 0 });
    }

    #[test]
    fn row_round_trips() {
        let counts = ActionCounts { posts: 5, likes: 1, shares: 0, comments: 2 };
        let row = counts.to_row("u9");
        let parsed = ActionCounts::parse_row(&Record::from_line(&row)).unwrap();
        assert_eq!(parsed, ("u9".to_string(), counts));
    }
}
