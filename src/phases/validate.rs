use crate::api::{MapOutcome, Mapper, Reducer};
use crate::record::{Action, Record};
use regex::Regex;

/// `user_id \t action \t content_id \t timestamp`
pub const RAW_FIELDS: usize = 4;

/// Cleanses raw activity log rows. Valid rows pass through keyed by user id;
/// anything malformed is rejected and tallied, never fatal.
pub struct ValidateMapper {
    user_re: Regex,
}

impl ValidateMapper {
    pub fn new() -> Self {
        Self {
            user_re: Regex::new(r"^u[0-9]+$").unwrap(),
        }
    }
}

impl Default for ValidateMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper for ValidateMapper {
    type Key = String;
    type Value = String;

    fn do_map<F>(&self, record: &Record, emit: &mut F) -> MapOutcome
    where
        F: FnMut(Self::Key, Self::Value),
    {
        if record.len() != RAW_FIELDS {
            return MapOutcome::Rejected;
        }
        let user = record.field(0).unwrap_or("");
        if !self.user_re.is_match(user) {
            return MapOutcome::Rejected;
        }
        if Action::parse(record.field(1).unwrap_or("")).is_none() {
            return MapOutcome::Rejected;
        }
        if record.field(2).unwrap_or("").is_empty() {
            return MapOutcome::Rejected;
        }
        if record.field(3).unwrap_or("").parse::<u64>().is_err() {
            return MapOutcome::Rejected;
        }
        emit(user.to_string(), record.to_line());
        MapOutcome::Mapped
    }
}

/// Forwards every cleansed record unchanged; no cross-record aggregation.
pub struct PassThroughReducer;

impl Reducer for PassThroughReducer {
    type Key = String;
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
