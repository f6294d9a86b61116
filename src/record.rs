use serde::{Deserialize, Serialize};
use std::fmt;

/// Field delimiter for raw logs and every phase's on-disk rows.
pub const FIELD_DELIM: char = '\t';

/// One parsed input line: an ordered tuple of fields. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    pub fn from_line(line: &str) -> Self {
        Self {
            fields: line.split(FIELD_DELIM).map(str::to_string).collect(),
        }
    }

    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rejoins the fields in their original order.
    pub fn to_line(&self) -> String {
        self.fields.join("\t")
    }
}

/// Action types an activity log row may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Post,
    Like,
    Share,
    Comment,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Action::Post),
            "like" => Some(Action::Like),
            "share" => Some(Action::Share),
            "comment" => Some(Action::Comment),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Post => "post",
            Action::Like => "like",
            Action::Share => "share",
            Action::Comment => "comment",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_field_order() {
        let rec = Record::from_line("u1\tpost\tc9\t1700000000");
        assert_eq!(rec.len(), 4);
        assert_eq!(rec.field(0), Some("u1"));
        assert_eq!(rec.field(3), Some("1700000000"));
        assert_eq!(rec.to_line(), "u1\tpost\tc9\t1700000000");
    }

    #[test]
    fn unknown_action_is_none() {
        assert_eq!(Action::parse("login"), None);
        assert_eq!(Action::parse("share"), Some(Action::Share));
    }
}
