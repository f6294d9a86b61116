//! Per-phase mapper/combiner/reducer policies. The engine supplies the
//! mechanism (shuffle, sort, skew handling); these modules only decide what
//! each phase's pairs and rows look like.

pub mod activity;
pub mod join;
pub mod rank;
pub mod trending;
pub mod validate;
