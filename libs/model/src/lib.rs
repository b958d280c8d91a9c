//! # placement-model
//!
//! Record types for the workload placement ledger.
//!
//! ## Design Principles
//!
//! - Enum-valued columns are closed sets; unknown strings fail to parse
//! - An action's pod triples live in the [`ActionTarget`] sum type, so the
//!   action type and the populated triple can never disagree
//! - Status moves `pending -> succeeded | failed` and then stays put unless
//!   the caller forces it
//! - Producer input (`NewDecision`, `NewAction`) is validated before it
//!   becomes a record
//! - Timestamps are held at microsecond precision
//!
//! ## Records
//!
//! - [`Decision`]: where a scheduler decided a pod should run
//! - [`Action`]: what an executor actually did in the cluster

mod action;
mod decision;
mod error;
mod types;

pub use action::*;
pub use decision::*;
pub use error::{ModelError, TransitionError};
pub use types::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Round a timestamp down to microseconds, the resolution of a Postgres
/// `timestamptz`, so stored and returned records compare equal.
pub fn truncate_timestamp(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}
