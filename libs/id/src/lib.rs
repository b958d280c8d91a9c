//! # placement-id
//!
//! Typed identifiers for the workload placement ledger.
//!
//! ## Design Principles
//!
//! - Every identifier is a UUID, as issued by Kubernetes or by the producers
//! - IDs are typed to prevent mixing different resource kinds
//! - A decision's `pod_parent_id` and an action's `pod_parent_uid` share
//!   [`PodParentId`], so the correlation key compares like with like
//! - Parsing is strict: the canonical hyphenated form, braced and simple
//!   forms are accepted, anything else is rejected
//!
//! ## ID Format
//!
//! IDs render as lowercase hyphenated UUIDs, with no prefix, because that is
//! the form producers already hold (e.g. a ReplicaSet's `metadata.uid`):
//!
//! - `3f2c8a4e-9b1d-4c7a-8e2f-5d6b7a8c9e0f`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that need raw UUID operations
pub use uuid::Uuid;
