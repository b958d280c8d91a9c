//! Closed enums shared by decisions and actions.
//!
//! Each enum has a canonical lowercase string form used on the wire and in
//! the database. `FromStr` accepts exactly that form.

use serde::{Deserialize, Serialize};

use crate::{ModelError, TransitionError};

// =============================================================================
// Action Type
// =============================================================================

/// Cluster operation a decision asks for and an action reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Bind,
    Create,
    Delete,
    Move,
    SwapX,
    SwapY,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [ActionType; 6] = [
        Self::Bind,
        Self::Create,
        Self::Delete,
        Self::Move,
        Self::SwapX,
        Self::SwapY,
    ];

    const EXPECTED: &'static str = "bind, create, delete, move, swap_x, swap_y";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::SwapX => "swap_x",
            Self::SwapY => "swap_y",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::InvalidEnum {
                field: "action_type",
                value: s.to_string(),
                expected: Self::EXPECTED,
            })
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of a decision or an action.
///
/// Transitions: `Pending -> Succeeded | Failed`. The two outcomes are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// What applying a status change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested status equals the current one; nothing to write.
    Unchanged,
    /// Regular `pending -> outcome` move, or `pending -> pending`.
    Applied { from: Status, to: Status },
    /// Terminal status overwritten because the caller forced it.
    Forced { from: Status, to: Status },
}

impl Transition {
    /// Returns true if the stored status has to be written.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl Status {
    pub const ALL: [Status; 3] = [Self::Pending, Self::Succeeded, Self::Failed];

    const EXPECTED: &'static str = "pending, succeeded, failed";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Decide whether `self -> to` is allowed.
    ///
    /// Same status is always a no-op. Leaving a terminal status requires
    /// `force`.
    pub fn transition(self, to: Status, force: bool) -> Result<Transition, TransitionError> {
        if self == to {
            return Ok(Transition::Unchanged);
        }
        if !self.is_terminal() {
            return Ok(Transition::Applied { from: self, to });
        }
        if force {
            return Ok(Transition::Forced { from: self, to });
        }
        Err(TransitionError { from: self, to })
    }

    fn parse_field(s: &str, field: &'static str) -> Result<Self, ModelError> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ModelError::InvalidEnum {
                field,
                value: s.to_string(),
                expected: Self::EXPECTED,
            })
    }

    /// Parse a `decision_status` column or query value.
    pub fn parse_decision_status(s: &str) -> Result<Self, ModelError> {
        Self::parse_field(s, "decision_status")
    }

    /// Parse an `action_status` column or query value.
    pub fn parse_action_status(s: &str) -> Result<Self, ModelError> {
        Self::parse_field(s, "action_status")
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_field(s, "status")
    }
}

// =============================================================================
// Pod Parent Kind
// =============================================================================

/// Kind of controller owning a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodParentKind {
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl PodParentKind {
    pub const ALL: [PodParentKind; 6] = [
        Self::Deployment,
        Self::ReplicaSet,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::Job,
        Self::CronJob,
    ];

    const EXPECTED: &'static str = "deployment, replicaset, statefulset, daemonset, job, cronjob";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaset",
            Self::StatefulSet => "statefulset",
            Self::DaemonSet => "daemonset",
            Self::Job => "job",
            Self::CronJob => "cronjob",
        }
    }

    fn parse_field(s: &str, field: &'static str) -> Result<Self, ModelError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::InvalidEnum {
                field,
                value: s.to_string(),
                expected: Self::EXPECTED,
            })
    }

    /// Parse a decision's `pod_parent_kind`.
    pub fn parse_kind(s: &str) -> Result<Self, ModelError> {
        Self::parse_field(s, "pod_parent_kind")
    }

    /// Parse an action's `pod_parent_type`.
    pub fn parse_type(s: &str) -> Result<Self, ModelError> {
        Self::parse_field(s, "pod_parent_type")
    }
}

impl std::fmt::Display for PodParentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PodParentKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_kind(s)
    }
}
