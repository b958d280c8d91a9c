//! Scheduling decisions.

use chrono::{DateTime, Duration, Utc};
use placement_id::{DecisionId, NodeId, PodId, PodParentId};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{truncate_timestamp, ActionType, ModelError, PodParentKind, Status, Transition};

/// Where a scheduler decided a pod should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub pod_id: PodId,
    pub pod_name: String,
    pub namespace: String,
    pub node_id: NodeId,
    pub node_name: String,
    pub is_elastic: bool,
    pub queue_name: String,
    pub demand_cpu: f64,
    pub demand_memory: f64,
    pub demand_slack_cpu: Option<f64>,
    pub demand_slack_memory: Option<f64>,
    pub decision_status: Status,
    pub pod_parent_id: PodParentId,
    pub pod_parent_name: String,
    pub pod_parent_kind: PodParentKind,
    pub action_type: ActionType,
    pub decision_start_time: DateTime<Utc>,
    pub decision_end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Decision {
    /// Returns true once the decision has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Time the scheduler spent reaching the decision.
    pub fn decision_duration(&self) -> Duration {
        self.decision_end_time - self.decision_start_time
    }

    /// Apply a status change in place.
    pub fn set_status(&mut self, to: Status, force: bool) -> Result<Transition, ModelError> {
        let transition = self.decision_status.transition(to, force)?;
        if transition.is_write() {
            self.decision_status = to;
        }
        Ok(transition)
    }
}

/// A decision as submitted by a scheduler.
///
/// `id` and `decision_status` are optional: the service assigns a fresh id
/// and starts the decision as `pending` when they are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_decision_window"))]
pub struct NewDecision {
    #[serde(default)]
    pub id: Option<DecisionId>,
    pub pod_id: PodId,
    #[validate(length(min = 1, max = 253))]
    pub pod_name: String,
    #[validate(length(min = 1, max = 63))]
    pub namespace: String,
    pub node_id: NodeId,
    #[validate(length(min = 1, max = 253))]
    pub node_name: String,
    pub is_elastic: bool,
    #[validate(length(min = 1, max = 255))]
    pub queue_name: String,
    #[validate(range(min = 0.0))]
    pub demand_cpu: f64,
    #[validate(range(min = 0.0))]
    pub demand_memory: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub demand_slack_cpu: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub demand_slack_memory: Option<f64>,
    #[serde(default)]
    pub decision_status: Option<Status>,
    pub pod_parent_id: PodParentId,
    #[validate(length(min = 1, max = 253))]
    pub pod_parent_name: String,
    pub pod_parent_kind: PodParentKind,
    pub action_type: ActionType,
    pub decision_start_time: DateTime<Utc>,
    pub decision_end_time: DateTime<Utc>,
}

fn validate_decision_window(d: &NewDecision) -> Result<(), ValidationError> {
    if d.decision_end_time < d.decision_start_time {
        let mut err = ValidationError::new("time_window");
        err.message = Some("decision_end_time is before decision_start_time".into());
        return Err(err);
    }
    Ok(())
}

impl NewDecision {
    /// Validate and turn the submission into a record.
    ///
    /// Timestamps are truncated to microseconds.
    pub fn into_decision(self, created_at: DateTime<Utc>) -> Result<Decision, ModelError> {
        self.validate()?;

        Ok(Decision {
            id: self.id.unwrap_or_default(),
            pod_id: self.pod_id,
            pod_name: self.pod_name,
            namespace: self.namespace,
            node_id: self.node_id,
            node_name: self.node_name,
            is_elastic: self.is_elastic,
            queue_name: self.queue_name,
            demand_cpu: self.demand_cpu,
            demand_memory: self.demand_memory,
            demand_slack_cpu: self.demand_slack_cpu,
            demand_slack_memory: self.demand_slack_memory,
            decision_status: self.decision_status.unwrap_or_default(),
            pod_parent_id: self.pod_parent_id,
            pod_parent_name: self.pod_parent_name,
            pod_parent_kind: self.pod_parent_kind,
            action_type: self.action_type,
            decision_start_time: truncate_timestamp(self.decision_start_time),
            decision_end_time: truncate_timestamp(self.decision_end_time),
            created_at: truncate_timestamp(created_at),
            deleted_at: None,
        })
    }
}
