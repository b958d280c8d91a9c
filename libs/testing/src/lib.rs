//! # placement-testing
//!
//! Builders for decisions and actions used across the workspace's tests.
//!
//! Every builder starts from a valid record, so a test only spells out the
//! fields it cares about:
//!
//! ```ignore
//! let decision = DecisionBuilder::new().node("worker-2").build();
//! let action = ActionBuilder::for_decision(&decision).build();
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use placement_id::{ActionId, DecisionId, NodeId, PodId, PodParentId};
use placement_model::{
    Action, ActionType, Decision, NewAction, NewDecision, PodParentKind, Status, TripleColumns,
};

/// Fixed instant the fixtures are anchored to.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// =============================================================================
// Decisions
// =============================================================================

#[derive(Debug, Clone)]
pub struct DecisionBuilder {
    new: NewDecision,
    created_at: DateTime<Utc>,
}

impl Default for DecisionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionBuilder {
    pub fn new() -> Self {
        let start = base_time();
        Self {
            new: NewDecision {
                id: Some(DecisionId::new()),
                pod_id: PodId::new(),
                pod_name: "web-0".to_string(),
                namespace: "default".to_string(),
                node_id: NodeId::new(),
                node_name: "worker-1".to_string(),
                is_elastic: false,
                queue_name: "default".to_string(),
                demand_cpu: 1.0,
                demand_memory: 512.0,
                demand_slack_cpu: None,
                demand_slack_memory: None,
                decision_status: None,
                pod_parent_id: PodParentId::new(),
                pod_parent_name: "web".to_string(),
                pod_parent_kind: PodParentKind::ReplicaSet,
                action_type: ActionType::Bind,
                decision_start_time: start,
                decision_end_time: start + Duration::milliseconds(250),
            },
            created_at: start,
        }
    }

    pub fn id(mut self, id: DecisionId) -> Self {
        self.new.id = Some(id);
        self
    }

    pub fn pod(mut self, pod_name: &str, namespace: &str) -> Self {
        self.new.pod_name = pod_name.to_string();
        self.new.namespace = namespace.to_string();
        self
    }

    pub fn node(mut self, node_name: &str) -> Self {
        self.new.node_name = node_name.to_string();
        self
    }

    pub fn queue(mut self, queue_name: &str) -> Self {
        self.new.queue_name = queue_name.to_string();
        self
    }

    pub fn action_type(mut self, action_type: ActionType) -> Self {
        self.new.action_type = action_type;
        self
    }

    pub fn parent(mut self, pod_parent_id: PodParentId) -> Self {
        self.new.pod_parent_id = pod_parent_id;
        self
    }

    pub fn kind(mut self, kind: PodParentKind) -> Self {
        self.new.pod_parent_kind = kind;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.new.decision_status = Some(status);
        self
    }

    pub fn elastic(mut self, is_elastic: bool) -> Self {
        self.new.is_elastic = is_elastic;
        self
    }

    pub fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.new.decision_start_time = start;
        self.new.decision_end_time = end;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The producer payload, without an id.
    pub fn new_decision(self) -> NewDecision {
        NewDecision {
            id: None,
            ..self.new
        }
    }

    /// The producer payload, keeping the preset id.
    pub fn new_decision_with_id(self) -> NewDecision {
        self.new
    }

    /// # Panics
    ///
    /// Panics if the builder was given invalid field values.
    pub fn build(self) -> Decision {
        match self.new.into_decision(self.created_at) {
            Ok(decision) => decision,
            Err(e) => panic!("invalid decision fixture: {e}"),
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

#[derive(Debug, Clone)]
pub struct ActionBuilder {
    new: NewAction,
    created_at: DateTime<Utc>,
}

fn set_triple(
    cols: &mut TripleColumns,
    action_type: ActionType,
    pod_name: &str,
    namespace: &str,
    node_name: &str,
) {
    let (p, ns, n) = match action_type {
        ActionType::Bind => (
            &mut cols.bound_pod_name,
            &mut cols.bound_pod_namespace,
            &mut cols.bound_node_name,
        ),
        ActionType::Delete => (
            &mut cols.deleted_pod_name,
            &mut cols.deleted_pod_namespace,
            &mut cols.deleted_node_name,
        ),
        ActionType::Create | ActionType::Move | ActionType::SwapX | ActionType::SwapY => (
            &mut cols.created_pod_name,
            &mut cols.created_pod_namespace,
            &mut cols.created_node_name,
        ),
    };
    *p = Some(pod_name.to_string());
    *ns = Some(namespace.to_string());
    *n = Some(node_name.to_string());
}

impl ActionBuilder {
    /// A pending action of `action_type` for `web-0` in `default` on
    /// `worker-1`.
    pub fn new(action_type: ActionType) -> Self {
        let mut columns = TripleColumns::default();
        set_triple(&mut columns, action_type, "web-0", "default", "worker-1");
        let start = base_time() + Duration::seconds(1);

        Self {
            new: NewAction {
                id: Some(ActionId::new()),
                action_type,
                action_status: None,
                action_start_time: start,
                action_end_time: None,
                action_reason: String::new(),
                pod_parent_name: "web".to_string(),
                pod_parent_type: PodParentKind::ReplicaSet,
                pod_parent_uid: PodParentId::new(),
                columns,
            },
            created_at: start,
        }
    }

    /// An action that fulfils `decision`: same key, same triple.
    pub fn for_decision(decision: &Decision) -> Self {
        Self::new(decision.action_type)
            .parent(decision.pod_parent_id)
            .parent_name(&decision.pod_parent_name)
            .kind(decision.pod_parent_kind)
            .triple(&decision.pod_name, &decision.namespace, &decision.node_name)
    }

    pub fn id(mut self, id: ActionId) -> Self {
        self.new.id = Some(id);
        self
    }

    pub fn parent(mut self, pod_parent_uid: PodParentId) -> Self {
        self.new.pod_parent_uid = pod_parent_uid;
        self
    }

    pub fn parent_name(mut self, name: &str) -> Self {
        self.new.pod_parent_name = name.to_string();
        self
    }

    pub fn kind(mut self, kind: PodParentKind) -> Self {
        self.new.pod_parent_type = kind;
        self
    }

    /// Replace the triple the action type is matched on.
    pub fn triple(mut self, pod_name: &str, namespace: &str, node_name: &str) -> Self {
        set_triple(
            &mut self.new.columns,
            self.new.action_type,
            pod_name,
            namespace,
            node_name,
        );
        self
    }

    /// Set the `deleted_*` source triple of a move or swap.
    pub fn source(mut self, pod_name: &str, namespace: &str, node_name: &str) -> Self {
        set_triple(
            &mut self.new.columns,
            ActionType::Delete,
            pod_name,
            namespace,
            node_name,
        );
        self
    }

    /// Drop the node from the matched triple, as a pending executor reports it.
    pub fn without_node(mut self) -> Self {
        let cols = &mut self.new.columns;
        match self.new.action_type {
            ActionType::Bind => cols.bound_node_name = None,
            ActionType::Delete => cols.deleted_node_name = None,
            _ => cols.created_node_name = None,
        }
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.new.action_status = Some(status);
        self
    }

    pub fn started_at(mut self, start: DateTime<Utc>) -> Self {
        self.new.action_start_time = start;
        self
    }

    pub fn ended_at(mut self, end: DateTime<Utc>) -> Self {
        self.new.action_end_time = Some(end);
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.new.action_reason = reason.to_string();
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The producer payload, without an id.
    pub fn new_action(self) -> NewAction {
        NewAction {
            id: None,
            ..self.new
        }
    }

    /// # Panics
    ///
    /// Panics if the builder was given invalid field values.
    pub fn build(self) -> Action {
        match self.new.into_action(self.created_at) {
            Ok(action) => action,
            Err(e) => panic!("invalid action fixture: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_valid_records() {
        for t in ActionType::ALL {
            let decision = DecisionBuilder::new().action_type(t).build();
            let action = ActionBuilder::for_decision(&decision).build();
            assert_eq!(action.action_type(), t);
            assert_eq!(action.pod_parent_uid, decision.pod_parent_id);
        }
    }

    #[test]
    fn test_new_decision_drops_id() {
        assert!(DecisionBuilder::new().new_decision().id.is_none());
        assert!(ActionBuilder::new(ActionType::Create).new_action().id.is_none());
    }
}
