//! Decision/action flow: each decision joined with every action that
//! fulfilled it, plus how long each side took.

use chrono::Duration;
use placement_correlation::{matching_actions, MatchKey};
use placement_id::{ActionId, DecisionId};
use placement_model::{Action, ActionType, Decision};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{PlacementService, ServiceError};
use crate::db::{DecisionFilter, Page, Resource};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowFilter {
    pub decision_id: Option<DecisionId>,
    pub action_id: Option<ActionId>,
    pub pod_name: Option<String>,
    pub namespace: Option<String>,
    pub node_name: Option<String>,
    pub action_type: Option<ActionType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEntry {
    pub decision: Decision,
    pub action: Action,
    pub decision_duration_seconds: f64,
    /// Null while the action has not ended.
    pub action_duration_seconds: Option<f64>,
    pub total_duration_seconds: Option<f64>,
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

impl FlowEntry {
    pub fn new(decision: Decision, action: Action) -> Self {
        let decision_duration_seconds = seconds(decision.decision_duration());
        let action_duration_seconds = action.action_duration().map(seconds);
        Self {
            decision_duration_seconds,
            action_duration_seconds,
            total_duration_seconds: action_duration_seconds
                .map(|a| a + decision_duration_seconds),
            decision,
            action,
        }
    }
}

impl PlacementService {
    /// List every matched `(decision, action)` pair.
    ///
    /// Pages over live decisions in list order. Each decision yields one
    /// entry per fulfilling action, latest action first; decisions without
    /// one are left out. `action_id` narrows the pairs, not the decisions.
    #[instrument(skip(self))]
    pub async fn list_flow(
        &self,
        filter: FlowFilter,
        page: Page,
    ) -> Result<Vec<FlowEntry>, ServiceError> {
        let decision_filter = DecisionFilter {
            id: filter.decision_id,
            pod_name: filter.pod_name,
            namespace: filter.namespace,
            node_name: filter.node_name,
            action_type: filter.action_type,
            ..Default::default()
        };
        let decisions = self
            .store
            .list_decisions(&decision_filter, page)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))?;

        let mut keys: Vec<MatchKey> = decisions.iter().map(MatchKey::for_decision).collect();
        keys.sort_by_key(|k| (k.pod_parent, k.action_type));
        keys.dedup();

        let actions = self
            .store
            .actions_for_keys(&keys)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?;

        let action_id = filter.action_id;
        let entries: Vec<FlowEntry> = decisions
            .iter()
            .flat_map(|decision| {
                matching_actions(decision, &actions)
                    .into_iter()
                    .filter(move |action| action_id.is_none_or(|id| id == action.id))
                    .map(move |action| FlowEntry::new(decision.clone(), action.clone()))
            })
            .collect();

        debug!(
            candidates = actions.len(),
            entries = entries.len(),
            "Flow page assembled"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use placement_model::Status;
    use placement_testing::{ActionBuilder, DecisionBuilder};
    use std::sync::Arc;

    #[test]
    fn test_entry_durations() {
        let d = DecisionBuilder::new().build();
        let start = d.decision_end_time;
        let open = ActionBuilder::for_decision(&d).started_at(start).build();

        let entry = FlowEntry::new(d.clone(), open);
        assert_eq!(entry.decision_duration_seconds, 0.25);
        assert!(entry.action_duration_seconds.is_none());
        assert!(entry.total_duration_seconds.is_none());

        let closed = ActionBuilder::for_decision(&d)
            .started_at(start)
            .ended_at(start + Duration::seconds(2))
            .status(Status::Succeeded)
            .build();
        let entry = FlowEntry::new(d, closed);
        assert_eq!(entry.action_duration_seconds, Some(2.0));
        assert_eq!(entry.total_duration_seconds, Some(2.25));
    }

    #[tokio::test]
    async fn test_flow_lists_only_matched() {
        let svc = PlacementService::new(Arc::new(MemoryStore::new()));
        let matched = svc
            .create_decision(DecisionBuilder::new().node("worker-1").new_decision_with_id())
            .await
            .unwrap();
        let unmatched = svc
            .create_decision(DecisionBuilder::new().node("worker-2").new_decision_with_id())
            .await
            .unwrap();
        let action = svc
            .create_action(ActionBuilder::for_decision(&matched).new_action())
            .await
            .unwrap();
        svc.create_action(
            ActionBuilder::for_decision(&unmatched)
                .triple(&unmatched.pod_name, &unmatched.namespace, "worker-9")
                .new_action(),
        )
        .await
        .unwrap();

        let flow = svc
            .list_flow(FlowFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(flow.len(), 1);
        assert_eq!(flow[0].decision.id, matched.id);
        assert_eq!(flow[0].action.id, action.id);

        let by_other_action = svc
            .list_flow(
                FlowFilter {
                    action_id: Some(ActionId::new()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert!(by_other_action.is_empty());

        let by_node = svc
            .list_flow(
                FlowFilter {
                    node_name: Some("worker-2".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert!(by_node.is_empty());
    }

    #[tokio::test]
    async fn test_flow_keeps_superseded_actions() {
        let svc = PlacementService::new(Arc::new(MemoryStore::new()));
        let d = svc
            .create_decision(DecisionBuilder::new().new_decision_with_id())
            .await
            .unwrap();
        let start = d.decision_end_time;
        let failed = svc
            .create_action(
                ActionBuilder::for_decision(&d)
                    .started_at(start)
                    .status(Status::Failed)
                    .new_action(),
            )
            .await
            .unwrap();
        let retry = svc
            .create_action(
                ActionBuilder::for_decision(&d)
                    .started_at(start + Duration::seconds(3))
                    .new_action(),
            )
            .await
            .unwrap();

        let flow = svc
            .list_flow(FlowFilter::default(), Page::default())
            .await
            .unwrap();
        let ids: Vec<ActionId> = flow.iter().map(|e| e.action.id).collect();
        assert_eq!(ids, vec![retry.id, failed.id]);

        let by_failed = svc
            .list_flow(
                FlowFilter {
                    action_id: Some(failed.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_failed.len(), 1);
        assert_eq!(by_failed[0].decision.id, d.id);
        assert_eq!(by_failed[0].action, failed);
    }
}
