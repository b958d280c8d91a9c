//! Query and command operations over decisions and actions.
//!
//! Handlers call into [`PlacementService`]; it validates input, talks to the
//! store and runs the correlation engine. Nothing here knows about HTTP.

mod error;
mod flow;

pub use error::{ConflictReason, FieldViolation, ServiceError};
pub use flow::{FlowEntry, FlowFilter};

use std::sync::Arc;

use chrono::Utc;
use placement_correlation::{correlate, MatchKey};
use placement_id::{ActionId, DecisionId};
use placement_model::{
    truncate_timestamp, Action, ActionUpdate, Decision, NewAction, NewDecision, Status,
    Transition,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::{ActionFilter, DbError, DecisionFilter, Page, Resource, Store};

/// Result of checking one decision against the recorded actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub decision_id: DecisionId,
    pub matched: bool,
    /// The fulfilling action, when matched.
    pub action: Option<Action>,
    /// Actions sharing the decision's parent and type.
    pub candidates: usize,
}

/// Validate pagination parameters.
pub fn page(skip: Option<i64>, limit: Option<i64>) -> Result<Page, ServiceError> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(Page::DEFAULT_LIMIT);

    if skip < 0 {
        return Err(ServiceError::invalid_field("skip", "must be >= 0"));
    }
    if !(1..=Page::MAX_LIMIT).contains(&limit) {
        return Err(ServiceError::invalid_field(
            "limit",
            format!("must be between 1 and {}", Page::MAX_LIMIT),
        ));
    }
    Ok(Page { skip, limit })
}

#[derive(Clone)]
pub struct PlacementService {
    store: Arc<dyn Store>,
}

impl PlacementService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        self.store.health_check().await
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    #[instrument(skip(self, new), fields(pod_name = %new.pod_name, node_name = %new.node_name))]
    pub async fn create_decision(&self, new: NewDecision) -> Result<Decision, ServiceError> {
        let decision = new
            .into_decision(Utc::now())
            .map_err(|e| ServiceError::from_model(Resource::Decision, e))?;

        self.store
            .insert_decision(&decision)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))?;

        info!(decision_id = %decision.id, action_type = %decision.action_type, "Decision recorded");
        Ok(decision)
    }

    #[instrument(skip(self))]
    pub async fn get_decision(&self, id: DecisionId) -> Result<Decision, ServiceError> {
        self.store
            .get_decision(id)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))?
            .ok_or_else(|| ServiceError::not_found(Resource::Decision, id))
    }

    #[instrument(skip(self))]
    pub async fn list_decisions(
        &self,
        filter: DecisionFilter,
        page: Page,
    ) -> Result<Vec<Decision>, ServiceError> {
        self.store
            .list_decisions(&filter, page)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))
    }

    #[instrument(skip(self))]
    pub async fn update_decision(
        &self,
        id: DecisionId,
        status: Status,
        force: bool,
    ) -> Result<Decision, ServiceError> {
        let (decision, transition) = self
            .store
            .update_decision_status(id, status, force)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))?;

        match transition {
            Transition::Forced { from, to } => {
                warn!(decision_id = %id, %from, %to, "Terminal decision status overwritten");
            }
            Transition::Applied { from, to } => {
                info!(decision_id = %id, %from, %to, "Decision status updated");
            }
            Transition::Unchanged => {
                debug!(decision_id = %id, status = %status, "Decision status unchanged");
            }
        }
        Ok(decision)
    }

    #[instrument(skip(self))]
    pub async fn delete_decision(&self, id: DecisionId) -> Result<(), ServiceError> {
        self.store
            .soft_delete_decision(id, truncate_timestamp(Utc::now()))
            .await
            .map_err(|e| ServiceError::from_db(Resource::Decision, e))?;

        info!(decision_id = %id, "Decision deleted");
        Ok(())
    }

    /// Check whether an action fulfilling the decision has been recorded.
    ///
    /// "No match" is a normal outcome, not an error.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, id: DecisionId) -> Result<ReconcileOutcome, ServiceError> {
        let decision = self.get_decision(id).await?;
        let actions = self
            .store
            .actions_for_keys(&[MatchKey::for_decision(&decision)])
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?;

        let correlation = correlate(&decision, &actions);
        let outcome = ReconcileOutcome {
            decision_id: id,
            matched: correlation.is_matched(),
            action: correlation.action().cloned(),
            candidates: correlation.candidates(),
        };

        info!(
            decision_id = %id,
            matched = outcome.matched,
            candidates = outcome.candidates,
            "Decision reconciled"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    #[instrument(skip(self, new), fields(action_type = %new.action_type))]
    pub async fn create_action(&self, new: NewAction) -> Result<Action, ServiceError> {
        let action = new
            .into_action(Utc::now())
            .map_err(|e| ServiceError::from_model(Resource::Action, e))?;

        self.store
            .insert_action(&action)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?;

        info!(action_id = %action.id, pod_parent_uid = %action.pod_parent_uid, "Action recorded");
        Ok(action)
    }

    #[instrument(skip(self))]
    pub async fn get_action(&self, id: ActionId) -> Result<Action, ServiceError> {
        self.store
            .get_action(id)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?
            .ok_or_else(|| ServiceError::not_found(Resource::Action, id))
    }

    #[instrument(skip(self))]
    pub async fn list_actions(
        &self,
        filter: ActionFilter,
        page: Page,
    ) -> Result<Vec<Action>, ServiceError> {
        self.store
            .list_actions(&filter, page)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))
    }

    #[instrument(skip(self, update), fields(force = update.force))]
    pub async fn update_action(
        &self,
        id: ActionId,
        update: ActionUpdate,
    ) -> Result<Action, ServiceError> {
        let action = self
            .store
            .update_action(id, update, Utc::now())
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?;

        info!(action_id = %id, status = %action.action_status, "Action updated");
        Ok(action)
    }

    #[instrument(skip(self))]
    pub async fn delete_action(&self, id: ActionId) -> Result<(), ServiceError> {
        let action = self
            .store
            .delete_action(id)
            .await
            .map_err(|e| ServiceError::from_db(Resource::Action, e))?;

        info!(action_id = %id, action_type = %action.action_type(), "Action deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use placement_model::ActionType;
    use placement_testing::{ActionBuilder, DecisionBuilder};
    use rstest::rstest;

    fn service() -> PlacementService {
        PlacementService::new(Arc::new(MemoryStore::new()))
    }

    #[rstest]
    #[case(None, None, Page { skip: 0, limit: 100 })]
    #[case(Some(5), Some(1), Page { skip: 5, limit: 1 })]
    #[case(Some(0), Some(1000), Page { skip: 0, limit: 1000 })]
    fn test_page_accepts(
        #[case] skip: Option<i64>,
        #[case] limit: Option<i64>,
        #[case] expected: Page,
    ) {
        assert_eq!(page(skip, limit).unwrap(), expected);
    }

    #[rstest]
    #[case(Some(-1), None)]
    #[case(None, Some(0))]
    #[case(None, Some(1001))]
    fn test_page_rejects(#[case] skip: Option<i64>, #[case] limit: Option<i64>) {
        assert!(matches!(
            page(skip, limit),
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_then_get_roundtrip() {
        let svc = service();
        let new = DecisionBuilder::new().new_decision();
        let created = svc.create_decision(new.clone()).await.unwrap();
        let fetched = svc.get_decision(created.id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.pod_name, new.pod_name);
        assert_eq!(fetched.pod_parent_id, new.pod_parent_id);
        assert_eq!(fetched.decision_status, Status::Pending);
    }

    #[tokio::test]
    async fn test_create_with_taken_id_conflicts() {
        let svc = service();
        let new = DecisionBuilder::new().new_decision_with_id();
        svc.create_decision(new.clone()).await.unwrap();
        let err = svc.create_decision(new).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict {
                reason: ConflictReason::AlreadyExists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_decision_is_validation() {
        let svc = service();
        let mut new = DecisionBuilder::new().new_decision();
        new.namespace.clear();
        let err = svc.create_decision(new).await.unwrap_err();
        match err {
            ServiceError::Validation { violations, .. } => {
                assert!(violations.iter().any(|v| v.field == "namespace"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn test_status_filter_excludes_terminal() {
        let svc = service();
        for status in Status::ALL {
            svc.create_decision(DecisionBuilder::new().status(status).new_decision())
                .await
                .unwrap();
        }

        let pending = svc
            .list_decisions(
                DecisionFilter {
                    decision_status: Some(Status::Pending),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending.iter().all(|d| d.decision_status == Status::Pending));
    }

    #[tokio::test]
    async fn test_terminal_update_conflicts_without_force() {
        let svc = service();
        let d = svc
            .create_decision(DecisionBuilder::new().new_decision())
            .await
            .unwrap();

        let done = svc.update_decision(d.id, Status::Succeeded, false).await.unwrap();
        assert_eq!(done.decision_status, Status::Succeeded);

        let again = svc.update_decision(d.id, Status::Succeeded, false).await.unwrap();
        assert_eq!(again.decision_status, Status::Succeeded);

        let err = svc
            .update_decision(d.id, Status::Failed, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict {
                reason: ConflictReason::InvalidTransition,
                ..
            }
        ));

        let forced = svc.update_decision(d.id, Status::Failed, true).await.unwrap();
        assert_eq!(forced.decision_status, Status::Failed);
    }

    #[tokio::test]
    async fn test_delete_hides_but_keeps() {
        let svc = service();
        let d = svc
            .create_decision(DecisionBuilder::new().new_decision())
            .await
            .unwrap();

        svc.delete_decision(d.id).await.unwrap();
        assert!(matches!(
            svc.get_decision(d.id).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            svc.delete_decision(d.id).await,
            Err(ServiceError::NotFound { .. })
        ));

        let visible = svc
            .list_decisions(DecisionFilter::default(), Page::default())
            .await
            .unwrap();
        assert!(visible.is_empty());

        let all = svc
            .list_decisions(
                DecisionFilter {
                    include_deleted: true,
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_bind() {
        let svc = service();
        let d = svc
            .create_decision(DecisionBuilder::new().new_decision_with_id())
            .await
            .unwrap();

        let before = svc.reconcile(d.id).await.unwrap();
        assert!(!before.matched);
        assert!(before.action.is_none());
        assert_eq!(before.candidates, 0);

        let a = svc
            .create_action(ActionBuilder::for_decision(&d).new_action())
            .await
            .unwrap();
        let after = svc.reconcile(d.id).await.unwrap();
        assert!(after.matched);
        assert_eq!(after.action, Some(a));
        assert_eq!(after.candidates, 1);
    }

    #[tokio::test]
    async fn test_reconcile_unknown_decision() {
        let svc = service();
        assert!(matches!(
            svc.reconcile(DecisionId::new()).await,
            Err(ServiceError::NotFound {
                resource: Resource::Decision,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_action_with_wrong_triple_is_validation() {
        let svc = service();
        let mut new = ActionBuilder::new(ActionType::Bind).new_action();
        new.columns.created_pod_name = Some("web-0".into());
        assert!(matches!(
            svc.create_action(new).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_action_lifecycle() {
        let svc = service();
        let a = svc
            .create_action(ActionBuilder::new(ActionType::Create).new_action())
            .await
            .unwrap();

        let done = svc
            .update_action(
                a.id,
                ActionUpdate {
                    action_status: Some(Status::Failed),
                    action_end_time: Some(a.action_start_time),
                    action_reason: Some("image pull backoff".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.action_status, Status::Failed);
        assert_eq!(done.action_reason, "image pull backoff");
        assert!(done.updated_at >= a.updated_at);

        let err = svc
            .update_action(
                a.id,
                ActionUpdate {
                    action_status: Some(Status::Succeeded),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_actions_by_type() {
        let svc = service();
        for t in [ActionType::Bind, ActionType::Bind, ActionType::Delete] {
            svc.create_action(ActionBuilder::new(t).new_action())
                .await
                .unwrap();
        }
        let binds = svc
            .list_actions(
                ActionFilter {
                    action_type: Some(ActionType::Bind),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(binds.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_action_is_permanent() {
        let svc = service();
        let a = svc
            .create_action(ActionBuilder::new(ActionType::Delete).new_action())
            .await
            .unwrap();

        svc.delete_action(a.id).await.unwrap();
        assert!(matches!(
            svc.get_action(a.id).await,
            Err(ServiceError::NotFound {
                resource: Resource::Action,
                ..
            })
        ));
        assert!(matches!(
            svc.delete_action(a.id).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_action_fills_pending_node() {
        let svc = service();
        let d = svc
            .create_decision(DecisionBuilder::new().new_decision())
            .await
            .unwrap();
        let a = svc
            .create_action(
                ActionBuilder::for_decision(&d)
                    .without_node()
                    .new_action(),
            )
            .await
            .unwrap();
        assert!(!svc.reconcile(d.id).await.unwrap().matched);

        svc.update_action(
            a.id,
            ActionUpdate {
                bound_node_name: Some(d.node_name.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(svc.reconcile(d.id).await.unwrap().matched);
    }
}
