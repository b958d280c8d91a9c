//! In-process store.
//!
//! Holds everything in two maps behind `tokio` read-write locks. Each
//! mutation keeps the write lock for its whole read-check-write, which gives
//! the same single-row atomicity as the Postgres transactions.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use placement_correlation::MatchKey;
use placement_id::{ActionId, DecisionId};
use placement_model::{Action, ActionUpdate, Decision, Status, Transition};
use tokio::sync::RwLock;

use super::{
    ActionFilter, ActionStore, DbError, DecisionFilter, DecisionStore, Page, Resource, Store,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    decisions: RwLock<HashMap<DecisionId, Decision>>,
    actions: RwLock<HashMap<ActionId, Action>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(resource: Resource, id: impl ToString) -> DbError {
    DbError::NotFound {
        resource,
        id: id.to_string(),
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn insert_decision(&self, decision: &Decision) -> Result<(), DbError> {
        let mut decisions = self.decisions.write().await;
        if decisions.contains_key(&decision.id) {
            return Err(DbError::Duplicate {
                resource: Resource::Decision,
                id: decision.id.to_string(),
            });
        }
        decisions.insert(decision.id, decision.clone());
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, DbError> {
        let decisions = self.decisions.read().await;
        Ok(decisions.get(&id).filter(|d| !d.is_deleted()).cloned())
    }

    async fn list_decisions(
        &self,
        filter: &DecisionFilter,
        page: Page,
    ) -> Result<Vec<Decision>, DbError> {
        let decisions = self.decisions.read().await;
        let mut matched: Vec<&Decision> = decisions.values().filter(|d| filter.matches(d)).collect();
        matched.sort_by_key(|d| (Reverse(d.created_at), d.id));
        Ok(page.window(matched.into_iter().cloned()))
    }

    async fn update_decision_status(
        &self,
        id: DecisionId,
        to: Status,
        force: bool,
    ) -> Result<(Decision, Transition), DbError> {
        let mut decisions = self.decisions.write().await;
        let decision = decisions
            .get_mut(&id)
            .filter(|d| !d.is_deleted())
            .ok_or_else(|| not_found(Resource::Decision, id))?;

        let transition = decision.set_status(to, force)?;
        Ok((decision.clone(), transition))
    }

    async fn soft_delete_decision(
        &self,
        id: DecisionId,
        at: DateTime<Utc>,
    ) -> Result<Decision, DbError> {
        let mut decisions = self.decisions.write().await;
        let decision = decisions
            .get_mut(&id)
            .filter(|d| !d.is_deleted())
            .ok_or_else(|| not_found(Resource::Decision, id))?;

        decision.deleted_at = Some(at);
        Ok(decision.clone())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn insert_action(&self, action: &Action) -> Result<(), DbError> {
        let mut actions = self.actions.write().await;
        if actions.contains_key(&action.id) {
            return Err(DbError::Duplicate {
                resource: Resource::Action,
                id: action.id.to_string(),
            });
        }
        actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn get_action(&self, id: ActionId) -> Result<Option<Action>, DbError> {
        Ok(self.actions.read().await.get(&id).cloned())
    }

    async fn list_actions(
        &self,
        filter: &ActionFilter,
        page: Page,
    ) -> Result<Vec<Action>, DbError> {
        let actions = self.actions.read().await;
        let mut matched: Vec<&Action> = actions.values().filter(|a| filter.matches(a)).collect();
        matched.sort_by_key(|a| (Reverse(a.action_start_time), a.id));
        Ok(page.window(matched.into_iter().cloned()))
    }

    async fn actions_for_keys(&self, keys: &[MatchKey]) -> Result<Vec<Action>, DbError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|a| keys.contains(&MatchKey::for_action(a)))
            .cloned()
            .collect())
    }

    async fn update_action(
        &self,
        id: ActionId,
        update: ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Action, DbError> {
        let mut actions = self.actions.write().await;
        let action = actions
            .get_mut(&id)
            .ok_or_else(|| not_found(Resource::Action, id))?;

        action.apply_update(update, now)?;
        Ok(action.clone())
    }

    async fn delete_action(&self, id: ActionId) -> Result<Action, DbError> {
        self.actions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| not_found(Resource::Action, id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }
}
