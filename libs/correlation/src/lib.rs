//! Decision/action correlation.
//!
//! A decision records where the scheduler wanted a pod; an action records
//! what an executor actually did. The engine answers one question: has this
//! decision been fulfilled?
//!
//! # Matching
//!
//! - **Key**: `decision.pod_parent_id == action.pod_parent_uid` and the same
//!   `action_type`.
//! - **Triple**: the action's selected `(pod_name, namespace, node_name)`
//!   must equal the decision's. An unknown (null) field never matches.
//!
//! # Invariants
//!
//! - Everything here is pure: no I/O, no clock, no mutation
//! - The result does not depend on the order candidates are given in

use std::cmp::{Ordering, Reverse};

use placement_id::PodParentId;
use placement_model::{Action, ActionTarget, ActionType, Decision, PodTriple};
use serde::Serialize;

/// The triple of `target` a decision is compared against.
///
/// `bind` uses the bound pod, `delete` the deleted pod, and every other type
/// the created pod. For `move` that is the destination.
pub fn selected_triple(target: &ActionTarget) -> &PodTriple {
    match target {
        ActionTarget::Bind { bound } => bound,
        ActionTarget::Delete { deleted } => deleted,
        ActionTarget::Create { created }
        | ActionTarget::Move { created, .. }
        | ActionTarget::SwapX { created, .. }
        | ActionTarget::SwapY { created, .. } => created,
    }
}

/// Lookup key shared by a decision and the actions that may fulfil it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MatchKey {
    pub pod_parent: PodParentId,
    pub action_type: ActionType,
}

impl MatchKey {
    pub fn for_decision(decision: &Decision) -> Self {
        Self {
            pod_parent: decision.pod_parent_id,
            action_type: decision.action_type,
        }
    }

    pub fn for_action(action: &Action) -> Self {
        Self {
            pod_parent: action.pod_parent_uid,
            action_type: action.action_type(),
        }
    }
}

/// Field-by-field comparison of the decision's placement with `triple`.
pub fn triple_matches(decision: &Decision, triple: &PodTriple) -> bool {
    triple.pod_name == decision.pod_name
        && triple.namespace.as_deref() == Some(decision.namespace.as_str())
        && triple.node_name.as_deref() == Some(decision.node_name.as_str())
}

/// Returns true if `action` shares the decision's key and placement.
pub fn is_fulfilled_by(decision: &Decision, action: &Action) -> bool {
    MatchKey::for_decision(decision) == MatchKey::for_action(action)
        && triple_matches(decision, selected_triple(&action.target))
}

/// Outcome of correlating one decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correlation<'a> {
    /// The latest action that fulfils the decision.
    Matched {
        action: &'a Action,
        candidates: usize,
    },
    /// Actions share the key but none has the decision's placement.
    Mismatched { candidates: usize },
    /// No action shares the key yet.
    NoCandidates,
}

impl<'a> Correlation<'a> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn action(&self) -> Option<&'a Action> {
        match self {
            Self::Matched { action, .. } => Some(*action),
            _ => None,
        }
    }

    /// Number of actions that shared the decision's key.
    pub fn candidates(&self) -> usize {
        match self {
            Self::Matched { candidates, .. } | Self::Mismatched { candidates } => *candidates,
            Self::NoCandidates => 0,
        }
    }
}

/// Correlate `decision` with `actions`.
///
/// Actions with a different key are ignored, so callers may pass a wider
/// set than the key lookup would return. When several actions match, the
/// one with the latest `action_start_time` wins, then the latest
/// `created_at`, then the smallest id.
pub fn correlate<'a, I>(decision: &Decision, actions: I) -> Correlation<'a>
where
    I: IntoIterator<Item = &'a Action>,
{
    let key = MatchKey::for_decision(decision);
    let mut candidates = 0;
    let mut best: Option<&'a Action> = None;

    for action in actions {
        if MatchKey::for_action(action) != key {
            continue;
        }
        candidates += 1;

        if !triple_matches(decision, selected_triple(&action.target)) {
            continue;
        }
        best = match best {
            Some(current) if !supersedes(action, current) => Some(current),
            _ => Some(action),
        };
    }

    match (best, candidates) {
        (Some(action), _) => Correlation::Matched { action, candidates },
        (None, 0) => Correlation::NoCandidates,
        (None, candidates) => Correlation::Mismatched { candidates },
    }
}

/// Every action in `actions` that fulfils `decision`, latest first.
///
/// The first element, if any, is the action [`correlate`] picks.
pub fn matching_actions<'a, I>(decision: &Decision, actions: I) -> Vec<&'a Action>
where
    I: IntoIterator<Item = &'a Action>,
{
    let mut matched: Vec<&'a Action> = actions
        .into_iter()
        .filter(|action| is_fulfilled_by(decision, action))
        .collect();
    matched.sort_by(|a, b| by_recency(b, a));
    matched
}

fn by_recency(a: &Action, b: &Action) -> Ordering {
    (a.action_start_time, a.created_at, Reverse(a.id))
        .cmp(&(b.action_start_time, b.created_at, Reverse(b.id)))
}

fn supersedes(a: &Action, b: &Action) -> bool {
    by_recency(a, b) == Ordering::Greater
}
