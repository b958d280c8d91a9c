//! Cluster actions reported by executors.
//!
//! On the wire and in the database an action is one flat row with three
//! nullable pod triples (`created_*`, `deleted_*`, `bound_*`). In memory the
//! triples live in [`ActionTarget`], one variant per action type, carrying
//! only the triples that type uses.

use chrono::{DateTime, Duration, Utc};
use placement_id::{ActionId, PodParentId};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{truncate_timestamp, ActionType, ModelError, PodParentKind, Status, Transition};

// =============================================================================
// Pod triples
// =============================================================================

/// Pod name, namespace and node of one side of an action.
///
/// Namespace and node may still be unknown while the action is pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodTriple {
    pub pod_name: String,
    pub namespace: Option<String>,
    pub node_name: Option<String>,
}

impl PodTriple {
    pub fn new(
        pod_name: impl Into<String>,
        namespace: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            pod_name: pod_name.into(),
            namespace: Some(namespace.into()),
            node_name: Some(node_name.into()),
        }
    }
}

/// The flat nullable-column layout of an action's triples.
///
/// Populated names follow the same bounds as a decision's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TripleColumns {
    #[validate(length(min = 1, max = 253))]
    pub created_pod_name: Option<String>,
    #[validate(length(min = 1, max = 63))]
    pub created_pod_namespace: Option<String>,
    #[validate(length(min = 1, max = 253))]
    pub created_node_name: Option<String>,
    #[validate(length(min = 1, max = 253))]
    pub deleted_pod_name: Option<String>,
    #[validate(length(min = 1, max = 63))]
    pub deleted_pod_namespace: Option<String>,
    #[validate(length(min = 1, max = 253))]
    pub deleted_node_name: Option<String>,
    #[validate(length(min = 1, max = 253))]
    pub bound_pod_name: Option<String>,
    #[validate(length(min = 1, max = 63))]
    pub bound_pod_namespace: Option<String>,
    #[validate(length(min = 1, max = 253))]
    pub bound_node_name: Option<String>,
}

impl TripleColumns {
    /// Column names paired with their values, in table order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 9] {
        [
            ("created_pod_name", self.created_pod_name.as_deref()),
            ("created_pod_namespace", self.created_pod_namespace.as_deref()),
            ("created_node_name", self.created_node_name.as_deref()),
            ("deleted_pod_name", self.deleted_pod_name.as_deref()),
            ("deleted_pod_namespace", self.deleted_pod_namespace.as_deref()),
            ("deleted_node_name", self.deleted_node_name.as_deref()),
            ("bound_pod_name", self.bound_pod_name.as_deref()),
            ("bound_pod_namespace", self.bound_pod_namespace.as_deref()),
            ("bound_node_name", self.bound_node_name.as_deref()),
        ]
    }

    /// Columns set in `patch` replace ours; the rest are kept.
    pub fn overlay(self, patch: TripleColumns) -> TripleColumns {
        TripleColumns {
            created_pod_name: patch.created_pod_name.or(self.created_pod_name),
            created_pod_namespace: patch.created_pod_namespace.or(self.created_pod_namespace),
            created_node_name: patch.created_node_name.or(self.created_node_name),
            deleted_pod_name: patch.deleted_pod_name.or(self.deleted_pod_name),
            deleted_pod_namespace: patch.deleted_pod_namespace.or(self.deleted_pod_namespace),
            deleted_node_name: patch.deleted_node_name.or(self.deleted_node_name),
            bound_pod_name: patch.bound_pod_name.or(self.bound_pod_name),
            bound_pod_namespace: patch.bound_pod_namespace.or(self.bound_pod_namespace),
            bound_node_name: patch.bound_node_name.or(self.bound_node_name),
        }
    }
}

fn collect_triple(
    pod_name: Option<String>,
    namespace: Option<String>,
    node_name: Option<String>,
    pod_name_field: &'static str,
) -> Result<Option<PodTriple>, ModelError> {
    match (pod_name, namespace, node_name) {
        (None, None, None) => Ok(None),
        (Some(pod_name), namespace, node_name) => Ok(Some(PodTriple {
            pod_name,
            namespace,
            node_name,
        })),
        (None, _, _) => Err(ModelError::MissingField(pod_name_field)),
    }
}

fn split_triple(triple: Option<&PodTriple>) -> (Option<String>, Option<String>, Option<String>) {
    match triple {
        Some(t) => (
            Some(t.pod_name.clone()),
            t.namespace.clone(),
            t.node_name.clone(),
        ),
        None => (None, None, None),
    }
}

// =============================================================================
// Action target
// =============================================================================

/// The pods an action touched, shaped by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Bind { bound: PodTriple },
    Create { created: PodTriple },
    Delete { deleted: PodTriple },
    /// `created` is the destination; `source` is where the pod was before.
    Move {
        created: PodTriple,
        source: Option<PodTriple>,
    },
    /// First half of a swap: this pod's new placement and its old one.
    SwapX {
        created: PodTriple,
        source: Option<PodTriple>,
    },
    /// Second half of a swap.
    SwapY {
        created: PodTriple,
        source: Option<PodTriple>,
    },
}

impl ActionTarget {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Bind { .. } => ActionType::Bind,
            Self::Create { .. } => ActionType::Create,
            Self::Delete { .. } => ActionType::Delete,
            Self::Move { .. } => ActionType::Move,
            Self::SwapX { .. } => ActionType::SwapX,
            Self::SwapY { .. } => ActionType::SwapY,
        }
    }

    /// Build the target from flat columns.
    ///
    /// The triple the type requires must have a pod name. `move`, `swap_x`
    /// and `swap_y` may also carry a `deleted_*` source triple. Anything
    /// else populated is rejected.
    pub fn from_columns(action_type: ActionType, cols: TripleColumns) -> Result<Self, ModelError> {
        let created = collect_triple(
            cols.created_pod_name,
            cols.created_pod_namespace,
            cols.created_node_name,
            "created_pod_name",
        )?;
        let deleted = collect_triple(
            cols.deleted_pod_name,
            cols.deleted_pod_namespace,
            cols.deleted_node_name,
            "deleted_pod_name",
        )?;
        let bound = collect_triple(
            cols.bound_pod_name,
            cols.bound_pod_namespace,
            cols.bound_node_name,
            "bound_pod_name",
        )?;

        let forbid = |triple: &Option<PodTriple>, name: &'static str| {
            if triple.is_some() {
                Err(ModelError::UnexpectedTriple {
                    triple: name,
                    action_type,
                })
            } else {
                Ok(())
            }
        };

        match action_type {
            ActionType::Bind => {
                forbid(&created, "created")?;
                forbid(&deleted, "deleted")?;
                let bound = bound.ok_or(ModelError::MissingField("bound_pod_name"))?;
                Ok(Self::Bind { bound })
            }
            ActionType::Create => {
                forbid(&deleted, "deleted")?;
                forbid(&bound, "bound")?;
                let created = created.ok_or(ModelError::MissingField("created_pod_name"))?;
                Ok(Self::Create { created })
            }
            ActionType::Delete => {
                forbid(&created, "created")?;
                forbid(&bound, "bound")?;
                let deleted = deleted.ok_or(ModelError::MissingField("deleted_pod_name"))?;
                Ok(Self::Delete { deleted })
            }
            ActionType::Move | ActionType::SwapX | ActionType::SwapY => {
                forbid(&bound, "bound")?;
                let created = created.ok_or(ModelError::MissingField("created_pod_name"))?;
                let source = deleted;
                Ok(match action_type {
                    ActionType::Move => Self::Move { created, source },
                    ActionType::SwapX => Self::SwapX { created, source },
                    _ => Self::SwapY { created, source },
                })
            }
        }
    }

    /// Flatten back into columns.
    pub fn to_columns(&self) -> TripleColumns {
        let (created, deleted, bound) = match self {
            Self::Bind { bound } => (None, None, Some(bound)),
            Self::Create { created } => (Some(created), None, None),
            Self::Delete { deleted } => (None, Some(deleted), None),
            Self::Move { created, source }
            | Self::SwapX { created, source }
            | Self::SwapY { created, source } => (Some(created), source.as_ref(), None),
        };

        let (created_pod_name, created_pod_namespace, created_node_name) = split_triple(created);
        let (deleted_pod_name, deleted_pod_namespace, deleted_node_name) = split_triple(deleted);
        let (bound_pod_name, bound_pod_namespace, bound_node_name) = split_triple(bound);

        TripleColumns {
            created_pod_name,
            created_pod_namespace,
            created_node_name,
            deleted_pod_name,
            deleted_pod_namespace,
            deleted_node_name,
            bound_pod_name,
            bound_pod_namespace,
            bound_node_name,
        }
    }

    /// Returns true if any triple of this action places a pod on `node`.
    pub fn touches_node(&self, node: &str) -> bool {
        let on = |t: &PodTriple| t.node_name.as_deref() == Some(node);
        match self {
            Self::Bind { bound: t } | Self::Create { created: t } | Self::Delete { deleted: t } => {
                on(t)
            }
            Self::Move { created, source }
            | Self::SwapX { created, source }
            | Self::SwapY { created, source } => on(created) || source.as_ref().is_some_and(on),
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// An operation an executor performed against a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ActionWire", try_from = "ActionWire")]
pub struct Action {
    pub id: ActionId,
    pub target: ActionTarget,
    pub action_status: Status,
    pub action_start_time: DateTime<Utc>,
    pub action_end_time: Option<DateTime<Utc>>,
    pub action_reason: String,
    pub pod_parent_name: String,
    pub pod_parent_type: PodParentKind,
    pub pod_parent_uid: PodParentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        self.target.action_type()
    }

    /// Time the executor spent on the action, once it has ended.
    pub fn action_duration(&self) -> Option<Duration> {
        self.action_end_time.map(|end| end - self.action_start_time)
    }

    /// Apply an executor's update.
    ///
    /// Either every field of `update` is applied or none is. Triple columns
    /// are merged over the current ones and must still fit the action type.
    pub fn apply_update(
        &mut self,
        update: ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Transition, ModelError> {
        update.validate()?;

        let transition = match update.action_status {
            Some(to) => self.action_status.transition(to, update.force)?,
            None => Transition::Unchanged,
        };

        let end_time = update.action_end_time.map(truncate_timestamp);
        if let Some(end) = end_time {
            if end < self.action_start_time {
                let mut err = ValidationError::new("time_window");
                err.message = Some("action_end_time is before action_start_time".into());
                let mut errors = ValidationErrors::new();
                errors.add("action_end_time", err);
                return Err(ModelError::Invalid(errors));
            }
        }

        let columns = self.target.to_columns().overlay(update.columns());
        columns.validate()?;
        let target = ActionTarget::from_columns(self.action_type(), columns)?;

        self.target = target;
        if let Some(to) = update.action_status {
            self.action_status = to;
        }
        if end_time.is_some() {
            self.action_end_time = end_time;
        }
        if let Some(reason) = update.action_reason {
            self.action_reason = reason;
        }
        self.updated_at = truncate_timestamp(now);

        Ok(transition)
    }
}

/// Flat serialized form of [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionWire {
    pub id: ActionId,
    pub action_type: ActionType,
    pub action_status: Status,
    pub action_start_time: DateTime<Utc>,
    pub action_end_time: Option<DateTime<Utc>>,
    pub action_reason: String,
    pub pod_parent_name: String,
    pub pod_parent_type: PodParentKind,
    pub pod_parent_uid: PodParentId,
    #[serde(flatten)]
    pub columns: TripleColumns,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Action> for ActionWire {
    fn from(a: Action) -> Self {
        Self {
            id: a.id,
            action_type: a.action_type(),
            columns: a.target.to_columns(),
            action_status: a.action_status,
            action_start_time: a.action_start_time,
            action_end_time: a.action_end_time,
            action_reason: a.action_reason,
            pod_parent_name: a.pod_parent_name,
            pod_parent_type: a.pod_parent_type,
            pod_parent_uid: a.pod_parent_uid,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl TryFrom<ActionWire> for Action {
    type Error = ModelError;

    fn try_from(w: ActionWire) -> Result<Self, Self::Error> {
        Ok(Self {
            id: w.id,
            target: ActionTarget::from_columns(w.action_type, w.columns)?,
            action_status: w.action_status,
            action_start_time: w.action_start_time,
            action_end_time: w.action_end_time,
            action_reason: w.action_reason,
            pod_parent_name: w.pod_parent_name,
            pod_parent_type: w.pod_parent_type,
            pod_parent_uid: w.pod_parent_uid,
            created_at: w.created_at,
            updated_at: w.updated_at,
        })
    }
}

// =============================================================================
// Producer input
// =============================================================================

/// An action as submitted by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_action_window"))]
pub struct NewAction {
    #[serde(default)]
    pub id: Option<ActionId>,
    pub action_type: ActionType,
    #[serde(default)]
    pub action_status: Option<Status>,
    pub action_start_time: DateTime<Utc>,
    #[serde(default)]
    pub action_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub action_reason: String,
    #[validate(length(min = 1, max = 253))]
    pub pod_parent_name: String,
    pub pod_parent_type: PodParentKind,
    pub pod_parent_uid: PodParentId,
    #[serde(flatten)]
    pub columns: TripleColumns,
}

fn validate_action_window(a: &NewAction) -> Result<(), ValidationError> {
    if let Some(end) = a.action_end_time {
        if end < a.action_start_time {
            let mut err = ValidationError::new("time_window");
            err.message = Some("action_end_time is before action_start_time".into());
            return Err(err);
        }
    }
    Ok(())
}

impl NewAction {
    /// Validate and turn the submission into a record.
    ///
    /// Timestamps are truncated to microseconds.
    pub fn into_action(self, now: DateTime<Utc>) -> Result<Action, ModelError> {
        self.validate()?;
        self.columns.validate()?;
        let target = ActionTarget::from_columns(self.action_type, self.columns)?;
        let now = truncate_timestamp(now);

        Ok(Action {
            id: self.id.unwrap_or_default(),
            target,
            action_status: self.action_status.unwrap_or_default(),
            action_start_time: truncate_timestamp(self.action_start_time),
            action_end_time: self.action_end_time.map(truncate_timestamp),
            action_reason: self.action_reason,
            pod_parent_name: self.pod_parent_name,
            pod_parent_type: self.pod_parent_type,
            pod_parent_uid: self.pod_parent_uid,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Executor follow-up on an existing action.
///
/// Absent fields are left as they are. Triple columns fill in or replace
/// what the executor reported earlier, e.g. the node once the pod is bound.
/// Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ActionUpdate {
    pub action_status: Option<Status>,
    pub action_end_time: Option<DateTime<Utc>>,
    #[validate(length(max = 1024))]
    pub action_reason: Option<String>,
    pub created_pod_name: Option<String>,
    pub created_pod_namespace: Option<String>,
    pub created_node_name: Option<String>,
    pub deleted_pod_name: Option<String>,
    pub deleted_pod_namespace: Option<String>,
    pub deleted_node_name: Option<String>,
    pub bound_pod_name: Option<String>,
    pub bound_pod_namespace: Option<String>,
    pub bound_node_name: Option<String>,
    /// Allow leaving a terminal status.
    pub force: bool,
}

impl ActionUpdate {
    /// The triple columns this update sets.
    pub fn columns(&self) -> TripleColumns {
        TripleColumns {
            created_pod_name: self.created_pod_name.clone(),
            created_pod_namespace: self.created_pod_namespace.clone(),
            created_node_name: self.created_node_name.clone(),
            deleted_pod_name: self.deleted_pod_name.clone(),
            deleted_pod_namespace: self.deleted_pod_namespace.clone(),
            deleted_node_name: self.deleted_node_name.clone(),
            bound_pod_name: self.bound_pod_name.clone(),
            bound_pod_namespace: self.bound_pod_namespace.clone(),
            bound_node_name: self.bound_node_name.clone(),
        }
    }
}
