//! Typed ID definitions for placement records.
//!
//! Decision and action ids are assigned by this service when the producer
//! does not supply one. Pod, node and parent ids come from Kubernetes object
//! uids and are only ever parsed.

use crate::define_id;

// =============================================================================
// Records
// =============================================================================

define_id!(DecisionId, "decision id");
define_id!(ActionId, "action id");

// =============================================================================
// Kubernetes objects
// =============================================================================

define_id!(PodId, "pod id");
define_id!(NodeId, "node id");

// UID of the controller owning a pod (Deployment, ReplicaSet, ...).
// Decisions call it `pod_parent_id`, actions call it `pod_parent_uid`.
define_id!(PodParentId, "pod parent id");

// =============================================================================
// Requests
// =============================================================================

define_id!(RequestId, "request id");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uuid;

    #[test]
    fn test_decision_id_roundtrip() {
        let id = DecisionId::new();
        let s = id.to_string();
        let parsed: DecisionId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_display_is_lowercase_hyphenated() {
        let id: PodParentId = "3F2C8A4E-9B1D-4C7A-8E2F-5D6B7A8C9E0F".parse().unwrap();
        assert_eq!(id.to_string(), "3f2c8a4e-9b1d-4c7a-8e2f-5d6b7a8c9e0f");
    }

    #[test]
    fn test_simple_form_accepted() {
        let id: NodeId = "3f2c8a4e9b1d4c7a8e2f5d6b7a8c9e0f".parse().unwrap();
        assert_eq!(id.to_string(), "3f2c8a4e-9b1d-4c7a-8e2f-5d6b7a8c9e0f");
    }

    #[test]
    fn test_empty() {
        let result: Result<ActionId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));

        let result: Result<ActionId, _> = "   ".parse();
        assert_eq!(result.unwrap_err(), crate::IdError::Empty);
    }

    #[test]
    fn test_invalid_uuid() {
        let result: Result<PodId, _> = "pod-1234".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidUuid { kind: "pod id", .. }
        ));
    }

    #[test]
    fn test_nil_rejected() {
        let result: Result<DecisionId, _> = Uuid::nil().to_string().parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::Nil { kind: "decision id" }
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let id = ActionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: ActionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_json_rejects_garbage() {
        let result: Result<DecisionId, _> = serde_json::from_str("\"not-a-uuid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_uuid_conversions() {
        let uuid = Uuid::new_v4();
        let id = PodParentId::from(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_display_roundtrip(bytes in any::<[u8; 16]>()) {
                let uuid = Uuid::from_bytes(bytes);
                prop_assume!(!uuid.is_nil());
                let id = DecisionId::from_uuid(uuid);
                let parsed = DecisionId::parse(&id.to_string()).unwrap();
                prop_assert_eq!(id, parsed);
            }
        }
    }
}
