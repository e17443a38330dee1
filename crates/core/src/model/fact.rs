use serde::{Deserialize, Serialize};

use crate::model::ids::{ModuleId, UserId};

/// Inbound event asserting a leaf-level state change.
///
/// Facts are produced by external collaborators (video playback, quiz
/// grading, flashcard review, manual marking). The collaborator decides
/// *what* counts as started/completed; the engine only aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressFact {
    ModuleStarted { user_id: UserId, module_id: ModuleId },
    ModuleCompleted { user_id: UserId, module_id: ModuleId },
}

impl ProgressFact {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::ModuleStarted { user_id, .. } | Self::ModuleCompleted { user_id, .. } => *user_id,
        }
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        match self {
            Self::ModuleStarted { module_id, .. } | Self::ModuleCompleted { module_id, .. } => {
                *module_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_serializes_with_kind_tag() {
        let fact = ProgressFact::ModuleCompleted {
            user_id: UserId::generate(),
            module_id: ModuleId::new(9),
        };
        let json = serde_json::to_string(&fact).unwrap();
        assert!(json.contains("\"kind\":\"module_completed\""));

        let back: ProgressFact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fact);
    }
}
