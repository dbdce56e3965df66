use crate::action::Bracket;
use crate::entity::{EntityId, EntityKey, EntityType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one tracked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SituationState {
    Idle,
    Candidate,
    Active,
    Cooldown,
    Resolved,
}

impl SituationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SituationState::Idle => "IDLE",
            SituationState::Candidate => "CANDIDATE",
            SituationState::Active => "ACTIVE",
            SituationState::Cooldown => "COOLDOWN",
            SituationState::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for SituationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event that moves a situation between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationTrigger {
    EntityOpened,
    EntityClosed,
    EditBegan,
    EditPaused,
    Resolved,
}

impl SituationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SituationTrigger::EntityOpened => "entity_opened",
            SituationTrigger::EntityClosed => "entity_closed",
            SituationTrigger::EditBegan => "edit_began",
            SituationTrigger::EditPaused => "edit_paused",
            SituationTrigger::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for SituationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationTransition {
    pub from: SituationState,
    pub to: SituationState,
    pub trigger: SituationTrigger,
    pub at: DateTime<Utc>,
}

/// The situation of one entity, independent of any user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Situation {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub state: SituationState,
    /// Brackets reachable in `state`, in canonical bracket order.
    pub allowed_brackets: Vec<Bracket>,
    #[serde(default)]
    pub transitions: Vec<SituationTransition>,
    pub created_at: DateTime<Utc>,
}

impl Situation {
    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
        }
    }

    pub fn allows(&self, bracket: Bracket) -> bool {
        self.allowed_brackets.contains(&bracket)
    }

    pub fn is_resolved(&self) -> bool {
        self.state == SituationState::Resolved
    }

    /// Timestamp of the most recent transition, or creation if none.
    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.transitions
            .last()
            .map(|t| t.at)
            .unwrap_or(self.created_at)
    }
}
