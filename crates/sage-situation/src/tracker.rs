//! Live situation instances, one per tracked entity.

use crate::machine::SituationMachine;
use crate::SituationError;
use sage_types::{EntityKey, Situation, SituationState, SituationTransition, SituationTrigger};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// Holds one [`Situation`] per `(entity_type, entity_id)`.
///
/// Situations are created lazily in IDLE on first access. Retention and
/// archival of resolved situations belong to the storage layer.
#[derive(Debug, Default)]
pub struct SituationTracker {
    situations: RwLock<HashMap<EntityKey, Situation>>,
}

impl SituationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current situation for `key`, creating it in IDLE if unseen.
    pub fn get(&self, key: &EntityKey) -> Result<Situation, SituationError> {
        if let Some(situation) = self
            .situations
            .read()
            .map_err(|_| SituationError::LockError)?
            .get(key)
        {
            return Ok(situation.clone());
        }

        let mut situations = self
            .situations
            .write()
            .map_err(|_| SituationError::LockError)?;
        let situation = match situations.get(key) {
            Some(existing) => existing.clone(),
            None => {
                let fresh = SituationMachine::situation_for(key, SituationState::Idle)?;
                debug!(entity = %key, "Situation created");
                situations.insert(key.clone(), fresh.clone());
                fresh
            }
        };
        Ok(situation)
    }

    /// Current situation for `key` without creating one.
    pub fn peek(&self, key: &EntityKey) -> Result<Option<Situation>, SituationError> {
        Ok(self
            .situations
            .read()
            .map_err(|_| SituationError::LockError)?
            .get(key)
            .cloned())
    }

    /// Fire `trigger` against the situation for `key`.
    pub fn apply(
        &self,
        key: &EntityKey,
        trigger: SituationTrigger,
    ) -> Result<Situation, SituationError> {
        let mut situations = self
            .situations
            .write()
            .map_err(|_| SituationError::LockError)?;

        if !situations.contains_key(key) {
            let fresh = SituationMachine::situation_for(key, SituationState::Idle)?;
            situations.insert(key.clone(), fresh);
        }
        let situation = situations
            .get_mut(key)
            .ok_or_else(|| SituationError::NotFound(key.to_string()))?;

        let from = situation.state;
        let to = SituationMachine::next(key.entity_type, from, trigger)?;

        situation.state = to;
        situation.allowed_brackets = SituationMachine::allowed_brackets(key.entity_type, to).to_vec();
        situation.transitions.push(SituationTransition {
            from,
            to,
            trigger,
            at: chrono::Utc::now(),
        });

        info!(
            entity = %key,
            from = %from,
            to = %to,
            trigger = %trigger,
            "Situation transitioned"
        );

        Ok(situation.clone())
    }

    /// Place `key` directly in `state`, replacing any history.
    ///
    /// Used when restoring situations from storage or seeding fixtures.
    pub fn restore(
        &self,
        key: &EntityKey,
        state: SituationState,
    ) -> Result<Situation, SituationError> {
        let situation = SituationMachine::situation_for(key, state)?;
        self.situations
            .write()
            .map_err(|_| SituationError::LockError)?
            .insert(key.clone(), situation.clone());
        Ok(situation)
    }

    pub fn len(&self) -> usize {
        self.situations.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_types::{Bracket, EntityType};

    #[test]
    fn situations_are_created_lazily_in_idle() {
        let tracker = SituationTracker::new();
        let key = EntityKey::new(EntityType::WorkOrder, "WO-1");

        assert!(tracker.peek(&key).unwrap().is_none());
        let situation = tracker.get(&key).unwrap();
        assert_eq!(situation.state, SituationState::Idle);
        assert_eq!(situation.allowed_brackets, vec![Bracket::Read]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn apply_records_transition_history() {
        let tracker = SituationTracker::new();
        let key = EntityKey::new(EntityType::Fault, "F-1");

        tracker.apply(&key, SituationTrigger::EntityOpened).unwrap();
        let situation = tracker.apply(&key, SituationTrigger::EditBegan).unwrap();

        assert_eq!(situation.state, SituationState::Active);
        assert_eq!(situation.transitions.len(), 2);
        assert_eq!(situation.transitions[1].from, SituationState::Candidate);
        assert!(situation.allows(Bracket::WriteState));
    }

    #[test]
    fn invalid_trigger_leaves_state_untouched() {
        let tracker = SituationTracker::new();
        let key = EntityKey::new(EntityType::Equipment, "EQ-1");

        let err = tracker.apply(&key, SituationTrigger::Resolved).unwrap_err();
        assert!(matches!(err, SituationError::InvalidTransition { .. }));
        assert_eq!(tracker.get(&key).unwrap().state, SituationState::Idle);
    }

    #[test]
    fn restore_places_entity_in_state() {
        let tracker = SituationTracker::new();
        let key = EntityKey::new(EntityType::ComplianceLog, "CL-1");

        tracker.restore(&key, SituationState::Active).unwrap();
        let resolved = tracker.apply(&key, SituationTrigger::Resolved).unwrap();
        assert!(resolved.is_resolved());

        assert!(tracker.restore(&key, SituationState::Cooldown).is_err());
    }
}
