//! Static lifecycle tables, one per lifecycle kind.

use crate::SituationError;
use sage_types::{
    Bracket, EntityKey, EntityType, LifecycleKind, Situation, SituationState, SituationTrigger,
};

use Bracket::*;
use SituationState::*;

const MUTABLE_STATES: &[SituationState] = &[Idle, Candidate, Active, Cooldown, Resolved];
const LEDGER_STATES: &[SituationState] = &[Idle, Candidate, Active, Resolved];
const READ_ONLY_STATES: &[SituationState] = &[Idle, Candidate];

const READ_ONLY: &[Bracket] = &[Read];
const NOTES: &[Bracket] = &[Read, WriteNote];
const EVERYTHING: &[Bracket] = &[Read, WriteNote, WriteState, WriteComms, WriteFinancial];
const WINDING_DOWN: &[Bracket] = &[Read, WriteNote, WriteComms];
const LEDGER_ACTIVE: &[Bracket] = &[Read, WriteNote, WriteState];

/// Lifecycle rules for every entity type.
///
/// Stateless: all answers come from the tables above, keyed by the entity
/// type's [`LifecycleKind`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SituationMachine;

impl SituationMachine {
    /// States an entity of this type can ever occupy.
    pub fn states(entity_type: EntityType) -> &'static [SituationState] {
        match entity_type.lifecycle() {
            LifecycleKind::Mutable => MUTABLE_STATES,
            LifecycleKind::RecordLedger => LEDGER_STATES,
            LifecycleKind::ReadOnly => READ_ONLY_STATES,
        }
    }

    pub fn is_reachable(entity_type: EntityType, state: SituationState) -> bool {
        Self::states(entity_type).contains(&state)
    }

    /// Brackets reachable in `state`. Empty for a state the type never occupies.
    pub fn allowed_brackets(entity_type: EntityType, state: SituationState) -> &'static [Bracket] {
        if !Self::is_reachable(entity_type, state) {
            return &[];
        }
        match (entity_type.lifecycle(), state) {
            (LifecycleKind::ReadOnly, _) => READ_ONLY,
            (_, Idle) | (_, Resolved) => READ_ONLY,
            (_, Candidate) => NOTES,
            (LifecycleKind::RecordLedger, Active) => LEDGER_ACTIVE,
            (LifecycleKind::Mutable, Active) => EVERYTHING,
            (_, Cooldown) => WINDING_DOWN,
        }
    }

    /// Target state for `trigger` fired in `from`.
    pub fn next(
        entity_type: EntityType,
        from: SituationState,
        trigger: SituationTrigger,
    ) -> Result<SituationState, SituationError> {
        let lifecycle = entity_type.lifecycle();
        let to = match (trigger, from) {
            (SituationTrigger::EntityOpened, Idle) => Some(Candidate),
            (SituationTrigger::EntityClosed, Candidate) => Some(Idle),
            (SituationTrigger::EditBegan, Candidate) => Some(Active),
            (SituationTrigger::EditBegan, Cooldown) => Some(Active),
            (SituationTrigger::EditPaused, Active) => Some(Cooldown),
            (SituationTrigger::Resolved, Active) => Some(Resolved),
            (SituationTrigger::Resolved, Cooldown) => Some(Resolved),
            _ => None,
        };

        match to {
            Some(to)
                if Self::is_reachable(entity_type, from) && Self::is_reachable(entity_type, to) =>
            {
                Ok(to)
            }
            _ => Err(SituationError::InvalidTransition {
                entity_type,
                lifecycle,
                from,
                trigger,
            }),
        }
    }

    /// Fresh situation for `key` sitting in `state`, with no transition history.
    pub fn situation_for(
        key: &EntityKey,
        state: SituationState,
    ) -> Result<Situation, SituationError> {
        if !Self::is_reachable(key.entity_type, state) {
            return Err(SituationError::UnreachableState {
                entity_type: key.entity_type,
                state,
            });
        }
        Ok(Self::from_hint(key, state))
    }

    /// Situation as reported by a caller. An unreachable state is kept, with
    /// no brackets allowed, so evaluation blocks every action on it.
    pub fn from_hint(key: &EntityKey, state: SituationState) -> Situation {
        Situation {
            entity_type: key.entity_type,
            entity_id: key.entity_id.clone(),
            state,
            allowed_brackets: Self::allowed_brackets(key.entity_type, state).to_vec(),
            transitions: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_types_stay_in_idle_or_candidate() {
        for entity_type in [EntityType::Document, EntityType::SearchQuery] {
            assert_eq!(
                SituationMachine::next(entity_type, Idle, SituationTrigger::EntityOpened).unwrap(),
                Candidate
            );
            assert!(
                SituationMachine::next(entity_type, Candidate, SituationTrigger::EditBegan)
                    .is_err()
            );
            assert_eq!(SituationMachine::allowed_brackets(entity_type, Candidate), &[Read]);
            assert!(SituationMachine::allowed_brackets(entity_type, Active).is_empty());
        }
    }

    #[test]
    fn record_ledger_has_no_cooldown() {
        let ledger = EntityType::ComplianceLog;
        assert!(SituationMachine::next(ledger, Active, SituationTrigger::EditPaused).is_err());
        assert_eq!(
            SituationMachine::next(ledger, Active, SituationTrigger::Resolved).unwrap(),
            Resolved
        );
        assert!(!SituationMachine::allowed_brackets(ledger, Active).contains(&WriteFinancial));
        assert!(SituationMachine::allowed_brackets(ledger, Active).contains(&WriteState));
    }

    #[test]
    fn mutable_lifecycle_walks_the_canonical_path() {
        let wo = EntityType::WorkOrder;
        let mut state = Idle;
        for trigger in [
            SituationTrigger::EntityOpened,
            SituationTrigger::EditBegan,
            SituationTrigger::EditPaused,
            SituationTrigger::EditBegan,
            SituationTrigger::Resolved,
        ] {
            state = SituationMachine::next(wo, state, trigger).unwrap();
        }
        assert_eq!(state, Resolved);
    }

    #[test]
    fn resolved_is_final() {
        for trigger in [
            SituationTrigger::EntityOpened,
            SituationTrigger::EntityClosed,
            SituationTrigger::EditBegan,
            SituationTrigger::EditPaused,
            SituationTrigger::Resolved,
        ] {
            assert!(SituationMachine::next(EntityType::Fault, Resolved, trigger).is_err());
        }
    }

    #[test]
    fn only_active_reaches_financial_writes() {
        for state in MUTABLE_STATES {
            let brackets = SituationMachine::allowed_brackets(EntityType::PurchaseOrder, *state);
            assert_eq!(brackets.contains(&WriteFinancial), *state == Active);
            assert!(brackets.contains(&Read));
        }
    }

    #[test]
    fn situation_for_rejects_unreachable_state() {
        let key = EntityKey::new(EntityType::Document, "DOC-1");
        assert!(matches!(
            SituationMachine::situation_for(&key, Cooldown),
            Err(SituationError::UnreachableState { .. })
        ));
        let situation = SituationMachine::situation_for(&key, Candidate).unwrap();
        assert_eq!(situation.allowed_brackets, vec![Read]);
    }

    #[test]
    fn hinted_unreachable_state_allows_nothing() {
        let key = EntityKey::new(EntityType::Document, "DOC-1");
        let situation = SituationMachine::from_hint(&key, Active);
        assert_eq!(situation.state, Active);
        assert!(situation.allowed_brackets.is_empty());
    }
}
