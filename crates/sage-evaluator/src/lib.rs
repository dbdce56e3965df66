//! SAGE Evaluator - the action decision function
//!
//! `evaluate(user, entity, situation)` produces one [`ActionDecision`] per
//! catalog action for the entity's card type. Evaluation is pure: it reads only
//! the registry and its arguments, so identical inputs always produce identical
//! decisions and any number of evaluations may run concurrently.
//!
//! Per action, in order:
//! 1. bracket not reachable in the situation → `state_guard`
//! 2. role or department authority refuses → `permission` / `forbidden`
//! 3. status filter or entity condition fails → `missing_trigger` / `threshold`
//! 4. otherwise allowed, scored and tiered
//!
//! Missing authority data or a missing situation yields no decisions at all.

#![deny(unsafe_code)]

mod conditions;
mod scoring;

pub use scoring::{Product, ScoringKind, ScoringPolicy, WeightedMinimum};

use sage_authority::AuthorityResolver;
use sage_registry::ActionRegistry;
use sage_types::{
    ActionDecision, ActionDefinition, ActionId, BlockReason, BlockedBy, ConfidenceBreakdown,
    EntitySnapshot, SideEffect, Situation, SituationState, Tier, UserContext,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default relative margin under which a satisfied numeric condition counts as
/// narrowly satisfied.
pub const DEFAULT_NARROW_MARGIN: f64 = 0.1;

/// Decision evaluator bound to one registry and scoring policy.
#[derive(Clone, Debug)]
pub struct DecisionEvaluator {
    registry: Arc<ActionRegistry>,
    resolver: AuthorityResolver,
    scoring: Arc<dyn ScoringPolicy>,
    narrow_margin: f64,
}

enum Verdict {
    Allowed {
        reasons: Vec<String>,
        narrow: bool,
        constrained: bool,
    },
    Blocked(BlockedBy),
}

impl DecisionEvaluator {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            resolver: AuthorityResolver::new(),
            scoring: ScoringKind::default().policy(),
            narrow_margin: DEFAULT_NARROW_MARGIN,
        }
    }

    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringPolicy>) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_narrow_margin(mut self, narrow_margin: f64) -> Self {
        self.narrow_margin = narrow_margin.max(0.0);
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &AuthorityResolver {
        &self.resolver
    }

    pub fn scoring(&self) -> &dyn ScoringPolicy {
        self.scoring.as_ref()
    }

    /// Evaluate every action offered on the entity's card type.
    ///
    /// Decisions come back in catalog order.
    pub fn evaluate(
        &self,
        user: &UserContext,
        entity: &EntitySnapshot,
        situation: Option<&Situation>,
    ) -> Vec<ActionDecision> {
        let situation = match situation {
            Some(s) if user.is_complete() && s.entity_type == entity.entity_type => s,
            _ => {
                debug!(entity = %entity.key(), "Authority or situation unavailable; no decisions");
                return Vec::new();
            }
        };

        let definitions = self.registry.by_card_type(entity.entity_type);
        let verdicts: Vec<_> = definitions
            .iter()
            .map(|d| (*d, self.verdict(user, entity, situation, d)))
            .collect();

        let primary = verdicts
            .iter()
            .filter(|(d, v)| {
                matches!(v, Verdict::Allowed { .. }) && d.side_effect == SideEffect::MutationHeavy
            })
            .fold(None::<&ActionDefinition>, |best, (d, _)| match best {
                Some(b) if b.priority >= d.priority => Some(b),
                _ => Some(*d),
            })
            .map(|d| d.id);

        verdicts
            .into_iter()
            .map(|(definition, verdict)| {
                self.decision(definition, entity, situation, user, verdict, primary)
            })
            .collect()
    }

    /// Re-derive the decision for one action, exactly as [`evaluate`] would.
    ///
    /// Returns `None` when evaluation fails closed or the action is not offered
    /// on this card type.
    ///
    /// [`evaluate`]: DecisionEvaluator::evaluate
    pub fn evaluate_action(
        &self,
        user: &UserContext,
        entity: &EntitySnapshot,
        situation: Option<&Situation>,
        action: ActionId,
    ) -> Option<ActionDecision> {
        self.evaluate(user, entity, situation)
            .into_iter()
            .find(|d| d.action == action)
    }

    fn verdict(
        &self,
        user: &UserContext,
        entity: &EntitySnapshot,
        situation: &Situation,
        definition: &ActionDefinition,
    ) -> Verdict {
        let mut reasons = Vec::new();

        if !situation.allows(definition.bracket) {
            return blocked(
                BlockReason::StateGuard,
                format!("bracket_not_reachable:{}", situation.state),
            );
        }
        if definition.bracket.is_mutation() && entity.is_terminal() {
            return blocked(BlockReason::StateGuard, "entity_resolved".to_string());
        }
        reasons.push(format!(
            "{} reachable in {}",
            definition.bracket, situation.state
        ));

        match self
            .resolver
            .admit(user, definition, entity.department)
        {
            Ok(grant) => reasons.push(format!("authority: {}", grant_label(grant))),
            Err(e) => return blocked(e.block_reason(), e.reason_code().to_string()),
        }

        let trigger = &definition.trigger;
        if !trigger.statuses.is_empty() {
            match entity.status.as_deref() {
                Some(status) if trigger.statuses.iter().any(|s| s == status) => {
                    reasons.push(format!("status '{}' matches trigger", status));
                }
                status => {
                    return blocked(
                        BlockReason::MissingTrigger,
                        format!(
                            "status '{}' not in [{}]",
                            status.unwrap_or("none"),
                            trigger.statuses.join(", ")
                        ),
                    );
                }
            }
        }

        let mut narrow = false;
        for condition in &trigger.conditions {
            let outcome = conditions::check(condition, entity);
            if !outcome.satisfied {
                let kind = if condition.op.is_numeric() {
                    BlockReason::Threshold
                } else {
                    BlockReason::MissingTrigger
                };
                return blocked(kind, outcome.description);
            }
            if outcome.margin.is_some_and(|m| m <= self.narrow_margin) {
                narrow = true;
                reasons.push(format!("narrowly satisfied: {}", outcome.description));
            } else {
                reasons.push(format!("satisfied: {}", outcome.description));
            }
        }

        Verdict::Allowed {
            reasons,
            narrow,
            constrained: !trigger.statuses.is_empty() || !trigger.conditions.is_empty(),
        }
    }

    fn decision(
        &self,
        definition: &ActionDefinition,
        entity: &EntitySnapshot,
        situation: &Situation,
        user: &UserContext,
        verdict: Verdict,
        primary: Option<ActionId>,
    ) -> ActionDecision {
        let base = ActionDecision {
            action: definition.id,
            entity_type: entity.entity_type,
            entity_id: entity.entity_id.clone(),
            allowed: false,
            tier: Tier::Rare,
            confidence: 0.0,
            breakdown: ConfidenceBreakdown::zero(),
            reasons: Vec::new(),
            blocked_by: None,
            signature_required: definition.signature_required(),
            auto_run: false,
        };

        match verdict {
            Verdict::Blocked(blocked_by) => ActionDecision {
                reasons: vec![blocked_by.detail.clone()],
                blocked_by: Some(blocked_by),
                ..base
            },
            Verdict::Allowed {
                mut reasons,
                narrow,
                constrained,
            } => {
                let intent = intent_score(definition, user);
                if intent >= 1.0 {
                    reasons.push("matches detected intent".to_string());
                }
                let breakdown = ConfidenceBreakdown {
                    intent,
                    entity: entity_score(narrow, constrained),
                    situation: situation_score(situation.state),
                };
                let tier = if primary == Some(definition.id) {
                    Tier::Primary
                } else if narrow {
                    Tier::Conditional
                } else {
                    Tier::Rare
                };
                ActionDecision {
                    allowed: true,
                    tier,
                    confidence: scoring::round_score(self.scoring.combine(&breakdown)),
                    breakdown,
                    reasons,
                    auto_run: definition.trigger.auto_run,
                    ..base
                }
            }
        }
    }
}

fn blocked(kind: BlockReason, detail: String) -> Verdict {
    Verdict::Blocked(BlockedBy { kind, detail })
}

fn grant_label(grant: sage_authority::AuthorityGrant) -> &'static str {
    match grant {
        sage_authority::AuthorityGrant::ReadOnly => "read_only",
        sage_authority::AuthorityGrant::OwnDepartment => "own_department",
        sage_authority::AuthorityGrant::CrossDepartment => "cross_department",
    }
}

fn intent_score(definition: &ActionDefinition, user: &UserContext) -> f64 {
    if user.detected_intents.is_empty() {
        return 0.5;
    }
    let matched = user.detected_intents.iter().any(|intent| {
        let intent = intent.trim();
        intent.eq_ignore_ascii_case(definition.id.as_str())
            || intent.eq_ignore_ascii_case(definition.cluster.as_str())
    });
    if matched {
        1.0
    } else {
        0.2
    }
}

fn entity_score(narrow: bool, constrained: bool) -> f64 {
    match (narrow, constrained) {
        (true, _) => 0.6,
        (false, true) => 1.0,
        (false, false) => 0.7,
    }
}

fn situation_score(state: SituationState) -> f64 {
    match state {
        SituationState::Active => 1.0,
        SituationState::Candidate => 0.7,
        SituationState::Cooldown => 0.5,
        SituationState::Idle => 0.3,
        SituationState::Resolved => 0.2,
    }
}

/// Decisions filtered for display plus their counts.
///
/// Counts always cover every evaluated action. Blocked decisions are only
/// returned when asked for, and then only those whose reason is actionable by
/// the user; permission and state-guard blocks stay hidden.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSummary {
    pub decisions: Vec<ActionDecision>,
    pub allowed_count: usize,
    pub blocked_count: usize,
}

impl DecisionSummary {
    pub fn from_decisions(decisions: Vec<ActionDecision>, include_blocked: bool) -> Self {
        let allowed_count = decisions.iter().filter(|d| d.allowed).count();
        let blocked_count = decisions.len() - allowed_count;
        let decisions = decisions
            .into_iter()
            .filter(|d| {
                d.allowed
                    || (include_blocked
                        && d.blocked_by.as_ref().is_some_and(|b| b.kind.is_disclosed()))
            })
            .collect();
        Self {
            decisions,
            allowed_count,
            blocked_count,
        }
    }

    pub fn extend(&mut self, other: DecisionSummary) {
        self.decisions.extend(other.decisions);
        self.allowed_count += other.allowed_count;
        self.blocked_count += other.blocked_count;
    }
}
