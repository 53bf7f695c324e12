//! Combat engine
//!
//! Orchestrates action dispatch over a [`CombatSession`]: attack and spell
//! resolution, AP spending with overdraw strain, and the turn/round state
//! machine. Game-rule failures (bad targets, misses, failed saves) are
//! typed outcomes; only caller bugs (unknown actor, malformed dice) raise.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actions::{ActionCost, ActionKind};
use crate::combatant::CombatantId;
use crate::dice::{D20Roll, DiceError, DiceExpr, DiceRoller};
use crate::effects::{EffectKind, StatusEffect};
use crate::session::{CombatAction, CombatSession, SessionStatus, Victor};
use crate::EngineConfig;

/// Caller errors. Game-rule outcomes never surface here.
#[derive(Debug, Error)]
pub enum CombatError {
    #[error("unknown actor '{id}' (known combatants: {})", known.join(", "))]
    UnknownActor { id: String, known: Vec<String> },

    #[error(transparent)]
    Dice(#[from] DiceError),
}

/// Target validation failures. Raised by the validation primitive, caught
/// by every handler and converted into [`ActionOutcome::InvalidTarget`].
#[derive(Debug, Error)]
enum TargetError {
    #[error("action '{action}' requires a target")]
    Missing { action: String },

    #[error("no combatant '{id}' in this fight (available: {})", available.join(", "))]
    NotFound { id: String, available: Vec<String> },

    #[error("{name} is unconscious and cannot be targeted by this action")]
    Unconscious { name: String },

    #[error("{name} is already down")]
    Defeated { name: String },
}

/// Result of one resolved attack
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub attacker: CombatantId,
    pub target: CombatantId,
    pub roll: D20Roll,
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
    pub damage: i32,
    pub target_hp: i32,
    pub knocked_unconscious: bool,
    pub description: String,
}

/// Per-target result of a spell
#[derive(Debug, Clone, PartialEq)]
pub struct SpellTargetOutcome {
    pub target: CombatantId,
    pub save: Option<D20Roll>,
    pub saved: bool,
    pub damage: i32,
    pub effect_applied: Option<String>,
    pub knocked_unconscious: bool,
}

/// Aggregated spell result
#[derive(Debug, Clone, PartialEq)]
pub struct SpellOutcome {
    pub caster: CombatantId,
    pub targets: Vec<SpellTargetOutcome>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefendOutcome {
    pub ac_bonus: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub moved: bool,
    pub distance: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoverOutcome {
    pub roll: Option<D20Roll>,
    pub success: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealOutcome {
    pub target: CombatantId,
    pub healed: i32,
    pub target_hp: i32,
    pub description: String,
}

/// A status effect granted to a target (help, grapple, shove, dodge, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct EffectOutcome {
    pub target: CombatantId,
    pub effect: String,
    pub applied: bool,
    pub roll: Option<D20Roll>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleOutcome {
    pub roll: Option<D20Roll>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidTarget {
    pub reason: String,
}

/// Closed set of typed action results. Handlers return exactly one of
/// these; none of them is an error at the `process_action` boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Attack(AttackOutcome),
    Spell(SpellOutcome),
    Defend(DefendOutcome),
    Move(MoveOutcome),
    Recover(RecoverOutcome),
    Heal(HealOutcome),
    Effect(EffectOutcome),
    Simple(SimpleOutcome),
    InvalidTarget(InvalidTarget),
}

impl ActionOutcome {
    /// Whether the action achieved its intent
    pub fn success(&self) -> bool {
        match self {
            ActionOutcome::Attack(a) => a.hit,
            ActionOutcome::Spell(s) => s.targets.iter().any(|t| !t.saved || t.damage > 0),
            ActionOutcome::Defend(_) => true,
            ActionOutcome::Move(m) => m.moved,
            ActionOutcome::Recover(r) => r.success,
            ActionOutcome::Heal(h) => h.healed > 0,
            ActionOutcome::Effect(e) => e.applied,
            ActionOutcome::Simple(_) => true,
            ActionOutcome::InvalidTarget(_) => false,
        }
    }

    /// Total damage dealt by the action
    pub fn damage(&self) -> i32 {
        match self {
            ActionOutcome::Attack(a) => a.damage,
            ActionOutcome::Spell(s) => s.targets.iter().map(|t| t.damage).sum(),
            _ => 0,
        }
    }

    /// Primary roll total, when the action rolled anything
    pub fn roll_result(&self) -> Option<i32> {
        match self {
            ActionOutcome::Attack(a) => Some(a.roll.total),
            ActionOutcome::Spell(s) => s.targets.iter().find_map(|t| t.save.map(|r| r.total)),
            ActionOutcome::Recover(r) => r.roll.map(|r| r.total),
            ActionOutcome::Effect(e) => e.roll.map(|r| r.total),
            ActionOutcome::Simple(s) => s.roll.map(|r| r.total),
            _ => None,
        }
    }

    /// Names of status effects the action applied
    pub fn effects_applied(&self) -> Vec<String> {
        match self {
            ActionOutcome::Spell(s) => s
                .targets
                .iter()
                .filter_map(|t| t.effect_applied.clone())
                .collect(),
            ActionOutcome::Defend(_) => vec!["defending".to_string()],
            ActionOutcome::Effect(e) if e.applied => vec![e.effect.clone()],
            _ => Vec::new(),
        }
    }

    /// Human-readable summary for the log and the narration layer
    pub fn description(&self) -> &str {
        match self {
            ActionOutcome::Attack(a) => &a.description,
            ActionOutcome::Spell(s) => &s.description,
            ActionOutcome::Defend(d) => &d.description,
            ActionOutcome::Move(m) => &m.description,
            ActionOutcome::Recover(r) => &r.description,
            ActionOutcome::Heal(h) => &h.description,
            ActionOutcome::Effect(e) => &e.description,
            ActionOutcome::Simple(s) => &s.description,
            ActionOutcome::InvalidTarget(i) => &i.reason,
        }
    }
}

/// Optional per-call overrides, the loosely-typed tail of an upstream
/// action request
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    pub weapon_damage: Option<String>,
    pub spell_damage: Option<String>,
    pub save_dc: Option<i32>,
    /// Effect a spell inflicts on a failed save (kind, duration in rounds)
    pub effect: Option<(EffectKind, u32)>,
    pub heal_dice: Option<String>,
    /// Additional spell targets beyond the primary one
    pub extra_targets: Vec<CombatantId>,
}

/// A processed action: the typed outcome plus where its log entry landed
#[derive(Debug, Clone)]
pub struct ProcessedAction {
    pub outcome: ActionOutcome,
    pub log_index: usize,
    pub turn_should_end: bool,
    /// Set when this action ended the whole fight
    pub victor: Option<Victor>,
}

/// Result of advancing past the current turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnTransition {
    pub next_actor: CombatantId,
    /// True when selection wrapped around and the round counter advanced
    pub new_round: bool,
    pub round_number: u32,
    pub skipped: Vec<CombatantId>,
}

/// The combat mechanics engine. Holds the dice roller and tunables;
/// all encounter state lives in the [`CombatSession`] passed to each call.
#[derive(Debug)]
pub struct CombatEngine {
    dice: DiceRoller,
    config: EngineConfig,
}

impl CombatEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { dice: DiceRoller::new(), config }
    }

    /// Engine with a seeded roller; the whole encounter replays
    /// deterministically
    pub fn seeded(config: EngineConfig, seed: u64) -> Self {
        Self { dice: DiceRoller::seeded(seed), config }
    }

    // ---- turn order ----

    /// Roll initiative for everyone and fix the turn order, highest first.
    /// Ties break on a random jitter from the engine's roller.
    pub fn calculate_initiative_order(&mut self, session: &mut CombatSession) {
        let mut rolled: Vec<(CombatantId, i32, u32)> = Vec::with_capacity(session.combatants.len());
        let mut ids: Vec<CombatantId> = session.combatants.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        for id in ids {
            let bonus = session
                .combatant(&id)
                .map(|c| c.stats.initiative_bonus)
                .unwrap_or(0);
            let roll = self.dice.roll_initiative(0, bonus);
            if let Some(c) = session.combatant_mut(&id) {
                c.initiative = roll.total;
            }
            let jitter = self.dice.tiebreak(1000);
            debug!(combatant = %id, initiative = roll.total, "initiative rolled");
            rolled.push((id, roll.total, jitter));
        }

        rolled.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        session.turn_order = rolled.into_iter().map(|(id, _, _)| id).collect();
        session.current_turn_index = 0;
        info!(order = ?session.turn_order, "initiative order set");
    }

    /// True iff the actor's AP is exhausted or overdrawn
    pub fn should_end_turn(&self, session: &CombatSession, actor_id: &CombatantId) -> bool {
        session
            .combatant(actor_id)
            .map(|c| c.action_points.is_exhausted())
            .unwrap_or(false)
    }

    /// Advance to the next eligible combatant in initiative order,
    /// skipping the unconscious and incapacitated (a combatant attempting
    /// Recover is not skipped). Wrapping past the end of the order starts
    /// a new round: effect durations tick down and AP refills.
    ///
    /// Returns `None` when nobody can act (the fight is effectively over).
    pub fn resolve_turn_transition(&mut self, session: &mut CombatSession) -> Option<TurnTransition> {
        let len = session.turn_order.len();
        if len == 0 {
            return None;
        }
        let current = session.current_turn_index;
        let mut skipped = Vec::new();

        for step in 1..=len {
            let idx = (current + step) % len;
            let id = session.turn_order[idx].clone();
            let eligible = session.combatant(&id).is_some_and(|c| c.can_take_turn());
            if !eligible {
                skipped.push(id);
                continue;
            }

            let new_round = idx <= current;
            if new_round {
                self.advance_round(session);
            }
            session.current_turn_index = idx;
            debug!(
                next = %id,
                round = session.round_number,
                new_round,
                "turn transition"
            );
            return Some(TurnTransition {
                next_actor: id,
                new_round,
                round_number: session.round_number,
                skipped,
            });
        }

        warn!("no eligible combatant remains in turn order");
        None
    }

    /// Round boundary bookkeeping: bump the counter, tick effect
    /// durations, refill every combatant's AP.
    fn advance_round(&mut self, session: &mut CombatSession) {
        session.round_number += 1;
        let order = session.turn_order.clone();
        for id in &order {
            if let Some(c) = session.combatant_mut(id) {
                c.tick_effects_round();
                c.action_points.reset();
            }
        }
        info!(round = session.round_number, "new round");
    }

    /// Delegate to the session's victory condition; flips it to Completed
    pub fn check_combat_end(&self, session: &mut CombatSession) -> Option<Victor> {
        session.complete_if_decided()
    }

    // ---- action dispatch ----

    /// Resolve one action for `actor_id`. Unknown actors raise; every
    /// game-rule failure comes back as a typed outcome and a log entry.
    pub fn process_action(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        action_type: &str,
        target_id: Option<&CombatantId>,
        params: ActionParams,
    ) -> Result<ProcessedAction, CombatError> {
        if !session.combatants.contains_key(actor_id) {
            return Err(CombatError::UnknownActor {
                id: actor_id.as_str().to_string(),
                known: session.known_ids(),
            });
        }
        if session.status == SessionStatus::PreCombat {
            session.status = SessionStatus::Active;
        }

        let cost = ActionCost::lookup(action_type);

        // end_turn bypasses the AP economy entirely
        if cost.kind == Some(ActionKind::EndTurn) {
            let actor_name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
            let entry = self.log_entry(
                session,
                actor_id,
                &cost,
                None,
                None,
                0,
                true,
                format!("{} ends their turn", actor_name),
                Vec::new(),
                true,
            );
            let log_index = session.combat_log.len();
            session.log_action(entry);
            return Ok(ProcessedAction {
                outcome: ActionOutcome::Simple(SimpleOutcome {
                    roll: None,
                    description: format!("{} ends their turn", actor_name),
                }),
                log_index,
                turn_should_end: true,
                victor: None,
            });
        }

        // Spend first; overdraw is permitted and penalized, never refused
        let strain_note = self.spend_ap(session, actor_id, cost.ap_cost)?;

        let outcome = self.dispatch(session, actor_id, &cost, target_id, &params)?;

        let mut description = outcome.description().to_string();
        if let Some(note) = &strain_note {
            description.push_str("; ");
            description.push_str(note);
        }

        let turn_should_end = self.should_end_turn(session, actor_id);
        let entry = self.log_entry(
            session,
            actor_id,
            &cost,
            target_id,
            outcome.roll_result(),
            outcome.damage(),
            outcome.success(),
            description,
            outcome.effects_applied(),
            turn_should_end,
        );
        let log_index = session.combat_log.len();
        session.log_action(entry);

        let victor = self.check_combat_end(session);
        Ok(ProcessedAction { outcome, log_index, turn_should_end, victor })
    }

    #[allow(clippy::too_many_arguments)]
    fn log_entry(
        &self,
        session: &CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
        roll_result: Option<i32>,
        damage_dealt: i32,
        success: bool,
        description: String,
        effects_applied: Vec<String>,
        turn_should_end: bool,
    ) -> CombatAction {
        CombatAction {
            timestamp: chrono::Utc::now().to_rfc3339(),
            round_number: session.round_number,
            actor_id: actor_id.clone(),
            action_type: cost.name.clone(),
            target_id: target_id.cloned(),
            ap_cost: cost.ap_cost,
            roll_result,
            damage_dealt,
            success,
            description,
            effects_applied,
            turn_should_end,
        }
    }

    /// Spend AP unconditionally; roll strain damage against any deficit.
    /// Returns a note describing the strain, for the action description.
    fn spend_ap(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        ap_cost: i32,
    ) -> Result<Option<String>, CombatError> {
        let Some(actor) = session.combatant_mut(actor_id) else {
            return Ok(None);
        };
        actor.action_points.spend(ap_cost);
        let deficit = actor.action_points.deficit();
        if deficit == 0 {
            return Ok(None);
        }

        let (expr, severity) = overdraw_strain(deficit);
        let roll = self.dice.roll_expr(&expr);
        let actor = session
            .combatant_mut(actor_id)
            .expect("actor verified above");
        let applied = actor.take_damage(roll.total);
        warn!(
            actor = %actor_id,
            deficit,
            strain = roll.total,
            hp = applied.remaining_hp,
            "action point overdraw"
        );
        let mut note = format!(
            "suffers {} strain from overexertion ({} for {} damage)",
            severity, expr, roll.total
        );
        if applied.knocked_unconscious {
            note.push_str(" and collapses from exhaustion");
        }
        Ok(Some(note))
    }

    fn dispatch(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
        params: &ActionParams,
    ) -> Result<ActionOutcome, CombatError> {
        let Some(kind) = cost.kind else {
            // Unrecognized action names resolve as a generic effort
            let name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
            return Ok(ActionOutcome::Simple(SimpleOutcome {
                roll: None,
                description: format!("{} improvises: {}", name, cost.name),
            }));
        };

        let outcome = match kind {
            ActionKind::BasicAttack => self.handle_attack(session, actor_id, cost, target_id, params, 1)?,
            ActionKind::FullAttack => self.handle_attack(session, actor_id, cost, target_id, params, 2)?,
            ActionKind::SimpleSpell => {
                self.handle_spell(session, actor_id, cost, target_id, params, false)?
            }
            ActionKind::ComplexSpell => {
                self.handle_spell(session, actor_id, cost, target_id, params, true)?
            }
            ActionKind::Defend => self.handle_defend(session, actor_id, cost),
            ActionKind::Move => self.handle_move(session, actor_id, false),
            ActionKind::Dash => self.handle_move(session, actor_id, true),
            ActionKind::Dodge
            | ActionKind::Disengage
            | ActionKind::Hide
            | ActionKind::ReadyAction => self.handle_self_effect(session, actor_id, cost),
            ActionKind::Search => self.handle_search(session, actor_id),
            ActionKind::Help => self.handle_help(session, actor_id, cost, target_id),
            ActionKind::Grapple | ActionKind::Shove => {
                self.handle_contested(session, actor_id, cost, target_id)
            }
            ActionKind::Recover => self.handle_recover(session, actor_id),
            ActionKind::Heal => self.handle_heal(session, actor_id, cost, target_id, params)?,
            ActionKind::SpecialAbility => {
                if target_id.is_some() {
                    self.handle_attack(session, actor_id, cost, target_id, params, 1)?
                } else {
                    let name =
                        session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
                    ActionOutcome::Simple(SimpleOutcome {
                        roll: None,
                        description: format!("{} unleashes a special ability", name),
                    })
                }
            }
            ActionKind::BonusAction => {
                let name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
                ActionOutcome::Simple(SimpleOutcome {
                    roll: None,
                    description: format!("{} takes a swift bonus action", name),
                })
            }
            ActionKind::EndTurn => unreachable!("end_turn is special-cased before dispatch"),
        };
        Ok(outcome)
    }

    // ---- target validation primitive ----

    /// Shared target check: the target must exist, be conscious, and have
    /// HP left, unless the action explicitly allows unconscious targets.
    fn validate_target(
        session: &CombatSession,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
    ) -> Result<CombatantId, TargetError> {
        let Some(target_id) = target_id else {
            return Err(TargetError::Missing { action: cost.name.clone() });
        };
        let Some(target) = session.combatant(target_id) else {
            return Err(TargetError::NotFound {
                id: target_id.as_str().to_string(),
                available: session.known_ids(),
            });
        };
        if !cost.allows_unconscious_target {
            if !target.is_conscious {
                return Err(TargetError::Unconscious { name: target.name.clone() });
            }
            if target.hp <= 0 {
                return Err(TargetError::Defeated { name: target.name.clone() });
            }
        }
        Ok(target_id.clone())
    }

    // ---- handlers ----

    fn unknown_actor(session: &CombatSession, id: &CombatantId) -> CombatError {
        CombatError::UnknownActor {
            id: id.as_str().to_string(),
            known: session.known_ids(),
        }
    }

    /// Roll one attack against a live target, honoring advantage state
    /// and effective AC, and apply the damage. Unknown combatant ids
    /// raise [`CombatError::UnknownActor`].
    pub fn resolve_attack(
        &mut self,
        session: &mut CombatSession,
        attacker_id: &CombatantId,
        target_id: &CombatantId,
        weapon_damage: &str,
    ) -> Result<AttackOutcome, CombatError> {
        let (attacker_name, attack_bonus, damage_bonus, advantage) = {
            let attacker = session
                .combatant(attacker_id)
                .ok_or_else(|| Self::unknown_actor(session, attacker_id))?;
            let m = attacker.modifiers();
            (
                attacker.name.clone(),
                attacker.stats.attack_bonus,
                attacker.stats.damage_bonus,
                m.advantage,
            )
        };
        let (target_name, target_ac, t_adv, t_dis) = {
            let target = session
                .combatant(target_id)
                .ok_or_else(|| Self::unknown_actor(session, target_id))?;
            let m = target.modifiers();
            (
                target.name.clone(),
                target.effective_ac(),
                m.attackers_advantage,
                m.attackers_disadvantage,
            )
        };

        let advantage = advantage || t_adv;
        let roll = self.roll_with_advantage(attack_bonus, advantage, t_dis);

        // Helped/Hidden are spent on the attack that used them
        if let Some(attacker) = session.combatant_mut(attacker_id) {
            attacker.remove_effect(&EffectKind::Helped);
            attacker.remove_effect(&EffectKind::Hidden);
        }

        if roll.critical_fail {
            return Ok(AttackOutcome {
                attacker: attacker_id.clone(),
                target: target_id.clone(),
                roll,
                target_ac,
                hit: false,
                critical: false,
                damage: 0,
                target_hp: session.combatant(target_id).map(|t| t.hp).unwrap_or(0),
                knocked_unconscious: false,
                description: format!(
                    "{} fumbles the attack on {} (natural 1)",
                    attacker_name, target_name
                ),
            });
        }

        let hit = roll.critical || roll.total >= target_ac;
        if !hit {
            return Ok(AttackOutcome {
                attacker: attacker_id.clone(),
                target: target_id.clone(),
                roll,
                target_ac,
                hit: false,
                critical: false,
                damage: 0,
                target_hp: session.combatant(target_id).map(|t| t.hp).unwrap_or(0),
                knocked_unconscious: false,
                description: format!(
                    "{} misses {} ({} vs AC {})",
                    attacker_name, target_name, roll.total, target_ac
                ),
            });
        }

        let dice = self.dice.roll(weapon_damage)?;
        // Criticals double the rolled dice, not the flat bonus
        let base = if roll.critical { dice.total * 2 } else { dice.total };
        // Minimum-damage rule: a landed hit always deals at least 1
        let damage = (base + damage_bonus).max(1);

        let applied = session
            .combatant_mut(target_id)
            .map(|target| target.take_damage(damage))
            .ok_or_else(|| Self::unknown_actor(session, target_id))?;

        let mut description = if roll.critical {
            format!(
                "{} critically hits {} for {} damage",
                attacker_name, target_name, applied.damage
            )
        } else {
            format!(
                "{} hits {} ({} vs AC {}) for {} damage",
                attacker_name, target_name, roll.total, target_ac, applied.damage
            )
        };
        if applied.knocked_unconscious {
            description.push_str(&format!(", knocking {} unconscious", target_name));
        }

        Ok(AttackOutcome {
            attacker: attacker_id.clone(),
            target: target_id.clone(),
            roll,
            target_ac,
            hit: true,
            critical: roll.critical,
            damage: applied.damage,
            target_hp: applied.remaining_hp,
            knocked_unconscious: applied.knocked_unconscious,
            description,
        })
    }

    fn roll_with_advantage(&mut self, bonus: i32, advantage: bool, disadvantage: bool) -> D20Roll {
        let first = self.dice.roll_attack(bonus);
        if advantage == disadvantage {
            return first;
        }
        let second = self.dice.roll_attack(bonus);
        if advantage {
            if second.natural > first.natural { second } else { first }
        } else if second.natural < first.natural {
            second
        } else {
            first
        }
    }

    fn handle_attack(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
        params: &ActionParams,
        swings: u32,
    ) -> Result<ActionOutcome, CombatError> {
        let target = match Self::validate_target(session, cost, target_id) {
            Ok(t) => t,
            Err(e) => return Ok(ActionOutcome::InvalidTarget(InvalidTarget { reason: e.to_string() })),
        };
        let weapon = params
            .weapon_damage
            .as_deref()
            .or(cost.damage_dice)
            .unwrap_or(&self.config.default_weapon_damage)
            .to_string();

        let mut outcome = self.resolve_attack(session, actor_id, &target, &weapon)?;
        for _ in 1..swings {
            // Stop swinging at a target that just went down
            if session.combatant(&target).is_none_or(|t| t.is_defeated()) {
                break;
            }
            let extra = self.resolve_attack(session, actor_id, &target, &weapon)?;
            outcome.hit |= extra.hit;
            outcome.critical |= extra.critical;
            outcome.damage += extra.damage;
            outcome.target_hp = extra.target_hp;
            outcome.knocked_unconscious |= extra.knocked_unconscious;
            outcome.description.push_str("; ");
            outcome.description.push_str(&extra.description);
        }
        Ok(ActionOutcome::Attack(outcome))
    }

    /// Resolve a spell against each target independently: saving throw
    /// versus the DC, damage and/or effect only on a failed save.
    /// An unknown caster id raises [`CombatError::UnknownActor`]; unknown
    /// target ids are skipped.
    pub fn resolve_spell(
        &mut self,
        session: &mut CombatSession,
        caster_id: &CombatantId,
        targets: &[CombatantId],
        spell_damage: Option<&str>,
        save_dc: Option<i32>,
        effect: Option<(EffectKind, u32)>,
    ) -> Result<SpellOutcome, CombatError> {
        let (caster_name, default_dc) = {
            let caster = session
                .combatant(caster_id)
                .ok_or_else(|| Self::unknown_actor(session, caster_id))?;
            (caster.name.clone(), caster.stats.spell_save_dc)
        };
        let dc = save_dc.unwrap_or(default_dc);

        let mut results = Vec::with_capacity(targets.len());
        let mut parts = Vec::with_capacity(targets.len());

        for target_id in targets {
            let target_name = match session.combatant(target_id) {
                Some(t) => t.name.clone(),
                None => continue,
            };

            let (save, saved) = if spell_damage.is_some() || effect.is_some() {
                let roll = self.dice.roll_saving_throw(0);
                (Some(roll), roll.total >= dc)
            } else {
                (None, true)
            };

            let mut damage = 0;
            let mut knocked_unconscious = false;
            let mut effect_applied = None;

            if !saved {
                if let Some(dice) = spell_damage {
                    let rolled = self.dice.roll(dice)?;
                    if let Some(target) = session.combatant_mut(target_id) {
                        let applied = target.take_damage(rolled.total.max(1));
                        damage = applied.damage;
                        knocked_unconscious = applied.knocked_unconscious;
                    }
                }
                if let Some((kind, duration)) = effect {
                    if let Some(target) = session.combatant_mut(target_id) {
                        target.add_effect(
                            StatusEffect::new(kind, duration).with_source(caster_id.clone()),
                        );
                        effect_applied = Some(kind.name().to_string());
                    }
                }
                let mut part = format!("{} fails the save (DC {})", target_name, dc);
                if damage > 0 {
                    part.push_str(&format!(", taking {} damage", damage));
                }
                if let Some(e) = &effect_applied {
                    part.push_str(&format!(" and is {}", e));
                }
                if knocked_unconscious {
                    part.push_str(", falling unconscious");
                }
                parts.push(part);
            } else {
                parts.push(format!("{} resists the spell", target_name));
            }

            results.push(SpellTargetOutcome {
                target: target_id.clone(),
                save,
                saved,
                damage,
                effect_applied,
                knocked_unconscious,
            });
        }

        Ok(SpellOutcome {
            caster: caster_id.clone(),
            targets: results,
            description: format!("{} casts a spell: {}", caster_name, parts.join("; ")),
        })
    }

    fn handle_spell(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
        params: &ActionParams,
        complex: bool,
    ) -> Result<ActionOutcome, CombatError> {
        let mut targets = Vec::new();
        match Self::validate_target(session, cost, target_id) {
            Ok(t) => targets.push(t),
            Err(e) => {
                return Ok(ActionOutcome::InvalidTarget(InvalidTarget { reason: e.to_string() }))
            }
        }
        for extra in &params.extra_targets {
            if Self::validate_target(session, cost, Some(extra)).is_ok() {
                targets.push(extra.clone());
            }
        }

        let damage = params
            .spell_damage
            .as_deref()
            .or(cost.damage_dice)
            .map(|d| d.to_string());
        let save_dc = params.save_dc.or(cost.save_dc);
        // Complex spells may also inflict a rider effect
        let effect = if complex { params.effect } else { None };

        let outcome = self.resolve_spell(
            session,
            actor_id,
            &targets,
            damage.as_deref(),
            save_dc,
            effect,
        )?;
        Ok(ActionOutcome::Spell(outcome))
    }

    fn handle_defend(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
    ) -> ActionOutcome {
        let (kind, duration) = cost
            .grants_effect
            .unwrap_or((EffectKind::Defending { ac_bonus: 2 }, 1));
        let ac_bonus = match kind {
            EffectKind::Defending { ac_bonus } => ac_bonus,
            _ => 0,
        };
        let name = if let Some(actor) = session.combatant_mut(actor_id) {
            actor.add_effect(StatusEffect::new(kind, duration).with_source(actor_id.clone()));
            actor.name.clone()
        } else {
            String::new()
        };
        ActionOutcome::Defend(DefendOutcome {
            ac_bonus,
            description: format!("{} takes a defensive stance (+{} AC)", name, ac_bonus),
        })
    }

    fn handle_move(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        dash: bool,
    ) -> ActionOutcome {
        let Some(actor) = session.combatant(actor_id) else {
            return ActionOutcome::Move(MoveOutcome {
                moved: false,
                distance: 0,
                description: String::new(),
            });
        };
        let m = actor.modifiers();
        if m.speed_zero {
            return ActionOutcome::Move(MoveOutcome {
                moved: false,
                distance: 0,
                description: format!("{} is held fast and cannot move", actor.name),
            });
        }
        let distance = if dash { actor.stats.speed * 2 } else { actor.stats.speed };
        let verb = if dash { "dashes" } else { "moves" };
        ActionOutcome::Move(MoveOutcome {
            moved: true,
            distance,
            description: format!("{} {} up to {} feet", actor.name, verb, distance),
        })
    }

    fn handle_self_effect(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
    ) -> ActionOutcome {
        let Some((kind, duration)) = cost.grants_effect else {
            return ActionOutcome::Simple(SimpleOutcome { roll: None, description: cost.name.clone() });
        };
        let name = if let Some(actor) = session.combatant_mut(actor_id) {
            actor.add_effect(StatusEffect::new(kind, duration).with_source(actor_id.clone()));
            actor.name.clone()
        } else {
            String::new()
        };
        ActionOutcome::Effect(EffectOutcome {
            target: actor_id.clone(),
            effect: kind.name().to_string(),
            applied: true,
            roll: None,
            description: format!("{} is now {}", name, kind.name()),
        })
    }

    fn handle_search(&mut self, session: &mut CombatSession, actor_id: &CombatantId) -> ActionOutcome {
        let roll = self.dice.roll_saving_throw(0);
        let name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
        ActionOutcome::Simple(SimpleOutcome {
            roll: Some(roll),
            description: format!("{} searches the area (rolled {})", name, roll.total),
        })
    }

    fn handle_help(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
    ) -> ActionOutcome {
        let target = match Self::validate_target(session, cost, target_id) {
            Ok(t) => t,
            Err(e) => return ActionOutcome::InvalidTarget(InvalidTarget { reason: e.to_string() }),
        };
        let (kind, duration) = cost.grants_effect.unwrap_or((EffectKind::Helped, 1));
        let actor_name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
        let target_name = if let Some(t) = session.combatant_mut(&target) {
            t.add_effect(StatusEffect::new(kind, duration).with_source(actor_id.clone()));
            t.name.clone()
        } else {
            String::new()
        };
        ActionOutcome::Effect(EffectOutcome {
            target,
            effect: kind.name().to_string(),
            applied: true,
            roll: None,
            description: format!("{} helps {}, granting advantage", actor_name, target_name),
        })
    }

    /// Grapple and Shove: the target saves against a fixed DC; the effect
    /// lands on a failure.
    fn handle_contested(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
    ) -> ActionOutcome {
        let target = match Self::validate_target(session, cost, target_id) {
            Ok(t) => t,
            Err(e) => return ActionOutcome::InvalidTarget(InvalidTarget { reason: e.to_string() }),
        };
        let Some((kind, duration)) = cost.grants_effect else {
            return ActionOutcome::Simple(SimpleOutcome { roll: None, description: cost.name.clone() });
        };
        let dc = cost.save_dc.unwrap_or(12);
        let roll = self.dice.roll_saving_throw(0);
        let resisted = roll.total >= dc;

        let actor_name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();
        let target_name = session.combatant(&target).map(|c| c.name.clone()).unwrap_or_default();

        if resisted {
            return ActionOutcome::Effect(EffectOutcome {
                target,
                effect: kind.name().to_string(),
                applied: false,
                roll: Some(roll),
                description: format!(
                    "{} tries to {} {} but {} breaks free ({} vs DC {})",
                    actor_name, cost.name, target_name, target_name, roll.total, dc
                ),
            });
        }

        if let Some(t) = session.combatant_mut(&target) {
            t.add_effect(StatusEffect::new(kind, duration).with_source(actor_id.clone()));
        }
        ActionOutcome::Effect(EffectOutcome {
            target,
            effect: kind.name().to_string(),
            applied: true,
            roll: Some(roll),
            description: format!("{} {}s {}: now {}", actor_name, cost.name, target_name, kind.name()),
        })
    }

    /// Recover: an unconscious actor rolls to regain consciousness at
    /// 1 HP; a conscious actor shakes off restraining conditions.
    fn handle_recover(&mut self, session: &mut CombatSession, actor_id: &CombatantId) -> ActionOutcome {
        let (name, unconscious) = {
            let actor = session.combatant(actor_id).expect("actor validated by caller");
            (actor.name.clone(), !actor.is_conscious || actor.hp <= 0)
        };

        if unconscious {
            let roll = self.dice.roll_saving_throw(0);
            let success = roll.total >= self.config.recover_dc;
            let actor = session.combatant_mut(actor_id).expect("actor validated by caller");
            if success {
                actor.recover();
                return ActionOutcome::Recover(RecoverOutcome {
                    roll: Some(roll),
                    success: true,
                    description: format!("{} fights back to consciousness at 1 HP", name),
                });
            }
            actor.attempting_recover = true;
            return ActionOutcome::Recover(RecoverOutcome {
                roll: Some(roll),
                success: false,
                description: format!(
                    "{} struggles to come to ({} vs DC {})",
                    name, roll.total, self.config.recover_dc
                ),
            });
        }

        let actor = session.combatant_mut(actor_id).expect("actor validated by caller");
        actor.remove_effect(&EffectKind::Prone);
        actor.remove_effect(&EffectKind::Grappled);
        actor.attempting_recover = false;
        ActionOutcome::Recover(RecoverOutcome {
            roll: None,
            success: true,
            description: format!("{} recovers their footing", name),
        })
    }

    fn handle_heal(
        &mut self,
        session: &mut CombatSession,
        actor_id: &CombatantId,
        cost: &ActionCost,
        target_id: Option<&CombatantId>,
        params: &ActionParams,
    ) -> Result<ActionOutcome, CombatError> {
        let target = match Self::validate_target(session, cost, target_id) {
            Ok(t) => t,
            Err(e) => return Ok(ActionOutcome::InvalidTarget(InvalidTarget { reason: e.to_string() })),
        };
        let dice = params
            .heal_dice
            .as_deref()
            .or(cost.damage_dice)
            .unwrap_or(&self.config.default_heal_dice)
            .to_string();
        let rolled = self.dice.roll(&dice)?;
        let actor_name = session.combatant(actor_id).map(|c| c.name.clone()).unwrap_or_default();

        let t = session.combatant_mut(&target).expect("target validated above");
        let healed = t.heal(rolled.total.max(0));
        let outcome = HealOutcome {
            target: target.clone(),
            healed,
            target_hp: t.hp,
            description: format!(
                "{} heals {} for {} HP ({}/{})",
                actor_name, t.name, healed, t.hp, t.max_hp
            ),
        };
        Ok(ActionOutcome::Heal(outcome))
    }
}

/// Strain dice for an AP deficit: 1 -> 1d4 minor, 2 -> 2d4 moderate,
/// 3+ -> 3d4 major.
fn overdraw_strain(deficit: i32) -> (DiceExpr, &'static str) {
    match deficit {
        1 => (DiceExpr::new(1, 4, 0), "minor"),
        2 => (DiceExpr::new(2, 4, 0), "moderate"),
        _ => (DiceExpr::new(3, 4, 0), "major"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::CombatantState;
    use std::collections::HashMap;

    fn combatant(id: CombatantId, name: &str, hp: i32, ac: i32, hostile: bool) -> CombatantState {
        let mut c = CombatantState::new(id, name, hp, ac, 3);
        c.hostile = hostile;
        c
    }

    fn basic_session() -> (CombatEngine, CombatSession, CombatantId, CombatantId) {
        let hero_id = CombatantId::pc("hero");
        let goblin_id = CombatantId::npc("goblin", "aaaa1111");
        let hero = combatant(hero_id.clone(), "Hero", 20, 10, false);
        let goblin = combatant(goblin_id.clone(), "Goblin", 8, 12, true);
        let session = CombatSession::new(vec![hero, goblin], HashMap::new());
        let engine = CombatEngine::seeded(EngineConfig::default(), 42);
        (engine, session, hero_id, goblin_id)
    }

    #[test]
    fn test_unknown_actor_raises() {
        let (mut engine, mut session, _, goblin) = basic_session();
        let ghost = CombatantId::pc("ghost");
        let err = engine
            .process_action(&mut session, &ghost, "basic_attack", Some(&goblin), ActionParams::default())
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownActor { .. }));
        assert!(err.to_string().contains("pc:ghost"));
    }

    #[test]
    fn test_invalid_target_is_outcome_not_error() {
        let (mut engine, mut session, hero, _) = basic_session();
        let ghost = CombatantId::npc("ghost", "bbbb2222");
        let processed = engine
            .process_action(&mut session, &hero, "basic_attack", Some(&ghost), ActionParams::default())
            .unwrap();
        let ActionOutcome::InvalidTarget(invalid) = &processed.outcome else {
            panic!("expected InvalidTarget, got {:?}", processed.outcome);
        };
        // The reason lists available targets for the caller
        assert!(invalid.reason.contains("pc:hero"));
        assert!(!processed.outcome.success());
        // AP was still spent; the turn loop keeps moving
        assert_eq!(session.combatant(&hero).unwrap().action_points.current, 1);
    }

    #[test]
    fn test_missing_target_is_outcome() {
        let (mut engine, mut session, hero, _) = basic_session();
        let processed = engine
            .process_action(&mut session, &hero, "basic_attack", None, ActionParams::default())
            .unwrap();
        assert!(matches!(processed.outcome, ActionOutcome::InvalidTarget(_)));
    }

    #[test]
    fn test_unconscious_target_rejected_for_attack() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.combatant_mut(&goblin).unwrap().take_damage(99);
        let processed = engine
            .process_action(&mut session, &hero, "basic_attack", Some(&goblin), ActionParams::default())
            .unwrap();
        assert!(matches!(processed.outcome, ActionOutcome::InvalidTarget(_)));
    }

    #[test]
    fn test_heal_allows_unconscious_target() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.combatant_mut(&goblin).unwrap().hostile = false;
        session.combatant_mut(&goblin).unwrap().take_damage(99);
        let processed = engine
            .process_action(&mut session, &hero, "heal", Some(&goblin), ActionParams::default())
            .unwrap();
        let ActionOutcome::Heal(heal) = &processed.outcome else {
            panic!("expected Heal, got {:?}", processed.outcome);
        };
        assert!(heal.healed >= 1);
        // Healed but still unconscious until a Recover
        assert!(!session.combatant(&goblin).unwrap().is_conscious);
    }

    #[test]
    fn test_end_turn_bypasses_ap() {
        let (mut engine, mut session, hero, _) = basic_session();
        let processed = engine
            .process_action(&mut session, &hero, "end_turn", None, ActionParams::default())
            .unwrap();
        assert!(processed.turn_should_end);
        assert_eq!(session.combatant(&hero).unwrap().action_points.current, 3);
        let entry = &session.combat_log[processed.log_index];
        assert_eq!(entry.ap_cost, 0);
        assert!(entry.turn_should_end);
    }

    #[test]
    fn test_unknown_action_costs_generic_ap() {
        let (mut engine, mut session, hero, _) = basic_session();
        let processed = engine
            .process_action(&mut session, &hero, "interpretive_dance", None, ActionParams::default())
            .unwrap();
        assert!(matches!(processed.outcome, ActionOutcome::Simple(_)));
        assert_eq!(session.combatant(&hero).unwrap().action_points.current, 1);
        assert_eq!(session.combat_log[processed.log_index].ap_cost, 2);
    }

    #[test]
    fn test_overdraw_strain_ranges() {
        assert_eq!(overdraw_strain(1).0, DiceExpr::new(1, 4, 0));
        assert_eq!(overdraw_strain(2).0, DiceExpr::new(2, 4, 0));
        assert_eq!(overdraw_strain(3).0, DiceExpr::new(3, 4, 0));
        assert_eq!(overdraw_strain(7).0, DiceExpr::new(3, 4, 0));
        assert_eq!(overdraw_strain(1).1, "minor");
        assert_eq!(overdraw_strain(2).1, "moderate");
        assert_eq!(overdraw_strain(5).1, "major");
    }

    #[test]
    fn test_overdraw_applies_self_damage_and_ends_turn() {
        let (mut engine, mut session, hero, _) = basic_session();
        session.combatant_mut(&hero).unwrap().action_points.current = 1;

        // 2-AP dash with 1 AP left -> deficit 1 -> 1d4 strain
        let processed = engine
            .process_action(&mut session, &hero, "dash", None, ActionParams::default())
            .unwrap();
        let actor = session.combatant(&hero).unwrap();
        assert_eq!(actor.action_points.current, -1);
        let lost = 20 - actor.hp;
        assert!((1..=4).contains(&lost), "1d4 strain out of range: {}", lost);
        assert!(processed.turn_should_end);
        let entry = &session.combat_log[processed.log_index];
        assert!(entry.description.contains("minor"));
    }

    #[test]
    fn test_should_end_turn_iff_ap_nonpositive() {
        let (engine, mut session, hero, _) = basic_session();
        assert!(!engine.should_end_turn(&session, &hero));
        session.combatant_mut(&hero).unwrap().action_points.current = 0;
        assert!(engine.should_end_turn(&session, &hero));
        session.combatant_mut(&hero).unwrap().action_points.current = -2;
        assert!(engine.should_end_turn(&session, &hero));
    }

    #[test]
    fn test_defend_raises_effective_ac() {
        let (mut engine, mut session, hero, _) = basic_session();
        let processed = engine
            .process_action(&mut session, &hero, "defend", None, ActionParams::default())
            .unwrap();
        let ActionOutcome::Defend(defend) = &processed.outcome else {
            panic!("expected Defend");
        };
        assert_eq!(defend.ac_bonus, 2);
        assert_eq!(session.combatant(&hero).unwrap().effective_ac(), 12);
    }

    #[test]
    fn test_attack_minimum_damage() {
        // Negative damage bonus cannot reduce a landed hit below 1
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.combatant_mut(&hero).unwrap().stats.damage_bonus = -10;
        session.combatant_mut(&goblin).unwrap().ac = -20; // always hit
        for _ in 0..10 {
            session.combatant_mut(&goblin).unwrap().hp = 8;
            session.combatant_mut(&goblin).unwrap().is_conscious = true;
            session.combatant_mut(&goblin).unwrap().status_effects.clear();
            let outcome = engine
                .resolve_attack(&mut session, &hero, &goblin, "1d6")
                .unwrap();
            if outcome.hit {
                assert!(outcome.damage >= 1, "hit dealt {} damage", outcome.damage);
            }
        }
    }

    #[test]
    fn test_spell_save_halts_damage() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        // DC 0: every save succeeds, no damage
        let outcome = engine
            .resolve_spell(&mut session, &hero, &[goblin.clone()], Some("2d6"), Some(0), None)
            .unwrap();
        assert!(outcome.targets[0].saved);
        assert_eq!(outcome.targets[0].damage, 0);
        assert_eq!(session.combatant(&goblin).unwrap().hp, 8);

        // DC 25: every save fails, damage lands
        let outcome = engine
            .resolve_spell(&mut session, &hero, &[goblin.clone()], Some("2d6"), Some(25), None)
            .unwrap();
        assert!(!outcome.targets[0].saved);
        assert!(outcome.targets[0].damage >= 1);
    }

    #[test]
    fn test_complex_spell_applies_effect_on_failed_save() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        let params = ActionParams {
            save_dc: Some(25),
            effect: Some((EffectKind::Stunned, 1)),
            spell_damage: Some("1d4".to_string()),
            ..Default::default()
        };
        let processed = engine
            .process_action(&mut session, &hero, "complex_spell", Some(&goblin), params)
            .unwrap();
        let ActionOutcome::Spell(spell) = &processed.outcome else {
            panic!("expected Spell");
        };
        assert_eq!(spell.targets[0].effect_applied.as_deref(), Some("stunned"));
        assert!(session.combatant(&goblin).unwrap().has_effect(&EffectKind::Stunned));
    }

    #[test]
    fn test_initiative_order_sorted_desc() {
        let (mut engine, mut session, _, _) = basic_session();
        engine.calculate_initiative_order(&mut session);
        assert_eq!(session.turn_order.len(), 2);
        let inits: Vec<i32> = session
            .turn_order
            .iter()
            .map(|id| session.combatant(id).unwrap().initiative)
            .collect();
        assert!(inits[0] >= inits[1]);
        assert_eq!(session.current_turn_index, 0);
    }

    #[test]
    fn test_turn_transition_skips_downed() {
        let hero_id = CombatantId::pc("hero");
        let ally_id = CombatantId::pc("ally");
        let goblin_id = CombatantId::npc("goblin", "aaaa1111");
        let hero = combatant(hero_id.clone(), "Hero", 20, 10, false);
        let ally = combatant(ally_id.clone(), "Ally", 10, 10, false);
        let goblin = combatant(goblin_id.clone(), "Goblin", 8, 12, true);
        let mut session = CombatSession::new(vec![hero, ally, goblin], HashMap::new());
        session.turn_order = vec![hero_id.clone(), ally_id.clone(), goblin_id.clone()];
        session.current_turn_index = 0;

        session.combatant_mut(&ally_id).unwrap().take_damage(99);

        let mut engine = CombatEngine::seeded(EngineConfig::default(), 1);
        let transition = engine.resolve_turn_transition(&mut session).unwrap();
        assert_eq!(transition.next_actor, goblin_id);
        assert_eq!(transition.skipped, vec![ally_id.clone()]);
        assert!(!transition.new_round);

        // A downed combatant attempting recover is not skipped
        session.combatant_mut(&ally_id).unwrap().attempting_recover = true;
        session.current_turn_index = 0;
        let transition = engine.resolve_turn_transition(&mut session).unwrap();
        assert_eq!(transition.next_actor, ally_id);
    }

    #[test]
    fn test_round_increments_on_wraparound() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.turn_order = vec![hero.clone(), goblin.clone()];
        session.current_turn_index = 1;
        session.combatant_mut(&hero).unwrap().action_points.current = 0;

        let transition = engine.resolve_turn_transition(&mut session).unwrap();
        assert_eq!(transition.next_actor, hero);
        assert!(transition.new_round);
        assert_eq!(session.round_number, 2);
        // AP refilled at the round boundary
        assert_eq!(session.combatant(&hero).unwrap().action_points.current, 3);
    }

    #[test]
    fn test_round_boundary_ticks_effects() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.turn_order = vec![hero.clone(), goblin.clone()];
        session.current_turn_index = 1;
        session
            .combatant_mut(&hero)
            .unwrap()
            .add_effect(StatusEffect::new(EffectKind::Defending { ac_bonus: 2 }, 1));

        engine.resolve_turn_transition(&mut session).unwrap();
        assert_eq!(session.combatant(&hero).unwrap().effective_ac(), 10);
    }

    #[test]
    fn test_no_eligible_combatant() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.turn_order = vec![hero.clone(), goblin.clone()];
        session.combatant_mut(&hero).unwrap().take_damage(99);
        session.combatant_mut(&goblin).unwrap().take_damage(99);
        assert!(engine.resolve_turn_transition(&mut session).is_none());
    }

    #[test]
    fn test_victory_detected_after_action() {
        let (mut engine, mut session, hero, goblin) = basic_session();
        session.combatant_mut(&goblin).unwrap().hp = 1;
        session.combatant_mut(&goblin).unwrap().ac = -10;
        session.combatant_mut(&hero).unwrap().stats.attack_bonus = 30;

        let mut victor = None;
        for _ in 0..10 {
            let processed = engine
                .process_action(&mut session, &hero, "attack", Some(&goblin), ActionParams::default())
                .unwrap();
            if let Some(v) = processed.victor {
                victor = Some(v);
                break;
            }
            // Refill so the loop never stalls on AP
            session.combatant_mut(&hero).unwrap().action_points.reset();
        }
        assert_eq!(victor, Some(Victor::Party));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_fumble_always_misses() {
        // Seed hunt: find a seed whose first d20 is a 1, then confirm the
        // guaranteed miss even against trivial AC
        for seed in 0..500 {
            let mut scout = DiceRoller::seeded(seed);
            if scout.roll_d20() != 1 {
                continue;
            }
            let (_, mut session, hero, goblin) = basic_session();
            session.combatant_mut(&goblin).unwrap().ac = -100;
            let mut engine = CombatEngine::seeded(EngineConfig::default(), seed);
            let outcome = engine
                .resolve_attack(&mut session, &hero, &goblin, "1d8")
                .unwrap();
            assert!(!outcome.hit);
            assert_eq!(outcome.damage, 0);
            return;
        }
        panic!("no natural-1 seed found in range");
    }

    #[test]
    fn test_critical_always_hits_and_doubles() {
        for seed in 0..500 {
            let mut scout = DiceRoller::seeded(seed);
            if scout.roll_d20() != 20 {
                continue;
            }
            let (_, mut session, hero, goblin) = basic_session();
            session.combatant_mut(&goblin).unwrap().ac = 100;
            session.combatant_mut(&goblin).unwrap().hp = 1000;
            session.combatant_mut(&goblin).unwrap().max_hp = 1000;
            let mut engine = CombatEngine::seeded(EngineConfig::default(), seed);
            let outcome = engine
                .resolve_attack(&mut session, &hero, &goblin, "1d8")
                .unwrap();
            assert!(outcome.hit, "natural 20 must hit regardless of AC");
            assert!(outcome.critical);
            assert_eq!(outcome.damage % 2, 0, "critical damage is doubled");
            assert!(outcome.damage >= 2);
            return;
        }
        panic!("no natural-20 seed found in range");
    }

    #[test]
    fn test_critical_doubles_dice_not_bonus() {
        for seed in 0..500 {
            let mut scout = DiceRoller::seeded(seed);
            if scout.roll_d20() != 20 {
                continue;
            }
            let die = scout.roll("1d8").unwrap().total;

            let (_, mut session, hero, goblin) = basic_session();
            session.combatant_mut(&hero).unwrap().stats.damage_bonus = 3;
            session.combatant_mut(&goblin).unwrap().hp = 100;
            session.combatant_mut(&goblin).unwrap().max_hp = 100;
            let mut engine = CombatEngine::seeded(EngineConfig::default(), seed);
            let outcome = engine
                .resolve_attack(&mut session, &hero, &goblin, "1d8")
                .unwrap();
            assert!(outcome.critical);
            assert_eq!(outcome.damage, die * 2 + 3, "flat bonus must not double");
            return;
        }
        panic!("no natural-20 seed found in range");
    }

    #[test]
    fn test_resolve_attack_unknown_ids_error() {
        let (mut engine, mut session, hero, _) = basic_session();
        let ghost = CombatantId::npc("ghost", "cccc3333");

        let err = engine
            .resolve_attack(&mut session, &ghost, &hero, "1d8")
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownActor { .. }));

        let err = engine
            .resolve_attack(&mut session, &hero, &ghost, "1d8")
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownActor { .. }));

        let err = engine
            .resolve_spell(&mut session, &ghost, &[hero.clone()], Some("1d6"), Some(10), None)
            .unwrap_err();
        assert!(matches!(err, CombatError::UnknownActor { .. }));
    }
}
