//! Combatant state
//!
//! The entity record for one combat participant (PC or NPC): hit points,
//! armor, the action-point ledger, and active status effects.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::effects::{EffectKind, Modifiers, StatusEffect};

/// Prefixed combatant identifier: `pc:<id>` for players, `npc:<slug>_<uuid>`
/// for NPCs. The prefix survives every layer so narrative references and
/// persistence rows always agree on who is who.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(String);

impl CombatantId {
    /// Player-character id
    pub fn pc(id: &str) -> Self {
        Self(format!("pc:{}", id))
    }

    /// NPC id from a slug and a short unique suffix
    pub fn npc(slug: &str, suffix: &str) -> Self {
        Self(format!("npc:{}_{}", slug, suffix))
    }

    /// Wrap an already-prefixed id
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_npc(&self) -> bool {
        self.0.starts_with("npc:")
    }
}

impl std::fmt::Display for CombatantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-turn action point ledger. `current` may go transiently negative:
/// overdraw is a legal, penalized state, never a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPoints {
    pub current: i32,
    pub max: i32,
}

impl ActionPoints {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Subtract unconditionally. Returns the new balance.
    pub fn spend(&mut self, cost: i32) -> i32 {
        self.current -= cost;
        self.current
    }

    /// How far below zero the ledger sits, 0 if not overdrawn
    pub fn deficit(&self) -> i32 {
        (-self.current).max(0)
    }

    /// Restore to full at the top of a round
    pub fn reset(&mut self) {
        self.current = self.max;
    }

    pub fn is_exhausted(&self) -> bool {
        self.current <= 0
    }
}

/// Derived combat numbers for a combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub attack_bonus: i32,
    pub damage_bonus: i32,
    pub spell_save_dc: i32,
    pub initiative_bonus: i32,
    pub speed: i32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            attack_bonus: 2,
            damage_bonus: 0,
            spell_save_dc: 12,
            initiative_bonus: 0,
            speed: 30,
        }
    }
}

/// Outcome of applying damage to a combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageApplied {
    /// HP actually removed after clamping at zero
    pub damage: i32,
    pub remaining_hp: i32,
    /// True exactly on the conscious-to-unconscious transition
    pub knocked_unconscious: bool,
}

/// One participant in combat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantState {
    pub id: CombatantId,
    pub name: String,
    /// Shorter forms of the name for narrative reference matching
    pub aliases: Vec<String>,
    pub initiative: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub level: u32,
    pub is_npc: bool,
    pub hostile: bool,
    pub is_conscious: bool,
    pub action_points: ActionPoints,
    pub status_effects: Vec<StatusEffect>,
    pub stats: CombatStats,
    /// Set while this combatant is trying to regain consciousness; exempts
    /// them from being skipped in turn order
    pub attempting_recover: bool,
}

impl CombatantState {
    pub fn new(id: CombatantId, name: impl Into<String>, max_hp: i32, ac: i32, max_ap: i32) -> Self {
        let is_npc = id.is_npc();
        Self {
            id,
            name: name.into(),
            aliases: Vec::new(),
            initiative: 0,
            hp: max_hp,
            max_hp,
            ac,
            level: 1,
            is_npc,
            hostile: false,
            is_conscious: true,
            action_points: ActionPoints::new(max_ap),
            status_effects: Vec::new(),
            stats: CombatStats::default(),
            attempting_recover: false,
        }
    }

    /// Apply damage, clamping HP at zero and detecting knockout
    pub fn take_damage(&mut self, amount: i32) -> DamageApplied {
        let amount = amount.max(0);
        let was_conscious = self.is_conscious;
        let dealt = amount.min(self.hp);
        self.hp -= dealt;

        let knocked_unconscious = self.hp == 0 && was_conscious;
        if knocked_unconscious {
            self.is_conscious = false;
            self.add_effect(StatusEffect::new(EffectKind::Unconscious, u32::MAX));
            info!(combatant = %self.id, "{} falls unconscious", self.name);
        }

        DamageApplied {
            damage: dealt,
            remaining_hp: self.hp,
            knocked_unconscious,
        }
    }

    /// Heal, never exceeding max HP. Returns HP actually restored.
    /// Healing alone does not wake the unconscious; that is Recover's job.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let actual = amount.max(0).min(self.max_hp - self.hp);
        self.hp += actual;
        actual
    }

    /// A successful Recover: back to 1 HP and conscious
    pub fn recover(&mut self) {
        self.hp = self.hp.max(1);
        self.is_conscious = true;
        self.attempting_recover = false;
        self.status_effects
            .retain(|e| !matches!(e.kind, EffectKind::Unconscious));
        info!(combatant = %self.id, "{} regains consciousness", self.name);
    }

    /// Collapsed modifier view of active effects
    pub fn modifiers(&self) -> Modifiers {
        Modifiers::of(&self.status_effects)
    }

    /// Base AC plus active effect bonuses (e.g. Defending's +2)
    pub fn effective_ac(&self) -> i32 {
        self.ac + self.modifiers().ac_bonus
    }

    /// Add an effect, refreshing an existing one of the same kind to the
    /// longer duration rather than stacking duplicates
    pub fn add_effect(&mut self, effect: StatusEffect) {
        if let Some(existing) = self
            .status_effects
            .iter_mut()
            .find(|e| e.kind.same_kind(&effect.kind))
        {
            existing.duration_rounds = existing.duration_rounds.max(effect.duration_rounds);
            existing.kind = effect.kind;
            existing.source = effect.source.or(existing.source.take());
        } else {
            self.status_effects.push(effect);
        }
    }

    pub fn has_effect(&self, kind: &EffectKind) -> bool {
        self.status_effects
            .iter()
            .any(|e| e.kind.same_kind(kind) && !e.is_expired())
    }

    pub fn remove_effect(&mut self, kind: &EffectKind) {
        self.status_effects.retain(|e| !e.kind.same_kind(kind));
    }

    /// Whether this combatant is out of the fight
    pub fn is_defeated(&self) -> bool {
        self.hp <= 0
    }

    /// Eligible to act in turn order. Unconscious or incapacitated
    /// combatants are skipped unless they are attempting a Recover.
    pub fn can_take_turn(&self) -> bool {
        if self.attempting_recover {
            return true;
        }
        self.is_conscious && self.hp > 0 && !self.modifiers().incapacitated
    }

    /// Count effect durations down one round, dropping expired effects.
    /// Returns the names of effects that expired.
    pub fn tick_effects_round(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        for effect in &mut self.status_effects {
            if !effect.tick_round() {
                expired.push(effect.kind.name().to_string());
            }
        }
        if !expired.is_empty() {
            debug!(combatant = %self.id, ?expired, "status effects expired");
        }
        self.status_effects.retain(|e| !e.is_expired());
        expired
    }
}
