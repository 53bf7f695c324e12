//! skirmish - deterministic combat mechanics engine
//!
//! The combat core behind an LLM-narrated tabletop campaign runner:
//! - Dice rolling (e.g. "2d6+3") with critical detection, seedable
//! - Action-point economy with penalized overdraw
//! - Attack, spell, and status-effect resolution
//! - Turn-order state machine over a combat session
//! - Roster building from narrative and structured combatant descriptions
//!
//! The surrounding platform (HTTP routes, persistence, narration,
//! broadcasting) invokes this library and consumes its typed results and
//! append-only action log. The core itself is synchronous, in-memory, and
//! free of I/O; the one external seam is the injected character lookup in
//! [`roster`].

pub mod actions;
pub mod combatant;
pub mod dice;
pub mod effects;
pub mod engine;
pub mod roster;
pub mod session;

pub use actions::{max_ap_for_level, ActionCategory, ActionCost, ActionKind};
pub use combatant::{ActionPoints, CombatStats, CombatantId, CombatantState};
pub use dice::{parse_dice, D20Roll, DiceError, DiceExpr, DiceRoller, RollBreakdown};
pub use effects::{EffectKind, Modifiers, StatusEffect};
pub use engine::{ActionOutcome, ActionParams, CombatEngine, CombatError, ProcessedAction};
pub use roster::{normalize_combatant_name, CharacterLookup, CombatRosterBuilder, PlayerRecord, RosterEntry};
pub use session::{CombatAction, CombatSession, SessionStatus, Victor};

use serde::{Deserialize, Serialize};

/// Engine tunables. Defaults match the standard ruleset; the campaign
/// layer may deserialize overrides from its own configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Damage dice when neither the action nor the caller names a weapon
    pub default_weapon_damage: String,
    /// Healing dice for an unparameterized Heal action
    pub default_heal_dice: String,
    /// DC an unconscious combatant must beat to Recover
    pub recover_dc: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_weapon_damage: "1d8".to_string(),
            default_heal_dice: "1d8".to_string(),
            recover_dc: 10,
        }
    }
}
