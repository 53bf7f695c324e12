//! Combat session state
//!
//! The mutable aggregate for one encounter: combatant map, initiative
//! order, turn/round counters, and the append-only action log. Mutation
//! happens only through the engine; the surrounding orchestrator
//! serializes access (one `process_action` in flight per session).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::combatant::{CombatantId, CombatantState};

/// Lifecycle of a combat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Roster built, initiative rolled, no turn taken yet
    PreCombat,
    /// Turns cycling
    Active,
    /// A win condition fired
    Completed,
}

/// Which side won the encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Victor {
    /// Players and friendly NPCs
    Party,
    /// Hostile combatants
    Hostiles,
}

/// One immutable entry in the combat log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatAction {
    /// RFC3339 UTC timestamp
    pub timestamp: String,
    pub round_number: u32,
    pub actor_id: CombatantId,
    pub action_type: String,
    pub target_id: Option<CombatantId>,
    pub ap_cost: i32,
    /// Primary d20 or dice total, when the action rolled anything
    pub roll_result: Option<i32>,
    pub damage_dealt: i32,
    pub success: bool,
    pub description: String,
    pub effects_applied: Vec<String>,
    pub turn_should_end: bool,
}

/// Mutable state of one combat encounter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSession {
    pub combatants: HashMap<CombatantId, CombatantState>,
    /// Initiative order, highest first; fixed once combat starts
    pub turn_order: Vec<CombatantId>,
    pub current_turn_index: usize,
    /// Starts at 1
    pub round_number: u32,
    pub combat_log: Vec<CombatAction>,
    pub status: SessionStatus,
    /// Lowercased narrative alias -> combatant id, built by the roster
    /// builder so later references resolve to one combatant
    pub name_index: HashMap<String, CombatantId>,
}

impl CombatSession {
    /// Create a session from built combatants and their alias index
    pub fn new(
        combatants: Vec<CombatantState>,
        name_index: HashMap<String, CombatantId>,
    ) -> Self {
        let combatants = combatants
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self {
            combatants,
            turn_order: Vec::new(),
            current_turn_index: 0,
            round_number: 1,
            combat_log: Vec::new(),
            status: SessionStatus::PreCombat,
            name_index,
        }
    }

    pub fn combatant(&self, id: &CombatantId) -> Option<&CombatantState> {
        self.combatants.get(id)
    }

    pub fn combatant_mut(&mut self, id: &CombatantId) -> Option<&mut CombatantState> {
        self.combatants.get_mut(id)
    }

    /// The combatant whose turn it is, if combat has an order
    pub fn current_actor(&self) -> Option<&CombatantId> {
        self.turn_order.get(self.current_turn_index)
    }

    /// Resolve a narrative name or alias to a combatant id
    pub fn resolve_name(&self, name: &str) -> Option<&CombatantId> {
        self.name_index.get(&name.trim().to_lowercase())
    }

    /// Ids of all combatants, for error messages
    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.combatants.keys().map(|k| k.as_str().to_string()).collect();
        ids.sort();
        ids
    }

    /// Append an entry to the immutable log
    pub fn log_action(&mut self, action: CombatAction) -> &CombatAction {
        self.combat_log.push(action);
        self.combat_log.last().unwrap()
    }

    /// One side fully incapacitated? Hostiles versus everyone else.
    pub fn check_victory(&self) -> Option<Victor> {
        let mut hostiles_standing = 0usize;
        let mut party_standing = 0usize;
        let mut hostiles_total = 0usize;
        let mut party_total = 0usize;

        for combatant in self.combatants.values() {
            if combatant.hostile {
                hostiles_total += 1;
                if !combatant.is_defeated() {
                    hostiles_standing += 1;
                }
            } else {
                party_total += 1;
                if !combatant.is_defeated() {
                    party_standing += 1;
                }
            }
        }

        // A one-sided roster never completes on its own
        if hostiles_total == 0 || party_total == 0 {
            return None;
        }
        if hostiles_standing == 0 {
            Some(Victor::Party)
        } else if party_standing == 0 {
            Some(Victor::Hostiles)
        } else {
            None
        }
    }

    /// Flip to Completed if a win condition holds. Returns the victor.
    pub fn complete_if_decided(&mut self) -> Option<Victor> {
        let victor = self.check_victory()?;
        if self.status != SessionStatus::Completed {
            self.status = SessionStatus::Completed;
            info!(?victor, rounds = self.round_number, "combat completed");
        }
        Some(victor)
    }
}
