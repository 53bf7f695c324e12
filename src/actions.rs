//! Action catalog
//!
//! The closed set of combat actions, their AP costs and metadata, and the
//! level-to-maximum-AP formula. Upstream layers hand the engine action
//! names as free text; parsing is alias-tolerant and unknown names fall
//! back to a generic cost rather than failing the turn.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::effects::EffectKind;

/// AP an unrecognized action name costs. Keeps the turn loop resilient
/// to upstream naming drift.
pub const GENERIC_ACTION_AP: i32 = 2;

/// Maximum action points for a character level. Monotonic: base 3,
/// +1 every four levels.
pub fn max_ap_for_level(level: u32) -> i32 {
    3 + (level.saturating_sub(1) / 4) as i32
}

/// Closed set of action kinds the engine dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BasicAttack,
    FullAttack,
    SimpleSpell,
    ComplexSpell,
    Defend,
    Move,
    Dash,
    Dodge,
    Disengage,
    Hide,
    Search,
    Help,
    Grapple,
    Shove,
    ReadyAction,
    Recover,
    Heal,
    SpecialAbility,
    BonusAction,
    EndTurn,
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "attack" | "basic_attack" | "melee_attack" | "strike" => Ok(ActionKind::BasicAttack),
            "full_attack" | "multiattack" => Ok(ActionKind::FullAttack),
            "spell" | "simple_spell" | "cast" | "cast_spell" => Ok(ActionKind::SimpleSpell),
            "complex_spell" | "ritual" => Ok(ActionKind::ComplexSpell),
            "defend" | "defense" | "guard" | "block" => Ok(ActionKind::Defend),
            "move" | "movement" | "reposition" => Ok(ActionKind::Move),
            "dash" | "sprint" | "run" => Ok(ActionKind::Dash),
            "dodge" | "evade" => Ok(ActionKind::Dodge),
            "disengage" | "withdraw" => Ok(ActionKind::Disengage),
            "hide" | "stealth" => Ok(ActionKind::Hide),
            "search" | "investigate" => Ok(ActionKind::Search),
            "help" | "assist" | "aid" => Ok(ActionKind::Help),
            "grapple" | "wrestle" => Ok(ActionKind::Grapple),
            "shove" | "push" => Ok(ActionKind::Shove),
            "ready" | "ready_action" | "prepare" => Ok(ActionKind::ReadyAction),
            "recover" | "rally" => Ok(ActionKind::Recover),
            "heal" | "cure" | "first_aid" => Ok(ActionKind::Heal),
            "special" | "special_ability" | "ability" => Ok(ActionKind::SpecialAbility),
            "bonus" | "bonus_action" => Ok(ActionKind::BonusAction),
            "end_turn" | "end" | "pass" => Ok(ActionKind::EndTurn),
            _ => Err(()),
        }
    }
}

impl ActionKind {
    /// All dispatchable kinds, catalog order
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::BasicAttack,
            ActionKind::FullAttack,
            ActionKind::SimpleSpell,
            ActionKind::ComplexSpell,
            ActionKind::Defend,
            ActionKind::Move,
            ActionKind::Dash,
            ActionKind::Dodge,
            ActionKind::Disengage,
            ActionKind::Hide,
            ActionKind::Search,
            ActionKind::Help,
            ActionKind::Grapple,
            ActionKind::Shove,
            ActionKind::ReadyAction,
            ActionKind::Recover,
            ActionKind::Heal,
            ActionKind::SpecialAbility,
            ActionKind::BonusAction,
            ActionKind::EndTurn,
        ]
    }

    /// Canonical snake_case name
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::BasicAttack => "basic_attack",
            ActionKind::FullAttack => "full_attack",
            ActionKind::SimpleSpell => "simple_spell",
            ActionKind::ComplexSpell => "complex_spell",
            ActionKind::Defend => "defend",
            ActionKind::Move => "move",
            ActionKind::Dash => "dash",
            ActionKind::Dodge => "dodge",
            ActionKind::Disengage => "disengage",
            ActionKind::Hide => "hide",
            ActionKind::Search => "search",
            ActionKind::Help => "help",
            ActionKind::Grapple => "grapple",
            ActionKind::Shove => "shove",
            ActionKind::ReadyAction => "ready_action",
            ActionKind::Recover => "recover",
            ActionKind::Heal => "heal",
            ActionKind::SpecialAbility => "special_ability",
            ActionKind::BonusAction => "bonus_action",
            ActionKind::EndTurn => "end_turn",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Action category, mirroring the standard/bonus/free split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Standard,
    Bonus,
    Free,
}

/// Catalog row for one action: cost plus resolution metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCost {
    pub kind: Option<ActionKind>,
    pub name: String,
    pub ap_cost: i32,
    pub category: ActionCategory,
    pub description: &'static str,
    pub requires_target: bool,
    /// Heal and Help may legally target unconscious combatants
    pub allows_unconscious_target: bool,
    /// Default damage dice for damaging actions
    pub damage_dice: Option<&'static str>,
    /// Save DC for actions resolved by the target's saving throw
    pub save_dc: Option<i32>,
    /// Effect granted on use (kind, duration in rounds)
    pub grants_effect: Option<(EffectKind, u32)>,
}

impl ActionCost {
    /// Catalog lookup for a known action kind
    pub fn for_kind(kind: ActionKind) -> ActionCost {
        let mut cost = ActionCost {
            kind: Some(kind),
            name: kind.name().to_string(),
            ap_cost: 2,
            category: ActionCategory::Standard,
            description: "",
            requires_target: false,
            allows_unconscious_target: false,
            damage_dice: None,
            save_dc: None,
            grants_effect: None,
        };
        match kind {
            ActionKind::BasicAttack => {
                cost.ap_cost = 2;
                cost.description = "A single weapon attack";
                cost.requires_target = true;
                cost.damage_dice = Some("1d8");
            }
            ActionKind::FullAttack => {
                cost.ap_cost = 3;
                cost.description = "Two weapon attacks against one target";
                cost.requires_target = true;
                cost.damage_dice = Some("1d8");
            }
            ActionKind::SimpleSpell => {
                cost.ap_cost = 2;
                cost.description = "A quick damaging spell";
                cost.requires_target = true;
                cost.damage_dice = Some("1d10");
            }
            ActionKind::ComplexSpell => {
                cost.ap_cost = 3;
                cost.description = "A powerful spell with a saving throw";
                cost.requires_target = true;
                cost.damage_dice = Some("2d8");
            }
            ActionKind::Defend => {
                cost.ap_cost = 1;
                cost.description = "Brace for attacks, +2 AC until your next turn";
                cost.grants_effect = Some((EffectKind::Defending { ac_bonus: 2 }, 1));
            }
            ActionKind::Move => {
                cost.ap_cost = 1;
                cost.description = "Move up to your speed";
            }
            ActionKind::Dash => {
                cost.ap_cost = 2;
                cost.description = "Move up to twice your speed";
            }
            ActionKind::Dodge => {
                cost.ap_cost = 1;
                cost.description = "Focus on evasion; attackers are hindered";
                cost.grants_effect = Some((EffectKind::Dodging, 1));
            }
            ActionKind::Disengage => {
                cost.ap_cost = 1;
                cost.description = "Retreat without provoking reactions";
                cost.grants_effect = Some((EffectKind::Disengaged, 1));
            }
            ActionKind::Hide => {
                cost.ap_cost = 1;
                cost.description = "Attempt to conceal yourself";
                cost.grants_effect = Some((EffectKind::Hidden, 1));
            }
            ActionKind::Search => {
                cost.ap_cost = 1;
                cost.description = "Look for something hidden";
            }
            ActionKind::Help => {
                cost.ap_cost = 1;
                cost.description = "Aid an ally's next attempt";
                cost.requires_target = true;
                cost.allows_unconscious_target = true;
                cost.grants_effect = Some((EffectKind::Helped, 1));
            }
            ActionKind::Grapple => {
                cost.ap_cost = 1;
                cost.description = "Attempt to hold a target in place";
                cost.requires_target = true;
                cost.save_dc = Some(12);
                cost.grants_effect = Some((EffectKind::Grappled, 2));
            }
            ActionKind::Shove => {
                cost.ap_cost = 1;
                cost.description = "Attempt to knock a target down";
                cost.requires_target = true;
                cost.save_dc = Some(12);
                cost.grants_effect = Some((EffectKind::Prone, 1));
            }
            ActionKind::ReadyAction => {
                cost.ap_cost = 2;
                cost.description = "Hold an action for a trigger";
                cost.grants_effect = Some((EffectKind::Readied, 1));
            }
            ActionKind::Recover => {
                cost.ap_cost = 1;
                cost.description = "Fight back to consciousness";
            }
            ActionKind::Heal => {
                cost.ap_cost = 2;
                cost.description = "Restore hit points to a target";
                cost.requires_target = true;
                cost.allows_unconscious_target = true;
                cost.damage_dice = Some("1d8");
            }
            ActionKind::SpecialAbility => {
                cost.ap_cost = 3;
                cost.description = "A signature class or creature ability";
                cost.damage_dice = Some("2d6");
            }
            ActionKind::BonusAction => {
                cost.ap_cost = 1;
                cost.category = ActionCategory::Bonus;
                cost.description = "A swift supplementary act";
            }
            ActionKind::EndTurn => {
                cost.ap_cost = 0;
                cost.category = ActionCategory::Free;
                cost.description = "Yield the remainder of the turn";
            }
        }
        cost
    }

    /// Fallback row for an unrecognized action name
    pub fn generic(name: &str) -> ActionCost {
        ActionCost {
            kind: None,
            name: name.to_string(),
            ap_cost: GENERIC_ACTION_AP,
            category: ActionCategory::Standard,
            description: "An improvised action",
            requires_target: false,
            allows_unconscious_target: false,
            damage_dice: None,
            save_dc: None,
            grants_effect: None,
        }
    }

    /// Catalog lookup by raw name, falling back to a generic row
    pub fn lookup(name: &str) -> ActionCost {
        match name.parse::<ActionKind>() {
            Ok(kind) => Self::for_kind(kind),
            Err(()) => Self::generic(name),
        }
    }
}
