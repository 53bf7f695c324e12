//! Status effects
//!
//! Each effect is a tagged variant carrying only the fields it needs.
//! Handlers create effects; the round-advance path expires them. The
//! engine never inspects individual effects during resolution; it asks
//! for the collapsed [`Modifiers`] projection instead.

use serde::{Deserialize, Serialize};

use crate::combatant::CombatantId;

/// Closed set of status effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectKind {
    /// Braced for attacks, raising effective AC
    Defending { ac_bonus: i32 },
    /// Attackers roll at disadvantage
    Dodging,
    /// Moved away without provoking reactions
    Disengaged,
    /// Held by another combatant; cannot move
    Grappled,
    /// Knocked down; melee attackers gain advantage
    Prone,
    /// Next check is made with advantage
    Helped,
    /// Concealed; first attack from hiding gains advantage
    Hidden,
    /// Holding a prepared action for a trigger
    Readied,
    /// Cannot act this round
    Stunned,
    /// Cannot act or move
    Paralyzed,
    /// Cannot take actions of any kind
    Incapacitated,
    /// At 0 HP, helpless until recovered
    Unconscious,
}

impl EffectKind {
    /// Whether this effect prevents the combatant from taking a turn
    pub fn prevents_action(&self) -> bool {
        matches!(
            self,
            EffectKind::Stunned
                | EffectKind::Paralyzed
                | EffectKind::Incapacitated
                | EffectKind::Unconscious
        )
    }

    /// Short name used in log descriptions
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Defending { .. } => "defending",
            EffectKind::Dodging => "dodging",
            EffectKind::Disengaged => "disengaged",
            EffectKind::Grappled => "grappled",
            EffectKind::Prone => "prone",
            EffectKind::Helped => "helped",
            EffectKind::Hidden => "hidden",
            EffectKind::Readied => "readied",
            EffectKind::Stunned => "stunned",
            EffectKind::Paralyzed => "paralyzed",
            EffectKind::Incapacitated => "incapacitated",
            EffectKind::Unconscious => "unconscious",
        }
    }

    /// Same kind of effect, ignoring payload fields. Used to refresh
    /// rather than stack duplicates.
    pub fn same_kind(&self, other: &EffectKind) -> bool {
        self.name() == other.name()
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A status effect instance on a combatant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: EffectKind,
    /// Remaining duration in combat rounds
    pub duration_rounds: u32,
    /// Who applied this effect
    pub source: Option<CombatantId>,
    pub description: String,
}

impl StatusEffect {
    pub fn new(kind: EffectKind, duration_rounds: u32) -> Self {
        let description = kind.name().to_string();
        Self { kind, duration_rounds, source: None, description }
    }

    pub fn with_source(mut self, source: CombatantId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Count down one round. Returns true while the effect remains active.
    pub fn tick_round(&mut self) -> bool {
        if self.duration_rounds > 0 {
            self.duration_rounds -= 1;
        }
        !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.duration_rounds == 0
    }
}

/// Collapsed view of a combatant's active effects. The single place
/// modifier stacking rules live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Total AC adjustment (e.g. Defending's +2)
    pub ac_bonus: i32,
    /// Movement reduced to zero (grappled, paralyzed, unconscious)
    pub speed_zero: bool,
    /// Next check rolls with advantage (helped, hidden)
    pub advantage: bool,
    /// Incoming attacks roll at disadvantage (dodging)
    pub attackers_disadvantage: bool,
    /// Incoming melee attacks roll with advantage (prone)
    pub attackers_advantage: bool,
    /// Cannot take a normal turn
    pub incapacitated: bool,
}

impl Modifiers {
    /// Project a list of effects into one modifier set
    pub fn of(effects: &[StatusEffect]) -> Self {
        let mut m = Modifiers::default();
        for effect in effects {
            if effect.is_expired() {
                continue;
            }
            match effect.kind {
                EffectKind::Defending { ac_bonus } => m.ac_bonus += ac_bonus,
                EffectKind::Dodging => m.attackers_disadvantage = true,
                EffectKind::Disengaged => {}
                EffectKind::Grappled => m.speed_zero = true,
                EffectKind::Prone => m.attackers_advantage = true,
                EffectKind::Helped | EffectKind::Hidden => m.advantage = true,
                EffectKind::Readied => {}
                EffectKind::Stunned => m.incapacitated = true,
                EffectKind::Paralyzed | EffectKind::Incapacitated | EffectKind::Unconscious => {
                    m.speed_zero = true;
                    m.incapacitated = true;
                }
            }
        }
        m
    }
}
