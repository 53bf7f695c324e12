//! Dice rolling system
//!
//! Parses dice notation like "2d6+3", "1d20", "4d6-2" and rolls it through
//! a roller that owns its RNG, so a seeded roller replays an entire
//! encounter roll-for-roll.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a dice expression. These indicate a programmer
/// error in action metadata, never a player-facing game outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("missing 'd' in dice notation: {0}")]
    MissingSeparator(String),

    #[error("invalid dice count: {0}")]
    InvalidCount(String),

    #[error("invalid die sides: {0}")]
    InvalidSides(String),

    #[error("invalid modifier: {0}")]
    InvalidModifier(String),

    #[error("dice count must be at least 1")]
    ZeroCount,

    #[error("die sides must be at least 1")]
    ZeroSides,
}

/// A parsed dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceExpr {
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Modifier to add/subtract
    pub modifier: i32,
}

impl DiceExpr {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self { count, sides, modifier }
    }

    /// Minimum possible result
    pub fn min(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    /// Maximum possible result
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }
}

impl FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dice(s)
    }
}

impl std::fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.count, self.sides, self.modifier)
        } else if self.modifier < 0 {
            write!(f, "{}d{}{}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}", self.count, self.sides)
        }
    }
}

/// Parse a dice notation string like "2d6+3"
pub fn parse_dice(notation: &str) -> Result<DiceExpr, DiceError> {
    let notation = notation.trim().to_lowercase();

    let d_pos = notation
        .find('d')
        .ok_or_else(|| DiceError::MissingSeparator(notation.clone()))?;

    // Count before 'd'; "d6" means "1d6"
    let count_str = &notation[..d_pos];
    let count: u32 = if count_str.is_empty() {
        1
    } else {
        count_str
            .parse()
            .map_err(|_| DiceError::InvalidCount(count_str.to_string()))?
    };

    if count == 0 {
        return Err(DiceError::ZeroCount);
    }

    let rest = &notation[d_pos + 1..];

    // Split off the modifier; rfind handles embedded minus signs
    let (sides_str, modifier) = if let Some(plus_pos) = rest.find('+') {
        let mod_str = &rest[plus_pos + 1..];
        let modifier: i32 = mod_str
            .parse()
            .map_err(|_| DiceError::InvalidModifier(mod_str.to_string()))?;
        (&rest[..plus_pos], modifier)
    } else if let Some(minus_pos) = rest.rfind('-') {
        if minus_pos == 0 {
            (rest, 0)
        } else {
            let mod_str = &rest[minus_pos..];
            let modifier: i32 = mod_str
                .parse()
                .map_err(|_| DiceError::InvalidModifier(mod_str.to_string()))?;
            (&rest[..minus_pos], modifier)
        }
    } else {
        (rest, 0)
    };

    let sides: u32 = sides_str
        .parse()
        .map_err(|_| DiceError::InvalidSides(sides_str.to_string()))?;

    if sides == 0 {
        return Err(DiceError::ZeroSides);
    }

    Ok(DiceExpr { count, sides, modifier })
}

/// Per-die results plus the modified total of one roll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollBreakdown {
    /// Individual die results
    pub rolls: Vec<u32>,
    /// Modifier applied to the sum
    pub modifier: i32,
    /// Sum of dice plus modifier
    pub total: i32,
}

/// One d20 check roll with critical detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D20Roll {
    /// The raw die face, 1..=20
    pub natural: u32,
    /// natural + modifier
    pub total: i32,
    /// Natural 20
    pub critical: bool,
    /// Natural 1
    pub critical_fail: bool,
}

/// Check if a d20 face is a natural 20 (critical hit)
pub fn is_critical(roll: u32) -> bool {
    roll == 20
}

/// Check if a d20 face is a natural 1 (critical fail)
pub fn is_fumble(roll: u32) -> bool {
    roll == 1
}

/// Stateful dice roller. Seed it for reproducible sessions.
#[derive(Debug)]
pub struct DiceRoller {
    rng: StdRng,
}

impl DiceRoller {
    /// Create a roller seeded from OS entropy
    pub fn new() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Create a roller with a fixed seed; every roll sequence is
    /// reproducible given the same seed
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Roll a parsed expression, returning per-die results and total
    pub fn roll_expr(&mut self, expr: &DiceExpr) -> RollBreakdown {
        let mut rolls = Vec::with_capacity(expr.count as usize);
        for _ in 0..expr.count {
            rolls.push(self.rng.random_range(1..=expr.sides));
        }
        let sum: u32 = rolls.iter().sum();
        RollBreakdown {
            rolls,
            modifier: expr.modifier,
            total: sum as i32 + expr.modifier,
        }
    }

    /// Parse and roll dice notation like "2d6+3"
    pub fn roll(&mut self, notation: &str) -> Result<RollBreakdown, DiceError> {
        let expr = parse_dice(notation)?;
        Ok(self.roll_expr(&expr))
    }

    /// Roll a single d20 face
    pub fn roll_d20(&mut self) -> u32 {
        self.rng.random_range(1..=20)
    }

    fn d20_check(&mut self, modifier: i32) -> D20Roll {
        let natural = self.roll_d20();
        D20Roll {
            natural,
            total: natural as i32 + modifier,
            critical: is_critical(natural),
            critical_fail: is_fumble(natural),
        }
    }

    /// Attack roll: d20 + attack bonus, with crit/fumble flags
    pub fn roll_attack(&mut self, attack_bonus: i32) -> D20Roll {
        self.d20_check(attack_bonus)
    }

    /// Saving throw: d20 + save modifier
    pub fn roll_saving_throw(&mut self, modifier: i32) -> D20Roll {
        self.d20_check(modifier)
    }

    /// Initiative roll: d20 + dex modifier + initiative bonus
    pub fn roll_initiative(&mut self, dex_modifier: i32, initiative_bonus: i32) -> D20Roll {
        self.d20_check(dex_modifier + initiative_bonus)
    }

    /// Uniform roll in 0..n, used for order tiebreaks
    pub(crate) fn tiebreak(&mut self, n: u32) -> u32 {
        self.rng.random_range(0..n.max(1))
    }
}

impl Default for DiceRoller {
    fn default() -> Self {
        Self::new()
    }
}
