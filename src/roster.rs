//! Combat roster builder
//!
//! Converts heterogeneous combatant descriptions (structured initiative
//! entries, narrative entity lists from the scene analyzer, and the known
//! player roster) into canonical [`CombatantState`] records with stable,
//! prefixed ids and a shared alias index for later narrative references.
//!
//! Name normalization is inherently heuristic; it lives in one pure
//! function with an explicit contract and is tested over the messy inputs
//! LLM output actually produces.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::max_ap_for_level;
use crate::combatant::{CombatStats, CombatantId, CombatantState};
use crate::session::CombatSession;

/// Hit points for an NPC with no stated HP
pub const DEFAULT_NPC_HP: i32 = 8;
/// Armor class for a neutral/friendly NPC with no stated AC
pub const DEFAULT_NPC_AC: i32 = 12;
/// Armor class for a hostile NPC with no stated AC
pub const DEFAULT_ENEMY_AC: i32 = 13;
/// Action points for a level-1 combatant
pub const DEFAULT_ACTION_POINTS: i32 = 3;

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+\s*[).:\-\]]\s*|[-*•]\s*)").unwrap());
static PAREN_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());
static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Trailing descriptive clauses get cut at the first of these
/// connectives. Matched case-insensitively in place so the cut offset is
/// always a valid byte index into the original name.
static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s(?:who|which|that|wielding|standing|lurking|emerging|attacking|facing|engaging|fighting)\s",
    )
    .unwrap()
});

/// Names longer than this get truncated at the last clause boundary
const MAX_CANONICAL_LEN: usize = 48;

/// One loosely-typed roster entry from upstream. Every field except the
/// name is optional; missing values take documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterEntry {
    pub name: String,
    pub is_player: bool,
    pub hostile: Option<bool>,
    pub level: Option<u32>,
    pub hp: Option<i32>,
    pub max_hp: Option<i32>,
    pub ac: Option<i32>,
    pub dex_modifier: Option<i32>,
    pub initiative_bonus: Option<i32>,
    pub attack_bonus: Option<i32>,
    pub damage_bonus: Option<i32>,
}

impl RosterEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// Parse roster entries from a loose JSON payload: an array of objects,
/// bare name strings, or a mix. Malformed elements are skipped.
pub fn parse_entries(value: &serde_json::Value) -> Vec<RosterEntry> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(name) => Some(RosterEntry::named(name)),
            obj @ serde_json::Value::Object(_) => {
                match serde_json::from_value::<RosterEntry>(obj.clone()) {
                    Ok(entry) if !entry.name.trim().is_empty() => Some(entry),
                    Ok(_) => None,
                    Err(e) => {
                        debug!(error = %e, "skipping malformed roster entry");
                        None
                    }
                }
            }
            _ => None,
        })
        .collect()
}

/// A known player character record, as stored by the campaign layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    #[serde(default)]
    pub stats: CombatStats,
}

/// Injected character lookup. This is the only I/O seam in the core;
/// implementations may hit a database, the engine never does.
pub trait CharacterLookup {
    fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>>;
}

impl CharacterLookup for Vec<PlayerRecord> {
    fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>> {
        let needle = name.trim().to_lowercase();
        Ok(self.iter().find(|p| p.name.to_lowercase() == needle).cloned())
    }
}

/// Output of [`normalize_combatant_name`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    /// Numbering-stripped, clause-truncated display name
    pub canonical: String,
    /// Progressively shorter forms for fuzzy matching, longest first
    pub aliases: Vec<String>,
}

/// Normalize a narrative combatant line into a canonical name plus
/// shorter aliases.
///
/// Contract:
/// - numbering and bullet prefixes (`"3) "`, `"2."`, `"- "`) are stripped;
/// - embedded player names and trailing descriptive clauses
///   ("... attacking Aria") are cut from the canonical form;
/// - parenthesized and colon/comma status clauses ("(wary, HP 7/7)",
///   ": HP 7/7, wary") survive in the canonical name but are stripped to
///   produce aliases;
/// - the canonical form is truncated at a clause boundary past
///   `MAX_CANONICAL_LEN`.
pub fn normalize_combatant_name(raw: &str, player_names: &[String]) -> NormalizedName {
    let mut canonical = NUMBERING_RE.replace(raw.trim(), "").trim().to_string();

    // Cut trailing descriptive clauses at the first connective
    if let Some(m) = CLAUSE_RE.find(&canonical) {
        canonical.truncate(m.start());
        canonical = canonical.trim_end_matches([',', ';', ' ']).to_string();
    }

    // Remove embedded player names left over in combined lines. A name
    // that IS a player name must survive intact, so keep the pre-removal
    // form around as a fallback.
    let before_removal = canonical.clone();
    for player in player_names {
        let player = player.trim();
        if player.is_empty() {
            continue;
        }
        if let Ok(re) = Regex::new(&format!(
            r"(?i)\s*(?:and|vs\.?|with)?\s*\b{}\b",
            regex::escape(player)
        )) {
            canonical = re.replace_all(&canonical, "").to_string();
        }
    }
    canonical = MULTI_SPACE_RE
        .replace_all(canonical.trim().trim_matches([',', ':', ';', '-']), " ")
        .trim()
        .to_string();
    if canonical.is_empty() {
        canonical = before_removal;
    }

    // Length backstop: cut at the last comma inside the limit
    if canonical.len() > MAX_CANONICAL_LEN {
        let mut limit = MAX_CANONICAL_LEN;
        while !canonical.is_char_boundary(limit) {
            limit -= 1;
        }
        let cut = canonical[..limit]
            .rfind(',')
            .or_else(|| canonical[..limit].rfind(' '))
            .unwrap_or(limit);
        canonical.truncate(cut);
        canonical = canonical.trim_end_matches([',', ';', ' ']).to_string();
    }

    // Shorter alias forms: parenthesized clause gone, then colon clause,
    // then trailing comma clause
    let mut aliases = Vec::new();
    let mut push_alias = |candidate: String| {
        let candidate = candidate.trim().trim_matches([',', ':', ';']).trim().to_string();
        if !candidate.is_empty()
            && candidate.to_lowercase() != canonical.to_lowercase()
            && !aliases
                .iter()
                .any(|a: &String| a.to_lowercase() == candidate.to_lowercase())
        {
            aliases.push(candidate);
        }
    };

    let no_parens = PAREN_CLAUSE_RE.replace_all(&canonical, "").trim().to_string();
    push_alias(no_parens.clone());
    if let Some((before, _)) = no_parens.split_once(':') {
        push_alias(before.to_string());
    }
    if let Some((before, _)) = no_parens.split_once(',') {
        push_alias(before.to_string());
    }
    aliases.sort_by(|a, b| b.len().cmp(&a.len()));

    NormalizedName { canonical, aliases }
}

/// Lowercase slug for id minting: "Goblin Archer" -> "goblin_archer"
fn slugify(name: &str) -> String {
    let slug = SLUG_RE
        .replace_all(&name.to_lowercase(), "_")
        .trim_matches('_')
        .to_string();
    if slug.is_empty() { "combatant".to_string() } else { slug }
}

/// Split a comma/'and'-joined narrative enemy list into individual
/// entries, expanding small spelled-out counts ("two goblins" -> two
/// "goblin" entries).
pub fn split_narrative_list(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    for part in raw.split(',').flat_map(|p| p.split(" and ")) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (count, name) = leading_count(part);
        if count > 1 {
            // Crude singularization of a counted plural
            let singular = name.strip_suffix('s').unwrap_or(name);
            for _ in 0..count {
                names.push(singular.trim().to_string());
            }
        } else {
            names.push(name.trim().to_string());
        }
    }
    names.retain(|n| !n.is_empty());
    names
}

fn leading_count(part: &str) -> (u32, &str) {
    let lower = part.to_lowercase();
    let words: &[(&str, u32)] = &[
        ("a ", 1),
        ("an ", 1),
        ("the ", 1),
        ("one ", 1),
        ("two ", 2),
        ("three ", 3),
        ("four ", 4),
        ("five ", 5),
        ("six ", 6),
    ];
    for (word, count) in words {
        if lower.starts_with(word) {
            return (*count, &part[word.len()..]);
        }
    }
    if let Some((head, rest)) = part.split_once(' ') {
        if let Ok(n) = head.parse::<u32>() {
            return (n.min(12), rest);
        }
    }
    (1, part)
}

/// Builds canonical combat rosters. Players resolve only against known PC
/// records; everything else becomes a defaulted NPC.
#[derive(Default)]
pub struct CombatRosterBuilder {
    known_players: Vec<PlayerRecord>,
    lookup: Option<Box<dyn CharacterLookup>>,
}

impl CombatRosterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known player records, matched by name before any lookup
    pub fn with_players(mut self, players: Vec<PlayerRecord>) -> Self {
        self.known_players = players;
        self
    }

    /// External character store consulted for players not in the known
    /// list
    pub fn with_lookup(mut self, lookup: Box<dyn CharacterLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Build a combat session from roster entries plus any narrative
    /// entity names the scene analyzer produced.
    pub fn build(
        &self,
        entries: &[RosterEntry],
        narrative_entities: &[String],
    ) -> Result<CombatSession> {
        let player_names: Vec<String> =
            self.known_players.iter().map(|p| p.name.clone()).collect();

        let mut combatants: Vec<CombatantState> = Vec::new();
        let mut name_index: HashMap<String, CombatantId> = HashMap::new();
        let mut canonical_counts: HashMap<String, u32> = HashMap::new();

        for entry in entries {
            if entry.name.trim().is_empty() {
                continue;
            }
            let normalized = normalize_combatant_name(&entry.name, &player_names);

            if entry.is_player || self.is_known_player(&normalized)? {
                match self.resolve_player(&normalized)? {
                    Some(record) => {
                        let combatant = self.player_combatant(&record, entry);
                        register(&mut name_index, &combatant);
                        combatants.push(combatant);
                    }
                    None => {
                        // Never synthesize an NPC for an unmatched player
                        warn!(name = %entry.name, "unmatched player entry skipped");
                    }
                }
                continue;
            }

            let combatant =
                self.npc_combatant(entry, normalized, &mut canonical_counts);
            register(&mut name_index, &combatant);
            combatants.push(combatant);
        }

        // A narrative mention of a name the roster already covers is the
        // same combatant, not a new one; names minted inside this pass
        // (expanded counts like "two goblins") still become individuals.
        let preexisting: std::collections::HashSet<String> =
            name_index.keys().cloned().collect();
        for raw in narrative_entities {
            for name in split_narrative_list(raw) {
                let normalized = normalize_combatant_name(&name, &player_names);
                let known = std::iter::once(&normalized.canonical)
                    .chain(normalized.aliases.iter())
                    .any(|n| preexisting.contains(&n.to_lowercase()));
                if known {
                    continue;
                }
                let mut entry = RosterEntry::named(&name);
                entry.hostile = Some(true);
                let combatant =
                    self.npc_combatant(&entry, normalized, &mut canonical_counts);
                register(&mut name_index, &combatant);
                combatants.push(combatant);
            }
        }

        info!(
            combatants = combatants.len(),
            aliases = name_index.len(),
            "combat roster built"
        );
        Ok(CombatSession::new(combatants, name_index))
    }

    fn is_known_player(&self, normalized: &NormalizedName) -> Result<bool> {
        for name in std::iter::once(&normalized.canonical).chain(normalized.aliases.iter()) {
            if self
                .known_players
                .iter()
                .any(|p| p.name.to_lowercase() == name.to_lowercase())
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_player(&self, normalized: &NormalizedName) -> Result<Option<PlayerRecord>> {
        for name in std::iter::once(&normalized.canonical).chain(normalized.aliases.iter()) {
            if let Some(record) = self.known_players.find_by_name(name)? {
                return Ok(Some(record));
            }
            if let Some(lookup) = &self.lookup {
                if let Some(record) = lookup.find_by_name(name)? {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    fn player_combatant(&self, record: &PlayerRecord, entry: &RosterEntry) -> CombatantState {
        let id = CombatantId::pc(&record.id);
        let max_ap = max_ap_for_level(record.level);
        let mut combatant =
            CombatantState::new(id, record.name.clone(), record.max_hp, record.ac, max_ap);
        combatant.hp = record.hp.clamp(0, record.max_hp);
        combatant.level = record.level;
        combatant.hostile = entry.hostile.unwrap_or(false);
        combatant.stats = record.stats;
        combatant.aliases = vec![record.name.clone()];
        if combatant.hp == 0 {
            combatant.is_conscious = false;
        }
        debug!(id = %combatant.id, "player combatant built");
        combatant
    }

    fn npc_combatant(
        &self,
        entry: &RosterEntry,
        normalized: NormalizedName,
        canonical_counts: &mut HashMap<String, u32>,
    ) -> CombatantState {
        let hostile = entry.hostile.unwrap_or(false);
        let hp = entry.hp.unwrap_or(DEFAULT_NPC_HP);
        let max_hp = entry.max_hp.unwrap_or(hp).max(hp);
        let ac = entry
            .ac
            .unwrap_or(if hostile { DEFAULT_ENEMY_AC } else { DEFAULT_NPC_AC });
        let level = entry.level.unwrap_or(1);
        let max_ap = max_ap_for_level(level).max(DEFAULT_ACTION_POINTS);

        // Duplicate canonical names get a numeric suffix so the alias map
        // stays unambiguous ("Goblin", "Goblin 2", ...)
        let count = canonical_counts
            .entry(normalized.canonical.to_lowercase())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        let display_name = if *count > 1 {
            format!("{} {}", normalized.canonical, count)
        } else {
            normalized.canonical.clone()
        };

        // Slug from the shortest alias, falling back to the canonical name
        let slug_source = normalized
            .aliases
            .last()
            .unwrap_or(&normalized.canonical)
            .clone();
        let short = Uuid::new_v4().simple().to_string()[..8].to_string();
        let id = CombatantId::npc(&slugify(&slug_source), &short);

        let mut combatant = CombatantState::new(id, display_name.clone(), max_hp, ac, max_ap);
        combatant.hp = hp.clamp(0, max_hp);
        combatant.level = level;
        combatant.hostile = hostile;
        combatant.stats = CombatStats {
            attack_bonus: entry.attack_bonus.unwrap_or(2),
            damage_bonus: entry.damage_bonus.unwrap_or(0),
            // Dex folds into the initiative bonus the engine rolls with
            initiative_bonus: entry.initiative_bonus.unwrap_or(0)
                + entry.dex_modifier.unwrap_or(0),
            ..CombatStats::default()
        };
        combatant.aliases = normalized.aliases;
        if *count > 1 {
            combatant.aliases.insert(0, normalized.canonical);
        }
        if combatant.hp == 0 {
            combatant.is_conscious = false;
        }
        debug!(id = %combatant.id, name = %display_name, hostile, "npc combatant built");
        combatant
    }
}

/// Register a combatant's canonical name and every alias in the shared
/// name index. First registration of a name wins.
fn register(name_index: &mut HashMap<String, CombatantId>, combatant: &CombatantState) {
    let mut names = vec![combatant.name.clone()];
    names.extend(combatant.aliases.iter().cloned());
    for name in names {
        name_index
            .entry(name.trim().to_lowercase())
            .or_insert_with(|| combatant.id.clone());
    }
}
