//! Custom ideas, national idea groups and idea cost lookup.
//!
//! Custom ideas (`common/custom_ideas/`) define how much one level of an
//! effect is worth. National ideas (`common/ideas/`, minus the basic idea
//! groups) are priced against them slot by slot.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use eu4txt::{Block, Value};
use thiserror::Error;

use crate::governments::Governments;
use crate::groups::GroupIndex;
use crate::history::Snapshot;
use crate::loader::{LoadError, LoadReport, parse_dir};

pub const CUSTOM_IDEAS_DIR: &str = "common/custom_ideas";
pub const NATIONAL_IDEAS_DIR: &str = "common/ideas";

pub const DEFAULT_MAX_LEVEL: u32 = 4;

/// Cost curve used when an idea declares no `level_cost_2`.
pub const DEFAULT_CURVE: i64 = 5;

/// Built-in cost curves, keyed by their level 2 cost. Entry `n` is the cost
/// of level `n`.
pub const IDEA_COST_DEFAULTS: &[(i64, &[i64])] = &[
    (3, &[-3, 0, 3, 9, 18, 30, 45, 63, 84, 108, 135]),
    (5, &[-5, 0, 5, 15, 30, 50, 75, 105, 140, 180, 225]),
    (15, &[-15, 0, 15, 50, 105]),
    (18, &[0, 3, 18, 45, 84]),
    (30, &[0, 5, 30, 75]),
    (50, &[0, 15, 50, 105]),
    (140, &[0, 30, 140, 330]),
];

/// Cost multiplier per slot: start, the seven ideas, then the bonus.
/// Slots past the end cost 1.0.
pub const SLOT_MULTIPLIERS: &[f64] = &[2.0, 2.0, 1.8, 1.6, 1.4, 1.2, 1.0, 1.0, 1.0];

/// Effects national ideas use that no custom idea defines, as
/// `(effect, curve, magnitude)`.
const FALLBACK_IDEAS: &[(&str, i64, f64)] = &[
    ("adm_tech_cost_modifier", 3, -0.05),
    ("caravan_power", 3, 0.1),
    ("church_power_modifier", 3, 0.05),
    ("devotion", 3, 0.5),
    ("envoy_travel_time", 3, -0.25),
    ("fabricate_claims_time", 3, -0.2),
    ("free_leader_pool", 3, 1.0),
    ("garrison_size", 3, 0.1),
    ("global_foreign_trade_power", 3, 0.1),
    ("global_heretic_missionary_strength", 3, 0.01),
    ("global_own_trade_power", 3, 0.1),
    ("global_regiment_cost", 5, -0.1),
    ("global_ship_cost", 5, -0.05),
    ("global_trade_goods_size_modifier", 3, 0.05),
    ("improve_relation_modifier", 3, 0.15),
    ("justify_trade_conflict_time", 3, -0.1),
    ("land_attrition", 3, -0.1),
    ("loot_amount", 3, 0.10),
    ("mil_tech_cost_modifier", 3, -0.05),
    ("naval_attrition", 3, -0.10),
    ("papal_influence", 3, 1.0),
    ("rebel_support_efficiency", 3, 0.20),
    ("recover_army_morale_speed", 3, 0.025),
    ("relations_decay_of_me", 3, 0.15),
    ("trade_range_modifier", 3, 0.10),
    ("unjustified_demands", 3, -0.25),
];

/// Block names inside an idea group that aren't individual ideas.
const RESERVED_BLOCKS: &[&str] = &[
    "category",
    "bonus",
    "trigger",
    "free",
    "start",
    "ai_will_do",
    "important",
];

const LEVEL_COST_PREFIX: &str = "level_cost_";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdeaError {
    #[error("no idea cost curve keyed {curve}")]
    UnknownCurve { curve: i64 },
    #[error("level {level} is not on idea cost curve {curve}")]
    UnknownLevel { curve: i64, level: i64 },
    #[error("idea '{name}' has an empty body and no earlier definition")]
    MissingIdeaBody { name: String },
    #[error("custom idea group '{group}' has no category")]
    MissingCategory { group: String },
}

/// How one level of an effect is priced.
#[derive(Debug, Clone, PartialEq)]
pub struct IdeaDefinition {
    pub category: String,
    /// The effect's value at level 1.
    pub magnitude: f64,
    pub max_level: u32,
    /// Explicit `level_cost_N` entries.
    pub level_costs: BTreeMap<u32, i64>,
}

impl IdeaDefinition {
    pub fn new(category: impl Into<String>, magnitude: f64) -> Self {
        Self {
            category: category.into(),
            magnitude,
            max_level: DEFAULT_MAX_LEVEL,
            level_costs: BTreeMap::new(),
        }
    }

    /// The built-in curve filling in levels without an explicit cost.
    pub fn curve(&self) -> i64 {
        self.level_costs.get(&2).copied().unwrap_or(DEFAULT_CURVE)
    }

    fn fallback(curve: i64, magnitude: f64) -> Self {
        let mut idea = Self::new("", magnitude);
        idea.level_costs.insert(2, curve);
        idea
    }
}

fn curve_costs(curve: i64) -> Result<&'static [i64], IdeaError> {
    IDEA_COST_DEFAULTS
        .iter()
        .find(|(key, _)| *key == curve)
        .map(|(_, costs)| *costs)
        .ok_or(IdeaError::UnknownCurve { curve })
}

/// Cost of an idea at `level`. Fractional levels interpolate linearly
/// between the neighbouring integral levels.
pub fn idea_cost(idea: &IdeaDefinition, level: f64) -> Result<f64, IdeaError> {
    let curve = idea.curve();
    let defaults = curve_costs(curve)?;
    let cost_at = |level: i64| -> Result<f64, IdeaError> {
        let own = u32::try_from(level)
            .ok()
            .and_then(|l| idea.level_costs.get(&l).copied());
        let cost = own.or_else(|| {
            usize::try_from(level)
                .ok()
                .and_then(|l| defaults.get(l).copied())
        });
        cost.map(|c| c as f64)
            .ok_or(IdeaError::UnknownLevel { curve, level })
    };

    let int_level = level.trunc() as i64;
    let cost = cost_at(int_level)?;
    let fraction = level - int_level as f64;
    if fraction == 0.0 {
        return Ok(cost);
    }
    let next = cost_at(int_level + 1)?;
    Ok(cost + (next - cost) * fraction)
}

/// An effect's definition, and whether it came from the game files.
#[derive(Debug, Clone, PartialEq)]
pub enum IdeaLookup<'a> {
    Defined(&'a IdeaDefinition),
    Fallback(IdeaDefinition),
}

impl IdeaLookup<'_> {
    pub fn definition(&self) -> &IdeaDefinition {
        match self {
            IdeaLookup::Defined(idea) => idea,
            IdeaLookup::Fallback(idea) => idea,
        }
    }
}

/// Custom ideas keyed by effect name.
#[derive(Debug, Clone, Default)]
pub struct CustomIdeas {
    ideas: BTreeMap<String, IdeaDefinition>,
}

impl CustomIdeas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the ideas of one `custom_ideas` file. Later definitions of an
    /// effect replace earlier ones.
    pub fn add_block(&mut self, block: &Block) -> Result<(), IdeaError> {
        for (group, body) in block.iter() {
            for body in body.items() {
                let Some(body) = body.as_block() else {
                    continue;
                };
                let category = body
                    .scalar("category")
                    .ok_or_else(|| IdeaError::MissingCategory {
                        group: group.to_string(),
                    })?;
                for (name, idea) in body.iter() {
                    if name == "category" {
                        continue;
                    }
                    let parsed = idea
                        .as_block()
                        .and_then(|b| parse_custom_idea(name, b, category));
                    if let Some((effect, idea)) = parsed {
                        self.ideas.insert(effect, idea);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, effect: impl Into<String>, idea: IdeaDefinition) {
        self.ideas.insert(effect.into(), idea);
    }

    pub fn get(&self, effect: &str) -> Option<&IdeaDefinition> {
        self.ideas.get(effect)
    }

    /// Looks an effect up, falling back to the built-in table.
    pub fn resolve(&self, effect: &str) -> Option<IdeaLookup<'_>> {
        if let Some(idea) = self.ideas.get(effect) {
            return Some(IdeaLookup::Defined(idea));
        }
        FALLBACK_IDEAS
            .iter()
            .find(|(name, _, _)| *name == effect)
            .map(|&(_, curve, magnitude)| IdeaLookup::Fallback(IdeaDefinition::fallback(curve, magnitude)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IdeaDefinition)> {
        self.ideas.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }
}

/// The first key of a custom idea is its effect; `level_cost_N` and
/// `max_level` may follow.
fn parse_custom_idea(name: &str, body: &Block, category: &str) -> Option<(String, IdeaDefinition)> {
    let mut pairs = body.iter();
    let (effect, magnitude) = pairs.next()?;
    let Some(magnitude) = magnitude.as_scalar().and_then(|m| m.trim().parse::<f64>().ok()) else {
        log::warn!("custom idea '{}': non-numeric magnitude for '{}'", name, effect);
        return None;
    };
    if magnitude == 0.0 {
        log::warn!("custom idea '{}': zero magnitude for '{}'", name, effect);
        return None;
    }

    let mut idea = IdeaDefinition::new(category, magnitude);
    for (key, value) in pairs {
        let number = value.as_scalar().and_then(|v| v.trim().parse::<i64>().ok());
        if let Some(level) = key.strip_prefix(LEVEL_COST_PREFIX) {
            match (level.parse::<u32>(), number) {
                (Ok(level), Some(cost)) => {
                    idea.level_costs.insert(level, cost);
                }
                _ => log::warn!("custom idea '{}': bad {} = {}", name, key, value),
            }
        } else if key == "max_level" {
            match number.and_then(|n| u32::try_from(n).ok()) {
                Some(max) => idea.max_level = max,
                None => log::warn!("custom idea '{}': bad max_level = {}", name, value),
            }
        }
    }
    Some((effect.to_string(), idea))
}

pub fn load_custom_ideas(
    game_path: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<CustomIdeas, LoadError> {
    let files = parse_dir(&game_path.join(CUSTOM_IDEAS_DIR), fail_fast, report)?;
    let mut ideas = CustomIdeas::new();
    for (path, block) in files {
        if let Err(source) = ideas.add_block(&block) {
            report.record(LoadError::Ideas { path, source }, fail_fast)?;
        }
    }
    log::info!("loaded {} custom ideas", ideas.len());
    Ok(ideas)
}

/// One effect granted by an idea slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Bonus {
    pub effect: String,
    /// The value as written in the file.
    pub raw: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdeaSlot {
    pub name: String,
    pub bonuses: Vec<Bonus>,
}

/// A national idea group: `start`, the individual ideas in order, then
/// `bonus`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdeaGroup {
    /// Name in the file, e.g. `SWE_ideas`.
    pub name: String,
    /// Lower-cased prefix before the first `_`, e.g. `swe`.
    pub key: String,
    pub trigger: Option<Block>,
    pub free: bool,
    pub slots: Vec<IdeaSlot>,
}

impl IdeaGroup {
    pub fn bonus_count(&self) -> usize {
        self.slots.iter().map(|s| s.bonuses.len()).sum()
    }
}

/// Lower-cased prefix of a group name up to its first `_`.
pub fn group_key(name: &str) -> String {
    name.split('_').next().unwrap_or(name).to_lowercase()
}

fn parse_bonuses(group: &str, body: &Block) -> Vec<Bonus> {
    let mut bonuses = Vec::new();
    for (effect, value) in body.iter() {
        let parsed = value
            .as_scalar()
            .and_then(|raw| raw.trim().parse::<f64>().ok().map(|m| (raw, m)));
        match parsed {
            Some((raw, magnitude)) => bonuses.push(Bonus {
                effect: effect.to_string(),
                raw: raw.to_string(),
                magnitude,
            }),
            None => log::debug!("{}: skipping non-numeric '{}'", group, effect),
        }
    }
    bonuses
}

/// National idea groups in file order.
#[derive(Debug, Clone, Default)]
pub struct NationalIdeas {
    groups: Vec<IdeaGroup>,
    index: HashMap<String, usize>,
    /// Last body seen per idea name, reused by later empty bodies.
    saved: HashMap<String, Block>,
}

impl NationalIdeas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the groups of one file. A group whose key is already known
    /// replaces it in place.
    pub fn add_block(&mut self, block: &Block) -> Result<(), IdeaError> {
        for (name, body) in block.iter() {
            for body in body.items() {
                if let Some(body) = body.as_block() {
                    let group = self.build_group(name, body)?;
                    self.insert(group);
                }
            }
        }
        Ok(())
    }

    fn build_group(&mut self, name: &str, body: &Block) -> Result<IdeaGroup, IdeaError> {
        let slot = |slot_name: &str| IdeaSlot {
            name: slot_name.to_string(),
            bonuses: body
                .get(slot_name)
                .and_then(Value::as_block)
                .map(|b| parse_bonuses(name, b))
                .unwrap_or_default(),
        };

        let mut slots = vec![slot("start")];
        for (idea, value) in body.iter() {
            if RESERVED_BLOCKS.contains(&idea) {
                continue;
            }
            let boni = match value {
                Value::Block(b) => {
                    self.saved.insert(idea.to_string(), b.clone());
                    b
                }
                Value::Empty => self
                    .saved
                    .get(idea)
                    .ok_or_else(|| IdeaError::MissingIdeaBody {
                        name: idea.to_string(),
                    })?,
                other => {
                    log::debug!("{}: skipping '{}' = {}", name, idea, other.describe());
                    continue;
                }
            };
            slots.push(IdeaSlot {
                name: idea.to_string(),
                bonuses: parse_bonuses(name, boni),
            });
        }
        slots.push(slot("bonus"));

        Ok(IdeaGroup {
            name: name.to_string(),
            key: group_key(name),
            trigger: body.get("trigger").and_then(Value::as_block).cloned(),
            free: body.scalar("free") == Some("yes"),
            slots,
        })
    }

    pub fn insert(&mut self, group: IdeaGroup) {
        match self.index.get(&group.key) {
            Some(&i) => self.groups[i] = group,
            None => {
                self.index.insert(group.key.clone(), self.groups.len());
                self.groups.push(group);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&IdeaGroup> {
        self.index.get(key).map(|&i| &self.groups[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IdeaGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// A country's own group, else the first group whose trigger matches it.
    pub fn for_tag(&self, context: &TriggerContext<'_>) -> Option<&IdeaGroup> {
        if let Some(group) = self.get(&context.tag.to_lowercase()) {
            return Some(group);
        }
        self.groups.iter().find(|group| {
            group
                .trigger
                .as_ref()
                .is_some_and(|trigger| matches_trigger(trigger, context))
        })
    }
}

pub fn load_national_ideas(
    game_path: &Path,
    fail_fast: bool,
    report: &mut LoadReport,
) -> Result<NationalIdeas, LoadError> {
    let files = parse_dir(&game_path.join(NATIONAL_IDEAS_DIR), fail_fast, report)?;
    let mut ideas = NationalIdeas::new();
    for (path, block) in files {
        if path.to_string_lossy().ends_with("basic_ideas.txt") {
            log::debug!("skipping basic ideas in {}", path.display());
            continue;
        }
        if let Err(source) = ideas.add_block(&block) {
            report.record(LoadError::Ideas { path, source }, fail_fast)?;
        }
    }
    log::info!("loaded {} national idea groups", ideas.len());
    Ok(ideas)
}

/// What a trigger is evaluated against: a country's starting state and the
/// lookup tables its conditions need.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub tag: &'a str,
    pub country: &'a Snapshot,
    pub cultures: &'a GroupIndex,
    pub religions: &'a GroupIndex,
    pub governments: &'a Governments,
}

impl TriggerContext<'_> {
    fn field(&self, key: &str) -> Option<&str> {
        self.country.get(key).and_then(|f| f.as_scalar())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    All,
    Any,
}

/// Evaluates a trigger block. Conditions are combined with AND; an empty
/// trigger never matches.
pub fn matches_trigger(trigger: &Block, context: &TriggerContext<'_>) -> bool {
    evaluate(trigger, context, Mode::All)
}

fn any_item(value: &Value, wanted: Option<&str>) -> bool {
    let Some(wanted) = wanted else {
        return false;
    };
    value
        .items()
        .filter_map(Value::as_scalar)
        .any(|item| item.eq_ignore_ascii_case(wanted))
}

fn evaluate(trigger: &Block, context: &TriggerContext<'_>, mode: Mode) -> bool {
    let mut any_match = false;
    let mut all_match = true;

    for (key, value) in trigger.iter() {
        let key = key.to_ascii_lowercase();
        let results: Vec<bool> = match key.as_str() {
            "tag" => vec![any_item(value, Some(context.tag))],
            "primary_culture" => vec![any_item(value, context.field("primary_culture"))],
            "culture_group" => {
                let group = context
                    .field("primary_culture")
                    .and_then(|c| context.cultures.group_of(c));
                vec![any_item(value, group)]
            }
            "religion_group" => {
                let group = context
                    .field("religion")
                    .and_then(|r| context.religions.group_of(r));
                vec![any_item(value, group)]
            }
            "government" => {
                let government = context.field("government");
                let mut found = any_item(value, government);
                if let Some(government) = government {
                    let governments = context.governments;
                    found |= governments.is_theocracy(government)
                        && any_item(value, Some("theocracy"));
                    found |= governments.is_monarchy(government)
                        && any_item(value, Some("monarchy"));
                }
                vec![found]
            }
            "technology_group" => vec![any_item(value, context.field("technology_group"))],
            "or" | "and" | "not" => value
                .items()
                .map(|item| {
                    let nested = |mode| item.as_block().is_some_and(|b| evaluate(b, context, mode));
                    match key.as_str() {
                        "or" => nested(Mode::Any),
                        "and" => nested(Mode::All),
                        _ => !nested(Mode::Any),
                    }
                })
                .collect(),
            other => {
                log::debug!("ignoring trigger condition '{}'", other);
                Vec::new()
            }
        };
        for matched in results {
            if matched {
                any_match = true;
            } else {
                all_match = false;
            }
        }
        if any_match && mode == Mode::Any {
            return true;
        }
    }
    any_match && all_match
}

/// The price of one bonus in one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BonusCost {
    pub slot: usize,
    pub effect: String,
    pub raw: String,
    /// Multiples of the custom idea's magnitude. `None` when the effect is
    /// not a custom idea.
    pub level: Option<f64>,
    pub cost: f64,
    pub exceeds_max: bool,
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

pub fn bonus_cost(ideas: &CustomIdeas, slot: usize, bonus: &Bonus) -> Result<BonusCost, IdeaError> {
    let multiplier = SLOT_MULTIPLIERS.get(slot).copied().unwrap_or(1.0);
    let mut priced = BonusCost {
        slot,
        effect: bonus.effect.clone(),
        raw: bonus.raw.clone(),
        level: None,
        cost: 0.0,
        exceeds_max: false,
    };
    let Some(lookup) = ideas.resolve(&bonus.effect) else {
        return Ok(priced);
    };
    let idea = lookup.definition();
    let level = round6(bonus.magnitude / idea.magnitude);
    priced.cost = idea_cost(idea, level)? * multiplier;
    if let IdeaLookup::Defined(idea) = lookup {
        priced.level = Some(level);
        priced.exceeds_max = level > f64::from(idea.max_level);
    }
    Ok(priced)
}

/// Every bonus of a group priced, with the total.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCost {
    pub key: String,
    pub bonuses: Vec<BonusCost>,
    pub total: f64,
}

impl GroupCost {
    /// `+` a bonus above its max level, `*` a bonus without a custom idea,
    /// `>` more than 10 bonuses.
    pub fn markers(&self) -> String {
        let mut markers = String::new();
        if self.bonuses.iter().any(|b| b.exceeds_max) {
            markers.push('+');
        }
        if self.bonuses.iter().any(|b| b.level.is_none()) {
            markers.push('*');
        }
        if self.bonuses.len() > 10 {
            markers.push('>');
        }
        markers
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.key, self.markers())
    }
}

pub fn group_cost(ideas: &CustomIdeas, group: &IdeaGroup) -> Result<GroupCost, IdeaError> {
    let mut bonuses = Vec::with_capacity(group.bonus_count());
    for (slot, idea_slot) in group.slots.iter().enumerate() {
        for bonus in &idea_slot.bonuses {
            bonuses.push(bonus_cost(ideas, slot, bonus)?);
        }
    }
    let total = bonuses.iter().map(|b| b.cost).sum();
    Ok(GroupCost {
        key: group.key.clone(),
        bonuses,
        total,
    })
}
