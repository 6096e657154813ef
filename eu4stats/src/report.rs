//! Text reports written by the `stats` and `ideas` commands.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use eu4data::ideas::{self, GroupCost, IdeaGroup};
use eu4data::{GameData, Snapshot, SnapshotDate};

/// Country fields copied into the stats table.
pub const COUNTRY_LABELS: &[&str] = &[
    "government",
    "government_rank",
    "technology_group",
    "religion",
    "primary_culture",
    "accepted_culture",
    "capital",
];

/// Province fields summed over each country's provinces.
pub const PROVINCE_LABELS: &[&str] = &["base_tax", "base_production", "base_manpower"];

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn field_text(snapshot: &Snapshot, key: &str) -> String {
    snapshot.get(key).map(|f| f.to_string()).unwrap_or_default()
}

/// One row per country owning at least one province at `when`, sorted by tag.
pub fn write_stats(out: &mut impl Write, data: &GameData, when: SnapshotDate) -> Result<()> {
    let mut owned: BTreeMap<String, Vec<Snapshot>> = BTreeMap::new();
    for (id, province) in data.provinces.iter() {
        let snapshot = province
            .at(when)
            .with_context(|| format!("province {}", id))?;
        let owner = snapshot
            .get("owner")
            .and_then(|f| f.as_scalar())
            .map(str::to_uppercase);
        if let Some(owner) = owner {
            owned.entry(owner).or_default().push(snapshot);
        }
    }

    let header: Vec<&str> = ["tag", "name"]
        .iter()
        .chain(COUNTRY_LABELS)
        .chain(&["provinces"])
        .chain(PROVINCE_LABELS)
        .copied()
        .collect();
    writeln!(out, "{}", header.join("\t"))?;

    for (tag, country) in data.countries.iter() {
        let Some(provinces) = owned.get(tag.as_str()) else {
            continue;
        };
        let snapshot = country
            .at(when)
            .with_context(|| format!("country {}", tag))?;

        let mut row = vec![tag.to_string(), country.name().to_string()];
        row.extend(COUNTRY_LABELS.iter().map(|label| field_text(&snapshot, label)));
        row.push(provinces.len().to_string());
        for label in PROVINCE_LABELS {
            let total: f64 = provinces
                .iter()
                .filter_map(|p| p.get(*label).and_then(|f| f.as_number()))
                .sum();
            row.push(format_number(total));
        }
        writeln!(out, "{}", row.join("\t"))?;
    }
    Ok(())
}

/// Picks the group for `query`: an idea group key, else a country's ideas.
pub fn find_group<'a>(data: &'a GameData, query: &str) -> Result<&'a IdeaGroup> {
    if let Some(group) = data.national_ideas.get(&query.to_lowercase()) {
        return Ok(group);
    }
    data.ideas_for_tag(query)?
        .with_context(|| format!("no national ideas apply to {}", query))
}

pub fn write_group_costs(out: &mut impl Write, cost: &GroupCost) -> Result<()> {
    for bonus in &cost.bonuses {
        let level = match bonus.level {
            Some(level) => format!("{:6.2}", level),
            None => format!("{:>6}", "-"),
        };
        writeln!(
            out,
            "{}: {:>36} {:>6}({}) {:>6.2}",
            bonus.slot, bonus.effect, bonus.raw, level, bonus.cost
        )?;
    }
    writeln!(out, "-------------------")?;
    writeln!(out, "Total: {:.2}", cost.total)?;
    Ok(())
}

pub fn write_ideas_for(out: &mut impl Write, data: &GameData, query: &str) -> Result<()> {
    let group = find_group(data, query)?;
    let cost = ideas::group_cost(&data.custom_ideas, group)
        .with_context(|| format!("pricing {}", group.name))?;
    writeln!(out, "{} ({})", group.name, cost.label())?;
    write_group_costs(out, &cost)
}

/// Every group's total, cheapest first; groups with equal totals share a line.
pub fn write_idea_totals(out: &mut impl Write, data: &GameData) -> Result<()> {
    writeln!(out, "Legend:")?;
    writeln!(out, "\t> Has more than 10 ideas.")?;
    writeln!(out, "\t+ At least one idea past maximum allowed level.")?;
    writeln!(out, "\t* Has an idea that is not a custom idea.")?;
    writeln!(out)?;

    // keyed by total in hundredths, so equal printed totals group together
    let mut by_total: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for group in data.national_ideas.iter() {
        match ideas::group_cost(&data.custom_ideas, group) {
            Ok(cost) => by_total
                .entry((cost.total * 100.0).round() as i64)
                .or_default()
                .push(cost.label()),
            Err(e) => log::warn!("skipping {}: {}", group.name, e),
        }
    }
    for (cents, labels) in by_total {
        writeln!(out, "{:.2} {}", cents as f64 / 100.0, labels.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eu4data::ideas::BonusCost;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn test_group_cost_rows() {
        let cost = GroupCost {
            key: "swe".to_string(),
            bonuses: vec![
                BonusCost {
                    slot: 0,
                    effect: "land_morale".to_string(),
                    raw: "0.1".to_string(),
                    level: Some(2.0),
                    cost: 10.0,
                    exceeds_max: false,
                },
                BonusCost {
                    slot: 1,
                    effect: "made_up".to_string(),
                    raw: "1".to_string(),
                    level: None,
                    cost: 0.0,
                    exceeds_max: false,
                },
            ],
            total: 10.0,
        };
        let mut out = Vec::new();
        write_group_costs(&mut out, &cost).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            format!("0: {:>36}    0.1(  2.00)  10.00", "land_morale")
        );
        assert_eq!(lines[1], format!("1: {:>36}      1(     -)   0.00", "made_up"));
        assert_eq!(lines[3], "Total: 10.00");
    }
}
