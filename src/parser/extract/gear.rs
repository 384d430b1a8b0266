use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::FamilyOutput;
use crate::model::{EntityKind, Gear, GearData, ParseIssue, ParsedEntity};
use crate::parser::blocks::region_bounds;
use crate::parser::decode::{self, is_placeholder};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::{Rules, TableRules};
use crate::utils::{collapse_whitespace, is_upper_line, slugify};

/// `ÖL (1 SM) Du kannst eine Flasche Öl ...` opens a gear description paragraph.
static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>\p{Lu}[\p{Lu}ß\s,'-]*\p{Lu})\s*\((?P<cost>[^)]*)\)\s*(?P<rest>.*)$").unwrap()
});

fn skipped(name: &str, tables: &TableRules) -> bool {
    is_upper_line(name) || tables.gear_skip_words.iter().any(|w| name.contains(w.as_str()))
}

/// Slug of the name without any parenthetical, e.g. `Öl (Flasche)` → `oel`.
fn base_slug(name: &str) -> String {
    slugify(name.split('(').next().unwrap_or(name))
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let tables = &rules.tables;
    let (lo, hi) = region_bounds(doc, &tables.gear);
    let mut out = FamilyOutput::default();
    let mut gear: Vec<Gear> = Vec::new();
    let mut seen = HashSet::new();

    for idx in lo..hi {
        let line = doc.lines[idx].as_str();
        let Some(caps) = tables.gear_row.captures(line) else {
            continue;
        };
        let name = caps["name"].trim().to_string();
        if skipped(&name, tables) {
            continue;
        }
        if !seen.insert(name.clone()) {
            debug!(name = %name, line = idx, "Repeated gear row skipped");
            continue;
        }

        let mut issues = Vec::new();
        let weight_raw = &caps["weight"];
        let weight_kg = decode::mass(weight_raw);
        if weight_kg.is_none() && !is_placeholder(weight_raw) {
            issues.push(ParseIssue::new("weight_kg", weight_raw));
        }
        let cost_gp = decode::currency(&caps["cost"], &rules.decode.currency);
        if cost_gp.is_none() {
            issues.push(ParseIssue::new("cost_gp", &caps["cost"]));
        }

        gear.push(Gear {
            id: slugify(&name),
            name,
            description: None,
            cost_gp,
            weight_kg,
            category: tables.gear_category.clone(),
            data: GearData {
                weight_varies: weight_raw.eq_ignore_ascii_case("variiert"),
            },
            source_page: doc.page(idx),
            issues,
        });
    }

    attach_descriptions(doc, lo, hi, tables, &mut gear);
    debug!(kind = %EntityKind::Gear, count = gear.len(), "Parsed gear table");
    out.entities = gear.into_iter().map(ParsedEntity::Gear).collect();
    out
}

/// Upper-case names that open a description paragraph inside `[lo, hi)`.
pub fn description_names(doc: &RawDocument, lo: usize, hi: usize) -> Vec<String> {
    doc.lines[lo..hi.min(doc.len())]
        .iter()
        .filter_map(|line| DESCRIPTION_RE.captures(line).map(|c| c["name"].trim().to_string()))
        .collect()
}

/// Attach each `NAME (cost) text` paragraph to the gear row with the same slug.
fn attach_descriptions(doc: &RawDocument, lo: usize, hi: usize, tables: &TableRules, gear: &mut [Gear]) {
    let mut by_slug: HashMap<String, usize> = HashMap::new();
    for (i, g) in gear.iter().enumerate() {
        by_slug.entry(g.id.clone()).or_insert(i);
    }
    for (i, g) in gear.iter().enumerate() {
        by_slug.entry(base_slug(&g.name)).or_insert(i);
    }

    let mut current: Option<(usize, Vec<String>)> = None;

    for idx in lo..hi {
        let line = doc.lines[idx].as_str();
        if let Some(caps) = DESCRIPTION_RE.captures(line) {
            flush(&mut current, gear);
            let slug = slugify(&caps["name"]);
            current = by_slug.get(&slug).map(|&i| (i, vec![caps["rest"].to_string()]));
            continue;
        }
        if line.is_empty() || tables.gear_row.is_match(line) {
            flush(&mut current, gear);
            continue;
        }
        if let Some((_, parts)) = current.as_mut() {
            parts.push(line.to_string());
        }
    }
    flush(&mut current, gear);
}

fn flush(current: &mut Option<(usize, Vec<String>)>, gear: &mut [Gear]) {
    if let Some((i, parts)) = current.take() {
        let text = collapse_whitespace(&parts.join(" "));
        if !text.is_empty() && gear[i].description.is_none() {
            gear[i].description = Some(text);
        }
    }
}

// ── Tests ──
