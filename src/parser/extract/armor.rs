use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::FamilyOutput;
use crate::config::ArmorSection;
use crate::model::{Armor, ArmorData, DexBonus, EntityKind, ParseIssue, ParsedEntity};
use crate::parser::blocks::region_bounds;
use crate::parser::decode::{self, is_placeholder};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::slugify;

static BASE_AC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?(\d+)").unwrap());
static DEX_MAX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(max\.\s*(\d+)\)").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());

/// `12 + GES-Modifikator (max. 2)` → base 12, dex capped at 2. A leading `+`
/// marks an AC bonus (shields).
pub fn armor_class(raw: &str) -> (Option<u32>, ArmorData) {
    let raw = raw.trim();
    let base = BASE_AC_RE
        .captures(raw)
        .and_then(|c| c[1].parse().ok());
    let data = ArmorData {
        dex_bonus: DexBonus {
            apply: raw.contains("GES"),
            max: DEX_MAX_RE.captures(raw).and_then(|c| c[1].parse().ok()),
        },
        ac_bonus: raw.starts_with('+'),
    };
    (base, data)
}

fn section_for<'a>(line: &str, sections: &'a [ArmorSection]) -> Option<&'a ArmorSection> {
    sections.iter().find(|s| line.starts_with(s.marker.as_str()))
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let tables = &rules.tables;
    let (lo, hi) = region_bounds(doc, &tables.armor);
    let mut out = FamilyOutput::default();
    let mut section: Option<&ArmorSection> = None;

    for idx in lo..hi {
        let line = doc.lines[idx].as_str();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = tables.armor_row.captures(line) else {
            if let Some(s) = section_for(line, &tables.armor_sections) {
                debug!(section = %s.marker, line = idx, "Armor section");
                section = Some(s);
            }
            continue;
        };

        let name = caps["name"].trim().to_string();
        let mut issues = Vec::new();

        // A row named like a section (the shield) is its own category.
        let category = tables
            .armor_sections
            .iter()
            .find(|s| s.marker == name)
            .or(section)
            .map(|s| s.category.clone());
        if category.is_none() {
            issues.push(ParseIssue::new("category", &name));
        }

        let (base_ac, data) = armor_class(&caps["ac"]);
        if base_ac.is_none() {
            issues.push(ParseIssue::new("base_ac", &caps["ac"]));
        }

        let strength_raw = &caps["strength"];
        let strength_requirement = if is_placeholder(strength_raw) {
            None
        } else {
            let value = DIGITS_RE.captures(strength_raw).and_then(|c| c[1].parse().ok());
            if value.is_none() {
                issues.push(ParseIssue::new("strength_requirement", strength_raw));
            }
            value
        };

        let weight_raw = &caps["weight"];
        let weight_kg = decode::mass(weight_raw);
        if weight_kg.is_none() && !is_placeholder(weight_raw) {
            issues.push(ParseIssue::new("weight_kg", weight_raw));
        }
        let cost_gp = decode::currency(&caps["cost"], &rules.decode.currency);
        if cost_gp.is_none() {
            issues.push(ParseIssue::new("cost_gp", &caps["cost"]));
        }

        out.entities.push(ParsedEntity::Armor(Armor {
            id: slugify(&name),
            name,
            category: category.unwrap_or_default(),
            base_ac,
            strength_requirement,
            stealth_disadvantage: &caps["stealth"] == "Nachteil",
            weight_kg,
            cost_gp,
            data,
            source_page: doc.page(idx),
            issues,
        }));
    }

    debug!(kind = %EntityKind::Armor, count = out.entities.len(), "Parsed armor table");
    out
}

// ── Tests ──
