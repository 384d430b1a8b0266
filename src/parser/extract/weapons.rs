use tracing::debug;

use super::FamilyOutput;
use crate::config::WeaponSection;
use crate::model::{EntityKind, ParseIssue, ParsedEntity, Weapon, WeaponData};
use crate::parser::blocks::region_bounds;
use crate::parser::decode::{self, is_placeholder};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::slugify;

/// Section line such as `Einfache Nahkampfwaffen` that sets the category of following rows.
fn section_for<'a>(line: &str, sections: &'a [WeaponSection]) -> Option<&'a WeaponSection> {
    sections.iter().find(|s| line.starts_with(s.marker.as_str()))
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let tables = &rules.tables;
    let (lo, hi) = region_bounds(doc, &tables.weapons);
    let mut out = FamilyOutput::default();
    let mut section: Option<&WeaponSection> = None;

    for idx in lo..hi {
        let line = doc.lines[idx].as_str();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = tables.weapon_row.captures(line) else {
            if let Some(s) = section_for(line, &tables.weapon_sections) {
                debug!(section = %s.marker, line = idx, "Weapon section");
                section = Some(s);
            }
            continue;
        };

        let name = caps["name"].trim().to_string();
        let mut issues = Vec::new();

        let damage = decode::damage(&caps["damage"]);
        if damage.is_none() {
            issues.push(ParseIssue::new("damage", &caps["damage"]));
        }

        let props = decode::properties(&caps["props"], &rules.decode.properties);
        for unknown in &props.unknown {
            issues.push(ParseIssue::new("properties", unknown));
        }

        let mastery = decode::lookup(&rules.decode.masteries, &caps["mastery"]).map(str::to_string);

        let weight_raw = &caps["weight"];
        let weight_kg = decode::mass(weight_raw);
        if weight_kg.is_none() && !is_placeholder(weight_raw) {
            issues.push(ParseIssue::new("weight_kg", weight_raw));
        }
        let cost_gp = decode::currency(&caps["cost"], &rules.decode.currency);
        if cost_gp.is_none() {
            issues.push(ParseIssue::new("cost_gp", &caps["cost"]));
        }

        let (category, weapon_type) = match section {
            Some(s) => (s.category.clone(), s.weapon_type.clone()),
            None => {
                issues.push(ParseIssue::new("category", &name));
                (String::new(), String::new())
            }
        };

        out.entities.push(ParsedEntity::Weapon(Weapon {
            id: slugify(&name),
            name,
            category,
            weapon_type,
            damage,
            weight_kg,
            cost_gp,
            data: WeaponData {
                properties: props.tags,
                mastery,
                range: props.range,
                thrown_range: props.thrown_range,
                versatile_damage: props.versatile_damage,
                ammunition_type: props.ammunition_type,
            },
            source_page: doc.page(idx),
            issues,
        }));
    }

    debug!(kind = %EntityKind::Weapon, count = out.entities.len(), "Parsed weapon table");
    out
}

// ── Tests ──
