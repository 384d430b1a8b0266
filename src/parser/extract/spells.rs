use std::sync::LazyLock;

use regex::Regex;

use super::{walk_family, FamilyOutput};
use crate::model::{ParseIssue, ParsedEntity, Scaling, ScalingKind, Spell, SpellData, SummonStats};
use crate::parser::fields::{truncate_leak, BlockText};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::{slugify, split_top_level, titlecase};

static LEVELED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<school>\p{L}+zauber)\s+(?P<level>\d+|I+)\.\s+Grades?\s*\((?P<classes>[^)]*)\)")
        .unwrap()
});
static CANTRIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Zaubertrick\s+der\s+(?P<school>\p{L}+)\s*\((?P<classes>[^)]*)\)").unwrap()
});
static MATERIAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"M\s*\(([^)]+)\)").unwrap());
static DICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+W\d+").unwrap());
static SUMMON_AC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^RK\s+(.+)$").unwrap());
static SUMMON_HP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^TP\s+(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct TypeLine {
    pub level: u8,
    pub school: String,
    pub classes: Vec<String>,
}

/// `Hervorrufungszauber 3. Grades (Magier, Zauberer)` or
/// `Zaubertrick der Hervorrufung (Magier)`.
pub fn parse_type_line(line: &str) -> Option<TypeLine> {
    if let Some(caps) = LEVELED_RE.captures(line) {
        let raw = &caps["level"];
        let level = if raw.chars().all(|c| c == 'I') {
            u8::try_from(raw.len()).ok()?
        } else {
            raw.parse().ok()?
        };
        if !(1..=9).contains(&level) {
            return None;
        }
        return Some(TypeLine {
            level,
            school: caps["school"].to_string(),
            classes: split_top_level(&caps["classes"], ','),
        });
    }
    let caps = CANTRIP_RE.captures(line)?;
    Some(TypeLine {
        level: 0,
        school: school_name(&caps["school"]),
        classes: split_top_level(&caps["classes"], ','),
    })
}

/// Cantrip type lines name the school as a noun; map it to the spell-school word.
fn school_name(noun: &str) -> String {
    let base = noun
        .strip_suffix("smagie")
        .or_else(|| noun.strip_suffix("magie"))
        .unwrap_or(noun);
    match base {
        "Bann" | "Erkenntnis" | "Nekromantie" => format!("{base}zauber"),
        b if b.ends_with("ung") || b.ends_with("ion") => format!("{base}szauber"),
        _ => format!("{base}zauber"),
    }
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let walked = walk_family(doc, &rules.spells, &rules.segment);
    let mut out = FamilyOutput {
        failures: walked.failures,
        ..FamilyOutput::default()
    };

    for text in &walked.texts {
        match build(text, rules, &walked.headers) {
            Some(spell) => out.entities.push(ParsedEntity::Spell(spell)),
            None => out.failures.push(super::BlockFailure {
                kind: rules.spells.kind,
                header: text.header.clone(),
                line: text.line,
                reason: format!(
                    "type line not understood: {}",
                    text.type_line.as_deref().unwrap_or_default()
                ),
            }),
        }
    }
    out
}

fn build(text: &BlockText, rules: &Rules, headers: &[String]) -> Option<Spell> {
    let type_line = parse_type_line(text.type_line.as_deref()?)?;
    let labels = &rules.spells.labels;
    let field = |i: usize| labels.get(i).and_then(|l| text.field(l)).map(str::to_string);

    let casting_time = field(0);
    let range = field(1);
    let components = field(2);
    let duration = field(3);

    let mut issues = Vec::new();
    for (name, value) in [
        ("casting_time", &casting_time),
        ("range", &range),
        ("components", &components),
        ("duration", &duration),
    ] {
        if value.is_none() {
            issues.push(ParseIssue::new(name, "missing"));
        }
    }

    let min_len = rules.leak_min_name_len;
    let description = truncate_leak(&text.description, &text.header, headers, min_len);
    let higher_levels = text
        .scaling
        .as_deref()
        .map(|s| truncate_leak(s, &text.header, headers, min_len))
        .filter(|s| !s.is_empty());

    let name = titlecase(&text.header);
    Some(Spell {
        id: slugify(&name),
        name,
        level: type_line.level,
        school: type_line.school,
        classes: type_line.classes,
        ritual: casting_time
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains("ritual")),
        concentration: duration.as_deref().is_some_and(|d| {
            let d = d.to_lowercase();
            d.contains("konzentration") || d.contains("concentration")
        }),
        data: SpellData {
            material: components
                .as_deref()
                .and_then(|c| MATERIAL_RE.captures(c))
                .map(|c| c[1].trim().to_string()),
            scaling: higher_levels.as_deref().map(|s| scaling(s, type_line.level)),
            summon: summon_stats(&text.summon),
            summon_text: (!text.summon.is_empty()).then(|| text.summon.join("\n")),
        },
        casting_time,
        range,
        components,
        duration,
        description,
        higher_levels,
        source_page: text.source_page,
        issues,
    })
}

pub fn scaling(text: &str, level: u8) -> Scaling {
    let lower = text.to_lowercase();
    let dice = DICE_RE.find(text).map(|m| m.as_str().to_string());
    let kind = if lower.contains("wertekasten") || lower.contains("zaubergrad") {
        ScalingKind::SpellLevelRef
    } else if dice.is_some() && level == 0 {
        ScalingKind::CantripScaling
    } else if dice.is_some() {
        ScalingKind::Damage
    } else {
        ScalingKind::Text
    };
    Scaling {
        text: text.to_string(),
        kind,
        dice,
    }
}

fn summon_stats(lines: &[String]) -> Option<SummonStats> {
    if lines.is_empty() {
        return None;
    }
    let first = |re: &Regex| {
        lines
            .iter()
            .find_map(|l| re.captures(l).map(|c| c[1].trim().to_string()))
    };
    Some(SummonStats {
        ac: first(&SUMMON_AC_RE),
        hp: first(&SUMMON_HP_RE),
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::parser::normalize::normalize;

    fn spells(text: &str) -> (Vec<Spell>, usize) {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = normalize(text, &rules.normalize);
        let out = extract(&doc, &rules);
        let spells = out
            .entities
            .into_iter()
            .filter_map(|e| match e {
                ParsedEntity::Spell(s) => Some(s),
                _ => None,
            })
            .collect();
        (spells, out.failures.len())
    }

    #[test]
    fn type_lines() {
        let t = parse_type_line("Hervorrufungszauber 3. Grades (Magier, Zauberer)").unwrap();
        assert_eq!(t.level, 3);
        assert_eq!(t.school, "Hervorrufungszauber");
        assert_eq!(t.classes, vec!["Magier", "Zauberer"]);

        let t = parse_type_line("Bannzauber II. Grades (Kleriker)").unwrap();
        assert_eq!(t.level, 2);

        let t = parse_type_line("Zaubertrick der Hervorrufung (Magier)").unwrap();
        assert_eq!((t.level, t.school.as_str()), (0, "Hervorrufungszauber"));
        let t = parse_type_line("Zaubertrick der Bannmagie (Kleriker)").unwrap();
        assert_eq!(t.school, "Bannzauber");

        assert!(parse_type_line("Verzauberungszauber ohne Grad").is_none());
        assert!(parse_type_line("Bannzauber 12. Grades (Kleriker)").is_none());
    }

    #[test]
    fn spell_records() {
        let text = "\
BESCHREIBUNGEN DER ZAUBER
FEUERBLITZ
Zaubertrick der Hervorrufung (Magier, Zauberer)
Zeitaufwand: Aktion
Reichweite: 36 Meter
Komponenten: V, G
Wirkungsdauer: Unmittelbar
Du schleuderst einen Feuerfleck auf eine Kreatur.
Zaubertrick-Aufwertung: Der Schaden steigt um 1W10 auf den Stufen 5, 11 und 17.
ALARM
Bannzauber 1. Grades (Magier, Waldläufer)
Zeitaufwand: 1 Minute oder Ritual
Reichweite: 9 Meter
Komponenten: V, G, M (eine Glocke und Silberdraht)
Wirkungsdauer: Konzentration, bis zu 8 Stunden
Du richtest einen Alarm gegen Eindringlinge ein. FEUERBLITZ Zaubertrick der Hervorrufung
";
        let (spells, failures) = spells(text);
        assert_eq!(failures, 0);
        assert_eq!(spells.len(), 2);

        let bolt = &spells[0];
        assert_eq!(bolt.id, "feuerblitz");
        assert_eq!(bolt.name, "Feuerblitz");
        assert_eq!(bolt.level, 0);
        let scaling = bolt.data.scaling.as_ref().unwrap();
        assert_eq!(scaling.kind, ScalingKind::CantripScaling);
        assert_eq!(scaling.dice.as_deref(), Some("1W10"));

        let alarm = &spells[1];
        assert!(alarm.ritual);
        assert!(alarm.concentration);
        assert_eq!(alarm.data.material.as_deref(), Some("eine Glocke und Silberdraht"));
        assert_eq!(alarm.description, "Du richtest einen Alarm gegen Eindringlinge ein.");
        assert!(alarm.issues.is_empty());
    }

    #[test]
    fn missing_type_line_yields_failure_not_entity() {
        let text = "\
SCHLAF
Verzauberungszauber ohne Grad
Zeitaufwand: Aktion
Reichweite: 27 Meter
Wirkungsdauer: 1 Minute
";
        let (spells, failures) = spells(text);
        assert!(spells.is_empty());
        assert_eq!(failures, 1);
    }

    #[test]
    fn unreadable_type_line_reports_header_line() {
        let text = "\
BESCHREIBUNGEN DER ZAUBER
ALARM
Bannzauber 1. Grades (Magier)
Zeitaufwand: Aktion
Wirkungsdauer: 8 Stunden
Du richtest einen Alarm ein.
BANNKREIS
Bannzauber 12. Grades (Kleriker)
Zeitaufwand: Aktion
Wirkungsdauer: 1 Stunde
Ein Kreis aus Licht.
";
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = normalize(text, &rules.normalize);
        let out = extract(&doc, &rules);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].header, "BANNKREIS");
        assert_eq!(out.failures[0].line, 6);
        assert!(out.failures[0].reason.starts_with("type line not understood"));
    }

    #[test]
    fn summon_stat_block() {
        let lines = vec![
            "WERTEKASTEN: ABERRATIONSGEIST".to_string(),
            "RK 11 + Zaubergrad".to_string(),
            "TP 40 + 10 für jeden Grad ab 4".to_string(),
        ];
        let stats = summon_stats(&lines).unwrap();
        assert_eq!(stats.ac.as_deref(), Some("11 + Zaubergrad"));
        assert_eq!(stats.hp.as_deref(), Some("40 + 10 für jeden Grad ab 4"));
        assert_eq!(scaling("Verwende den Zaubergrad.", 4).kind, ScalingKind::SpellLevelRef);
    }
}
