use std::sync::LazyLock;

use regex::Regex;

use super::{split_alternatives, split_list, walk_family, FamilyOutput};
use crate::config::Denomination;
use crate::model::{
    Background, BackgroundData, EquipmentOption, FeatRef, ParseIssue, ParsedEntity, ToolProficiency,
};
use crate::parser::decode;
use crate::parser::fields::{truncate_leak, BlockText};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::{slugify, titlecase};

static SEE_ALSO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\(siehe[^)]*\)").unwrap());
static OPTION_MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([A-Z])\)").unwrap());
static CHOICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^wähle\s+(?:eine|einen|ein)\s+(?:art\s+(?:von\s+)?)?(?P<cat>.+?)(?:\s+aus)?\.?$")
        .unwrap()
});

/// `Begabt (siehe Kapitel 5)` → feat `begabt`.
pub fn feat(raw: &str) -> Option<FeatRef> {
    let name = SEE_ALSO_RE.replace_all(raw, "");
    let name = name.trim().trim_end_matches('.').trim();
    if name.is_empty() {
        return None;
    }
    Some(FeatRef {
        id: slugify(name),
        name: name.to_string(),
    })
}

/// `Wähle eine Art von Spielset aus` is a choice; anything else names the tool.
pub fn tool_proficiency(raw: &str) -> ToolProficiency {
    let raw = raw.trim();
    if let Some(caps) = CHOICE_RE.captures(raw) {
        return ToolProficiency::Choice {
            category: caps["cat"].trim().to_string(),
        };
    }
    ToolProficiency::Fixed {
        name: raw.trim_end_matches('.').to_string(),
        id: None,
    }
}

/// `Wähle A oder B: (A) Spielset, Parfüm, 29 GM; oder (B) 50 GM`.
/// Coin entries become the option's gold; the rest stay raw until resolution.
pub fn equipment_options(raw: &str, currency: &[Denomination]) -> Vec<EquipmentOption> {
    let marks: Vec<(usize, usize, String)> = OPTION_MARK_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), caps[1].to_string()))
        })
        .collect();

    let bodies: Vec<(String, &str)> = if marks.is_empty() {
        vec![("A".to_string(), raw)]
    } else {
        marks
            .iter()
            .enumerate()
            .map(|(n, (_, body_start, label))| {
                let body_end = marks.get(n + 1).map(|(next, _, _)| *next).unwrap_or(raw.len());
                (label.clone(), &raw[*body_start..body_end])
            })
            .collect()
    };

    bodies
        .into_iter()
        .map(|(label, body)| option(label, clean_option_body(body), currency))
        .collect()
}

/// Drop the trailing `; oder` that joins one option to the next.
fn clean_option_body(body: &str) -> &str {
    let mut body = body.trim();
    loop {
        let trimmed = body.trim_end_matches(['.', ';', ',']).trim_end();
        let trimmed = match trimmed.strip_suffix("oder") {
            Some(rest) if rest.is_empty() || rest.ends_with([' ', ';']) => rest.trim_end(),
            _ => trimmed,
        };
        if trimmed == body {
            return body;
        }
        body = trimmed;
    }
}

fn option(label: String, body: &str, currency: &[Denomination]) -> EquipmentOption {
    let mut out = EquipmentOption {
        label,
        ..EquipmentOption::default()
    };
    for item in split_list(body) {
        match decode::currency(&item, currency) {
            Some(gp) => *out.gold_gp.get_or_insert(0.0) += gp,
            None => out.raw_items.push(item),
        }
    }
    out
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let walked = walk_family(doc, &rules.backgrounds, &rules.segment);
    let mut out = FamilyOutput {
        failures: walked.failures,
        ..FamilyOutput::default()
    };
    for text in &walked.texts {
        out.entities
            .push(ParsedEntity::Background(build(text, rules, &walked.headers)));
    }
    out
}

fn build(text: &BlockText, rules: &Rules, headers: &[String]) -> Background {
    let labels = &rules.background_labels;
    let name = titlecase(&text.header);
    let mut issues = Vec::new();

    let mut ability_scores = Vec::new();
    for ability in text.field(&labels.abilities).map(split_alternatives).unwrap_or_default() {
        match decode::lookup(&rules.decode.abilities, &ability) {
            Some(code) => ability_scores.push(code.to_string()),
            None => issues.push(ParseIssue::new("ability_scores", &ability)),
        }
    }

    let feat_ref = text.field(&labels.feat).and_then(|raw| {
        let parsed = feat(raw);
        if parsed.is_none() {
            issues.push(ParseIssue::new("feat", raw));
        }
        parsed
    });

    Background {
        id: slugify(&name),
        name,
        description: truncate_leak(&text.description, &text.header, headers, rules.leak_min_name_len),
        data: BackgroundData {
            ability_scores,
            feat: feat_ref,
            skills: text.field(&labels.skills).map(split_list).unwrap_or_default(),
            tool: text.field(&labels.tool).map(tool_proficiency),
            starting_equipment: text
                .field(&labels.equipment)
                .map(|raw| equipment_options(raw, &rules.decode.currency))
                .unwrap_or_default(),
        },
        source_page: text.source_page,
        unresolved: Vec::new(),
        issues,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecodeSettings, Settings};
    use crate::parser::normalize::normalize;

    const BACKGROUNDS: &str = "\
HINTERGRUNDBESCHREIBUNGEN
ADLIGER
Attributswerte: Stärke, Intelligenz, Charisma
Talent: Begabt (siehe Kapitel 5)
Fertigkeitsgeübtheiten: Geschichte und Überzeugen
Werkzeuggeübtheit: Wähle eine Art von Spielset aus
Ausrüstung: Wähle A oder B: (A) Spielset, feine Kleidung, Parfüm, 29 GM; oder
(B) 50 GM
Du wurdest in einer Burg aufgezogen, umgeben von Reichtum.
SCHREIBER
Attributswerte: Geschicklichkeit, Intelligenz, Weisheit
Talent: Geschickt
Fertigkeitsgeübtheiten: Motiv erkennen und Wahrnehmung
Werkzeuggeübtheit: Kalligrafieutensilien
Ausrüstung: Wähle A oder B: (A) Kalligrafieutensilien, feine Kleidung, Lampe, Öl (drei Flaschen), Pergament (zwölf Bögen), 23 GM; oder (B) 50 GM
Du hast deine prägenden Jahre in einem Skriptorium verbracht.
SPEZIESBESCHREIBUNGEN
";

    fn backgrounds() -> Vec<Background> {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = normalize(BACKGROUNDS, &rules.normalize);
        extract(&doc, &rules)
            .entities
            .into_iter()
            .filter_map(|e| match e {
                ParsedEntity::Background(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn background_fields() {
        let backgrounds = backgrounds();
        assert_eq!(backgrounds.len(), 2);

        let noble = &backgrounds[0];
        assert_eq!(noble.id, "adliger");
        assert_eq!(noble.data.ability_scores, vec!["STR", "INT", "CHA"]);
        assert_eq!(
            noble.data.feat,
            Some(FeatRef { id: "begabt".into(), name: "Begabt".into() })
        );
        assert_eq!(noble.data.skills, vec!["Geschichte", "Überzeugen"]);
        assert_eq!(
            noble.data.tool,
            Some(ToolProficiency::Choice { category: "Spielset".into() })
        );
        assert_eq!(noble.description, "Du wurdest in einer Burg aufgezogen, umgeben von Reichtum.");

        let options = &noble.data.starting_equipment;
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "A");
        assert_eq!(options[0].raw_items, vec!["Spielset", "feine Kleidung", "Parfüm"]);
        assert_eq!(options[0].gold_gp, Some(29.0));
        assert_eq!(options[1].label, "B");
        assert!(options[1].raw_items.is_empty());
        assert_eq!(options[1].gold_gp, Some(50.0));
    }

    #[test]
    fn fixed_tool_and_nested_items() {
        let scribe = &backgrounds()[1];
        assert_eq!(
            scribe.data.tool,
            Some(ToolProficiency::Fixed { name: "Kalligrafieutensilien".into(), id: None })
        );
        assert_eq!(
            scribe.data.starting_equipment[0].raw_items,
            vec![
                "Kalligrafieutensilien",
                "feine Kleidung",
                "Lampe",
                "Öl (drei Flaschen)",
                "Pergament (zwölf Bögen)"
            ]
        );
    }

    #[test]
    fn unmarked_equipment_is_single_option() {
        let decode = DecodeSettings::default();
        let options = equipment_options("Seil, Fackel und 10 GM.", &decode.currency);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "A");
        assert_eq!(options[0].raw_items, vec!["Seil", "Fackel"]);
        assert_eq!(options[0].gold_gp, Some(10.0));
    }
}
