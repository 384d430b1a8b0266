use super::{gear, split_list, walk_family, FamilyOutput};
use crate::model::{EquipmentPackage, PackageData, ParseIssue, ParsedEntity};
use crate::parser::blocks::region_bounds;
use crate::parser::decode;
use crate::parser::fields::{truncate_leak, BlockText};
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::{slugify, titlecase};

/// The list that follows `marker`: from after the colon up to the first
/// sentence-ending period outside parentheses.
pub fn item_list<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = text[start..].trim_start_matches(|c: char| c == ':' || c.is_whitespace());

    let mut depth = 0i32;
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '.' if depth <= 0 && chars.peek().map_or(true, |(_, n)| n.is_whitespace()) => {
                return Some(&rest[..i]);
            }
            _ => {}
        }
    }
    Some(rest)
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let walked = walk_family(doc, &rules.packages, &rules.segment);
    let (lo, hi) = region_bounds(doc, &rules.packages.region);

    // Gear description paragraphs share the region; their names are pattern
    // confirmed, so even short ones end package prose.
    let paragraphs = gear::description_names(doc, lo, hi);

    let mut out = FamilyOutput {
        failures: walked.failures,
        ..FamilyOutput::default()
    };
    for text in &walked.texts {
        out.entities
            .push(ParsedEntity::EquipmentPackage(build(text, rules, &walked.headers, &paragraphs)));
    }
    out
}

fn build(text: &BlockText, rules: &Rules, headers: &[String], paragraphs: &[String]) -> EquipmentPackage {
    let name = titlecase(&text.header);
    let mut issues = Vec::new();

    let description = truncate_leak(&text.description, &text.header, headers, rules.leak_min_name_len);
    let description = truncate_leak(&description, &text.header, paragraphs, 1);
    let raw_items = item_list(&description, &rules.package_marker)
        .map(split_list)
        .unwrap_or_default();

    let total_cost_gp = text.suffix.as_deref().and_then(|raw| {
        let gp = decode::currency(raw, &rules.decode.currency);
        if gp.is_none() && !raw.eq_ignore_ascii_case(&rules.decode.variable_cost) {
            issues.push(ParseIssue::new("cost_gp", raw));
        }
        gp
    });

    EquipmentPackage {
        id: slugify(&name),
        name,
        description,
        total_cost_gp,
        total_weight_kg: None,
        items: Vec::new(),
        tools: Vec::new(),
        data: PackageData { raw_items },
        source_page: text.source_page,
        unresolved: Vec::new(),
        issues,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::parser::normalize::normalize;

    const PACKAGES: &str = "\
ABENTEUERAUSRÜSTUNG
ENTDECKERAUSRÜSTUNG (10 GM)
Eine Entdeckerausrüstung enthält folgende Gegenstände: ein Rucksack,
ein Schlafsack, Öl (zwei Flaschen), zehn Fackeln und Zunderkästchen. Alles
passt in den Rucksack.
ÖL (1 SM) Du kannst eine Flasche Öl werfen.
GELEHRTENAUSRÜSTUNG (40 GM)
Eine Gelehrtenausrüstung enthält folgende Gegenstände: ein Buch (Wissen) und Tinte (30 Milliliter).
REITTIERE UND FAHRZEUGE
";

    fn packages() -> Vec<EquipmentPackage> {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = normalize(PACKAGES, &rules.normalize);
        extract(&doc, &rules)
            .entities
            .into_iter()
            .filter_map(|e| match e {
                ParsedEntity::EquipmentPackage(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn item_lists_and_costs() {
        let packages = packages();
        assert_eq!(packages.len(), 2);

        let explorer = &packages[0];
        assert_eq!(explorer.id, "entdeckerausruestung");
        assert_eq!(explorer.total_cost_gp, Some(10.0));
        assert_eq!(
            explorer.data.raw_items,
            vec!["ein Rucksack", "ein Schlafsack", "Öl (zwei Flaschen)", "zehn Fackeln", "Zunderkästchen"]
        );
        assert!(explorer.description.ends_with("passt in den Rucksack."));

        let scholar = &packages[1];
        assert_eq!(scholar.data.raw_items, vec!["ein Buch (Wissen)", "Tinte (30 Milliliter)"]);
    }

    #[test]
    fn list_stops_at_sentence_end() {
        assert_eq!(
            item_list("Sie enthält folgende Gegenstände: Seil (15 m.) und Haken. Mehr Text.", "enthält folgende Gegenstände"),
            Some("Seil (15 m.) und Haken")
        );
        assert_eq!(item_list("Kein Marker hier.", "enthält folgende Gegenstände"), None);
    }
}
