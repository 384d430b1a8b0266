use std::sync::LazyLock;

use regex::Regex;

use super::{split_alternatives, split_list, walk_family, FamilyOutput};
use crate::model::{ParseIssue, ParsedEntity, Tool, ToolAction, ToolData};
use crate::parser::decode::{self, is_placeholder};
use crate::parser::fields::BlockText;
use crate::parser::normalize::RawDocument;
use crate::parser::rules::Rules;
use crate::utils::{slugify, split_top_level, titlecase};

static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<action>.+?)\s*\(SG\s*(?P<dc>\d+)\)").unwrap());

const ABILITY: &str = "Attribut";
const WEIGHT: &str = "Gewicht";
const USE: &str = "Verwenden";
const CRAFT: &str = "Herstellen";
const VARIANTS: &str = "Varianten";

/// `Einen Gegenstand identifizieren (SG 15) oder eine Flamme entfachen (SG 15)`.
pub fn use_actions(raw: &str) -> Vec<ToolAction> {
    raw.split(" oder ")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match ACTION_RE.captures(part) {
            Some(caps) => ToolAction {
                action: caps["action"].trim().to_string(),
                dc: caps["dc"].parse().ok(),
            },
            None => ToolAction {
                action: part.trim_end_matches('.').to_string(),
                dc: None,
            },
        })
        .collect()
}

/// One `Name (30 GM, 3 kg)` entry of a variant list.
#[derive(Debug, Clone, PartialEq)]
struct Variant {
    name: String,
    cost_gp: Option<f64>,
    weight_kg: Option<f64>,
    unread: Vec<String>,
}

fn variants(raw: &str, rules: &Rules) -> Vec<Variant> {
    split_top_level(raw.trim().trim_end_matches('.'), ',')
        .into_iter()
        .map(|entry| {
            let (name, params) = match entry.find('(') {
                Some(open) => (
                    entry[..open].trim().to_string(),
                    entry[open + 1..].trim_end_matches(')').to_string(),
                ),
                None => (entry.clone(), String::new()),
            };
            let mut variant = Variant {
                name,
                cost_gp: None,
                weight_kg: None,
                unread: Vec::new(),
            };
            for param in decode::params(&params) {
                if let Some(gp) = decode::currency(&param, &rules.decode.currency) {
                    variant.cost_gp = Some(gp);
                } else if let Some(kg) = decode::mass(&param) {
                    variant.weight_kg = Some(kg);
                } else if !is_placeholder(&param) {
                    variant.unread.push(param);
                }
            }
            variant
        })
        .filter(|v| !v.name.is_empty())
        .collect()
}

pub fn extract(doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    let walked = walk_family(doc, &rules.tools, &rules.segment);
    let mut out = FamilyOutput {
        failures: walked.failures,
        ..FamilyOutput::default()
    };
    for text in &walked.texts {
        out.entities.extend(build(text, rules).into_iter().map(ParsedEntity::Tool));
    }
    out
}

/// The tool itself followed by one record per listed variant.
fn build(text: &BlockText, rules: &Rules) -> Vec<Tool> {
    let name = titlecase(&text.header);
    let id = slugify(&name);
    let mut issues = Vec::new();

    let cost_gp = match text.suffix.as_deref() {
        Some(raw) if raw.eq_ignore_ascii_case(&rules.decode.variable_cost) => None,
        Some(raw) => {
            let gp = decode::currency(raw, &rules.decode.currency);
            if gp.is_none() {
                issues.push(ParseIssue::new("cost_gp", raw));
            }
            gp
        }
        None => None,
    };

    let weight_kg = text.field(WEIGHT).and_then(|raw| {
        let kg = decode::mass(raw);
        if kg.is_none() && !is_placeholder(raw) {
            issues.push(ParseIssue::new("weight_kg", raw));
        }
        kg
    });

    let mut abilities = Vec::new();
    for ability in text.field(ABILITY).map(split_alternatives).unwrap_or_default() {
        match decode::lookup(&rules.decode.abilities, &ability) {
            Some(code) => abilities.push(code.to_string()),
            None => issues.push(ParseIssue::new("abilities", &ability)),
        }
    }

    let actions = text.field(USE).map(use_actions).unwrap_or_default();
    let crafting = text.field(CRAFT).map(split_list).unwrap_or_default();
    let listed = text
        .field(VARIANTS)
        .map(|raw| variants(raw, rules))
        .unwrap_or_default();

    let children: Vec<Tool> = listed
        .iter()
        .map(|v| Tool {
            id: slugify(&v.name),
            name: v.name.clone(),
            category: name.clone(),
            cost_gp: v.cost_gp,
            weight_kg: v.weight_kg,
            data: ToolData {
                abilities: abilities.clone(),
                use_actions: actions.clone(),
                parent_tool: Some(id.clone()),
                ..ToolData::default()
            },
            source_page: text.source_page,
            issues: v.unread.iter().map(|p| ParseIssue::new("variant", p)).collect(),
        })
        .collect();

    let parent = Tool {
        data: ToolData {
            abilities,
            use_actions: actions,
            crafting,
            parent_tool: None,
            variants: children.iter().map(|c| c.id.clone()).collect(),
        },
        id,
        name,
        category: rules.tool_category.clone(),
        cost_gp,
        weight_kg,
        source_page: text.source_page,
        issues,
    };

    let mut tools = Vec::with_capacity(children.len() + 1);
    tools.push(parent);
    tools.extend(children);
    tools
}

// ── Tests ──
