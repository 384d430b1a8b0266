pub mod armor;
pub mod backgrounds;
pub mod gear;
pub mod packages;
pub mod spells;
pub mod tools;
pub mod weapons;

use serde::Serialize;
use tracing::debug;

use super::blocks::segment;
use super::fields::{walk, BlockText};
use super::normalize::RawDocument;
use super::rules::{FamilyRules, Rules, SegmentRules};
use crate::model::{EntityKind, ParsedEntity};
use crate::utils::{rfind_top_level, split_top_level};

/// A block the field machine rejected; reported, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFailure {
    pub kind: EntityKind,
    pub header: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FamilyOutput {
    pub entities: Vec<ParsedEntity>,
    pub failures: Vec<BlockFailure>,
}

pub fn extract_family(kind: EntityKind, doc: &RawDocument, rules: &Rules) -> FamilyOutput {
    match kind {
        EntityKind::Spell => spells::extract(doc, rules),
        EntityKind::Weapon => weapons::extract(doc, rules),
        EntityKind::Armor => armor::extract(doc, rules),
        EntityKind::Tool => tools::extract(doc, rules),
        EntityKind::Gear => gear::extract(doc, rules),
        EntityKind::EquipmentPackage => packages::extract(doc, rules),
        EntityKind::Background => backgrounds::extract(doc, rules),
    }
}

/// Segmented and walked blocks of one family.
pub struct Walked {
    pub texts: Vec<BlockText>,
    /// Every confirmed header, parsed or not; used for leak cleanup.
    pub headers: Vec<String>,
    pub failures: Vec<BlockFailure>,
}

pub fn walk_family(doc: &RawDocument, family: &FamilyRules, seg: &SegmentRules) -> Walked {
    let blocks = segment(doc, family, seg);
    let headers = blocks.iter().map(|b| b.header.clone()).collect();
    let mut texts = Vec::with_capacity(blocks.len());
    let mut failures = Vec::new();

    for block in &blocks {
        match walk(doc, block, family, seg.type_line_window) {
            Ok(text) => texts.push(text),
            Err(e) => {
                debug!(kind = %family.kind, header = %block.header, reason = %e.reason, "Unparsable block");
                failures.push(BlockFailure {
                    kind: family.kind,
                    header: block.header.clone(),
                    line: e.line,
                    reason: e.reason,
                });
            }
        }
    }

    Walked {
        texts,
        headers,
        failures,
    }
}

/// Comma list whose last element may be joined with "und": `a, b und c` → [a, b, c].
pub fn split_list(text: &str) -> Vec<String> {
    let text = text.trim().trim_end_matches('.');
    let mut parts = split_top_level(text, ',');
    if let Some(last) = parts.pop() {
        match rfind_top_level(&last, " und ") {
            Some(at) => {
                parts.push(last[..at].trim().to_string());
                parts.push(last[at + " und ".len()..].trim().to_string());
            }
            None => parts.push(last),
        }
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Short alternatives such as ability lists: split on commas, "und" and "oder".
pub fn split_alternatives(text: &str) -> Vec<String> {
    let text = text.replace(" oder ", ", ").replace(" und ", ", ");
    split_top_level(text.trim().trim_end_matches('.'), ',')
}

// ── Tests ──
