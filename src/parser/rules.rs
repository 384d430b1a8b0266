use std::collections::HashSet;

use anyhow::Result;
use itertools::Itertools;
use regex::Regex;

use super::normalize::NormalizeRules;
use crate::config::{ArmorSection, DecodeSettings, Region, Settings, WeaponSection};
use crate::error::PipelineError;
use crate::model::EntityKind;

/// Compile a configured pattern; a bad pattern aborts the run.
pub fn compile(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| {
        PipelineError::InvalidPattern {
            field: field.to_string(),
            source,
        }
        .into()
    })
}

fn currency_units(decode: &DecodeSettings) -> String {
    decode.currency.iter().map(|d| regex::escape(&d.code)).join("|")
}

/// `(50 GM)` or `(PREIS VARIIERT)` at the end of a header line.
fn cost_suffix(decode: &DecodeSettings) -> Result<Regex> {
    let units = currency_units(decode);
    let variable = regex::escape(&decode.variable_cost);
    compile(
        "header_suffix",
        &format!(r"\s*\(([\d.,]+\s*(?:{units})|{variable})\)$"),
    )
}

/// Everything the segmenter and the field machine need to know about one family.
#[derive(Debug, Clone)]
pub struct FamilyRules {
    pub kind: EntityKind,
    pub region: Region,
    /// Appended header pattern (a cost in parentheses); capture 1 is kept.
    pub header_suffix: Option<Regex>,
    /// Loose type-line shape used to confirm headers.
    pub type_shape: Option<Regex>,
    /// Strict type-line start the field machine requires.
    pub type_line: Option<Regex>,
    pub labels: Vec<String>,
    /// Matches `Label:` at line start or after whitespace; group `label`.
    pub label_re: Option<Regex>,
    pub terminal_label: Option<String>,
    pub body_marker: Option<String>,
    pub scaling_markers: Vec<String>,
    pub summon_line: Option<Regex>,
    pub summon_markers: Vec<String>,
}

impl FamilyRules {
    fn new(kind: EntityKind, region: &Region, labels: Vec<String>) -> Result<Self> {
        let label_re = if labels.is_empty() {
            None
        } else {
            let alternation = labels.iter().map(|l| regex::escape(l)).join("|");
            Some(compile(
                "labels",
                &format!(r"(?:^|\s)(?P<label>{alternation})\s*:"),
            )?)
        };
        Ok(FamilyRules {
            kind,
            region: region.clone(),
            header_suffix: None,
            type_shape: None,
            type_line: None,
            labels,
            label_re,
            terminal_label: None,
            body_marker: None,
            scaling_markers: Vec::new(),
            summon_line: None,
            summon_markers: Vec::new(),
        })
    }

    fn with_cost_suffix(mut self, decode: &DecodeSettings) -> Result<Self> {
        self.header_suffix = Some(cost_suffix(decode)?);
        Ok(self)
    }

    /// True when the line opens with one of the family's labels.
    pub fn is_label_line(&self, line: &str) -> bool {
        self.label_re
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|c| c.name("label"))
            .is_some_and(|m| line[..m.start()].trim().is_empty())
    }

    pub fn is_body_marker_line(&self, line: &str) -> bool {
        self.body_marker
            .as_ref()
            .is_some_and(|m| line.contains(m.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct SegmentRules {
    pub header_min_len: usize,
    pub header_max_len: usize,
    pub type_line_window: usize,
    pub label_window: usize,
    pub denylist: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct TableRules {
    pub weapons: Region,
    pub armor: Region,
    pub gear: Region,
    pub weapon_sections: Vec<WeaponSection>,
    pub armor_sections: Vec<ArmorSection>,
    pub weapon_row: Regex,
    pub armor_row: Regex,
    pub gear_row: Regex,
    pub gear_category: String,
    pub gear_skip_words: Vec<String>,
}

/// Immutable compiled form of `Settings`, shared by every worker.
pub struct Rules {
    pub normalize: NormalizeRules,
    pub segment: SegmentRules,
    pub spells: FamilyRules,
    pub tools: FamilyRules,
    pub packages: FamilyRules,
    pub backgrounds: FamilyRules,
    pub tables: TableRules,
    pub decode: DecodeSettings,
    pub tool_category: String,
    pub package_marker: String,
    pub background_labels: BackgroundLabels,
    pub leak_min_name_len: usize,
}

#[derive(Debug, Clone)]
pub struct BackgroundLabels {
    pub abilities: String,
    pub feat: String,
    pub skills: String,
    pub tool: String,
    pub equipment: String,
}

impl Rules {
    pub fn compile(settings: &Settings) -> Result<Self> {
        let seg = &settings.segment;

        let mut spells = FamilyRules::new(
            EntityKind::Spell,
            &settings.spells.region,
            settings.spells.labels.clone(),
        )?;
        spells.type_shape = Some(compile("spells.type_shape", &settings.spells.type_shape)?);
        spells.type_line = Some(compile("spells.type_line", &settings.spells.type_line)?);
        spells.terminal_label = settings.spells.terminal_label.clone();
        spells.scaling_markers = settings.spells.scaling_markers.clone();
        spells.summon_line = Some(compile("spells.summon_line", &settings.spells.summon_line)?);
        spells.summon_markers = settings.spells.summon_markers.clone();

        let tools = FamilyRules::new(
            EntityKind::Tool,
            &settings.tools.region,
            settings.tools.labels.clone(),
        )?
        .with_cost_suffix(&settings.decode)?;

        let mut packages =
            FamilyRules::new(EntityKind::EquipmentPackage, &settings.packages.region, Vec::new())?
                .with_cost_suffix(&settings.decode)?;
        packages.body_marker = Some(settings.packages.body_marker.clone());

        let bg = &settings.backgrounds;
        let mut backgrounds =
            FamilyRules::new(EntityKind::Background, &bg.region, bg.labels())?;
        backgrounds.terminal_label = Some(bg.equipment_label.clone());

        Ok(Rules {
            normalize: NormalizeRules::compile(&settings.normalize, &seg.denylist)?,
            segment: SegmentRules {
                header_min_len: seg.header_min_len,
                header_max_len: seg.header_max_len,
                type_line_window: seg.type_line_window,
                label_window: seg.label_window,
                denylist: seg.denylist.iter().cloned().collect(),
            },
            spells,
            tools,
            packages,
            backgrounds,
            tables: compile_tables(settings)?,
            decode: settings.decode.clone(),
            tool_category: settings.tools.category.clone(),
            package_marker: settings.packages.body_marker.clone(),
            background_labels: BackgroundLabels {
                abilities: bg.ability_label.clone(),
                feat: bg.feat_label.clone(),
                skills: bg.skills_label.clone(),
                tool: bg.tool_label.clone(),
                equipment: bg.equipment_label.clone(),
            },
            leak_min_name_len: settings.spells.leak_min_name_len,
        })
    }
}

fn compile_tables(settings: &Settings) -> Result<TableRules> {
    let t = &settings.tables;
    let units = currency_units(&settings.decode);
    let damage_types = t.damage_types.iter().map(|d| regex::escape(d)).join("|");
    let masteries = settings
        .decode
        .masteries
        .iter()
        .map(|m| regex::escape(&m.name))
        .join("|");

    let cost = format!(r"(?P<cost>\d[\d.,]*\s*(?:{units}))");
    let weight = r"(?P<weight>\d[\d.,]*\s*k?g|–|-|Variiert)";

    let weapon_row = format!(
        r"^(?P<name>\p{{Lu}}.*?)\s+(?P<damage>\d+(?:W\d+)?\s+(?:{damage_types})\w*)\s+(?P<props>.*?)\s*(?P<mastery>{masteries})\s+{weight}\s+{cost}$"
    );
    let armor_row = format!(
        r"^(?P<name>\p{{Lu}}.*?)\s+(?P<ac>\+?\d+(?:\s*\+\s*GES-Modifikator(?:\s*\(max\.\s*\d+\))?)?)\s+(?P<strength>–|-|(?:Stä|Str)\.?\s*\d+)\s+(?P<stealth>Nachteil|–|-)\s+{weight}\s+{cost}$"
    );
    let gear_row = format!(r"^(?P<name>\p{{L}}.*?)\s+{weight}\s+{cost}$");

    Ok(TableRules {
        weapons: t.weapons.clone(),
        armor: t.armor.clone(),
        gear: t.gear.clone(),
        weapon_sections: t.weapon_sections.clone(),
        armor_sections: t.armor_sections.clone(),
        weapon_row: compile("tables.weapon_row", &weapon_row)?,
        armor_row: compile("tables.armor_row", &armor_row)?,
        gear_row: compile("tables.gear_row", &gear_row)?,
        gear_category: t.gear_category.clone(),
        gear_skip_words: t.gear_skip_words.clone(),
    })
}

// ── Tests ──
