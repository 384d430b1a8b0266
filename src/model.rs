use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::decode::{Damage, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Spell,
    Weapon,
    Armor,
    Tool,
    Gear,
    EquipmentPackage,
    Background,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Spell,
        EntityKind::Weapon,
        EntityKind::Armor,
        EntityKind::Tool,
        EntityKind::Gear,
        EntityKind::EquipmentPackage,
        EntityKind::Background,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Spell => "spell",
            EntityKind::Weapon => "weapon",
            EntityKind::Armor => "armor",
            EntityKind::Tool => "tool",
            EntityKind::Gear => "gear",
            EntityKind::EquipmentPackage => "equipment_package",
            EntityKind::Background => "background",
        }
    }

    /// Kinds whose records carry a free-text description worth length-checking.
    pub fn has_description(self) -> bool {
        matches!(
            self,
            EntityKind::Spell | EntityKind::Gear | EntityKind::EquipmentPackage | EntityKind::Background
        )
    }

    /// Kinds that may be the target of a package or background reference.
    pub fn is_catalog(self) -> bool {
        matches!(
            self,
            EntityKind::Gear
                | EntityKind::Weapon
                | EntityKind::Armor
                | EntityKind::Tool
                | EntityKind::EquipmentPackage
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field the parser saw but could not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub field: String,
    pub raw: String,
}

impl ParseIssue {
    pub fn new(field: &str, raw: &str) -> Self {
        ParseIssue {
            field: field.to_string(),
            raw: raw.to_string(),
        }
    }
}

// ── Spells ──

#[derive(Debug, Clone, Default, Serialize)]
pub struct Spell {
    pub id: String,
    pub name: String,
    pub level: u8,
    pub school: String,
    pub classes: Vec<String>,
    pub casting_time: Option<String>,
    pub range: Option<String>,
    pub components: Option<String>,
    pub duration: Option<String>,
    pub concentration: bool,
    pub ritual: bool,
    pub description: String,
    pub higher_levels: Option<String>,
    pub data: SpellData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpellData {
    pub material: Option<String>,
    pub scaling: Option<Scaling>,
    pub summon: Option<SummonStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summon_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scaling {
    pub text: String,
    pub kind: ScalingKind,
    pub dice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingKind {
    CantripScaling,
    Damage,
    SpellLevelRef,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummonStats {
    pub ac: Option<String>,
    pub hp: Option<String>,
}

// ── Weapons & armor ──

#[derive(Debug, Clone, Default, Serialize)]
pub struct Weapon {
    pub id: String,
    pub name: String,
    pub category: String,
    pub weapon_type: String,
    pub damage: Option<Damage>,
    pub weight_kg: Option<f64>,
    pub cost_gp: Option<f64>,
    pub data: WeaponData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaponData {
    pub properties: Vec<String>,
    pub mastery: Option<String>,
    pub range: Option<Range>,
    pub thrown_range: Option<Range>,
    pub versatile_damage: Option<String>,
    pub ammunition_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Armor {
    pub id: String,
    pub name: String,
    pub category: String,
    pub base_ac: Option<u32>,
    pub strength_requirement: Option<u32>,
    pub stealth_disadvantage: bool,
    pub weight_kg: Option<f64>,
    pub cost_gp: Option<f64>,
    pub data: ArmorData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArmorData {
    pub dex_bonus: DexBonus,
    /// Shields add to AC instead of setting it.
    pub ac_bonus: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DexBonus {
    pub apply: bool,
    pub max: Option<u32>,
}

// ── Tools & gear ──

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub category: String,
    pub cost_gp: Option<f64>,
    pub weight_kg: Option<f64>,
    pub data: ToolData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolData {
    pub abilities: Vec<String>,
    pub use_actions: Vec<ToolAction>,
    pub crafting: Vec<String>,
    pub parent_tool: Option<String>,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolAction {
    pub action: String,
    pub dc: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Gear {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_gp: Option<f64>,
    pub weight_kg: Option<f64>,
    pub category: String,
    pub data: GearData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GearData {
    pub weight_varies: bool,
}

// ── Composites ──

/// One resolved line of a package or starting-equipment option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRef {
    pub kind: EntityKind,
    pub id: String,
    pub quantity: u32,
    pub unit: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EquipmentPackage {
    pub id: String,
    pub name: String,
    pub description: String,
    pub total_cost_gp: Option<f64>,
    pub total_weight_kg: Option<f64>,
    pub items: Vec<ItemRef>,
    pub tools: Vec<ItemRef>,
    pub data: PackageData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub unresolved: Vec<String>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageData {
    pub raw_items: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Background {
    pub id: String,
    pub name: String,
    pub description: String,
    pub data: BackgroundData,
    pub source_page: Option<u32>,
    #[serde(skip)]
    pub unresolved: Vec<String>,
    #[serde(skip)]
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackgroundData {
    pub ability_scores: Vec<String>,
    pub feat: Option<FeatRef>,
    pub skills: Vec<String>,
    pub tool: Option<ToolProficiency>,
    pub starting_equipment: Vec<EquipmentOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolProficiency {
    Fixed { name: String, id: Option<String> },
    Choice { category: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EquipmentOption {
    pub label: String,
    pub raw_items: Vec<String>,
    pub items: Vec<ItemRef>,
    pub gold_gp: Option<f64>,
}

// ── ParsedEntity ──

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ParsedEntity {
    Spell(Spell),
    Weapon(Weapon),
    Armor(Armor),
    Tool(Tool),
    Gear(Gear),
    EquipmentPackage(EquipmentPackage),
    Background(Background),
}

impl ParsedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            ParsedEntity::Spell(_) => EntityKind::Spell,
            ParsedEntity::Weapon(_) => EntityKind::Weapon,
            ParsedEntity::Armor(_) => EntityKind::Armor,
            ParsedEntity::Tool(_) => EntityKind::Tool,
            ParsedEntity::Gear(_) => EntityKind::Gear,
            ParsedEntity::EquipmentPackage(_) => EntityKind::EquipmentPackage,
            ParsedEntity::Background(_) => EntityKind::Background,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ParsedEntity::Spell(e) => &e.id,
            ParsedEntity::Weapon(e) => &e.id,
            ParsedEntity::Armor(e) => &e.id,
            ParsedEntity::Tool(e) => &e.id,
            ParsedEntity::Gear(e) => &e.id,
            ParsedEntity::EquipmentPackage(e) => &e.id,
            ParsedEntity::Background(e) => &e.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParsedEntity::Spell(e) => &e.name,
            ParsedEntity::Weapon(e) => &e.name,
            ParsedEntity::Armor(e) => &e.name,
            ParsedEntity::Tool(e) => &e.name,
            ParsedEntity::Gear(e) => &e.name,
            ParsedEntity::EquipmentPackage(e) => &e.name,
            ParsedEntity::Background(e) => &e.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ParsedEntity::Spell(e) => Some(&e.description),
            ParsedEntity::Gear(e) => e.description.as_deref(),
            ParsedEntity::EquipmentPackage(e) => Some(&e.description),
            ParsedEntity::Background(e) => Some(&e.description),
            _ => None,
        }
    }

    pub fn cost_gp(&self) -> Option<f64> {
        match self {
            ParsedEntity::Weapon(e) => e.cost_gp,
            ParsedEntity::Armor(e) => e.cost_gp,
            ParsedEntity::Tool(e) => e.cost_gp,
            ParsedEntity::Gear(e) => e.cost_gp,
            ParsedEntity::EquipmentPackage(e) => e.total_cost_gp,
            _ => None,
        }
    }

    pub fn weight_kg(&self) -> Option<f64> {
        match self {
            ParsedEntity::Weapon(e) => e.weight_kg,
            ParsedEntity::Armor(e) => e.weight_kg,
            ParsedEntity::Tool(e) => e.weight_kg,
            ParsedEntity::Gear(e) => e.weight_kg,
            ParsedEntity::EquipmentPackage(e) => e.total_weight_kg,
            _ => None,
        }
    }

    pub fn issues(&self) -> &[ParseIssue] {
        match self {
            ParsedEntity::Spell(e) => &e.issues,
            ParsedEntity::Weapon(e) => &e.issues,
            ParsedEntity::Armor(e) => &e.issues,
            ParsedEntity::Tool(e) => &e.issues,
            ParsedEntity::Gear(e) => &e.issues,
            ParsedEntity::EquipmentPackage(e) => &e.issues,
            ParsedEntity::Background(e) => &e.issues,
        }
    }

    /// References that did not resolve against the catalog.
    pub fn unresolved(&self) -> &[String] {
        match self {
            ParsedEntity::EquipmentPackage(e) => &e.unresolved,
            ParsedEntity::Background(e) => &e.unresolved,
            _ => &[],
        }
    }

    /// Number of references that did resolve.
    pub fn resolved_count(&self) -> usize {
        match self {
            ParsedEntity::EquipmentPackage(e) => e.items.len() + e.tools.len(),
            ParsedEntity::Background(e) => {
                let fixed_tool = matches!(
                    e.data.tool,
                    Some(ToolProficiency::Fixed { id: Some(_), .. })
                );
                e.data.starting_equipment.iter().map(|o| o.items.len()).sum::<usize>()
                    + usize::from(fixed_tool)
            }
            _ => 0,
        }
    }

    /// A required nested structure that is missing entirely, if any.
    pub fn missing_composite(&self) -> Option<&'static str> {
        match self {
            ParsedEntity::EquipmentPackage(e) if e.data.raw_items.is_empty() => Some("item list"),
            ParsedEntity::Background(e) if e.data.skills.is_empty() => Some("skill proficiencies"),
            ParsedEntity::Background(e) if e.data.starting_equipment.is_empty() => {
                Some("starting equipment options")
            }
            _ => None,
        }
    }
}
