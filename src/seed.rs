use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::model::{EntityKind, ParsedEntity};
use crate::validate::ValidationReport;

/// One literal in an INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    fn text(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }

    fn opt_text(value: Option<&str>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::text)
    }

    fn real(value: Option<f64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Real)
    }

    fn int(value: Option<u32>) -> Self {
        value.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v)))
    }

    fn flag(value: bool) -> Self {
        SqlValue::Int(i64::from(value))
    }

    fn json<T: Serialize>(value: &T) -> Result<Self> {
        let encoded = serde_json::to_string(value).context("Failed to encode seed payload")?;
        Ok(SqlValue::Text(encoded))
    }

    pub fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Real(v) if v.is_finite() => v.to_string(),
            SqlValue::Real(_) => "NULL".to_string(),
            SqlValue::Text(s) => format!("'{}'", escape(s)),
        }
    }
}

/// Double single quotes; control characters other than newline and tab become spaces.
pub fn escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\t' => c.to_string(),
            '\'' => "''".to_string(),
            c if c.is_control() => " ".to_string(),
            c => c.to_string(),
        })
        .collect()
}

pub fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Spell => "core_spells",
        EntityKind::Weapon => "core_weapons",
        EntityKind::Armor => "core_armors",
        EntityKind::Tool => "core_tools",
        EntityKind::Gear => "core_items",
        EntityKind::EquipmentPackage => "core_equipment",
        EntityKind::Background => "core_backgrounds",
    }
}

pub fn columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Spell => &[
            "id",
            "name",
            "level",
            "school",
            "casting_time",
            "range",
            "components",
            "duration",
            "concentration",
            "ritual",
            "description",
            "higher_levels",
            "classes",
            "data",
        ],
        EntityKind::Weapon => &[
            "id",
            "name",
            "category",
            "weapon_type",
            "damage_dice",
            "damage_type",
            "weight_kg",
            "cost_gp",
            "data",
        ],
        EntityKind::Armor => &[
            "id",
            "name",
            "category",
            "base_ac",
            "strength_requirement",
            "stealth_disadvantage",
            "weight_kg",
            "cost_gp",
            "data",
        ],
        EntityKind::Tool => &["id", "name", "category", "cost_gp", "weight_kg", "data"],
        EntityKind::Gear => &["id", "name", "description", "cost_gp", "weight_kg", "category", "data"],
        EntityKind::EquipmentPackage => &[
            "id",
            "name",
            "description",
            "total_cost_gp",
            "total_weight_kg",
            "items",
            "tools",
            "data",
        ],
        EntityKind::Background => &["id", "name", "description", "data"],
    }
}

/// Values in `columns(kind)` order.
fn row(entity: &ParsedEntity) -> Result<Vec<SqlValue>> {
    let values = match entity {
        ParsedEntity::Spell(s) => vec![
            SqlValue::text(&s.id),
            SqlValue::text(&s.name),
            SqlValue::Int(i64::from(s.level)),
            SqlValue::text(&s.school),
            SqlValue::opt_text(s.casting_time.as_deref()),
            SqlValue::opt_text(s.range.as_deref()),
            SqlValue::opt_text(s.components.as_deref()),
            SqlValue::opt_text(s.duration.as_deref()),
            SqlValue::flag(s.concentration),
            SqlValue::flag(s.ritual),
            SqlValue::text(&s.description),
            SqlValue::opt_text(s.higher_levels.as_deref()),
            SqlValue::json(&s.classes)?,
            SqlValue::json(&s.data)?,
        ],
        ParsedEntity::Weapon(w) => vec![
            SqlValue::text(&w.id),
            SqlValue::text(&w.name),
            SqlValue::text(&w.category),
            SqlValue::text(&w.weapon_type),
            w.damage.as_ref().map_or(SqlValue::Null, |d| SqlValue::Text(d.dice())),
            SqlValue::opt_text(w.damage.as_ref().and_then(|d| d.damage_type.as_deref())),
            SqlValue::real(w.weight_kg),
            SqlValue::real(w.cost_gp),
            SqlValue::json(&w.data)?,
        ],
        ParsedEntity::Armor(a) => vec![
            SqlValue::text(&a.id),
            SqlValue::text(&a.name),
            SqlValue::text(&a.category),
            SqlValue::int(a.base_ac),
            SqlValue::int(a.strength_requirement),
            SqlValue::flag(a.stealth_disadvantage),
            SqlValue::real(a.weight_kg),
            SqlValue::real(a.cost_gp),
            SqlValue::json(&a.data)?,
        ],
        ParsedEntity::Tool(t) => vec![
            SqlValue::text(&t.id),
            SqlValue::text(&t.name),
            SqlValue::text(&t.category),
            SqlValue::real(t.cost_gp),
            SqlValue::real(t.weight_kg),
            SqlValue::json(&t.data)?,
        ],
        ParsedEntity::Gear(g) => vec![
            SqlValue::text(&g.id),
            SqlValue::text(&g.name),
            SqlValue::opt_text(g.description.as_deref()),
            SqlValue::real(g.cost_gp),
            SqlValue::real(g.weight_kg),
            SqlValue::text(&g.category),
            SqlValue::json(&g.data)?,
        ],
        ParsedEntity::EquipmentPackage(p) => vec![
            SqlValue::text(&p.id),
            SqlValue::text(&p.name),
            SqlValue::text(&p.description),
            SqlValue::real(p.total_cost_gp),
            SqlValue::real(p.total_weight_kg),
            SqlValue::json(&p.items)?,
            SqlValue::json(&p.tools)?,
            SqlValue::json(&p.data)?,
        ],
        ParsedEntity::Background(b) => vec![
            SqlValue::text(&b.id),
            SqlValue::text(&b.name),
            SqlValue::text(&b.description),
            SqlValue::json(&b.data)?,
        ],
    };
    Ok(values)
}

fn insert(table: &str, columns: &[&str], values: &[SqlValue]) -> String {
    let rendered: Vec<String> = values.iter().map(SqlValue::render).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        columns.join(", "),
        rendered.join(", ")
    )
}

#[derive(Debug, Clone)]
pub struct SeedScript {
    pub kind: EntityKind,
    pub table: &'static str,
    pub file_name: String,
    pub sql: String,
    pub rows: usize,
}

/// One purge-then-insert script per kind, empty kinds included; blocked records are left out.
pub fn emit(entities: &[ParsedEntity], report: &ValidationReport) -> Result<Vec<SeedScript>> {
    let mut scripts = Vec::with_capacity(EntityKind::ALL.len());

    for kind in EntityKind::ALL {
        let table = table(kind);
        let columns = columns(kind);
        let mut sql = format!("DELETE FROM {table};\n");
        let mut rows = 0;

        for (idx, entity) in entities.iter().enumerate() {
            if entity.kind() != kind || report.is_blocked(idx) {
                continue;
            }
            let values = row(entity).with_context(|| format!("{}/{}", kind, entity.id()))?;
            sql.push_str(&insert(table, columns, &values));
            sql.push('\n');
            rows += 1;
        }

        debug!(table, rows, "Seed script built");
        scripts.push(SeedScript {
            kind,
            table,
            file_name: format!("{}_seed.sql", kind.as_str()),
            sql,
            rows,
        });
    }
    Ok(scripts)
}

// ── Tests ──
