use std::path::Path;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

use crate::error::PipelineError;

/// Every tunable of a run. Loaded once and passed down by reference; nothing
/// below `main` reads configuration from anywhere else.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub normalize: NormalizeSettings,
    pub segment: SegmentSettings,
    pub spells: SpellSettings,
    pub tools: ToolSettings,
    pub packages: PackageSettings,
    pub backgrounds: BackgroundSettings,
    pub tables: TableSettings,
    pub decode: DecodeSettings,
    pub resolve: ResolveSettings,
    pub validate: ValidateSettings,
}

impl Settings {
    /// Built-in defaults, overridden field by field from a TOML/YAML/JSON file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()).into());
        }

        let settings = Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?
            .try_deserialize::<Settings>()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(settings)
    }
}

// The `config` crate folds map keys to lower case, so every vocabulary is a
// list of pairs rather than a map.

#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vocab {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Region {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Region {
    fn between(start: &str, end: Option<&str>) -> Self {
        Region {
            start: Some(start.to_string()),
            end: end.map(str::to_string),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn vocab(pairs: &[(&str, &str)]) -> Vec<Vocab> {
    pairs
        .iter()
        .map(|(name, id)| Vocab {
            name: name.to_string(),
            id: id.to_string(),
        })
        .collect()
}

// ── Normalizer ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    pub encoding_fixes: Vec<Replacement>,
    pub page_number_pattern: String,
    pub artifact_patterns: Vec<String>,
    pub running_header_min_repeats: usize,
    pub running_header_max_len: usize,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        let fixes = [
            ("Ã¤", "ä"),
            ("Ã¶", "ö"),
            ("Ã¼", "ü"),
            ("Ã„", "Ä"),
            ("Ã–", "Ö"),
            ("Ãœ", "Ü"),
            ("ÃŸ", "ß"),
            ("Ã©", "é"),
            ("Ã¨", "è"),
            ("â€“", "–"),
            ("â€”", "—"),
            ("â€™", "'"),
            ("â€ž", "\""),
            ("â€œ", "\""),
            ("\u{00AD}", ""),
            ("Â", ""),
        ];
        NormalizeSettings {
            encoding_fixes: fixes
                .iter()
                .map(|(from, to)| Replacement {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
            page_number_pattern: r"^\d{1,3}$".to_string(),
            artifact_patterns: strings(&[r"^KAPITEL\s+\d+\s*[|I]\s*\S.*$", r"^[A-ZÄÖÜ]$"]),
            running_header_min_repeats: 4,
            running_header_max_len: 40,
        }
    }
}

// ── Segmenter ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    pub header_min_len: usize,
    pub header_max_len: usize,
    pub type_line_window: usize,
    pub label_window: usize,
    pub denylist: Vec<String>,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        SegmentSettings {
            header_min_len: 3,
            header_max_len: 60,
            type_line_window: 3,
            label_window: 8,
            denylist: strings(&[
                "MERKMALE",
                "AKTIONEN",
                "BONUSAKTIONEN",
                "REAKTIONEN",
                "WERTEKASTEN",
                "ABERRATION",
                "BESTIE",
                "DRACHE",
                "ELEMENTAR",
                "FEENWESEN",
                "HIMMLISCHER",
                "HUMANOIDE",
                "KONSTRUKT",
                "MONSTROSITÄT",
                "PFLANZE",
                "RIESE",
                "SCHLICK",
                "UNHOLD",
                "UNTOTER",
                "ZAUBERLISTEN",
            ]),
        }
    }
}

// ── Families ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpellSettings {
    pub region: Region,
    pub labels: Vec<String>,
    pub terminal_label: Option<String>,
    pub scaling_markers: Vec<String>,
    pub summon_markers: Vec<String>,
    pub leak_min_name_len: usize,
    /// Loose type-line shape that confirms a header.
    pub type_shape: String,
    /// Type-line start the field machine accepts.
    pub type_line: String,
    /// First line of a summoned creature's stat block.
    pub summon_line: String,
}

impl Default for SpellSettings {
    fn default() -> Self {
        SpellSettings {
            region: Region::between("BESCHREIBUNGEN DER ZAUBER", None),
            labels: strings(&["Zeitaufwand", "Reichweite", "Komponenten", "Wirkungsdauer"]),
            terminal_label: Some("Wirkungsdauer".to_string()),
            scaling_markers: strings(&[
                "Verwenden von Zauberplätzen höheren Grades:",
                "Verwenden von Zauberslots höheren Grades:",
                "Verwendung eines höhergradigen Zauberplatzes:",
                "Zaubertrick-Aufwertung:",
                "Using a Higher-Level Spell Slot:",
                "At Higher Levels:",
                "Cantrip Upgrade:",
            ]),
            summon_markers: strings(&["MERKMALE", "AKTIONEN", "WERTEKASTEN"]),
            leak_min_name_len: 5,
            type_shape: r"^(?:\p{L}+zauber\b|Zaubertrick\b)".to_string(),
            type_line: r"^(?:\p{L}+zauber\s+(?:\d+|I+)\.\s+Grades?|Zaubertrick\s+der\s+\p{L}+)\s*\("
                .to_string(),
            summon_line: r"^(?:(?:RK|TP|STÄ|GES|KON|INT|WEI|CHA)\s*\d+|(?:MOD|RW)\b|Sinne\s|Sprachen\s)"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub region: Region,
    pub labels: Vec<String>,
    pub category: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        ToolSettings {
            region: Region::between("WERKZEUGE", Some("ABENTEUERAUSRÜSTUNG")),
            labels: strings(&["Attribut", "Gewicht", "Verwenden", "Herstellen", "Varianten"]),
            category: "Werkzeug".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    pub region: Region,
    pub body_marker: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        PackageSettings {
            region: Region::between("ABENTEUERAUSRÜSTUNG", Some("REITTIERE UND FAHRZEUGE")),
            body_marker: "enthält folgende Gegenstände".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    pub region: Region,
    pub ability_label: String,
    pub feat_label: String,
    pub skills_label: String,
    pub tool_label: String,
    pub equipment_label: String,
}

impl BackgroundSettings {
    pub fn labels(&self) -> Vec<String> {
        vec![
            self.ability_label.clone(),
            self.feat_label.clone(),
            self.skills_label.clone(),
            self.tool_label.clone(),
            self.equipment_label.clone(),
        ]
    }
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        BackgroundSettings {
            region: Region::between("HINTERGRUNDBESCHREIBUNGEN", Some("SPEZIESBESCHREIBUNGEN")),
            ability_label: "Attributswerte".to_string(),
            feat_label: "Talent".to_string(),
            skills_label: "Fertigkeitsgeübtheiten".to_string(),
            tool_label: "Werkzeuggeübtheit".to_string(),
            equipment_label: "Ausrüstung".to_string(),
        }
    }
}

// ── Tables ──

#[derive(Debug, Clone, Deserialize)]
pub struct WeaponSection {
    pub marker: String,
    pub category: String,
    pub weapon_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArmorSection {
    pub marker: String,
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub weapons: Region,
    pub armor: Region,
    pub gear: Region,
    pub weapon_sections: Vec<WeaponSection>,
    pub armor_sections: Vec<ArmorSection>,
    pub damage_types: Vec<String>,
    pub gear_category: String,
    pub gear_skip_words: Vec<String>,
}

impl Default for TableSettings {
    fn default() -> Self {
        let weapon_sections = [
            ("Einfache Nahkampfwaffen", "Einfache Waffen", "Nahkampf"),
            ("Einfache Fernkampfwaffen", "Einfache Waffen", "Fernkampf"),
            ("Nahkampf-Kriegswaffen", "Kriegswaffen", "Nahkampf"),
            ("Fernkampf-Kriegswaffen", "Kriegswaffen", "Fernkampf"),
        ];
        let armor_sections = [
            "Leichte Rüstung",
            "Mittelschwere Rüstung",
            "Schwere Rüstung",
            "Schild",
        ];
        TableSettings {
            weapons: Region::between("WAFFEN", Some("RÜSTUNG")),
            armor: Region::between("RÜSTUNG", Some("WERKZEUGE")),
            gear: Region::between("ABENTEUERAUSRÜSTUNG", Some("REITTIERE UND FAHRZEUGE")),
            weapon_sections: weapon_sections
                .iter()
                .map(|(marker, category, weapon_type)| WeaponSection {
                    marker: marker.to_string(),
                    category: category.to_string(),
                    weapon_type: weapon_type.to_string(),
                })
                .collect(),
            armor_sections: armor_sections
                .iter()
                .map(|marker| ArmorSection {
                    marker: marker.to_string(),
                    category: marker.to_string(),
                })
                .collect(),
            damage_types: strings(&["Hieb", "Stich", "Wucht"]),
            gear_category: "Abenteuerausrüstung".to_string(),
            gear_skip_words: strings(&["KAPITEL", "ABENTEUERAUSRÜSTUNG", "Gewicht", "Kosten"]),
        }
    }
}

// ── Decoders ──

#[derive(Debug, Clone, Deserialize)]
pub struct Denomination {
    pub code: String,
    pub gp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    pub currency: Vec<Denomination>,
    /// Cost text meaning "depends on the variant", e.g. `MUSIKINSTRUMENT (PREIS VARIIERT)`.
    pub variable_cost: String,
    pub properties: Vec<Vocab>,
    pub masteries: Vec<Vocab>,
    pub abilities: Vec<Vocab>,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        let currency = [("KM", 0.01), ("SM", 0.1), ("EM", 0.5), ("GM", 1.0), ("PM", 10.0)];
        DecodeSettings {
            currency: currency
                .iter()
                .map(|(code, gp)| Denomination {
                    code: code.to_string(),
                    gp: *gp,
                })
                .collect(),
            variable_cost: "PREIS VARIIERT".to_string(),
            properties: vocab(&[
                ("Finesse", "finesse"),
                ("Leicht", "light"),
                ("Schwer", "heavy"),
                ("Weitreichend", "reach"),
                ("Zweihändig", "two-handed"),
                ("Laden", "loading"),
                ("Vielseitig", "versatile"),
                ("Geschosse", "ammunition"),
                ("Wurfwaffe", "thrown"),
            ]),
            masteries: vocab(&[
                ("Plagen", "vex"),
                ("Einkerben", "nick"),
                ("Umstoßen", "topple"),
                ("Verlangsamen", "slow"),
                ("Auslaugen", "sap"),
                ("Stoßen", "push"),
                ("Streifen", "graze"),
                ("Spalten", "cleave"),
            ]),
            abilities: vocab(&[
                ("Stärke", "STR"),
                ("Geschicklichkeit", "DEX"),
                ("Konstitution", "CON"),
                ("Intelligenz", "INT"),
                ("Weisheit", "WIS"),
                ("Charisma", "CHA"),
            ]),
        }
    }
}

// ── Resolver ──

#[derive(Debug, Clone, Deserialize)]
pub struct NumberWord {
    pub word: String,
    pub value: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolveSettings {
    pub aliases: Vec<Replacement>,
    pub number_words: Vec<NumberWord>,
    pub plural_suffixes: Vec<String>,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        let aliases = [
            ("Flaschen Öl", "oel"),
            ("Bögen Pergament", "pergament"),
            ("Bögen Papier", "papier"),
            ("Tagesrationen", "rationen"),
            ("feine Kleidung", "kleidung-fein"),
            ("Karten- oder Schriftrollenbehälter", "karte"),
        ];
        let numbers = [
            ("ein", 1),
            ("eine", 1),
            ("einen", 1),
            ("einem", 1),
            ("einer", 1),
            ("eines", 1),
            ("zwei", 2),
            ("drei", 3),
            ("vier", 4),
            ("fünf", 5),
            ("sechs", 6),
            ("sieben", 7),
            ("acht", 8),
            ("neun", 9),
            ("zehn", 10),
            ("elf", 11),
            ("zwölf", 12),
            ("fünfzehn", 15),
            ("zwanzig", 20),
            ("fünfzig", 50),
            ("hundert", 100),
        ];
        ResolveSettings {
            aliases: aliases
                .iter()
                .map(|(from, to)| Replacement {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
            number_words: numbers
                .iter()
                .map(|(word, value)| NumberWord {
                    word: word.to_string(),
                    value: *value,
                })
                .collect(),
            plural_suffixes: strings(&["en", "n", "e", "s"]),
        }
    }
}

// ── Validator ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckSeverities {
    pub missing_identity: Severity,
    pub duplicate_id: Severity,
    pub duplicate_name: Severity,
    pub invalid_cost_weight: Severity,
    pub short_description: Severity,
    pub unresolved_reference: Severity,
    pub missing_composite: Severity,
    pub unparsable_block: Severity,
    pub unparsed_field: Severity,
}

impl Default for CheckSeverities {
    fn default() -> Self {
        CheckSeverities {
            missing_identity: Severity::Error,
            duplicate_id: Severity::Error,
            duplicate_name: Severity::Warning,
            invalid_cost_weight: Severity::Warning,
            short_description: Severity::Warning,
            unresolved_reference: Severity::Warning,
            missing_composite: Severity::Error,
            unparsable_block: Severity::Warning,
            unparsed_field: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidateSettings {
    pub min_description_len: usize,
    pub checks: CheckSeverities,
}

impl Default for ValidateSettings {
    fn default() -> Self {
        ValidateSettings {
            min_description_len: 20,
            checks: CheckSeverities::default(),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.segment.header_max_len, 60);
        assert_eq!(settings.segment.type_line_window, 3);
        assert_eq!(settings.validate.checks.duplicate_id, Severity::Error);
        assert!(settings.decode.currency.iter().any(|d| d.code == "GM" && d.gp == 1.0));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            r#"
[segment]
header_max_len = 40

[validate.checks]
short_description = "off"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.segment.header_max_len, 40);
        assert_eq!(settings.segment.label_window, 8);
        assert_eq!(settings.validate.checks.short_description, Severity::Off);
        assert_eq!(settings.validate.checks.duplicate_id, Severity::Error);
        assert_eq!(settings.spells.leak_min_name_len, 5);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = Settings::load(Some(Path::new("does/not/exist.toml"))).unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }
}
