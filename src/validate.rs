use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CheckSeverities, Severity, ValidateSettings};
use crate::model::{EntityKind, ParsedEntity};
use crate::parser::extract::BlockFailure;
use crate::utils::fold_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    MissingIdentity,
    DuplicateId,
    DuplicateName,
    InvalidCostWeight,
    ShortDescription,
    UnresolvedReference,
    MissingComposite,
    UnparsableBlock,
    UnparsedField,
}

impl Check {
    pub fn severity(self, checks: &CheckSeverities) -> Severity {
        match self {
            Check::MissingIdentity => checks.missing_identity,
            Check::DuplicateId => checks.duplicate_id,
            Check::DuplicateName => checks.duplicate_name,
            Check::InvalidCostWeight => checks.invalid_cost_weight,
            Check::ShortDescription => checks.short_description,
            Check::UnresolvedReference => checks.unresolved_reference,
            Check::MissingComposite => checks.missing_composite,
            Check::UnparsableBlock => checks.unparsable_block,
            Check::UnparsedField => checks.unparsed_field,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_items: usize,
    pub total_equipment: usize,
    pub total_references: usize,
    pub valid_references: usize,
    pub invalid_references: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityFindings {
    pub kind: EntityKind,
    pub id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
    pub entities: Vec<EntityFindings>,
    /// Indices of records with at least one error; these are not emitted.
    #[serde(skip)]
    pub blocked: HashSet<usize>,
}

impl ValidationReport {
    pub fn is_blocked(&self, idx: usize) -> bool {
        self.blocked.contains(&idx)
    }

    fn push(&mut self, severity: Severity, message: String) {
        match severity {
            Severity::Error => self.errors.push(message),
            Severity::Warning => self.warnings.push(message),
            Severity::Off => {}
        }
    }
}

fn invalid_number(value: Option<f64>) -> bool {
    value.is_some_and(|v| !v.is_finite() || v < 0.0)
}

/// Findings for one record, before severities are applied.
fn inspect(
    idx: usize,
    entity: &ParsedEntity,
    settings: &ValidateSettings,
    ids: &mut HashMap<(EntityKind, String), usize>,
    names: &mut HashMap<(EntityKind, String), String>,
) -> Vec<(Check, String)> {
    let mut found = Vec::new();
    let (id, name) = (entity.id(), entity.name());

    if id.trim().is_empty() || name.trim().is_empty() {
        found.push((Check::MissingIdentity, "missing id or name".to_string()));
    }

    if !id.is_empty() {
        match ids.get(&(entity.kind(), id.to_string())) {
            Some(first) => found.push((
                Check::DuplicateId,
                format!("duplicate id (first seen as record {first})"),
            )),
            None => {
                ids.insert((entity.kind(), id.to_string()), idx);
            }
        }
    }

    if !name.trim().is_empty() {
        let key = (entity.kind(), fold_name(name));
        match names.get(&key) {
            Some(other) if other != id => {
                found.push((Check::DuplicateName, format!("name {name:?} also used by {other}")));
            }
            Some(_) => {}
            None => {
                names.insert(key, id.to_string());
            }
        }
    }

    if invalid_number(entity.cost_gp()) {
        found.push((Check::InvalidCostWeight, format!("invalid cost {:?}", entity.cost_gp())));
    }
    if invalid_number(entity.weight_kg()) {
        found.push((Check::InvalidCostWeight, format!("invalid weight {:?}", entity.weight_kg())));
    }

    for issue in entity.issues() {
        let check = match issue.field.as_str() {
            "cost_gp" | "weight_kg" => Check::InvalidCostWeight,
            _ => Check::UnparsedField,
        };
        found.push((check, format!("undecodable {}: {:?}", issue.field, issue.raw)));
    }

    if entity.kind().has_description() {
        let len = entity.description().map_or(0, |d| d.trim().chars().count());
        if len < settings.min_description_len {
            found.push((
                Check::ShortDescription,
                format!("description has {len} characters (minimum {})", settings.min_description_len),
            ));
        }
    }

    for raw in entity.unresolved() {
        found.push((Check::UnresolvedReference, format!("unresolved reference {raw:?}")));
    }

    if let Some(what) = entity.missing_composite() {
        found.push((Check::MissingComposite, format!("missing {what}")));
    }

    found
}

/// Apply every check; records with an error-severity finding are marked blocked.
pub fn validate(
    entities: &[ParsedEntity],
    failures: &[BlockFailure],
    settings: &ValidateSettings,
) -> ValidationReport {
    let checks = &settings.checks;
    let mut report = ValidationReport::default();
    let mut ids = HashMap::new();
    let mut names = HashMap::new();

    for (idx, entity) in entities.iter().enumerate() {
        let mut findings = EntityFindings {
            kind: entity.kind(),
            id: entity.id().to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        for (check, message) in inspect(idx, entity, settings, &mut ids, &mut names) {
            let severity = check.severity(checks);
            let qualified = format!("{}/{}: {}", entity.kind(), entity.id(), message);
            match severity {
                Severity::Error => findings.errors.push(message),
                Severity::Warning => findings.warnings.push(message),
                Severity::Off => continue,
            }
            report.push(severity, qualified);
        }

        if !findings.errors.is_empty() {
            debug!(kind = %entity.kind(), id = %entity.id(), "Record blocked");
            report.blocked.insert(idx);
        }
        if !findings.errors.is_empty() || !findings.warnings.is_empty() {
            report.entities.push(findings);
        }
    }

    let severity = Check::UnparsableBlock.severity(checks);
    for failure in failures {
        report.push(
            severity,
            format!(
                "{}/{}: unparsable block at line {}: {}",
                failure.kind, failure.header, failure.line, failure.reason
            ),
        );
    }

    let resolved: usize = entities.iter().map(ParsedEntity::resolved_count).sum();
    let unresolved: usize = entities.iter().map(|e| e.unresolved().len()).sum();
    report.stats = ValidationStats {
        total_items: entities
            .iter()
            .filter(|e| {
                matches!(
                    e.kind(),
                    EntityKind::Gear | EntityKind::Weapon | EntityKind::Armor | EntityKind::Tool
                )
            })
            .count(),
        total_equipment: entities
            .iter()
            .filter(|e| e.kind() == EntityKind::EquipmentPackage)
            .count(),
        total_references: resolved + unresolved,
        valid_references: resolved,
        invalid_references: unresolved,
    };
    report.valid = report.errors.is_empty();

    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        blocked = report.blocked.len(),
        "Validation complete"
    );
    report
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EquipmentPackage, Gear, PackageData, ParseIssue};

    fn gear(id: &str, name: &str) -> ParsedEntity {
        ParsedEntity::Gear(Gear {
            id: id.into(),
            name: name.into(),
            description: Some("Ein ganz gewöhnlicher Gegenstand.".into()),
            cost_gp: Some(1.0),
            weight_kg: Some(1.0),
            ..Gear::default()
        })
    }

    #[test]
    fn duplicate_id_is_an_error_and_blocks_the_later_record() {
        let entities = vec![gear("beil", "Beil"), gear("beil", "Handbeil")];
        let report = validate(&entities, &[], &ValidateSettings::default());
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("gear/beil: duplicate id"));
        assert!(!report.is_blocked(0));
        assert!(report.is_blocked(1));
    }

    #[test]
    fn same_name_different_id_is_a_warning() {
        let entities = vec![gear("beil", "Beil"), gear("beil-2", "BEIL")];
        let report = validate(&entities, &[], &ValidateSettings::default());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("also used by beil"));
        assert!(report.blocked.is_empty());
    }

    #[test]
    fn parse_issues_and_short_descriptions_warn() {
        let mut short = Gear {
            id: "seil".into(),
            name: "Seil".into(),
            description: Some("Kurz.".into()),
            ..Gear::default()
        };
        short.issues.push(ParseIssue::new("cost_gp", "12 XY"));
        short.issues.push(ParseIssue::new("properties", "Klebrig"));
        let report = validate(&[ParsedEntity::Gear(short)], &[], &ValidateSettings::default());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.entities[0].warnings.len(), 3);
    }

    #[test]
    fn missing_composite_and_unresolved_reference() {
        let empty = EquipmentPackage {
            id: "leer".into(),
            name: "Leer".into(),
            description: "Eine Ausrüstung ohne jeden Inhalt.".into(),
            ..EquipmentPackage::default()
        };
        let partial = EquipmentPackage {
            id: "halb".into(),
            name: "Halb".into(),
            description: "Eine Ausrüstung mit unbekanntem Inhalt.".into(),
            data: PackageData { raw_items: vec!["Einhornhorn".into()] },
            unresolved: vec!["Einhornhorn".into()],
            ..EquipmentPackage::default()
        };
        let entities = vec![
            ParsedEntity::EquipmentPackage(empty),
            ParsedEntity::EquipmentPackage(partial),
        ];
        let report = validate(&entities, &[], &ValidateSettings::default());
        assert!(report.is_blocked(0));
        assert!(!report.is_blocked(1));
        assert_eq!(report.stats.total_equipment, 2);
        assert_eq!(report.stats.invalid_references, 1);
        assert_eq!(report.stats.total_references, 1);
    }

    #[test]
    fn unparsable_blocks_follow_configured_severity() {
        let failure = BlockFailure {
            kind: EntityKind::Spell,
            header: "SCHLAF".into(),
            line: 12,
            reason: "block ended before a type line".into(),
        };
        let report = validate(&[], std::slice::from_ref(&failure), &ValidateSettings::default());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);

        let mut settings = ValidateSettings::default();
        settings.checks.unparsable_block = Severity::Error;
        assert!(!validate(&[], std::slice::from_ref(&failure), &settings).valid);

        settings.checks.unparsable_block = Severity::Off;
        let report = validate(&[], &[failure], &settings);
        assert!(report.warnings.is_empty() && report.errors.is_empty());
    }
}
