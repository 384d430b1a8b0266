use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::model::{EntityKind, ParsedEntity};
use crate::resolve::AuditEntry;
use crate::seed::SeedScript;
use crate::validate::ValidationReport;

pub const ENTITIES_DIR: &str = "entities";
pub const SEEDS_DIR: &str = "seeds";
pub const REPORT_FILE: &str = "validation_report.json";
pub const AUDIT_FILE: &str = "resolution_audit.json";

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to encode {}", path.display()))?;
    fs::write(path, json + "\n").with_context(|| format!("Failed to write {}", path.display()))
}

/// Everything a finished run produces. Called once, after every stage succeeded.
pub fn write_all(
    out_dir: &Path,
    entities: &[ParsedEntity],
    report: &ValidationReport,
    scripts: &[SeedScript],
    audit: &[AuditEntry],
) -> Result<()> {
    let entities_dir = out_dir.join(ENTITIES_DIR);
    let seeds_dir = out_dir.join(SEEDS_DIR);
    fs::create_dir_all(&entities_dir)
        .with_context(|| format!("Failed to create {}", entities_dir.display()))?;
    fs::create_dir_all(&seeds_dir)
        .with_context(|| format!("Failed to create {}", seeds_dir.display()))?;

    for kind in EntityKind::ALL {
        let records: Vec<&ParsedEntity> = entities
            .iter()
            .enumerate()
            .filter(|(idx, e)| e.kind() == kind && !report.is_blocked(*idx))
            .map(|(_, e)| e)
            .collect();
        write_json(&entities_dir.join(format!("{}.json", kind.as_str())), &records)?;
    }

    for script in scripts {
        let path = seeds_dir.join(&script.file_name);
        fs::write(&path, &script.sql).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    write_json(&out_dir.join(REPORT_FILE), report)?;
    write_json(&out_dir.join(AUDIT_FILE), audit)?;

    info!(dir = %out_dir.display(), "Output written");
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Gear;
    use crate::seed;

    #[test]
    fn writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let entities = vec![
            ParsedEntity::Gear(Gear {
                id: "seil".into(),
                name: "Seil".into(),
                cost_gp: Some(1.0),
                ..Gear::default()
            }),
            ParsedEntity::Gear(Gear {
                id: "seil".into(),
                name: "Seil".into(),
                ..Gear::default()
            }),
        ];
        let mut report = ValidationReport::default();
        report.blocked.insert(1);
        let scripts = seed::emit(&entities, &report).unwrap();

        write_all(dir.path(), &entities, &report, &scripts, &[]).unwrap();

        let gear = fs::read_to_string(dir.path().join("entities/gear.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&gear).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(1));
        assert_eq!(parsed[0]["cost_gp"], 1.0);

        let spells = fs::read_to_string(dir.path().join("entities/spell.json")).unwrap();
        assert_eq!(spells.trim(), "[]");

        for kind in EntityKind::ALL {
            let seed = dir.path().join(SEEDS_DIR).join(format!("{}_seed.sql", kind.as_str()));
            assert!(seed.exists(), "missing {}", seed.display());
        }

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap()).unwrap();
        assert!(report["stats"].get("totalItems").is_some());
        assert!(report.get("blocked").is_none());
        assert_eq!(fs::read_to_string(dir.path().join(AUDIT_FILE)).unwrap().trim(), "[]");
    }
}
