use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::model::EntityKind;
use crate::seed;

pub const DEFAULT_DB_PATH: &str = "data/rulebook.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS core_spells (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            level         INTEGER NOT NULL CHECK(level BETWEEN 0 AND 9),
            school        TEXT NOT NULL,
            casting_time  TEXT,
            range         TEXT,
            components    TEXT,
            duration      TEXT,
            concentration BOOLEAN NOT NULL DEFAULT 0,
            ritual        BOOLEAN NOT NULL DEFAULT 0,
            description   TEXT NOT NULL,
            higher_levels TEXT,
            classes       TEXT NOT NULL DEFAULT '[]',
            data          TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_spells_level ON core_spells(level);

        CREATE TABLE IF NOT EXISTS core_weapons (
            id           TEXT PRIMARY KEY,
            name         TEXT NOT NULL,
            category     TEXT NOT NULL,
            weapon_type  TEXT NOT NULL,
            damage_dice  TEXT,
            damage_type  TEXT,
            weight_kg    REAL,
            cost_gp      REAL,
            data         TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS core_armors (
            id                   TEXT PRIMARY KEY,
            name                 TEXT NOT NULL,
            category             TEXT NOT NULL,
            base_ac              INTEGER,
            strength_requirement INTEGER,
            stealth_disadvantage BOOLEAN NOT NULL DEFAULT 0,
            weight_kg            REAL,
            cost_gp              REAL,
            data                 TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS core_tools (
            id        TEXT PRIMARY KEY,
            name      TEXT NOT NULL,
            category  TEXT NOT NULL,
            cost_gp   REAL,
            weight_kg REAL,
            data      TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS core_items (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            cost_gp     REAL,
            weight_kg   REAL,
            category    TEXT NOT NULL,
            data        TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS core_equipment (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            description     TEXT NOT NULL,
            total_cost_gp   REAL,
            total_weight_kg REAL,
            items           TEXT NOT NULL DEFAULT '[]',
            tools           TEXT NOT NULL DEFAULT '[]',
            data            TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS core_backgrounds (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL,
            data        TEXT NOT NULL DEFAULT '{}'
        );
        ",
    )?;
    Ok(())
}

/// Run every `<kind>_seed.sql` found in `dir` inside one transaction.
/// Returns the number of scripts applied.
pub fn apply_seeds(conn: &Connection, dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingInput(dir.to_path_buf()).into());
    }

    let tx = conn.unchecked_transaction()?;
    let mut applied = 0;
    for kind in EntityKind::ALL {
        let path = dir.join(format!("{}_seed.sql", kind.as_str()));
        if !path.exists() {
            debug!(path = %path.display(), "No seed script");
            continue;
        }
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tx.execute_batch(&sql)
            .with_context(|| format!("Failed to apply {}", path.display()))?;
        applied += 1;
    }
    tx.commit()?;

    info!(applied, "Seed scripts applied");
    Ok(applied)
}

/// Row count per core table, in kind order.
pub fn table_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let table = seed::table(kind);
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        counts.push((table, n));
    }
    Ok(counts)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Armor, Gear, ParsedEntity};
    use crate::validate::ValidationReport;

    fn write_seeds(dir: &Path, entities: &[ParsedEntity]) {
        for script in seed::emit(entities, &ValidationReport::default()).unwrap() {
            fs::write(dir.join(&script.file_name), &script.sql).unwrap();
        }
    }

    #[test]
    fn seeds_load_and_replace_table_contents() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("db/rulebook.sqlite")).unwrap();
        init_schema(&conn).unwrap();

        let entities = vec![
            ParsedEntity::Gear(Gear {
                id: "seil".into(),
                name: "Seil".into(),
                description: Some("Ein Hanfseil, 15 Meter lang. Es hat 2 TP.".into()),
                cost_gp: Some(1.0),
                weight_kg: Some(2.5),
                category: "Abenteuerausrüstung".into(),
                ..Gear::default()
            }),
            ParsedEntity::Armor(Armor {
                id: "kettenhemd".into(),
                name: "Kettenhemd".into(),
                category: "Mittelschwere Rüstung".into(),
                base_ac: Some(13),
                ..Armor::default()
            }),
        ];
        write_seeds(dir.path(), &entities);

        assert_eq!(apply_seeds(&conn, dir.path()).unwrap(), EntityKind::ALL.len());
        assert_eq!(apply_seeds(&conn, dir.path()).unwrap(), EntityKind::ALL.len());

        let counts = table_counts(&conn).unwrap();
        assert!(counts.contains(&("core_items", 1)));
        assert!(counts.contains(&("core_armors", 1)));
        assert!(counts.contains(&("core_spells", 0)));

        let weight: f64 = conn
            .query_row("SELECT weight_kg FROM core_items WHERE id = 'seil'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(weight, 2.5);
    }

    #[test]
    fn missing_seed_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("rulebook.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        assert!(apply_seeds(&conn, &dir.path().join("seeds")).is_err());
    }
}
