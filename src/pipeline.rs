use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::PipelineError;
use crate::model::{EntityKind, ParsedEntity};
use crate::output;
use crate::parser::extract::BlockFailure;
use crate::parser::normalize::{normalize, AppliedFix, RawDocument};
use crate::parser::rules::Rules;
use crate::parser::{self, Extraction};
use crate::resolve::{self, AuditEntry, ReferenceIndex};
use crate::seed::{self, SeedScript};
use crate::source::DocumentSource;
use crate::validate::{self, ValidationReport};

/// Read and normalize the input. A document with no text left is fatal.
pub fn load_document(source: &dyn DocumentSource, input: &Path, rules: &Rules) -> Result<RawDocument> {
    let text = source.extract(input)?;
    let doc = normalize(&text, &rules.normalize);
    if doc.is_blank() {
        return Err(PipelineError::EmptyDocument(input.to_path_buf()).into());
    }
    for fix in &doc.fixes {
        debug!(from = %fix.from, to = %fix.to, count = fix.count, "Encoding fix applied");
    }
    info!(lines = doc.len(), fixes = doc.fixes.len(), "Document normalized");
    Ok(doc)
}

/// Everything one extraction run produced, held in memory until written.
#[derive(Debug)]
pub struct Run {
    pub lines: usize,
    pub fixes: Vec<AppliedFix>,
    pub entities: Vec<ParsedEntity>,
    pub failures: Vec<BlockFailure>,
    pub catalog_size: usize,
    pub report: ValidationReport,
    pub scripts: Vec<SeedScript>,
    pub audit: Vec<AuditEntry>,
}

impl Run {
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn emitted(&self) -> usize {
        self.scripts.iter().map(|s| s.rows).sum()
    }

    pub fn write(&self, out_dir: &Path) -> Result<()> {
        output::write_all(out_dir, &self.entities, &self.report, &self.scripts, &self.audit)
    }
}

/// Normalize, extract, resolve, validate and build seeds. Nothing touches disk
/// besides reading the input and the optional external catalog.
pub fn run<F>(
    source: &dyn DocumentSource,
    input: &Path,
    settings: &Settings,
    catalog: Option<&Path>,
    on_family: F,
) -> Result<Run>
where
    F: Fn(EntityKind) + Sync,
{
    let rules = Rules::compile(settings)?;
    let doc = load_document(source, input, &rules)?;

    let Extraction { entities, failures } = parser::extract_all(&doc, &rules, on_family);
    info!(entities = entities.len(), failures = failures.len(), "Extraction complete");

    let mut entries = resolve::catalog_from(&entities);
    if let Some(path) = catalog {
        let external = resolve::load_catalog(path)?;
        info!(path = %path.display(), entries = external.len(), "External catalog loaded");
        entries.extend(external);
    }

    let index = ReferenceIndex::build(entries, &settings.resolve);
    let references = resolve::reference_count(&entities);
    if index.is_empty() && references > 0 {
        return Err(PipelineError::MissingCatalog(references).into());
    }
    let catalog_size = index.len();
    let resolved = resolve::resolve_all(entities, &index);

    let report = validate::validate(&resolved.entities, &failures, &settings.validate);
    let scripts = seed::emit(&resolved.entities, &report)?;

    Ok(Run {
        lines: doc.len(),
        fixes: doc.fixes,
        entities: resolved.entities,
        failures,
        catalog_size,
        report,
        scripts,
        audit: resolved.audit,
    })
}

// ── Tests ──
