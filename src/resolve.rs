//! Cross-reference resolution: free-text item mentions in packages and
//! background equipment options → canonical `(kind, id)` catalog references.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ResolveSettings;
use crate::error::PipelineError;
use crate::model::{EntityKind, ItemRef, ParsedEntity, ToolProficiency};
use crate::utils::{collapse_whitespace, fold_name, slugify};

static TRAILING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<head>.+?)\s*\((?P<inner>[^()]*)\)$").unwrap());

/// One addressable record of the item catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cost_gp: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

/// Catalog entries for every extracted record a reference may point at.
pub fn catalog_from(entities: &[ParsedEntity]) -> Vec<CatalogEntry> {
    entities
        .iter()
        .filter(|e| e.kind().is_catalog())
        .map(|e| CatalogEntry {
            kind: e.kind(),
            id: e.id().to_string(),
            name: e.name().to_string(),
            cost_gp: e.cost_gp(),
            weight_kg: e.weight_kg(),
        })
        .collect()
}

/// External catalog: a JSON array of `{kind, id, name, cost_gp?, weight_kg?}`.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()).into());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let entries = serde_json::from_str(&text)
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Alias,
    ExactId,
    Slug,
    Name,
    /// Catalog name with its parenthetical dropped: `Öl` for `Öl (Flasche)`.
    BaseName,
    Singular,
    /// `Kleidung (fein)` found as `Kleidung, fein`.
    Variant,
}

impl MatchMethod {
    /// Everything but id, slug and full-name matches is a heuristic and gets audited.
    pub fn is_exact(self) -> bool {
        matches!(self, MatchMethod::ExactId | MatchMethod::Slug | MatchMethod::Name)
    }
}

/// A reference split into its base name and quantity phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct RefParts {
    pub base_name: String,
    pub quantity: u32,
    pub unit: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    entry: usize,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub raw: String,
    pub parts: RefParts,
    pub target: Option<Match>,
}

pub struct ReferenceIndex {
    entries: Vec<CatalogEntry>,
    ids: HashMap<String, usize>,
    slugs: HashMap<String, usize>,
    names: HashMap<String, usize>,
    bases: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
    number_words: HashMap<String, u32>,
    plural_suffixes: Vec<String>,
}

impl ReferenceIndex {
    /// Build the multi-key index. Earlier entries win every key they share with later ones.
    pub fn build(entries: Vec<CatalogEntry>, settings: &ResolveSettings) -> Self {
        let mut index = ReferenceIndex {
            entries,
            ids: HashMap::new(),
            slugs: HashMap::new(),
            names: HashMap::new(),
            bases: HashMap::new(),
            aliases: HashMap::new(),
            number_words: settings
                .number_words
                .iter()
                .map(|n| (n.word.to_lowercase(), n.value))
                .collect(),
            plural_suffixes: settings.plural_suffixes.clone(),
        };

        for (i, entry) in index.entries.iter().enumerate() {
            index.ids.entry(entry.id.clone()).or_insert(i);
            index.slugs.entry(slugify(&entry.name)).or_insert(i);
            index.names.entry(fold_name(&entry.name)).or_insert(i);
        }
        // `Öl (Flasche)` is also reachable as `Öl`, unless a full name already is.
        for (i, entry) in index.entries.iter().enumerate() {
            if let Some(caps) = TRAILING_PAREN_RE.captures(&entry.name) {
                let key = slugify(&caps["head"]);
                if !index.slugs.contains_key(&key) {
                    index.bases.entry(key).or_insert(i);
                }
            }
        }

        for alias in &settings.aliases {
            let key = slugify(&alias.from);
            if index.ids.contains_key(&key) {
                warn!(alias = %alias.from, "Alias shadows a canonical id; dropped");
                continue;
            }
            match index.direct(&alias.to) {
                Some((target, _)) => {
                    index.aliases.insert(key, target);
                }
                None => debug!(alias = %alias.from, target = %alias.to, "Alias target not in catalog; dropped"),
            }
        }

        info!(
            entries = index.entries.len(),
            aliases = index.aliases.len(),
            "Reference index built"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, m: Match) -> &CatalogEntry {
        &self.entries[m.entry]
    }

    fn count_word(&self, token: &str) -> Option<u32> {
        if token.chars().all(|c| c.is_ascii_digit()) {
            return token.parse().ok();
        }
        self.number_words.get(&token.to_lowercase()).copied()
    }

    /// `(count, rest)` when `text` is a count followed by at least one more word.
    fn leading_count<'a>(&self, text: &'a str) -> Option<(u32, &'a str)> {
        let (first, rest) = text.split_once(char::is_whitespace)?;
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        self.count_word(first).map(|n| (n, rest))
    }

    pub fn decompose(&self, raw: &str) -> RefParts {
        let text = collapse_whitespace(raw.trim().trim_end_matches('.'));

        let (head, inner) = match TRAILING_PAREN_RE.captures(&text) {
            Some(caps) => (caps["head"].to_string(), Some(caps["inner"].trim().to_string())),
            None => (text.clone(), None),
        };

        // `Kreide (10 Stück)`, `Öl (drei Flaschen)`
        if let Some((quantity, unit)) = inner.as_deref().and_then(|i| self.leading_count(i)) {
            return RefParts {
                base_name: head,
                quantity,
                unit: Some(unit.to_string()),
                variant: None,
            };
        }

        // `zehn Fackeln`, `einen Rucksack`; a trailing parenthetical is a variant.
        let (quantity, base) = self.leading_count(&head).unwrap_or((1, head.as_str()));
        RefParts {
            base_name: base.to_string(),
            quantity,
            unit: None,
            variant: inner.filter(|v| !v.is_empty()),
        }
    }

    /// Exact id, then slug, then case-folded name, then name without its parenthetical.
    fn direct(&self, name: &str) -> Option<(usize, MatchMethod)> {
        if let Some(&i) = self.ids.get(name) {
            return Some((i, MatchMethod::ExactId));
        }
        let slug = slugify(name);
        if let Some(&i) = self.slugs.get(&slug) {
            return Some((i, MatchMethod::Slug));
        }
        if let Some(&i) = self.names.get(&fold_name(name)) {
            return Some((i, MatchMethod::Name));
        }
        self.bases.get(&slug).map(|&i| (i, MatchMethod::BaseName))
    }

    pub fn lookup(&self, base: &str) -> Option<(usize, MatchMethod)> {
        if let Some(&i) = self.aliases.get(&slugify(base)) {
            return Some((i, MatchMethod::Alias));
        }
        if let Some(found) = self.direct(base) {
            return Some(found);
        }
        for suffix in &self.plural_suffixes {
            let Some(stem) = base.strip_suffix(suffix.as_str()) else {
                continue;
            };
            if stem.chars().count() < 3 {
                continue;
            }
            if let Some((i, _)) = self.direct(stem) {
                return Some((i, MatchMethod::Singular));
            }
        }
        None
    }

    pub fn resolve(&self, raw: &str) -> Reference {
        let parts = self.decompose(raw);
        let found = self.lookup(&parts.base_name).or_else(|| {
            // `Kleidung (fein)` may only exist as `Kleidung, fein`.
            let variant = parts.variant.as_deref()?;
            self.direct(&format!("{} {}", parts.base_name, variant))
                .map(|(i, _)| (i, MatchMethod::Variant))
        });
        Reference {
            raw: raw.to_string(),
            parts,
            target: found.map(|(entry, method)| Match { entry, method }),
        }
    }
}

/// One non-exact resolution, kept for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub owner_kind: EntityKind,
    pub owner_id: String,
    pub raw: String,
    pub base_name: String,
    pub matched_kind: EntityKind,
    pub matched_id: String,
    pub method: MatchMethod,
}

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub entities: Vec<ParsedEntity>,
    pub audit: Vec<AuditEntry>,
}

struct Resolver<'a> {
    index: &'a ReferenceIndex,
    owner_kind: EntityKind,
    owner_id: String,
    audit: Vec<AuditEntry>,
}

impl Resolver<'_> {
    /// Resolved `ItemRef`, or `None` when the mention matches nothing.
    fn item(&mut self, raw: &str) -> Option<ItemRef> {
        let reference = self.index.resolve(raw);
        let m = reference.target?;
        let entry = self.index.entry(m);
        if !m.method.is_exact() {
            info!(
                owner = %self.owner_id,
                raw = %raw,
                matched = %entry.id,
                method = ?m.method,
                "Non-exact reference match"
            );
            self.audit.push(AuditEntry {
                owner_kind: self.owner_kind,
                owner_id: self.owner_id.clone(),
                raw: raw.to_string(),
                base_name: reference.parts.base_name.clone(),
                matched_kind: entry.kind,
                matched_id: entry.id.clone(),
                method: m.method,
            });
        }
        Some(ItemRef {
            kind: entry.kind,
            id: entry.id.clone(),
            quantity: reference.parts.quantity,
            unit: reference.parts.unit,
            variant: reference.parts.variant,
        })
    }

    fn weight_of(&self, item: &ItemRef) -> Option<f64> {
        self.index
            .entries
            .iter()
            .find(|e| e.kind == item.kind && e.id == item.id)
            .and_then(|e| e.weight_kg)
    }
}

fn resolve_entity(entity: ParsedEntity, index: &ReferenceIndex) -> (ParsedEntity, Vec<AuditEntry>) {
    let mut resolver = Resolver {
        index,
        owner_kind: entity.kind(),
        owner_id: entity.id().to_string(),
        audit: Vec::new(),
    };

    let entity = match entity {
        ParsedEntity::EquipmentPackage(mut p) => {
            p.items.clear();
            p.tools.clear();
            p.unresolved.clear();
            for raw in &p.data.raw_items {
                match resolver.item(raw) {
                    Some(item) if item.kind == EntityKind::Tool => p.tools.push(item),
                    Some(item) => p.items.push(item),
                    None => p.unresolved.push(raw.clone()),
                }
            }
            p.total_weight_kg = if p.unresolved.is_empty() && !p.data.raw_items.is_empty() {
                p.items
                    .iter()
                    .chain(&p.tools)
                    .map(|item| resolver.weight_of(item).map(|kg| kg * f64::from(item.quantity)))
                    .sum::<Option<f64>>()
                    .map(|kg| (kg * 10_000.0).round() / 10_000.0)
            } else {
                None
            };
            ParsedEntity::EquipmentPackage(p)
        }
        ParsedEntity::Background(mut b) => {
            b.unresolved.clear();
            for option in &mut b.data.starting_equipment {
                option.items.clear();
                for raw in &option.raw_items {
                    match resolver.item(raw) {
                        Some(item) => option.items.push(item),
                        None => b.unresolved.push(raw.clone()),
                    }
                }
            }
            if let Some(ToolProficiency::Fixed { name, id }) = &mut b.data.tool {
                match resolver.item(name) {
                    Some(item) => *id = Some(item.id),
                    None => b.unresolved.push(name.clone()),
                }
            }
            ParsedEntity::Background(b)
        }
        other => other,
    };

    (entity, resolver.audit)
}

/// Resolve every package and background against the shared index.
pub fn resolve_all(entities: Vec<ParsedEntity>, index: &ReferenceIndex) -> ResolveOutcome {
    let resolved: Vec<(ParsedEntity, Vec<AuditEntry>)> = entities
        .into_par_iter()
        .map(|e| resolve_entity(e, index))
        .collect();

    let mut outcome = ResolveOutcome::default();
    for (entity, audit) in resolved {
        outcome.entities.push(entity);
        outcome.audit.extend(audit);
    }
    outcome
}

/// Number of free-text references the composites carry.
pub fn reference_count(entities: &[ParsedEntity]) -> usize {
    entities
        .iter()
        .map(|e| match e {
            ParsedEntity::EquipmentPackage(p) => p.data.raw_items.len(),
            ParsedEntity::Background(b) => {
                b.data
                    .starting_equipment
                    .iter()
                    .map(|o| o.raw_items.len())
                    .sum::<usize>()
                    + usize::from(matches!(b.data.tool, Some(ToolProficiency::Fixed { .. })))
            }
            _ => 0,
        })
        .sum()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Replacement;
    use crate::model::{Background, BackgroundData, EquipmentOption, EquipmentPackage, PackageData};

    fn entry(kind: EntityKind, name: &str, weight_kg: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            kind,
            id: slugify(name),
            name: name.to_string(),
            cost_gp: None,
            weight_kg,
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            entry(EntityKind::Gear, "Öl", Some(0.5)),
            entry(EntityKind::Gear, "Fackel", Some(0.5)),
            entry(EntityKind::Gear, "Rucksack", Some(2.5)),
            entry(EntityKind::Gear, "Kreide", Some(0.0)),
            entry(EntityKind::Gear, "Rationen (1 Tag)", Some(1.0)),
            entry(EntityKind::Gear, "Kleidung, fein", Some(3.0)),
            entry(EntityKind::Gear, "Pergament", None),
            entry(EntityKind::Tool, "Diebeswerkzeug", Some(0.5)),
            entry(EntityKind::Weapon, "Beil", Some(1.0)),
        ]
    }

    fn index() -> ReferenceIndex {
        ReferenceIndex::build(catalog(), &ResolveSettings::default())
    }

    fn resolved_id(index: &ReferenceIndex, raw: &str) -> Option<(String, MatchMethod)> {
        let r = index.resolve(raw);
        r.target.map(|m| (index.entry(m).id.clone(), m.method))
    }

    #[test]
    fn decomposes_quantity_shapes() {
        let index = index();
        assert_eq!(
            index.decompose("Öl (drei Flaschen)"),
            RefParts { base_name: "Öl".into(), quantity: 3, unit: Some("Flaschen".into()), variant: None }
        );
        assert_eq!(
            index.decompose("Kreide (10 Stück)"),
            RefParts { base_name: "Kreide".into(), quantity: 10, unit: Some("Stück".into()), variant: None }
        );
        assert_eq!(index.decompose("zehn Fackeln").quantity, 10);
        assert_eq!(index.decompose("zehn Fackeln").base_name, "Fackeln");
        assert_eq!(index.decompose("einen Rucksack").base_name, "Rucksack");
        assert_eq!(
            index.decompose("Kleidung (fein)"),
            RefParts { base_name: "Kleidung".into(), quantity: 1, unit: None, variant: Some("fein".into()) }
        );
    }

    #[test]
    fn oil_in_bottles_resolves_to_oil() {
        let index = index();
        assert_eq!(resolved_id(&index, "Öl (drei Flaschen)"), Some(("oel".into(), MatchMethod::Slug)));
    }

    #[test]
    fn canonical_ids_resolve_to_themselves() {
        let index = index();
        for e in catalog() {
            assert_eq!(resolved_id(&index, &e.id), Some((e.id.clone(), MatchMethod::ExactId)));
        }
    }

    #[test]
    fn canonical_names_resolve_completely() {
        let index = index();
        for e in catalog() {
            assert_eq!(resolved_id(&index, &e.name).map(|(id, _)| id), Some(e.id.clone()));
        }
    }

    #[test]
    fn heuristic_matches() {
        let index = index();
        assert_eq!(resolved_id(&index, "zehn Fackeln"), Some(("fackel".into(), MatchMethod::Singular)));
        assert_eq!(resolved_id(&index, "zwei Flaschen Öl"), Some(("oel".into(), MatchMethod::Alias)));
        assert_eq!(
            resolved_id(&index, "Tagesrationen"),
            Some(("rationen-1-tag".into(), MatchMethod::Alias))
        );
        assert_eq!(
            resolved_id(&index, "feine Kleidung"),
            Some(("kleidung-fein".into(), MatchMethod::Alias))
        );
        assert_eq!(
            resolved_id(&index, "Rationen"),
            Some(("rationen-1-tag".into(), MatchMethod::BaseName))
        );
        assert_eq!(
            resolved_id(&index, "Kleidung (fein)"),
            Some(("kleidung-fein".into(), MatchMethod::Variant))
        );
        assert!(!MatchMethod::BaseName.is_exact());
        assert!(!MatchMethod::Variant.is_exact());
        assert_eq!(resolved_id(&index, "Einhornhorn"), None);
    }

    #[test]
    fn alias_equal_to_canonical_id_is_dropped() {
        let mut settings = ResolveSettings::default();
        settings.aliases = vec![Replacement { from: "Fackel".into(), to: "oel".into() }];
        let index = ReferenceIndex::build(catalog(), &settings);
        assert_eq!(resolved_id(&index, "fackel"), Some(("fackel".into(), MatchMethod::ExactId)));
    }

    #[test]
    fn packages_split_tools_and_total_weight() {
        let package = EquipmentPackage {
            id: "einbrecherausruestung".into(),
            name: "Einbrecherausrüstung".into(),
            data: PackageData {
                raw_items: vec!["ein Rucksack".into(), "zehn Fackeln".into(), "Diebeswerkzeug".into()],
            },
            ..EquipmentPackage::default()
        };
        let outcome = resolve_all(vec![ParsedEntity::EquipmentPackage(package)], &index());
        let ParsedEntity::EquipmentPackage(p) = &outcome.entities[0] else {
            panic!("package expected");
        };
        assert_eq!(p.items.len(), 2);
        assert_eq!(p.tools[0].id, "diebeswerkzeug");
        assert!(p.unresolved.is_empty());
        assert_eq!(p.total_weight_kg, Some(8.0));
        assert_eq!(outcome.audit.len(), 1);
        assert_eq!(outcome.audit[0].method, MatchMethod::Singular);
    }

    #[test]
    fn unresolved_and_unknown_weight_leave_total_absent() {
        let package = EquipmentPackage {
            id: "schreiberausruestung".into(),
            data: PackageData { raw_items: vec!["Pergament".into(), "Einhornhorn".into()] },
            ..EquipmentPackage::default()
        };
        let outcome = resolve_all(vec![ParsedEntity::EquipmentPackage(package)], &index());
        let ParsedEntity::EquipmentPackage(p) = &outcome.entities[0] else {
            panic!("package expected");
        };
        assert_eq!(p.unresolved, vec!["Einhornhorn"]);
        assert_eq!(p.total_weight_kg, None);
    }

    #[test]
    fn background_options_and_fixed_tool() {
        let background = Background {
            id: "krimineller".into(),
            data: BackgroundData {
                tool: Some(ToolProficiency::Fixed { name: "Diebeswerkzeug".into(), id: None }),
                starting_equipment: vec![EquipmentOption {
                    label: "A".into(),
                    raw_items: vec!["Beil".into(), "Einhornhorn".into()],
                    ..EquipmentOption::default()
                }],
                ..BackgroundData::default()
            },
            ..Background::default()
        };
        let entities = vec![ParsedEntity::Background(background)];
        assert_eq!(reference_count(&entities), 3);

        let outcome = resolve_all(entities, &index());
        let ParsedEntity::Background(b) = &outcome.entities[0] else {
            panic!("background expected");
        };
        assert_eq!(b.data.starting_equipment[0].items[0].kind, EntityKind::Weapon);
        assert_eq!(b.unresolved, vec!["Einhornhorn"]);
        assert_eq!(
            b.data.tool,
            Some(ToolProficiency::Fixed { name: "Diebeswerkzeug".into(), id: Some("diebeswerkzeug".into()) })
        );
    }

    #[test]
    fn missing_catalog_file_is_fatal() {
        let err = load_catalog(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
    }
}
