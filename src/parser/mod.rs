pub mod blocks;
pub mod decode;
pub mod extract;
pub mod fields;
pub mod normalize;
pub mod rules;

use rayon::prelude::*;

use crate::model::{EntityKind, ParsedEntity};
use extract::{BlockFailure, FamilyOutput};
use normalize::RawDocument;
use rules::Rules;

/// Every family's records and rejected blocks, in `EntityKind::ALL` order.
#[derive(Debug, Default)]
pub struct Extraction {
    pub entities: Vec<ParsedEntity>,
    pub failures: Vec<BlockFailure>,
}

/// Families are independent once the document is normalized: run them in
/// parallel, then merge in kind order so output stays deterministic.
pub fn extract_all(doc: &RawDocument, rules: &Rules, on_done: impl Fn(EntityKind) + Sync) -> Extraction {
    let outputs: Vec<FamilyOutput> = EntityKind::ALL
        .par_iter()
        .map(|&kind| {
            let out = extract::extract_family(kind, doc, rules);
            on_done(kind);
            out
        })
        .collect();

    let mut all = Extraction::default();
    for out in outputs {
        all.entities.extend(out.entities);
        all.failures.extend(out.failures);
    }
    all
}
