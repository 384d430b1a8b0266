use tracing::{debug, warn};

use super::normalize::RawDocument;
use super::rules::{FamilyRules, SegmentRules};
use crate::config::Region;
use crate::model::EntityKind;
use crate::utils::is_upper_line;

/// A contiguous `[start, end)` line range believed to describe one entity.
/// `start` is the header line.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBlock {
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
    pub header: String,
    /// Captured appended suffix, e.g. `50 GM` from `ALCHEMISTENAUSRÜSTUNG (50 GM)`.
    pub suffix: Option<String>,
}

/// Resolve a family region to a line range. A missing start marker means the
/// whole document, a missing end marker means the end of it.
pub fn region_bounds(doc: &RawDocument, region: &Region) -> (usize, usize) {
    let lo = match region.start.as_deref() {
        Some(marker) => match doc.find_line(marker, 0) {
            Some(i) => i + 1,
            None => {
                warn!("Region start marker {:?} not found; scanning whole document", marker);
                0
            }
        },
        None => 0,
    };
    let hi = region
        .end
        .as_deref()
        .and_then(|marker| doc.find_line(marker, lo))
        .unwrap_or(doc.len());
    (lo, hi)
}

/// Header candidate check. Returns the header text and the stripped suffix.
pub fn header_candidate(
    line: &str,
    family: &FamilyRules,
    seg: &SegmentRules,
) -> Option<(String, Option<String>)> {
    let line = line.trim();
    let (body, suffix) = match family.header_suffix.as_ref().and_then(|re| re.captures(line)) {
        Some(caps) => {
            let whole = caps.get(0)?;
            (line[..whole.start()].trim_end(), caps.get(1).map(|m| m.as_str().to_string()))
        }
        None => (line, None),
    };

    let len = body.chars().count();
    if len < seg.header_min_len
        || len > seg.header_max_len
        || body.contains(':')
        || body.contains('(')
        || !is_upper_line(body)
        || seg.denylist.contains(body)
    {
        return None;
    }
    Some((body.to_string(), suffix))
}

/// Labels right under a header that has no type line. The block is still
/// emitted so the field machine reports it instead of it joining the previous one.
fn labels_without_type_line(
    doc: &RawDocument,
    idx: usize,
    hi: usize,
    family: &FamilyRules,
    seg: &SegmentRules,
) -> bool {
    let shape = family.type_shape.as_ref();
    for j in (idx + 1..hi).filter(|&j| !doc.lines[j].is_empty()).take(seg.label_window) {
        let line = &doc.lines[j];
        if family.is_label_line(line) {
            return true;
        }
        if shape.is_some_and(|s| s.is_match(line)) || header_candidate(line, family, seg).is_some() {
            return false;
        }
    }
    false
}

/// Confirm a candidate at `idx`: a type line within the type window (if the
/// family has one), then a label line or body marker within the label window.
fn confirm(doc: &RawDocument, idx: usize, hi: usize, family: &FamilyRules, seg: &SegmentRules) -> bool {
    let non_blank = |from: usize| (from..hi).filter(|&j| !doc.lines[j].is_empty());

    // A type line that follows another header candidate belongs to that header.
    let labels_from = match &family.type_shape {
        Some(shape) => {
            let mut found = None;
            for j in non_blank(idx + 1).take(seg.type_line_window) {
                if shape.is_match(&doc.lines[j]) {
                    found = Some(j + 1);
                    break;
                }
                if header_candidate(&doc.lines[j], family, seg).is_some() {
                    break;
                }
            }
            match found {
                Some(from) => from,
                None => return labels_without_type_line(doc, idx, hi, family, seg),
            }
        }
        None => idx + 1,
    };

    non_blank(labels_from)
        .take(seg.label_window)
        .any(|j| family.is_label_line(&doc.lines[j]) || family.is_body_marker_line(&doc.lines[j]))
}

/// Partition the family's region into ordered, non-overlapping blocks.
pub fn segment(doc: &RawDocument, family: &FamilyRules, seg: &SegmentRules) -> Vec<EntityBlock> {
    let (lo, hi) = region_bounds(doc, &family.region);

    let mut headers: Vec<(usize, String, Option<String>)> = Vec::new();
    for idx in lo..hi {
        let Some((header, suffix)) = header_candidate(&doc.lines[idx], family, seg) else {
            continue;
        };
        if confirm(doc, idx, hi, family, seg) {
            headers.push((idx, header, suffix));
        } else {
            debug!(kind = %family.kind, line = idx, header = %header, "Header candidate not confirmed");
        }
    }

    let mut blocks = Vec::with_capacity(headers.len());
    for (n, (start, header, suffix)) in headers.iter().enumerate() {
        let end = headers.get(n + 1).map(|(next, _, _)| *next).unwrap_or(hi);
        blocks.push(EntityBlock {
            kind: family.kind,
            start: *start,
            end,
            header: header.clone(),
            suffix: suffix.clone(),
        });
    }
    blocks
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::parser::normalize::normalize;
    use crate::parser::rules::Rules;

    fn doc(text: &str, rules: &Rules) -> RawDocument {
        normalize(text, &rules.normalize)
    }

    const SPELLS: &str = "\
BESCHREIBUNGEN DER ZAUBER
FEUERBALL
Hervorrufungszauber 3. Grades (Magier, Zauberer)
Zeitaufwand: Aktion
Reichweite: 45 Meter
Komponenten: V, G, M (eine Kugel aus Fledermausguano und Schwefel)
Wirkungsdauer: Unmittelbar
Ein heller Lichtstreif zuckt von deinem Finger.
MERKMALE
RK 11
ALARM
Bannzauber 1. Grades (Magier, Waldläufer)
Zeitaufwand: 1 Minute oder Ritual
Reichweite: 9 Meter
Komponenten: V, G, M (eine Glocke und Silberdraht)
Wirkungsdauer: 8 Stunden
Du richtest einen Alarm gegen Eindringlinge ein.
";

    #[test]
    fn confirms_spell_headers() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = doc(SPELLS, &rules);
        let blocks = segment(&doc, &rules.spells, &rules.segment);

        let headers: Vec<_> = blocks.iter().map(|b| b.header.as_str()).collect();
        assert_eq!(headers, vec!["FEUERBALL", "ALARM"]);
        assert_eq!(blocks[0].end, blocks[1].start);
        assert_eq!(blocks[1].end, doc.len());
    }

    #[test]
    fn blocks_are_monotonic_and_disjoint() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = doc(SPELLS, &rules);
        let blocks = segment(&doc, &rules.spells, &rules.segment);
        for pair in blocks.windows(2) {
            assert!(pair[0].start < pair[0].end);
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn unconfirmed_and_denylisted_candidates_are_body_text() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let text = "\
BESCHREIBUNGEN DER ZAUBER
NUR EIN TITEL
Hier folgt gewöhnlicher Text.
Noch mehr Text.
Und noch eine Zeile.
MERKMALE
Bannzauber 1. Grades (Magier)
Zeitaufwand: Aktion
";
        let doc = doc(text, &rules);
        assert!(segment(&doc, &rules.spells, &rules.segment).is_empty());
    }

    #[test]
    fn labels_without_type_line_still_open_a_block() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let text = "\
BESCHREIBUNGEN DER ZAUBER
ALARM
Bannzauber 1. Grades (Magier, Waldläufer)
Zeitaufwand: 1 Minute oder Ritual
Wirkungsdauer: 8 Stunden
Du richtest einen Alarm gegen Eindringlinge ein.
SCHLAF
Zeitaufwand: Aktion
Reichweite: 27 Meter
Komponenten: V, G
Wirkungsdauer: 1 Minute
Kreaturen fallen in einen magischen Schlaf.
";
        let doc = doc(text, &rules);
        let blocks = segment(&doc, &rules.spells, &rules.segment);
        let headers: Vec<_> = blocks.iter().map(|b| b.header.as_str()).collect();
        assert_eq!(headers, vec!["ALARM", "SCHLAF"]);
        assert_eq!(blocks[0].end, 6);
    }

    #[test]
    fn header_suffix_is_stripped() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let (header, suffix) =
            header_candidate("ALCHEMISTENAUSRÜSTUNG (50 GM)", &rules.tools, &rules.segment).unwrap();
        assert_eq!(header, "ALCHEMISTENAUSRÜSTUNG");
        assert_eq!(suffix.as_deref(), Some("50 GM"));

        assert!(header_candidate("FEUERBALL (Magier)", &rules.spells, &rules.segment).is_none());
        assert!(header_candidate("Zeitaufwand: Aktion", &rules.spells, &rules.segment).is_none());
        assert!(header_candidate(&"X".repeat(61), &rules.spells, &rules.segment).is_none());
    }

    #[test]
    fn region_without_marker_is_whole_document() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = doc("ALARM\nBannzauber 1. Grades (Magier)\nZeitaufwand: Aktion", &rules);
        let blocks = segment(&doc, &rules.spells, &rules.segment);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start, blocks[0].end), (0, 3));
    }
}
