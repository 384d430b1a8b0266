//! Per-block field state machine: Type → Stats → Description → Scaling → Summon.

use super::blocks::EntityBlock;
use super::normalize::RawDocument;
use super::rules::FamilyRules;
use crate::utils::{collapse_whitespace, open_parens};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Type,
    Stats,
    Description,
    Scaling,
    Summon,
}

/// Everything recovered from one block, still as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockText {
    pub header: String,
    pub suffix: Option<String>,
    pub type_line: Option<String>,
    pub fields: Vec<(String, String)>,
    pub description: String,
    pub scaling: Option<String>,
    pub summon: Vec<String>,
    /// Header line of the block.
    pub line: usize,
    pub source_page: Option<u32>,
}

impl BlockText {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unparsable {
    pub line: usize,
    pub reason: String,
}

/// State the machine enters once the type line is done (or skipped).
pub fn after_type(family: &FamilyRules) -> State {
    if family.labels.is_empty() {
        State::Description
    } else {
        State::Stats
    }
}

pub fn initial_state(family: &FamilyRules) -> State {
    if family.type_line.is_some() {
        State::Type
    } else {
        after_type(family)
    }
}

/// Transition guard for free-text lines in Description or Scaling.
pub fn text_transition(state: State, line: &str, family: &FamilyRules) -> State {
    if state == State::Summon || is_summon_line(line, family) {
        return State::Summon;
    }
    if state == State::Description && scaling_marker(line, family).is_some() {
        return State::Scaling;
    }
    state
}

/// Length of the scaling marker the line starts with, compared case-insensitively.
pub fn scaling_marker(line: &str, family: &FamilyRules) -> Option<usize> {
    let lower = line.to_lowercase();
    family
        .scaling_markers
        .iter()
        .find(|m| lower.starts_with(&m.to_lowercase()))
        .map(|m| {
            let chars = m.chars().count();
            line.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(line.len())
        })
}

pub fn is_summon_line(line: &str, family: &FamilyRules) -> bool {
    family
        .summon_markers
        .iter()
        .any(|m| line == m.as_str() || (line.starts_with(m.as_str()) && line[m.len()..].starts_with(':')))
        || family.summon_line.as_ref().is_some_and(|re| re.is_match(line))
}

/// A Stats line that extends the previous field instead of ending Stats.
pub fn is_continuation(previous: &str, line: &str) -> bool {
    open_parens(previous) > 0
        || previous.ends_with(',')
        || previous.ends_with(" oder")
        || previous.ends_with(" und")
        || line.chars().next().is_some_and(|c| c.is_lowercase())
}

/// Split a label line into `(label, value)` segments; labels may share a line.
pub fn split_labels(line: &str, family: &FamilyRules) -> Vec<(String, String)> {
    let Some(re) = &family.label_re else {
        return Vec::new();
    };
    let marks: Vec<(usize, usize, String)> = re
        .captures_iter(line)
        .filter_map(|caps| {
            let label = caps.name("label")?;
            let whole = caps.get(0)?;
            Some((label.start(), whole.end(), label.as_str().to_string()))
        })
        .collect();

    marks
        .iter()
        .enumerate()
        .map(|(n, (_, value_start, label))| {
            let value_end = marks.get(n + 1).map(|(next, _, _)| *next).unwrap_or(line.len());
            (label.clone(), line[*value_start..value_end].trim().to_string())
        })
        .collect()
}

struct Machine<'a> {
    family: &'a FamilyRules,
    type_window: usize,
    state: State,
    type_seen: usize,
    out: BlockText,
    description: Vec<String>,
    scaling: Vec<String>,
}

impl<'a> Machine<'a> {
    fn feed(&mut self, line: &str) -> Result<(), Unparsable> {
        match self.state {
            State::Type => self.feed_type(line),
            State::Stats => {
                self.feed_stats(line);
                Ok(())
            }
            State::Description | State::Scaling | State::Summon => {
                self.feed_text(line);
                Ok(())
            }
        }
    }

    fn feed_type(&mut self, line: &str) -> Result<(), Unparsable> {
        if let Some(partial) = self.out.type_line.as_mut() {
            partial.push(' ');
            partial.push_str(line);
        } else if self.family.type_line.as_ref().is_some_and(|re| re.is_match(line)) {
            self.out.type_line = Some(line.to_string());
        } else {
            self.type_seen += 1;
            if self.type_seen >= self.type_window {
                return Err(Unparsable {
                    line: self.out.line,
                    reason: format!("no type line within {} lines of the header", self.type_window),
                });
            }
            return Ok(());
        }

        if self.out.type_line.as_deref().is_some_and(|t| open_parens(t) <= 0) {
            self.state = after_type(self.family);
        }
        Ok(())
    }

    fn feed_stats(&mut self, line: &str) {
        if self.family.is_label_line(line) {
            for (label, value) in split_labels(line, self.family) {
                let terminal = self.family.terminal_label.as_deref() == Some(label.as_str());
                self.out.fields.push((label, value));
                if terminal {
                    self.state = State::Description;
                }
            }
            return;
        }

        if let Some((_, value)) = self.out.fields.last_mut() {
            if is_continuation(value, line) {
                value.push(' ');
                value.push_str(line);
                return;
            }
            self.state = State::Description;
        }
        self.feed_text(line);
    }

    fn feed_text(&mut self, line: &str) {
        // The terminal field may still wrap onto the first following line.
        if self.state == State::Description && self.description.is_empty() {
            if let Some((_, value)) = self.out.fields.last_mut() {
                if open_parens(value) > 0
                    || value.ends_with(',')
                    || value.ends_with(" oder")
                    || value.ends_with(" und")
                {
                    value.push(' ');
                    value.push_str(line);
                    return;
                }
            }
        }

        let next = text_transition(self.state, line, self.family);
        if next == State::Scaling && self.state != State::Scaling {
            let rest = scaling_marker(line, self.family).map(|at| &line[at..]).unwrap_or("");
            self.state = next;
            if !rest.trim().is_empty() {
                self.scaling.push(rest.trim().to_string());
            }
            return;
        }
        self.state = next;

        match self.state {
            State::Summon => self.out.summon.push(line.to_string()),
            State::Scaling => self.scaling.push(line.to_string()),
            _ => self.description.push(line.to_string()),
        }
    }
}

/// Walk one block through the machine. Never reads past `block.end`.
pub fn walk(
    doc: &RawDocument,
    block: &EntityBlock,
    family: &FamilyRules,
    type_window: usize,
) -> Result<BlockText, Unparsable> {
    let mut machine = Machine {
        family,
        type_window,
        state: initial_state(family),
        type_seen: 0,
        out: BlockText {
            header: block.header.clone(),
            suffix: block.suffix.clone(),
            line: block.start,
            source_page: doc.page(block.start),
            ..BlockText::default()
        },
        description: Vec::new(),
        scaling: Vec::new(),
    };

    for idx in block.start + 1..block.end.min(doc.len()) {
        let line = doc.lines[idx].as_str();
        if line.is_empty() {
            continue;
        }
        machine.feed(line)?;
    }

    if machine.state == State::Type {
        return Err(Unparsable {
            line: block.start,
            reason: match machine.out.type_line {
                Some(_) => "type line qualifier list never closed".to_string(),
                None => "block ended before a type line".to_string(),
            },
        });
    }

    let mut out = machine.out;
    out.description = collapse_whitespace(&machine.description.join(" "));
    if machine.state == State::Scaling || !machine.scaling.is_empty() {
        out.scaling = Some(collapse_whitespace(&machine.scaling.join(" ")));
    }
    Ok(out)
}

/// Cut `text` at the first word-boundary occurrence of another known header.
pub fn truncate_leak(text: &str, own: &str, headers: &[String], min_len: usize) -> String {
    let mut cut = text.len();
    for name in headers {
        if name == own || name.chars().count() < min_len {
            continue;
        }
        for (pos, _) in text.match_indices(name.as_str()) {
            let before_ok = text[..pos].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
            let after_ok = text[pos + name.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
            if before_ok && after_ok {
                cut = cut.min(pos);
                break;
            }
        }
    }
    text[..cut].trim_end().to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::parser::blocks::segment;
    use crate::parser::normalize::normalize;
    use crate::parser::rules::Rules;

    fn walk_all(text: &str) -> Vec<Result<BlockText, Unparsable>> {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let doc = normalize(text, &rules.normalize);
        segment(&doc, &rules.spells, &rules.segment)
            .iter()
            .map(|b| walk(&doc, b, &rules.spells, rules.segment.type_line_window))
            .collect()
    }

    #[test]
    fn recovers_labeled_fields_verbatim() {
        let text = "\
FEUERBALL
Hervorrufungszauber 3. Grades (Magier, Zauberer)
Zeitaufwand: Aktion
Reichweite: 45 Meter
Komponenten: V, G, M (eine winzige Kugel aus Fledermausguano und Schwefel)
Wirkungsdauer: Unmittelbar
Ein heller Lichtstreif zuckt von deinem Finger zu einem Punkt.
";
        let parsed = walk_all(text).remove(0).unwrap();
        assert_eq!(parsed.header, "FEUERBALL");
        assert_eq!(
            parsed.type_line.as_deref(),
            Some("Hervorrufungszauber 3. Grades (Magier, Zauberer)")
        );
        assert_eq!(parsed.field("Zeitaufwand"), Some("Aktion"));
        assert_eq!(parsed.field("Reichweite"), Some("45 Meter"));
        assert_eq!(
            parsed.field("Komponenten"),
            Some("V, G, M (eine winzige Kugel aus Fledermausguano und Schwefel)")
        );
        assert_eq!(parsed.field("Wirkungsdauer"), Some("Unmittelbar"));
        assert_eq!(parsed.description, "Ein heller Lichtstreif zuckt von deinem Finger zu einem Punkt.");
        assert_eq!(parsed.scaling, None);
    }

    #[test]
    fn labels_sharing_a_line_and_wrapped_values() {
        let text = "\
ALARM
Bannzauber 1. Grades (Magier,
Waldläufer)
Zeitaufwand: 1 Minute oder Ritual Reichweite: 9 Meter
Komponenten: V, G, M (eine Glocke und
ein Stück feiner Silberdraht)
Wirkungsdauer: 8 Stunden
Du richtest einen Alarm ein.
";
        let parsed = walk_all(text).remove(0).unwrap();
        assert_eq!(parsed.type_line.as_deref(), Some("Bannzauber 1. Grades (Magier, Waldläufer)"));
        assert_eq!(parsed.field("Zeitaufwand"), Some("1 Minute oder Ritual"));
        assert_eq!(parsed.field("Reichweite"), Some("9 Meter"));
        assert_eq!(
            parsed.field("Komponenten"),
            Some("V, G, M (eine Glocke und ein Stück feiner Silberdraht)")
        );
        assert_eq!(parsed.description, "Du richtest einen Alarm ein.");
    }

    #[test]
    fn scaling_and_summon_sections() {
        let text = "\
ABERRATIONSGEIST HERBEIRUFEN
Beschwörungszauber 4. Grades (Hexenmeister, Magier)
Zeitaufwand: Aktion
Reichweite: 27 Meter
Komponenten: V, G, M (ein eingelegter Tentakel)
Wirkungsdauer: Konzentration, bis zu 1 Stunde
Du rufst einen Aberrationsgeist herbei.
Verwenden von Zauberplätzen höheren Grades: Verwende den Zaubergrad für den Wertekasten.
WERTEKASTEN: ABERRATIONSGEIST
RK 11 + Zaubergrad
TP 40 + 10 für jeden Grad ab 4
";
        let parsed = walk_all(text).remove(0).unwrap();
        assert_eq!(parsed.description, "Du rufst einen Aberrationsgeist herbei.");
        assert_eq!(
            parsed.scaling.as_deref(),
            Some("Verwende den Zaubergrad für den Wertekasten.")
        );
        assert_eq!(
            parsed.summon,
            vec!["WERTEKASTEN: ABERRATIONSGEIST", "RK 11 + Zaubergrad", "TP 40 + 10 für jeden Grad ab 4"]
        );
    }

    #[test]
    fn block_without_strict_type_line_is_unparsable() {
        let text = "\
SCHLAF
Verzauberungszauber ohne Grad
Zeitaufwand: Aktion
Reichweite: 27 Meter
";
        let results = walk_all(text);
        assert_eq!(results.len(), 1);
        let err = results[0].clone().unwrap_err();
        assert!(err.reason.contains("type line"));
        assert_eq!(err.line, 0);
    }

    #[test]
    fn transitions() {
        let rules = Rules::compile(&Settings::default()).unwrap();
        let f = &rules.spells;
        assert_eq!(initial_state(f), State::Type);
        assert_eq!(initial_state(&rules.packages), State::Description);
        assert_eq!(initial_state(&rules.tools), State::Stats);
        assert_eq!(
            text_transition(State::Description, "Zaubertrick-Aufwertung: Der Schaden steigt.", f),
            State::Scaling
        );
        assert_eq!(text_transition(State::Scaling, "STÄ 16 (+3)", f), State::Summon);
        assert_eq!(text_transition(State::Summon, "Normaler Text", f), State::Summon);
        assert_eq!(text_transition(State::Description, "Normaler Text", f), State::Description);
    }

    #[test]
    fn leak_truncation() {
        let headers = vec!["FEUERBALL".to_string(), "ALARM".to_string(), "LICHT".to_string()];
        let text = "Flammen verzehren alles. FEUERBALL Hervorrufungszauber 3. Grades";
        assert_eq!(truncate_leak(text, "ALARM", &headers, 5), "Flammen verzehren alles.");
        assert_eq!(truncate_leak(text, "FEUERBALL", &headers, 5), text);
        assert_eq!(truncate_leak("Ein LICHTSTRAHL", "ALARM", &headers, 5), "Ein LICHTSTRAHL");
        assert_eq!(truncate_leak("Ein LICHT", "ALARM", &headers, 6), "Ein LICHT");
    }
}
