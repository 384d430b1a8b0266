use std::collections::{HashMap, HashSet};

use anyhow::Result;
use regex::Regex;
use serde::Serialize;

use super::rules::compile;
use crate::config::{NormalizeSettings, Replacement};
use crate::utils::is_upper_line;

/// The normalized document: trimmed lines with layout artifacts removed, plus a
/// best-effort page hint per line.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    pub lines: Vec<String>,
    pub pages: Vec<Option<u32>>,
    pub fixes: Vec<AppliedFix>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFix {
    pub from: String,
    pub to: String,
    pub count: usize,
}

impl RawDocument {
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn page(&self, idx: usize) -> Option<u32> {
        self.pages.get(idx).copied().flatten()
    }

    /// Index of the first line exactly equal to `marker`, searching from `from`.
    pub fn find_line(&self, marker: &str, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&i| self.lines[i] == marker)
    }
}

pub struct NormalizeRules {
    fixes: Vec<Replacement>,
    page_number: Regex,
    artifacts: Vec<Regex>,
    min_repeats: usize,
    max_repeat_len: usize,
    protected: HashSet<String>,
}

impl NormalizeRules {
    pub fn compile(settings: &NormalizeSettings, denylist: &[String]) -> Result<Self> {
        Ok(NormalizeRules {
            fixes: settings.encoding_fixes.clone(),
            page_number: compile("normalize.page_number_pattern", &settings.page_number_pattern)?,
            artifacts: settings
                .artifact_patterns
                .iter()
                .map(|p| compile("normalize.artifact_patterns", p))
                .collect::<Result<_>>()?,
            min_repeats: settings.running_header_min_repeats,
            max_repeat_len: settings.running_header_max_len,
            protected: denylist.iter().cloned().collect(),
        })
    }
}

pub fn normalize(raw: &str, rules: &NormalizeRules) -> RawDocument {
    let (text, fixes) = apply_fixes(raw, &rules.fixes);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let repeated = repeated_headers(&lines, rules);

    let mut kept: Vec<(String, Option<u32>)> = Vec::with_capacity(lines.len());
    let mut page = None;
    for line in &lines {
        if rules.page_number.is_match(line) {
            page = line.parse().ok();
            continue;
        }
        if rules.artifacts.iter().any(|re| re.is_match(line)) || repeated.contains(line) {
            continue;
        }
        kept.push((line.to_string(), page));
    }

    let (lines, pages) = rejoin_hyphenation(kept).into_iter().unzip();
    RawDocument { lines, pages, fixes }
}

fn apply_fixes(raw: &str, table: &[Replacement]) -> (String, Vec<AppliedFix>) {
    let mut text = raw.to_string();
    let mut applied = Vec::new();
    for fix in table {
        if fix.from.is_empty() {
            continue;
        }
        let count = text.matches(fix.from.as_str()).count();
        if count > 0 {
            text = text.replace(fix.from.as_str(), &fix.to);
            applied.push(AppliedFix {
                from: fix.from.clone(),
                to: fix.to.clone(),
                count,
            });
        }
    }
    (text, applied)
}

/// Short upper-case lines that recur often enough to be running headers.
fn repeated_headers<'a>(lines: &[&'a str], rules: &NormalizeRules) -> HashSet<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in lines {
        if !line.is_empty()
            && line.chars().count() <= rules.max_repeat_len
            && !line.contains(':')
            && is_upper_line(line)
            && !rules.protected.contains(*line)
        {
            *counts.entry(line).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= rules.min_repeats)
        .map(|(line, _)| line)
        .collect()
}

/// `entfal-` + `tet sich` → `entfaltet sich`, skipping blank lines left by a page break.
fn rejoin_hyphenation(lines: Vec<(String, Option<u32>)>) -> Vec<(String, Option<u32>)> {
    let mut out: Vec<(String, Option<u32>)> = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();

    while let Some((mut line, page)) = iter.next() {
        let mut blanks = Vec::new();
        while ends_with_split_word(&line) {
            while iter.peek().is_some_and(|(l, _)| l.is_empty()) {
                blanks.extend(iter.next());
            }
            if !iter.peek().is_some_and(|(l, _)| starts_with_lowercase_word(l)) {
                break;
            }
            if let Some((next, _)) = iter.next() {
                line.pop();
                line.push_str(&next);
                blanks.clear();
            }
        }
        out.push((line, page));
        out.extend(blanks);
    }
    out
}

fn ends_with_split_word(line: &str) -> bool {
    let Some(body) = line.strip_suffix('-') else {
        return false;
    };
    let fragment: String = body
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .collect();
    !fragment.is_empty() && fragment.chars().all(|c| c.is_lowercase())
}

fn starts_with_lowercase_word(line: &str) -> bool {
    line.chars().next().is_some_and(|c| c.is_alphabetic() && c.is_lowercase())
}

// ── Tests ──
