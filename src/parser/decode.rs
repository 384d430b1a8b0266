//! Pure decoders from raw field text to typed values. None of them panic; an
//! input they cannot read comes back as `None` (or in `Properties::unknown`).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{Denomination, Vocab};
use crate::utils::split_top_level;

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d[\d.,]*)\s*([A-Za-z]+)$").unwrap());
static MASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d[\d.,]*)\s*(kg|g)$").unwrap());
static DAMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\s*W\s*(\d+))?(?:\s+(\S.*))?$").unwrap());
static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Reichweite\s+(\d+(?:,\d+)?)\s*/\s*(\d+(?:,\d+)?)").unwrap());
static THOUSANDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").unwrap());
static PARAM_SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s+").unwrap());

/// Locale-aware number: `27,5` → 27.5, `1.500` → 1500.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let cleaned = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else if THOUSANDS_RE.is_match(raw) {
        raw.replace('.', "")
    } else {
        raw.to_string()
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `5 GM` → 5.0 gold, `2 SM` → 0.2 gold. Unknown unit → `None`.
pub fn currency(raw: &str, table: &[Denomination]) -> Option<f64> {
    let caps = AMOUNT_RE.captures(raw.trim())?;
    let amount = parse_number(&caps[1])?;
    let unit = &caps[2];
    let denom = table.iter().find(|d| d.code.eq_ignore_ascii_case(unit))?;
    Some(round(amount * denom.gp))
}

/// `1 kg` → 1.0, `500 g` → 0.5. A dash or "Variiert" is absent, not zero.
pub fn mass(raw: &str) -> Option<f64> {
    let caps = MASS_RE.captures(raw.trim())?;
    let amount = parse_number(&caps[1])?;
    match &caps[2] {
        "g" => Some(round(amount / 1000.0)),
        _ => Some(amount),
    }
}

/// True for the table placeholders that mean "no value" rather than "unreadable".
pub fn is_placeholder(raw: &str) -> bool {
    matches!(raw.trim(), "" | "-" | "–" | "—" | "Variiert" | "variiert")
}

/// Split a parenthesized parameter list. A decimal comma is never followed by
/// whitespace, so `2 GM, 0,5 kg` stays two parameters.
pub fn params(raw: &str) -> Vec<String> {
    PARAM_SEP_RE
        .split(raw.trim())
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ── Dice ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Damage {
    pub count: u32,
    /// 1 for flat damage such as `1 Stich`.
    pub faces: u32,
    pub damage_type: Option<String>,
}

impl Damage {
    pub fn dice(&self) -> String {
        if self.faces == 1 {
            self.count.to_string()
        } else {
            format!("{}W{}", self.count, self.faces)
        }
    }
}

/// `1W6 Hieb` → (1, 6, Hieb); `1 Stich` → (1, 1, Stich); `2W6` → (2, 6, none).
pub fn damage(raw: &str) -> Option<Damage> {
    let caps = DAMAGE_RE.captures(raw.trim())?;
    let count = caps[1].parse().ok()?;
    let faces = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    if count == 0 || faces == 0 {
        return None;
    }
    Some(Damage {
        count,
        faces,
        damage_type: caps.get(3).map(|m| m.as_str().trim().to_string()),
    })
}

// ── Ranges ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    Direct,
    Thrown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub normal: f64,
    pub long: f64,
    pub kind: RangeKind,
}

/// `Reichweite 6/18` inside a property parameter list.
pub fn range(raw: &str, kind: RangeKind) -> Option<Range> {
    let caps = RANGE_RE.captures(raw)?;
    Some(Range {
        normal: parse_number(&caps[1])?,
        long: parse_number(&caps[2])?,
        kind,
    })
}

// ── Tags ──

/// Case-insensitive vocabulary lookup returning the canonical id.
pub fn lookup<'a>(vocab: &'a [Vocab], name: &str) -> Option<&'a str> {
    let name = name.trim();
    vocab
        .iter()
        .find(|v| v.name.to_lowercase() == name.to_lowercase())
        .map(|v| v.id.as_str())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    pub tags: Vec<String>,
    pub range: Option<Range>,
    pub thrown_range: Option<Range>,
    pub versatile_damage: Option<String>,
    pub ammunition_type: Option<String>,
    pub unknown: Vec<String>,
}

/// `Leicht, Wurfwaffe (Reichweite 6/18)` → tags `light, thrown` plus the thrown range.
pub fn properties(raw: &str, vocab: &[Vocab]) -> Properties {
    let mut props = Properties::default();

    for part in split_top_level(raw, ',') {
        if is_placeholder(&part) {
            continue;
        }
        let (keyword, params) = match part.find('(') {
            Some(open) => (
                part[..open].trim(),
                part[open + 1..].trim_end_matches(')').trim(),
            ),
            None => (part.as_str(), ""),
        };

        let Some(id) = lookup(vocab, keyword) else {
            props.unknown.push(part.clone());
            continue;
        };
        props.tags.push(id.to_string());

        match id {
            "thrown" => props.thrown_range = range(params, RangeKind::Thrown),
            "ammunition" => {
                let mut parts = self::params(params).into_iter();
                if let Some(first) = parts.next() {
                    props.range = range(&first, RangeKind::Direct);
                }
                props.ammunition_type = parts.next();
            }
            "versatile" if !params.is_empty() => props.versatile_damage = Some(params.to_string()),
            _ => {}
        }
    }

    props
}

// ── Tests ──
