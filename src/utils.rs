/// Deterministic id slug: German umlauts folded, other accents dropped to their
/// base letter, every run of non-alphanumerics collapsed to a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_hyphen = true;

    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'ä' => "ae",
            'ö' => "oe",
            'ü' => "ue",
            'ß' => "ss",
            'à' | 'á' | 'â' | 'ã' | 'å' => "a",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'ò' | 'ó' | 'ô' | 'õ' => "o",
            'ù' | 'ú' | 'û' => "u",
            'ç' => "c",
            'ñ' => "n",
            _ => "",
        };

        if !folded.is_empty() {
            slug.push_str(folded);
            last_was_hyphen = false;
        } else if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Lowercase with whitespace collapsed; the "case-folded name" lookup key.
pub fn fold_name(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the line has at least one letter and every letter is upper-case.
pub fn is_upper_line(line: &str) -> bool {
    let mut letters = line.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase() || c == 'ß')
}

/// "BRENNENDE HÄNDE" → "Brennende Hände".
pub fn titlecase(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut upper_next = true;
    for c in header.chars() {
        if c.is_alphabetic() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            out.push(c);
            upper_next = c.is_whitespace() || c == '-' || c == '(' || c == '/';
        }
    }
    out
}

/// Split on `sep` only at parenthesis depth 0; parts are trimmed, empties dropped.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            _ => {}
        }
        if c == sep && depth == 0 {
            push_part(&mut parts, &current);
            current.clear();
        } else {
            current.push(c);
        }
    }
    push_part(&mut parts, &current);
    parts
}

fn push_part(parts: &mut Vec<String>, part: &str) {
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}

/// Byte offset of the last occurrence of `needle` outside parentheses.
pub fn rfind_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut found = None;
    for (pos, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            _ => {}
        }
        if depth == 0 && text[pos..].starts_with(needle) {
            found = Some(pos);
        }
    }
    found
}

/// Count of `(` minus count of `)`; positive means a qualifier list is still open.
pub fn open_parens(text: &str) -> i32 {
    text.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

// ── Tests ──
