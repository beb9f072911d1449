//! Key normalisation for rubric and evaluation identifiers.
//!
//! Converts heterogeneous sub-question labels into canonical dotted-integer
//! paths so that rubric leaves and grader output land in the same key space.
//!
//! # Labelling conventions seen in the wild
//!
//! - Dot notation: `1.1`, `3.2.1`
//! - Letter suffix: `1a`, `2.1b` (a=1 ... z=26)
//! - Roman numerals: `ii`, `1ii`, `iv` (case-insensitive, canonical form, up to 39)
//! - Parenthetical: `1(a)`, `2.2(i)`, `1(2.1)`, `1(a)(ii)`
//! - Space separated: `1 a`, `2 ii`
//! - Role words: `Task 1`, `Question 2`, `Q3`
//!
//! A lone `i`, `v` or `x` always reads as a roman numeral, whether bare or
//! attached to a number.

use tracing::debug;

use crate::CanonicalKey;

/// Leading words stripped from labels. Order matters: `question` before `q`.
const ROLE_WORDS: &[&str] = &["task", "question", "q"];

/// Normalise `suffix` as a sub-label of `base`.
///
/// Returns `base` unchanged when `suffix` is absent or blank, and also when
/// nothing numeric can be recovered from it. Never fails.
///
/// When the suffix repeats `base` as its head followed directly by a label
/// (`normalize("1", Some("1a"))`), the head is taken to be the base itself and
/// yields `"1.1"` rather than `"1.1.1"`. A head-qualified suffix whose label
/// does not resolve (`"1ab"`) keeps its numeric residue, giving `"1.1"`, and
/// never collapses onto `base` itself.
pub fn normalize(base: &str, suffix: Option<&str>) -> String {
    let Some(raw) = suffix.filter(|s| !s.trim().is_empty()) else {
        return base.to_string();
    };
    let base = base.trim();
    let token = strip_role_word(raw.trim());

    if is_head_qualified(base, token)
        && let Some(resolved) = resolve_suffix(token)
        && resolved.starts_with(&format!("{base}."))
    {
        return resolved;
    }

    match resolve_suffix(raw) {
        Some(residue) if base.is_empty() => residue,
        Some(residue) => format!("{base}.{residue}"),
        None => {
            debug!(base, suffix = raw, "suffix unresolved, falling back to base");
            base.to_string()
        }
    }
}

/// [`normalize`] parsed into a [`CanonicalKey`].
pub fn canonical_key(base: &str, suffix: Option<&str>) -> Option<CanonicalKey> {
    CanonicalKey::parse(&normalize(base, suffix))
}

/// Normalise a free-standing rubric id such as `"3.2.1a"` or `"1 (ii)"`.
///
/// Every dot-delimited segment (dots inside parentheses do not split) that is
/// not purely numeric is resolved on its own and spliced back in, so
/// `"3.2.1a"` becomes `"3.2.1.1"`. Segments that resolve to nothing are
/// dropped. Returns `None` when no segment survives.
pub fn normalize_id(id: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for segment in split_outside_parens(id) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            parts.push(segment.to_string());
            continue;
        }
        match resolve_suffix(segment) {
            Some(residue) => parts.push(residue),
            None => debug!(id, segment, "dropping unresolvable id segment"),
        }
    }
    (!parts.is_empty()).then(|| parts.join("."))
}

/// [`normalize_id`] parsed into a [`CanonicalKey`].
pub fn canonicalize_id(id: &str) -> Option<CanonicalKey> {
    let normalized = normalize_id(id)?;
    let key = CanonicalKey::parse(&normalized);
    if key.is_none() {
        debug!(id, %normalized, "normalised id does not fit a canonical key");
    }
    key
}

/// Strip a leading role word (`Task`, `Question`, `Q`) and whitespace.
pub fn clean_question_number(q: &str) -> &str {
    strip_role_word(q.trim()).trim_end()
}

/// Value of a canonical lowercase-or-uppercase roman numeral built from `i`, `v`, `x`.
///
/// Non-canonical spellings (`iiii`, `vv`, `ixi`) are rejected.
pub fn roman_value(token: &str) -> Option<u32> {
    let lower = token.trim().to_ascii_lowercase();
    if lower.is_empty() || !lower.bytes().all(|b| matches!(b, b'i' | b'v' | b'x')) {
        return None;
    }

    let mut total: i64 = 0;
    let mut prev = 0;
    for b in lower.bytes().rev() {
        let v = match b {
            b'i' => 1,
            b'v' => 5,
            _ => 10,
        };
        if v < prev {
            total -= v;
        } else {
            total += v;
            prev = v;
        }
    }

    let value = u32::try_from(total).ok().filter(|&v| v > 0)?;
    (to_roman(value) == lower).then_some(value)
}

/// Ordinal of a single ASCII letter: a=1 ... z=26.
pub fn letter_value(token: &str) -> Option<u32> {
    let mut chars = token.trim().chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some(u32::from(c.to_ascii_lowercase() as u8 - b'a') + 1)
}

fn to_roman(mut n: u32) -> String {
    const DIGITS: &[(u32, &str)] = &[(10, "x"), (9, "ix"), (5, "v"), (4, "iv"), (1, "i")];
    let mut out = String::new();
    for &(value, glyph) in DIGITS {
        while n >= value {
            out.push_str(glyph);
            n -= value;
        }
    }
    out
}

/// Roman numerals win over letters, so a lone `i` is 1, not 9.
fn label_value(token: &str) -> Option<u32> {
    roman_value(token).or_else(|| letter_value(token))
}

fn strip_role_word(s: &str) -> &str {
    for word in ROLE_WORDS {
        if let Some(head) = s.get(..word.len())
            && head.eq_ignore_ascii_case(word)
        {
            return s[word.len()..].trim_start();
        }
    }
    s
}

/// True when `token` is `base` immediately followed by a label part (`1a`, `1(ii)`, `1 b`).
fn is_head_qualified(base: &str, token: &str) -> bool {
    if base.is_empty() || !base.ends_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    let Some(rest) = token.strip_prefix(base) else {
        return false;
    };
    let Some(first) = rest.chars().next() else {
        return false;
    };
    let is_label = first.is_ascii_alphabetic() || first == '(' || first.is_whitespace();
    is_label && !rest.trim().is_empty()
}

/// Resolve a suffix token into a dotted numeric residue.
fn resolve_suffix(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut s = expand_parentheticals(strip_role_word(raw));
    if let Some(n) = roman_value(&s) {
        s = n.to_string();
    }
    let s = expand_trailing_label(&s);

    let residue = clean_residue(&s);
    if !residue.is_empty() {
        if s.bytes().any(|b| b.is_ascii_alphabetic()) {
            debug!(token = raw, residue = %residue, "normalization fell back to numeric residue");
        }
        return Some(residue);
    }
    rescue_bare(raw)
}

/// Last resort for a whole label with no digits: `a`, `ii`, `(b)`.
fn rescue_bare(raw: &str) -> Option<String> {
    let inner = unwrap_parens(raw);
    if inner.len() != raw.len() {
        return resolve_suffix(inner);
    }
    if let Some(n) = label_value(inner) {
        return Some(n.to_string());
    }
    if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
        return Some(inner.to_string());
    }
    debug!(token = raw, "normalization found no numeric residue");
    None
}

fn unwrap_parens(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .map_or(s, str::trim)
}

/// Rewrite every `N(content)` group as `N.<resolved content>`.
fn expand_parentheticals(s: &str) -> String {
    let mut out = s.to_string();
    let mut search_from = 0;

    while let Some(rel) = out[search_from..].find('(') {
        let open = search_from + rel;
        let Some(close_rel) = out[open..].find(')') else {
            break;
        };
        let close = open + close_rel;
        let start = numeric_path_start(&out[..open]);
        let content = out[open + 1..close].trim();

        if start == open || content.is_empty() {
            search_from = open + 1;
            continue;
        }

        let prefix = &out[start..open];
        let expanded = match resolve_suffix(content) {
            Some(residue) => format!("{prefix}.{residue}"),
            None => prefix.to_string(),
        };
        out.replace_range(start..=close, &expanded);
        // The expansion ends in a digit, so a following group attaches to it.
        search_from = start;
    }
    out
}

/// Byte offset where the numeric path ending `head` begins, or `head.len()` if none.
fn numeric_path_start(head: &str) -> usize {
    let bytes = head.as_bytes();
    if !bytes.last().is_some_and(u8::is_ascii_digit) {
        return head.len();
    }
    let mut start = bytes.len();
    while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
        start -= 1;
    }
    while bytes[start] == b'.' {
        start += 1;
    }
    start
}

/// `2.1a` -> `2.1.1`, `1ii` -> `1.2`, `1 b` -> `1.2`.
fn expand_trailing_label(s: &str) -> String {
    let trimmed = s.trim_end();
    let label_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map_or(trimmed.len(), |(i, _)| i);
    let label = &trimmed[label_start..];
    let head = trimmed[..label_start].trim_end();

    if label.is_empty() || !head.ends_with(|c: char| c.is_ascii_digit()) {
        return s.to_string();
    }
    match label_value(label) {
        Some(n) => format!("{head}.{n}"),
        None => s.to_string(),
    }
}

/// Keep digits and dots, then trim and collapse the dots.
fn clean_residue(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    kept.split('.')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn split_outside_parens(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
