//! Text canonicalization shared by indexing and matching.
//!
//! Both sides of every comparison (document words and field values) pass
//! through [`normalize`], so the rules here define what "the same text" means
//! for the whole resolver.

use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use unicode_normalization::UnicodeNormalization;

static ACRONYM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{L}+(?:\.\p{L}+)+\.?").expect("acronym pattern is valid"));

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-z]+").expect("token pattern is valid"));

/// Digit grouping conventions tried by the numeric pass, in order.
#[derive(Debug, Clone, Copy)]
struct NumberFormat {
    group: char,
    decimal: char,
    /// "1.234" could be a thousand or one-point-two; such inputs are left to
    /// the next format.
    single_group_needs_decimal: bool,
}

const COMMA_DECIMAL: NumberFormat = NumberFormat {
    group: '.',
    decimal: ',',
    single_group_needs_decimal: true,
};

const DOT_DECIMAL: NumberFormat = NumberFormat {
    group: ',',
    decimal: '.',
    single_group_needs_decimal: false,
};

/// Canonicalizes `text`: NFC, lowercase, acronym dots removed, whitespace
/// collapsed, and numbers rewritten in invariant form ("1.234,56" and
/// "1,234.56" both become "1234.56").
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let lowered: String = composed.to_lowercase().nfc().collect();
    let cleaned = strip_acronym_dots(&lowered)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    parse_number(&cleaned, COMMA_DECIMAL)
        .or_else(|| parse_number(&cleaned, DOT_DECIMAL))
        .unwrap_or(cleaned)
}

/// Maximal `[0-9a-z]` runs of the normalized text.
pub fn tokenize(text: &str) -> Vec<String> {
    tokenize_normalized(&normalize(text)).into_vec()
}

/// Same as [`tokenize`] for text that has already been through [`normalize`].
pub fn tokenize_normalized(normalized: &str) -> SmallVec<[String; 2]> {
    TOKEN
        .find_iter(normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Character trigrams of a normalized string; the whole string when it is
/// shorter than three characters, nothing when it is empty.
pub fn trigrams(normalized: &str) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    match chars.len() {
        0 => Vec::new(),
        1..=3 => vec![normalized.to_string()],
        _ => chars.windows(3).map(|w| w.iter().collect()).collect(),
    }
}

// "a.b..c.d" only becomes a single acronym after the first pass, so repeat
// until nothing changes.
fn strip_acronym_dots(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ACRONYM
            .replace_all(&current, |caps: &regex::Captures<'_>| caps[0].replace('.', ""))
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn parse_number(s: &str, fmt: NumberFormat) -> Option<String> {
    let (negative, body) = match s.chars().next()? {
        '-' => (true, &s[1..]),
        '+' => (false, &s[1..]),
        _ => (false, s),
    };
    if body.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match body.split_once(fmt.decimal) {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let groups: Vec<&str> = int_part.split(fmt.group).collect();
    if groups.len() > 1 {
        let lead = groups[0];
        if lead.is_empty() || lead.len() > 3 || !lead.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let rest_ok = groups[1..]
            .iter()
            .all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()));
        if !rest_ok {
            return None;
        }
        if fmt.single_group_needs_decimal && groups.len() == 2 && frac_part.is_none() {
            return None;
        }
    } else if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    } else if int_part.is_empty() && frac_part.is_none() {
        return None;
    }

    let digits = groups.concat();
    let int_digits = match digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let all_zero = int_digits == "0" && frac_part.map_or(true, |f| f.bytes().all(|b| b == b'0'));

    let mut out = String::with_capacity(digits.len() + 2);
    if negative && !all_zero {
        out.push('-');
    }
    out.push_str(int_digits);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}
