use std::ops::Range;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Regex alternation over `tokens`, longest first so that a short token never
/// shadows a longer one sharing its prefix (`pc` vs `pcs`).
pub fn alternation<'a>(tokens: impl IntoIterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    sorted.dedup();
    sorted
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|")
}

/// Keep alphanumerics (Hangul and CJK ideographs included) and whitespace,
/// then collapse runs of whitespace to a single space.
pub fn clean_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Blank out the given byte ranges of `line`, leaving a space in their place.
pub fn remove_spans(line: &str, spans: &[Range<usize>]) -> String {
    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    for span in sorted {
        if span.end <= cursor {
            continue;
        }
        let start = span.start.max(cursor);
        out.push_str(&line[cursor..start]);
        out.push(' ');
        cursor = span.end;
    }
    out.push_str(&line[cursor..]);
    out
}

pub fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// `3,000` / `3.000` / `3000` → 3000. `None` on overflow.
pub fn parse_grouped_int(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Decimal quantity rounded half away from zero, never below 1.
pub fn round_quantity(s: &str) -> Option<u32> {
    let dec = Decimal::from_str(s).ok()?;
    let rounded = dec
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()?;
    Some(rounded.max(1))
}

/// Whether the unit match ending at `end` is really the start of a longer
/// word: a Latin token running into more letters (`5gal`), or a one-syllable
/// Hangul token running into more Hangul (`1단계`).
pub fn glued_to_word(line: &str, token: &str, end: usize) -> bool {
    let (Some(last), Some(next)) = (token.chars().last(), line[end..].chars().next()) else {
        return false;
    };
    if last.is_ascii_alphabetic() {
        return next.is_ascii_alphabetic();
    }
    token.chars().count() == 1 && is_hangul(last) && is_hangul(next)
}

fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}
