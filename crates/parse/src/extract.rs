use std::ops::Range;
use std::sync::Arc;

use pantry_core::{Lexicon, ParsedItem};
use regex::Regex;

use crate::units::{re_bundle, re_multiplier};
use crate::util::{
    alternation, clean_name, glued_to_word, overlaps, parse_grouped_int, remove_spans,
    round_quantity,
};

// Amounts: `3,000` / `3.000` grouping or a bare digit run.
const AMOUNT: &str = r"\d{1,3}(?:[,.]\d{3})+|\d+";

re!(re_price_marked, &format!(r"₩\s*({AMOUNT})|({AMOUNT})\s*(?:원|₩)"));
re!(re_price_plain, AMOUNT);

/// Raw per-line extraction, before unit/quantity backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFields {
    pub name: String,
    /// Set only when the line carried an explicit `<number><unit>`.
    pub quantity: Option<u32>,
    /// Canonical unit token, set together with `quantity`.
    pub unit: Option<String>,
    pub price: Option<i64>,
    /// The line with the price removed, for quantity inference.
    pub remainder: String,
}

impl LineFields {
    /// Finalize with quantity defaulting to 1 and the unit left as extracted.
    pub fn into_item(self) -> Option<ParsedItem> {
        ParsedItem::new(self.name, self.quantity.unwrap_or(1), self.unit, self.price).ok()
    }
}

/// Pulls name / quantity / unit / price out of one candidate receipt line.
///
/// Pure: the same line always yields the same result, and nothing here does
/// I/O.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    quantity_unit: Regex,
    lexicon: Arc<Lexicon>,
}

impl FieldExtractor {
    pub fn new(lexicon: &Lexicon) -> Self {
        Self::with_shared(Arc::new(lexicon.clone()))
    }

    pub fn with_shared(lexicon: Arc<Lexicon>) -> Self {
        let units = alternation(lexicon.units.iter().map(|u| u.token.as_str()));
        // The leading group keeps the number from starting mid-amount (`1,500g`).
        let pattern = format!(r"(?i)(?:^|[^\d.,])(\d+(?:\.\d+)?)\s*({units})");
        let quantity_unit = Regex::new(&pattern).expect("unit alternation is escaped");
        Self { quantity_unit, lexicon }
    }

    /// Extract a finished item, or `None` when the line has no usable name.
    pub fn extract_fields(&self, line: &str) -> Option<ParsedItem> {
        self.extract_line(line)?.into_item()
    }

    /// Extract the raw fields of a line. Returns `None` when the cleaned name
    /// is shorter than two characters.
    pub fn extract_line(&self, line: &str) -> Option<LineFields> {
        let line = line.trim();

        let price_match = find_marked_price(line);
        let price_span = price_match.as_ref().map(|(span, _)| span.clone());

        let qty_match = self.find_quantity_unit(line, price_span.as_ref());

        // `x3`, `×5`, `2+1`: counts, never prices, left for quantity inference.
        let mut quantity_tokens = multiplier_spans(line);
        if let Some(q) = &qty_match {
            quantity_tokens.retain(|t| !overlaps(t, &q.span));
        }

        let (price_span, price) = match price_match {
            Some((span, amount)) => (Some(span), amount),
            None => {
                let mut avoid = quantity_tokens.clone();
                avoid.extend(qty_match.as_ref().map(|q| q.span.clone()));
                match find_plain_price(line, &avoid) {
                    Some((span, amount)) => (Some(span), amount),
                    None => (None, None),
                }
            }
        };
        if let Some(p) = &price_span {
            quantity_tokens.retain(|t| !overlaps(t, p));
        }

        let mut consumed = quantity_tokens;
        consumed.extend(price_span.clone());
        if let Some(q) = &qty_match {
            consumed.push(q.span.clone());
        }
        let name = clean_name(&remove_spans(line, &consumed));
        if name.chars().count() < pantry_core::MIN_NAME_CHARS {
            tracing::debug!(line, "no usable item name, line skipped");
            return None;
        }

        let remainder = match &price_span {
            Some(span) => remove_spans(line, std::slice::from_ref(span)),
            None => line.to_string(),
        };

        let (quantity, unit) = match qty_match {
            Some(q) => (q.quantity, Some(q.unit)),
            None => (None, None),
        };

        Some(LineFields { name, quantity, unit, price, remainder })
    }

    fn find_quantity_unit(&self, line: &str, avoid: Option<&Range<usize>>) -> Option<QuantityUnit> {
        self.quantity_unit.captures_iter(line).find_map(|c| {
            let number = c.get(1)?;
            let token = c.get(2)?;
            let span = number.start()..token.end();
            if avoid.is_some_and(|a| overlaps(a, &span)) {
                return None;
            }
            if glued_to_word(line, token.as_str(), token.end()) {
                return None;
            }
            Some(QuantityUnit {
                span,
                quantity: round_quantity(number.as_str()),
                unit: self.lexicon.canonical_unit(token.as_str()),
            })
        })
    }
}

struct QuantityUnit {
    span: Range<usize>,
    /// `None` if the number does not fit a `u32`.
    quantity: Option<u32>,
    unit: String,
}

/// First amount carrying a won marker (`₩3,000`, `3,000원`, `3000 원`).
fn find_marked_price(line: &str) -> Option<(Range<usize>, Option<i64>)> {
    let c = re_price_marked().captures(line)?;
    let whole = c.get(0)?;
    let amount = c.get(1).or_else(|| c.get(2))?;
    Some((whole.range(), parse_grouped_int(amount.as_str())))
}

/// Multiplier (`x3`, `× 5`) and promo bundle (`2+1`) tokens, in line order.
fn multiplier_spans(line: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = re_multiplier()
        .find_iter(line)
        .chain(re_bundle().find_iter(line))
        .map(|m| m.range())
        .collect();
    spans.sort_by_key(|s| s.start);
    spans
}

/// First free-standing digit run outside the quantity tokens.
fn find_plain_price(line: &str, avoid: &[Range<usize>]) -> Option<(Range<usize>, Option<i64>)> {
    re_price_plain()
        .find_iter(line)
        .filter(|m| !avoid.iter().any(|a| overlaps(a, &m.range())))
        // Digits glued to a word (`비타500`) belong to the name.
        .find(|m| !line[..m.start()].chars().next_back().is_some_and(char::is_alphabetic))
        .map(|m| (m.range(), parse_grouped_int(m.as_str())))
}
