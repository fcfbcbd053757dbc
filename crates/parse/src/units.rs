use std::sync::Arc;

use pantry_core::{Lexicon, ParsedItem};
use regex::Regex;

use crate::extract::LineFields;
use crate::util::{alternation, glued_to_word, round_quantity};

/// The only forms a measured quantity normalizes to.
pub const MEASURE_UNITS: [&str; 4] = ["kg", "g", "ml", "L"];

re!(pub(crate) re_multiplier, r"(?i)(?:^|[^\p{L}\d])[x×*]\s*(\d+)");
re!(pub(crate) re_bundle, r"(\d+)\s*\+\s*(\d+)");

/// Fills in unit and quantity when extraction could not read them off the
/// line. Also used by extraction paths outside the regex pipeline that only
/// deliver a product name.
#[derive(Debug, Clone)]
pub struct UnitNormalizer {
    measure: Regex,
    container_count: Regex,
    /// `(lowercased keyword, keyword as configured)`, longest first.
    containers: Vec<(String, String)>,
    staples: Vec<String>,
    beverages: Vec<String>,
    lexicon: Arc<Lexicon>,
}

impl UnitNormalizer {
    pub fn new(lexicon: &Lexicon) -> Self {
        Self::with_shared(Arc::new(lexicon.clone()))
    }

    pub fn with_shared(lexicon: Arc<Lexicon>) -> Self {
        let measure_tokens = alternation(
            lexicon
                .units
                .iter()
                .filter(|u| MEASURE_UNITS.contains(&u.canonical()))
                .map(|u| u.token.as_str()),
        );
        // An empty alternation would match the empty string after any digit.
        let measure = if measure_tokens.is_empty() {
            Regex::new(r"\b\B").expect("never-matching regex")
        } else {
            Regex::new(&format!(r"(?i)(\d+(?:\.\d+)?)\s*({measure_tokens})"))
                .expect("measure alternation is escaped")
        };

        let container_tokens = alternation(lexicon.containers.iter().map(String::as_str));
        let container_count = if container_tokens.is_empty() {
            Regex::new(r"\b\B").expect("never-matching regex")
        } else {
            Regex::new(&format!(r"(?i)(\d+)\s*({container_tokens})"))
                .expect("container alternation is escaped")
        };

        let mut containers: Vec<(String, String)> = lexicon
            .containers
            .iter()
            .map(|c| (c.to_lowercase(), c.clone()))
            .collect();
        containers.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

        Self {
            measure,
            container_count,
            containers,
            staples: lowercased(&lexicon.staples),
            beverages: lowercased(&lexicon.beverages),
            lexicon,
        }
    }

    /// Best-guess unit for a product name. Always returns something: the
    /// count unit is the last resort.
    pub fn infer_unit(&self, name: &str) -> String {
        if let Some(unit) = self.measure_in(name) {
            return unit;
        }
        let lower = name.to_lowercase();
        if let Some((_, keyword)) = self.containers.iter().find(|(k, _)| lower.contains(k.as_str())) {
            return keyword.clone();
        }
        if self.staples.iter().any(|s| lower.contains(s.as_str())) {
            return self.lexicon.count_unit.clone();
        }
        if self.beverages.iter().any(|b| lower.contains(b.as_str())) {
            return self.lexicon.bottle_unit.clone();
        }
        self.lexicon.count_unit.clone()
    }

    /// Explicit multiplier in `text` (`x3`, `6캔`, `2+1`), else `default`.
    pub fn infer_quantity(&self, text: &str, default: u32) -> u32 {
        let from = |re: &Regex| {
            re.captures_iter(text)
                .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
                .find(|n| *n >= 1)
        };
        from(re_multiplier())
            .or_else(|| from(&self.container_count))
            .or_else(|| from(re_bundle()))
            .unwrap_or(default)
    }

    /// See [`Lexicon::canonical_unit`].
    pub fn canonical_unit(&self, token: &str) -> String {
        self.lexicon.canonical_unit(token)
    }

    /// Complete loosely extracted fields: a supplied unit is canonicalized, a
    /// missing one inferred from the name; a missing quantity is inferred from
    /// the name and defaults to 1.
    pub fn backfill(&self, name: &str, unit: Option<&str>, quantity: Option<u32>) -> (String, u32) {
        let unit = match unit.map(str::trim).filter(|u| !u.is_empty()) {
            Some(u) => self.canonical_unit(u),
            None => self.infer_unit(name),
        };
        let quantity = quantity
            .filter(|q| *q >= 1)
            .unwrap_or_else(|| self.infer_quantity(name, 1));
        (unit, quantity)
    }

    /// Turn one extracted line into a finished item.
    pub fn complete(&self, fields: LineFields) -> Option<ParsedItem> {
        let unit = match fields.unit {
            Some(u) => u,
            None => self.infer_unit(&fields.name),
        };
        let quantity = match fields.quantity {
            Some(q) => q,
            None => self.infer_quantity(&fields.remainder, 1),
        };
        ParsedItem::new(fields.name, quantity, Some(unit), fields.price).ok()
    }

    fn measure_in(&self, name: &str) -> Option<String> {
        self.measure.captures_iter(name).find_map(|c| {
            let token = c.get(2)?;
            if glued_to_word(name, token.as_str(), token.end()) {
                return None;
            }
            // Validates the number even though only the unit is kept.
            round_quantity(c.get(1)?.as_str())?;
            Some(self.canonical_unit(token.as_str()))
        })
    }
}

fn lowercased(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}
