use std::sync::Arc;

use pantry_core::{Lexicon, ParseResult};

use crate::extract::FieldExtractor;
use crate::filter::LineFilter;
use crate::units::UnitNormalizer;

/// Filter → extract → backfill over a whole block of recognized text.
#[derive(Debug, Clone)]
pub struct ReceiptParser {
    filter: LineFilter,
    extractor: FieldExtractor,
    normalizer: UnitNormalizer,
}

impl ReceiptParser {
    pub fn new(lexicon: &Lexicon) -> Self {
        let shared = Arc::new(lexicon.clone());
        Self {
            filter: LineFilter::new(lexicon),
            extractor: FieldExtractor::with_shared(Arc::clone(&shared)),
            normalizer: UnitNormalizer::with_shared(shared),
        }
    }

    /// Parse receipt text into items, in line order. Blank text yields an
    /// empty result; lines that do not form an item are skipped silently.
    pub fn parse(&self, text: &str) -> ParseResult {
        let candidates = self.filter.filter_lines(text);
        let total = candidates.len();

        let items: ParseResult = candidates
            .into_iter()
            .filter_map(|line| {
                let fields = self.extractor.extract_line(&line.text)?;
                self.normalizer.complete(fields)
            })
            .collect();

        tracing::debug!(candidates = total, items = items.len(), "receipt text parsed");
        items
    }

    pub fn filter(&self) -> &LineFilter {
        &self.filter
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    pub fn normalizer(&self) -> &UnitNormalizer {
        &self.normalizer
    }
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new(&Lexicon::default())
    }
}
