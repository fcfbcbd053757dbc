use pantry_core::Lexicon;

re!(re_numeric_only, r"^[\d\s.,\-/:*#₩원]+$");

/// A trimmed receipt line together with its position in the recognized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Zero-based line number in the raw text, counting dropped lines.
    pub index: usize,
    pub text: String,
}

/// Drops receipt lines that cannot describe an item: blanks, totals, payment
/// and store metadata, and bare numbers such as barcodes or stray prices.
#[derive(Debug, Clone)]
pub struct LineFilter {
    /// Lowercased once so matching stays case-insensitive.
    keywords: Vec<String>,
}

impl LineFilter {
    pub fn new(lexicon: &Lexicon) -> Self {
        let keywords = lexicon
            .ignore_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Candidate lines in their original order.
    pub fn filter_lines(&self, text: &str) -> Vec<Line> {
        text.lines()
            .enumerate()
            .filter_map(|(index, raw)| {
                let trimmed = raw.trim();
                if self.is_candidate(trimmed) {
                    Some(Line { index, text: trimmed.to_string() })
                } else {
                    if !trimmed.is_empty() {
                        tracing::trace!(line = index, text = trimmed, "line filtered out");
                    }
                    None
                }
            })
            .collect()
    }

    pub fn is_candidate(&self, line: &str) -> bool {
        let line = line.trim();
        if line.chars().count() < 2 {
            return false;
        }
        if self.ignored_keyword(line).is_some() {
            return false;
        }
        !re_numeric_only().is_match(line)
    }

    /// First ignore keyword contained in `line`, if any.
    pub fn ignored_keyword(&self, line: &str) -> Option<&str> {
        let lower = line.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lower.contains(k.as_str()))
            .map(String::as_str)
    }
}
