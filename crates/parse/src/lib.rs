//! Text stage of receipt ingestion: recognized receipt text in, ordered item
//! list out. Nothing here touches images or an OCR engine.

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($vis:vis $name:ident, $pat:expr) => {
        $vis fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod extract;
pub mod filter;
pub mod parser;
pub mod units;
pub(crate) mod util;

pub use extract::{FieldExtractor, LineFields};
pub use filter::{Line, LineFilter};
pub use parser::ReceiptParser;
pub use units::UnitNormalizer;
