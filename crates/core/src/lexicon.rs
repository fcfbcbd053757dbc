use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Failed to parse lexicon TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Lexicon table '{0}' must not be empty")]
    EmptyTable(&'static str),
    #[error("Lexicon table '{0}' contains a blank entry")]
    BlankEntry(&'static str),
}

/// A quantity unit as it may appear on a receipt, and the token it normalizes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEntry {
    pub token: String,
    /// Normalized form; `None` keeps the token itself.
    #[serde(default)]
    pub canonical: Option<String>,
}

impl UnitEntry {
    pub fn new(token: &str, canonical: &str) -> Self {
        Self { token: token.to_string(), canonical: Some(canonical.to_string()) }
    }

    pub fn verbatim(token: &str) -> Self {
        Self { token: token.to_string(), canonical: None }
    }

    pub fn canonical(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.token)
    }
}

/// Keyword and unit tables driving line filtering and unit inference.
///
/// Built once (either [`Lexicon::default`] or [`Lexicon::from_toml`]) and then
/// shared read-only, typically behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// A line containing any of these (case-insensitive) is not an item line.
    pub ignore_keywords: Vec<String>,
    /// Quantity units recognized directly after a number, e.g. `2개`, `1.5kg`.
    pub units: Vec<UnitEntry>,
    /// Packaging words used as the unit when a name carries no measure.
    pub containers: Vec<String>,
    /// Foods counted by the piece.
    pub staples: Vec<String>,
    /// Drinks that default to the bottle unit.
    pub beverages: Vec<String>,
    pub count_unit: String,
    pub bottle_unit: String,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            ignore_keywords: to_strings(&[
                // totals and tax
                "합계", "소계", "총액", "총 금액", "총금액", "부가세", "부가가치세", "과세", "면세",
                "받을금액", "받은금액", "거스름", "할인", "total", "subtotal", "tax", "vat",
                "change", "discount",
                // payment
                "결제", "카드", "신용", "현금", "승인", "할부", "cash", "card", "visa", "master",
                // store metadata
                "영수증", "사업자", "대표", "전화", "주소", "매장", "가맹점", "점포", "계산대",
                "pos", "tel:", "tel.", "receipt",
                // footer
                "감사합니다", "포인트", "적립", "교환", "환불", "thank",
                // contact / web
                "http", "www", ".com", ".co.kr",
            ]),
            units: vec![
                UnitEntry::new("kg", "kg"),
                UnitEntry::new("킬로그램", "kg"),
                UnitEntry::new("킬로", "kg"),
                UnitEntry::new("g", "g"),
                UnitEntry::new("그램", "g"),
                UnitEntry::new("ml", "ml"),
                UnitEntry::new("밀리리터", "ml"),
                UnitEntry::new("l", "L"),
                UnitEntry::new("리터", "L"),
                UnitEntry::verbatim("개입"),
                UnitEntry::verbatim("개"),
                UnitEntry::verbatim("입"),
                UnitEntry::verbatim("봉지"),
                UnitEntry::verbatim("봉"),
                UnitEntry::verbatim("팩"),
                UnitEntry::verbatim("병"),
                UnitEntry::verbatim("캔"),
                UnitEntry::verbatim("컵"),
                UnitEntry::verbatim("박스"),
                UnitEntry::verbatim("상자"),
                UnitEntry::verbatim("묶음"),
                UnitEntry::verbatim("송이"),
                UnitEntry::verbatim("포기"),
                UnitEntry::verbatim("마리"),
                UnitEntry::verbatim("판"),
                UnitEntry::verbatim("단"),
                UnitEntry::verbatim("구"),
                UnitEntry::verbatim("pcs"),
                UnitEntry::verbatim("pc"),
                UnitEntry::verbatim("ea"),
                UnitEntry::verbatim("pack"),
                UnitEntry::verbatim("pk"),
                UnitEntry::verbatim("btl"),
                UnitEntry::verbatim("can"),
                UnitEntry::verbatim("box"),
                UnitEntry::verbatim("bag"),
            ],
            containers: to_strings(&[
                "캔", "병", "팩", "봉지", "봉", "박스", "상자", "컵", "파우치", "묶음",
                "can", "bottle", "pack", "bag", "box", "cup", "pouch", "bundle",
            ]),
            staples: to_strings(&[
                "계란", "달걀", "사과", "바나나", "양파", "감자", "고구마", "당근", "오이",
                "호박", "토마토", "배추", "두부", "레몬", "오렌지", "아보카도", "파프리카",
                "egg", "apple", "banana", "onion", "potato", "carrot", "cucumber", "tomato",
                "lemon", "orange", "tofu", "avocado",
            ]),
            beverages: to_strings(&[
                "우유", "주스", "콜라", "사이다", "생수", "탄산수", "맥주", "소주", "와인",
                "커피", "milk", "juice", "cola", "soda", "water", "beer", "wine", "coffee",
            ]),
            count_unit: "개".to_string(),
            bottle_unit: "병".to_string(),
        }
    }
}

impl Lexicon {
    /// Parse a lexicon from TOML. Tables omitted from the document keep their
    /// built-in defaults.
    pub fn from_toml(toml_content: &str) -> Result<Self, LexiconError> {
        let lexicon: Lexicon = toml::from_str(toml_content)?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    pub fn validate(&self) -> Result<(), LexiconError> {
        if self.units.is_empty() {
            return Err(LexiconError::EmptyTable("units"));
        }
        let blank = |s: &str| s.trim().is_empty();
        if self.ignore_keywords.iter().any(|k| blank(k)) {
            return Err(LexiconError::BlankEntry("ignore_keywords"));
        }
        if self.units.iter().any(|u| blank(&u.token) || blank(u.canonical())) {
            return Err(LexiconError::BlankEntry("units"));
        }
        if self.containers.iter().any(|c| blank(c)) {
            return Err(LexiconError::BlankEntry("containers"));
        }
        if self.staples.iter().chain(&self.beverages).any(|s| blank(s)) {
            return Err(LexiconError::BlankEntry("staples/beverages"));
        }
        if blank(&self.count_unit) || blank(&self.bottle_unit) {
            return Err(LexiconError::BlankEntry("count_unit/bottle_unit"));
        }
        Ok(())
    }

    /// Canonical form of a unit token, compared case-insensitively after
    /// trimming. Tokens outside the table come back trimmed, case kept.
    pub fn canonical_unit(&self, token: &str) -> String {
        let token = token.trim();
        let lower = token.to_lowercase();
        self.units
            .iter()
            .find(|u| u.token.to_lowercase() == lower)
            .map(|u| u.canonical().to_string())
            .unwrap_or_else(|| token.to_string())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
