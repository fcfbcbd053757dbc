use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted item name, counted in characters (not bytes).
pub const MIN_NAME_CHARS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("Item name '{0}' is shorter than {MIN_NAME_CHARS} characters")]
    NameTooShort(String),
    #[error("Item quantity must be at least 1")]
    ZeroQuantity,
    #[error("Item price must not be negative, got {0}")]
    NegativePrice(i64),
}

/// One food item recognized on a receipt.
///
/// Only constructed through [`ParsedItem::new`], so every instance satisfies
/// `quantity >= 1`, a name of at least two characters and a non-negative price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ItemRecord")]
pub struct ParsedItem {
    name: String,
    quantity: u32,
    unit: Option<String>,
    /// Price in whole currency units (won), as printed on the receipt.
    price: Option<i64>,
}

impl ParsedItem {
    pub fn new(
        name: impl Into<String>,
        quantity: u32,
        unit: Option<String>,
        price: Option<i64>,
    ) -> Result<Self, ItemError> {
        let name = name.into().trim().to_string();
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(ItemError::NameTooShort(name));
        }
        if quantity == 0 {
            return Err(ItemError::ZeroQuantity);
        }
        if let Some(p) = price {
            if p < 0 {
                return Err(ItemError::NegativePrice(p));
            }
        }
        let unit = unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        Ok(Self { name, quantity, unit, price })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn price(&self) -> Option<i64> {
        self.price
    }
}

/// Unchecked wire shape; deserialization goes through [`ParsedItem::new`].
#[derive(Deserialize)]
struct ItemRecord {
    name: String,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    price: Option<i64>,
}

fn one() -> u32 {
    1
}

impl TryFrom<ItemRecord> for ParsedItem {
    type Error = ItemError;

    fn try_from(r: ItemRecord) -> Result<Self, Self::Error> {
        ParsedItem::new(r.name, r.quantity, r.unit, r.price)
    }
}

/// Items recognized in one pipeline run, in receipt line order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParseResult(Vec<ParsedItem>);

impl ParseResult {
    pub fn new(items: Vec<ParsedItem>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParsedItem> {
        self.0.iter()
    }

    pub fn into_items(self) -> Vec<ParsedItem> {
        self.0
    }
}

impl FromIterator<ParsedItem> for ParseResult {
    fn from_iter<I: IntoIterator<Item = ParsedItem>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ParseResult {
    type Item = ParsedItem;
    type IntoIter = std::vec::IntoIter<ParsedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParseResult {
    type Item = &'a ParsedItem;
    type IntoIter = std::slice::Iter<'a, ParsedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
