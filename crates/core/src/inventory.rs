use serde::{Deserialize, Serialize};
use std::fmt;

use crate::item::{ParseResult, ParsedItem};

/// How an inventory row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    Manual,
    /// Added automatically from a scanned receipt.
    ReceiptScan,
}

impl fmt::Display for ItemOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOrigin::Manual => write!(f, "manual"),
            ItemOrigin::ReceiptScan => write!(f, "receipt_scan"),
        }
    }
}

/// Create-request handed to the inventory store's bulk insert.
///
/// Duplicate names and validation conflicts are the store's business; the
/// mapping here is strictly one request per parsed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub quantity: u32,
    pub unit: Option<String>,
    pub price: Option<i64>,
    pub origin: ItemOrigin,
}

impl From<&ParsedItem> for NewInventoryItem {
    fn from(item: &ParsedItem) -> Self {
        Self {
            name: item.name().to_string(),
            quantity: item.quantity(),
            unit: item.unit().map(str::to_string),
            price: item.price(),
            origin: ItemOrigin::ReceiptScan,
        }
    }
}

/// Map a parse result to create-requests, preserving receipt order.
pub fn to_create_requests(result: &ParseResult) -> Vec<NewInventoryItem> {
    result.iter().map(NewInventoryItem::from).collect()
}
