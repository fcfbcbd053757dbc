pub mod inventory;
pub mod item;
pub mod lexicon;

pub use inventory::{to_create_requests, ItemOrigin, NewInventoryItem};
pub use item::{ItemError, ParseResult, ParsedItem, MIN_NAME_CHARS};
pub use lexicon::{Lexicon, LexiconError, UnitEntry};
