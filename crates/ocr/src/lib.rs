//! Receipt image to inventory items: image cleanup, OCR behind a swappable
//! backend, and the pipeline tying both to the text parser.

pub mod config;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use config::{ConfigError, OcrConfig, PipelineConfig};
pub use pipeline::{PipelineError, ReceiptPipeline};
pub use preprocess::{PreprocessConfig, PreprocessError, Preprocessor};
pub use recognizer::{encode_png, MockRecognizer, OcrBackend, OcrError};
#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
pub use types::RawImage;
