use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("no OCR engine compiled in (enable the `tesseract` feature)")]
    NotAvailable,
}

/// Abstraction over an OCR engine: pixels in, recognized text out.
///
/// Language packs, page segmentation and credentials belong to the
/// implementation's constructor, never to `recognize`. Implementations are
/// shared between concurrent pipeline runs, hence `Send + Sync`.
pub trait OcrBackend: Send + Sync {
    /// Short engine name used in error context and logs.
    fn name(&self) -> &str;

    /// Full recognized text, newline-delimited by detected text line. An
    /// image without text yields an empty string, not an error.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        (**self).recognize(image)
    }
}

impl<T: OcrBackend + ?Sized> OcrBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        (**self).recognize(image)
    }
}

/// PNG-encode pixels for engines that only accept encoded images.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(buf)
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Replays canned text, or fails with a canned engine error. Lets the
/// pipeline run without an OCR engine installed.
pub struct MockRecognizer {
    pub text: String,
    pub failure: Option<String>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), failure: None }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { text: String::new(), failure: Some(message.into()) }
    }
}

impl OcrBackend for MockRecognizer {
    fn name(&self) -> &str {
        "mock"
    }

    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        match &self.failure {
            Some(message) => Err(OcrError::Engine(message.clone())),
            None => Ok(self.text.trim().to_string()),
        }
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{encode_png, OcrBackend, OcrError};
    use crate::config::OcrConfig;
    use image::DynamicImage;
    use leptess::{LepTess, Variable};

    /// A fresh engine handle is created per call, so one recognizer can be
    /// shared across threads.
    pub struct TesseractRecognizer {
        config: OcrConfig,
    }

    impl TesseractRecognizer {
        pub fn new(config: OcrConfig) -> Self {
            Self { config }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn name(&self) -> &str {
            "tesseract"
        }

        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            let png = encode_png(image)?;
            let mut lt = LepTess::new(self.config.data_path.as_deref(), &self.config.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            if let Some(psm) = self.config.page_seg_mode {
                lt.set_variable(Variable::TesseditPagesegMode, &psm.to_string())
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
            }
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            if let Some(dpi) = self.config.dpi {
                lt.set_source_resolution(dpi);
            }
            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(text.trim().to_string())
        }
    }
}
