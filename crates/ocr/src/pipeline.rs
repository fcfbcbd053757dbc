use std::borrow::Cow;
use std::path::Path;

use image::DynamicImage;
use pantry_core::{Lexicon, ParseResult};
use pantry_parse::ReceiptParser;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::preprocess::Preprocessor;
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::RawImage;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image could not be decoded: {0}")]
    ImageUnreadable(#[from] image::ImageError),
    #[error("OCR engine '{engine}' failed: {source}")]
    Ocr {
        engine: String,
        #[source]
        source: OcrError,
    },
}

/// Orchestrates: decode → preprocess → OCR → filter → extract → backfill.
///
/// Holds no per-run state; one pipeline can serve any number of concurrent
/// runs as long as its backend can.
pub struct ReceiptPipeline<R: OcrBackend> {
    recognizer: R,
    preprocessor: Preprocessor,
    parser: ReceiptParser,
}

impl<R: OcrBackend> ReceiptPipeline<R> {
    /// Pipeline with default preprocessing and the built-in lexicon.
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            preprocessor: Preprocessor::default(),
            parser: ReceiptParser::default(),
        }
    }

    pub fn with_config(recognizer: R, config: &PipelineConfig, lexicon: &Lexicon) -> Self {
        Self {
            recognizer,
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            parser: ReceiptParser::new(lexicon),
        }
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Read an image file and process it; the extension picks the decoder.
    pub fn process_file(&self, path: &Path) -> Result<ParseResult, PipelineError> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|e| e.to_str());
        self.process(&RawImage::new(&bytes, ext))
    }

    /// Run one receipt image through the whole pipeline.
    ///
    /// Zero recognized items is a successful, empty result. Only an
    /// undecodable image or a failing OCR engine is an error.
    pub fn process(&self, image: &RawImage<'_>) -> Result<ParseResult, PipelineError> {
        let _span = tracing::info_span!("receipt_scan", bytes = image.len()).entered();

        let decoded = image.decode()?;
        let text = self.recognize(&decoded)?;
        drop(decoded);

        if text.trim().is_empty() {
            tracing::info!("no text recognized");
            return Ok(ParseResult::default());
        }

        let result = self.parser.parse(&text);
        tracing::info!(items = result.len(), "receipt processed");
        Ok(result)
    }

    /// Preprocess (when worthwhile) and run OCR on already-decoded pixels.
    pub fn recognize(&self, decoded: &DynamicImage) -> Result<String, PipelineError> {
        let prepared = if self.preprocessor.should_preprocess(decoded) {
            self.preprocessor.preprocess(decoded)
        } else {
            tracing::debug!(
                width = decoded.width(),
                height = decoded.height(),
                "image below minimum size, skipping preprocessing"
            );
            Cow::Borrowed(decoded)
        };

        self.recognizer
            .recognize(&prepared)
            .map(|text| text.trim().to_string())
            .map_err(|source| {
                tracing::error!(engine = self.recognizer.name(), error = %source, "OCR failed");
                PipelineError::Ocr { engine: self.recognizer.name().to_string(), source }
            })
    }

    /// Text stage only, for text recognized elsewhere.
    pub fn process_text(&self, text: &str) -> ParseResult {
        self.parser.parse(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{ColorType, ImageBuffer, Luma, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    const RECEIPT: &str = "홈플러스\n우유 2개 3,000원\n사과 1.5kg 10,000원\n합계 13,000원\n카드 13,000원";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            if (x / 7 + y / 11) % 5 == 0 { Rgb([20, 20, 20]) } else { Rgb([230, 230, 225]) }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Remembers what the engine was shown.
    struct RecordingRecognizer {
        text: String,
        seen: Mutex<Vec<(u32, u32, ColorType)>>,
    }

    impl RecordingRecognizer {
        fn new(text: &str) -> Self {
            Self { text: text.to_string(), seen: Mutex::new(Vec::new()) }
        }
    }

    impl OcrBackend for RecordingRecognizer {
        fn name(&self) -> &str {
            "recording"
        }

        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.width(), image.height(), image.color()));
            Ok(self.text.clone())
        }
    }

    #[test]
    fn process_produces_items_in_line_order() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new(RECEIPT));
        let bytes = png(300, 400);
        let result = pipeline.process(&RawImage::new(&bytes, Some("image/png"))).unwrap();

        let items = result.into_items();
        let names: Vec<&str> = items.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["홈플러스", "우유", "사과"]);
        assert_eq!(items[1].quantity(), 2);
        assert_eq!(items[1].unit(), Some("개"));
        assert_eq!(items[1].price(), Some(3000));
        assert_eq!(items[2].quantity(), 2);
        assert_eq!(items[2].unit(), Some("kg"));
    }

    #[test]
    fn empty_text_is_empty_success() {
        let bytes = png(300, 300);
        for text in ["", "  \n \n"] {
            let pipeline = ReceiptPipeline::new(MockRecognizer::new(text));
            let result = pipeline.process(&RawImage::new(&bytes, None)).unwrap();
            assert!(result.is_empty());
        }
    }

    #[test]
    fn only_noise_is_empty_success() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("합계 3,000\n8801234567890\n*"));
        let bytes = png(300, 300);
        assert!(pipeline.process(&RawImage::new(&bytes, None)).unwrap().is_empty());
    }

    #[test]
    fn undecodable_image_is_fatal() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new(RECEIPT));
        let err = pipeline
            .process(&RawImage::new(b"definitely not pixels", Some("jpg")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageUnreadable(_)));
    }

    #[test]
    fn engine_failure_is_fatal_with_context() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::failing("tessdata not found"));
        let bytes = png(300, 300);
        let err = pipeline.process(&RawImage::new(&bytes, None)).unwrap_err();
        match &err {
            PipelineError::Ocr { engine, source } => {
                assert_eq!(engine, "mock");
                assert!(matches!(source, OcrError::Engine(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "OCR engine 'mock' failed: OCR engine error: tessdata not found");
    }

    #[test]
    fn small_image_bypasses_preprocessing() {
        let pipeline = ReceiptPipeline::new(RecordingRecognizer::new("우유 2개 3,000원"));
        let bytes = png(150, 400);
        let result = pipeline.process(&RawImage::new(&bytes, Some("png"))).unwrap();

        assert_eq!(result.len(), 1);
        let seen = pipeline.recognizer().seen.lock().unwrap();
        // OCR still ran, on the raw decoded image.
        assert_eq!(seen.as_slice(), &[(150, 400, ColorType::Rgb8)]);
    }

    #[test]
    fn large_image_is_enhanced_before_ocr() {
        let pipeline = ReceiptPipeline::new(RecordingRecognizer::new(""));
        let bytes = png(600, 800);
        pipeline.process(&RawImage::new(&bytes, Some("png"))).unwrap();

        let seen = pipeline.recognizer().seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(1800, 2400, ColorType::L8)]);
    }

    #[test]
    fn custom_config_and_lexicon_are_used() {
        let config = PipelineConfig::from_toml("[preprocess]\nenabled = false").unwrap();
        let lexicon = Lexicon { ignore_keywords: vec!["쿠폰".into()], ..Lexicon::default() };
        let pipeline = ReceiptPipeline::with_config(
            RecordingRecognizer::new("쿠폰 할인 1,000원\n합계 우유 3,000원"),
            &config,
            &lexicon,
        );
        let bytes = png(600, 800);
        let result = pipeline.process(&RawImage::new(&bytes, None)).unwrap();

        // "합계" is no longer an ignore keyword under this lexicon.
        assert_eq!(result.iter().map(|i| i.name()).collect::<Vec<_>>(), vec!["합계 우유"]);
        let seen = pipeline.recognizer().seen.lock().unwrap();
        assert_eq!(seen[0], (600, 800, ColorType::Rgb8));
    }

    #[test]
    fn process_file_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, png(300, 300)).unwrap();

        let pipeline = ReceiptPipeline::new(MockRecognizer::new(RECEIPT));
        assert_eq!(pipeline.process_file(&path).unwrap().len(), 3);

        let missing = pipeline.process_file(&dir.path().join("missing.jpg")).unwrap_err();
        assert!(matches!(missing, PipelineError::Io(_)));
    }

    #[test]
    fn process_text_skips_image_stages() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::failing("unused"));
        assert_eq!(pipeline.process_text(RECEIPT).len(), 3);
    }

    #[test]
    fn concurrent_runs_share_one_pipeline() {
        let pipeline = Arc::new(ReceiptPipeline::new(MockRecognizer::new(RECEIPT)));
        let bytes = png(220, 220);
        let expected = pipeline.process(&RawImage::new(&bytes, None)).unwrap();

        let (pipeline, bytes) = (&pipeline, bytes.as_slice());
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || pipeline.process(&RawImage::new(bytes, None)).unwrap()))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn grayscale_input_is_accepted() {
        let img: image::GrayImage = ImageBuffer::from_fn(250, 250, |x, _| Luma([(x % 256) as u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let pipeline = ReceiptPipeline::new(RecordingRecognizer::new(""));
        pipeline.process(&RawImage::new(&bytes, None)).unwrap();
        let seen = pipeline.recognizer().seen.lock().unwrap();
        assert_eq!(seen[0].2, ColorType::L8);
    }
}
