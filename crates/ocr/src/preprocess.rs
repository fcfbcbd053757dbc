use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Image has degenerate dimensions {width}x{height}")]
    Degenerate { width: u32, height: u32 },
    #[error("Invalid preprocessing parameter: {0}")]
    InvalidParameter(String),
}

/// Tuning for the enhancement chain. Defaults are the values the OCR engine
/// was tuned against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    /// Images with either side below this are handed to OCR untouched.
    pub min_dimension: u32,
    /// Odd Gaussian kernel size for speckle suppression.
    pub blur_kernel: u32,
    /// Odd neighbourhood size of the adaptive threshold.
    pub threshold_block: u32,
    /// Constant subtracted from the weighted neighbourhood mean.
    pub threshold_offset: i32,
    /// Side of the square structuring element for opening/closing.
    pub morph_size: u32,
    pub target_width: u32,
    /// Relative width difference under which resizing is skipped.
    pub resize_tolerance: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_dimension: 200,
            blur_kernel: 3,
            threshold_block: 15,
            threshold_offset: 10,
            morph_size: 2,
            target_width: 1800,
            resize_tolerance: 0.10,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), PreprocessError> {
        let odd = |k: u32| k >= 3 && k % 2 == 1;
        if !odd(self.blur_kernel) {
            return Err(PreprocessError::InvalidParameter(format!(
                "blur_kernel must be odd and >= 3, got {}",
                self.blur_kernel
            )));
        }
        if !odd(self.threshold_block) {
            return Err(PreprocessError::InvalidParameter(format!(
                "threshold_block must be odd and >= 3, got {}",
                self.threshold_block
            )));
        }
        if !(1..=255).contains(&self.morph_size) {
            return Err(PreprocessError::InvalidParameter(format!(
                "morph_size must be in 1..=255, got {}",
                self.morph_size
            )));
        }
        if self.target_width == 0 {
            return Err(PreprocessError::InvalidParameter("target_width must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.resize_tolerance) {
            return Err(PreprocessError::InvalidParameter(format!(
                "resize_tolerance must be in [0, 1), got {}",
                self.resize_tolerance
            )));
        }
        Ok(())
    }
}

/// Deterministic pixel clean-up ahead of OCR:
/// grayscale → Gaussian blur → adaptive threshold → open/close → resize.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Small images lose more than they gain from enhancement.
    pub fn should_preprocess(&self, img: &DynamicImage) -> bool {
        self.config.enabled
            && img.width() >= self.config.min_dimension
            && img.height() >= self.config.min_dimension
    }

    /// Enhance `img`, or hand back the original untouched if any stage fails.
    pub fn preprocess<'a>(&self, img: &'a DynamicImage) -> Cow<'a, DynamicImage> {
        match self.try_enhance(img) {
            Ok(enhanced) => Cow::Owned(enhanced),
            Err(e) => {
                tracing::warn!(error = %e, "preprocessing failed, using original image");
                Cow::Borrowed(img)
            }
        }
    }

    pub fn try_enhance(&self, img: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        self.config.validate()?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PreprocessError::Degenerate { width: img.width(), height: img.height() });
        }

        let gray = to_grayscale(img);
        let blurred = gaussian_blur(&gray, self.config.blur_kernel);
        let binary = adaptive_threshold_gaussian(
            &blurred,
            self.config.threshold_block,
            self.config.threshold_offset,
        );
        let cleaned = open_close(&binary, self.config.morph_size);
        let resized = self.resize_to_target(cleaned)?;

        tracing::debug!(
            from_width = img.width(),
            from_height = img.height(),
            to_width = resized.width(),
            to_height = resized.height(),
            "image preprocessed"
        );
        Ok(DynamicImage::ImageLuma8(resized))
    }

    fn resize_to_target(&self, img: GrayImage) -> Result<GrayImage, PreprocessError> {
        let (w, h) = img.dimensions();
        let target = self.config.target_width;
        let diff = (w as f64 - target as f64).abs() / target as f64;
        if diff <= self.config.resize_tolerance as f64 {
            return Ok(img);
        }
        let new_h = (h as f64 * target as f64 / w as f64).round();
        if new_h < 1.0 || new_h > u32::MAX as f64 {
            return Err(PreprocessError::Degenerate { width: target, height: new_h as u32 });
        }
        Ok(imageops::resize(&img, target, new_h as u32, FilterType::CatmullRom))
    }
}

fn to_grayscale(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Normalized 1-D Gaussian kernel of odd size `ksize`, with sigma derived from
/// the size the same way OpenCV does when none is given.
fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    let sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (ksize as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..ksize)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

fn gaussian_blur(img: &GrayImage, ksize: u32) -> GrayImage {
    separable_filter_equal(img, &gaussian_kernel(ksize))
}

/// Binarize each pixel against its Gaussian-weighted neighbourhood mean minus
/// `offset`. Brighter than the local threshold → 255, else 0.
fn adaptive_threshold_gaussian(img: &GrayImage, block: u32, offset: i32) -> GrayImage {
    let local_mean = separable_filter_equal(img, &gaussian_kernel(block));
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let src = img.get_pixel(x, y)[0] as i32;
        let threshold = local_mean.get_pixel(x, y)[0] as i32 - offset;
        Luma([if src > threshold { 255 } else { 0 }])
    })
}

/// Opening drops specks smaller than the element, closing then rejoins
/// broken strokes.
fn open_close(img: &GrayImage, size: u32) -> GrayImage {
    let element = GrayImage::from_pixel(size, size, Luma([255]));
    let anchor = (size / 2) as u8;
    let mask = Mask::from_image(&element, anchor, anchor);
    let opened = grayscale_open(img, &mask);
    grayscale_close(&opened, &mask)
}
