use image::{DynamicImage, ImageFormat};

/// Undecoded image bytes as received from the caller, plus the declared
/// MIME type or file extension. Borrowed: the pipeline never keeps it.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    bytes: &'a [u8],
    declared: Option<&'a str>,
}

impl<'a> RawImage<'a> {
    /// `declared` may be a MIME type (`image/jpeg`) or an extension (`jpg`, `.PNG`).
    pub fn new(bytes: &'a [u8], declared: Option<&'a str>) -> Self {
        Self { bytes, declared }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Image format named by the declared type, if it names one.
    pub fn declared_format(&self) -> Option<ImageFormat> {
        let declared = self.declared?.trim();
        if declared.contains('/') {
            ImageFormat::from_mime_type(declared.to_lowercase())
        } else {
            ImageFormat::from_extension(declared.trim_start_matches('.').to_lowercase())
        }
    }

    /// Decode to pixels. The declared format picks the decoder; when it is
    /// missing or wrong the format is sniffed from the bytes instead.
    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        match self.declared_format() {
            Some(format) => image::load_from_memory_with_format(self.bytes, format)
                .or_else(|declared_err| image::load_from_memory(self.bytes).map_err(|_| declared_err)),
            None => image::load_from_memory(self.bytes),
        }
    }
}
