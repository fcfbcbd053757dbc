use std::path::{Path, PathBuf};

use pantry_core::{Lexicon, LexiconError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::preprocess::{PreprocessConfig, PreprocessError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

/// OCR engine tuning, handed to the engine at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory holding the engine's language data; `None` uses the system default.
    pub data_path: Option<String>,
    /// Language packs, `+`-joined (Tesseract convention).
    pub lang: String,
    /// Page segmentation mode; 6 treats the image as one uniform text block.
    pub page_seg_mode: Option<u8>,
    pub dpi: Option<i32>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            lang: "kor+eng".to_string(),
            page_seg_mode: Some(6),
            dpi: Some(300),
        }
    }
}

/// Everything a pipeline needs besides the engine itself.
///
/// ```toml
/// lexicon_path = "lexicon.toml"
///
/// [preprocess]
/// target_width = 1800
///
/// [ocr]
/// lang = "kor+eng"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub ocr: OcrConfig,
    /// Optional lexicon override; relative paths resolve against the config file.
    pub lexicon_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_content)?;
        config.preprocess.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let mut config = Self::from_toml(&content)?;
        if let (Some(lexicon), Some(dir)) = (&config.lexicon_path, path.parent()) {
            if lexicon.is_relative() {
                config.lexicon_path = Some(dir.join(lexicon));
            }
        }
        Ok(config)
    }

    /// The configured lexicon, or the built-in one when none is set.
    pub fn load_lexicon(&self) -> Result<Lexicon, ConfigError> {
        match &self.lexicon_path {
            Some(path) => {
                let lexicon = Lexicon::from_toml(&read(path)?)?;
                tracing::info!(path = %path.display(), "lexicon loaded");
                Ok(lexicon)
            }
            None => Ok(Lexicon::default()),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.preprocess.target_width, 1800);
        assert_eq!(config.ocr.lang, "kor+eng");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [preprocess]
            min_dimension = 320

            [ocr]
            lang = "eng"
            page_seg_mode = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.preprocess.min_dimension, 320);
        assert_eq!(config.preprocess.threshold_block, 15);
        assert_eq!(config.ocr.lang, "eng");
        assert_eq!(config.ocr.page_seg_mode, Some(4));
        assert_eq!(config.ocr.dpi, Some(300));
    }

    #[test]
    fn invalid_preprocess_values_rejected() {
        let err = PipelineConfig::from_toml("[preprocess]\nblur_kernel = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Preprocess(_)));
    }

    #[test]
    fn load_resolves_lexicon_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("words.toml"),
            "ignore_keywords = [\"쿠폰\"]\n",
        )
        .unwrap();
        let config_path = dir.path().join("pantry.toml");
        std::fs::write(&config_path, "lexicon_path = \"words.toml\"\n").unwrap();

        let config = PipelineConfig::load(&config_path).unwrap();
        assert_eq!(config.lexicon_path.as_deref(), Some(dir.path().join("words.toml").as_path()));
        let lexicon = config.load_lexicon().unwrap();
        assert_eq!(lexicon.ignore_keywords, vec!["쿠폰"]);
    }

    #[test]
    fn missing_files_report_path() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pantry.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pantry.toml"));
    }

    #[test]
    fn default_lexicon_without_path() {
        assert_eq!(PipelineConfig::default().load_lexicon().unwrap(), Lexicon::default());
    }
}
