use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::image::DEFAULT_DPI;
use crate::error::{Error, ErrorKind, Result};
use crate::template::MissingKey;

/// Render configuration.
///
/// Every field has a default, so a JSON object only needs the keys it
/// changes:
///
/// ```
/// let opts = docxtpl::RenderOptions::from_json(r#"{"missingKey": "error"}"#).unwrap();
/// assert!(opts.detect_images);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub missing_key: MissingKey,
    /// Turn strings that name image files (or data URIs) into images
    pub detect_images: bool,
    /// Base directory for relative image paths
    pub image_base_dir: Option<PathBuf>,
    /// Resolution assumed when an image carries none
    pub default_dpi: f64,
    /// Render headers, footers, notes and document properties
    pub process_peripherals: bool,
    /// Keep an unloadable image path as text instead of failing
    pub lenient_images: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            missing_key: MissingKey::Empty,
            detect_images: true,
            image_base_dir: None,
            default_dpi: DEFAULT_DPI,
            process_peripherals: true,
            lenient_images: false,
        }
    }
}

impl RenderOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::new(ErrorKind::DataConversion, format!("invalid render options: {}", e))
                .with_cause(e)
        })
    }

    pub fn missing_key(mut self, policy: MissingKey) -> Self {
        self.missing_key = policy;
        self
    }

    pub fn image_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_base_dir = Some(dir.into());
        self
    }

    pub fn detect_images(mut self, enabled: bool) -> Self {
        self.detect_images = enabled;
        self
    }

    pub fn lenient_images(mut self, enabled: bool) -> Self {
        self.lenient_images = enabled;
        self
    }
}
