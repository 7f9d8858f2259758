//! Request and result types for passport extraction.

use crate::display;
use crate::vision::sniff_media_type;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An uploaded passport photo. The bytes are forwarded to the model untouched.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Vec<u8>,
    pub media_type: &'static str,
    pub sha256: String,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let sha256 = format!("{:x}", Sha256::digest(&data));
        Self {
            filename: filename.into(),
            media_type: sniff_media_type(&data),
            sha256,
            data,
        }
    }

    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            filename: self.filename.clone(),
            size_bytes: self.data.len(),
            media_type: self.media_type.to_string(),
            sha256: self.sha256.clone(),
        }
    }
}

/// Metadata about an uploaded image, without the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub filename: String,
    pub size_bytes: usize,
    pub media_type: String,
    pub sha256: String,
}

/// The model's raw answer for one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: String,
    pub template: String,
    pub provider: String,
    pub model: String,
    pub extracted_at: DateTime<Utc>,
    pub image_sha256: String,
    /// Model output, verbatim.
    pub raw: String,
}

impl ExtractionResult {
    pub fn new(
        template: &str,
        provider: &str,
        model: &str,
        image: &UploadedImage,
        raw: String,
    ) -> Self {
        Self {
            id: format!("ext_{}", Uuid::new_v4().simple()),
            template: template.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            extracted_at: Utc::now(),
            image_sha256: image.sha256.clone(),
            raw,
        }
    }

    pub fn view(&self) -> ExtractionView {
        ExtractionView {
            heading: display::heading(&self.template),
            lines: display::display_lines(&self.raw),
            result: self.clone(),
        }
    }
}

/// An extraction result prepared for display.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionView {
    pub heading: String,
    /// Response split into Markdown lines, in order, empty lines kept.
    pub lines: Vec<String>,
    #[serde(flatten)]
    pub result: ExtractionResult,
}
