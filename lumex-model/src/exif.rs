use chrono::{DateTime, Utc};

/// EXIF-like metadata captured for one image, stored opaquely.
///
/// Tag parsing belongs to the external extractor; the engine only carries
/// the result through to persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExifData {
    pub captured_at: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Result of running the metadata extractor over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractedMetadata {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub exif: Option<ExifData>,
}

impl ExtractedMetadata {
    /// Best-known capture date: the EXIF timestamp when present, otherwise
    /// the filesystem creation time.
    pub fn capture_date(&self) -> DateTime<Utc> {
        self.exif
            .as_ref()
            .and_then(|exif| exif.captured_at)
            .unwrap_or(self.created_at)
    }

    /// EXIF capture timestamp, if the extractor produced one.
    pub fn exif_date(&self) -> Option<DateTime<Utc>> {
        self.exif.as_ref().and_then(|exif| exif.captured_at)
    }
}
