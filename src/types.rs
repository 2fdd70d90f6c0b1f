use serde::{Deserialize, Serialize};

/// One image known to the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// File name including its extension. Unique within a catalog.
    pub name: String,
    /// Whether a cropped version has been uploaded and recorded.
    #[serde(default)]
    pub processed: bool,
}

impl ImageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processed: false,
        }
    }

    /// The API lookup key for this image.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// Strip the last extension from a file name.
///
/// Names without an extension (`"README"`) and dot-files (`".hidden"`)
/// are returned unchanged.
pub fn base_name(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Display URL response of `GET /image/{baseName}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DisplayUrl {
    #[serde(default)]
    pub url: Option<String>,
}

/// An image opened for cropping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropSession {
    pub descriptor: ImageDescriptor,
    /// Short-lived URL of the full resolution image.
    pub display_url: String,
}

/// Lifecycle of the crop session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No image is open.
    Idle,
    /// An image is open and its crop box can be adjusted.
    Open,
    /// The crop is being uploaded and recorded.
    Committing,
}

/// Load state of the catalog, as shown by a list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStatus {
    /// No refresh has completed yet.
    Loading,
    /// The last refresh succeeded.
    Ready,
    /// The last refresh failed with this message.
    Failed(String),
}

/// Progress counters over the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub total: usize,
    pub processed: usize,
}

impl CatalogSummary {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }
}
