//! Asset records as stored in, and returned by, the asset store.

use serde::{Deserialize, Serialize};

/// A mirrored asset known to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Store-assigned stable identifier.
    pub id: String,
    /// Local URL or path the asset is served from.
    pub locator: String,
    /// What kind of asset this is and how to render it.
    pub payload: AssetPayload,
}

/// Render payload carried by an [`AssetRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetPayload {
    /// An image with responsive encoding data.
    Image(ResponsiveImage),
    /// Any other file, served as-is from `locator`.
    File,
}

/// Responsive encoding data for an image asset.
///
/// `src` is always present; the remaining fields are populated when the
/// encoder produced multiple renditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponsiveImage {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_webp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srcset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    /// Widths (px) of the encoded renditions, ascending.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encoded_variants: Vec<u32>,
}

impl ResponsiveImage {
    /// An image with a single rendition and no responsive metadata.
    #[must_use]
    pub fn plain(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Self::default()
        }
    }

    /// URL suitable for a `poster` attribute: the WebP rendition when one
    /// was encoded, the base rendition otherwise.
    #[must_use]
    pub fn poster_url(&self) -> &str {
        self.src_webp.as_deref().unwrap_or(&self.src)
    }
}

impl AssetRecord {
    /// URL written into rewritten markup for this asset.
    #[must_use]
    pub fn display_url(&self) -> &str {
        match &self.payload {
            AssetPayload::Image(image) => &image.src,
            AssetPayload::File => &self.locator,
        }
    }
}
