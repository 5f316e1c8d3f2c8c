//! Shared fixtures for integration tests.

use std::collections::HashMap;

use cms_media_mirror::{AssetPayload, AssetRecord, AssetStore, ResponsiveImage};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Asset store backed by a fixed map, keyed by canonical URI.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, AssetRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_image(mut self, uri: &str, id: &str, src: &str) -> Self {
        self.records.insert(
            uri.to_string(),
            AssetRecord {
                id: id.to_string(),
                locator: src.to_string(),
                payload: AssetPayload::Image(ResponsiveImage::plain(src)),
            },
        );
        self
    }

    #[must_use]
    pub fn with_file(mut self, uri: &str, id: &str, locator: &str) -> Self {
        self.records.insert(
            uri.to_string(),
            AssetRecord {
                id: id.to_string(),
                locator: locator.to_string(),
                payload: AssetPayload::File,
            },
        );
        self
    }
}

impl AssetStore for MemoryStore {
    async fn get_asset_by_uri(&self, uri: &str) -> Option<AssetRecord> {
        self.records.get(uri).cloned()
    }
}
