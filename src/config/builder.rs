//! Builder for `MirrorConfig` with validation at build time.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, anyhow};
use url::Url;

use super::types::{MirrorConfig, SitePair};

/// Extensions that get responsive encoding when nothing else is configured.
const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "mp3", "jpg", "jpeg", "png"];

/// Fluent builder for [`MirrorConfig`].
///
/// At least one `(site_url, uploads_url)` pair is required; `build` rejects
/// relative or non-HTTP URLs so the hot classification path never has to
/// re-validate them.
#[derive(Debug, Default)]
pub struct MirrorConfigBuilder {
    sites: Vec<SitePair>,
    normalized_prefix: Option<String>,
    path_prefix: String,
    http_headers: HashMap<String, String>,
    supported_extensions: Option<HashSet<String>>,
    cache_ttl_secs: i64,
}

impl MirrorConfig {
    /// Create a builder for configuring a `MirrorConfig` with a fluent
    /// interface.
    #[must_use]
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }
}

impl MirrorConfigBuilder {
    /// Register a classifier pair. Call repeatedly for multi-environment
    /// setups; order matters, first acceptance wins.
    #[must_use]
    pub fn site(mut self, site_url: impl Into<String>, uploads_url: impl Into<String>) -> Self {
        self.sites.push(SitePair {
            site_url: site_url.into(),
            uploads_url: uploads_url.into(),
        });
        self
    }

    /// Override the canonical lookup prefix. Defaults to the first pair's
    /// uploads URL.
    #[must_use]
    pub fn normalized_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.normalized_prefix = Some(prefix.into());
        self
    }

    /// Path prefix under which the consuming site is served.
    #[must_use]
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Add a header to every acquisition request.
    #[must_use]
    pub fn http_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Add an extension (no dot) to the responsive-encoding set.
    #[must_use]
    pub fn supported_extension(mut self, extension: impl Into<String>) -> Self {
        self.supported_extensions
            .get_or_insert_with(default_extensions)
            .insert(extension.into().to_ascii_lowercase());
        self
    }

    /// Replace the responsive-encoding extension set entirely.
    #[must_use]
    pub fn supported_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_extensions = Some(
            extensions
                .into_iter()
                .map(|e| e.into().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Parse-cache time-to-live in seconds. Zero or negative means cached
    /// parse results never expire.
    #[must_use]
    pub fn cache_ttl_secs(mut self, secs: i64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when no pair was registered or any registered URL is
    /// not an absolute `http(s)` URL.
    pub fn build(self) -> Result<MirrorConfig> {
        if self.sites.is_empty() {
            return Err(anyhow!(
                "at least one (site_url, uploads_url) pair is required"
            ));
        }

        for pair in &self.sites {
            validate_absolute_http(&pair.site_url)?;
            validate_absolute_http(&pair.uploads_url)?;
        }

        let normalized_prefix = self
            .normalized_prefix
            .unwrap_or_else(|| self.sites[0].uploads_url.clone());

        Ok(MirrorConfig {
            sites: self.sites,
            normalized_prefix,
            path_prefix: self.path_prefix,
            http_headers: self.http_headers,
            supported_extensions: self.supported_extensions.unwrap_or_else(default_extensions),
            cache_ttl_secs: self.cache_ttl_secs,
        })
    }
}

fn default_extensions() -> HashSet<String> {
    DEFAULT_SUPPORTED_EXTENSIONS
        .iter()
        .map(|e| (*e).to_string())
        .collect()
}

fn validate_absolute_http(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("invalid URL '{url}': {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("URL '{url}' must use http or https"));
    }
    Ok(())
}
