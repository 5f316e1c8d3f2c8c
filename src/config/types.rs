//! Core configuration types for the mirroring pipeline.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::url_rules::UrlRules;

/// One (site root, uploads root) pair the classifier accepts.
///
/// Multi-environment deployments (e.g. a staging host and a production host
/// serving the same assets) register several pairs; the first pair that
/// accepts a URL wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePair {
    /// Absolute URL of the CMS site root, e.g. `https://server.com/`.
    pub site_url: String,
    /// Absolute URL of the managed uploads area, e.g.
    /// `https://server.com/wp-content/uploads/`.
    pub uploads_url: String,
}

/// Main configuration struct for the content-mirroring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Ordered classifier pairs.
    ///
    /// **INVARIANT:** Non-empty; every URL is absolute with an `http(s)`
    /// scheme (validated in the builder).
    pub(crate) sites: Vec<SitePair>,
    /// Canonical placeholder prefix substituted for a matched uploads root
    /// when building asset-store lookup keys. Defaults to the first pair's
    /// uploads URL.
    pub(crate) normalized_prefix: String,
    /// Path prefix under which the consuming site is served, e.g. `/blog`.
    pub(crate) path_prefix: String,
    /// Extra headers sent with acquisition requests.
    pub(crate) http_headers: HashMap<String, String>,
    /// File extensions (lowercase, no dot) that get responsive encoding;
    /// everything else is copied to a static-serving location.
    pub(crate) supported_extensions: HashSet<String>,
    /// Parse-cache time-to-live in seconds. Zero or negative means cache
    /// forever.
    pub(crate) cache_ttl_secs: i64,
}

impl MirrorConfig {
    /// URL classification rules derived from this configuration.
    #[must_use]
    pub fn url_rules(&self) -> UrlRules<'_> {
        UrlRules::new(&self.sites, &self.normalized_prefix)
    }

    #[must_use]
    pub fn sites(&self) -> &[SitePair] {
        &self.sites
    }

    #[must_use]
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    #[must_use]
    pub fn http_headers(&self) -> &HashMap<String, String> {
        &self.http_headers
    }

    /// Whether files with this extension get the responsive-image treatment.
    #[must_use]
    pub fn supports_extension(&self, extension: &str) -> bool {
        self.supported_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    #[must_use]
    pub fn cache_ttl_secs(&self) -> i64 {
        self.cache_ttl_secs
    }
}
