//! URL classification and normalization for managed CMS assets.
//!
//! Every candidate URL found in content flows through these rules: first a
//! classification pass decides whether the URL points into a managed uploads
//! area (and absolutizes it when relative), then a normalization pass maps
//! the accepted URL to the canonical form used as an asset-store lookup key.

use std::sync::LazyLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use url::Url;

use crate::config::SitePair;

/// Scheme prefix matcher; comparison is protocol-agnostic so `http://` and
/// `https://` forms of the same URL classify identically.
static PROTOCOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?:").unwrap_or_else(|e| panic!("invalid protocol regex: {e}"))
});

/// Characters that `encode_uri` leaves intact, matching the reserved set of
/// the WHATWG/ECMA URI encoder so keys line up with stores populated by
/// JavaScript tooling.
const ENCODE_URI_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Classification and normalization rules for one pipeline configuration.
///
/// Borrowed from [`crate::config::MirrorConfig`]; construct via
/// [`MirrorConfig::url_rules`](crate::config::MirrorConfig::url_rules).
#[derive(Debug, Clone, Copy)]
pub struct UrlRules<'a> {
    pairs: &'a [SitePair],
    normalized_prefix: &'a str,
}

impl<'a> UrlRules<'a> {
    #[must_use]
    pub fn new(pairs: &'a [SitePair], normalized_prefix: &'a str) -> Self {
        Self {
            pairs,
            normalized_prefix,
        }
    }

    /// Decide whether `url` points into a managed uploads area.
    ///
    /// Returns the absolute form of the URL when accepted (relative URLs are
    /// joined against the matching pair's site root; absolute URLs come back
    /// unchanged), or `None` when no registered pair accepts it. Pairs are
    /// tried in registration order and the first acceptance wins.
    #[must_use]
    pub fn classify(&self, url: &str) -> Option<String> {
        self.pairs
            .iter()
            .find_map(|pair| classify_for_pair(url, &pair.site_url, &pair.uploads_url))
    }

    /// Map an accepted URL to its canonical (unencoded) lookup form: query
    /// string stripped, then the first matching uploads root replaced with
    /// the configured canonical prefix.
    #[must_use]
    pub fn normalize(&self, url: &str) -> String {
        let bare = url.split('?').next().unwrap_or(url);
        for pair in self.pairs {
            if bare.starts_with(pair.uploads_url.as_str()) {
                return bare.replacen(pair.uploads_url.as_str(), self.normalized_prefix, 1);
            }
        }
        bare.to_string()
    }

    /// Canonical percent-encoded store key for an accepted URL.
    #[must_use]
    pub fn canonical_uri(&self, url: &str) -> String {
        encode_uri(&self.normalize(url))
    }

    /// Site root of the first registered pair.
    #[must_use]
    pub fn primary_site_url(&self) -> &str {
        self.pairs
            .first()
            .map(|p| p.site_url.as_str())
            .unwrap_or_default()
    }
}

/// Classify `url` against a single `(site_url, uploads_url)` pair.
///
/// Acceptance is protocol-agnostic for absolute URLs; relative URLs are
/// accepted when they start with the uploads root's path component.
#[must_use]
pub fn classify_for_pair(url: &str, site_url: &str, uploads_url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }

    let relative = is_relative(url);

    let uploads_path = Url::parse(uploads_url).map(|u| u.path().to_string()).ok()?;
    let url_no_proto = strip_protocol(url);
    let uploads_no_proto = strip_protocol(uploads_url);

    let accepted = if relative {
        url.starts_with(uploads_path.as_str())
    } else {
        url_no_proto.starts_with(uploads_no_proto.as_ref())
    };
    if !accepted {
        return None;
    }

    if relative {
        let base = Url::parse(site_url).ok()?;
        Some(base.join(url).ok()?.to_string())
    } else {
        Some(url.to_string())
    }
}

/// Remove a leading `http:`/`https:` scheme for protocol-agnostic
/// comparison.
#[must_use]
pub fn strip_protocol(url: &str) -> std::borrow::Cow<'_, str> {
    PROTOCOL_RE.replace(url, "")
}

/// Whether `url` is relative (has no scheme or authority of its own).
#[must_use]
pub fn is_relative(url: &str) -> bool {
    matches!(
        Url::parse(url),
        Err(url::ParseError::RelativeUrlWithoutBase)
    )
}

/// Percent-encode a URL the way the WHATWG `encodeURI` function does:
/// reserved URI characters and `#` pass through, everything non-alphanumeric
/// outside that set is escaped.
#[must_use]
pub fn encode_uri(url: &str) -> String {
    utf8_percent_encode(url, ENCODE_URI_SET).to_string()
}
