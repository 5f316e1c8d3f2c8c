//! Asset resolution: mapping scanned references to store records, acquiring
//! files the store does not yet know, and producing the swap map the
//! rewriter consumes.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;
use log::{debug, warn};

use crate::acquisition::NegativeCaches;
use crate::asset::{AssetRecord, ResponsiveImage};
use crate::config::MirrorConfig;
use crate::error::AcquireError;
use crate::parse_cache::content_digest;
use crate::scanner::Reference;
use crate::url_rules::UrlRules;

/// Read-only lookup into the asset store.
pub trait AssetStore: Send + Sync {
    /// Fetch the record stored under `uri`, if any.
    fn get_asset_by_uri(&self, uri: &str) -> impl Future<Output = Option<AssetRecord>> + Send;
}

/// A file fetched by an acquirer, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    /// The URL the file was fetched from.
    pub url: String,
    /// Filename the payload was saved under.
    pub file_name: String,
    /// Lowercased extension, without the dot.
    pub extension: String,
    /// Absolute path of the saved payload.
    pub path: std::path::PathBuf,
}

/// Fetches and post-processes managed files.
pub trait FileAcquirer: Send + Sync {
    /// Download `url` to local storage.
    fn acquire(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> impl Future<Output = Result<AcquiredFile, AcquireError>> + Send;

    /// Encode responsive renditions for an acquired image.
    fn encode_responsive(
        &self,
        file: &AcquiredFile,
    ) -> impl Future<Output = Result<ResponsiveImage, AcquireError>> + Send;

    /// Copy an acquired file to the static-serving area, returning the URL
    /// it will be served from.
    fn copy_to_static(
        &self,
        file: &AcquiredFile,
    ) -> impl Future<Output = Result<String, AcquireError>> + Send;

    /// A smaller rendition of `url` to retry with after a timeout, when one
    /// can be derived. The default knows of none.
    fn alternate_rendition(&self, url: &str) -> impl Future<Output = Option<String>> + Send {
        let _ = url;
        async { None }
    }
}

/// Replacement recorded for one classified URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTarget {
    /// Local URL written into the rewritten markup.
    pub locator: String,
    /// Position in the found-assets list, when the asset is in the store.
    /// Freshly acquired files have no index until a later parse finds them.
    pub index: Option<usize>,
}

/// Classified absolute URL -> replacement.
pub type SwapMap = HashMap<String, SwapTarget>;

/// Outcome of resolving one content body's references.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub swaps: SwapMap,
    /// Store records in first-reference order, deduplicated by record id.
    pub found_assets: Vec<AssetRecord>,
    /// Whether any acquisition produced a new local file. Callers use this
    /// to schedule a follow-up parse once the store catches up.
    pub did_download_work: bool,
}

enum Lookup {
    Hit(AssetRecord),
    Acquired { id: String, locator: String },
    Miss,
}

/// Resolve `references` against the store, optionally acquiring misses.
///
/// References are grouped by canonical URI so each distinct asset is looked
/// up (and fetched) once; lookups fan out concurrently but index assignment
/// runs afterwards in input order, keeping the found-assets list
/// deterministic.
pub async fn resolve<S, A>(
    references: &[Reference],
    rules: &UrlRules<'_>,
    config: &MirrorConfig,
    store: &S,
    acquirer: &A,
    negatives: &NegativeCaches,
    download: bool,
) -> ResolveOutcome
where
    S: AssetStore,
    A: FileAcquirer,
{
    // Group by canonical URI, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Reference>> = HashMap::new();
    for reference in references {
        let canonical = rules.normalize(&reference.resolved_url);
        groups
            .entry(canonical.clone())
            .or_insert_with(|| {
                order.push(canonical);
                Vec::new()
            })
            .push(reference);
    }

    let lookups = join_all(order.iter().map(|canonical| {
        let group = &groups[canonical];
        lookup_one(canonical, group, config, store, acquirer, negatives, download)
    }))
    .await;

    let mut outcome = ResolveOutcome::default();
    let mut assigned: HashMap<String, usize> = HashMap::new();

    for (canonical, lookup) in order.iter().zip(lookups) {
        let target = match lookup {
            Lookup::Hit(record) => {
                let index = match assigned.get(&record.id) {
                    Some(&i) => i,
                    None => {
                        outcome.found_assets.push(record.clone());
                        let i = outcome.found_assets.len() - 1;
                        assigned.insert(record.id.clone(), i);
                        i
                    }
                };
                SwapTarget {
                    locator: record.display_url().to_string(),
                    index: Some(index),
                }
            }
            Lookup::Acquired { id, locator } => {
                debug!("acquired {canonical} as {id}; indexed on next parse");
                outcome.did_download_work = true;
                SwapTarget {
                    locator,
                    index: None,
                }
            }
            Lookup::Miss => continue,
        };
        for reference in &groups[canonical] {
            outcome
                .swaps
                .insert(reference.resolved_url.clone(), target.clone());
        }
    }

    outcome
}

/// Look up one canonical URI in the store, falling back to acquisition.
#[allow(clippy::too_many_arguments)]
async fn lookup_one<S, A>(
    canonical: &str,
    group: &[&Reference],
    config: &MirrorConfig,
    store: &S,
    acquirer: &A,
    negatives: &NegativeCaches,
    download: bool,
) -> Lookup
where
    S: AssetStore,
    A: FileAcquirer,
{
    // Encoded form first; stores populated by older tooling keyed on the
    // raw form.
    let encoded = crate::url_rules::encode_uri(canonical);
    if let Some(record) = store.get_asset_by_uri(&encoded).await {
        return Lookup::Hit(record);
    }
    if let Some(record) = store.get_asset_by_uri(canonical).await {
        return Lookup::Hit(record);
    }

    if !download {
        warn!("did not find {canonical} in asset store");
        return Lookup::Miss;
    }

    let fetch_url = group
        .first()
        .map(|r| r.resolved_url.as_str())
        .unwrap_or(canonical);
    acquire_one(fetch_url, config, acquirer, negatives).await
}

/// Fetch one URL, honoring the negative caches and the retry-once policy
/// for timeouts.
async fn acquire_one<A>(
    url: &str,
    config: &MirrorConfig,
    acquirer: &A,
    negatives: &NegativeCaches,
) -> Lookup
where
    A: FileAcquirer,
{
    if negatives.has_404(url) {
        debug!("skipping {url}: previously returned 404");
        return Lookup::Miss;
    }
    if negatives.timeout_record(url).is_some_and(|r| r.fail_count > 0) {
        debug!("skipping {url}: previously timed out");
        return Lookup::Miss;
    }

    let file = match acquirer.acquire(url, config.http_headers()).await {
        Ok(file) => file,
        Err(AcquireError::Timeout) => {
            // One retry against a smaller rendition, then give up and
            // remember the failure.
            match acquirer.alternate_rendition(url).await {
                Some(alternate) => match acquirer.acquire(&alternate, config.http_headers()).await {
                    Ok(file) => file,
                    Err(e) => {
                        warn!("retry of {url} via {alternate} failed: {e}");
                        negatives.record_timeout(url);
                        return Lookup::Miss;
                    }
                },
                None => {
                    warn!("acquisition of {url} timed out");
                    negatives.record_timeout(url);
                    return Lookup::Miss;
                }
            }
        }
        Err(AcquireError::Http(404)) => {
            warn!("{url} returned 404; will not retry");
            negatives.record_404(url);
            return Lookup::Miss;
        }
        Err(e) => {
            warn!("failed to acquire {url}: {e}");
            return Lookup::Miss;
        }
    };

    let locator = if config.supports_extension(&file.extension) && is_image(&file.extension) {
        match acquirer.encode_responsive(&file).await {
            Ok(image) => image.src,
            Err(e) => {
                warn!("responsive encoding of {url} failed: {e}");
                match acquirer.copy_to_static(&file).await {
                    Ok(locator) => locator,
                    Err(e) => {
                        warn!("static copy of {url} failed: {e}");
                        return Lookup::Miss;
                    }
                }
            }
        }
    } else {
        match acquirer.copy_to_static(&file).await {
            Ok(locator) => locator,
            Err(e) => {
                warn!("static copy of {url} failed: {e}");
                return Lookup::Miss;
            }
        }
    };

    Lookup::Acquired {
        id: content_digest(file.url.as_bytes()),
        locator: prefixed_locator(config, locator),
    }
}

/// Serve acquired files under the site's path prefix, when one is
/// configured.
fn prefixed_locator(config: &MirrorConfig, locator: String) -> String {
    let prefix = config.path_prefix().trim_end_matches('/');
    if prefix.is_empty() || !locator.starts_with('/') {
        locator
    } else {
        format!("{prefix}{locator}")
    }
}

fn is_image(extension: &str) -> bool {
    matches!(extension, "jpg" | "jpeg" | "png" | "gif" | "webp" | "avif")
}
