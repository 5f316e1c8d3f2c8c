//! End-to-end orchestration: scan, resolve, rewrite, memoize.
//!
//! The pipeline is the failure boundary for ingestion. Whatever goes wrong
//! while parsing one content body, the caller gets a usable result back;
//! the worst case is the original content with no swaps applied.

use std::sync::Arc;

use chrono::Utc;
use log::error;

use crate::acquisition::NegativeCaches;
use crate::config::MirrorConfig;
use crate::error::SubstituteError;
use crate::parse_cache::{CacheKey, ParseCache, ParseResult};
use crate::resolver::{self, AssetStore, FileAcquirer};
use crate::rewriter;
use crate::scanner;
use crate::substitute::{self, RenderNode, SubstituteOptions};

/// The content-mirroring pipeline for one configured deployment.
///
/// Cheap to share behind an `Arc`; all interior state is concurrent.
pub struct ContentPipeline<S, A> {
    config: MirrorConfig,
    store: Arc<S>,
    acquirer: Arc<A>,
    negatives: Arc<NegativeCaches>,
    cache: ParseCache,
}

impl<S, A> ContentPipeline<S, A>
where
    S: AssetStore,
    A: FileAcquirer,
{
    #[must_use]
    pub fn new(config: MirrorConfig, store: Arc<S>, acquirer: Arc<A>) -> Self {
        let cache = ParseCache::new(config.cache_ttl_secs());
        Self {
            config,
            store,
            acquirer,
            negatives: Arc::new(NegativeCaches::new()),
            cache,
        }
    }

    #[must_use]
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Failure memory shared across parses, exposed for inspection.
    #[must_use]
    pub fn negatives(&self) -> &NegativeCaches {
        &self.negatives
    }

    /// Parse one content body: scan references, resolve them against the
    /// store (acquiring misses when `download` is set) and rewrite the
    /// markup.
    ///
    /// Never fails: empty content and parse errors both degrade to a
    /// passthrough result carrying the original content.
    pub async fn scan_and_rewrite(&self, content: &str, download: bool) -> ParseResult {
        if content.trim().is_empty() {
            return ParseResult::passthrough(content);
        }
        match self.try_scan_and_rewrite(content, download).await {
            Ok(result) => result,
            Err(e) => {
                error!("content parse failed, passing original through: {e:#}");
                ParseResult::passthrough(content)
            }
        }
    }

    async fn try_scan_and_rewrite(
        &self,
        content: &str,
        download: bool,
    ) -> anyhow::Result<ParseResult> {
        let rules = self.config.url_rules();
        let scanned = scanner::scan(content, &rules)?;
        let resolved = resolver::resolve(
            &scanned.references,
            &rules,
            &self.config,
            self.store.as_ref(),
            self.acquirer.as_ref(),
            &self.negatives,
            download,
        )
        .await;
        let content = rewriter::rewrite(&scanned.content, &rules, &resolved.swaps)?;
        Ok(ParseResult {
            content,
            found_assets: resolved.found_assets,
            did_download_work: resolved.did_download_work,
            computed_at: Utc::now(),
        })
    }

    /// Like [`scan_and_rewrite`](Self::scan_and_rewrite), memoized under
    /// `(identity, field, type_name, digest)`. Concurrent calls for the
    /// same key share one parse; `identity: None` bypasses the cache.
    pub async fn parse_cached(
        &self,
        identity: Option<&str>,
        field: &str,
        type_name: &str,
        content: &str,
        download: bool,
    ) -> Arc<ParseResult> {
        let key = CacheKey::new(identity, field, type_name, content);
        self.cache
            .get_or_compute(key, || async {
                Arc::new(self.scan_and_rewrite(content, download).await)
            })
            .await
    }

    /// Substitute a parse result into typed render nodes, using the first
    /// configured site pair as the internal-link context.
    pub fn substitute(&self, result: &ParseResult) -> Result<Vec<RenderNode>, SubstituteError> {
        let pair = self
            .config
            .sites()
            .first()
            .ok_or_else(|| SubstituteError::Markup("no site pair configured".into()))?;
        substitute::substitute(
            &result.content,
            &result.found_assets,
            &SubstituteOptions {
                site_url: pair.site_url.clone(),
                uploads_url: pair.uploads_url.clone(),
            },
        )
    }
}
