//! Rewrites CMS-sourced HTML so media references point to locally mirrored
//! assets, with memoized parsing and render-time substitution.
//!
//! Content flows through four phases:
//!
//! 1. **Scan** ([`scanner`]): parse the HTML, collect references the URL
//!    rules accept and apply structural fix-ups.
//! 2. **Resolve** ([`resolver`]): look each reference up in the asset
//!    store, acquiring files the store does not know yet.
//! 3. **Rewrite** ([`rewriter`]): stream the markup back out with local
//!    locators and transient index attributes.
//! 4. **Substitute** ([`substitute`]): at render time, turn the rewritten
//!    markup plus its found-assets list into typed render nodes.
//!
//! [`ContentPipeline`] ties the phases together and memoizes whole parses
//! through [`parse_cache::ParseCache`], coalescing concurrent parses of the
//! same content.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cms_media_mirror::{ContentPipeline, HttpAcquirer, MirrorConfig};
//! # use cms_media_mirror::{AssetRecord, AssetStore};
//! # struct MyStore;
//! # impl AssetStore for MyStore {
//! #     async fn get_asset_by_uri(&self, _uri: &str) -> Option<AssetRecord> { None }
//! # }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = MirrorConfig::builder()
//!     .site("https://server.com/", "https://server.com/wp-content/uploads/")
//!     .cache_ttl_secs(3600)
//!     .build()?;
//! let acquirer = HttpAcquirer::new(".cache/media", "public/static", "/static")?;
//! let pipeline = ContentPipeline::new(config, Arc::new(MyStore), Arc::new(acquirer));
//!
//! let parsed = pipeline
//!     .parse_cached(Some("post-17"), "content", "Post", "<p>...</p>", true)
//!     .await;
//! let nodes = pipeline.substitute(&parsed)?;
//! # let _ = nodes;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod asset;
pub mod config;
pub mod error;
pub mod parse_cache;
pub mod pipeline;
pub mod resolver;
pub mod rewriter;
pub mod scanner;
pub mod substitute;
pub mod url_rules;

pub use acquisition::{HttpAcquirer, NegativeCaches};
pub use asset::{AssetPayload, AssetRecord, ResponsiveImage};
pub use config::{MirrorConfig, MirrorConfigBuilder, SitePair};
pub use error::{AcquireError, SubstituteError};
pub use parse_cache::{CacheKey, ContentIdentity, ParseCache, ParseResult};
pub use pipeline::ContentPipeline;
pub use resolver::{AcquiredFile, AssetStore, FileAcquirer, SwapMap, SwapTarget};
pub use substitute::{RenderNode, SubstituteOptions};
pub use url_rules::UrlRules;
