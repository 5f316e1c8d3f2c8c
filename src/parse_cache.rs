//! Memoization of parse results with single-flight coalescing.
//!
//! Concurrent requests for the same cache key share one computation: the
//! first claimant computes while later arrivals wait on a watch channel.
//! Expiry is lazy; a stale entry is replaced the next time its key is
//! requested, and a TTL of zero or below means entries never expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::time::Instant;
use xxhash_rust::xxh3::xxh3_128;

use crate::asset::AssetRecord;

/// Hex digest of content bytes, used as the cache-key fingerprint.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:032x}", xxh3_128(bytes))
}

/// Whether a parse result may be memoized at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentIdentity {
    /// Stable identity of the owning record.
    Key(String),
    /// No stable identity; the parse runs every time and is never stored.
    Uncacheable,
}

/// Identity of one memoized parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: ContentIdentity,
    pub field: String,
    pub type_name: String,
    pub digest: String,
}

impl CacheKey {
    /// Build a key for `content` belonging to `identity` (a record id, or
    /// `None` when the record has no stable identity).
    #[must_use]
    pub fn new(identity: Option<&str>, field: &str, type_name: &str, content: &str) -> Self {
        Self {
            identity: identity.map_or(ContentIdentity::Uncacheable, |id| {
                ContentIdentity::Key(id.to_string())
            }),
            field: field.to_string(),
            type_name: type_name.to_string(),
            digest: content_digest(content.as_bytes()),
        }
    }
}

/// Output of one scan-resolve-rewrite pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    /// The rewritten content.
    pub content: String,
    /// Store records referenced by the content, in first-reference order.
    pub found_assets: Vec<AssetRecord>,
    /// Whether acquisition produced files the store has not indexed yet.
    pub did_download_work: bool,
    pub computed_at: DateTime<Utc>,
}

impl ParseResult {
    /// A result that passes `content` through untouched. Used when parsing
    /// fails or the content is empty.
    #[must_use]
    pub fn passthrough(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            found_assets: Vec::new(),
            did_download_work: false,
            computed_at: Utc::now(),
        }
    }
}

enum Slot {
    /// A computation is running; waiters subscribe here.
    InFlight(watch::Receiver<Option<Arc<ParseResult>>>),
    Ready {
        result: Arc<ParseResult>,
        stored_at: Instant,
    },
}

enum Claim {
    Hit(Arc<ParseResult>),
    Wait(watch::Receiver<Option<Arc<ParseResult>>>),
    Compute(watch::Sender<Option<Arc<ParseResult>>>),
}

/// Concurrent parse-result cache.
pub struct ParseCache {
    slots: DashMap<CacheKey, Slot>,
    ttl: Option<Duration>,
}

impl ParseCache {
    /// `ttl_secs` of zero or below caches results forever.
    #[must_use]
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            slots: DashMap::new(),
            ttl: u64::try_from(ttl_secs)
                .ok()
                .filter(|&s| s > 0)
                .map(Duration::from_secs),
        }
    }

    /// Return the cached result for `key`, or run `compute` to produce it.
    ///
    /// At most one computation runs per key at a time; concurrent callers
    /// receive the same `Arc`. Keys with an uncacheable identity bypass the
    /// cache entirely.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Arc<ParseResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Arc<ParseResult>>,
    {
        if key.identity == ContentIdentity::Uncacheable {
            return compute().await;
        }

        let tx = loop {
            match self.claim(&key) {
                Claim::Hit(result) => return result,
                Claim::Compute(tx) => break tx,
                Claim::Wait(mut rx) => {
                    loop {
                        let ready = rx.borrow().clone();
                        if let Some(result) = ready {
                            return result;
                        }
                        if rx.changed().await.is_err() {
                            // The computing task dropped its sender without
                            // publishing; clear the dead slot and re-claim.
                            self.slots.remove_if(&key, |_, slot| {
                                matches!(slot, Slot::InFlight(rx) if rx.has_changed().is_err())
                            });
                            break;
                        }
                    }
                }
            }
        };

        let result = compute().await;
        self.slots.insert(
            key,
            Slot::Ready {
                result: result.clone(),
                stored_at: Instant::now(),
            },
        );
        let _ = tx.send(Some(result.clone()));
        result
    }

    /// Atomically decide whether this caller hits, waits, or computes.
    fn claim(&self, key: &CacheKey) -> Claim {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let live = match occupied.get() {
                    Slot::Ready { result, stored_at } => {
                        (!self.expired(*stored_at)).then(|| Claim::Hit(result.clone()))
                    }
                    Slot::InFlight(rx) => Some(Claim::Wait(rx.clone())),
                };
                match live {
                    Some(claim) => claim,
                    // Expired entry; this caller recomputes in place.
                    None => {
                        let (tx, rx) = watch::channel(None);
                        occupied.insert(Slot::InFlight(rx));
                        Claim::Compute(tx)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(Slot::InFlight(rx));
                Claim::Compute(tx)
            }
        }
    }

    fn expired(&self, stored_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }

    /// Number of stored entries, in-flight included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
