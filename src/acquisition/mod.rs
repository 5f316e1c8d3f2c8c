//! Asset acquisition: fetching managed files over HTTP and remembering
//! failures so broken URLs are not retried on every parse.

pub mod http;
pub mod negative_cache;

pub use http::HttpAcquirer;
pub use negative_cache::{NegativeCaches, TimeoutRecord};
