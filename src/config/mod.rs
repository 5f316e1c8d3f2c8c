//! Configuration for the content-mirroring pipeline
//!
//! This module provides the `MirrorConfig` struct and its builder for
//! configuring URL classification, acquisition headers and parse caching
//! with validation and sensible defaults.

// Sub-modules
pub mod builder;
pub mod types;

// Re-exports for public API
pub use builder::MirrorConfigBuilder;
pub use types::{MirrorConfig, SitePair};
