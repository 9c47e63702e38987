//! Shared types, error model, and configuration for the sitemap generator.
//!
//! This crate is the foundation depended on by all other sitemap crates.
//! It provides:
//! - [`SitemapError`]: the unified error type
//! - Domain types ([`TaxonomyEntry`], [`CanonicalRecord`], [`ResolvedPage`], [`SitemapEntry`])
//! - Configuration ([`AppConfig`], [`SitemapConfig`], config loading)
//! - [`http`]: the reqwest client builder shared by every HTTP-facing crate

pub mod config;
pub mod error;
pub mod http;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BinaryConfig, Endpoint, EndpointConfig, HttpConfig, PathConfig, SitemapConfig,
    ThumbnailConfig, base_url, config_dir, init_config, load_config_from,
};
pub use error::{Result, SitemapError};
pub use types::{
    CanonicalRecord, EntryKind, ErrorField, PLACEHOLDER_THUMBNAIL, PageError, PageMetadata,
    ResolvedPage, SitemapEntry, Source, TaxonomyEntry, Thumbnail, normalize_segment,
};
