//! Taxonomy feeds and the merge engine.
//!
//! This crate provides:
//! - [`category`]: the publisher category feed and the per-category section lookup
//! - [`showconfig`]: the main site's show-configuration feed
//! - [`merge`]: reconciliation of both feeds into one deduplicated record set

pub mod category;
pub mod merge;
pub mod showconfig;
mod xml;

pub use category::{SectionInfo, SectionLookup, fetch_category_feed};
pub use merge::{Merger, merge};
pub use showconfig::fetch_showconfig_feed;
