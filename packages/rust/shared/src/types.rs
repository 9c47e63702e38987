//! Core domain types: taxonomy entries, canonical records, resolved pages,
//! and the manifest entry shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Thumbnail reference used for every entry that could not be rendered.
pub const PLACEHOLDER_THUMBNAIL: &str = "http://placehold.it/300x360.png&text=";

// ---------------------------------------------------------------------------
// Source / kind discriminants
// ---------------------------------------------------------------------------

/// Which feed a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Publisher category service (authoritative).
    Publisher,
    /// Main site show-configuration feed (fills gaps only).
    #[serde(rename = "showconfig")]
    ShowConfig,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => f.write_str("publisher"),
            Self::ShowConfig => f.write_str("showconfig"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Section,
    Microsite,
}

// ---------------------------------------------------------------------------
// TaxonomyEntry
// ---------------------------------------------------------------------------

/// One element of a parsed feed, before merging. Discarded after the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyEntry {
    /// Display title.
    pub name: String,
    /// Lower-cased content name (`categoryItemName` / section `name`).
    pub category_key: String,
    /// Lower-cased URL segment of this page.
    pub url_segment: String,
    /// Owning section segment; set for microsites only.
    pub section: Option<String>,
    pub template: Option<String>,
    pub kind: EntryKind,
    pub is_hub: bool,
    pub source: Source,
}

/// Normalize a URL path segment for use as a map key.
///
/// Whitespace and surrounding slashes are stripped and the result is
/// lower-cased; an empty result denotes the homepage.
pub fn normalize_segment(raw: &str) -> String {
    raw.trim().trim_matches('/').trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// The deduplicated, merged representation of a navigable page.
///
/// `(section_url, microsite_url)` is unique across a merged set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub title: String,
    pub content_name: String,
    pub template: Option<String>,
    pub section_url: String,
    pub microsite_url: String,
    /// `None` only for the homepage sentinel.
    pub source: Option<Source>,
}

impl CanonicalRecord {
    /// The sentinel record present in every run.
    pub fn homepage() -> Self {
        Self {
            title: "Homepage".into(),
            content_name: String::new(),
            template: None,
            section_url: String::new(),
            microsite_url: String::new(),
            source: None,
        }
    }

    pub fn is_homepage(&self) -> bool {
        self.section_url.is_empty() && self.microsite_url.is_empty()
    }

    /// Dedup identity and sort key.
    pub fn key(&self) -> (&str, &str) {
        (&self.section_url, &self.microsite_url)
    }

    /// Relative URL path (`section/microsite`, no trailing slash).
    pub fn path(&self) -> String {
        format!("{}/{}", self.section_url, self.microsite_url)
            .trim_matches('/')
            .to_string()
    }

    /// Absolute page URL on the given origin, trailing slash stripped.
    pub fn url_on(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.path())
            .trim_end_matches('/')
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// ResolvedPage
// ---------------------------------------------------------------------------

/// Metadata scraped from a page body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Why a single record degraded to an error entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Final HTTP status was neither 200 nor a followable redirect.
    Status(u16),
    /// A redirect pointed back to a URL already visited.
    RedirectLoop,
    /// The hop budget ran out before reaching a 200.
    TooManyRedirects,
    /// The request itself failed (connect, timeout, bad Location).
    Network(String),
    /// The page resolved but its thumbnail could not be produced.
    Thumbnail(String),
}

impl PageError {
    /// Value written to the manifest's `error` field.
    pub fn code(&self) -> ErrorField {
        match self {
            Self::Status(status) => ErrorField::Status(*status),
            Self::RedirectLoop => ErrorField::Kind("redirect_loop".into()),
            Self::TooManyRedirects => ErrorField::Kind("too_many_redirects".into()),
            Self::Network(_) => ErrorField::Kind("network".into()),
            Self::Thumbnail(_) => ErrorField::Kind("thumbnail".into()),
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::RedirectLoop => f.write_str("redirect loop"),
            Self::TooManyRedirects => f.write_str("too many redirects"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Thumbnail(msg) => write!(f, "thumbnail: {msg}"),
        }
    }
}

/// Where a page's thumbnail lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    /// Asset directory relative to the assets root.
    Asset(String),
    Placeholder,
}

impl Thumbnail {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Asset(dir) => dir,
            Self::Placeholder => PLACEHOLDER_THUMBNAIL,
        }
    }
}

/// A canonical record after URL resolution and thumbnail acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    pub record: CanonicalRecord,
    /// Last URL requested (the redirect destination, if any).
    pub resolved_url: String,
    pub redirected: bool,
    /// Last HTTP status observed, if a response was received at all.
    pub http_status: Option<u16>,
    pub metadata: Option<PageMetadata>,
    pub thumbnail: Thumbnail,
    pub error: Option<PageError>,
}

impl ResolvedPage {
    /// Build an error entry: no metadata, placeholder thumbnail.
    pub fn failed(
        record: CanonicalRecord,
        resolved_url: String,
        redirected: bool,
        http_status: Option<u16>,
        error: PageError,
    ) -> Self {
        Self {
            record,
            resolved_url,
            redirected,
            http_status,
            metadata: None,
            thumbnail: Thumbnail::Placeholder,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// SitemapEntry (manifest output)
// ---------------------------------------------------------------------------

/// The manifest's `error` field: `false`, an HTTP status, or an error kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Flag(bool),
    Status(u16),
    Kind(String),
}

/// A single entry of `sitemap.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub title: String,
    pub metadata: Option<PageMetadata>,
    pub template: Option<String>,
    pub cname: String,
    pub section: String,
    /// Asset directory relative to the assets root, or the placeholder URL.
    pub images: String,
    /// Relative path of the page.
    pub url: String,
    /// Final URL requested.
    pub destination: String,
    pub source: Option<Source>,
    pub redir: bool,
    pub error: ErrorField,
}

impl From<&ResolvedPage> for SitemapEntry {
    fn from(page: &ResolvedPage) -> Self {
        let record = &page.record;
        Self {
            title: record.title.clone(),
            metadata: page.metadata.clone(),
            // Error entries carry no template.
            template: if page.is_error() {
                None
            } else {
                record.template.clone()
            },
            cname: record.content_name.clone(),
            section: record.section_url.clone(),
            images: page.thumbnail.as_str().to_string(),
            url: record.path(),
            destination: page.resolved_url.clone(),
            source: record.source,
            redir: page.redirected,
            error: page
                .error
                .as_ref()
                .map_or(ErrorField::Flag(false), PageError::code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn microsite() -> CanonicalRecord {
        CanonicalRecord {
            title: "La Voz".into(),
            content_name: "lavoz".into(),
            template: Some("show".into()),
            section_url: "shows".into(),
            microsite_url: "la-voz".into(),
            source: Some(Source::Publisher),
        }
    }

    #[test]
    fn normalize_segment_strips_and_lowercases() {
        assert_eq!(normalize_segment("  /News/ "), "news");
        assert_eq!(normalize_segment("   "), "");
        assert_eq!(normalize_segment("/"), "");
    }

    #[test]
    fn record_paths_and_urls() {
        let home = CanonicalRecord::homepage();
        assert!(home.is_homepage());
        assert_eq!(home.path(), "");
        assert_eq!(home.url_on("http://www.example.com"), "http://www.example.com");

        let mut section = microsite();
        section.microsite_url.clear();
        assert_eq!(section.path(), "shows");
        assert_eq!(
            section.url_on("http://www.example.com/"),
            "http://www.example.com/shows"
        );

        assert_eq!(microsite().path(), "shows/la-voz");
    }

    #[test]
    fn successful_entry_serialization() {
        let page = ResolvedPage {
            record: microsite(),
            resolved_url: "http://www.example.com/shows/la-voz".into(),
            redirected: false,
            http_status: Some(200),
            metadata: Some(PageMetadata {
                title: Some("La Voz | Example".into()),
                description: None,
            }),
            thumbnail: Thumbnail::Asset("shows/la-voz".into()),
            error: None,
        };

        let value = serde_json::to_value(SitemapEntry::from(&page)).expect("serialize");
        assert_eq!(value["error"], serde_json::json!(false));
        assert_eq!(value["source"], "publisher");
        assert_eq!(value["images"], "shows/la-voz");
        assert_eq!(value["template"], "show");
        assert_eq!(value["metadata"]["title"], "La Voz | Example");
    }

    #[test]
    fn error_entry_serialization() {
        let page = ResolvedPage::failed(
            microsite(),
            "http://www.example.com/shows/la-voz".into(),
            true,
            Some(404),
            PageError::Status(404),
        );

        let entry = SitemapEntry::from(&page);
        assert_eq!(entry.images, PLACEHOLDER_THUMBNAIL);
        assert!(entry.template.is_none());
        assert!(entry.metadata.is_none());

        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["error"], serde_json::json!(404));
        assert_eq!(value["redir"], serde_json::json!(true));
        assert!(value["metadata"].is_null());
    }

    #[test]
    fn non_status_errors_serialize_as_kinds() {
        assert_eq!(
            serde_json::to_value(PageError::RedirectLoop.code()).unwrap(),
            serde_json::json!("redirect_loop")
        );
        let parsed: ErrorField = serde_json::from_str("302").unwrap();
        assert_eq!(parsed, ErrorField::Status(302));
    }

    #[test]
    fn homepage_source_is_null() {
        let page = ResolvedPage {
            record: CanonicalRecord::homepage(),
            resolved_url: "http://www.example.com".into(),
            redirected: false,
            http_status: Some(200),
            metadata: None,
            thumbnail: Thumbnail::Asset(String::new()),
            error: None,
        };
        let value = serde_json::to_value(SitemapEntry::from(&page)).unwrap();
        assert!(value["source"].is_null());
        assert_eq!(value["title"], "Homepage");
    }
}
