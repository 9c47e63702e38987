//! Publisher category feed (`listCategoryItems`) and section lookup (`findPage`).
//!
//! Every active category item becomes a microsite under the section its
//! category belongs to. The category-to-section mapping needs one extra
//! request per category name; successful lookups are cached for the session,
//! failed ones are not, so a later item in the same category retries.

use std::collections::{HashMap, HashSet};

use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, trace, warn};

use sitemap_shared::{EntryKind, Result, SitemapError, Source, TaxonomyEntry, normalize_segment};

use crate::xml;

/// Template assigned to every section page.
pub const SECTION_TEMPLATE: &str = "home";

/// A section as described by `findPage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Normalized URL segment.
    pub path: String,
    /// Lower-cased content name.
    pub name: String,
    /// `displayName`, falling back to `name`.
    pub title: String,
}

impl SectionInfo {
    fn to_entry(&self) -> TaxonomyEntry {
        TaxonomyEntry {
            name: self.title.clone(),
            category_key: self.name.clone(),
            url_segment: self.path.clone(),
            section: None,
            template: Some(SECTION_TEMPLATE.into()),
            kind: EntryKind::Section,
            is_hub: false,
            source: Source::Publisher,
        }
    }
}

// ---------------------------------------------------------------------------
// SectionLookup
// ---------------------------------------------------------------------------

/// Session-scoped `findPage` client with a success-only cache.
pub struct SectionLookup {
    client: Client,
    base: String,
    cache: HashMap<String, SectionInfo>,
}

impl SectionLookup {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
            cache: HashMap::new(),
        }
    }

    /// Number of categories resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a category name into its parent section.
    pub async fn resolve(&mut self, category: &str) -> Result<SectionInfo> {
        let key = category.trim().to_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            trace!(category = %key, section = %hit.path, "section lookup cache hit");
            return Ok(hit.clone());
        }

        let info = self.fetch(&key).await?;
        self.cache.insert(key, info.clone());
        Ok(info)
    }

    async fn fetch(&self, category: &str) -> Result<SectionInfo> {
        let url = format!("{}/services/findPage", self.base);
        let response = self
            .client
            .get(&url)
            .query(&[("categoryItem", category)])
            .send()
            .await
            .map_err(|e| SitemapError::Network(format!("{url}: {e}")))?;

        debug!(url = %response.url(), status = response.status().as_u16(), "request");

        if response.status() != StatusCode::OK {
            return Err(SitemapError::Network(format!(
                "{url}?categoryItem={category}: HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SitemapError::Network(format!("{url}: failed to read body: {e}")))?;

        parse_section(&body, category)
    }
}

/// Parse a `findPage` response; the first `categoryItem` wins.
fn parse_section(body: &str, category: &str) -> Result<SectionInfo> {
    let doc = xml::parse_document(body, "Page")?;
    let item = xml::children(doc.root_element(), "categoryItem")
        .next()
        .ok_or_else(|| {
            SitemapError::validation(format!("no section found for category '{category}'"))
        })?;

    let path = normalize_segment(&xml::required_text(item, "path")?);
    if path.is_empty() {
        return Err(SitemapError::validation(format!(
            "section for category '{category}' has an empty path"
        )));
    }

    let name = xml::required_text(item, "name")?;
    let title = xml::child_text(item, "displayName").unwrap_or_else(|| name.clone());

    Ok(SectionInfo {
        path,
        name: name.to_lowercase(),
        title,
    })
}

// ---------------------------------------------------------------------------
// Category feed
// ---------------------------------------------------------------------------

/// A `categoryItem` of the listing, before section resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryItem {
    url_segment: String,
    title: Option<String>,
    cname: String,
    category: String,
    active: bool,
}

fn parse_item(node: roxmltree::Node<'_, '_>) -> Result<CategoryItem> {
    Ok(CategoryItem {
        url_segment: xml::child_text(node, "urlFriendlyShowName")
            .map(|p| normalize_segment(&p))
            .unwrap_or_default(),
        title: xml::child_text(node, "displayName"),
        cname: xml::required_text(node, "categoryItemName")?.to_lowercase(),
        category: xml::required_text(node, "categoryName")?.to_lowercase(),
        active: xml::child_text(node, "isActive").is_some_and(|v| v.eq_ignore_ascii_case("true")),
    })
}

fn parse_items(body: &str) -> Result<Vec<CategoryItem>> {
    let doc = xml::parse_document(body, "CategoryItemList")?;
    let mut items = Vec::new();

    for node in xml::children(doc.root_element(), "categoryItem") {
        match parse_item(node) {
            Ok(item) => items.push(item),
            Err(e) => warn!(error = %e, "skipping malformed category item"),
        }
    }

    Ok(items)
}

/// Fetch the publisher category listing and map it into taxonomy entries.
///
/// Returns one section entry per distinct section plus one microsite entry
/// per active item whose section lookup succeeded. An item without a URL
/// segment contributes only its section. A non-200 listing is an
/// error; a failed per-category lookup only drops that item.
#[instrument(skip_all, fields(base = %lookup.base))]
pub async fn fetch_category_feed(lookup: &mut SectionLookup) -> Result<Vec<TaxonomyEntry>> {
    let url = format!("{}/services/listCategoryItems", lookup.base);
    info!("processing [publisher]");

    let response = lookup
        .client
        .get(&url)
        .query(&[("category", "all")])
        .send()
        .await
        .map_err(|e| SitemapError::Network(format!("{url}: {e}")))?;

    debug!(url = %response.url(), status = response.status().as_u16(), "request");

    if response.status() != StatusCode::OK {
        return Err(SitemapError::Network(format!(
            "{url}: HTTP {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SitemapError::Network(format!("{url}: failed to read body: {e}")))?;

    let items = parse_items(&body)?;
    let mut entries = Vec::new();
    let mut emitted_sections = HashSet::new();

    for item in items {
        if !item.active {
            trace!(cname = %item.cname, "inactive category item, skipping");
            continue;
        }

        let section = match lookup.resolve(&item.category).await {
            Ok(section) => section,
            Err(e) => {
                warn!(category = %item.category, cname = %item.cname, error = %e, "section lookup failed, dropping microsite");
                continue;
            }
        };

        if emitted_sections.insert(section.path.clone()) {
            trace!(section = %section.path, "section");
            entries.push(section.to_entry());
        }

        if item.url_segment.is_empty() {
            trace!(cname = %item.cname, section = %section.path, "item is the section landing page");
            continue;
        }

        trace!(cname = %item.cname, section = %section.path, "microsite");
        entries.push(TaxonomyEntry {
            name: item.title.unwrap_or_else(|| item.cname.clone()),
            category_key: item.cname,
            url_segment: item.url_segment,
            section: Some(section.path),
            template: None,
            kind: EntryKind::Microsite,
            is_hub: false,
            source: Source::Publisher,
        });
    }

    info!(
        entries = entries.len(),
        sections = emitted_sections.len(),
        lookups_cached = lookup.cached(),
        "publisher feed parsed"
    );

    Ok(entries)
}
