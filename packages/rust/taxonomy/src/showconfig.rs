//! Main site show-configuration feed (`showconfig.xml`).
//!
//! A `<show isHub="...">` is a section; any other show is a microsite under
//! its `showCategory`. Shows with an empty URL name denote the homepage and
//! are folded into the sentinel record instead of producing an entry.

use reqwest::{Client, StatusCode};
use roxmltree::Node;
use tracing::{debug, info, instrument, trace, warn};

use sitemap_shared::{EntryKind, Result, SitemapError, Source, TaxonomyEntry, normalize_segment};

use crate::category::SECTION_TEMPLATE;
use crate::xml;

/// Location of the feed relative to the main site origin.
const SHOWCONFIG_PATH: &str = "/config/showconfig/showconfig.xml";

/// Fetch and parse the show-config feed from the main site.
#[instrument(skip_all, fields(base = %base))]
pub async fn fetch_showconfig_feed(client: &Client, base: &str) -> Result<Vec<TaxonomyEntry>> {
    let url = format!("{base}{SHOWCONFIG_PATH}");
    info!("processing [showconfig]");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SitemapError::Network(format!("{url}: {e}")))?;

    debug!(%url, status = response.status().as_u16(), "request");

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

    let entries = parse_showconfig(&body)?;
    info!(entries = entries.len(), "showconfig feed parsed");
    Ok(entries)
}

/// Parse a show-config document into taxonomy entries.
///
/// Shows are visited last-to-first so that, for duplicated shows, the one
/// appearing later in the document is observed first by the merge.
pub fn parse_showconfig(body: &str) -> Result<Vec<TaxonomyEntry>> {
    let doc = xml::parse_document(body, "shows")?;
    let shows: Vec<Node<'_, '_>> = xml::children(doc.root_element(), "show").collect();

    let mut entries = Vec::new();
    for show in shows.into_iter().rev() {
        match parse_show(show) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping malformed show"),
        }
    }

    Ok(entries)
}

fn parse_show(show: Node<'_, '_>) -> Result<Option<TaxonomyEntry>> {
    let name = xml::required_text(show, "fullShowName")?;
    let path = xml::child_text(show, "urlFriendlyShowName")
        .map(|p| normalize_segment(&p))
        .unwrap_or_default();

    if path.is_empty() {
        trace!(show = %name, "homepage entry folded into sentinel");
        return Ok(None);
    }

    if show.attribute("isHub").is_some() {
        trace!(section = %path, "section");
        return Ok(Some(TaxonomyEntry {
            name,
            category_key: String::new(),
            url_segment: path,
            section: None,
            template: Some(SECTION_TEMPLATE.into()),
            kind: EntryKind::Section,
            is_hub: true,
            source: Source::ShowConfig,
        }));
    }

    let Some(section) = xml::child_text(show, "showCategory").map(|s| normalize_segment(&s))
    else {
        trace!(show = %path, "microsite without showCategory, skipping");
        return Ok(None);
    };

    let cname = xml::required_text(show, "categoryItemName")?.to_lowercase();
    trace!(cname = %cname, section = %section, "microsite");

    Ok(Some(TaxonomyEntry {
        name,
        category_key: cname,
        url_segment: path,
        section: Some(section),
        template: xml::child_text(show, "templateName").map(|t| t.to_lowercase()),
        kind: EntryKind::Microsite,
        is_hub: false,
        source: Source::ShowConfig,
    }))
}
