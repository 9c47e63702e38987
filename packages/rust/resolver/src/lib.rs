//! Canonical URL resolution for sitemap records.
//!
//! Each record's page is probed with `HEAD`. A 200 triggers a `GET` for
//! title/description metadata and then thumbnail acquisition; 301/302 are
//! followed by an explicit loop with a visited set and a hop budget; any
//! other status yields an error entry with a placeholder thumbnail.
//! Nothing here aborts a run: every failure is folded into the returned
//! [`ResolvedPage`].

mod metadata;

use std::collections::HashSet;

use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use sitemap_shared::http::mainsite_page_client;
use sitemap_shared::{
    CanonicalRecord, PageError, PageMetadata, ResolvedPage, Result, SitemapConfig, SitemapError,
    Thumbnail,
};
use sitemap_thumbnails::{CacheStatus, ImageTools, ThumbnailCache, asset_dir};

pub use metadata::extract_metadata;

/// Where a `HEAD` chain ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Last URL requested.
    pub url: String,
    pub redirected: bool,
    /// Last status received, if any response arrived.
    pub status: Option<u16>,
    /// `None` when the chain ended in a 200.
    pub error: Option<PageError>,
}

/// A resolved page plus what the thumbnail cache did for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub page: ResolvedPage,
    /// `None` when the page failed before or during thumbnail acquisition.
    pub cache: Option<CacheStatus>,
}

/// Resolves records against the main site.
pub struct Resolver {
    client: Client,
    base: String,
    root: Url,
    max_redirects: usize,
}

impl Resolver {
    /// `client` must not follow redirects on its own.
    pub fn new(client: Client, mainsite_base: &str, max_redirects: usize) -> Result<Self> {
        let base = mainsite_base.trim_end_matches('/').to_string();
        let root = Url::parse(&format!("{base}/")).map_err(|e| {
            SitemapError::validation(format!("invalid mainsite origin '{base}': {e}"))
        })?;

        Ok(Self {
            client,
            base,
            root,
            max_redirects,
        })
    }

    pub fn from_config(config: &SitemapConfig) -> Result<Self> {
        Self::new(
            mainsite_page_client(config)?,
            &config.mainsite.base,
            config.max_redirects,
        )
    }

    /// Resolve one record: probe, metadata, thumbnail.
    #[instrument(skip_all, fields(path = %record.path()))]
    pub async fn resolve<T: ImageTools + Sync>(
        &self,
        record: CanonicalRecord,
        thumbnails: &ThumbnailCache<T>,
    ) -> Resolution {
        let start = record.url_on(&self.base);
        let probe = self.probe(&start).await;

        if let Some(error) = probe.error {
            warn!(url = %probe.url, status = ?probe.status, %error, "request failed");
            let page = ResolvedPage::failed(record, probe.url, probe.redirected, probe.status, error);
            return Resolution { page, cache: None };
        }

        let metadata = match self.fetch_metadata(&probe.url).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(url = %probe.url, error = %e, "metadata fetch failed");
                None
            }
        };

        let cache = match thumbnails.ensure(record.key(), &probe.url).await {
            Ok(status) => {
                debug!(?status, "thumbnail ready");
                status
            }
            Err(e) => {
                warn!(url = %probe.url, error = %e, "thumbnail failed");
                let page = ResolvedPage::failed(
                    record,
                    probe.url,
                    probe.redirected,
                    probe.status,
                    PageError::Thumbnail(e.to_string()),
                );
                return Resolution { page, cache: None };
            }
        };

        let thumbnail = Thumbnail::Asset(asset_dir(record.key()));
        let page = ResolvedPage {
            record,
            resolved_url: probe.url,
            redirected: probe.redirected,
            http_status: probe.status,
            metadata,
            thumbnail,
            error: None,
        };
        Resolution {
            page,
            cache: Some(cache),
        }
    }

    /// Follow a `HEAD` chain from `start` until a 200, a failure, a repeated
    /// URL, or the hop budget runs out.
    pub async fn probe(&self, start: &str) -> Probe {
        // Same normalization as redirect targets, so a loop back to the
        // start is recognized on the first hop.
        let mut url = Url::parse(start)
            .map(String::from)
            .unwrap_or_else(|_| start.to_string());
        let mut visited = HashSet::new();
        let mut redirected = false;
        let mut hops = 0usize;
        let mut last_status = None;

        let fail = |url: String, redirected, status, error| Probe {
            url,
            redirected,
            status,
            error: Some(error),
        };

        loop {
            if !visited.insert(url.clone()) {
                return fail(url, redirected, last_status, PageError::RedirectLoop);
            }

            debug!(%url, "request");
            let response = match self.client.head(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    return fail(
                        url,
                        redirected,
                        last_status,
                        PageError::Network(e.to_string()),
                    );
                }
            };

            let status = response.status();
            last_status = Some(status.as_u16());

            match status {
                StatusCode::OK => {
                    return Probe {
                        url,
                        redirected,
                        status: last_status,
                        error: None,
                    };
                }
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
                    let Some(location) = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                    else {
                        return fail(url, redirected, last_status, PageError::Status(status.as_u16()));
                    };

                    if hops >= self.max_redirects {
                        return fail(url, redirected, last_status, PageError::TooManyRedirects);
                    }

                    let next = match self.absolutize(location) {
                        Ok(next) => next,
                        Err(e) => {
                            return fail(url, redirected, last_status, PageError::Network(e.to_string()));
                        }
                    };

                    info!(from = %url, to = %next, "redirect");
                    url = next;
                    redirected = true;
                    hops += 1;
                }
                other => {
                    return fail(url, redirected, last_status, PageError::Status(other.as_u16()));
                }
            }
        }
    }

    /// Absolute `Location` values are used as-is; anything else is a path on
    /// the main site.
    fn absolutize(&self, location: &str) -> Result<String> {
        let lower = location.to_ascii_lowercase();
        let resolved = if lower.starts_with("http:") || lower.starts_with("https:") {
            Url::parse(location)
        } else {
            self.root.join(location.trim_start_matches('/'))
        };

        resolved
            .map(String::from)
            .map_err(|e| SitemapError::validation(format!("bad Location '{location}': {e}")))
    }

    /// `GET` a page and extract its title and description.
    pub async fn fetch_metadata(&self, url: &str) -> Result<PageMetadata> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SitemapError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SitemapError::Network(format!("{url}: failed to read body: {e}")))?;

        Ok(extract_metadata(&body))
    }
}
