//! HTTP client construction.

use std::time::Duration;

use reqwest::{Client, Proxy, redirect};

use crate::config::{Endpoint, SitemapConfig};
use crate::error::{Result, SitemapError};

/// Redirect budget for feed requests. Page requests never auto-follow.
const FEED_MAX_REDIRECTS: usize = 5;

/// How a client treats 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// Follow a small number of hops transparently (feeds).
    Follow,
    /// Surface every 3xx to the caller (page resolution).
    Manual,
}

/// Build a reqwest client for one endpoint.
pub fn build_client(
    endpoint: &Endpoint,
    user_agent: &str,
    timeout: Duration,
    mode: RedirectMode,
) -> Result<Client> {
    let policy = match mode {
        RedirectMode::Follow => redirect::Policy::limited(FEED_MAX_REDIRECTS),
        RedirectMode::Manual => redirect::Policy::none(),
    };

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .redirect(policy)
        .timeout(timeout);

    if let Some(proxy) = &endpoint.proxy {
        let proxy = Proxy::all(proxy.as_str()).map_err(|e| {
            SitemapError::config(format!("invalid proxy '{proxy}': {e}"))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SitemapError::Network(format!("failed to build HTTP client: {e}")))
}

/// Client for the publisher category service.
pub fn publisher_client(config: &SitemapConfig) -> Result<Client> {
    build_client(
        &config.publisher,
        &config.user_agent,
        config.request_timeout,
        RedirectMode::Follow,
    )
}

/// Client for the main site's show-config feed.
pub fn mainsite_feed_client(config: &SitemapConfig) -> Result<Client> {
    build_client(
        &config.mainsite,
        &config.user_agent,
        config.request_timeout,
        RedirectMode::Follow,
    )
}

/// Client for probing main site pages; redirects are handled by the caller.
pub fn mainsite_page_client(config: &SitemapConfig) -> Result<Client> {
    build_client(
        &config.mainsite,
        &config.user_agent,
        config.request_timeout,
        RedirectMode::Manual,
    )
}
