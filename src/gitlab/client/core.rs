use indexmap::IndexMap;
use log::{debug, error, info, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::config::GitLabSettings;
use crate::error::{GitLabError, Result};
use crate::gitlab::types::VersionInfo;

/// Largest page size GitLab accepts.
pub const MAX_PER_PAGE: usize = 100;
const DEFAULT_MAX_PAGES: usize = 100;
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Ordered query parameters, so request URLs are deterministic.
pub type QueryParams = IndexMap<String, String>;

/// Bounds for one paginated fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    per_page: usize,
    max_pages: usize,
}

impl PageRequest {
    /// `per_page` is clamped to `1..=MAX_PER_PAGE` instead of being rejected.
    pub fn new(per_page: usize, max_pages: usize) -> Self {
        Self {
            per_page: per_page.clamp(1, MAX_PER_PAGE),
            max_pages,
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Upper bound on the number of items one fetch can accumulate.
    pub fn item_cap(&self) -> usize {
        self.per_page.saturating_mul(self.max_pages)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(MAX_PER_PAGE, DEFAULT_MAX_PAGES)
    }
}

/// Items accumulated by [`GitLabClient::get_paginated`].
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub pages_fetched: usize,
    /// The page cap stopped the walk while the server still advertised more.
    pub capped: bool,
}

impl<T> PageResult<T> {
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Authenticated GitLab REST client.
///
/// Cloning is cheap and shares the underlying connection pool; the client
/// carries no per-call state.
#[derive(Clone)]
pub struct GitLabClient {
    client: Client,
    base_url: String,
    api_url: Url,
    token: Token,
}

impl GitLabClient {
    /// Build a client without touching the network.
    pub fn new(settings: &GitLabSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gitlab-context/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GitLabError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let api_url = Url::parse(&format!("{base_url}/api/v4/"))
            .map_err(|e| GitLabError::Configuration(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_url,
            token: settings.token.clone(),
        })
    }

    /// Build a client and, when the settings ask for it, probe connectivity.
    pub async fn connect(settings: &GitLabSettings) -> Result<Self> {
        let client = Self::new(settings)?;
        if settings.validate {
            client.probe().await?;
        } else {
            info!("GitLab client initialized for {} (validation skipped)", client.base_url);
        }
        Ok(client)
    }

    /// One lightweight request against `/version`.
    ///
    /// A 401 is reported as [`GitLabError::Authentication`] so callers can
    /// tell a bad token apart from an unreachable instance.
    pub async fn probe(&self) -> Result<VersionInfo> {
        match self.get::<VersionInfo>("version", &QueryParams::new()).await {
            Ok(version) => {
                info!("Connected to GitLab {} at {}", version.version, self.base_url);
                Ok(version)
            }
            Err(GitLabError::Authentication(_)) => {
                error!("GitLab authentication failed - check your token");
                Err(GitLabError::Authentication(
                    "invalid token - authentication failed".to_string(),
                ))
            }
            Err(GitLabError::Connection(e)) => {
                error!("Failed to connect to GitLab at {}: {e}", self.base_url);
                Err(GitLabError::Connection(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Configured instance URL, e.g. `https://gitlab.com`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(self.token.as_str())
    }

    /// Resolve `endpoint` under `/api/v4`. Absolute URLs and `..` segments
    /// that leave the API root are rejected so the token never goes elsewhere.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let url = self
            .api_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| GitLabError::Configuration(format!("Invalid endpoint '{endpoint}': {e}")))?;

        if !url.as_str().starts_with(self.api_url.as_str()) {
            return Err(GitLabError::Configuration(format!(
                "Endpoint '{endpoint}' is outside {}",
                self.api_url
            )));
        }
        Ok(url)
    }

    /// Send a GET and translate non-success statuses into typed errors.
    async fn send(&self, endpoint: &str, params: &QueryParams) -> Result<Response> {
        let url = self.endpoint_url(endpoint)?;
        debug!("GET {endpoint} with params={params:?}");

        let response = self
            .auth_request(self.client.get(url).query(params))
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {endpoint}: {e}");
                GitLabError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            error!(
                "GitLab API error for GET {endpoint}: {status} - {}",
                body.chars().take(200).collect::<String>()
            );
            return Err(GitLabError::from_status(status, endpoint, &body));
        }

        Ok(response)
    }

    /// GET an endpoint relative to `/api/v4` and parse the JSON body.
    pub async fn get<T>(&self, endpoint: &str, params: &QueryParams) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self.send(endpoint, params).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET a plain-text endpoint such as a job trace.
    pub async fn get_text(&self, endpoint: &str) -> Result<String> {
        Ok(self.send(endpoint, &QueryParams::new()).await?.text().await?)
    }

    /// Walk successive pages of a list endpoint.
    ///
    /// Stops on an empty page, when the server stops sending `x-next-page`,
    /// or after `page.max_pages()` requests. Hitting the cap is not an error:
    /// the partial result comes back with `capped` set.
    pub async fn get_paginated<T>(
        &self,
        endpoint: &str,
        params: &QueryParams,
        page: PageRequest,
    ) -> Result<PageResult<T>>
    where
        T: DeserializeOwned,
    {
        let mut params = params.clone();
        params.insert("per_page".to_string(), page.per_page().to_string());

        let mut items = Vec::new();
        let mut pages_fetched = 0;
        let mut current_page = 1usize;
        let mut more_available = false;

        while pages_fetched < page.max_pages() {
            params.insert("page".to_string(), current_page.to_string());
            debug!(
                "GET {endpoint} page {current_page} (per_page={})",
                page.per_page()
            );

            let response = self.send(endpoint, &params).await?;
            let has_next = has_next_page(response.headers());
            let mut batch: Vec<T> = serde_json::from_str(&response.text().await?)?;

            if batch.is_empty() {
                more_available = false;
                break;
            }

            let room = page.per_page().min(page.item_cap() - items.len());
            if batch.len() > room {
                warn!(
                    "{endpoint} returned {} items for per_page={}, keeping {room}",
                    batch.len(),
                    page.per_page()
                );
                batch.truncate(room);
            }
            items.extend(batch);
            pages_fetched += 1;
            more_available = has_next;

            if !has_next {
                break;
            }
            current_page += 1;
        }

        let capped = more_available && pages_fetched >= page.max_pages();
        if capped {
            warn!(
                "Hit max_pages limit ({}) for {endpoint}. Results may be incomplete.",
                page.max_pages()
            );
        }
        debug!(
            "Fetched {} results from {pages_fetched} pages for {endpoint}",
            items.len()
        );

        Ok(PageResult {
            items,
            pages_fetched,
            capped,
        })
    }
}

fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get(NEXT_PAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty())
}
