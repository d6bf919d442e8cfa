use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::hubspot::model::{HubSpotPage, PageCollection};
use crate::model::{Page, PageType};

pub mod model;

const HUBSPOT_API_BASE: &str = "https://api.hubapi.com/";
const DEFAULT_PAGE_LIMIT: u32 = 100;

/// The live CMS. Every call carries the caller's bearer token.
#[async_trait]
pub trait HubSpotService: Send + Sync {
    async fn list_pages(&self, token: &str, page_type: PageType) -> Result<Vec<Page>>;

    async fn get_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<Page>;

    /// Partial update of page content; `patch` holds only the changed properties.
    async fn update_page(
        &self,
        token: &str,
        page_type: PageType,
        page_id: &str,
        patch: &Value,
    ) -> Result<()>;

    /// Push the page's draft live.
    async fn publish_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct HubSpotClient {
    http: Client,
    base_url: Url,
    page_limit: u32,
}

impl fmt::Debug for HubSpotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSpotClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HubSpotClient {
    pub fn new() -> Result<Self> {
        let base_url = Url::parse(HUBSPOT_API_BASE)?;
        Self::with_base_url(base_url, DEFAULT_PAGE_LIMIT)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.hubspot.base_url).context("invalid hubspot.base_url")?;
        Self::with_base_url(base_url, cfg.hubspot.page_limit)
    }

    pub fn with_base_url(base_url: Url, page_limit: u32) -> Result<Self> {
        let http = Client::builder()
            .user_agent("smuves-sync/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            page_limit,
        })
    }

    fn pages_url(&self, page_type: PageType, suffix: &str) -> Result<Url> {
        let path = format!("cms/v3/pages/{}{}", page_type.api_path(), suffix);
        self.base_url
            .join(&path)
            .context("invalid HubSpot base URL")
    }

    pub fn build_request(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.build().context("failed to build HubSpot request")
    }

    pub fn build_update_request(
        &self,
        token: &str,
        page_type: PageType,
        page_id: &str,
        patch: &Value,
    ) -> Result<reqwest::Request> {
        let url = self.pages_url(page_type, &format!("/{}", page_id))?;
        self.build_request(Method::PATCH, url, token, Some(patch))
    }

    pub fn build_publish_request(
        &self,
        token: &str,
        page_type: PageType,
        page_id: &str,
    ) -> Result<reqwest::Request> {
        let url = self.pages_url(page_type, &format!("/{}/draft/push-live", page_id))?;
        self.build_request(Method::POST, url, token, None)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method=%request.method(), url=%request.url(), "sending hubspot request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach HubSpot")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by HubSpot: {}", body);
            return Err(anyhow!("received 429 from HubSpot: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "HubSpot API error: {}", body);
            return Err(anyhow!("hubspot error {}: {}", status, body));
        }
        Ok(res)
    }

    pub async fn list_pages(&self, token: &str, page_type: PageType) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut url = self.pages_url(page_type, "")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &self.page_limit.to_string());
                if let Some(cursor) = &after {
                    query.append_pair("after", cursor);
                }
            }
            let request = self.build_request(Method::GET, url, token, None)?;
            let collection: PageCollection = self
                .execute(request)
                .await?
                .json()
                .await
                .context("invalid HubSpot page listing")?;

            pages.extend(
                collection
                    .results
                    .into_iter()
                    .map(|p| p.into_page(page_type)),
            );
            after = collection.paging.and_then(|p| p.next).map(|n| n.after);
            if after.is_none() {
                break;
            }
        }
        debug!(count = pages.len(), page_type = page_type.as_str(), "listed hubspot pages");
        Ok(pages)
    }

    pub async fn get_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<Page> {
        let url = self.pages_url(page_type, &format!("/{}", page_id))?;
        let request = self.build_request(Method::GET, url, token, None)?;
        let page: HubSpotPage = self
            .execute(request)
            .await?
            .json()
            .await
            .context("invalid HubSpot page")?;
        Ok(page.into_page(page_type))
    }

    pub async fn update_page(
        &self,
        token: &str,
        page_type: PageType,
        page_id: &str,
        patch: &Value,
    ) -> Result<()> {
        let request = self.build_update_request(token, page_type, page_id, patch)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn publish_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<()> {
        let request = self.build_publish_request(token, page_type, page_id)?;
        self.execute(request).await?;
        Ok(())
    }
}

#[async_trait]
impl HubSpotService for HubSpotClient {
    async fn list_pages(&self, token: &str, page_type: PageType) -> Result<Vec<Page>> {
        HubSpotClient::list_pages(self, token, page_type).await
    }

    async fn get_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<Page> {
        HubSpotClient::get_page(self, token, page_type, page_id).await
    }

    async fn update_page(
        &self,
        token: &str,
        page_type: PageType,
        page_id: &str,
        patch: &Value,
    ) -> Result<()> {
        HubSpotClient::update_page(self, token, page_type, page_id, patch).await
    }

    async fn publish_page(&self, token: &str, page_type: PageType, page_id: &str) -> Result<()> {
        HubSpotClient::publish_page(self, token, page_type, page_id).await
    }
}
