use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::sheets::model::{CreateSpreadsheetResponse, CreatedSpreadsheet, ValueRange};

pub mod model;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/";

/// The spreadsheet side of the mirror. Every call carries the caller's OAuth token.
#[async_trait]
pub trait SheetsService: Send + Sync {
    /// All values of a range (a bare tab name reads the whole tab).
    async fn read_values(&self, token: &str, spreadsheet_id: &str, range: &str)
        -> Result<Vec<Vec<String>>>;

    async fn add_tab(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<()>;

    /// Overwrite cells starting at the top-left of `range`.
    async fn write_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<()>;

    /// Create a new document with a single tab named `tab_title`.
    async fn create_spreadsheet(
        &self,
        token: &str,
        title: &str,
        tab_title: &str,
    ) -> Result<CreatedSpreadsheet>;
}

/// Quote a tab name for A1 notation: `My Tab` -> `'My Tab'`.
pub fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// Range addressing a tab from its top-left cell.
pub fn tab_origin(tab: &str) -> String {
    format!("{}!A1", quote_tab(tab))
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(Url::parse(SHEETS_API_BASE)?)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url =
            Url::parse(&cfg.google.sheets_base_url).context("invalid google.sheets_base_url")?;
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("smuves-sync/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    /// `v4/spreadsheets/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self
            .base_url
            .join("v4/spreadsheets")
            .context("invalid Sheets base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets base URL cannot have path segments"))?
            .extend(segments);
        Ok(url)
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
            .header("Authorization", format!("Bearer {}", token));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.build().context("failed to build Sheets request")
    }

    pub fn build_write_request(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<reqwest::Request> {
        let mut url = self.endpoint(&[spreadsheet_id, "values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.build_request(Method::PUT, url, token, Some(&body))
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method=%request.method(), url=%request.url(), "sending sheets request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Google Sheets")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Google Sheets: {}", body);
            return Err(anyhow!("received 429 from Google Sheets: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Google Sheets API error: {}", body);
            return Err(anyhow!("sheets error {}: {}", status, body));
        }
        Ok(res)
    }

    pub async fn read_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>> {
        let url = self.endpoint(&[spreadsheet_id, "values", range])?;
        let request = self.build_request(Method::GET, url, token, None)?;
        let values: ValueRange = self
            .execute(request)
            .await?
            .json()
            .await
            .context("invalid Sheets value range")?;
        Ok(values.into_strings())
    }

    pub async fn add_tab(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<()> {
        let url = self.endpoint(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        let body = json!({
            "requests": [
                { "addSheet": { "properties": { "title": title } } }
            ]
        });
        let request = self.build_request(Method::POST, url, token, Some(&body))?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn write_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<()> {
        let request = self.build_write_request(token, spreadsheet_id, range, rows)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn create_spreadsheet(
        &self,
        token: &str,
        title: &str,
        tab_title: &str,
    ) -> Result<CreatedSpreadsheet> {
        let url = self.endpoint(&[])?;
        let body = json!({
            "properties": { "title": title },
            "sheets": [ { "properties": { "title": tab_title } } ]
        });
        let request = self.build_request(Method::POST, url, token, Some(&body))?;
        let created: CreateSpreadsheetResponse = self
            .execute(request)
            .await?
            .json()
            .await
            .context("invalid Sheets create response")?;
        let spreadsheet_url = created.spreadsheet_url.unwrap_or_else(|| {
            format!(
                "https://docs.google.com/spreadsheets/d/{}/edit",
                created.spreadsheet_id
            )
        });
        Ok(CreatedSpreadsheet {
            spreadsheet_id: created.spreadsheet_id,
            spreadsheet_url,
        })
    }
}

#[async_trait]
impl SheetsService for SheetsClient {
    async fn read_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>> {
        SheetsClient::read_values(self, token, spreadsheet_id, range).await
    }

    async fn add_tab(&self, token: &str, spreadsheet_id: &str, title: &str) -> Result<()> {
        SheetsClient::add_tab(self, token, spreadsheet_id, title).await
    }

    async fn write_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<()> {
        SheetsClient::write_values(self, token, spreadsheet_id, range, rows).await
    }

    async fn create_spreadsheet(
        &self,
        token: &str,
        title: &str,
        tab_title: &str,
    ) -> Result<CreatedSpreadsheet> {
        SheetsClient::create_spreadsheet(self, token, title, tab_title).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::model::ValueRange;

    #[test]
    fn quote_tab_escapes_single_quotes() {
        assert_eq!(quote_tab("Backup 1"), "'Backup 1'");
        assert_eq!(quote_tab("Bob's pages"), "'Bob''s pages'");
        assert_eq!(tab_origin("Sheet1"), "'Sheet1'!A1");
    }

    #[test]
    fn build_write_request_encodes_range() {
        let client = SheetsClient::new().unwrap();
        let rows = vec![vec!["ID".to_string(), "Name".to_string()]];
        let request = client
            .build_write_request("tok", "sheet-1", &tab_origin("My Tab"), &rows)
            .unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(
            request.url().path(),
            "/v4/spreadsheets/sheet-1/values/'My%20Tab'!A1"
        );
        assert_eq!(request.url().query(), Some("valueInputOption=RAW"));
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn value_range_renders_non_string_cells() {
        let range: ValueRange = serde_json::from_value(json!({
            "range": "Sheet1!A1:C2",
            "values": [["ID", "Name"], [42, null, true]]
        }))
        .unwrap();
        assert_eq!(
            range.into_strings(),
            vec![
                vec!["ID".to_string(), "Name".to_string()],
                vec!["42".to_string(), String::new(), "true".to_string()],
            ]
        );
    }

    #[test]
    fn value_range_without_values_is_empty() {
        let range: ValueRange = serde_json::from_value(json!({ "range": "Sheet1" })).unwrap();
        assert!(range.into_strings().is_empty());
    }
}
