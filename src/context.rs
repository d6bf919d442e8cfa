use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Pool;
use crate::error::{SyncError, SyncResult};
use crate::hubspot::HubSpotService;
use crate::sheets::SheetsService;

/// Everything an engine operation needs besides the caller's credentials.
#[derive(Clone)]
pub struct SyncContext {
    pub pool: Pool,
    pub hubspot: Arc<dyn HubSpotService>,
    pub sheets: Arc<dyn SheetsService>,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
}

impl SyncContext {
    pub fn new(
        pool: Pool,
        hubspot: Arc<dyn HubSpotService>,
        sheets: Arc<dyn SheetsService>,
    ) -> Self {
        Self {
            pool,
            hubspot,
            sheets,
            call_timeout: Duration::from_secs(30),
            max_concurrency: 4,
        }
    }

    pub fn with_config(mut self, cfg: &Config) -> Self {
        self.call_timeout = cfg.call_timeout();
        self.max_concurrency = cfg.app.max_concurrency.max(1);
        self
    }

    /// Run one external call under the per-call timeout.
    pub async fn call<T, F>(&self, what: &str, fut: F) -> SyncResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res.map_err(SyncError::Other),
            Err(_) => Err(SyncError::Timeout {
                what: what.to_string(),
                after: self.call_timeout,
            }),
        }
    }
}
