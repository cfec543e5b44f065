//! HTTP client for the upstream statistics API.
//!
//! One GET per logical resource, with every failure mapped onto a
//! [`GatewayError`] kind. Paged tables are followed until the upstream's
//! reported total is covered. Retries are opt-in through configuration.

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::upstream::wire::{Envelope, ResourceTable};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before the first retry; doubles on each further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Rows requested per page; the upstream's ceiling.
const PAGE_LIMIT: usize = 1000;

/// Client for the upstream statistics API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    timeout_seconds: u64,
    retries: u32,
}

impl UpstreamClient {
    /// Build a client from upstream settings.
    pub fn new(config: &UpstreamConfig) -> GatewayResult<Self> {
        if config.timeout_seconds == 0 {
            return Err(GatewayError::InvalidRequest(
                "upstream timeout must be at least 1 second".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::Transport {
                path: config.base_url.clone(),
                detail: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
            retries: config.retries,
        })
    }

    /// Base URL resource paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every page of a table and join them.
    ///
    /// An empty table is returned as is; a table the upstream stops serving
    /// before its reported total is a `Decode` failure.
    pub async fn fetch_all<T>(&self, path: &str) -> GatewayResult<T>
    where
        T: DeserializeOwned + ResourceTable,
    {
        let first: Envelope<T> = self.fetch(path, Some(0)).await?;
        let total = first.data.total(path)?;
        debug!(
            "{}: page limit {:?}, offset {:?}, total {:?}",
            path, first.data.limit, first.data.offset, total
        );
        let mut table = first.data.table;
        let mut fetched = table.rows();

        let Some(total) = total else {
            return Ok(table);
        };

        while fetched < total {
            debug!("{}: {} of {} rows, fetching next page", path, fetched, total);
            let page: Envelope<T> = self.fetch(path, Some(fetched)).await?;
            let rows = page.data.table.rows();
            if rows == 0 {
                return Err(GatewayError::Decode {
                    path: path.to_string(),
                    detail: format!("upstream served {} of {} rows", fetched, total),
                });
            }
            table.append(page.data.table);
            fetched += rows;
        }

        Ok(table)
    }

    /// Fetch every page of a table that must not be empty.
    pub async fn fetch_table<T>(&self, path: &str) -> GatewayResult<T>
    where
        T: DeserializeOwned + ResourceTable,
    {
        let table: T = self.fetch_all(path).await?;
        if table.is_empty() {
            debug!("Empty {} table at {}", T::WHAT, path);
            return Err(GatewayError::NotFound {
                what: T::WHAT.to_string(),
            });
        }
        Ok(table)
    }

    /// Fetch and decode one resource, or one page of it when `offset` is set.
    ///
    /// `path` is relative to the base URL and already carries its season,
    /// round and resource segments, e.g. `2021/3/results.json`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        offset: Option<usize>,
    ) -> GatewayResult<T> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "resource path must not be empty".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(path, offset).await {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, path, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        path: &str,
        offset: Option<usize>,
    ) -> GatewayResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {} (offset {:?})", url, offset);

        let mut request = self.http.get(&url);
        if let Some(offset) = offset {
            request = request.query(&[("limit", PAGE_LIMIT), ("offset", offset)]);
        }

        let response = request.send().await.map_err(|e| {
            let detail = if e.is_timeout() {
                format!("request timed out after {}s", self.timeout_seconds)
            } else if e.is_connect() {
                format!("cannot connect to {}", self.base_url)
            } else {
                e.to_string()
            };
            GatewayError::Transport {
                path: path.to_string(),
                detail,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamStatus {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| GatewayError::Transport {
            path: path.to_string(),
            detail: format!("failed to read body: {}", e),
        })?;

        serde_json::from_slice(&body).map_err(|e| GatewayError::Decode {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }
}
