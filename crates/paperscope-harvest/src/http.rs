use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::config::FetchConfig;
use crate::error::{HarvestError, Result};
use crate::timing::timed;

// ─── Requests & responses ─────────────────────────────────────────────────────

/// Whether a request counts against a third party's rate limit. External API
/// calls are followed by the courtesy delay; page fetches are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Page,
    ExternalApi,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub kind: RequestKind,
}

impl FetchRequest {
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            kind: RequestKind::Page,
        }
    }

    pub fn api(url: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::ExternalApi,
            ..Self::page(url)
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// URL with the query pairs appended and percent-encoded.
    pub fn full_url(&self) -> Result<Url> {
        let mut url =
            Url::parse(&self.url).map_err(|e| HarvestError::InvalidUrl(format!("{}: {e}", self.url)))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

/// What a transport hands back for a single attempt, whatever the status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// A successfully fetched document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl FetchedPage {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| HarvestError::Parse(format!("invalid JSON from {}: {e}", self.url)))
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// One network attempt. Connection problems map to [`HarvestError::Connect`],
/// timeouts and body errors to [`HarvestError::Read`]; any HTTP status is a
/// successful send.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse> {
        let url = request.full_url()?;
        let mut builder = self.client.get(url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| classify_send_error(url.as_str(), e))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(|e| HarvestError::Read {
            url: final_url.clone(),
            message: e.to_string(),
        })?;

        Ok(RawResponse {
            url: final_url,
            status,
            retry_after,
            body,
        })
    }
}

fn classify_send_error(url: &str, e: reqwest::Error) -> HarvestError {
    if e.is_connect() {
        HarvestError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else if e.is_timeout() || e.is_body() || e.is_request() {
        HarvestError::Read {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        HarvestError::Http(e)
    }
}

// ─── Retry policy ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            retry_statuses: config.retry_statuses.clone(),
        }
    }

    /// Policy with no sleeping between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_factor: 0.0,
            ..Self::default()
        }
    }

    /// Sleep before retry number `retry` (1-based): `factor * 2^(retry-1)`
    /// seconds, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(retry.saturating_sub(1).min(30) as i32);
        let secs = (self.backoff_factor * exp).min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff)
    }

    pub fn retries_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

// ─── ResilientFetcher ─────────────────────────────────────────────────────────

pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    courtesy_delay: Duration,
}

impl ResilientFetcher {
    pub fn new(config: &FetchConfig, polite_email: Option<&str>) -> Result<Self> {
        let transport = ReqwestTransport::new(
            &config.user_agent_with_contact(polite_email),
            config.timeout(),
        )?;
        Ok(Self::with_transport(
            Arc::new(transport),
            RetryPolicy::from_config(config),
            config.courtesy_delay(),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        courtesy_delay: Duration,
    ) -> Self {
        Self {
            transport,
            policy,
            courtesy_delay,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch with retries. External API requests are followed by the courtesy
    /// delay whether or not they succeeded.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let (result, elapsed) = timed(&request.url, self.fetch_with_retries(request)).await;

        if request.kind == RequestKind::ExternalApi && !self.courtesy_delay.is_zero() {
            sleep(self.courtesy_delay).await;
        }

        let (resp, attempts) = result?;
        Ok(FetchedPage {
            url: resp.url,
            status: resp.status,
            body: resp.body,
            elapsed,
            attempts,
        })
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &FetchRequest) -> Result<T> {
        self.fetch(request).await?.json()
    }

    async fn fetch_with_retries(&self, request: &FetchRequest) -> Result<(RawResponse, u32)> {
        let mut retries = 0u32;
        loop {
            let (err, retry_after) = match self.transport.send(request).await {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok((resp, retries + 1)),
                Ok(resp) if self.policy.retries_status(resp.status) => (
                    HarvestError::Status {
                        url: resp.url,
                        status: resp.status,
                    },
                    resp.retry_after,
                ),
                Ok(resp) => {
                    return Err(HarvestError::Status {
                        url: resp.url,
                        status: resp.status,
                    });
                }
                Err(e @ (HarvestError::Connect { .. } | HarvestError::Read { .. })) => (e, None),
                Err(e) => return Err(e),
            };

            if retries >= self.policy.max_retries {
                tracing::warn!(url = %request.url, attempts = retries + 1, error = %err, "retries exhausted");
                return Err(HarvestError::Exhausted {
                    url: request.url.clone(),
                    attempts: retries + 1,
                    last: Box::new(err),
                });
            }

            retries += 1;
            let wait = self
                .policy
                .backoff(retries)
                .max(retry_after.unwrap_or_default())
                .min(self.policy.max_backoff);
            tracing::debug!(
                url = %request.url,
                retry = retries,
                max_retries = self.policy.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "retrying"
            );
            if !wait.is_zero() {
                sleep(wait).await;
            }
        }
    }
}

/// Fetcher over the real transport with no retries and no courtesy delay.
#[cfg(test)]
pub(crate) fn test_fetcher() -> Arc<ResilientFetcher> {
    let transport = ReqwestTransport::new("paperscope-test", Duration::from_secs(5))
        .expect("client builds");
    Arc::new(ResilientFetcher::with_transport(
        Arc::new(transport),
        RetryPolicy::immediate(0),
        Duration::ZERO,
    ))
}
