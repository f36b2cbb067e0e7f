//! GitHub API client
//!
//! Issues one request at a time, gated by the [`RateController`] it owns, and classifies
//! every outcome into a [`FetchResult`] instead of failing.

use super::facet::Facet;
use super::fetch_result::{FetchResult, FetchStatus};
use super::rate_controller::{RateController, RateLimitInfo};
use super::repo_endpoint::RepoEndpoint;
use super::request_tracker::RequestTracker;
use super::resilient_http::{RawResponse, resilient_get};
use super::stop_signal::{StopSignal, Stopped};
use crate::Result;
use chrono::Utc;
use core::time::Duration;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};

const LOG_TARGET: &str = "    client";

/// Facet name recorded on the pre-flight probe result.
const PROBE_FACET: &str = "rate_limit";

/// Settings for [`Client::new`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub default_wait: Duration,
    pub max_wait_step: Duration,
}

/// Hosting API client
#[derive(Debug)]
#[expect(clippy::struct_field_names, reason = "client field stores the underlying HTTP client")]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    rate: RateController,
    tracker: RequestTracker,
}

impl Client {
    /// Create a client with optional authentication token.
    pub fn new(options: &ClientOptions, tracker: RequestTracker) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(t) = &options.token {
            let mut auth_val = HeaderValue::from_str(&format!("Bearer {t}"))?;
            auth_val.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("cve-harvest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: options.api_base_url.trim_end_matches('/').to_string(),
            request_timeout: options.request_timeout,
            rate: RateController::new(options.default_wait, options.max_wait_step),
            tracker,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate.last_seen()
    }

    /// Fetch one facet of one repository.
    pub async fn fetch(&mut self, endpoint: &RepoEndpoint, facet: Facet, stop: &StopSignal) -> Result<FetchResult, Stopped> {
        let url = endpoint.facet_url(facet.name());
        let result = self.get(&url, endpoint.as_str(), facet.name(), stop).await?;
        self.tracker.complete_request(facet);
        Ok(result)
    }

    /// Query the rate limit status endpoint, which does not count against the quota.
    pub async fn probe(&mut self, stop: &StopSignal) -> Result<FetchResult, Stopped> {
        let base = self.base_url.clone();
        let url = format!("{base}/{PROBE_FACET}");
        self.get(&url, &base, PROBE_FACET, stop).await
    }

    /// GET `url` once the quota allows it, and classify the outcome as a result for `base` and `facet`.
    async fn get(&mut self, url: &str, base: &str, facet: &str, stop: &StopSignal) -> Result<FetchResult, Stopped> {
        stop.check()?;
        self.rate.await_ready(stop, &self.tracker).await?;

        let response = tokio::select! {
            response = resilient_get(&self.client, url, self.request_timeout) => response,
            () = stop.wait() => return Err(Stopped),
        };

        match response {
            Ok(resp) => {
                self.rate.record(&resp.headers, Utc::now());
                log::debug!(target: LOG_TARGET, "GET {url} -> {}", resp.status);
                Ok(classify(base, facet, resp))
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not fetch {url}: {e:#}");
                Ok(FetchResult::new(base, facet, FetchStatus::Error, json!({ "error": e.to_string() })))
            }
        }
    }
}

/// Map a response to a result: non-2xx is `failed`, a JSON object or array is `success`,
/// anything else is `error`.
fn classify(base: &str, facet: &str, resp: RawResponse) -> FetchResult {
    if !(200..300).contains(&resp.status) {
        let payload = json!({
            "status_code": resp.status,
            "text": String::from_utf8_lossy(&resp.body),
        });
        return FetchResult::new(base, facet, FetchStatus::Failed, payload);
    }

    match serde_json::from_slice::<Value>(&resp.body) {
        Ok(body @ (Value::Object(_) | Value::Array(_))) => FetchResult::new(base, facet, FetchStatus::Success, body),
        Ok(_) | Err(_) => FetchResult::new(
            base,
            facet,
            FetchStatus::Error,
            json!({ "response": String::from_utf8_lossy(&resp.body) }),
        ),
    }
}
