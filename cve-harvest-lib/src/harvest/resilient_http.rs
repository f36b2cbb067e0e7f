//! Transport retry for GitHub API requests.
//!
//! Wraps a whole GET (connect, headers, and body) with [`seatbelt`] retry and timeout
//! middleware. Only transport failures are retried; every HTTP response, whatever its
//! status, is handed back untouched for classification.

use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::app_err;
use reqwest::header::HeaderMap;
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use tick::Clock;

const LOG_TARGET: &str = "      http";

/// Maximum retry attempts (on top of the original request).
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// An HTTP response reduced to what classification needs.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Send an HTTP GET request, retrying transport failures with exponential backoff.
///
/// `timeout` bounds each attempt, body included.
pub async fn resilient_get(client: &reqwest::Client, url: &str, timeout: Duration) -> crate::Result<RawResponse> {
    let clock = Clock::new_tokio();
    let context = ResilienceContext::new(&clock).name("github_get");

    let client = client.clone();
    let service = (
        Retry::layer("retry", &context)
            .clone_input()
            .recovery_with(|result: &crate::Result<RawResponse>, _| match result {
                Err(_) => RecoveryInfo::retry(),
                Ok(_) => RecoveryInfo::never(),
            })
            .max_retry_attempts(MAX_RETRY_ATTEMPTS)
            .base_delay(RETRY_BASE_DELAY)
            .backoff(Backoff::Exponential)
            .on_retry(|_output, args| {
                log::debug!(
                    target: LOG_TARGET,
                    "retrying HTTP GET (attempt {}, delay {}ms)",
                    args.attempt().index() + 1,
                    args.retry_delay().as_millis(),
                );
            }),
        Timeout::layer("timeout", &context)
            .timeout_error(|_| app_err!("HTTP request timed out"))
            .timeout(timeout),
        Execute::new(move |url: String| {
            let client = client.clone();
            async move {
                let resp = client.get(&url).send().await.map_err(ohno::AppError::from)?;
                let status = resp.status().as_u16();
                let headers = resp.headers().clone();
                let body = resp.bytes().await.map_err(ohno::AppError::from)?.to_vec();
                Ok::<_, ohno::AppError>(RawResponse { status, headers, body })
            }
        }),
    )
        .into_service();

    service.execute(url.to_string()).await
}
