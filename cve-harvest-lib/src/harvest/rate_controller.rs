use super::request_tracker::{FacetStatus, RequestTracker};
use super::stop_signal::{StopSignal, Stopped};
use chrono::{DateTime, Utc};
use core::time::Duration;
use reqwest::header::HeaderMap;

const LOG_TARGET: &str = "      rate";

/// Quota at or below which the next request would exhaust the rate limit.
const NEAR_EXHAUSTION: u64 = 1;

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Extract rate limit information from API response headers
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.trim().parse::<u64>().ok()?;
        let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.trim().parse::<i64>().ok()?;
        let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

        Some(Self { remaining, reset_at })
    }
}

/// The cooldown countdown shared by every request of a run.
///
/// Callers pair [`RateController::await_ready`] before each request with
/// [`RateController::record`] after each response. The countdown only ever
/// drains through wait increments, so no request goes out while it is non-zero.
#[derive(Debug, Clone)]
pub struct RateController {
    countdown_secs: u64,
    default_wait: Duration,
    max_wait_step: Duration,
    last_seen: Option<RateLimitInfo>,
}

impl RateController {
    /// `default_wait` is the minimum cooldown once the quota is nearly spent;
    /// `max_wait_step` bounds each sleep so progress can be reported in between.
    #[must_use]
    pub fn new(default_wait: Duration, max_wait_step: Duration) -> Self {
        Self {
            countdown_secs: 0,
            default_wait,
            max_wait_step: max_wait_step.max(Duration::from_secs(1)),
            last_seen: None,
        }
    }

    #[must_use]
    pub const fn countdown_secs(&self) -> u64 {
        self.countdown_secs
    }

    /// The most recent quota reported by the provider.
    #[must_use]
    pub const fn last_seen(&self) -> Option<RateLimitInfo> {
        self.last_seen
    }

    /// Update the countdown from a response's rate limit headers.
    pub fn record(&mut self, headers: &HeaderMap, now: DateTime<Utc>) {
        let Some(info) = RateLimitInfo::from_headers(headers) else {
            log::debug!(target: LOG_TARGET, "Response carried no rate limit headers");
            self.countdown_secs = 0;
            return;
        };

        self.last_seen = Some(info);
        self.countdown_secs = if info.remaining <= NEAR_EXHAUSTION {
            let until_reset = u64::try_from((info.reset_at - now).num_seconds()).unwrap_or(0);
            let wait = until_reset.max(self.default_wait.as_secs());
            log::info!(
                target: LOG_TARGET,
                "Rate limit nearly exhausted ({} remaining), pausing for {wait}s until {}",
                info.remaining,
                info.reset_at.with_timezone(&chrono::Local).format("%T")
            );
            wait
        } else {
            0
        };
    }

    /// Block until the countdown reaches zero.
    ///
    /// Sleeps in increments of at most `max_wait_step`, reporting the remaining time after
    /// each one. Returns early with [`Stopped`] when `stop` fires during a wait.
    pub async fn await_ready(&mut self, stop: &StopSignal, tracker: &RequestTracker) -> Result<(), Stopped> {
        if self.countdown_secs == 0 {
            return Ok(());
        }

        tracker.set_pending_status(FacetStatus::Blocked);
        while self.countdown_secs > 0 {
            let notice = format!("Waiting for {} (hh:mm)", format_countdown(self.countdown_secs));
            log::info!(target: LOG_TARGET, "{notice}");
            if !log::log_enabled!(log::Level::Info) {
                tracker.println(&notice);
            }

            let step = self.countdown_secs.min(self.max_wait_step.as_secs());
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(step)) => {}
                () = stop.wait() => return Err(Stopped),
            }
            self.countdown_secs -= step;
        }
        tracker.set_pending_status(FacetStatus::Active);

        log::info!(target: LOG_TARGET, "Rate limit lifted, resuming requests");
        Ok(())
    }
}

/// Render seconds as `hh:mm`.
fn format_countdown(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    format!("{hours:02}:{minutes:02}")
}
