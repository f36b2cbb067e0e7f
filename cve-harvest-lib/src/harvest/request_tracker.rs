//! Request tracking for the progress display.

use super::facet::Facet;
use super::progress::Progress;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;
use strum::{EnumCount, IntoEnumIterator};

/// Visual status of a facet, controlling its display color in the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FacetStatus {
    /// Normal active state (default color).
    Active = 0,
    /// Waiting for the rate limit to reset (blinks yellow).
    Blocked = 1,
    /// All requests completed (green).
    Done = 2,
}

#[derive(Debug, Default)]
struct RequestCounter {
    issued: AtomicU64,
    completed: AtomicU64,
    status: AtomicU8,
}

/// Tracks issued and completed requests per facet and feeds the progress display.
///
/// Clones share the same counters.
#[derive(Clone)]
pub struct RequestTracker {
    counters: Arc<[RequestCounter; Facet::COUNT]>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestTracker")
            .field("counters", &self.counters)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl RequestTracker {
    #[must_use]
    pub fn new(progress: &Arc<dyn Progress>) -> Self {
        let counters: Arc<[RequestCounter; Facet::COUNT]> = Arc::default();

        let counters_clone = Arc::clone(&counters);
        let use_colors = progress.use_colors();
        progress.set_determinate(Box::new(move || Self::progress_reporter_callback(&counters_clone, use_colors)));

        Self {
            counters,
            progress: Arc::clone(progress),
        }
    }

    /// Print a message line without disrupting the progress indicator.
    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    pub fn add_requests(&self, facet: Facet, count: u64) {
        let counter = &self.counters[facet.index()];
        let _ = counter.issued.fetch_add(count, Ordering::Relaxed);
        counter.status.store(FacetStatus::Active as u8, Ordering::Relaxed);
    }

    /// Mark one request as completed; flips the facet to [`FacetStatus::Done`] when all are.
    pub fn complete_request(&self, facet: Facet) {
        let counter = &self.counters[facet.index()];
        let completed = counter.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let issued = counter.issued.load(Ordering::Relaxed);
        if completed >= issued && issued > 0 {
            counter.status.store(FacetStatus::Done as u8, Ordering::Relaxed);
        }
    }

    /// Set the status of every facet that still has outstanding requests.
    pub fn set_pending_status(&self, status: FacetStatus) {
        for counter in self.counters.iter() {
            if counter.completed.load(Ordering::Relaxed) < counter.issued.load(Ordering::Relaxed) {
                counter.status.store(status as u8, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn completed(&self, facet: Facet) -> u64 {
        self.counters[facet.index()].completed.load(Ordering::Relaxed)
    }

    /// Returns (`total_length`, `current_position`, `message_string`).
    fn progress_reporter_callback(counters: &[RequestCounter; Facet::COUNT], use_colors: bool) -> (u64, u64, String) {
        // Toggle every 500ms for the blink effect on blocked facets
        let blink_on = use_colors && {
            let ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            (ms / 500).is_multiple_of(2)
        };

        let mut total_issued = 0u64;
        let mut total_completed = 0u64;
        let mut parts = Vec::with_capacity(Facet::COUNT);

        for facet in Facet::iter() {
            let counter = &counters[facet.index()];
            let issued = counter.issued.load(Ordering::Relaxed);
            let completed = counter.completed.load(Ordering::Relaxed);

            if issued > 0 {
                total_issued += issued;
                total_completed += completed;

                let text = format!("{completed}/{issued} {facet}");
                let status = counter.status.load(Ordering::Relaxed);

                let styled = if use_colors && status == FacetStatus::Done as u8 {
                    format!("{}", text.green())
                } else if status == FacetStatus::Blocked as u8 && blink_on {
                    format!("{}", text.yellow())
                } else {
                    text
                };

                parts.push(styled);
            }
        }

        let message = if parts.is_empty() {
            "No requests".to_string()
        } else {
            parts.join(", ")
        };

        (total_issued, total_completed, message)
    }
}
