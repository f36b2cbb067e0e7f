use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Marker returned when work ends early because a stop was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// Cooperative cancellation shared between the harvest loop and whoever wants to end it.
///
/// Triggering is sticky: once stopped, every later check reports stopped.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request a stop and wake everyone waiting in [`StopSignal::wait`].
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// `Err(Stopped)` once a stop has been requested.
    pub fn check(&self) -> Result<(), Stopped> {
        if self.is_stopped() { Err(Stopped) } else { Ok(()) }
    }

    /// Resolve once a stop has been requested.
    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent trigger is never missed.
            let mut notified = core::pin::pin!(self.notify.notified());
            let _ = notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Trigger this signal when the process receives Ctrl-C.
    pub fn trigger_on_ctrl_c(self: &Arc<Self>) {
        let this = Arc::clone(self);
        drop(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Stop requested, finishing the current request");
                this.trigger();
            }
        }));
    }
}
