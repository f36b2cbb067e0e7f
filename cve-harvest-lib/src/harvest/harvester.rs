use super::client::{Client, ClientOptions};
use super::facet::Facet;
use super::fetch_result::{FetchResult, FetchStatus, describe, explode};
use super::ledger::ResumeLedger;
use super::output_store::OutputStore;
use super::progress::Progress;
use super::repo_endpoint::{RepoEndpoint, normalize};
use super::request_tracker::RequestTracker;
use super::stop_signal::{StopSignal, Stopped};
use crate::Result;
use ohno::bail;
use std::path::PathBuf;
use std::sync::Arc;
use strum::Display;

const LOG_TARGET: &str = " harvester";

/// HTTP status the provider answers with when a token is rejected.
const UNAUTHORIZED: u64 = 401;

/// Settings for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvesterOptions {
    pub batch_size: usize,

    /// Facets fetched for every batch, in this order.
    pub facets: Vec<Facet>,

    /// Facet whose output units form the resume ledger.
    pub ledger_facet: Facet,

    pub data_dir: PathBuf,
    pub dead_letter_dir: PathBuf,
    pub max_write_attempts: u32,
}

/// Stages of a run. Transitions only move forward, except that batches alternate
/// between fetching and persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HarvestPhase {
    Init,
    RateProbe,
    FetchBatch,
    PersistBatch,
    Done,
}

/// What became of one facet's results for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Written to an output unit in the data directory.
    Persisted(PathBuf),

    /// The output unit could not be written; the raw results went to the dead-letter directory.
    DeadLettered(PathBuf),

    /// Neither write succeeded; the results only exist in the error log.
    Failed,
}

/// Totals for a completed (or stopped) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Endpoints derived from the references.
    pub endpoints: usize,

    /// Endpoints dropped because a prior run already harvested them.
    pub already_harvested: usize,

    /// Endpoints skipped by the start offset.
    pub skipped: usize,

    pub batches: usize,
    pub persisted: usize,
    pub dead_lettered: usize,
    pub failed: usize,

    /// Whether the run ended early on a stop request.
    pub stopped: bool,
}

impl HarvestSummary {
    fn record(&mut self, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Persisted(_) => self.persisted += 1,
            BatchOutcome::DeadLettered(_) => self.dead_lettered += 1,
            BatchOutcome::Failed => self.failed += 1,
        }
    }
}

/// Drives a sequential harvest: normalize, resume, probe, then fetch and persist batch by batch.
pub struct Harvester {
    options: HarvesterOptions,
    client: Client,
    store: OutputStore,
    tracker: RequestTracker,
    progress: Arc<dyn Progress>,
    stop: Arc<StopSignal>,
    phase: HarvestPhase,
}

impl core::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Harvester")
            .field("options", &self.options)
            .field("client", &self.client)
            .field("store", &self.store)
            .field("phase", &self.phase)
            .field("progress", &"<dyn Progress>")
            .finish_non_exhaustive()
    }
}

impl Harvester {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(options: HarvesterOptions, client_options: &ClientOptions, progress: Arc<dyn Progress>, stop: Arc<StopSignal>) -> Result<Self> {
        let tracker = RequestTracker::new(&progress);
        let client = Client::new(client_options, tracker.clone())?;
        let store = OutputStore::new(&options.data_dir, &options.dead_letter_dir, options.max_write_attempts);

        Ok(Self {
            options,
            client,
            store,
            tracker,
            progress,
            stop,
            phase: HarvestPhase::Init,
        })
    }

    #[must_use]
    pub const fn phase(&self) -> HarvestPhase {
        self.phase
    }

    /// Harvest every configured facet of every endpoint cited by `references`.
    ///
    /// `start` skips that many endpoints of the working set left after resumption.
    ///
    /// # Errors
    ///
    /// Returns an error if the resume ledger cannot be loaded, or if the pre-flight probe
    /// fails at the transport level or is rejected as unauthorized. Failures after the
    /// probe are recorded per batch and never end the run.
    pub async fn run<S: AsRef<str>>(&mut self, references: &[S], start: usize) -> Result<HarvestSummary> {
        self.enter(HarvestPhase::Init);
        self.progress.set_phase("Preparing");

        let working_set = normalize(references, self.client.base_url());
        let ledger = ResumeLedger::load(&self.options.data_dir, self.options.ledger_facet)?;
        let (remaining, already_harvested) = ledger.filter(&working_set);

        let mut summary = HarvestSummary {
            endpoints: working_set.len(),
            already_harvested,
            ..HarvestSummary::default()
        };
        self.notice(&format!("Removed {already_harvested} already harvested endpoints"));

        // Positions refer to the full working set so rows correlate across runs.
        let mut targets: Vec<(usize, RepoEndpoint)> = working_set
            .into_iter()
            .enumerate()
            .filter(|(_, endpoint)| remaining.contains(endpoint))
            .collect();

        summary.skipped = start.min(targets.len());
        let _ = targets.drain(..summary.skipped);
        if summary.skipped > 0 {
            log::info!(target: LOG_TARGET, "Starting at position {start}, skipping {} endpoints", summary.skipped);
        }

        self.enter(HarvestPhase::RateProbe);
        self.progress.set_phase("Probing");
        match self.client.probe(&self.stop).await {
            Ok(probe) => self.check_probe(&probe)?,
            Err(Stopped) => {
                summary.stopped = true;
                self.enter(HarvestPhase::Done);
                return Ok(summary);
            }
        }

        self.progress.set_phase("Harvesting");
        let batch_size = self.options.batch_size.max(1);
        let facets = self.options.facets.clone();

        'batches: for (batch, chunk) in targets.chunks(batch_size).enumerate() {
            if self.stop.is_stopped() {
                summary.stopped = true;
                break;
            }

            // Offsets count from the start position so assigned ranges keep distinct names.
            let offset = summary.skipped + batch * batch_size;
            summary.batches += 1;

            for &facet in &facets {
                self.enter(HarvestPhase::FetchBatch);
                let (results, stopped) = self.fetch_batch(facet, chunk).await;

                self.enter(HarvestPhase::PersistBatch);
                if !results.is_empty() {
                    let outcome = self.persist_batch(facet, offset, &results);
                    summary.record(&outcome);
                }

                if stopped {
                    summary.stopped = true;
                    break 'batches;
                }
            }

            self.notice(&format!("Finished up to: {}", offset + chunk.len()));
        }

        self.enter(HarvestPhase::Done);
        log::info!(
            target: LOG_TARGET,
            "Harvest {}: {} batches, {} units persisted, {} dead-lettered, {} failed",
            if summary.stopped { "stopped" } else { "complete" },
            summary.batches,
            summary.persisted,
            summary.dead_lettered,
            summary.failed
        );
        Ok(summary)
    }

    fn enter(&mut self, phase: HarvestPhase) {
        if phase != self.phase {
            log::debug!(target: LOG_TARGET, "{} -> {phase}", self.phase);
        }
        self.phase = phase;
    }

    /// Reject the run when the probe shows the API is unreachable or refuses the token.
    fn check_probe(&self, probe: &FetchResult) -> Result<()> {
        match probe.status {
            FetchStatus::Success => {
                if let Some(info) = self.client.rate_limit() {
                    self.notice(&format!(
                        "Rate limit: {} requests remaining, resets at {}",
                        info.remaining,
                        info.reset_at.with_timezone(&chrono::Local).format("%T")
                    ));
                }
                Ok(())
            }
            FetchStatus::Failed if probe.payload["status_code"].as_u64() == Some(UNAUTHORIZED) => {
                bail!("the GitHub API rejected the token (HTTP 401): {}", probe.payload["text"]);
            }
            FetchStatus::Error if probe.payload.get("error").is_some() => {
                bail!("unable to reach the GitHub API at '{}': {}", probe.url, probe.payload["error"]);
            }
            FetchStatus::Failed | FetchStatus::Error => {
                log::warn!(target: LOG_TARGET, "Rate limit probe returned {}: {}", probe.status, probe.payload);
                Ok(())
            }
        }
    }

    /// Fetch one facet for every endpoint of a batch; the flag reports an early stop.
    async fn fetch_batch(&mut self, facet: Facet, chunk: &[(usize, RepoEndpoint)]) -> (Vec<(usize, FetchResult)>, bool) {
        self.tracker.add_requests(facet, u64::try_from(chunk.len()).unwrap_or(u64::MAX));

        let mut results = Vec::with_capacity(chunk.len());
        for (index, endpoint) in chunk {
            match self.client.fetch(endpoint, facet, &self.stop).await {
                Ok(result) => {
                    if !result.is_success() {
                        log::debug!(target: LOG_TARGET, "Fetching {} returned {}", describe(endpoint, facet), result.status);
                    }
                    results.push((*index, result));
                }
                Err(Stopped) => {
                    log::info!(target: LOG_TARGET, "Stop requested while fetching {}", describe(endpoint, facet));
                    return (results, true);
                }
            }
        }

        (results, false)
    }

    /// Persist a facet's results, falling back to the dead-letter directory and finally to
    /// the error log.
    fn persist_batch(&self, facet: Facet, offset: usize, results: &[(usize, FetchResult)]) -> BatchOutcome {
        let rows = explode(results);

        let error = match self.store.persist(facet, offset, &rows) {
            Ok(path) => return BatchOutcome::Persisted(path),
            Err(e) => e,
        };
        log::error!(target: LOG_TARGET, "Could not persist {facet} batch at offset {offset}: {error:#}");

        match self.store.dead_letter(facet, offset, results) {
            Ok(path) => {
                self.warn(&format!(
                    "Could not write {facet} batch at offset {offset}, results saved to '{}'",
                    path.display()
                ));
                BatchOutcome::DeadLettered(path)
            }
            Err(e) => {
                log::error!(target: LOG_TARGET, "Could not dead-letter {facet} batch at offset {offset}: {e:#}");
                for (index, result) in results {
                    log::error!(target: LOG_TARGET, "Unsaved result {index}: {}", serde_json::to_string(result).unwrap_or_default());
                }
                if !log::log_enabled!(log::Level::Error) {
                    self.tracker
                        .println(&format!("Could not save {facet} batch at offset {offset}: {error:#}; {e:#}"));
                }
                BatchOutcome::Failed
            }
        }
    }

    fn notice(&self, msg: &str) {
        log::info!(target: LOG_TARGET, "{msg}");
        if !log::log_enabled!(log::Level::Info) {
            self.tracker.println(msg);
        }
    }

    fn warn(&self, msg: &str) {
        log::warn!(target: LOG_TARGET, "{msg}");
        if !log::log_enabled!(log::Level::Warn) {
            self.tracker.println(msg);
        }
    }
}
