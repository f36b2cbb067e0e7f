//! Rate-limited, resumable harvesting of GitHub repository metadata
//!
//! This module turns the reference URLs found in CVE records into per-repository
//! GitHub API queries, and persists the answers as flat CSV output units.
//!
//! # Implementation Model
//!
//! The core type is the [`Harvester`], which drives a strictly sequential run:
//!
//! - **Normalization**: reference URLs collapse into a set of [`RepoEndpoint`]s
//! - **Resumption**: a [`ResumeLedger`] built from prior output units removes
//!   endpoints that were already harvested
//! - **Fetching**: the [`Client`] issues one request at a time and owns the
//!   [`RateController`], which stalls the run whenever the quota runs out
//! - **Persistence**: the [`OutputStore`] writes each batch under a unique name,
//!   falling back to a dead-letter directory when the primary write fails
//!
//! Nothing here runs concurrently, which is what keeps the rate state correct
//! without locking. A [`StopSignal`] lets an operator end the run between
//! requests or wait increments.

mod client;
mod facet;
mod fetch_result;
mod harvester;
mod ledger;
mod output_store;
mod progress;
mod rate_controller;
mod references;
mod repo_endpoint;
mod request_tracker;
mod resilient_http;
mod stop_signal;

pub use client::{Client, ClientOptions};
pub use facet::Facet;
pub use fetch_result::{FetchResult, FetchStatus, OutputRow, explode};
pub use harvester::{BatchOutcome, HarvestPhase, HarvestSummary, Harvester, HarvesterOptions};
pub use ledger::ResumeLedger;
pub use output_store::{OutputStore, unit_path};
pub use progress::Progress;
pub use rate_controller::{RateController, RateLimitInfo};
pub use references::{load_references, read_token_file};
pub use repo_endpoint::{RepoEndpoint, normalize};
pub use request_tracker::{FacetStatus, RequestTracker};
pub use stop_signal::{StopSignal, Stopped};
